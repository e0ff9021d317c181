//! Operating modes and prompt templates.
//!
//! Modes only pick a template; they play no part in the retry policy.

/// User-selectable operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// "Show me": analyze an uploaded document.
    Analyze,
    /// "Help me": advise on a free-text problem description.
    Advise,
}

impl Mode {
    /// Parse a query-parameter string into a mode.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "analyze" => Some(Self::Analyze),
            "advise" => Some(Self::Advise),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Analyze => "analyze",
            Self::Advise => "advise",
        }
    }

    fn preamble(&self) -> &'static str {
        match self {
            Self::Analyze => {
                "You are Aura, a consumer-protection expert. Analyze this document. \
                 Identify: 1. The document type. 2. RISKS. 3. KEY FACTS. \
                 4. RECOMMENDED ACTION. Answer clearly and concisely."
            }
            Self::Advise => {
                "You are Aura, a consumer-protection expert. Give practical, \
                 actionable advice for this situation. Answer clearly and concisely."
            }
        }
    }
}

/// Build the prompt for a document upload. Extracted text, when present, is
/// appended as a best-effort hint alongside the attached bytes.
pub fn document_prompt(mode: Mode, extracted_text: Option<&str>) -> String {
    match extracted_text {
        Some(text) => format!(
            "{}\n\n--- EXTRACTED TEXT (may be incomplete) ---\n\n{}",
            mode.preamble(),
            text
        ),
        None => mode.preamble().to_string(),
    }
}

/// Build the prompt for a free-text problem description.
pub fn text_prompt(mode: Mode, user_input: &str) -> String {
    format!("{}\n\n{}", mode.preamble(), user_input)
}
