use serde::{Deserialize, Serialize};
use std::fmt;

/// The three candidate sources fused into one answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// Attribute store filtered by structured predicates
    Structured,
    /// Free-text profile answers index
    FreeText,
    /// Survey-poll answers index
    Poll,
}

impl Source {
    pub const ALL: [Source; 3] = [Source::Structured, Source::FreeText, Source::Poll];

    pub fn label(&self) -> &'static str {
        match self {
            Source::Structured => "structured",
            Source::FreeText => "free_text",
            Source::Poll => "poll",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
