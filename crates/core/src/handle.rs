//! Edge source handles.
//!
//! An edge leaves its source node either through the default handle
//! (automatic transition) or through a choice button handle
//! (`button-handle-<choiceId>`). The raw string is kept verbatim on the
//! edge; [`SourceHandle`] is the parsed slot used for indexing.

use std::fmt;

use crate::types::ChoiceId;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Raw handle string of the automatic-transition handle.
pub const DEFAULT_HANDLE: &str = "default-handle";

/// Prefix of a choice-bound handle; the remainder is the choice id.
pub const CHOICE_HANDLE_PREFIX: &str = "button-handle-";

// ---------------------------------------------------------------------------
// SourceHandle
// ---------------------------------------------------------------------------

/// Parsed view of an edge's `sourceHandle`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SourceHandle {
    /// Absent or `"default-handle"`.
    Default,
    /// `"button-handle-<choiceId>"`.
    Choice(ChoiceId),
    /// Any other handle string, kept so foreign documents still index.
    Custom(String),
}

impl SourceHandle {
    /// Parse a raw handle. `None` and `"default-handle"` map to the same slot.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            None | Some(DEFAULT_HANDLE) => Self::Default,
            Some(raw) => match raw.strip_prefix(CHOICE_HANDLE_PREFIX) {
                Some(choice_id) if !choice_id.is_empty() => Self::Choice(choice_id.to_string()),
                _ => Self::Custom(raw.to_string()),
            },
        }
    }

    /// Build the raw handle string for a choice button.
    pub fn for_choice(choice_id: &str) -> String {
        format!("{CHOICE_HANDLE_PREFIX}{choice_id}")
    }

    pub fn is_default(&self) -> bool {
        matches!(self, Self::Default)
    }

    /// The choice id, if this handle is choice-bound.
    pub fn choice_id(&self) -> Option<&str> {
        match self {
            Self::Choice(id) => Some(id),
            _ => None,
        }
    }
}

impl fmt::Display for SourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => f.write_str(DEFAULT_HANDLE),
            Self::Choice(id) => write!(f, "{CHOICE_HANDLE_PREFIX}{id}"),
            Self::Custom(raw) => f.write_str(raw),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
