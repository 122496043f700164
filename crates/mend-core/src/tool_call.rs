//! Embedded tool-call directive type.

use serde::{Deserialize, Serialize};

/// One `[tool_call(Name, key=value, ...)]` directive extracted from model
/// output.
///
/// Constructed per occurrence, executed exactly once, then discarded. Nothing
/// persists across turns except the effects it had on the file context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Tool name as authored. Matching is case-insensitive.
    pub name: String,
    /// Parameters in authored order.
    pub params: Vec<(String, String)>,
}

impl ToolCall {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
        }
    }

    /// Case-insensitive name check.
    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    /// Look up a parameter by name, first occurrence wins.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_insensitive_name() {
        let call = ToolCall::new("MakeEditable");
        assert!(call.is("makeeditable"));
        assert!(call.is("MAKEEDITABLE"));
        assert!(!call.is("View"));
    }

    #[test]
    fn test_param_lookup_first_wins() {
        let mut call = ToolCall::new("View");
        call.params.push(("file_path".into(), "a.py".into()));
        call.params.push(("file_path".into(), "b.py".into()));
        assert_eq!(call.param("file_path"), Some("a.py"));
        assert_eq!(call.param("missing"), None);
    }
}
