//! Single-keypress menu options.

use std::fmt;

use crate::style;

/// One entry of a keyed menu, selected by typing its key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyedOption {
    /// Key that selects this option (matched case-sensitively).
    pub key: char,
    /// Description shown next to the key.
    pub desc: Option<String>,
    /// Hidden options can be selected but are never listed.
    pub hidden: bool,
}

impl KeyedOption {
    /// Creates a visible option.
    pub fn new(key: char, desc: impl Into<String>) -> Self {
        Self {
            key,
            desc: Some(desc.into()),
            hidden: false,
        }
    }

    /// Creates a hidden option with no description.
    pub fn hidden(key: char) -> Self {
        Self {
            key,
            desc: None,
            hidden: true,
        }
    }

    /// Marks this option as hidden.
    pub fn into_hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    /// The `[k]` label with the key in bold.
    pub fn key_label(&self) -> String {
        format!("[{}]", style::bold(&self.key.to_string()))
    }
}

impl fmt::Display for KeyedOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.desc {
            Some(desc) => write!(f, "{} {}", self.key_label(), desc),
            None => f.write_str(&self.key_label()),
        }
    }
}
