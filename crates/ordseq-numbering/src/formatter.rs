use ordseq_types::SequentialNumber;

use crate::config::NumberingConfig;

/// Renders sequential numbers for display.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DisplayFormatter {
    prefix: String,
}

impl DisplayFormatter {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn from_config(config: &NumberingConfig) -> Self {
        Self::new(config.display_prefix.clone())
    }

    /// `number` with the display prefix, or `default` when the order has no
    /// number (typically its record key).
    pub fn format(&self, number: Option<&SequentialNumber>, default: &str) -> String {
        match number {
            Some(number) => format!("{}{}", self.prefix, number),
            None => default.to_string(),
        }
    }
}
