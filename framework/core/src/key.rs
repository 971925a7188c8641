use serde::{Deserialize, Serialize};

/// Identifies one series: the measurements of one benchmark produced by one tool
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, derive_more::Display,
)]
#[display("{tool}/{name}")]
pub struct SeriesKey {
    pub tool: String,
    pub name: String,
}

impl SeriesKey {
    pub fn new(tool: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            name: name.into(),
        }
    }
}
