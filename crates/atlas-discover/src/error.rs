//! Error types for the atlas-discover crate.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DiscoverError {
    #[error("{tool} not found at path: {path}")]
    ToolNotFound { tool: String, path: String },

    #[error("{tool} exited with code {code}: {stderr}")]
    ToolFailed {
        tool: String,
        code: i32,
        stderr: String,
    },

    #[error("{tool} timed out after {secs}s on {target}")]
    Timeout {
        tool: String,
        target: String,
        secs: u64,
    },

    #[error("{tool} output did not include {target}")]
    MissingFromOutput { tool: String, target: String },

    #[error("Failed to parse nmap XML output: {0}")]
    XmlParse(String),

    #[error("Failed to parse container inspection output: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("No scannable network interfaces: {0}")]
    NoInterfaces(String),

    #[error("Inventory store error: {0}")]
    Store(#[from] atlas_inventory::StoreError),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DiscoverError {
    /// Setup failures abort the current invocation; everything else is a
    /// per-target or per-row failure that callers log and move past.
    pub fn is_setup(&self) -> bool {
        matches!(
            self,
            Self::NoInterfaces(_) | Self::Store(_) | Self::Config(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, DiscoverError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_classification() {
        assert!(DiscoverError::NoInterfaces("none".into()).is_setup());
        assert!(DiscoverError::Config("bad".into()).is_setup());
        assert!(!DiscoverError::XmlParse("eof".into()).is_setup());
        assert!(!DiscoverError::ToolFailed {
            tool: "nmap".into(),
            code: 1,
            stderr: String::new(),
        }
        .is_setup());
    }
}
