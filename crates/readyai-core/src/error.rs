//! Error types for Ready_Ai.

use readyai_types::TabId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReadyAiError {
    #[error("Invalid URL pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Invalid custom site: {0}")]
    InvalidCustomSite(String),

    #[error("Custom site not found: {0}")]
    CustomSiteNotFound(String),

    #[error("Unknown built-in site: {0}")]
    UnknownSite(String),

    #[error("Tab not tracked: {0}")]
    TabNotTracked(TabId),

    #[error("Delivery to {0} failed")]
    DeliveryFailed(TabId),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Channel send error")]
    ChannelSendError,
}

impl ReadyAiError {
    /// Errors caused by user input at the edit boundary.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ReadyAiError::InvalidPattern { .. }
                | ReadyAiError::InvalidCustomSite(_)
                | ReadyAiError::CustomSiteNotFound(_)
                | ReadyAiError::UnknownSite(_)
        )
    }
}
