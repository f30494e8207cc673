use std::time::Duration;

use thiserror::Error;

use crate::types::GenerationMode;

/// Failures the generation engine distinguishes between.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// Dropdown or option missing. Non-fatal, processing continues on page defaults.
    #[error("{what} not found on page")]
    ConfigurationNotFound { what: String },

    #[error("could not find prompt input")]
    InputNotFound,

    #[error("could not find submit button")]
    SubmitNotFound,

    #[error("generation timeout - no new {mode} appeared within {}s", .after.as_secs())]
    GenerationTimeout { mode: GenerationMode, after: Duration },

    #[error("download failed for {url}: {reason}")]
    DownloadFailed { url: String, reason: String },
}
