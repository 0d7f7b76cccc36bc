#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Rejected input: a malformed registry or an inverted event window.
    #[error("Validation failed: {0}")]
    Validation(String),
}
