use thiserror::Error;

/// Errors surfaced by tokenizer construction, training, encoding and the
/// split pipeline. Every failure is fail-fast: no retry, no partial state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenizerError {
    /// Construction or fit entry rejected the supplied configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    /// Encode or decode was called before any training populated the maps.
    #[error("tokenizer is not fitted")]
    NotFitted,
    /// The call received data the fitted state cannot interpret.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, TokenizerError>;
