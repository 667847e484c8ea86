use thiserror::Error;

/// Address and script derivation errors.
#[derive(Debug, Error)]
pub enum DeriveError {
    #[error("invalid derivation: {0}")]
    InvalidDerivation(String),

    #[error("unsupported script type: {0}")]
    UnsupportedScriptType(String),

    #[error("incompatible signature form: {0}")]
    IncompatibleSignatureForm(String),
}
