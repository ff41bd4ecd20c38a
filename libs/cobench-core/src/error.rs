use thiserror::Error;

/// Fatal candidate-load failure. Reported once for the whole
/// evaluation call; no cases run after it.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("candidate does not define required entry point `{name}`")]
    MissingEntryPoint { name: String },

    #[error("candidate failed to compile: {message}")]
    Compile { message: String },

    #[error("failed to stage candidate: {0}")]
    Setup(#[from] std::io::Error),
}

/// The one error class visible to callers as a hard failure. Per-case
/// failures (timeout, runtime failure, invalid output) are embedded in
/// `Feedback`, never propagated.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error(transparent)]
    Load(#[from] LoadError),
}
