use thiserror::Error;

/// Errors raised while building or running a launch
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("the pipeline has already been started")]
    AlreadyStarted,

    #[error("invalid command '{command}': {reason}")]
    InvalidCommand { command: String, reason: String },

    #[error("failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("no tokio runtime to run '{0}' on")]
    NoRuntime(String),
}
