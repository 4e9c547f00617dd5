#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("missing {0} in staged archive")]
    MissingComponent(String),

    #[error("source tree has no debian/ directory after applying the diff")]
    MissingDebianDir,

    #[error("{command} failed: {log}")]
    ExternalFailed { command: String, log: String },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse build options override: {0}")]
    Json(#[from] serde_json::Error),

    #[error("process error: {0}")]
    Process(#[from] autobuild_procio::ProcessError),
}
