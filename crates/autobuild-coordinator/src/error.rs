#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error("{0} does not match the package archive naming pattern")]
    BadName(String),
    #[error("{0} is already building")]
    AlreadyBuilding(String),
    #[error("{0} is already queued")]
    AlreadyQueued(String),
    #[error("{0} is already built and awaiting release")]
    AwaitingRelease(String),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to persist coordinator state: {0}")]
    Persist(#[source] bincode::Error),
}
