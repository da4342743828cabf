use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServingError {
    #[error("failed to spawn http server thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("failed to bind {addr}: {reason}")]
    Bind { addr: String, reason: String },
    #[error("http server exited before it started listening")]
    Startup,
}
