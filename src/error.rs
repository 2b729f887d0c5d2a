use thiserror::Error;

/// Structural errors surfaced to the runner. Per-iteration failures are data
/// (they land in the `iterations` trend), not variants of this enum.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to load test script: {0}")]
    ModuleLoad(String),

    #[error("rpc {id} ({name}) timed out")]
    RpcTimeout { id: u64, name: &'static str },

    #[error("worker rpc failed: {0}")]
    RpcRemote(String),

    #[error("worker terminate")]
    WorkerTerminated,

    #[error("http client setup failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("json serialisation failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Error surfaced to user code by the instrumented fetch.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request aborted: batch deadline reached")]
    Aborted,

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}
