use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("orchestrator requires a running tokio runtime: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),
}
