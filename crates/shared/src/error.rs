use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a hop from an effect unit back into the coordination context did not happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeError {
    #[error("effect unit was cancelled")]
    Cancelled,
    #[error("orchestrator has been torn down")]
    Detached,
    #[error("scoped state is no longer present in the parent state")]
    OutOfScope,
}

impl BridgeError {
    /// Cancellation and teardown are expected outcomes, not failures worth surfacing.
    pub fn is_expected(self) -> bool {
        matches!(self, BridgeError::Cancelled | BridgeError::Detached)
    }
}
