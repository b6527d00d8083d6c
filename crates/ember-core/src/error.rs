use thiserror::Error;

use crate::gateway::GatewayError;
use crate::policy::Effect;

#[derive(Debug, Error)]
pub enum CoreError {
    /// An outbound call whose policy is `Propagate` failed.
    #[error("{effect} failed: {source}")]
    SideEffect {
        effect: Effect,
        #[source]
        source: GatewayError,
    },

    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
