//! Side-effect policy table. Every outbound call is tagged with an [`Effect`];
//! the effect decides whether a failure is swallowed (logged) or returned to
//! the caller. The store stays the source of truth either way.

use std::fmt;

use tracing::warn;

use crate::error::CoreError;
use crate::gateway::GatewayError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    Ignore,
    Propagate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    PublishSend,
    FooterRefresh,
    KeyboardRefresh,
    ExpiredDelete,
    RelayOpenNotice,
    RelayForward,
    RelayCloseNotice,
    DelayedNotice,
    StatsBroadcast,
    MenuRefresh,
}

impl Effect {
    pub const ALL: [Effect; 10] = [
        Effect::PublishSend,
        Effect::FooterRefresh,
        Effect::KeyboardRefresh,
        Effect::ExpiredDelete,
        Effect::RelayOpenNotice,
        Effect::RelayForward,
        Effect::RelayCloseNotice,
        Effect::DelayedNotice,
        Effect::StatsBroadcast,
        Effect::MenuRefresh,
    ];

    pub const fn policy(self) -> Policy {
        match self {
            // No message, no record: the caller must know.
            Effect::PublishSend => Policy::Propagate,
            Effect::FooterRefresh
            | Effect::KeyboardRefresh
            | Effect::ExpiredDelete
            | Effect::RelayOpenNotice
            | Effect::RelayForward
            | Effect::RelayCloseNotice
            | Effect::DelayedNotice
            | Effect::StatsBroadcast
            | Effect::MenuRefresh => Policy::Ignore,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Effect::PublishSend => "publish send",
            Effect::FooterRefresh => "footer refresh",
            Effect::KeyboardRefresh => "keyboard refresh",
            Effect::ExpiredDelete => "expired post delete",
            Effect::RelayOpenNotice => "relay open notice",
            Effect::RelayForward => "relay forward",
            Effect::RelayCloseNotice => "relay close notice",
            Effect::DelayedNotice => "delayed send notice",
            Effect::StatsBroadcast => "weekly stats broadcast",
            Effect::MenuRefresh => "private menu refresh",
        }
    }
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Apply the effect's policy to an outbound result. `Ok(None)` means the
/// call failed and the failure was swallowed.
pub fn settle<T>(effect: Effect, result: Result<T, GatewayError>) -> Result<Option<T>, CoreError> {
    match result {
        Ok(v) => Ok(Some(v)),
        Err(source) => match effect.policy() {
            Policy::Ignore => {
                warn!(effect = effect.name(), error = %source, "side effect failed, continuing");
                Ok(None)
            }
            Policy::Propagate => Err(CoreError::SideEffect { effect, source }),
        },
    }
}

/// Shorthand for effects whose policy is `Ignore`.
pub fn best_effort<T>(effect: Effect, result: Result<T, GatewayError>) -> Option<T> {
    debug_assert_eq!(effect.policy(), Policy::Ignore, "{effect} must not be swallowed");
    match result {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(effect = effect.name(), error = %e, "side effect failed, continuing");
            None
        }
    }
}

/// Shorthand for effects whose policy is `Propagate`.
pub fn required<T>(effect: Effect, result: Result<T, GatewayError>) -> Result<T, CoreError> {
    debug_assert_eq!(effect.policy(), Policy::Propagate, "{effect} is best effort");
    result.map_err(|source| CoreError::SideEffect { effect, source })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure() -> Result<(), GatewayError> {
        Err(GatewayError::Transport("connection reset".into()))
    }

    #[test]
    fn only_publish_send_propagates() {
        let propagating: Vec<Effect> = Effect::ALL
            .into_iter()
            .filter(|e| e.policy() == Policy::Propagate)
            .collect();
        assert_eq!(propagating, vec![Effect::PublishSend]);
    }

    #[test]
    fn settle_follows_the_table() {
        assert!(matches!(settle(Effect::FooterRefresh, failure()), Ok(None)));
        assert!(matches!(
            settle(Effect::PublishSend, failure()),
            Err(CoreError::SideEffect { effect: Effect::PublishSend, .. })
        ));
        assert!(matches!(settle(Effect::PublishSend, Ok(5)), Ok(Some(5))));
    }
}
