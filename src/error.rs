//! The node's error taxonomy (spec §7).

use crate::message::Message;
use crate::pointer::Pointer;
use thiserror::Error;

/// Errors produced while constructing a `State`/`Node`. Always returned, never panics.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("successor list has length {actual}, expected {expected}")]
    WrongSuccListLen { actual: usize, expected: usize },
    #[error("can't start without a known bootstrap peer and no pre-populated successor list")]
    MissingBootstrapPeer,
    #[error("node is already started")]
    AlreadyStarted,
}

/// Errors raised while running the node's state machine. Fatal variants cause the main
/// loop to return `Err`; recoverable variants are logged and the loop continues.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NodeError {
    /// Recoverable: an incoming message matched no server kind and no in-flight query.
    /// Typically a late response after a timeout.
    #[error("unexpected message {message:?} from {from}")]
    UnexpectedMessage { from: Pointer, message: Message },

    /// Fatal: a query was started while one was already in flight.
    #[error("attempted to start a query while one to {0} was already in flight")]
    InterruptedQuery(Pointer),

    /// Fatal in principle, statically unreachable in practice: `Action` is a closed enum,
    /// so every continuation result is one of its variants. Kept for exhaustive matches.
    #[error("continuation produced a result outside the Action set")]
    BadQueryCallbackResult,

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl NodeError {
    /// Fatal errors indicate a state-machine bug and should terminate the node's main
    /// loop; recoverable errors are logged and execution continues.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            NodeError::InterruptedQuery(_) | NodeError::BadQueryCallbackResult | NodeError::Config(_)
        )
    }
}
