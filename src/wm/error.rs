//! Error types and the protocol error policy.
//!
//! Requests against windows that a client destroyed concurrently come back as
//! X11 errors. Those are routed to an [`ErrorPolicy`] and never end the
//! session; only a broken connection does.

use thiserror::Error;
use tracing::debug;
use x11rb::errors::{ConnectError, ConnectionError, ReplyError, ReplyOrIdError};
use x11rb::x11_utils::X11Error;

/// Everything that can go wrong inside the window manager
#[derive(Debug, Error)]
pub enum WmError {
    #[error("failed to connect to the X server")]
    Connect(#[from] ConnectError),

    #[error("lost the connection to the X server")]
    Connection(#[from] ConnectionError),

    #[error("X11 protocol error: {0:?}")]
    Protocol(X11Error),

    #[error("X11 resource ids exhausted")]
    IdsExhausted,

    #[error("another window manager is already running")]
    AnotherWm,

    #[error("duplicate key binding (modifiers 0x{modifiers:x}, keysym 0x{keysym:x})")]
    DuplicateBinding { modifiers: u16, keysym: u32 },

    #[error("command contains a NUL byte: {0:?}")]
    InvalidCommand(String),

    #[error("failed to spawn `{command}`")]
    Spawn {
        command: String,
        #[source]
        source: nix::Error,
    },

    #[error("failed to ignore SIGCHLD")]
    Signal(#[source] nix::Error),
}

impl From<ReplyError> for WmError {
    fn from(err: ReplyError) -> Self {
        match err {
            ReplyError::ConnectionError(e) => Self::Connection(e),
            ReplyError::X11Error(e) => Self::Protocol(e),
        }
    }
}

impl From<ReplyOrIdError> for WmError {
    fn from(err: ReplyOrIdError) -> Self {
        match err {
            ReplyOrIdError::IdsExhausted => Self::IdsExhausted,
            ReplyOrIdError::ConnectionError(e) => Self::Connection(e),
            ReplyOrIdError::X11Error(e) => Self::Protocol(e),
        }
    }
}

/// Decides what happens with protocol errors.
///
/// The event loop always continues after calling the policy, so an
/// implementation can only observe errors, not escalate them.
pub trait ErrorPolicy {
    fn on_protocol_error(&mut self, error: &X11Error);
}

/// Default policy: log and carry on.
#[derive(Debug, Default, Clone, Copy)]
pub struct IgnoreErrors;

impl ErrorPolicy for IgnoreErrors {
    fn on_protocol_error(&mut self, error: &X11Error) {
        debug!("Ignoring X11 error: {:?}", error);
    }
}
