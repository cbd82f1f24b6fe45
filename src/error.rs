use std::rc::Rc;

use crate::value::Name;

/// Result type used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised by reactive values, their cells and the streams behind them.
///
/// Everything here signals a precondition violation by the caller except
/// [`Error::NotInitialized`], which only means the value has not been seeded yet.
/// The type is `Clone` because a single stream error is fanned out to every
/// subscriber of a cell.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// A cell was requested for a value that was never given a name.
    #[error("reactive value has no name, call `named` before using it")]
    MissingName,

    /// The value was read before anything was written or seeded.
    #[error("property '{name}' is not initialized yet")]
    NotInitialized {
        /// Name of the value.
        name: Name,
    },

    /// A second write to a read-only (write-once) value.
    #[error("cannot modify read-only property '{name}'")]
    ReadOnly {
        /// Name of the value.
        name: Name,
    },

    /// Access to a cell after it was disposed.
    #[error("property '{name}' has been disposed")]
    Disposed {
        /// Name of the value.
        name: Name,
    },

    /// A cell or object was disposed twice.
    #[error("'{name}' has already been disposed")]
    AlreadyDisposed {
        /// Name of the value, or the type name for object-level disposal.
        name: Name,
    },

    /// A composition function was called without sources.
    #[error("at least one source value is required")]
    EmptySourceList,

    /// `pipe` was called without modifiers.
    #[error("at least one modifier is required")]
    MissingModifier,

    /// The operation is not valid in the current state of the owner or its store.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The live stream of a cell failed; the cell no longer caches values.
    #[error("property '{name}' faulted: {source}")]
    Faulted {
        /// Name of the value.
        name: Name,
        /// The error delivered on the stream.
        source: Box<Error>,
    },

    /// A validator rejected a value.
    #[error("{0}")]
    Validation(String),

    /// A foreign error raised inside a stream operator or factory.
    #[error("{0}")]
    Source(Rc<dyn std::error::Error>),
}

impl Error {
    /// Shorthand for a validator rejection.
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }

    /// Wraps any error so it can travel a stream error channel.
    pub fn foreign(err: impl std::error::Error + 'static) -> Self {
        Error::Source(Rc::new(err))
    }
}
