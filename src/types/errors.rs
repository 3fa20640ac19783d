//! Application error types.
//!
//! The driver manufactures exactly one error of its own (`MalformedYield`).
//! Everything raised by effects, nested processes or process factories travels
//! inside [`EffectError`], which shares the original error so callers can
//! compare it by identity or downcast it.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Application result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error enum for the runtime.
#[derive(Error, Debug)]
pub enum Error {
    /// A process yielded something that was not built with [`crate::call`].
    #[error("process `{process}` yielded a value that is not an effect: every yield requires using `episode7::call`")]
    MalformedYield { process: String },

    /// An effect, nested process or factory failed. Display and source are the original error's.
    #[error(transparent)]
    Effect(#[from] EffectError),

    /// A process, factory or effect panicked while the driver was running it.
    #[error("process `{process}` panicked: {message}")]
    Panicked { process: String, message: String },

    /// Misuse of the replay harness.
    #[error("replay error: {0}")]
    Replay(String),

    /// Invalid configuration.
    #[error("config error: {0}")]
    Config(String),

    /// Serialization/deserialization errors.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// Convenience constructors
impl Error {
    pub fn malformed_yield(process: impl Into<String>) -> Self {
        Self::MalformedYield {
            process: process.into(),
        }
    }

    pub fn panicked(process: impl Into<String>, payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(msg) = payload.downcast_ref::<&'static str>() {
            (*msg).to_string()
        } else if let Some(msg) = payload.downcast_ref::<String>() {
            msg.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::Panicked {
            process: process.into(),
            message,
        }
    }

    pub fn replay(msg: impl Into<String>) -> Self {
        Self::Replay(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// The effect error carried by this error, if any.
    pub fn as_effect(&self) -> Option<&EffectError> {
        match self {
            Error::Effect(err) => Some(err),
            _ => None,
        }
    }

    pub fn is_malformed_yield(&self) -> bool {
        matches!(self, Error::MalformedYield { .. })
    }
}

/// An error raised outside the driver, shared so that its identity survives
/// propagation through any number of nested processes.
#[derive(Clone)]
pub struct EffectError(Arc<dyn std::error::Error + Send + Sync + 'static>);

impl EffectError {
    pub fn new<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self(Arc::new(err))
    }

    /// Error carrying only a message.
    pub fn msg(msg: impl Into<String>) -> Self {
        Self::new(ErrorMessage(msg.into()))
    }

    /// True when both handles point at the same underlying error.
    pub fn same(&self, other: &EffectError) -> bool {
        Arc::as_ptr(&self.0).cast::<()>() == Arc::as_ptr(&other.0).cast::<()>()
    }

    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: std::error::Error + 'static,
    {
        self.0.downcast_ref::<E>()
    }

    pub fn inner(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        &*self.0
    }
}

impl fmt::Debug for EffectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for EffectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

impl std::error::Error for EffectError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

/// Plain message error used by [`EffectError::msg`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ErrorMessage(pub String);
