//! Processes - suspendable computations that describe their effects.
//!
//! A process is resumed with the result of its previous effect and runs until
//! it either yields the next effect or finishes:
//! ```text
//!   resume(None) → Yielded(e1)
//!   resume(r1)   → Yielded(e2)
//!   resume(r2)   → Done(value)
//! ```
//! Implement [`Process`] by hand for an explicit state machine, or write the
//! body as an `async` block with [`Coroutine`].

mod coroutine;

pub use coroutine::{Co, Coroutine, Suspend};

use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::effect::{same_allocation, Effect};
use crate::types::EffectError;

/// A suspendable computation driven by repeated resumption.
///
/// `resume` is never called again while a previous call is outstanding, and
/// never after it returned `Done` or an error.
pub trait Process: Send {
    /// Name used in diagnostics.
    fn name(&self) -> &str;

    /// Run until the next suspension point. `input` is `None` on the first call
    /// and the result of the last yielded effect afterwards.
    fn resume(&mut self, input: Option<Value>) -> Result<Step, EffectError>;
}

/// Outcome of a single resumption.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// The process finished with its final value.
    Done(Value),
    /// The process suspended on a yielded value.
    Yielded(Yield),
}

impl Step {
    pub fn is_done(&self) -> bool {
        matches!(self, Step::Done(_))
    }

    /// The yielded effect, if this step suspended on one.
    pub fn effect(&self) -> Option<&Effect> {
        match self {
            Step::Yielded(Yield::Effect(effect)) => Some(effect),
            _ => None,
        }
    }
}

/// Anything a process may suspend on.
#[derive(Debug, Clone, PartialEq)]
pub enum Yield {
    /// A descriptor built with [`crate::call`] and friends.
    Effect(Effect),
    /// A value that is not an effect. The driver rejects it.
    Foreign(Value),
}

impl From<Effect> for Yield {
    fn from(effect: Effect) -> Self {
        Yield::Effect(effect)
    }
}

type FactoryFn = dyn Fn(Vec<Value>) -> Result<Box<dyn Process>, EffectError> + Send + Sync;

/// Builds a fresh [`Process`] from initial arguments.
#[derive(Clone)]
pub struct ProcessFactory {
    name: Arc<str>,
    build: Arc<FactoryFn>,
}

impl ProcessFactory {
    pub fn new<F, P>(name: impl Into<String>, build: F) -> Self
    where
        F: Fn(Vec<Value>) -> Result<P, EffectError> + Send + Sync + 'static,
        P: Process + 'static,
    {
        Self {
            name: Arc::from(name.into()),
            build: Arc::new(
                move |args: Vec<Value>| -> Result<Box<dyn Process>, EffectError> {
                    Ok(Box::new(build(args)?))
                },
            ),
        }
    }

    /// Factory whose processes are `async` bodies driven through a [`Co`] handle.
    pub fn coroutine<F, Fut>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(Co, Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, EffectError>> + Send + 'static,
    {
        let name: Arc<str> = Arc::from(name.into());
        let process_name = name.clone();
        Self {
            name,
            build: Arc::new(
                move |args: Vec<Value>| -> Result<Box<dyn Process>, EffectError> {
                    let process = Coroutine::new(process_name.to_string(), |co| body(co, args));
                    Ok(Box::new(process))
                },
            ),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Build a process. Factory errors are returned, not raised.
    pub fn instantiate(&self, args: Vec<Value>) -> Result<Box<dyn Process>, EffectError> {
        (self.build)(args)
    }

    pub fn same(&self, other: &ProcessFactory) -> bool {
        same_allocation(&self.build, &other.build)
    }
}

impl fmt::Debug for ProcessFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessFactory").field("name", &self.name).finish()
    }
}
