//! Effect descriptors.
//!
//! A process never performs a side effect itself. It yields an [`Effect`]
//! naming what to invoke and with which arguments, and the driver does the rest.
//! Descriptors are inert: building one calls nothing, so a test can step a
//! process and compare what it yielded against the effects it expected.

mod callable;

pub use callable::{BoundCall, Callable, Completion, EffectFuture, Method};
pub(crate) use callable::same_allocation;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::process::ProcessFactory;

/// What an effect invokes.
#[derive(Clone)]
pub enum Target {
    /// A plain effect function.
    Call(Callable),
    /// A method run against an implicit receiver.
    Bound(BoundCall),
    /// Another process, driven to completion before the result is fed back.
    Process(ProcessFactory),
}

/// Kind of target, for logs and traces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectKind {
    Call,
    Bound,
    Process,
}

impl Target {
    pub fn kind(&self) -> EffectKind {
        match self {
            Target::Call(_) => EffectKind::Call,
            Target::Bound(_) => EffectKind::Bound,
            Target::Process(_) => EffectKind::Process,
        }
    }

    /// Name of the function, method or process factory.
    pub fn label(&self) -> &str {
        match self {
            Target::Call(callable) => callable.name(),
            Target::Bound(bound) => bound.method_name(),
            Target::Process(factory) => factory.name(),
        }
    }
}

impl PartialEq for Target {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Target::Call(a), Target::Call(b)) => a.same(b),
            (Target::Bound(a), Target::Bound(b)) => a.same(b),
            (Target::Process(a), Target::Process(b)) => a.same(b),
            _ => false,
        }
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Call(callable) => f.debug_tuple("Call").field(&callable.name()).finish(),
            Target::Bound(bound) => f.debug_tuple("Bound").field(&bound.method_name()).finish(),
            Target::Process(factory) => f.debug_tuple("Process").field(&factory.name()).finish(),
        }
    }
}

/// An effect descriptor: perform `target` with `args` and feed back the result.
///
/// Two descriptors are equal when their targets are the same function (by
/// identity, not by name) and their arguments are equal in order.
#[derive(Clone, PartialEq)]
pub struct Effect {
    target: Target,
    args: Vec<Value>,
}

impl Effect {
    pub fn new(target: Target, args: impl IntoIterator<Item = Value>) -> Self {
        Self {
            target,
            args: args.into_iter().collect(),
        }
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn kind(&self) -> EffectKind {
        self.target.kind()
    }

    pub fn label(&self) -> &str {
        self.target.label()
    }

    pub fn into_parts(self) -> (Target, Vec<Value>) {
        (self.target, self.args)
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("target", &self.target)
            .field("args", &self.args)
            .finish()
    }
}

/// Describe a call to `callable` with `args`. Nothing is invoked.
pub fn call(callable: &Callable, args: impl IntoIterator<Item = Value>) -> Effect {
    Effect::new(Target::Call(callable.clone()), args)
}

/// Describe a call to `method` with `receiver` as its implicit context.
pub fn call_bound<T>(
    receiver: Arc<T>,
    method: &Method<T>,
    args: impl IntoIterator<Item = Value>,
) -> Effect
where
    T: Send + Sync + 'static,
{
    Effect::new(Target::Bound(method.bind(receiver)), args)
}

/// Describe running a nested process built by `factory` from `args`.
pub fn call_process(factory: &ProcessFactory, args: impl IntoIterator<Item = Value>) -> Effect {
    Effect::new(Target::Process(factory.clone()), args)
}
