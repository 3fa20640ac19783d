//! Effect functions and their completions.

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::types::EffectError;

/// Asynchronous result of an effect.
pub type EffectFuture = BoxFuture<'static, Result<Value, EffectError>>;

/// What an effect function hands back: a value it already has, or one it will have.
pub enum Completion {
    Ready(Result<Value, EffectError>),
    Pending(EffectFuture),
}

impl Completion {
    pub fn value(value: Value) -> Self {
        Self::Ready(Ok(value))
    }

    pub fn fail(err: EffectError) -> Self {
        Self::Ready(Err(err))
    }

    pub fn pending<F>(future: F) -> Self
    where
        F: Future<Output = Result<Value, EffectError>> + Send + 'static,
    {
        Self::Pending(future.boxed())
    }
}

impl From<Result<Value, EffectError>> for Completion {
    fn from(result: Result<Value, EffectError>) -> Self {
        Self::Ready(result)
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Completion::Ready(result) => f.debug_tuple("Ready").field(result).finish(),
            Completion::Pending(_) => f.write_str("Pending(..)"),
        }
    }
}

pub(crate) type CallableFn = dyn Fn(Vec<Value>) -> Completion + Send + Sync;
type MethodFn<T> = dyn Fn(&Arc<T>, Vec<Value>) -> Completion + Send + Sync;

/// Compare two shared allocations by address, ignoring trait-object metadata.
pub(crate) fn same_allocation<T: ?Sized, U: ?Sized>(a: &Arc<T>, b: &Arc<U>) -> bool {
    Arc::as_ptr(a).cast::<()>() == Arc::as_ptr(b).cast::<()>()
}

/// A named effect function. Clones share identity; separate constructions do not.
#[derive(Clone)]
pub struct Callable {
    name: Arc<str>,
    func: Arc<CallableFn>,
}

impl Callable {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(Vec<Value>) -> Completion + Send + Sync + 'static,
    {
        Self {
            name: Arc::from(name.into()),
            func: Arc::new(func),
        }
    }

    /// Effect returning a plain value (or error) synchronously.
    pub fn sync<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(Vec<Value>) -> Result<Value, EffectError> + Send + Sync + 'static,
    {
        Self::new(name, move |args| Completion::Ready(func(args)))
    }

    /// Effect returning an asynchronous result.
    pub fn future<F, Fut>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, EffectError>> + Send + 'static,
    {
        Self::new(name, move |args| Completion::Pending(func(args).boxed()))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn invoke(&self, args: Vec<Value>) -> Completion {
        (self.func)(args)
    }

    pub fn same(&self, other: &Callable) -> bool {
        same_allocation(&self.func, &other.func)
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callable").field("name", &self.name).finish()
    }
}

/// An effect function that runs against an implicit receiver.
pub struct Method<T> {
    name: Arc<str>,
    func: Arc<MethodFn<T>>,
}

impl<T> Clone for Method<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            func: self.func.clone(),
        }
    }
}

impl<T: Send + Sync + 'static> Method<T> {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&Arc<T>, Vec<Value>) -> Completion + Send + Sync + 'static,
    {
        Self {
            name: Arc::from(name.into()),
            func: Arc::new(func),
        }
    }

    pub fn sync<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&T, Vec<Value>) -> Result<Value, EffectError> + Send + Sync + 'static,
    {
        Self::new(name, move |receiver, args| {
            Completion::Ready(func(receiver.as_ref(), args))
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bind to a receiver, producing the invocation the driver performs.
    pub fn bind(&self, receiver: Arc<T>) -> BoundCall {
        let func = self.func.clone();
        let bound = receiver.clone();
        BoundCall {
            receiver,
            method_name: self.name.clone(),
            method_addr: Arc::as_ptr(&self.func).cast::<()>() as usize,
            invoke: Arc::new(move |args: Vec<Value>| func(&bound, args)),
        }
    }
}

impl<T> fmt::Debug for Method<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method").field("name", &self.name).finish()
    }
}

/// A method paired with the receiver it runs against.
#[derive(Clone)]
pub struct BoundCall {
    receiver: Arc<dyn Any + Send + Sync>,
    method_name: Arc<str>,
    // address of the shared method body; identity only, never dereferenced
    method_addr: usize,
    invoke: Arc<CallableFn>,
}

impl BoundCall {
    pub fn receiver(&self) -> &Arc<dyn Any + Send + Sync> {
        &self.receiver
    }

    pub fn receiver_as<T: 'static>(&self) -> Option<&T> {
        self.receiver.downcast_ref::<T>()
    }

    pub fn method_name(&self) -> &str {
        &self.method_name
    }

    pub fn invoke(&self, args: Vec<Value>) -> Completion {
        (self.invoke)(args)
    }

    pub fn same(&self, other: &BoundCall) -> bool {
        self.method_addr == other.method_addr && same_allocation(&self.receiver, &other.receiver)
    }
}

impl fmt::Debug for BoundCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundCall")
            .field("method", &self.method_name)
            .finish_non_exhaustive()
    }
}
