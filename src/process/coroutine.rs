//! `async` bodies as processes.
//!
//! The body receives a [`Co`] handle and awaits `co.perform(effect)` at every
//! suspension point. `resume` polls the body exactly once with a no-op waker:
//! the body either finishes or parks on a [`Suspend`] that left its yield in
//! the shared channel. Awaiting anything other than `Co` is reported as an
//! error, since nothing would ever wake the body again.

use futures::task::noop_waker_ref;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use super::{Process, Step, Yield};
use crate::effect::Effect;
use crate::types::EffectError;

type Body = Pin<Box<dyn Future<Output = Result<Value, EffectError>> + Send>>;

#[derive(Debug, Default)]
struct Channel {
    /// Value handed to the parked `Suspend` by the next resume.
    input: Option<Value>,
    /// Value the body suspended on, picked up by the current resume.
    output: Option<Yield>,
    /// Set when a second suspension started before the first was answered.
    overlapped: bool,
}

fn lock(channel: &Mutex<Channel>) -> MutexGuard<'_, Channel> {
    channel.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle a coroutine body uses to suspend.
#[derive(Clone)]
pub struct Co {
    channel: Arc<Mutex<Channel>>,
}

impl Co {
    /// Suspend on `effect`; resolves to the value the driver feeds back.
    pub fn perform(&self, effect: Effect) -> Suspend {
        self.suspend(Yield::Effect(effect))
    }

    /// Suspend on a value that is not an effect. A driver rejects this.
    pub fn emit(&self, value: Value) -> Suspend {
        self.suspend(Yield::Foreign(value))
    }

    fn suspend(&self, yielded: Yield) -> Suspend {
        Suspend {
            channel: self.channel.clone(),
            yielded: Some(yielded),
        }
    }
}

impl fmt::Debug for Co {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Co").finish_non_exhaustive()
    }
}

/// Future returned by [`Co::perform`] and [`Co::emit`].
#[derive(Debug)]
#[must_use = "a suspension does nothing unless awaited"]
pub struct Suspend {
    channel: Arc<Mutex<Channel>>,
    yielded: Option<Yield>,
}

impl Future for Suspend {
    type Output = Value;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Value> {
        let this = self.get_mut();
        let mut channel = lock(&this.channel);
        if let Some(yielded) = this.yielded.take() {
            if channel.output.is_some() {
                channel.overlapped = true;
            } else {
                channel.output = Some(yielded);
            }
            return Poll::Pending;
        }
        match channel.input.take() {
            Some(value) => Poll::Ready(value),
            None => Poll::Pending,
        }
    }
}

/// A [`Process`] backed by an `async` body.
pub struct Coroutine {
    name: String,
    channel: Arc<Mutex<Channel>>,
    body: Option<Body>,
    started: bool,
}

impl Coroutine {
    pub fn new<F, Fut>(name: impl Into<String>, body: F) -> Self
    where
        F: FnOnce(Co) -> Fut,
        Fut: Future<Output = Result<Value, EffectError>> + Send + 'static,
    {
        let channel = Arc::new(Mutex::new(Channel::default()));
        let co = Co {
            channel: channel.clone(),
        };
        Self {
            name: name.into(),
            channel,
            body: Some(Box::pin(body(co))),
            started: false,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.body.is_none()
    }
}

impl Process for Coroutine {
    fn name(&self) -> &str {
        &self.name
    }

    fn resume(&mut self, input: Option<Value>) -> Result<Step, EffectError> {
        let Some(body) = self.body.as_mut() else {
            return Err(EffectError::msg(format!(
                "process `{}` resumed after it finished",
                self.name
            )));
        };

        // The first resume only starts the body; there is no suspension to answer yet.
        if self.started {
            lock(&self.channel).input = Some(input.unwrap_or(Value::Null));
        }
        self.started = true;

        let mut cx = Context::from_waker(noop_waker_ref());
        let polled = body.as_mut().poll(&mut cx);
        match polled {
            Poll::Ready(result) => {
                self.body = None;
                result.map(Step::Done)
            }
            Poll::Pending => {
                let mut channel = lock(&self.channel);
                if channel.overlapped {
                    channel.output = None;
                    drop(channel);
                    self.body = None;
                    return Err(EffectError::msg(format!(
                        "process `{}` yielded twice without being resumed; effects must be awaited one at a time",
                        self.name
                    )));
                }
                let yielded = channel.output.take();
                drop(channel);
                match yielded {
                    Some(yielded) => Ok(Step::Yielded(yielded)),
                    None => {
                        self.body = None;
                        Err(EffectError::msg(format!(
                            "process `{}` suspended without yielding; only `Co` may be awaited inside a process",
                            self.name
                        )))
                    }
                }
            }
        }
    }
}

impl fmt::Debug for Coroutine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coroutine")
            .field("name", &self.name)
            .field("started", &self.started)
            .field("finished", &self.is_finished())
            .finish()
    }
}
