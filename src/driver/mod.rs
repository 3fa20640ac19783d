//! Driver - resumes processes and performs the effects they yield.
//!
//! The loop for one process:
//! ```text
//!   resume(input) ──► Done(v) ───────────────► Ok(v)
//!        │
//!        └──► Yielded(Foreign) ──────────────► Err(MalformedYield)
//!        │
//!        └──► Yielded(Effect) ─► perform ─┬──► Ok(r): input = r, loop
//!                                         └──► Err(e) ► Err(e)
//! ```
//! Effects are performed strictly one at a time, in yield order. A nested
//! process is driven to completion through the entry point before its result is
//! fed back to its parent. Every failure (effect error, factory error, panic)
//! comes back through the returned [`Outcome`]; nothing escapes synchronously.

mod trace;

pub use trace::{EffectTrace, TraceEntry, TraceOutcome};
use trace::TraceRecorder;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use std::panic::{self, AssertUnwindSafe};
use tokio::task::JoinHandle;
use tracing::{debug, info_span, warn, Instrument};

use crate::effect::{Completion, Effect, Target};
use crate::process::{Process, ProcessFactory, Step, Yield};
use crate::types::{Config, DriverConfig, Error, Result, RunId};

/// Asynchronous result of a whole run.
pub type Outcome = BoxFuture<'static, Result<Value>>;

/// Drives processes to completion.
///
/// Cheap to clone; holds only configuration. Independent runs share nothing.
#[derive(Debug, Clone, Default)]
pub struct Driver {
    config: DriverConfig,
}

impl Driver {
    pub fn new(config: DriverConfig) -> Self {
        Self { config }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.driver.clone())
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Instantiate a process from `factory` and `args`, then drive it.
    ///
    /// The factory runs when the outcome is first polled, so factory failures
    /// surface as a failed outcome.
    pub fn run(&self, factory: &ProcessFactory, args: impl IntoIterator<Item = Value>) -> Outcome {
        self.start(factory.clone(), args.into_iter().collect(), None, 0)
    }

    /// Like [`Driver::run`], also returning the trace of every performed effect.
    pub fn run_traced(
        &self,
        factory: &ProcessFactory,
        args: impl IntoIterator<Item = Value>,
    ) -> BoxFuture<'static, (Result<Value>, EffectTrace)> {
        let recorder = TraceRecorder::default();
        let outcome = self.start(
            factory.clone(),
            args.into_iter().collect(),
            Some(recorder.clone()),
            0,
        );
        async move {
            let result = outcome.await;
            (result, recorder.finish())
        }
        .boxed()
    }

    /// Drive an already instantiated process.
    pub fn drive(&self, process: Box<dyn Process>) -> Outcome {
        let driver = self.clone();
        let span = info_span!("run", run_id = %RunId::new(), process = process.name(), depth = 0u32);
        async move { driver.drive_at(process, None, 0).await }
            .instrument(span)
            .boxed()
    }

    /// Run on the Tokio runtime as an independent task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(
        &self,
        factory: &ProcessFactory,
        args: impl IntoIterator<Item = Value>,
    ) -> JoinHandle<Result<Value>> {
        tokio::spawn(self.run(factory, args))
    }

    fn start(
        &self,
        factory: ProcessFactory,
        args: Vec<Value>,
        trace: Option<TraceRecorder>,
        depth: u32,
    ) -> Outcome {
        let driver = self.clone();
        let span = info_span!("run", run_id = %RunId::new(), process = factory.name(), depth);
        async move {
            debug!(args = args.len(), "instantiating process");
            let process = driver.guard(factory.name(), || factory.instantiate(args))??;
            driver.drive_at(process, trace, depth).await
        }
        .instrument(span)
        .boxed()
    }

    async fn drive_at(
        &self,
        mut process: Box<dyn Process>,
        trace: Option<TraceRecorder>,
        depth: u32,
    ) -> Result<Value> {
        let name = process.name().to_string();
        let mut input: Option<Value> = None;
        let mut performed: usize = 0;

        loop {
            let resumed = input.take();
            let step = self.guard(&name, || process.resume(resumed))??;

            let effect = match step {
                Step::Done(value) => {
                    debug!(effects = performed, "process completed");
                    return Ok(value);
                }
                Step::Yielded(Yield::Effect(effect)) => effect,
                Step::Yielded(Yield::Foreign(value)) => {
                    warn!(yielded = %value, "process yielded a value that is not an effect");
                    return Err(Error::malformed_yield(name));
                }
            };

            performed += 1;
            input = Some(self.perform(&name, effect, trace.as_ref(), depth).await?);
        }
    }

    async fn perform(
        &self,
        process: &str,
        effect: Effect,
        trace: Option<&TraceRecorder>,
        depth: u32,
    ) -> Result<Value> {
        let kind = effect.kind();
        let label = effect.label().to_string();
        let (target, args) = effect.into_parts();
        debug!(effect = %label, ?kind, args = args.len(), "performing effect");

        let open = trace.map(|recorder| {
            let recorded = if self.config.record_args {
                args.clone()
            } else {
                Vec::new()
            };
            recorder.open(depth, process, &label, kind, recorded)
        });

        let outcome = match target {
            Target::Process(factory) => self.start(factory, args, trace.cloned(), depth + 1).await,
            Target::Call(callable) => self.settle(process, || callable.invoke(args)).await,
            Target::Bound(bound) => self.settle(process, || bound.invoke(args)).await,
        };

        if let Err(err) = &outcome {
            debug!(effect = %label, error = %err, "effect failed");
        }
        if let (Some(recorder), Some(open)) = (trace, open) {
            let settled = match &outcome {
                Ok(value) => TraceOutcome::Resolved {
                    value: value.clone(),
                },
                Err(err) => TraceOutcome::Rejected {
                    error: err.to_string(),
                },
            };
            recorder.close(open, settled);
        }

        outcome
    }

    /// Invoke an effect function and wait for its result, sync or async alike.
    async fn settle(&self, process: &str, invoke: impl FnOnce() -> Completion) -> Result<Value> {
        match self.guard(process, invoke)? {
            Completion::Ready(result) => Ok(result?),
            Completion::Pending(future) if self.config.catch_panics => {
                match AssertUnwindSafe(future).catch_unwind().await {
                    Ok(result) => Ok(result?),
                    Err(payload) => {
                        warn!(process, "effect panicked");
                        Err(Error::panicked(process, payload))
                    }
                }
            }
            Completion::Pending(future) => Ok(future.await?),
        }
    }

    fn guard<T>(&self, process: &str, f: impl FnOnce() -> T) -> Result<T> {
        if !self.config.catch_panics {
            return Ok(f());
        }
        panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| {
            warn!(process, "panic caught by driver");
            Error::panicked(process, payload)
        })
    }
}

/// Run a process with the default driver configuration.
pub fn run(factory: &ProcessFactory, args: impl IntoIterator<Item = Value>) -> Outcome {
    Driver::default().run(factory, args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::{call, call_process, Callable, EffectKind};
    use crate::types::EffectError;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tracing_test::traced_test;

    fn echo() -> Callable {
        Callable::sync("echo", |mut args| Ok(args.pop().unwrap_or(Value::Null)))
    }

    #[tokio::test]
    async fn test_resolves_final_value() {
        let f = echo();
        let factory = ProcessFactory::coroutine("double_echo", move |co, args| {
            let f = f.clone();
            async move {
                let a = co.perform(call(&f, args)).await;
                let b = co.perform(call(&f, vec![json!("second")])).await;
                Ok(json!([a, b]))
            }
        });

        let value = run(&factory, vec![json!("first")]).await.unwrap();
        assert_eq!(value, json!(["first", "second"]));
    }

    #[tokio::test]
    async fn test_first_resume_gets_no_input() {
        struct Probe;
        impl Process for Probe {
            fn name(&self) -> &str {
                "probe"
            }
            fn resume(&mut self, input: Option<Value>) -> std::result::Result<Step, EffectError> {
                Ok(Step::Done(json!(input.is_none())))
            }
        }

        let value = Driver::default().drive(Box::new(Probe)).await.unwrap();
        assert_eq!(value, json!(true));
    }

    #[tokio::test]
    async fn test_factory_error_is_an_outcome() {
        let factory = ProcessFactory::new("broken", |_| -> std::result::Result<crate::process::Coroutine, EffectError> {
            Err(EffectError::msg("cannot build"))
        });

        let outcome = run(&factory, vec![]);
        let err = outcome.await.unwrap_err();
        assert_eq!(err.to_string(), "cannot build");
    }

    #[tokio::test]
    async fn test_resume_error_is_an_outcome() {
        let factory = ProcessFactory::coroutine("early_exit", |_co, _args| async {
            Err(EffectError::msg("gave up"))
        });

        let err = run(&factory, vec![]).await.unwrap_err();
        assert_eq!(err.to_string(), "gave up");
    }

    #[tokio::test]
    async fn test_malformed_yield_invokes_nothing() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let f = Callable::sync("counted", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Value::Null)
        });
        let factory = ProcessFactory::coroutine("naughty", move |co, _args| {
            let f = f.clone();
            async move {
                co.emit(json!({"fn": "noBueno", "args": ["🚷"]})).await;
                co.perform(call(&f, vec![])).await;
                Ok(Value::Null)
            }
        });

        let err = run(&factory, vec![]).await.unwrap_err();
        assert!(matches!(&err, Error::MalformedYield { process } if process == "naughty"));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_sync_panic_becomes_error() {
        let boom = Callable::sync("boom", |_| panic!("kaboom"));
        let factory = ProcessFactory::coroutine("fragile", move |co, _args| {
            let boom = boom.clone();
            async move { Ok(co.perform(call(&boom, vec![])).await) }
        });

        let err = run(&factory, vec![]).await.unwrap_err();
        match err {
            Error::Panicked { process, message } => {
                assert_eq!(process, "fragile");
                assert_eq!(message, "kaboom");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_async_panic_becomes_error() {
        fn explode() -> std::result::Result<Value, EffectError> {
            panic!("later kaboom")
        }

        let boom = Callable::future("boom_later", |_| async move {
            tokio::task::yield_now().await;
            explode()
        });
        let factory = ProcessFactory::coroutine("fragile", move |co, _args| {
            let boom = boom.clone();
            async move { Ok(co.perform(call(&boom, vec![])).await) }
        });

        let err = run(&factory, vec![]).await.unwrap_err();
        assert!(matches!(err, Error::Panicked { ref message, .. } if message == "later kaboom"));
    }

    #[tokio::test]
    async fn test_factory_panic_becomes_error() {
        let factory = ProcessFactory::new(
            "boom_factory",
            |_| -> std::result::Result<crate::process::Coroutine, EffectError> {
                panic!("factory exploded")
            },
        );

        let err = run(&factory, vec![]).await.unwrap_err();
        assert!(matches!(
            &err,
            Error::Panicked { process, message }
                if process == "boom_factory" && message == "factory exploded"
        ));
    }

    #[tokio::test]
    async fn test_body_panic_during_resume_becomes_error() {
        fn shatter() -> std::result::Result<Value, EffectError> {
            panic!("body exploded")
        }

        let f = echo();
        let factory = ProcessFactory::coroutine("brittle", move |co, _args| {
            let f = f.clone();
            async move {
                co.perform(call(&f, vec![json!("first")])).await;
                shatter()
            }
        });

        let err = run(&factory, vec![]).await.unwrap_err();
        assert!(matches!(
            &err,
            Error::Panicked { process, message }
                if process == "brittle" && message == "body exploded"
        ));
    }

    #[tokio::test]
    async fn test_concurrent_suspensions_invoke_nothing() {
        let invoked = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen = invoked.clone();
        let f = Callable::sync("recorded", move |args| {
            seen.lock().unwrap().extend(args);
            Ok(Value::Null)
        });
        let factory = ProcessFactory::coroutine("joiner", move |co, _args| {
            let f = f.clone();
            async move {
                let (a, b) = futures::join!(
                    co.perform(call(&f, vec![json!("A")])),
                    co.perform(call(&f, vec![json!("B")]))
                );
                Ok(json!([a, b]))
            }
        });

        let err = run(&factory, vec![]).await.unwrap_err();
        assert!(err.to_string().contains("yielded twice without being resumed"));
        assert!(invoked.lock().unwrap().is_empty());
    }

    #[tokio::test]
    #[should_panic(expected = "unguarded")]
    async fn test_panics_propagate_when_not_caught() {
        let driver = Driver::new(DriverConfig {
            catch_panics: false,
            ..DriverConfig::default()
        });
        let boom = Callable::sync("boom", |_| panic!("unguarded"));
        let factory = ProcessFactory::coroutine("fragile", move |co, _args| {
            let boom = boom.clone();
            async move { Ok(co.perform(call(&boom, vec![])).await) }
        });

        let _ = driver.run(&factory, vec![]).await;
    }

    #[tokio::test]
    async fn test_traced_run_records_nested_effects() {
        let f = echo();
        let inner_f = f.clone();
        let inner = ProcessFactory::coroutine("inner", move |co, args| {
            let f = inner_f.clone();
            async move { Ok(co.perform(call(&f, args)).await) }
        });
        let outer = ProcessFactory::coroutine("outer", move |co, _args| {
            let f = f.clone();
            let inner = inner.clone();
            async move {
                let a = co.perform(call(&f, vec![json!("🔮")])).await;
                let b = co.perform(call_process(&inner, vec![json!("💰")])).await;
                Ok(json!([a, b]))
            }
        });

        let (result, trace) = Driver::default().run_traced(&outer, vec![]).await;
        assert_eq!(result.unwrap(), json!(["🔮", "💰"]));
        assert_eq!(trace.effect_names(), vec!["echo", "echo", "inner"]);

        let entries = trace.entries();
        assert_eq!((entries[0].depth, entries[0].process.as_str()), (0, "outer"));
        assert_eq!((entries[1].depth, entries[1].process.as_str()), (1, "inner"));
        assert_eq!(entries[2].kind, EffectKind::Process);
        assert_eq!(entries[2].args, vec![json!("💰")]);
        assert_eq!(
            entries[2].outcome,
            TraceOutcome::Resolved { value: json!("💰") }
        );
    }

    #[tokio::test]
    async fn test_trace_without_args_records_rejection() {
        let driver = Driver::new(DriverConfig {
            record_args: false,
            ..DriverConfig::default()
        });
        let fail = Callable::sync("fail", |_| Err(EffectError::msg("🚑")));
        let factory = ProcessFactory::coroutine("p", move |co, _args| {
            let fail = fail.clone();
            async move { Ok(co.perform(call(&fail, vec![json!("secret")])).await) }
        });

        let (result, trace) = driver.run_traced(&factory, vec![]).await;
        assert!(result.is_err());
        assert_eq!(trace.len(), 1);
        assert!(trace.entries()[0].args.is_empty());
        assert_eq!(
            trace.entries()[0].outcome,
            TraceOutcome::Rejected { error: "🚑".into() }
        );
    }

    #[tokio::test]
    async fn test_spawned_runs_are_independent() {
        let slow = Callable::future("slow", |args| async move {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            Ok(args.into_iter().next().unwrap_or(Value::Null))
        });
        let factory = ProcessFactory::coroutine("worker", move |co, args| {
            let slow = slow.clone();
            async move { Ok(co.perform(call(&slow, args)).await) }
        });

        let driver = Driver::default();
        let handles: Vec<_> = (0..8).map(|i| driver.spawn(&factory, vec![json!(i)])).collect();
        for (i, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.await.unwrap().unwrap(), json!(i));
        }
    }

    #[tokio::test]
    #[traced_test]
    async fn test_logs_effects_and_malformed_yields() {
        let f = echo();
        let factory = ProcessFactory::coroutine("chatty", move |co, _args| {
            let f = f.clone();
            async move {
                co.perform(call(&f, vec![json!(1)])).await;
                co.emit(json!("not an effect")).await;
                Ok(Value::Null)
            }
        });

        let err = run(&factory, vec![]).await.unwrap_err();
        assert!(err.is_malformed_yield());
        assert!(logs_contain("performing effect"));
        assert!(logs_contain("not an effect"));
    }
}
