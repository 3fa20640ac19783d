//! Replay - step a process by hand, feeding it scripted results.
//!
//! Nothing a process yields is ever invoked here. Tests inspect each yielded
//! effect and decide what the process sees as its result.

use serde_json::Value;
use std::fmt;

use crate::effect::Effect;
use crate::process::{Process, ProcessFactory, Step, Yield};
use crate::types::{Error, Result};

/// Effects a scripted run yielded, and the value it returned.
#[derive(Debug, Clone, PartialEq)]
pub struct Script {
    pub effects: Vec<Effect>,
    pub value: Value,
}

/// Manual stepper over a single process.
pub struct Replay {
    process: Box<dyn Process>,
    started: bool,
    finished: bool,
}

impl Replay {
    pub fn new(process: Box<dyn Process>) -> Self {
        Self {
            process,
            started: false,
            finished: false,
        }
    }

    pub fn instantiate(factory: &ProcessFactory, args: impl IntoIterator<Item = Value>) -> Result<Self> {
        let process = factory.instantiate(args.into_iter().collect())?;
        Ok(Self::new(process))
    }

    pub fn name(&self) -> &str {
        self.process.name()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// First resumption. Carries no input.
    pub fn start(&mut self) -> Result<Step> {
        if self.started {
            return Err(Error::replay(format!(
                "process `{}` already started",
                self.name()
            )));
        }
        self.started = true;
        self.step(None)
    }

    /// Answer the last yield with `value`.
    pub fn feed(&mut self, value: Value) -> Result<Step> {
        if !self.started {
            return Err(Error::replay(format!(
                "process `{}` must be started before it is fed",
                self.name()
            )));
        }
        self.step(Some(value))
    }

    /// Drive to completion, answering each yielded effect with the next response.
    pub fn script(mut self, responses: impl IntoIterator<Item = Value>) -> Result<Script> {
        let mut responses = responses.into_iter();
        let mut effects = Vec::new();
        let mut step = self.start()?;

        loop {
            let effect = match step {
                Step::Done(value) => return Ok(Script { effects, value }),
                Step::Yielded(Yield::Effect(effect)) => effect,
                Step::Yielded(Yield::Foreign(_)) => {
                    return Err(Error::malformed_yield(self.name()));
                }
            };
            effects.push(effect);

            let Some(response) = responses.next() else {
                return Err(Error::replay(format!(
                    "script for `{}` ran out of responses after {} effects",
                    self.name(),
                    effects.len()
                )));
            };
            step = self.feed(response)?;
        }
    }

    fn step(&mut self, input: Option<Value>) -> Result<Step> {
        if self.finished {
            return Err(Error::replay(format!(
                "process `{}` already finished",
                self.name()
            )));
        }
        let step = self.process.resume(input).map_err(|err| {
            self.finished = true;
            Error::from(err)
        })?;
        self.finished = step.is_done();
        Ok(step)
    }
}

impl fmt::Debug for Replay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Replay")
            .field("process", &self.name())
            .field("started", &self.started)
            .field("finished", &self.finished)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::{call, Callable};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn untouchable() -> Callable {
        Callable::sync("i_promise", |_| panic!("the tapped function should not run"))
    }

    fn emoji_poem(f: &Callable) -> ProcessFactory {
        let f = f.clone();
        ProcessFactory::coroutine("emoji_poem", move |co, args| {
            let f = f.clone();
            async move {
                let v2 = co.perform(call(&f, args)).await;
                let v3 = co.perform(call(&f, vec![v2])).await;
                co.perform(call(&f, vec![v3])).await;
                Ok(json!("done"))
            }
        })
    }

    #[test]
    fn test_step_by_step() {
        let f = untouchable();
        let mut replay = Replay::instantiate(&emoji_poem(&f), vec![json!("🔋")]).unwrap();

        let step = replay.start().unwrap();
        assert_eq!(step.effect(), Some(&call(&f, vec![json!("🔋")])));

        let step = replay.feed(json!("💡")).unwrap();
        assert_eq!(step.effect(), Some(&call(&f, vec![json!("💡")])));

        let step = replay.feed(json!("🎛")).unwrap();
        assert_eq!(step.effect(), Some(&call(&f, vec![json!("🎛")])));

        let step = replay.feed(Value::Null).unwrap();
        assert!(step.is_done());
        assert!(replay.is_finished());
        assert!(matches!(replay.feed(Value::Null), Err(Error::Replay(_))));
    }

    #[test]
    fn test_script_collects_effects() {
        let f = untouchable();
        let script = Replay::instantiate(&emoji_poem(&f), vec![json!("🔋")])
            .unwrap()
            .script(vec![json!("💡"), json!("🎛"), json!(null)])
            .unwrap();

        assert_eq!(
            script.effects,
            vec![
                call(&f, vec![json!("🔋")]),
                call(&f, vec![json!("💡")]),
                call(&f, vec![json!("🎛")]),
            ]
        );
        assert_eq!(script.value, json!("done"));
    }

    #[test]
    fn test_script_runs_out() {
        let f = untouchable();
        let err = Replay::instantiate(&emoji_poem(&f), vec![json!("🔋")])
            .unwrap()
            .script(vec![json!("💡")])
            .unwrap_err();
        assert!(err.to_string().contains("ran out of responses after 2 effects"));
    }

    #[test]
    fn test_feed_before_start() {
        let f = untouchable();
        let mut replay = Replay::instantiate(&emoji_poem(&f), vec![]).unwrap();
        assert!(matches!(replay.feed(json!(1)), Err(Error::Replay(_))));
        assert!(replay.start().is_ok());
        assert!(matches!(replay.start(), Err(Error::Replay(_))));
    }

    #[test]
    fn test_script_rejects_foreign_yield() {
        let factory = ProcessFactory::coroutine("naughty", |co, _args| async move {
            co.emit(json!("🚷")).await;
            Ok(Value::Null)
        });
        let err = Replay::instantiate(&factory, vec![])
            .unwrap()
            .script(vec![])
            .unwrap_err();
        assert!(err.is_malformed_yield());
    }
}
