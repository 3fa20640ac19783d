//! # Episode7 - Effect-Interpretation Runtime
//!
//! Processes describe their side effects instead of performing them:
//! - A process yields [`Effect`] descriptors built with [`call`]
//! - The [`Driver`] performs each effect and resumes the process with its result
//! - Nested processes, receiver-bound methods and async effects are all effects
//! - Tests step a process with [`Replay`] and compare yielded descriptors, no I/O
//!
//! ## Architecture
//!
//! ```text
//!   run(factory, args)
//!          │
//!          ▼
//!   ┌──────────────┐  resume(r)   ┌─────────────┐
//!   │    Driver    │ ───────────► │   Process   │
//!   │     loop     │ ◄─────────── │             │
//!   └──────────────┘  Effect      └─────────────┘
//!          │
//!          ├── Call(f)        → f(args)
//!          ├── Bound(recv, m) → m(recv, args)
//!          └── Process(p)     → run(p, args)   (recursive)
//! ```

// Enforce strict safety at compile time
#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]
#![warn(rust_2018_idioms)]

// Re-export public API
pub mod driver;
pub mod effect;
pub mod process;
pub mod replay;
pub mod types;

// Internal utilities
pub mod observability;

pub use driver::{run, Driver, EffectTrace, Outcome, TraceEntry, TraceOutcome};
pub use effect::{
    call, call_bound, call_process, BoundCall, Callable, Completion, Effect, EffectKind, Method,
    Target,
};
pub use process::{Co, Coroutine, Process, ProcessFactory, Step, Yield};
pub use replay::{Replay, Script};
pub use types::{Config, DriverConfig, EffectError, Error, ObservabilityConfig, Result, RunId};
