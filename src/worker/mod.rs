//! Long-lived interpreter worker for server-side evaluation.
//!
//! Starting an interpreter per request costs hundreds of milliseconds; this
//! module keeps one process alive and feeds it snippets instead.
//!
//! # Architecture
//!
//! ```text
//!     ┌──────────────────┐   path of snippet file (one line)   ┌─────────────┐
//!     │ WorkerSupervisor │ ──────────────────────────────────▶ │   Worker    │
//!     │  (one Mutex)     │                                     │ (bootstrap  │
//!     │                  │ ◀────────────────────────────────── │   loop)     │
//!     └──────────────────┘    one bounded read, no framing     └─────────────┘
//! ```
//!
//! # Lifecycle
//!
//! - **Lazy start**: spawned on first request
//! - **Staleness restart**: replaced when a tracked key gets a newer timestamp
//! - **Retirement**: killed after a timeout, an I/O failure, or a response that
//!   may have been truncated
//! - **Shutdown**: killed and its bootstrap script removed on engine drop

mod ipc;
mod proc;
mod signals;
mod spawn;

pub mod interpreter;
pub mod protocol;
pub mod staleness;
pub mod supervisor;

pub use interpreter::{Interpreter, InterpreterKind, NodeInterpreter, ShellInterpreter};
pub use protocol::{EvalRequest, ExchangeOutcome};
pub use supervisor::{SupervisorConfig, SupervisorStats, WorkerSupervisor};
