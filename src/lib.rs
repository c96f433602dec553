//! Server-side evaluation of compiled frontend modules.
//!
//! Two halves:
//!
//! - [`build`] turns a module source path into a browser bundle and a server
//!   bundle, in development or production mode, and reports what the result
//!   depends on.
//! - [`worker`] keeps one interpreter process alive and runs generated
//!   snippets in it; [`eval`] uses it to call into server bundles.
//!
//! [`engine::Engine`] wires both together, with an optional [`cache`] in
//! front of evaluation.
//!
//! ```no_run
//! use ssrd::config::SsrConfig;
//! use ssrd::engine::Engine;
//!
//! let engine = Engine::new(SsrConfig::new().with_root("app/assets/purs"))?;
//! engine.build("src/EntryPoints/Home.purs")?;
//! let html = engine.server_side_eval(
//!     "src/EntryPoints/Home.purs",
//!     "loadModule => loadModule().boot.renderToString({})",
//! )?;
//! # Ok::<(), ssrd::error::SsrError>(())
//! ```

pub mod build;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod eval;
pub mod logging;
pub mod paths;
pub mod worker;

pub use engine::Engine;
pub use error::{Result, SsrError};
