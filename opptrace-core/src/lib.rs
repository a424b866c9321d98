//! # opptrace-core
//!
//! Core library for opptrace - an automation trace inspector.
//!
//! This library provides:
//! - Domain types for automation/script runs and their recorded steps
//! - Path addressing from trace steps back into the run's config
//! - Script graphs and timelines built from a run
//! - Logbook lookups joined to runs by context, with a coalescing cache
//! - Run selection that survives purged runs
//! - A mock backend for demos and tests
//! - Configuration management and logging infrastructure
//!
//! ## Architecture
//!
//! A run is read from the backend over two transports:
//! - **Socket** ([`transport::SocketTransport`]): `trace/list`, `trace/get`,
//!   `trace/contexts`
//! - **REST** ([`transport::ApiTransport`]): `logbook/{start}`
//!
//! Everything downstream of loading is pure: [`resolve`] walks trace paths
//! through the config, [`graph`] and [`timeline`] build views, and a path that
//! does not resolve is reported as a config mismatch rather than papered over.
//!
//! ## Example
//!
//! ```rust,no_run
//! use opptrace_core::{build_timeline, AutomationTraceExtended};
//!
//! let raw = std::fs::read_to_string("trace.json").expect("failed to read trace");
//! let trace: AutomationTraceExtended = serde_json::from_str(&raw).expect("invalid trace");
//!
//! trace.validate().expect("trace does not match its config");
//! for event in build_timeline(&trace, &[]).expect("failed to build timeline") {
//!     println!("{} {}", event.at, event.render());
//! }
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use error::{Error, Result};
pub use graph::{GraphNode, ScriptGraph};
pub use logbook::{LogbookCache, LogbookEntry};
pub use mock::MockBackend;
pub use path::TracePath;
pub use resolve::resolve;
pub use timeline::{build_timeline, TimelineEvent, TimelineEventKind};
pub use trace::get_trigger_path_from_trace;
pub use transport::{ApiTransport, RestClient, SocketTransport};
pub use types::*;
pub use viewer::{Notice, RunPicker};

// Public modules
pub mod config;
pub mod error;
pub mod graph;
pub mod logbook;
pub mod logging;
pub mod mock;
pub mod path;
pub mod resolve;
pub mod timeline;
pub mod trace;
pub mod transport;
pub mod types;
pub mod viewer;
