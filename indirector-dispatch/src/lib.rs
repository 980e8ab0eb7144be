//! Indirector Dispatch
//!
//! Binds model kinds to termini:
//! - [`Indirection`]: one named kind, its terminus class and optional cache
//!   class, resolved lazily against the process [`Settings`]
//! - [`IndirectionRegistry`]: the explicit, constructed registry of
//!   indirections
//! - [`RetryPolicy`]: caller-side retry for transient failures
//! - [`telemetry`]: tracing subscriber setup
//!
//! ```no_run
//! use indirector_core::{Request, Settings};
//! use indirector_dispatch::{IndirectionConfig, IndirectionRegistry};
//! use std::sync::Arc;
//!
//! # async fn run() -> indirector_core::IndirectorResult<()> {
//! let settings = Arc::new(Settings::load()?);
//! let registry = IndirectionRegistry::with_pooled_transport(settings);
//! registry.register::<serde_json::Value>(
//!     IndirectionConfig::new("node", "rest").with_cache_class("memory"),
//! )?;
//!
//! let nodes = registry.lookup::<serde_json::Value>("node")?;
//! let node = nodes.find(&Request::find("web01.example.com")).await?;
//! # Ok(())
//! # }
//! ```
//!
//! [`Settings`]: indirector_core::Settings

pub mod indirection;
pub mod registry;
pub mod retry;
pub mod telemetry;

pub use indirection::{Indirection, IndirectionConfig, TerminusBuilder, TerminusContext};
pub use registry::IndirectionRegistry;
pub use retry::RetryPolicy;
pub use telemetry::{init_tracing, TelemetryConfig};
