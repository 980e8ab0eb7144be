//! Indirector REST
//!
//! The REST terminus and the pooled reqwest transport it runs on.
//!
//! ```no_run
//! use indirector_core::{Request, Settings, Terminus};
//! use indirector_rest::{PooledTransport, RestTarget, RestTerminus};
//! use std::sync::Arc;
//!
//! # async fn run() -> indirector_core::IndirectorResult<()> {
//! let settings = Settings::new();
//! let transport = Arc::new(PooledTransport::new(settings.http().clone()));
//! let target = RestTarget::from_settings(&settings, None, None)?;
//! let nodes: RestTerminus<serde_json::Value> = RestTerminus::new("node", target, transport);
//!
//! let node = nodes.find(&Request::find("web01.example.com")).await?;
//! # Ok(())
//! # }
//! ```

pub mod pool;
pub mod response;
pub mod rest;
pub mod uri;

pub use pool::{HttpPool, PooledTransport};
pub use response::{deserialize, deserialize_multiple};
pub use rest::{RestTarget, RestTerminus, REST_TERMINUS};
pub use uri::indirection_path;
