//! Indirector Core - Request Model and Terminus Contract
//!
//! Shared vocabulary for every other crate: the [`Request`] value object, the
//! [`Terminus`] backend contract, payload [`Model`]s and their formats, the
//! error taxonomy, process [`Settings`], the HTTP transport seam, and the
//! expiring value cache.

pub mod cacher;
pub mod error;
pub mod model;
pub mod request;
pub mod settings;
pub mod terminus;
pub mod transport;
pub mod watermark;

pub use cacher::{CachedAttr, ExpirationClock, Expirer, ValueCache};
pub use error::{
    ConfigError, FormatError, IndirectorError, IndirectorResult, RemoteError, StoreError,
};
pub use model::{Format, Model, JSON, YAML};
pub use request::{Operation, OperationParseError, Request, RequestOptions};
pub use settings::{
    HttpConfig, Settings, DEFAULT_PORT_SETTING, DEFAULT_SERVER_SETTING, ENVIRONMENT_SETTING,
};
pub use terminus::{dispatch, Outcome, Terminus, TerminusRef};
pub use transport::{HttpMethod, HttpRequest, HttpResponse, HttpTransport};
pub use watermark::Watermark;
