//! Request path construction.
//!
//! `find`, `save` and `destroy` address one object:
//! `/{environment}/{indirection}/{key}`. `search` addresses the collection
//! through the plural form: `/{environment}/{indirection}s/{key}`. The key is
//! escaped as a single path segment.

use indirector_core::{Operation, Request};

/// Path for `request` against `indirection`, using `default_environment` when
/// the request does not name one.
pub fn indirection_path<M>(
    indirection: &str,
    request: &Request<M>,
    default_environment: &str,
) -> String {
    let environment = request.environment().unwrap_or(default_environment);
    let collection = match request.operation() {
        Operation::Search => format!("{}s", indirection),
        _ => indirection.to_string(),
    };
    format!(
        "/{}/{}/{}",
        urlencoding::encode(environment),
        collection,
        request.escaped_key()
    )
}
