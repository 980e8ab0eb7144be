//! Response interpretation.
//!
//! - `404` means the object does not exist and is not an error.
//! - `2xx` must carry a `content-type`; the body is handed to the model's
//!   converter for that type.
//! - Anything else is a [`RemoteError`] carrying status, message and body.

use indirector_core::{HttpResponse, IndirectorError, IndirectorResult, Model, RemoteError};

/// Decode a single object. `Ok(None)` on `404`.
pub fn deserialize<M: Model>(response: &HttpResponse, url: &str) -> IndirectorResult<Option<M>> {
    match payload(response, url)? {
        Some((content_type, body)) => Ok(Some(M::convert_from(content_type, body)?)),
        None => Ok(None),
    }
}

/// Decode an ordered collection. `404` yields an empty collection.
pub fn deserialize_multiple<M: Model>(
    response: &HttpResponse,
    url: &str,
) -> IndirectorResult<Vec<M>> {
    match payload(response, url)? {
        Some((content_type, body)) => Ok(M::convert_from_multiple(content_type, body)?),
        None => Ok(Vec::new()),
    }
}

/// The media type (without parameters) and body of a successful response,
/// `None` for `404`.
fn payload<'a>(
    response: &'a HttpResponse,
    url: &str,
) -> IndirectorResult<Option<(&'a str, &'a [u8])>> {
    if response.status == 404 {
        return Ok(None);
    }
    if !response.is_success() {
        return Err(remote_error(response, url).into());
    }

    let content_type = response
        .content_type()
        .and_then(|value| value.split(';').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or(IndirectorError::MissingContentType {
            status: response.status,
        })?;
    Ok(Some((content_type, &response.body)))
}

pub fn remote_error(response: &HttpResponse, url: &str) -> RemoteError {
    RemoteError {
        status: response.status,
        message: response.message.clone(),
        url: url.to_string(),
        body: response.body_text(),
    }
}
