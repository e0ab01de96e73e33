//! Responder
//!
//! Ordered respond decorators that inspect and consume a response.

use bytes::Bytes;
use serde::de::DeserializeOwned;

use crate::core::transport::HttpResponse;
use crate::error::{AzureResult, ProtocolError, RequestError};

/// One step of response handling.
pub type RespondDecorator<'a> = Box<dyn FnMut(&mut HttpResponse) -> AzureResult<()> + Send + 'a>;

/// Apply `decorators` in order, stopping at the first error.
pub fn respond(response: &mut HttpResponse, decorators: Vec<RespondDecorator<'_>>) -> AzureResult<()> {
    for mut decorator in decorators {
        decorator(response)?;
    }
    Ok(())
}

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Fail with a `RequestError` unless the status is one of `codes`.
pub fn with_error_unless_status_code<'a>(codes: &[u16]) -> RespondDecorator<'a> {
    let codes = codes.to_vec();
    Box::new(move |response: &mut HttpResponse| -> AzureResult<()> {
        if codes.contains(&response.status) {
            Ok(())
        } else {
            Err(RequestError::from_response(response).into())
        }
    })
}

pub fn with_error_unless_ok<'a>() -> RespondDecorator<'a> {
    with_error_unless_status_code(&[200])
}

/// Decode a JSON body into `target`. An empty body leaves `target` untouched.
pub fn by_unmarshalling_json<'a, T>(target: &'a mut T) -> RespondDecorator<'a>
where
    T: DeserializeOwned + Send,
{
    Box::new(move |response: &mut HttpResponse| -> AzureResult<()> {
        let body = response.body.strip_prefix(UTF8_BOM).unwrap_or(&response.body[..]);
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(());
        }
        *target = serde_json::from_slice(body).map_err(|e| ProtocolError::InvalidJson {
            message: format!("failed to unmarshal response body: {}", e),
        })?;
        Ok(())
    })
}

/// Copy the body into `buffer`, leaving the response readable.
pub fn by_copying<'a>(buffer: &'a mut Vec<u8>) -> RespondDecorator<'a> {
    Box::new(move |response: &mut HttpResponse| -> AzureResult<()> {
        buffer.extend_from_slice(&response.body);
        Ok(())
    })
}

/// Drop the body.
pub fn by_discarding_body<'a>() -> RespondDecorator<'a> {
    Box::new(|response: &mut HttpResponse| -> AzureResult<()> {
        response.body = Bytes::new();
        Ok(())
    })
}

/// Release the body. Bodies are fully buffered, so this drops them.
pub fn by_closing<'a>() -> RespondDecorator<'a> {
    by_discarding_body()
}

/// Run `inspect` over the response without changing it.
pub fn by_inspecting<'a, F>(mut inspect: F) -> RespondDecorator<'a>
where
    F: FnMut(&HttpResponse) + Send + 'a,
{
    Box::new(move |response: &mut HttpResponse| -> AzureResult<()> {
        inspect(response);
        Ok(())
    })
}
