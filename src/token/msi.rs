//! Managed Identity
//!
//! Requests against the instance metadata service token endpoint.

use url::Url;

use crate::core::{HttpMethod, HttpRequest, HEADER_METADATA};
use crate::error::AzureResult;

/// Instance metadata service token endpoint.
pub const MSI_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";

/// API version sent to the metadata service.
pub const MSI_API_VERSION: &str = "2018-02-01";

/// Check whether `url` addresses the metadata token endpoint (host and path).
pub fn is_imds_endpoint(url: &Url) -> bool {
    match Url::parse(MSI_ENDPOINT) {
        Ok(imds) => url.host_str() == imds.host_str() && url.path() == imds.path(),
        Err(_) => false,
    }
}

/// GET request for a token for `resource`, optionally for a user-assigned identity.
pub fn build_msi_request(
    endpoint: &Url,
    resource: &str,
    client_id: Option<&str>,
) -> AzureResult<HttpRequest> {
    let mut url = endpoint.clone();
    url.set_query(None);
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("api-version", MSI_API_VERSION);
        query.append_pair("resource", resource);
        if let Some(client_id) = client_id.filter(|c| !c.is_empty()) {
            query.append_pair("client_id", client_id);
        }
    }
    Ok(HttpRequest::new(HttpMethod::Get, url).with_header(HEADER_METADATA, "true"))
}
