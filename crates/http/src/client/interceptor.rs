//! Authorization header attachment

use super::request::OutboundRequest;
use reqwest::header;

/// Scheme prefix of the Authorization header
pub const AUTH_SCHEME: &str = "JWT";

/// Authorization header value for `request`, if it should carry one.
///
/// Token endpoints never carry a header, so a stale token cannot poison login
/// or refresh.
pub fn authorization(request: &OutboundRequest, access_token: Option<&str>) -> Option<String> {
    if request.is_auth_endpoint() {
        return None;
    }
    access_token
        .filter(|token| !token.is_empty())
        .map(|token| format!("{AUTH_SCHEME} {token}"))
}

pub(crate) fn authorize(
    builder: reqwest::RequestBuilder,
    request: &OutboundRequest,
    access_token: Option<&str>,
) -> reqwest::RequestBuilder {
    match authorization(request, access_token) {
        Some(value) => builder.header(header::AUTHORIZATION, value),
        None => builder,
    }
}
