use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use base64::{Engine, engine::general_purpose::STANDARD};
use tracing::debug;

use super::AppState;

/// Parse `Authorization: Basic <base64(user:pass)>`.
pub fn parse_basic_auth(value: &str) -> Option<(String, String)> {
    let encoded = value.strip_prefix("Basic ")?.trim();
    let decoded = STANDARD.decode(encoded).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, pass) = decoded.split_once(':')?;
    Some((user.to_string(), pass.to_string()))
}

/// Reject requests whose basic-auth credentials do not match the configured
/// API user.
pub async fn require_basic_auth(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let credentials = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_basic_auth);

    match credentials {
        Some((user, pass)) if user == state.auth.username && pass == state.auth.password => {
            next.run(request).await
        }
        _ => {
            debug!(path = %request.uri().path(), "Rejected unauthenticated request");
            (StatusCode::UNAUTHORIZED, "Unauthorized").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_header() {
        // "admin:s3cret"
        assert_eq!(
            parse_basic_auth("Basic YWRtaW46czNjcmV0"),
            Some(("admin".to_string(), "s3cret".to_string()))
        );
    }

    #[test]
    fn password_may_contain_colon() {
        let header = format!("Basic {}", STANDARD.encode("admin:a:b"));
        assert_eq!(
            parse_basic_auth(&header),
            Some(("admin".to_string(), "a:b".to_string()))
        );
    }

    #[test]
    fn rejects_other_schemes_and_garbage() {
        assert_eq!(parse_basic_auth("Bearer abc"), None);
        assert_eq!(parse_basic_auth("Basic !!!"), None);
        assert_eq!(parse_basic_auth(&format!("Basic {}", STANDARD.encode("nocolon"))), None);
    }
}
