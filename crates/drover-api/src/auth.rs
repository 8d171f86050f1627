// API-key guard
//
// The key is accepted from a header, a query parameter, or a cookie, all
// under the configured name. Anything else is a 403.

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;
use axum_extra::extract::cookie::CookieJar;

#[derive(Clone)]
pub struct ApiKeyConfig {
    pub key: String,
    pub name: String,
}

pub async fn require_api_key(
    State(config): State<ApiKeyConfig>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if presented_key(&request, &config.name).as_deref() == Some(config.key.as_str()) {
        Ok(next.run(request).await)
    } else {
        Err(StatusCode::FORBIDDEN)
    }
}

fn presented_key(request: &Request, name: &str) -> Option<String> {
    if let Some(value) = request.headers().get(name).and_then(|v| v.to_str().ok()) {
        return Some(value.to_string());
    }

    if let Some(query) = request.uri().query() {
        for pair in query.split('&') {
            if let Some((key, value)) = pair.split_once('=') {
                if key == name {
                    return Some(value.to_string());
                }
            }
        }
    }

    let jar = CookieJar::from_headers(request.headers());
    jar.get(name).map(|cookie| cookie.value().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn request(uri: &str) -> Request {
        axum::http::Request::builder()
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    #[test]
    fn key_read_from_header() {
        let mut request = request("/api/v2/workflow/status?id=w");
        request
            .headers_mut()
            .insert("access_token", "dev".parse().unwrap());
        assert_eq!(presented_key(&request, "access_token").as_deref(), Some("dev"));
    }

    #[test]
    fn key_read_from_query() {
        let request = request("/api/v2/workflow/status?id=w&access_token=dev");
        assert_eq!(presented_key(&request, "access_token").as_deref(), Some("dev"));
    }

    #[test]
    fn key_read_from_cookie() {
        let mut request = request("/api/v2/workflow/status?id=w");
        request
            .headers_mut()
            .insert("cookie", "access_token=dev; theme=dark".parse().unwrap());
        assert_eq!(presented_key(&request, "access_token").as_deref(), Some("dev"));
    }

    #[test]
    fn missing_key_yields_none() {
        let request = request("/api/v2/workflow/status?id=w");
        assert_eq!(presented_key(&request, "access_token"), None);
    }
}
