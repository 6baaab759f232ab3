use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use serde_json::json;
use warp::filters::path::FullPath;
use warp::http::header::{REFERER, USER_AGENT};
use warp::http::{HeaderMap, HeaderName, Method, StatusCode};
use warp::{reply, Filter, Rejection, Reply};

use super::HttpState;
use governor::clock::Clock;

pub const LOGIN_PAGE: &str = r#"<!DOCTYPE html>
<html><head><title>Login</title></head>
<body>
<h2>Sign in</h2>
<form method="post" action="/login">
  <label>Username <input type="text" name="username"></label><br>
  <label>Password <input type="password" name="password"></label><br>
  <button type="submit">Login</button>
</form>
</body></html>"#;

pub const ADMIN_PAGE: &str = r#"<!DOCTYPE html>
<html><head><title>Administration</title></head>
<body>
<h1>Admin Panel</h1>
<ul>
  <li><a href="/admin/users">Users</a></li>
  <li><a href="/admin/backups">Backups</a></li>
  <li><a href="/admin/settings">Settings</a></li>
</ul>
</body></html>"#;

pub const ERROR_BODY: &str = "Custom error message";
pub const TOO_MANY_REQUESTS_BODY: &str = "Too Many Requests";

/// Everything the handler needs to know about one request.
#[derive(Debug, Clone)]
pub struct RequestInfo {
    pub method: Method,
    pub path: String,
    pub query: String,
    pub user_agent: Option<String>,
    pub referrer: Option<String>,
    pub remote: Option<SocketAddr>,
}

/// Canned reply for an admitted request, selected by exact path.
pub fn canned_reply(path: &str, echo: impl Reply) -> reply::Response {
    match path {
        "/login" => reply::html(LOGIN_PAGE).into_response(),
        "/admin" => reply::html(ADMIN_PAGE).into_response(),
        "/api/data" => reply::json(&json!({
            "status": "ok",
            "data": [
                {"id": 1, "name": "John Doe", "email": "john@example.com", "role": "admin"},
                {"id": 2, "name": "Jane Smith", "email": "jane@example.com", "role": "user"},
            ]
        }))
        .into_response(),
        "/error" => reply::with_status(ERROR_BODY, StatusCode::INTERNAL_SERVER_ERROR).into_response(),
        _ => echo.into_response(),
    }
}

/// Raw query string, empty when the request has none.
fn query_string() -> impl Filter<Extract = (String,), Error = Infallible> + Clone {
    warp::query::raw()
        .or(warp::any().map(String::new))
        .unify()
}

/// Header value as text. Bytes that are not UTF-8 are replaced rather than rejected, so odd
/// headers never keep a request away from the handler.
fn header_text(headers: &HeaderMap, name: HeaderName) -> Option<String> {
    headers
        .get(name)
        .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
}

/// Catch-all filter: every method, every path.
pub fn honeypot_routes<C>(
    state: Arc<HttpState<C>>,
) -> impl Filter<Extract = (reply::Response,), Error = Rejection> + Clone
where
    C: Clock + Send + Sync + 'static,
    C::Instant: Send + Sync,
{
    warp::method()
        .and(warp::path::full())
        .and(query_string())
        .and(warp::header::headers_cloned())
        .and(warp::addr::remote())
        .and_then(
            move |method: Method,
                  path: FullPath,
                  query: String,
                  headers: HeaderMap,
                  remote: Option<SocketAddr>| {
                let state = state.clone();
                async move {
                    let info = RequestInfo {
                        method,
                        path: path.as_str().to_string(),
                        query,
                        user_agent: header_text(&headers, USER_AGENT),
                        referrer: header_text(&headers, REFERER),
                        remote,
                    };
                    Ok::<_, Rejection>(state.handle(info).await)
                }
            },
        )
}
