//! HTTP front end.
//!
//! [`server::HttpServer`] owns the listener and its worker threads and knows
//! nothing about routes; it hands each request to a [`Handler`]. The library
//! API ([`api::LibraryApi`]) and the setup portal
//! ([`crate::portal::SetupPortal`]) are the two handlers, one per boot mode.

pub mod api;
pub mod server;

pub use api::LibraryApi;
pub use server::{HttpServer, MAX_BODY_LEN};

use serde::Serialize;
use tiny_http::Method;

/// A request as seen by handlers.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    /// Path without the query string.
    pub path: String,
    pub query: Option<String>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    pub fn new(method: Method, url: &str, body: Vec<u8>) -> Self {
        let (path, query) = match url.split_once('?') {
            Some((path, query)) => (path.to_string(), Some(query.to_string())),
            None => (url.to_string(), None),
        };
        Self {
            method,
            path,
            query,
            body,
        }
    }

    pub fn get(url: &str) -> Self {
        Self::new(Method::Get, url, Vec::new())
    }

    pub fn post(url: &str, body: impl Into<Vec<u8>>) -> Self {
        Self::new(Method::Post, url, body.into())
    }

    /// Decoded query parameter.
    pub fn query_param(&self, key: &str) -> Option<String> {
        form_value(self.query.as_deref()?, key)
    }
}

/// A response produced by a handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: u16,
    pub content_type: String,
    pub body: Vec<u8>,
    /// Extra headers such as `Location` or `Allow`.
    pub headers: Vec<(&'static str, String)>,
}

impl Reply {
    pub fn new(status: u16, content_type: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            content_type: content_type.into(),
            body: body.into(),
            headers: Vec::new(),
        }
    }

    /// JSON body. Serialization of our own types cannot fail in practice;
    /// if it does, the reply becomes a 500.
    pub fn json<T: Serialize>(status: u16, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(body) => Self::new(status, "application/json", body),
            Err(e) => {
                log::error!("Response serialization failed: {}", e);
                Self::text(500, "Internal Server Error")
            }
        }
    }

    pub fn text(status: u16, body: impl Into<String>) -> Self {
        Self::new(status, "text/plain; charset=utf-8", body.into())
    }

    pub fn html(status: u16, body: impl Into<String>) -> Self {
        Self::new(status, "text/html; charset=utf-8", body.into())
    }

    pub fn redirect(location: &str) -> Self {
        Self::text(302, "Found").with_header("Location", location)
    }

    pub fn not_found() -> Self {
        Self::text(404, "Not Found")
    }

    pub fn method_not_allowed(allow: &str) -> Self {
        Self::text(405, "Method Not Allowed").with_header("Allow", allow)
    }

    pub fn with_header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    /// Value of an extra header.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Body as text, for logging and tests.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Request handler shared by all workers.
pub trait Handler: Send + Sync {
    fn handle(&self, request: &HttpRequest) -> Reply;
}

/// Decoded value of `key` in an `application/x-www-form-urlencoded` string.
///
/// `+` decodes to a space. A value that is not valid percent-encoding is
/// treated as absent.
pub fn form_value(encoded: &str, key: &str) -> Option<String> {
    encoded.split('&').find_map(|pair| {
        let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
        if decode_component(name)? != key {
            return None;
        }
        decode_component(value)
    })
}

fn decode_component(raw: &str) -> Option<String> {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced).ok().map(|s| s.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_splits_query() {
        let request = HttpRequest::get("/list-files?type=usb&x=1");
        assert_eq!(request.path, "/list-files");
        assert_eq!(request.query_param("type").as_deref(), Some("usb"));
        assert_eq!(request.query_param("missing"), None);

        let plain = HttpRequest::get("/status");
        assert_eq!(plain.query, None);
        assert_eq!(plain.query_param("type"), None);
    }

    #[test]
    fn test_form_value_decoding() {
        let body = "ssid=My+Home%20Net&password=p%40ss%26word%3D1&empty=";
        assert_eq!(form_value(body, "ssid").as_deref(), Some("My Home Net"));
        assert_eq!(form_value(body, "password").as_deref(), Some("p@ss&word=1"));
        assert_eq!(form_value(body, "empty").as_deref(), Some(""));
        assert_eq!(form_value(body, "other"), None);
    }

    #[test]
    fn test_form_value_invalid_utf8() {
        assert_eq!(form_value("ssid=%FF%FE", "ssid"), None);
    }

    #[test]
    fn test_reply_helpers() {
        let reply = Reply::redirect("/");
        assert_eq!(reply.status, 302);
        assert_eq!(reply.header("location"), Some("/"));

        let reply = Reply::json(200, &serde_json::json!({"ok": true}));
        assert_eq!(reply.content_type, "application/json");
        assert_eq!(reply.body_text(), r#"{"ok":true}"#);
    }
}
