//! Request/response data model shared with the edge platform.
//!
//! The platform hands the gate one viewer request per invocation and
//! applies the returned [`GateAction`]: forward the (unmodified) request
//! to the origin, or answer the viewer directly with a redirect or an
//! error page. Header names are expected in lowercase, as the platform
//! normalizes them.

use std::collections::HashMap;

/// An incoming viewer request.
#[derive(Debug, Clone)]
pub struct ViewerRequest {
    /// Request path, e.g. `/dashboard`.
    pub uri: String,
    /// Raw query string, without the leading `?`.
    pub querystring: String,
    /// Headers, lowercased name to one or more values.
    pub headers: HashMap<String, Vec<String>>,
}

impl ViewerRequest {
    /// Raw `cookie` header lines, if any.
    pub fn cookie_lines(&self) -> &[String] {
        self.headers.get("cookie").map(Vec::as_slice).unwrap_or(&[])
    }
}

/// What the platform should do with the request.
#[derive(Debug)]
pub enum GateAction {
    /// Let the request through to the origin, untouched.
    Forward(ViewerRequest),
    /// Answer the viewer directly.
    Respond(EdgeResponse),
}

impl GateAction {
    /// The response, when this action is a direct answer.
    pub fn response(&self) -> Option<&EdgeResponse> {
        match self {
            GateAction::Forward(_) => None,
            GateAction::Respond(response) => Some(response),
        }
    }
}

/// A response produced by the gate.
#[derive(Debug, Clone)]
pub struct EdgeResponse {
    pub status: u16,
    pub status_description: String,
    /// Header name/value pairs; names may repeat (`set-cookie`).
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl EdgeResponse {
    /// A 302 redirect carrying zero or more `Set-Cookie` values.
    /// Never cacheable.
    pub fn redirect(location: &str, cookies: Vec<String>) -> Self {
        let mut headers = vec![
            ("location".to_string(), location.to_string()),
            (
                "cache-control".to_string(),
                "no-cache, no-store, must-revalidate".to_string(),
            ),
        ];
        for cookie in cookies {
            headers.push(("set-cookie".to_string(), cookie));
        }
        Self {
            status: 302,
            status_description: "Found".to_string(),
            headers,
            body: None,
        }
    }

    /// A 400 error page with a minimal HTML body and a link back to `/`.
    pub fn error_page(message: &str) -> Self {
        let body = format!(
            "<!DOCTYPE html>\n<html>\n<head><title>Authentication Error</title></head>\n<body>\n  \
             <h1>Authentication Error</h1>\n  <p>{}</p>\n  \
             <p><a href=\"/\">Return to Home</a></p>\n</body>\n</html>",
            html_escape(message)
        );
        Self {
            status: 400,
            status_description: "Bad Request".to_string(),
            headers: vec![
                (
                    "content-type".to_string(),
                    "text/html; charset=utf-8".to_string(),
                ),
                (
                    "cache-control".to_string(),
                    "no-cache, no-store, must-revalidate".to_string(),
                ),
            ],
            body: Some(body),
        }
    }

    /// All values of a header, matched case-insensitively.
    pub fn header_values(&self, name: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// The `Location` header, if present.
    pub fn location(&self) -> Option<&str> {
        self.header_values("location").first().copied()
    }
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}
