//! Transport table and path resolution.
//!
//! The set of transports is closed and known at compile time, so it is an
//! enum rather than a runtime registry.  Each variant declares its HTTP
//! method, path suffix and response filters as plain data in
//! [`Transport::route`]; the router only has to compare strings.
//!
//! # URL layout
//!
//! ```text
//! <prefix>                                   greeting
//! <prefix>/info                              server info
//! <prefix>/<server_id>/<session_id>/<suffix> session-scoped transports
//! ```
//!
//! `server_id` and `session_id` must be non-empty and may not contain `.`
//! (or `/`, which the path split already excludes).

use crate::domain::http::{HttpRequest, Method};

/// Response decorations a route applies to its responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    /// `Set-Cookie: JSESSIONID=<value>; path=/`.
    SessionCookie,
    /// `Cache-Control: no-store, no-cache, must-revalidate, max-age=0`.
    NoCache,
    /// Allow-origin reflecting the request's `Origin`, plus allow-credentials.
    Cors,
}

pub const NO_CACHE: &str = "no-store, no-cache, must-revalidate, max-age=0";

/// Cookie value used when the client did not send `JSESSIONID`.
pub const DEFAULT_COOKIE: &str = "dummy";

impl Filter {
    /// Appends this filter's headers for `request` to `headers`.
    pub fn apply(self, request: &HttpRequest, headers: &mut Vec<(String, String)>) {
        match self {
            Self::SessionCookie => {
                let value = request.cookie("JSESSIONID").unwrap_or(DEFAULT_COOKIE);
                headers.push(("Set-Cookie".into(), format!("JSESSIONID={value}; path=/")));
            }
            Self::NoCache => headers.push(("Cache-Control".into(), NO_CACHE.into())),
            Self::Cors => {
                let origin = request
                    .header("origin")
                    .filter(|o| !o.is_empty() && *o != "null")
                    .unwrap_or("*");
                headers.push(("Access-Control-Allow-Origin".into(), origin.into()));
                headers.push(("Access-Control-Allow-Credentials".into(), "true".into()));
            }
        }
    }
}

/// Applies every filter in `filters`, in order.
pub fn apply_filters(filters: &[Filter], request: &HttpRequest, headers: &mut Vec<(String, String)>) {
    for filter in filters {
        filter.apply(request, headers);
    }
}

/// How a transport is reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub method: Method,
    /// Last path segment for session-scoped transports; `""` for `info`'s
    /// and the greeting's fixed paths.
    pub suffix: &'static str,
    pub filters: &'static [Filter],
}

/// Every endpoint the server exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Greeting,
    Info,
    Jsonp,
    JsonpSend,
    Xhr,
    XhrSend,
    XhrStreaming,
}

impl Transport {
    pub const ALL: [Transport; 7] = [
        Self::Greeting,
        Self::Info,
        Self::Jsonp,
        Self::JsonpSend,
        Self::Xhr,
        Self::XhrSend,
        Self::XhrStreaming,
    ];

    pub fn route(self) -> Route {
        use Filter::{Cors, NoCache, SessionCookie};
        match self {
            Self::Greeting => Route {
                method: Method::Get,
                suffix: "",
                filters: &[],
            },
            Self::Info => Route {
                method: Method::Get,
                suffix: "info",
                filters: &[NoCache, Cors],
            },
            // The opening response additionally gets NoCache and Cors.
            Self::Jsonp => Route {
                method: Method::Get,
                suffix: "jsonp",
                filters: &[SessionCookie],
            },
            Self::JsonpSend => Route {
                method: Method::Post,
                suffix: "jsonp_send",
                filters: &[SessionCookie],
            },
            Self::Xhr => Route {
                method: Method::Post,
                suffix: "xhr",
                filters: &[SessionCookie, NoCache, Cors],
            },
            Self::XhrSend => Route {
                method: Method::Post,
                suffix: "xhr_send",
                filters: &[SessionCookie, NoCache, Cors],
            },
            Self::XhrStreaming => Route {
                method: Method::Post,
                suffix: "xhr_streaming",
                filters: &[SessionCookie, NoCache, Cors],
            },
        }
    }

    /// `true` for transports addressed as `<server_id>/<session_id>/<suffix>`.
    pub fn is_session_scoped(self) -> bool {
        !matches!(self, Self::Greeting | Self::Info)
    }

    /// `true` if browsers may reach this transport cross-origin, which
    /// means it answers CORS preflight requests.
    pub fn supports_preflight(self) -> bool {
        self.route().filters.contains(&Filter::Cors)
    }

    fn from_session_suffix(suffix: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.is_session_scoped() && t.route().suffix == suffix)
    }
}

/// Outcome of matching a request against the transport table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Method and path matched.
    Matched {
        transport: Transport,
        session_id: Option<String>,
    },
    /// `OPTIONS` on a transport that answers preflight requests.
    Preflight(Transport),
    /// Path matched but the method did not; carries the allowed method.
    MethodNotAllowed(Transport),
    NotFound,
}

/// Matches `method` and `path` against the transports mounted at `prefix`.
pub fn resolve(prefix: &str, method: &Method, path: &str) -> Resolution {
    let Some(rest) = path.strip_prefix(prefix) else {
        return Resolution::NotFound;
    };

    let (transport, session_id) = match rest {
        "" | "/" => (Transport::Greeting, None),
        "/info" => (Transport::Info, None),
        _ => match parse_session_path(rest) {
            Some((session_id, transport)) => (transport, Some(session_id.to_owned())),
            None => return Resolution::NotFound,
        },
    };

    let route = transport.route();
    if *method == route.method {
        Resolution::Matched {
            transport,
            session_id,
        }
    } else if *method == Method::Options && transport.supports_preflight() {
        Resolution::Preflight(transport)
    } else {
        Resolution::MethodNotAllowed(transport)
    }
}

/// Splits `/<server_id>/<session_id>/<suffix>`.
fn parse_session_path(rest: &str) -> Option<(&str, Transport)> {
    let mut parts = rest.strip_prefix('/')?.split('/');
    let server_id = parts.next()?;
    let session_id = parts.next()?;
    let suffix = parts.next()?;
    if parts.next().is_some() || !is_valid_id(server_id) || !is_valid_id(session_id) {
        return None;
    }
    Some((session_id, Transport::from_session_suffix(suffix)?))
}

fn is_valid_id(id: &str) -> bool {
    !id.is_empty() && !id.contains('.')
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn matched(transport: Transport, session_id: Option<&str>) -> Resolution {
        Resolution::Matched {
            transport,
            session_id: session_id.map(str::to_owned),
        }
    }

    #[test]
    fn test_greeting_with_and_without_trailing_slash() {
        assert_eq!(
            resolve("/echo", &Method::Get, "/echo"),
            matched(Transport::Greeting, None)
        );
        assert_eq!(
            resolve("/echo", &Method::Get, "/echo/"),
            matched(Transport::Greeting, None)
        );
    }

    #[test]
    fn test_session_scoped_paths_resolve_to_their_transport() {
        let cases = [
            (Method::Get, "jsonp", Transport::Jsonp),
            (Method::Post, "jsonp_send", Transport::JsonpSend),
            (Method::Post, "xhr", Transport::Xhr),
            (Method::Post, "xhr_send", Transport::XhrSend),
            (Method::Post, "xhr_streaming", Transport::XhrStreaming),
        ];
        for (method, suffix, transport) in cases {
            let path = format!("/echo/000/abc123/{suffix}");
            assert_eq!(
                resolve("/echo", &method, &path),
                matched(transport, Some("abc123")),
                "{path}"
            );
        }
    }

    #[test]
    fn test_info_path() {
        assert_eq!(
            resolve("/echo", &Method::Get, "/echo/info"),
            matched(Transport::Info, None)
        );
    }

    #[test]
    fn test_ids_with_dots_are_not_found() {
        assert_eq!(
            resolve("/echo", &Method::Get, "/echo/000/a.b/jsonp"),
            Resolution::NotFound
        );
        assert_eq!(
            resolve("/echo", &Method::Get, "/echo/0.0/abc/jsonp"),
            Resolution::NotFound
        );
    }

    #[test]
    fn test_unknown_or_malformed_paths_are_not_found() {
        for path in [
            "/other/000/abc/jsonp",
            "/echo/000/abc/unknown",
            "/echo/000/abc",
            "/echo/000//jsonp",
            "/echo/000/abc/jsonp/extra",
        ] {
            assert_eq!(resolve("/echo", &Method::Get, path), Resolution::NotFound, "{path}");
        }
    }

    #[test]
    fn test_wrong_method_is_method_not_allowed() {
        assert_eq!(
            resolve("/echo", &Method::Post, "/echo/000/abc/jsonp"),
            Resolution::MethodNotAllowed(Transport::Jsonp)
        );
    }

    #[test]
    fn test_options_on_cors_transport_is_preflight() {
        assert_eq!(
            resolve("/echo", &Method::Options, "/echo/000/abc/xhr"),
            Resolution::Preflight(Transport::Xhr)
        );
        // JSONP is loaded through a script tag and never preflighted.
        assert_eq!(
            resolve("/echo", &Method::Options, "/echo/000/abc/jsonp"),
            Resolution::MethodNotAllowed(Transport::Jsonp)
        );
    }

    #[test]
    fn test_session_cookie_reflects_request_cookie_or_dummy() {
        // Arrange
        let with_cookie = HttpRequest::new(Method::Get, "/").with_header("Cookie", "JSESSIONID=s1");
        let without = HttpRequest::new(Method::Get, "/");
        let mut a = Vec::new();
        let mut b = Vec::new();

        // Act
        Filter::SessionCookie.apply(&with_cookie, &mut a);
        Filter::SessionCookie.apply(&without, &mut b);

        // Assert
        assert_eq!(a, vec![("Set-Cookie".into(), "JSESSIONID=s1; path=/".into())]);
        assert_eq!(b, vec![("Set-Cookie".into(), "JSESSIONID=dummy; path=/".into())]);
    }

    #[test]
    fn test_cors_reflects_origin_or_wildcard() {
        let req = HttpRequest::new(Method::Get, "/").with_header("Origin", "http://app.test");
        let mut headers = Vec::new();
        Filter::Cors.apply(&req, &mut headers);
        assert_eq!(headers[0].1, "http://app.test");
        assert_eq!(headers[1], ("Access-Control-Allow-Credentials".into(), "true".into()));

        let mut headers = Vec::new();
        Filter::Cors.apply(&HttpRequest::new(Method::Get, "/"), &mut headers);
        assert_eq!(headers[0].1, "*");
    }
}
