//! Endpoint descriptors and their resolution to socket URLs.
//!
//! Callers address a push channel with a logical [`Endpoint`]. Before every
//! connection attempt the client resolves it against the [`PageOrigin`] into
//! exactly one fully-qualified `ws://` or `wss://` URL:
//!
//! | Descriptor                    | Resolved (origin `https://tickets.example`) |
//! |-------------------------------|---------------------------------------------|
//! | `wss://push.example/reviews`  | `wss://push.example/reviews`                |
//! | `http://push.example/reviews` | `ws://push.example/reviews`                 |
//! | `//push.example/reviews`      | `wss://push.example/reviews`                |
//! | `/ws/reviews`                 | `wss://tickets.example/ws/reviews`          |
//! | `ws/reviews`                  | `wss://tickets.example/ws/reviews`          |
//!
//! Path descriptors are rooted at the origin, not at the page's own path.

use std::fmt;

use url::{ParseError, Url};

use crate::error::{Result, SocketError};

/// Scheme used for plain-text socket connections.
pub const WS_SCHEME: &str = "ws";

/// Scheme used for TLS socket connections.
pub const WSS_SCHEME: &str = "wss";

/// The host context that relative endpoints are resolved against.
///
/// A secure page (`https`) produces `wss` sockets; an insecure page (`http`)
/// produces `ws` sockets. Only the scheme and authority of the supplied URL are
/// kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageOrigin {
    /// `ws(s)://host[:port]/`, already scheme-translated.
    base: Url,
}

impl PageOrigin {
    /// Parse a page origin such as `https://tickets.example` or
    /// `http://localhost:5173/events/42`.
    ///
    /// `ws`/`wss` origins are accepted as-is.
    ///
    /// # Errors
    ///
    /// Returns [`SocketError::InvalidOrigin`] if the URL does not parse, has no
    /// host, or uses a scheme other than `http`, `https`, `ws` or `wss`.
    pub fn parse(origin: &str) -> Result<Self> {
        let invalid = |reason: String| SocketError::InvalidOrigin {
            origin: origin.to_string(),
            reason,
        };

        let page = Url::parse(origin.trim()).map_err(|e| invalid(e.to_string()))?;
        let secure = match page.scheme() {
            "https" | WSS_SCHEME => true,
            "http" | WS_SCHEME => false,
            other => return Err(invalid(format!("unsupported scheme {other:?}"))),
        };
        if page.host_str().is_none_or(str::is_empty) {
            return Err(invalid("missing host".into()));
        }

        let mut base = page;
        base.set_path("/");
        base.set_query(None);
        base.set_fragment(None);
        // Credentials never travel to the socket endpoint.
        let _ = base.set_username("");
        let _ = base.set_password(None);
        base.set_scheme(socket_scheme(secure))
            .map_err(|()| invalid("cannot translate scheme".into()))?;

        Ok(Self { base })
    }

    /// Returns `true` if the page is served over TLS.
    pub fn is_secure(&self) -> bool {
        self.base.scheme() == WSS_SCHEME
    }

    /// The socket scheme matching this page (`ws` or `wss`).
    pub fn socket_scheme(&self) -> &'static str {
        socket_scheme(self.is_secure())
    }
}

impl fmt::Display for PageOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.base.as_str())
    }
}

fn socket_scheme(secure: bool) -> &'static str {
    if secure {
        WSS_SCHEME
    } else {
        WS_SCHEME
    }
}

/// A logical address identifying a push-channel subscription.
///
/// Construction never fails for non-empty input; problems surface from
/// [`resolve`](Endpoint::resolve) so the client can treat them as failed
/// connection attempts.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint(String);

impl Endpoint {
    /// Wrap a descriptor. Empty or whitespace-only input yields `None`, which
    /// means "do not connect".
    pub fn new(raw: impl AsRef<str>) -> Option<Self> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    /// The descriptor as supplied (trimmed).
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Resolve this descriptor into a fully-qualified socket URL.
    ///
    /// # Errors
    ///
    /// Returns [`SocketError::InvalidEndpoint`] if the descriptor is malformed,
    /// uses an unsupported scheme, or is relative while `origin` is `None`.
    pub fn resolve(&self, origin: Option<&PageOrigin>) -> Result<Url> {
        let raw = self.0.as_str();

        let mut url = if let Some(rest) = raw.strip_prefix("//") {
            let origin = self.require_origin(origin)?;
            let joined = format!("{}://{rest}", origin.socket_scheme());
            Url::parse(&joined).map_err(|e| self.invalid(e.to_string()))?
        } else {
            match Url::parse(raw) {
                Ok(absolute) => self.translate(absolute)?,
                Err(ParseError::RelativeUrlWithoutBase) => {
                    let origin = self.require_origin(origin)?;
                    origin
                        .base
                        .join(raw)
                        .map_err(|e| self.invalid(e.to_string()))?
                }
                Err(e) => return Err(self.invalid(e.to_string())),
            }
        };

        if url.host_str().is_none_or(str::is_empty) {
            return Err(self.invalid("missing host".into()));
        }
        url.set_fragment(None);
        Ok(url)
    }

    fn translate(&self, mut url: Url) -> Result<Url> {
        let target = match url.scheme() {
            WS_SCHEME | WSS_SCHEME => return Ok(url),
            "http" => WS_SCHEME,
            "https" => WSS_SCHEME,
            other => return Err(self.invalid(format!("unsupported scheme {other:?}"))),
        };
        url.set_scheme(target)
            .map_err(|()| self.invalid("cannot translate scheme".into()))?;
        Ok(url)
    }

    fn require_origin<'a>(&self, origin: Option<&'a PageOrigin>) -> Result<&'a PageOrigin> {
        origin.ok_or_else(|| self.invalid("relative endpoint requires a page origin".into()))
    }

    fn invalid(&self, reason: String) -> SocketError {
        SocketError::InvalidEndpoint {
            endpoint: self.0.clone(),
            reason,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    fn secure_page() -> PageOrigin {
        PageOrigin::parse("https://tickets.example/events/42?tab=reviews").unwrap()
    }

    fn plain_page() -> PageOrigin {
        PageOrigin::parse("http://localhost:5173/").unwrap()
    }

    fn resolve(raw: &str, origin: Option<&PageOrigin>) -> Result<Url> {
        Endpoint::new(raw).unwrap().resolve(origin)
    }

    #[test]
    fn empty_descriptor_means_do_not_connect() {
        assert!(Endpoint::new("").is_none());
        assert!(Endpoint::new("   ").is_none());
        assert!(Endpoint::new("\t\n").is_none());
    }

    #[test]
    fn descriptor_is_trimmed() {
        let endpoint = Endpoint::new("  /ws/reviews ").unwrap();
        assert_eq!(endpoint.as_str(), "/ws/reviews");
    }

    #[test]
    fn absolute_socket_urls_are_kept() {
        let url = resolve("ws://push.example:8080/reviews", Some(&secure_page())).unwrap();
        assert_eq!(url.as_str(), "ws://push.example:8080/reviews");

        let url = resolve("wss://push.example/reviews", None).unwrap();
        assert_eq!(url.as_str(), "wss://push.example/reviews");
    }

    #[test]
    fn https_translates_to_wss() {
        let url = resolve("https://push.example/reviews?event=7", None).unwrap();
        assert_eq!(url.as_str(), "wss://push.example/reviews?event=7");
    }

    #[test]
    fn http_translates_to_ws() {
        let url = resolve("http://push.example:3000/reviews", Some(&secure_page())).unwrap();
        assert_eq!(url.as_str(), "ws://push.example:3000/reviews");
    }

    #[test]
    fn absolute_path_on_secure_page_uses_wss() {
        let url = resolve("/ws/reviews", Some(&secure_page())).unwrap();
        assert_eq!(url.as_str(), "wss://tickets.example/ws/reviews");
    }

    #[test]
    fn absolute_path_on_plain_page_uses_ws() {
        let url = resolve("/ws/reviews", Some(&plain_page())).unwrap();
        assert_eq!(url.as_str(), "ws://localhost:5173/ws/reviews");
    }

    #[test]
    fn relative_path_is_rooted_at_origin() {
        let url = resolve("ws/reviews", Some(&secure_page())).unwrap();
        assert_eq!(url.as_str(), "wss://tickets.example/ws/reviews");

        let url = resolve("ws/reviews", Some(&plain_page())).unwrap();
        assert_eq!(url.as_str(), "ws://localhost:5173/ws/reviews");
    }

    #[test]
    fn scheme_relative_takes_page_scheme() {
        let url = resolve("//push.example/reviews", Some(&secure_page())).unwrap();
        assert_eq!(url.as_str(), "wss://push.example/reviews");

        let url = resolve("//push.example/reviews", Some(&plain_page())).unwrap();
        assert_eq!(url.as_str(), "ws://push.example/reviews");
    }

    #[test]
    fn fragment_is_stripped() {
        let url = resolve("/ws/reviews#latest", Some(&secure_page())).unwrap();
        assert_eq!(url.as_str(), "wss://tickets.example/ws/reviews");
    }

    #[test]
    fn relative_without_origin_is_rejected() {
        let err = resolve("/ws/reviews", None).unwrap_err();
        assert!(matches!(err, SocketError::InvalidEndpoint { .. }));

        let err = resolve("//push.example/reviews", None).unwrap_err();
        assert!(matches!(err, SocketError::InvalidEndpoint { .. }));
    }

    #[test]
    fn unsupported_scheme_is_rejected() {
        let err = resolve("ftp://push.example/reviews", None).unwrap_err();
        assert!(matches!(err, SocketError::InvalidEndpoint { .. }));
    }

    #[test]
    fn malformed_url_is_rejected() {
        let err = resolve("ws://[not-an-ip/reviews", None).unwrap_err();
        assert!(matches!(err, SocketError::InvalidEndpoint { .. }));
    }

    #[test]
    fn resolution_is_deterministic() {
        let origin = secure_page();
        let endpoint = Endpoint::new("/ws/reviews").unwrap();
        let first = endpoint.resolve(Some(&origin)).unwrap();
        let second = endpoint.resolve(Some(&origin)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn origin_keeps_only_scheme_and_authority() {
        let origin = PageOrigin::parse("https://user:pw@tickets.example:8443/a/b?c=d#e").unwrap();
        assert_eq!(origin.to_string(), "wss://tickets.example:8443/");
        assert!(origin.is_secure());
        assert_eq!(origin.socket_scheme(), "wss");
    }

    #[test]
    fn origin_rejects_unsupported_scheme() {
        let err = PageOrigin::parse("file:///tmp/index.html").unwrap_err();
        assert!(matches!(err, SocketError::InvalidOrigin { .. }));
    }

    #[test]
    fn origin_rejects_garbage() {
        let err = PageOrigin::parse("not a url").unwrap_err();
        assert!(matches!(err, SocketError::InvalidOrigin { .. }));
    }

    #[test]
    fn plain_origin_is_not_secure() {
        let origin = plain_page();
        assert!(!origin.is_secure());
        assert_eq!(origin.socket_scheme(), "ws");
    }
}
