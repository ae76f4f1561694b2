//! WebSocket endpoint resolution
//!
//! Splits a `ws://` or `wss://` URL into the pieces the handshake and the
//! transport need. Resolution is pure: no DNS lookups and no I/O.

use std::fmt;

use url::form_urlencoded;

use crate::error::{Error, Result};

/// Default port for `ws://`
pub const WS_DEFAULT_PORT: u16 = 80;

/// Default port for `wss://`
pub const WSS_DEFAULT_PORT: u16 = 443;

/// Resolved WebSocket endpoint
///
/// `path` always starts with `/` and carries the query string, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// `true` for `wss://`
    pub secure: bool,
    /// Host name or IP literal (IPv6 keeps its brackets)
    pub host: String,
    /// Explicit port, or the scheme default
    pub port: u16,
    /// Request target: path plus query
    pub path: String,
}

impl Endpoint {
    /// Resolve an endpoint string
    ///
    /// # Example
    ///
    /// ```
    /// use jforex_ws::Endpoint;
    ///
    /// let ep = Endpoint::parse("ws://localhost:8080/ws/market").unwrap();
    /// assert_eq!(ep.host, "localhost");
    /// assert_eq!(ep.port, 8080);
    /// assert_eq!(ep.path, "/ws/market");
    /// assert!(!ep.secure);
    /// ```
    pub fn parse(url: &str) -> Result<Self> {
        let (secure, rest) = if let Some(rest) = url.strip_prefix("ws://") {
            (false, rest)
        } else if let Some(rest) = url.strip_prefix("wss://") {
            (true, rest)
        } else {
            return Err(Error::InvalidScheme(url.to_string()));
        };

        // Fragments never go on the wire
        let rest = rest.split_once('#').map_or(rest, |(before, _)| before);

        let (authority, target) = match rest.find(['/', '?']) {
            Some(i) => (&rest[..i], &rest[i..]),
            None => (rest, ""),
        };

        let path = if target.is_empty() {
            "/".to_string()
        } else if target.starts_with('?') {
            format!("/{target}")
        } else {
            target.to_string()
        };

        let default_port = if secure {
            WSS_DEFAULT_PORT
        } else {
            WS_DEFAULT_PORT
        };
        let (host, port) = split_host_port(authority, default_port)?;

        if host.is_empty() {
            return Err(Error::InvalidUrl("missing host"));
        }

        Ok(Self {
            secure,
            host: host.to_string(),
            port,
            path,
        })
    }

    /// `host:port`, as sent in the `Host` header and used for TCP connect
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Append query parameters to the request target
    ///
    /// Pairs with a blank key or a missing/blank value are skipped, so optional
    /// subscription filters can be passed straight through.
    ///
    /// ```
    /// use jforex_ws::Endpoint;
    ///
    /// let ep = Endpoint::parse("ws://localhost:7081/ticker")
    ///     .unwrap()
    ///     .with_query([("topOfBook", Some("true")), ("instIDs", Some("EURUSD,USDJPY"))]);
    /// assert_eq!(ep.path, "/ticker?topOfBook=true&instIDs=EURUSD%2CUSDJPY");
    /// ```
    pub fn with_query<'a, I>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, Option<&'a str>)>,
    {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        let mut any = false;
        for (key, value) in params {
            let Some(value) = value else { continue };
            if key.trim().is_empty() || value.trim().is_empty() {
                continue;
            }
            serializer.append_pair(key, value);
            any = true;
        }

        if any {
            let query = serializer.finish();
            let sep = if self.path.contains('?') { '&' } else { '?' };
            self.path.push(sep);
            self.path.push_str(&query);
        }
        self
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = if self.secure { "wss" } else { "ws" };
        write!(f, "{}://{}:{}{}", scheme, self.host, self.port, self.path)
    }
}

fn split_host_port(authority: &str, default_port: u16) -> Result<(&str, u16)> {
    // Userinfo is not supported on the handshake; drop it
    let authority = authority
        .rsplit_once('@')
        .map_or(authority, |(_, host)| host);

    // IPv6 literal: the port separator is the colon after the closing bracket
    let port_sep = if authority.starts_with('[') {
        let close = authority
            .find(']')
            .ok_or(Error::InvalidUrl("unterminated IPv6 literal"))?;
        match &authority[close + 1..] {
            "" => None,
            tail if tail.starts_with(':') => Some(close + 1),
            _ => return Err(Error::InvalidUrl("junk after IPv6 literal")),
        }
    } else {
        authority.rfind(':')
    };

    match port_sep {
        Some(i) => {
            let port = authority[i + 1..]
                .parse::<u16>()
                .map_err(|_| Error::InvalidUrl("invalid port"))?;
            Ok((&authority[..i], port))
        }
        None => Ok((authority, default_port)),
    }
}
