use std::collections::HashMap;

use bytes::Bytes;

/// Standard HTTP request methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Delete,
    Connect,
    Options,
    Trace,
    Patch,
}

impl Method {
    pub(crate) fn parse(token: &str) -> Option<Self> {
        let method = match token {
            "GET" => Self::Get,
            "HEAD" => Self::Head,
            "POST" => Self::Post,
            "PUT" => Self::Put,
            "DELETE" => Self::Delete,
            "CONNECT" => Self::Connect,
            "OPTIONS" => Self::Options,
            "TRACE" => Self::Trace,
            "PATCH" => Self::Patch,
            _ => return None,
        };
        Some(method)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Connect => "CONNECT",
            Self::Options => "OPTIONS",
            Self::Trace => "TRACE",
            Self::Patch => "PATCH",
        }
    }
}

/// HTTP protocol versions understood by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    Http10,
    Http11,
}

/// One complete HTTP request message.
///
/// Frozen by the parser at message-complete; handlers only ever see
/// finished requests.
pub struct Request {
    method: Method,
    target: String,
    path: String,
    query: HashMap<String, String>,
    headers: Vec<(String, String)>,
    body: Bytes,
    version: Version,
    keep_alive: bool,
}

impl Request {
    pub(crate) fn new(
        method: Method,
        target: String,
        headers: Vec<(String, String)>,
        body: Bytes,
        version: Version,
    ) -> Self {
        let (path, query) = split_target(&target);
        let keep_alive = derive_keep_alive(version, &headers);

        Self {
            method,
            target,
            path,
            query,
            headers,
            body,
            version,
            keep_alive,
        }
    }

    pub fn method(&self) -> Method {
        self.method
    }

    /// Raw target URI as it appeared on the request line.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Path component of the target, query string excluded.
    ///
    /// Not percent-decoded; routes match byte-for-byte.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Query parameters; keys are unique, the last duplicate wins.
    pub fn query(&self) -> &HashMap<String, String> {
        &self.query
    }

    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str)
    }

    /// Header fields in arrival order.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// First header with the given name, compared ASCII-case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Body bytes; empty for messages that carry none.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn version(&self) -> Version {
        self.version
    }

    /// Whether the connection should stay open after this exchange.
    ///
    /// HTTP/1.1 defaults to keep-alive and HTTP/1.0 to close; an explicit
    /// `Connection` header overrides the default in either direction.
    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }
}

fn split_target(target: &str) -> (String, HashMap<String, String>) {
    let Some((path, query)) = target.split_once('?') else {
        return (target.to_string(), HashMap::new());
    };

    let mut params = HashMap::new();
    for pair in query.split('&') {
        if pair.is_empty() {
            continue;
        }
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        params.insert(key.to_string(), value.to_string());
    }

    (path.to_string(), params)
}

fn derive_keep_alive(version: Version, headers: &[(String, String)]) -> bool {
    let connection = headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case("connection"))
        .map(|(_, value)| value.as_str());

    match connection {
        Some(value) if value.eq_ignore_ascii_case("close") => false,
        Some(value) if value.eq_ignore_ascii_case("keep-alive") => true,
        _ => version == Version::Http11,
    }
}
