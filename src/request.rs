use headers::{HeaderList, SecureHeaders};

/// HTTP request method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Options,
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
    Trace,
    Connect,
    Other(String),
}

impl Method {
    pub fn as_str(&self) -> &str {
        match *self {
            Method::Options => "OPTIONS",
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Trace => "TRACE",
            Method::Connect => "CONNECT",
            Method::Other(ref s) => s,
        }
    }
}

impl<'a> From<&'a str> for Method {
    fn from(s: &'a str) -> Method {
        match s {
            "OPTIONS" => Method::Options,
            "GET" => Method::Get,
            "HEAD" => Method::Head,
            "POST" => Method::Post,
            "PUT" => Method::Put,
            "PATCH" => Method::Patch,
            "DELETE" => Method::Delete,
            "TRACE" => Method::Trace,
            "CONNECT" => Method::Connect,
            s => Method::Other(s.to_string()),
        }
    }
}

/// An already fully parsed inbound request, handed to this crate by the
/// collaborator that owns the client connection and HTTP parsing. Nothing
/// here re-parses wire bytes; it is the data this crate translates into
/// the backend's own wire protocol.
#[derive(Debug, Clone)]
pub struct ParsedRequest {
    pub method: Method,
    /// Full request target, e.g. `/app/foo?bar=1`.
    pub path: String,
    pub headers: HeaderList,
    pub secure_headers: SecureHeaders,
    /// Whether the client sent a body (`Content-Length` > 0 or chunked
    /// transfer encoding).
    pub has_body: bool,
    /// `true` for `CONNECT`/`Upgrade` requests, where no ordinary
    /// request body forwarding or half-close ever applies.
    pub upgraded: bool,
    pub https: bool,
    pub transaction_id: Option<String>,
    pub analytics_enabled: bool,
}

impl ParsedRequest {
    /// The path portion before `?`.
    pub fn path_info(&self) -> &str {
        match self.path.find('?') {
            Some(idx) => &self.path[..idx],
            None => &self.path,
        }
    }

    /// The portion from `?` to the end, `?` included. Empty when absent.
    pub fn query_string(&self) -> &str {
        match self.path.find('?') {
            Some(idx) => &self.path[idx..],
            None => "",
        }
    }

    pub fn content_length(&self) -> Option<&str> {
        self.headers.get("Content-Length")
    }

    pub fn secure_headers_iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.secure_headers.iter()
    }
}
