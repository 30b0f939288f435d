use std::collections::HashMap;
use std::fmt;

/// Request method tokens the parser recognizes.
///
/// There is no per-method dispatch. Every method is answered as a fetch of
/// the target file: GET gets the header block and the body, any other method
/// gets the header block alone, exactly like HEAD.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    GET,
    POST,
    PUT,
    DELETE,
    HEAD,
    OPTIONS,
    PATCH,
}

const METHODS: [(&str, Method); 7] = [
    ("GET", Method::GET),
    ("HEAD", Method::HEAD),
    ("POST", Method::POST),
    ("PUT", Method::PUT),
    ("DELETE", Method::DELETE),
    ("OPTIONS", Method::OPTIONS),
    ("PATCH", Method::PATCH),
];

impl Method {
    /// Looks up a method token. Tokens are case-sensitive.
    ///
    /// ```
    /// # use staticd::http::request::Method;
    /// assert_eq!(Method::from_str("HEAD"), Some(Method::HEAD));
    /// assert_eq!(Method::from_str("head"), None);
    /// ```
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(token: &str) -> Option<Self> {
        METHODS
            .iter()
            .find(|(name, _)| *name == token)
            .map(|(_, method)| *method)
    }

    pub fn as_str(&self) -> &'static str {
        METHODS
            .iter()
            .find(|(_, method)| method == self)
            .map(|(name, _)| *name)
            .unwrap_or("GET")
    }

    /// Whether the response carries the file body.
    pub fn sends_body(&self) -> bool {
        *self == Method::GET
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One framed request.
///
/// `headers` is keyed by lowercased name; go through [`Request::header`]
/// rather than indexing it directly.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    /// Raw request target, query string included.
    pub path: String,
    pub version: String,
    pub headers: HashMap<String, String>,
    /// Declared by Content-Length. Read off the wire so framing stays in
    /// step, and otherwise ignored.
    pub body: Vec<u8>,
}

impl Request {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// HTTP/1.1 semantics: persistent unless the client sent `Connection: close`.
    pub fn keep_alive(&self) -> bool {
        !self
            .header("connection")
            .is_some_and(|v| v.eq_ignore_ascii_case("close"))
    }

    /// Substring match on Accept-Encoding; q-values are not interpreted.
    pub fn accepts_gzip(&self) -> bool {
        self.header("accept-encoding")
            .is_some_and(|v| v.contains("gzip"))
    }
}
