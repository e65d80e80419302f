use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpStream;
use std::path::Path;

use log::{debug, warn};
use native_tls::{TlsConnector, TlsStream};
use thiserror::Error;

const USER_AGENT: &str = "Skiff/0.1";

/// URL schemes the fetcher understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    Http,
    Https,
    File,
    Data,
    About,
}

impl Scheme {
    pub fn as_str(self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
            Scheme::File => "file",
            Scheme::Data => "data",
            Scheme::About => "about",
        }
    }

    fn default_port(self) -> Option<u16> {
        match self {
            Scheme::Http => Some(80),
            Scheme::Https => Some(443),
            _ => None,
        }
    }
}

/// `(scheme, host, port)` triple used for same-origin and CSP checks.
/// Only http/https URLs have one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    pub scheme: Scheme,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("no scheme in {0:?}")]
    MissingScheme(String),
    #[error("unsupported scheme {0:?}")]
    UnsupportedScheme(String),
    #[error("bad port in {0:?}")]
    BadPort(String),
}

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("tls error: {0}")]
    Tls(#[from] native_tls::Error),
    #[error("tls handshake failed: {0}")]
    TlsHandshake(String),
    #[error("no host in URL")]
    NoHost,
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("refusing {0} response")]
    EncodingRefused(&'static str),
}

/// A parsed URL. `host` and `port` are only populated for network schemes;
/// for `data:` the entire `media,payload` blob lives in `path`.
#[derive(Debug, Clone, PartialEq)]
pub struct Url {
    pub scheme: Scheme,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub path: String,
    pub fragment: Option<String>,
}

impl Url {
    /// Parses a URL string. Parse failures collapse to `about:blank` so a
    /// bad URL never reaches the UI as an error.
    pub fn parse(url: &str) -> Url {
        match Url::try_parse(url) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!("malformed URL {:?} ({}), falling back to about:blank", url, err);
                Url::about_blank()
            }
        }
    }

    pub fn about_blank() -> Url {
        Url {
            scheme: Scheme::About,
            host: None,
            port: None,
            path: "blank".to_string(),
            fragment: None,
        }
    }

    pub fn try_parse(url: &str) -> Result<Url, ParseError> {
        // The fragment is stripped before any scheme handling.
        let (url, fragment) = match url.split_once('#') {
            Some((rest, frag)) => (rest, Some(frag.to_string())),
            None => (url, None),
        };

        if let Some(path) = url.strip_prefix("about:") {
            return Ok(Url {
                scheme: Scheme::About,
                host: None,
                port: None,
                path: path.to_string(),
                fragment,
            });
        }
        if let Some(payload) = url.strip_prefix("data:") {
            return Ok(Url {
                scheme: Scheme::Data,
                host: None,
                port: None,
                path: payload.to_string(),
                fragment,
            });
        }

        let (scheme, rest) = url
            .split_once("://")
            .ok_or_else(|| ParseError::MissingScheme(url.to_string()))?;
        let scheme = match scheme {
            "http" => Scheme::Http,
            "https" => Scheme::Https,
            "file" => Scheme::File,
            other => return Err(ParseError::UnsupportedScheme(other.to_string())),
        };

        if scheme == Scheme::File {
            let path = if rest.is_empty() { "/".to_string() } else { rest.to_string() };
            return Ok(Url {
                scheme,
                host: None,
                port: None,
                path,
                fragment,
            });
        }

        let (hostport, path) = match rest.split_once('/') {
            Some((hostport, path)) => (hostport, format!("/{}", path)),
            None => (rest, "/".to_string()),
        };
        let (host, port) = match hostport.split_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| ParseError::BadPort(url.to_string()))?;
                (host, port)
            }
            None => (hostport, scheme.default_port().unwrap_or(0)),
        };
        if host.is_empty() {
            return Err(ParseError::MissingScheme(url.to_string()));
        }

        Ok(Url {
            scheme,
            host: Some(host.to_string()),
            port: Some(port),
            path,
            fragment,
        })
    }

    /// Resolves `href` against this URL. Fragment-only links keep the base,
    /// absolute links re-parse, and relative paths join against the base
    /// path, each leading `..` collapsing one trailing path component.
    pub fn resolve(&self, href: &str) -> Url {
        if let Some(frag) = href.strip_prefix('#') {
            let mut url = self.clone();
            url.fragment = Some(frag.to_string());
            return url;
        }
        if href.contains("://") || href.starts_with("data:") || href.starts_with("about:") {
            return Url::parse(href);
        }

        let mut path = href.to_string();
        if !path.starts_with('/') {
            let mut dir = self.path.as_str();
            if !path.starts_with("../") {
                dir = dir.rsplit_once('/').map(|(head, _)| head).unwrap_or("");
            }
            while let Some(rest) = path.strip_prefix("../") {
                path = rest.to_string();
                if let Some((head, _)) = dir.rsplit_once('/') {
                    dir = head;
                }
            }
            path = format!("{}/{}", dir, path);
        }

        if let Some(protocol_relative) = path.strip_prefix("//") {
            return Url::parse(&format!("{}://{}", self.scheme.as_str(), protocol_relative));
        }
        match self.scheme {
            Scheme::File => Url::parse(&format!("file://{}", path)),
            Scheme::Http | Scheme::Https => {
                let host = self.host.as_deref().unwrap_or("");
                let port = self.port.or(self.scheme.default_port()).unwrap_or(0);
                Url::parse(&format!("{}://{}:{}{}", self.scheme.as_str(), host, port, path))
            }
            // Relative references are meaningless against data:/about: bases.
            _ => Url::about_blank(),
        }
    }

    pub fn origin(&self) -> Option<Origin> {
        match self.scheme {
            Scheme::Http | Scheme::Https => Some(Origin {
                scheme: self.scheme,
                host: self.host.clone()?,
                port: self.port.or(self.scheme.default_port())?,
            }),
            _ => None,
        }
    }

    /// Performs the scheme-appropriate fetch and returns case-folded response
    /// headers plus the body. Non-network schemes return empty headers.
    pub fn request(
        &self,
        referrer: Option<&Url>,
        payload: Option<&str>,
    ) -> Result<(HashMap<String, String>, String), RequestError> {
        match self.scheme {
            Scheme::About => Ok((HashMap::new(), String::new())),
            Scheme::Data => {
                let body = self
                    .path
                    .split_once(',')
                    .map(|(_, payload)| payload.to_string())
                    .unwrap_or_default();
                Ok((HashMap::new(), body))
            }
            Scheme::File => {
                let path = Path::new(&self.path);
                let body = if path.is_dir() {
                    directory_listing(path)?
                } else {
                    fs::read_to_string(path)?
                };
                Ok((HashMap::new(), body))
            }
            Scheme::Http | Scheme::Https => self.http_request(referrer, payload),
        }
    }

    fn http_request(
        &self,
        referrer: Option<&Url>,
        payload: Option<&str>,
    ) -> Result<(HashMap<String, String>, String), RequestError> {
        let host = self.host.as_deref().ok_or(RequestError::NoHost)?;
        let port = self.port.or(self.scheme.default_port()).unwrap_or(80);

        let tcp = TcpStream::connect((host, port))?;
        let mut stream = if self.scheme == Scheme::Https {
            let connector = TlsConnector::new()?;
            let tls = connector
                .connect(host, tcp)
                .map_err(|err| RequestError::TlsHandshake(err.to_string()))?;
            Stream::Tls(tls)
        } else {
            Stream::Plain(tcp)
        };

        let method = if payload.is_some() { "POST" } else { "GET" };
        let mut request = format!("{} {} HTTP/1.0\r\n", method, self.path);
        request.push_str(&format!("Host: {}\r\n", host));
        request.push_str("Connection: close\r\n");
        request.push_str(&format!("User-Agent: {}\r\n", USER_AGENT));
        if let Some(referrer) = referrer {
            request.push_str(&format!("Referer: {}\r\n", referrer));
        }
        if let Some(payload) = payload {
            request.push_str(&format!("Content-Length: {}\r\n", payload.len()));
        }
        request.push_str("\r\n");
        if let Some(payload) = payload {
            request.push_str(payload);
        }
        debug!("{} {}://{}:{}{}", method, self.scheme.as_str(), host, port, self.path);
        stream.write_all(request.as_bytes())?;

        let mut reader = BufReader::new(stream);
        let mut line = String::new();
        reader.read_line(&mut line)?;
        let mut parts = line.trim_end().splitn(3, ' ');
        let _version = parts
            .next()
            .ok_or_else(|| RequestError::MalformedResponse(line.clone()))?;
        let status = parts
            .next()
            .unwrap_or_default()
            .to_string();
        debug!("response status {:?}", status);

        let mut headers = HashMap::new();
        loop {
            line.clear();
            if reader.read_line(&mut line)? == 0 {
                break;
            }
            if line == "\r\n" || line == "\n" {
                break;
            }
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| RequestError::MalformedResponse(line.clone()))?;
            headers.insert(name.to_ascii_lowercase(), value.trim().to_string());
        }

        if headers.contains_key("transfer-encoding") {
            return Err(RequestError::EncodingRefused("transfer-encoded"));
        }
        if headers.contains_key("content-encoding") {
            return Err(RequestError::EncodingRefused("content-encoded"));
        }

        let mut body = String::new();
        reader.read_to_string(&mut body)?;
        Ok((headers, body))
    }
}

impl fmt::Display for Url {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.scheme {
            Scheme::About => write!(f, "about:{}", self.path)?,
            Scheme::Data => write!(f, "data:{}", self.path)?,
            Scheme::File => write!(f, "file://{}", self.path)?,
            Scheme::Http | Scheme::Https => {
                write!(f, "{}://", self.scheme.as_str())?;
                if let Some(host) = &self.host {
                    write!(f, "{}", host)?;
                }
                // The port stays in the serialization unless it is the
                // scheme default.
                if let Some(port) = self.port {
                    if Some(port) != self.scheme.default_port() {
                        write!(f, ":{}", port)?;
                    }
                }
                write!(f, "{}", self.path)?;
            }
        }
        if let Some(frag) = &self.fragment {
            write!(f, "#{}", frag)?;
        }
        Ok(())
    }
}

/// A blocking HTTP/1.0 connection, plain or TLS-wrapped.
enum Stream {
    Plain(TcpStream),
    Tls(TlsStream<TcpStream>),
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            Stream::Plain(inner) => inner.read(buf),
            Stream::Tls(inner) => inner.read(buf),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            Stream::Plain(inner) => inner.write(buf),
            Stream::Tls(inner) => inner.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Stream::Plain(inner) => inner.flush(),
            Stream::Tls(inner) => inner.flush(),
        }
    }
}

fn directory_listing(path: &Path) -> std::io::Result<String> {
    let mut names = Vec::new();
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        let mut name = entry.file_name().to_string_lossy().into_owned();
        if entry.file_type()?.is_dir() {
            name.push('/');
        }
        names.push(name);
    }
    names.sort();

    let mut body = String::from("<!doctype html><html><body>");
    body.push_str(&format!("<h1>Index of {}</h1>", path.display()));
    body.push_str("<ul>");
    body.push_str("<li><a href=\"../\">..</a></li>");
    for name in &names {
        body.push_str(&format!("<li><a href=\"{}\">{}</a></li>", name, name));
    }
    body.push_str("</ul></body></html>");
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write as _;

    #[test]
    fn parses_http_url() {
        let url = Url::parse("http://example.org/index.html");
        assert_eq!(url.scheme, Scheme::Http);
        assert_eq!(url.host.as_deref(), Some("example.org"));
        assert_eq!(url.port, Some(80));
        assert_eq!(url.path, "/index.html");
        assert_eq!(url.fragment, None);
    }

    #[test]
    fn parses_host_only_url() {
        let url = Url::parse("https://example.org");
        assert_eq!(url.port, Some(443));
        assert_eq!(url.path, "/");
    }

    #[test]
    fn parses_explicit_port_and_fragment() {
        let url = Url::parse("http://example.org:8080/a/b#sec");
        assert_eq!(url.port, Some(8080));
        assert_eq!(url.fragment.as_deref(), Some("sec"));
    }

    #[test]
    fn bad_urls_collapse_to_about_blank() {
        assert_eq!(Url::parse("not a url"), Url::about_blank());
        assert_eq!(Url::parse("gopher://example.org/"), Url::about_blank());
        assert_eq!(Url::parse("http://example.org:notaport/"), Url::about_blank());
    }

    #[test]
    fn display_round_trips() {
        for text in [
            "http://example.org/",
            "http://example.org:8080/a/b",
            "https://example.org/x#frag",
        ] {
            let url = Url::parse(text);
            assert_eq!(Url::parse(&url.to_string()), url);
        }
        // Default ports are dropped from the serialization.
        assert_eq!(Url::parse("http://example.org:80/").to_string(), "http://example.org/");
    }

    #[test]
    fn resolves_parent_relative_path() {
        let base = Url::parse("http://example.com:8080/a/b");
        let resolved = base.resolve("../c");
        assert_eq!(resolved.to_string(), "http://example.com:8080/a/c");
    }

    #[test]
    fn resolves_sibling_path() {
        let base = Url::parse("http://example.org/dir/page.html");
        assert_eq!(base.resolve("style.css").path, "/dir/style.css");
    }

    #[test]
    fn resolves_absolute_and_fragment() {
        let base = Url::parse("http://example.org/a/b");
        assert_eq!(base.resolve("https://other.org/x").to_string(), "https://other.org/x");
        let frag = base.resolve("#top");
        assert_eq!(frag.fragment.as_deref(), Some("top"));
        assert_eq!(frag.path, "/a/b");
    }

    #[test]
    fn resolve_is_idempotent_through_display() {
        let base = Url::parse("http://example.org/a/b");
        for href in ["../c", "d", "/e/f", "#frag", "//cdn.example.org/x"] {
            let once = base.resolve(href);
            assert_eq!(base.resolve(&once.to_string()), once);
        }
    }

    #[test]
    fn data_request_returns_payload() {
        let url = Url::parse("data:text/html,<b>hi</b>");
        let (headers, body) = url.request(None, None).unwrap();
        assert!(headers.is_empty());
        assert_eq!(body, "<b>hi</b>");
    }

    #[test]
    fn about_blank_request_is_empty() {
        let (_, body) = Url::about_blank().request(None, None).unwrap();
        assert_eq!(body, "");
    }

    #[test]
    fn file_request_reads_contents() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "<p>local</p>").unwrap();
        let url = Url::parse(&format!("file://{}", file.path().display()));
        let (_, body) = url.request(None, None).unwrap();
        assert_eq!(body, "<p>local</p>");
    }

    #[test]
    fn file_request_lists_directories() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("page.html"), "x").unwrap();
        let url = Url::parse(&format!("file://{}", dir.path().display()));
        let (_, body) = url.request(None, None).unwrap();
        assert!(body.contains("<a href=\"page.html\">page.html</a>"));
        assert!(body.contains("<a href=\"../\">..</a>"));
    }

    #[test]
    fn origin_is_defined_for_network_schemes_only() {
        let url = Url::parse("https://example.org/x");
        assert_eq!(
            url.origin(),
            Some(Origin {
                scheme: Scheme::Https,
                host: "example.org".to_string(),
                port: 443,
            })
        );
        assert_eq!(Url::parse("file:///home/").origin(), None);
        assert_eq!(Url::about_blank().origin(), None);
    }
}
