//! Companion guestbook server: a tiny HTTP/1.0 form host on port 8000,
//! run as a separate process from the browser.

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};

use log::{info, warn};
use percent_encoding::percent_decode_str;

const COMMENT_JS: &str = include_str!("../../assets/comment.js");
const MAX_ENTRY_LEN: usize = 100;

fn main() -> std::io::Result<()> {
    env_logger::init();

    let mut entries = vec!["Pavel was here".to_string()];
    let listener = TcpListener::bind(("0.0.0.0", 8000))?;
    info!("guestbook listening on port 8000");

    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                if let Err(err) = handle_connection(stream, &mut entries) {
                    warn!("connection failed: {}", err);
                }
            }
            Err(err) => warn!("accept failed: {}", err),
        }
    }
    Ok(())
}

fn handle_connection(stream: TcpStream, entries: &mut Vec<String>) -> std::io::Result<()> {
    let mut reader = BufReader::new(stream);

    let mut request_line = String::new();
    reader.read_line(&mut request_line)?;
    let mut parts = request_line.trim_end().splitn(3, ' ');
    let method = parts.next().unwrap_or_default().to_string();
    let path = parts.next().unwrap_or_default().to_string();

    let mut headers = HashMap::new();
    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            break;
        }
        if line == "\r\n" || line == "\n" {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.to_ascii_lowercase(), value.trim().to_string());
        }
    }

    // POST bodies are Content-Length framed; a missing Content-Type is
    // tolerated.
    let body = match headers.get("content-length").and_then(|len| len.parse::<usize>().ok()) {
        Some(length) => {
            let mut buf = vec![0u8; length];
            reader.read_exact(&mut buf)?;
            Some(String::from_utf8_lossy(&buf).into_owned())
        }
        None => None,
    };

    let (status, out) = do_request(&method, &path, body.as_deref(), entries);
    info!("{} {} -> {}", method, path, status);

    let mut stream = reader.into_inner();
    let response = format!(
        "HTTP/1.0 {}\r\nContent-Length: {}\r\n\r\n{}",
        status,
        out.len(),
        out
    );
    stream.write_all(response.as_bytes())
}

fn do_request(
    method: &str,
    path: &str,
    body: Option<&str>,
    entries: &mut Vec<String>,
) -> (&'static str, String) {
    match (method, path) {
        ("GET", "/") => ("200 OK", show_comments(entries)),
        ("POST", "/add") => {
            let params = form_decode(body.unwrap_or_default());
            add_entry(&params, entries);
            ("200 OK", show_comments(entries))
        }
        ("GET", "/comment.js") => ("200 OK", COMMENT_JS.to_string()),
        _ => ("404 Not Found", not_found(method, path)),
    }
}

fn show_comments(entries: &[String]) -> String {
    let mut out = String::from("<!doctype html>");
    for entry in entries {
        out.push_str(&format!("<p>{}</p>", entry));
    }
    out.push_str("<form action=add method=post>");
    out.push_str("<p><input name=guest></p>");
    out.push_str("<strong></strong>");
    out.push_str("<p><button>Sign the book!</button></p>");
    out.push_str("</form>");
    out.push_str("<script src=/comment.js></script>");
    out
}

fn add_entry(params: &HashMap<String, String>, entries: &mut Vec<String>) {
    if let Some(guest) = params.get("guest") {
        if guest.chars().count() <= MAX_ENTRY_LEN {
            entries.push(guest.clone());
        }
    }
}

fn not_found(method: &str, path: &str) -> String {
    format!("<!doctype html><h1>{} {} not found!</h1>", method, path)
}

/// Decodes an `application/x-www-form-urlencoded` body.
fn form_decode(body: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    for pair in body.split('&') {
        let Some((name, value)) = pair.split_once('=') else {
            continue;
        };
        params.insert(unquote_plus(name), unquote_plus(value));
    }
    params
}

fn unquote_plus(text: &str) -> String {
    let replaced = text.replace('+', " ");
    percent_decode_str(&replaced).decode_utf8_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn form_decoding_handles_percent_and_plus() {
        let params = form_decode("guest=hi+there&note=a%20b%21");
        assert_eq!(params.get("guest").map(String::as_str), Some("hi there"));
        assert_eq!(params.get("note").map(String::as_str), Some("a b!"));
    }

    #[test]
    fn post_add_appends_and_caps_length() {
        let mut entries = vec!["seed".to_string()];
        let (status, page) = do_request("POST", "/add", Some("guest=hi"), &mut entries);
        assert_eq!(status, "200 OK");
        assert!(page.contains("<p>hi</p>"));
        assert_eq!(entries.len(), 2);

        let long = "x".repeat(101);
        do_request("POST", "/add", Some(&format!("guest={}", long)), &mut entries);
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn unknown_paths_are_404() {
        let mut entries = Vec::new();
        let (status, page) = do_request("GET", "/missing", None, &mut entries);
        assert_eq!(status, "404 Not Found");
        assert!(page.contains("not found"));
    }

    #[test]
    fn index_serves_the_form_and_script() {
        let mut entries = vec!["seed".to_string()];
        let (status, page) = do_request("GET", "/", None, &mut entries);
        assert_eq!(status, "200 OK");
        assert!(page.contains("<form action=add method=post>"));
        assert!(page.contains("<script src=/comment.js></script>"));
        assert!(page.contains("<p>seed</p>"));
    }
}
