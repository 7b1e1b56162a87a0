//! `CONNECT` proxy negotiation (component K).

use super::{ProxyNegotiator, Step};
use crate::Error;
use data_encoding::BASE64;

pub struct HttpConnect {
    host: String,
    port: u16,
    auth: Option<(String, String)>,
    buf: Vec<u8>,
}

impl HttpConnect {
    pub fn new(host: String, port: u16, auth: Option<(String, String)>) -> Self {
        HttpConnect { host, port, auth, buf: Vec::new() }
    }
}

impl ProxyNegotiator for HttpConnect {
    fn start(&mut self) -> Vec<u8> {
        let mut req = format!("CONNECT {}:{} HTTP/1.1\r\nHost: {}:{}\r\n", self.host, self.port, self.host, self.port);
        if let Some((user, pass)) = &self.auth {
            let token = BASE64.encode(format!("{}:{}", user, pass).as_bytes());
            req.push_str(&format!("Proxy-Authorization: Basic {}\r\n", token));
        }
        req.push_str("\r\n");
        req.into_bytes()
    }

    fn feed(&mut self, data: &[u8]) -> Result<Step, Error> {
        self.buf.extend_from_slice(data);
        let text = String::from_utf8_lossy(&self.buf);
        if let Some(header_end) = text.find("\r\n\r\n") {
            let status_line = text.lines().next().unwrap_or("");
            let code: u32 = status_line.split_whitespace().nth(1).and_then(|s| s.parse().ok()).unwrap_or(0);
            let _ = header_end;
            if (200..300).contains(&code) {
                Ok(Step::Done)
            } else {
                Err(Error::Proxy(format!("HTTP CONNECT failed: {}", status_line)))
            }
        } else {
            Ok(Step::NeedMore)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn accepts_200_response() {
        let mut negotiator = HttpConnect::new("example.com".into(), 22, None);
        let req = negotiator.start();
        assert!(String::from_utf8_lossy(&req).starts_with("CONNECT example.com:22"));
        let step = negotiator.feed(b"HTTP/1.1 200 Connection established\r\n\r\n").unwrap();
        assert!(matches!(step, Step::Done));
    }

    #[test]
    fn rejects_error_status() {
        let mut negotiator = HttpConnect::new("example.com".into(), 22, None);
        let step = negotiator.feed(b"HTTP/1.1 407 Proxy Authentication Required\r\n\r\n");
        assert!(step.is_err());
    }

    #[test]
    fn waits_for_full_headers() {
        let mut negotiator = HttpConnect::new("example.com".into(), 22, None);
        assert!(matches!(negotiator.feed(b"HTTP/1.1 200 OK\r\n").unwrap(), Step::NeedMore));
    }
}
