//! SOCKS4 and SOCKS5 proxy negotiation (component K), including SOCKS5's
//! username/password (RFC 1929) and CHAP (HMAC-MD5 challenge-response)
//! authentication methods.

use super::{ProxyNegotiator, Step};
use crate::Error;
use hmac::{Hmac, Mac};
use md5::Md5;
use std::net::Ipv4Addr;

pub struct Socks4 {
    host_ip: Ipv4Addr,
    port: u16,
    user: String,
    sent: bool,
}

impl Socks4 {
    pub fn new(host_ip: Ipv4Addr, port: u16, user: &str) -> Self {
        Socks4 { host_ip, port, user: user.to_string(), sent: false }
    }
}

impl ProxyNegotiator for Socks4 {
    fn start(&mut self) -> Vec<u8> {
        let mut req = vec![4, 1]; // version 4, CONNECT
        req.extend(&self.port.to_be_bytes());
        req.extend(&self.host_ip.octets());
        req.extend(self.user.as_bytes());
        req.push(0);
        self.sent = true;
        req
    }

    fn feed(&mut self, data: &[u8]) -> Result<Step, Error> {
        if data.len() < 8 {
            return Ok(Step::NeedMore);
        }
        if data[0] != 0 {
            return Err(Error::Proxy("malformed SOCKS4 reply".into()));
        }
        match data[1] {
            90 => Ok(Step::Done),
            code => Err(Error::Proxy(format!("SOCKS4 request rejected, code {}", code))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Method {
    NoAuth,
    UsernamePassword,
    Chap,
}

enum State {
    SentGreeting,
    SentUserPass,
    SentChapRequest { challenge: Vec<u8> },
    SentConnect,
}

pub struct Socks5 {
    host: String,
    port: u16,
    credentials: Option<(String, String)>,
    state: State,
    buf: Vec<u8>,
}

impl Socks5 {
    pub fn new(host: String, port: u16, credentials: Option<(String, String)>) -> Self {
        Socks5 { host, port, credentials, state: State::SentGreeting, buf: Vec::new() }
    }

    fn connect_request(&self) -> Vec<u8> {
        let mut req = vec![5, 1, 0]; // version 5, CONNECT, reserved
        req.push(3); // ATYP domain name
        req.push(self.host.len() as u8);
        req.extend(self.host.as_bytes());
        req.extend(&self.port.to_be_bytes());
        req
    }
}

impl ProxyNegotiator for Socks5 {
    fn start(&mut self) -> Vec<u8> {
        let methods: Vec<u8> = if self.credentials.is_some() {
            vec![0x00, 0x02, 0x03] // no-auth, user/pass, CHAP
        } else {
            vec![0x00]
        };
        let mut greeting = vec![5, methods.len() as u8];
        greeting.extend(methods);
        self.state = State::SentGreeting;
        greeting
    }

    fn feed(&mut self, data: &[u8]) -> Result<Step, Error> {
        self.buf.extend_from_slice(data);
        loop {
            match &self.state {
                State::SentGreeting => {
                    if self.buf.len() < 2 {
                        return Ok(Step::NeedMore);
                    }
                    let method = match self.buf[1] {
                        0x00 => Method::NoAuth,
                        0x02 => Method::UsernamePassword,
                        0x03 => Method::Chap,
                        0xff => return Err(Error::Proxy("SOCKS5: no acceptable auth method".into())),
                        m => return Err(Error::Proxy(format!("SOCKS5: unknown method {}", m))),
                    };
                    self.buf.drain(..2);
                    match method {
                        Method::NoAuth => {
                            self.state = State::SentConnect;
                            return Ok(Step::Send(self.connect_request()));
                        }
                        Method::UsernamePassword => {
                            let (user, pass) = self.credentials.clone().expect("negotiated with credentials");
                            let mut req = vec![1, user.len() as u8];
                            req.extend(user.as_bytes());
                            req.push(pass.len() as u8);
                            req.extend(pass.as_bytes());
                            self.state = State::SentUserPass;
                            return Ok(Step::Send(req));
                        }
                        Method::Chap => {
                            let (user, _) = self.credentials.clone().expect("negotiated with credentials");
                            // Request variable CHAP: one attribute, username.
                            let mut req = vec![1, 1, 0x02, user.len() as u8];
                            req.extend(user.as_bytes());
                            self.state = State::SentChapRequest { challenge: Vec::new() };
                            return Ok(Step::Send(req));
                        }
                    }
                }
                State::SentUserPass => {
                    if self.buf.len() < 2 {
                        return Ok(Step::NeedMore);
                    }
                    let status = self.buf[1];
                    self.buf.drain(..2);
                    if status != 0 {
                        return Err(Error::Proxy("SOCKS5 username/password auth refused".into()));
                    }
                    self.state = State::SentConnect;
                    return Ok(Step::Send(self.connect_request()));
                }
                State::SentChapRequest { challenge } => {
                    // Server sends: version, status, attributes (0x03
                    // challenge, 0x05 algorithms); we reply with an
                    // HMAC-MD5 response once we have a full challenge.
                    if challenge.is_empty() {
                        if self.buf.len() < 2 {
                            return Ok(Step::NeedMore);
                        }
                        // Parse out the 0x03-tagged challenge attribute.
                        let mut pos = 2;
                        let mut found = None;
                        while pos + 2 <= self.buf.len() {
                            let tag = self.buf[pos];
                            let len = self.buf[pos + 1] as usize;
                            if pos + 2 + len > self.buf.len() {
                                return Ok(Step::NeedMore);
                            }
                            if tag == 0x03 {
                                found = Some(self.buf[pos + 2..pos + 2 + len].to_vec());
                            }
                            pos += 2 + len;
                        }
                        let challenge = found.ok_or_else(|| Error::Proxy("SOCKS5 CHAP: no challenge".into()))?;
                        self.buf.drain(..pos);
                        let (_, pass) = self.credentials.clone().expect("negotiated with credentials");
                        let mut mac = Hmac::<Md5>::new_from_slice(pass.as_bytes())
                            .expect("hmac accepts any key length");
                        mac.update(&challenge);
                        let response = mac.finalize().into_bytes();
                        let mut req = vec![1, 1, 0x04, response.len() as u8];
                        req.extend(response);
                        self.state = State::SentChapRequest { challenge };
                        return Ok(Step::Send(req));
                    }
                    if self.buf.len() < 2 {
                        return Ok(Step::NeedMore);
                    }
                    let status = self.buf[1];
                    self.buf.drain(..2);
                    if status != 0 {
                        return Err(Error::Proxy("SOCKS5 CHAP auth refused".into()));
                    }
                    self.state = State::SentConnect;
                    return Ok(Step::Send(self.connect_request()));
                }
                State::SentConnect => {
                    if self.buf.len() < 4 {
                        return Ok(Step::NeedMore);
                    }
                    if self.buf[0] != 5 {
                        return Err(Error::Proxy("malformed SOCKS5 reply".into()));
                    }
                    let rep = self.buf[1];
                    if rep != 0 {
                        return Err(Error::Proxy(format!("SOCKS5 request failed, reply code {}", rep)));
                    }
                    return Ok(Step::Done);
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn socks4_accepts_granted() {
        let mut negotiator = Socks4::new(Ipv4Addr::new(10, 0, 0, 1), 22, "bob");
        let _ = negotiator.start();
        let step = negotiator.feed(&[0, 90, 0, 0, 0, 0, 0, 0]).unwrap();
        assert!(matches!(step, Step::Done));
    }

    #[test]
    fn socks5_no_auth_flow() {
        let mut negotiator = Socks5::new("example.com".into(), 22, None);
        let greeting = negotiator.start();
        assert_eq!(greeting, vec![5, 1, 0]);
        let step = negotiator.feed(&[5, 0]).unwrap();
        assert!(matches!(step, Step::Send(_)));
        let step = negotiator.feed(&[5, 0, 0, 1, 0, 0, 0, 0, 0, 0]).unwrap();
        assert!(matches!(step, Step::Done));
    }

    #[test]
    fn socks5_username_password_flow() {
        let mut negotiator = Socks5::new("example.com".into(), 22, Some(("bob".into(), "hunter2".into())));
        let _ = negotiator.start();
        let step = negotiator.feed(&[5, 2]).unwrap();
        match step {
            Step::Send(req) => assert_eq!(req, b"\x01\x03bob\x07hunter2"),
            _ => panic!("expected a username/password request"),
        }
        let step = negotiator.feed(&[1, 0]).unwrap();
        assert!(matches!(step, Step::Send(_)));
    }
}
