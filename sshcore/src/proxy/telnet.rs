//! Telnet-command proxy negotiation (component K): the proxy speaks no
//! protocol of its own, so the user supplies a command template with
//! `%host`/`%port`/`%user`/`%pass` placeholders, sent verbatim once the
//! connection opens.

use super::{ProxyNegotiator, Step};
use crate::Error;

pub struct TelnetCommand {
    command: String,
}

impl TelnetCommand {
    pub fn new(template: &str, host: &str, port: u16, user: &str, pass: &str) -> Self {
        let command = template
            .replace("%host", host)
            .replace("%port", &port.to_string())
            .replace("%user", user)
            .replace("%pass", pass);
        TelnetCommand { command }
    }
}

impl ProxyNegotiator for TelnetCommand {
    fn start(&mut self) -> Vec<u8> {
        let mut out = self.command.as_bytes().to_vec();
        out.extend(b"\r\n");
        out
    }

    /// There's no reply to parse: once the command is sent, the proxy is
    /// assumed connected immediately.
    fn feed(&mut self, _data: &[u8]) -> Result<Step, Error> {
        Ok(Step::Done)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn expands_placeholders() {
        let mut negotiator = TelnetCommand::new("connect %host %port as %user/%pass", "example.com", 22, "bob", "hunter2");
        let sent = negotiator.start();
        assert_eq!(sent, b"connect example.com 22 as bob/hunter2\r\n");
    }
}
