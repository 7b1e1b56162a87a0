//! Proxy negotiation (component K): the byte exchange needed before the
//! SSH transport itself can start, for each supported proxy kind. Every
//! negotiator is a small state machine fed bytes/producing bytes, so it
//! composes with the same sans-io style as [`crate::transport`].

pub mod http;
pub mod socks;
pub mod telnet;

use crate::Error;

/// One step of a proxy handshake: either more bytes to send and keep
/// waiting, or a final result.
pub enum Step {
    Send(Vec<u8>),
    NeedMore,
    Done,
}

pub trait ProxyNegotiator {
    /// Bytes to send to kick off the handshake.
    fn start(&mut self) -> Vec<u8>;
    /// Feed bytes read from the proxy; returns the next step.
    fn feed(&mut self, data: &[u8]) -> Result<Step, Error>;
}
