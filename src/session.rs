//! The connection to a single application process together with the
//! wire protocol negotiated for it.

use socket::AppStream;

/// Which wire protocol the header and body are encoded with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// Length-prefixed, NUL-terminated key/value pairs (the "Session"
    /// protocol), always followed by half-closing the write side once
    /// the body has been forwarded.
    Session,
    /// Plain HTTP/1.1 request line and headers.
    Http,
}

impl Protocol {
    /// Whether forwarding a request over this protocol ends with a
    /// `SHUT_WR` on the application socket once the request has been
    /// fully written.
    pub fn half_closes_app_connection(&self) -> bool {
        matches!(*self, Protocol::Session)
    }
}

/// An application connection: the stream plus the protocol and
/// authentication secret negotiated when it was established.
pub struct Session<S> {
    stream: S,
    protocol: Protocol,
    group_secret: Vec<u8>,
}

impl<S: AppStream> Session<S> {
    pub fn new(stream: S, protocol: Protocol, group_secret: Vec<u8>) -> Session<S> {
        Session { stream, protocol, group_secret }
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn group_secret(&self) -> &[u8] {
        &self.group_secret
    }

    pub fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    pub fn into_stream(self) -> S {
        self.stream
    }
}
