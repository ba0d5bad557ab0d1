//! Translates an already-parsed client request into a backend
//! application's own wire protocol (the length-prefixed Session protocol
//! or plain HTTP/1.1) and drives writing it to the application socket,
//! including client body streaming with backpressure and the
//! half-close handshake the Session protocol expects.
//!
//! HTTP parsing, TLS termination, routing and response-side
//! transformations are someone else's job; this crate starts once a
//! request has already been parsed and an application session has
//! already been checked out.

extern crate netbuf;
#[macro_use(quick_error)] extern crate quick_error;
#[macro_use] extern crate matches;
#[macro_use] extern crate log;
extern crate byteorder;
extern crate libc;

mod error;
mod case_mapper;
mod headers;
mod request;
mod socket;
mod session;
mod pool;
mod config;
mod serializer;
mod write_channel;
mod body_pump;
mod lifecycle;

pub use error::Error;
pub use headers::{HeaderList, SecureHeaders};
pub use request::{Method, ParsedRequest};
pub use socket::{AppSocket, AppStream};
pub use session::{Protocol, Session};
pub use pool::{HeaderBuffer, MbufPool, PooledBuf};
pub use config::Config;
pub use write_channel::WriteChannel;
pub use body_pump::BodyChannel;
pub use lifecycle::{send_request, Request, RequestState};
