//! The two backend wire protocols a request's header can be serialized
//! into, selected by the checked-out `Session`'s protocol.

pub mod http_protocol;
pub mod session_protocol;
