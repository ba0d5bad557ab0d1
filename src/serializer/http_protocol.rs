//! Serializes a request into a standard HTTP/1.1 request head and writes
//! it to the application socket with as few copies as possible.
//!
//! Unlike the Session protocol, nothing here is filtered: every header the
//! client sent is forwarded verbatim, in arrival order. The request line
//! and headers are first gathered as a list of borrowed byte slices (no
//! copying) and handed to the socket in a single vectored write; only if
//! the kernel accepts less than the whole thing do we fall back to
//! coalescing the remainder into one buffer and handing it to the
//! [`WriteChannel`].

use std::io::{self, IoSlice, Write};

use error::Error;
use request::ParsedRequest;
use socket::AppStream;
use write_channel::WriteChannel;

/// Typical Linux `IOV_MAX`/`UIO_MAXIOV`. `libc` doesn't expose this as a
/// portable constant, so it's hardcoded the way the cap is meant to be
/// used here: as an upper bound on how many slices a single `writev` is
/// worth attempting, not as a hard platform fact.
const OS_VECTORED_WRITE_LIMIT: usize = 1024;

fn max_vector_len(header_count: usize) -> usize {
    (4 + 4 * header_count + 4).min(OS_VECTORED_WRITE_LIMIT)
}

/// Builds the ordered list of byte slices making up the request head,
/// borrowing directly from `req` and the synthesized header values with
/// no copying.
fn header_parts<'a>(req: &'a ParsedRequest) -> Vec<&'a [u8]> {
    let mut parts = Vec::with_capacity(4 + req.headers.len() * 4 + 8);
    parts.push(req.method.as_str().as_bytes());
    parts.push(b" ");
    parts.push(req.path.as_bytes());
    parts.push(b" HTTP/1.1\r\n");

    for (name, value) in req.headers.iter() {
        parts.push(name.as_bytes());
        parts.push(b": ");
        parts.push(value.as_bytes());
        parts.push(b"\r\n");
    }

    if req.https {
        parts.push(b"X-Forwarded-Proto: https\r\n");
    }
    if let Some(addr) = req.secure_headers.get("REMOTE_ADDR") {
        if !addr.is_empty() {
            parts.push(b"X-Forwarded-For: ");
            parts.push(addr.as_bytes());
            parts.push(b"\r\n");
        }
    }
    if req.analytics_enabled {
        if let Some(ref txn) = req.transaction_id {
            parts.push(b"Passenger-Txn-Id: ");
            parts.push(txn.as_bytes());
            parts.push(b"\r\n");
        }
    }

    parts.push(b"\r\n");
    parts
}

fn coalesce(parts: &[&[u8]]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(parts.iter().map(|p| p.len()).sum());
    for part in parts {
        buf.extend_from_slice(part);
    }
    buf
}

/// Drops the already-written prefix (`offset` bytes, possibly zero) from
/// the coalesced head and hands the remainder to `channel`.
fn feed_remainder<S: AppStream>(
    parts: &[&[u8]],
    offset: usize,
    channel: &mut WriteChannel,
    socket: &mut S,
) -> Result<(), Error> {
    let buf = coalesce(parts);
    channel.feed(&buf[offset..], socket)
}

/// Serializes `req` as an HTTP/1.1 request head and writes it to the
/// application socket, falling back to the buffered path described in
/// `SPEC_FULL.md` section 4.1 on a short vectored write.
pub fn send_header<S: AppStream>(
    req: &ParsedRequest,
    socket: &mut S,
    channel: &mut WriteChannel,
) -> Result<(), Error> {
    let parts = header_parts(req);
    let cap = max_vector_len(req.headers.len());

    if parts.len() > cap {
        // More slices than a single writev is worth attempting for this
        // request; skip straight to the buffered path, as if the first
        // attempt had written zero bytes.
        return feed_remainder(&parts, 0, channel, socket);
    }

    let total: usize = parts.iter().map(|p| p.len()).sum();
    let slices: Vec<IoSlice> = parts.iter().map(|p| IoSlice::new(p)).collect();

    match socket.write_vectored(&slices) {
        Ok(n) if n == total => Ok(()),
        Ok(n) => feed_remainder(&parts, n, channel, socket),
        Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
            feed_remainder(&parts, 0, channel, socket)
        }
        Err(ref e) if e.kind() == io::ErrorKind::BrokenPipe => {
            Err(Error::AppWritePipeBroken)
        }
        Err(e) => Err(Error::AppWriteOther(e)),
    }
}
