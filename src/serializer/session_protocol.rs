//! Serializes a request into the Session wire protocol: a 4-byte
//! big-endian length prefix followed by NUL-terminated key/value pairs,
//! the format SCGI-derived application servers speak.
//!
//! Sizing and filling are two separate passes over the same field list
//! so the destination buffer is allocated exactly once, at its final
//! size, with no resizing mid-construction.

use byteorder::{BigEndian, WriteBytesExt};

use case_mapper::scgi_uppercase_to_vec;
use config::Config;
use pool::{HeaderBuffer, MbufPool};
use request::ParsedRequest;
use session::Session;
use socket::AppStream;

const SKIPPED_CLIENT_HEADERS: [&str; 3] = ["content-type", "content-length", "connection"];

struct Field<'a> {
    key: Vec<u8>,
    value: &'a str,
}

fn fixed_fields<'a>(req: &'a ParsedRequest, session_secret: &'a [u8], config: &'a Config) -> Vec<Field<'a>> {
    let mut fields = Vec::new();
    fields.push(Field { key: b"REQUEST_URI".to_vec(), value: &req.path });
    fields.push(Field { key: b"PATH_INFO".to_vec(), value: req.path_info() });
    fields.push(Field { key: b"SCRIPT_NAME".to_vec(), value: "" });
    fields.push(Field { key: b"QUERY_STRING".to_vec(), value: req.query_string() });
    fields.push(Field { key: b"REQUEST_METHOD".to_vec(), value: req.method.as_str() });

    let (server_name, server_port) = split_host(req, config);
    fields.push(Field { key: b"SERVER_NAME".to_vec(), value: server_name });
    fields.push(Field { key: b"SERVER_PORT".to_vec(), value: server_port });

    if let Some(len) = req.content_length() {
        fields.push(Field { key: b"CONTENT_LENGTH".to_vec(), value: len });
    }
    fields.push(Field {
        key: b"PASSENGER_CONNECT_PASSWORD".to_vec(),
        // group_secret is opaque bytes in general, but in practice an
        // ASCII token; this forwarder treats it as such, matching the
        // collaborator contract in SPEC_FULL.md. Always present, even
        // when empty, per the wire contract in SPEC_FULL.md section 6.
        value: std::str::from_utf8(session_secret).unwrap_or(""),
    });
    if req.https {
        fields.push(Field { key: b"HTTPS".to_vec(), value: "on" });
    }
    if req.analytics_enabled {
        if let Some(ref txn) = req.transaction_id {
            fields.push(Field { key: b"PASSENGER_TXN_ID".to_vec(), value: txn });
        }
    }
    fields
}

fn split_host<'a>(req: &'a ParsedRequest, config: &'a Config) -> (&'a str, &'a str) {
    match req.headers.get("Host") {
        Some(host) => match host.rfind(':') {
            Some(idx) => (&host[..idx], &host[idx + 1..]),
            None => (host, "80"),
        },
        None => (&config.default_server_name, &config.default_server_port),
    }
}

fn field_size(field: &Field) -> usize {
    field.key.len() + 1 + field.value.len() + 1
}

/// Computes the exact byte size of the serialized header (not including
/// the 4-byte length prefix).
pub fn header_size<S: AppStream>(req: &ParsedRequest, session: &Session<S>, config: &Config) -> usize {
    let fixed = fixed_fields(req, session.group_secret(), config);
    let mut size: usize = fixed.iter().map(field_size).sum();

    for (name, value) in req.headers.iter() {
        if SKIPPED_CLIENT_HEADERS.iter().any(|s| name.eq_ignore_ascii_case(s)) {
            continue;
        }
        size += 5 /* "HTTP_" */ + name.len() + 1 + value.len() + 1;
    }
    size
}

fn write_field(buf: &mut [u8], offset: &mut usize, key: &[u8], value: &[u8]) {
    let end = *offset + key.len();
    buf[*offset..end].copy_from_slice(key);
    buf[end] = 0;
    let start = end + 1;
    let end = start + value.len();
    buf[start..end].copy_from_slice(value);
    buf[end] = 0;
    *offset = end + 1;
}

/// Fills `buf` (sized exactly to [`header_size`]) with the serialized
/// fields.
pub fn write_header<S: AppStream>(
    buf: &mut [u8],
    req: &ParsedRequest,
    session: &Session<S>,
    config: &Config,
) {
    let fixed = fixed_fields(req, session.group_secret(), config);
    let mut offset = 0;
    for field in &fixed {
        write_field(buf, &mut offset, &field.key, field.value.as_bytes());
    }
    for (name, value) in req.headers.iter() {
        if SKIPPED_CLIENT_HEADERS.iter().any(|s| name.eq_ignore_ascii_case(s)) {
            continue;
        }
        let mut key = Vec::with_capacity(5 + name.len());
        key.extend_from_slice(b"HTTP_");
        key.extend(scgi_uppercase_to_vec(name));
        write_field(buf, &mut offset, &key, value.as_bytes());
    }
    debug_assert_eq!(offset, buf.len());
}

/// Builds the full wire message (length prefix + fields) for the
/// Session protocol, drawing its scratch buffer from `pool`.
pub fn build<S: AppStream>(
    req: &ParsedRequest,
    session: &Session<S>,
    config: &Config,
    pool: &MbufPool,
) -> HeaderBuffer {
    let body_size = header_size(req, session, config);
    let mut buf = HeaderBuffer::for_size(pool, body_size + 4);
    (&mut buf[..4]).write_u32::<BigEndian>(body_size as u32).expect("slice write");
    write_header(&mut buf[4..], req, session, config);
    buf
}

#[cfg(test)]
mod test {
    use super::*;
    use headers::{HeaderList, SecureHeaders};
    use request::Method;
    use session::Protocol;
    use std::os::unix::net::UnixStream;

    fn sample_request() -> ParsedRequest {
        let mut headers = HeaderList::new();
        headers.push("Host", "example.com:8080");
        headers.push("Content-Type", "text/plain");
        headers.push("X-Custom", "yes");
        let mut secure = SecureHeaders::new();
        secure.set("REMOTE_ADDR", "10.0.0.1");
        ParsedRequest {
            method: Method::Get,
            path: "/foo/bar?a=1".into(),
            headers,
            secure_headers: secure,
            has_body: false,
            upgraded: false,
            https: false,
            transaction_id: Some("abc-123".into()),
            analytics_enabled: true,
        }
    }

    #[test]
    fn header_size_matches_actual_written_length() {
        let (a, _b) = UnixStream::pair().unwrap();
        let session = Session::new(a, Protocol::Session, b"s3cr3t".to_vec());
        let config = Config::new().done();
        let req = sample_request();
        let size = header_size(&req, &session, &config);
        let mut buf = vec![0u8; size];
        write_header(&mut buf, &req, &session, &config);
        assert_eq!(size, buf.len());
    }

    #[test]
    fn fields_are_nul_terminated_key_value_pairs() {
        let (a, _b) = UnixStream::pair().unwrap();
        let session = Session::new(a, Protocol::Session, Vec::new());
        let config = Config::new().done();
        let req = sample_request();
        let size = header_size(&req, &session, &config);
        let mut buf = vec![0u8; size];
        write_header(&mut buf, &req, &session, &config);

        let text = String::from_utf8_lossy(&buf);
        let parts: Vec<&str> = text.split('\0').filter(|s| !s.is_empty()).collect();
        assert_eq!(parts[0], "REQUEST_URI");
        assert_eq!(parts[1], "/foo/bar?a=1");
        assert!(parts.contains(&"REQUEST_METHOD"));
        assert!(parts.contains(&"GET"));
        assert!(parts.contains(&"SERVER_NAME"));
        assert!(parts.contains(&"example.com"));
        assert!(parts.contains(&"SERVER_PORT"));
        assert!(parts.contains(&"8080"));
        assert!(parts.contains(&"PASSENGER_TXN_ID"));
        assert!(parts.contains(&"HTTP_X_CUSTOM"));
        // content-type is a skipped client header; must not appear as HTTP_
        assert!(!parts.contains(&"HTTP_CONTENT_TYPE"));
        assert!(parts.contains(&"PASSENGER_CONNECT_PASSWORD"));
    }

    #[test]
    fn secret_field_is_always_present_even_when_empty() {
        let (a, _b) = UnixStream::pair().unwrap();
        let session = Session::new(a, Protocol::Session, Vec::new());
        let config = Config::new().done();
        let req = sample_request();
        let size = header_size(&req, &session, &config);
        let mut buf = vec![0u8; size];
        write_header(&mut buf, &req, &session, &config);
        let text = String::from_utf8_lossy(&buf);
        assert!(text.contains("PASSENGER_CONNECT_PASSWORD\0\0"));
    }

    #[test]
    fn secret_field_carries_the_configured_value() {
        let (a, _b) = UnixStream::pair().unwrap();
        let session = Session::new(a, Protocol::Session, b"topsecret".to_vec());
        let config = Config::new().done();
        let req = sample_request();
        let size = header_size(&req, &session, &config);
        let mut buf = vec![0u8; size];
        write_header(&mut buf, &req, &session, &config);
        let text = String::from_utf8_lossy(&buf);
        assert!(text.contains("PASSENGER_CONNECT_PASSWORD\0topsecret\0"));
    }

    #[test]
    fn query_string_token_includes_leading_question_mark() {
        let (a, _b) = UnixStream::pair().unwrap();
        let session = Session::new(a, Protocol::Session, Vec::new());
        let config = Config::new().done();
        let req = sample_request();
        let size = header_size(&req, &session, &config);
        let mut buf = vec![0u8; size];
        write_header(&mut buf, &req, &session, &config);
        let text = String::from_utf8_lossy(&buf);
        assert!(text.contains("QUERY_STRING\0?a=1\0"));
    }

    #[test]
    fn build_prefixes_body_with_big_endian_length() {
        let (a, _b) = UnixStream::pair().unwrap();
        let session = Session::new(a, Protocol::Session, Vec::new());
        let config = Config::new().done();
        let pool = MbufPool::new(4096);
        let req = sample_request();
        let body_size = header_size(&req, &session, &config);
        let msg = build(&req, &session, &config, &pool);
        let prefix = u32::from_be_bytes([msg[0], msg[1], msg[2], msg[3]]);
        assert_eq!(prefix as usize, body_size);
        assert_eq!(msg.len(), body_size + 4);
    }
}
