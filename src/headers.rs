//! Header containers for an already-parsed inbound request.
//!
//! Unlike the teacher's [`enums::headers::Header`], the set of header
//! names forwarded here isn't closed over a fixed enum: arbitrary client
//! headers flow through unchanged. `HeaderList` keeps insertion order and
//! duplicates so the wire serializers can re-emit exactly what arrived.

/// An ordered multimap of header name/value pairs, preserving duplicates.
#[derive(Debug, Default, Clone)]
pub struct HeaderList {
    entries: Vec<(String, String)>,
}

impl HeaderList {
    pub fn new() -> HeaderList {
        HeaderList { entries: Vec::new() }
    }

    pub fn push<N: Into<String>, V: Into<String>>(&mut self, name: N, value: V) {
        self.entries.push((name.into(), value.into()));
    }

    /// First value matching `name`, case-insensitively.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Request metadata the front-end derived on the client's behalf and
/// injects as trusted headers (`REMOTE_ADDR`, `HTTPS`, ...), kept
/// separate from headers the client itself sent.
#[derive(Debug, Default, Clone)]
pub struct SecureHeaders {
    entries: Vec<(String, String)>,
}

impl SecureHeaders {
    pub fn new() -> SecureHeaders {
        SecureHeaders { entries: Vec::new() }
    }

    pub fn set<N: Into<String>, V: Into<String>>(&mut self, name: N, value: V) {
        self.entries.push((name.into(), value.into()));
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn preserves_duplicates_and_order() {
        let mut h = HeaderList::new();
        h.push("Cookie", "a=1");
        h.push("Cookie", "b=2");
        h.push("Accept", "*/*");
        let collected: Vec<_> = h.iter().collect();
        assert_eq!(
            collected,
            vec![("Cookie", "a=1"), ("Cookie", "b=2"), ("Accept", "*/*")]
        );
    }

    #[test]
    fn get_is_case_insensitive_and_first_match() {
        let mut h = HeaderList::new();
        h.push("Content-Type", "text/plain");
        assert_eq!(h.get("content-type"), Some("text/plain"));
        assert_eq!(h.get("CONTENT-TYPE"), Some("text/plain"));
        assert_eq!(h.get("missing"), None);
    }

    #[test]
    fn secure_headers_lookup() {
        let mut sh = SecureHeaders::new();
        sh.set("REMOTE_ADDR", "127.0.0.1");
        assert_eq!(sh.get("remote_addr"), Some("127.0.0.1"));
        assert_eq!(sh.get("HTTPS"), None);
    }
}
