//! A watermarked, nonblocking byte sink to the application socket.
//!
//! Bytes handed to [`WriteChannel::feed`] are queued and an immediate
//! write attempt is made; whatever doesn't fit stays queued for the next
//! [`WriteChannel::on_writable`] call from the owning event loop. Once
//! the queue crosses `high_watermark`, [`WriteChannel::passed_threshold`]
//! latches `true` until the queue fully drains, so callers can use it as
//! a simple backpressure signal for whatever is feeding the channel.

use std::io::{self, Write};

use netbuf::Buf;

use error::Error;

pub struct WriteChannel {
    queue: Buf,
    high_watermark: usize,
    passed_threshold: bool,
    ended: bool,
    eof_started: bool,
    end_acked: bool,
    read_started: bool,
    buffers_flushed: Option<Box<dyn FnOnce()>>,
    data_flushed: Option<Box<dyn FnOnce()>>,
}

impl WriteChannel {
    pub fn new(high_watermark: usize) -> WriteChannel {
        WriteChannel {
            queue: Buf::new(),
            high_watermark,
            passed_threshold: false,
            ended: false,
            eof_started: false,
            end_acked: false,
            read_started: false,
            buffers_flushed: None,
            data_flushed: None,
        }
    }

    /// Queue `chunk` and attempt to write as much of the (now combined)
    /// queue as the socket will currently accept. A no-op once the
    /// channel has ended.
    pub fn feed<W: Write>(&mut self, chunk: &[u8], sink: &mut W) -> Result<(), Error> {
        if self.ended {
            return Ok(());
        }
        if !chunk.is_empty() {
            self.queue.write_all(chunk).expect("Buf::write_all is infallible");
            if self.queue.len() > self.high_watermark {
                self.passed_threshold = true;
            }
        }
        self.try_flush(sink)
    }

    /// Mark the channel ended: no more writes will be accepted. Still
    /// attempts to drain whatever is already queued.
    pub fn feed_eof<W: Write>(&mut self, sink: &mut W) -> Result<(), Error> {
        if self.ended {
            return Ok(());
        }
        self.ended = true;
        self.eof_started = true;
        self.try_flush(sink)
    }

    /// Resume draining the queue; call this when the owning event loop
    /// observes the socket become writable.
    pub fn on_writable<W: Write>(&mut self, sink: &mut W) -> Result<(), Error> {
        self.try_flush(sink)
    }

    /// Attempts a single write of whatever is queued. The owning event
    /// loop calls this once per writability notification; a short write
    /// just leaves the residue queued for the next call rather than
    /// spinning here until the socket blocks.
    fn try_flush<W: Write>(&mut self, sink: &mut W) -> Result<(), Error> {
        if !self.queue.is_empty() {
            match sink.write(&self.queue[..]) {
                Ok(0) => {}
                Ok(n) => {
                    self.queue.remove_range(..n);
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(ref e) if e.kind() == io::ErrorKind::BrokenPipe => {
                    self.ended = true;
                    return Err(Error::AppWritePipeBroken);
                }
                Err(e) => {
                    self.ended = true;
                    return Err(Error::AppWriteOther(e));
                }
            }
        }
        self.check_drained();
        Ok(())
    }

    fn check_drained(&mut self) {
        if !self.queue.is_empty() {
            return;
        }
        self.passed_threshold = false;
        if self.eof_started && !self.end_acked {
            self.end_acked = true;
            if let Some(cb) = self.data_flushed.take() {
                cb();
            }
        }
        if let Some(cb) = self.buffers_flushed.take() {
            cb();
        }
    }

    /// Registers a one-shot callback that fires the next time the queue
    /// fully drains. Replaces any previously registered callback.
    pub fn set_buffers_flushed_callback<F: FnOnce() + 'static>(&mut self, cb: F) {
        self.buffers_flushed = Some(Box::new(cb));
    }

    /// Registers a one-shot callback that fires once a prior
    /// [`WriteChannel::feed_eof`] has fully drained.
    pub fn set_data_flushed_callback<F: FnOnce() + 'static>(&mut self, cb: F) {
        self.data_flushed = Some(Box::new(cb));
    }

    pub fn clear_callbacks(&mut self) {
        self.buffers_flushed = None;
        self.data_flushed = None;
    }

    pub fn passed_threshold(&self) -> bool {
        self.passed_threshold
    }

    pub fn ended(&self) -> bool {
        self.ended
    }

    pub fn end_acked(&self) -> bool {
        self.end_acked
    }

    pub fn bytes_queued(&self) -> usize {
        self.queue.len()
    }

    /// Marks the read side as handed over to whoever consumes it (the
    /// response-forwarding path). A no-op after the first call; the
    /// request path only needs to call this once, to signal that
    /// reading may begin, not to actually perform any I/O itself.
    pub fn start_reading<F: FnOnce()>(&mut self, on_start: F) {
        if !self.read_started {
            self.read_started = true;
            on_start();
        }
    }

    pub fn read_started(&self) -> bool {
        self.read_started
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// A `Write` double that accepts at most `cap` bytes per call before
    /// reporting `WouldBlock`, and can be flipped to return errors.
    struct LimitedSink {
        cap: usize,
        written: Vec<u8>,
        err: Option<io::ErrorKind>,
    }

    impl LimitedSink {
        fn new(cap: usize) -> LimitedSink {
            LimitedSink { cap, written: Vec::new(), err: None }
        }
    }

    impl Write for LimitedSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if let Some(kind) = self.err {
                return Err(io::Error::new(kind, "injected failure"));
            }
            let n = buf.len().min(self.cap);
            if n == 0 {
                return Err(io::Error::new(io::ErrorKind::WouldBlock, "full"));
            }
            self.written.extend_from_slice(&buf[..n]);
            Ok(n)
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn feed_writes_immediately_when_socket_accepts_it_all() {
        let mut sink = LimitedSink::new(1024);
        let mut ch = WriteChannel::new(1024);
        ch.feed(b"hello world", &mut sink).unwrap();
        assert_eq!(sink.written, b"hello world");
        assert_eq!(ch.bytes_queued(), 0);
    }

    #[test]
    fn feed_queues_what_the_socket_would_block_on() {
        let mut sink = LimitedSink::new(4);
        let mut ch = WriteChannel::new(1024);
        ch.feed(b"hello world", &mut sink).unwrap();
        assert_eq!(sink.written, b"hell");
        assert_eq!(ch.bytes_queued(), 7);
        ch.on_writable(&mut sink).unwrap();
        assert_eq!(sink.written, b"hello wo");
        ch.on_writable(&mut sink).unwrap();
        ch.on_writable(&mut sink).unwrap();
        assert_eq!(sink.written, b"hello world");
        assert_eq!(ch.bytes_queued(), 0);
    }

    #[test]
    fn passed_threshold_latches_until_fully_drained() {
        let mut sink = LimitedSink::new(2);
        let mut ch = WriteChannel::new(4);
        ch.feed(b"0123456789", &mut sink).unwrap();
        assert!(ch.passed_threshold());
        ch.on_writable(&mut sink).unwrap();
        assert!(ch.passed_threshold(), "stays latched mid-drain");
        while ch.bytes_queued() > 0 {
            ch.on_writable(&mut sink).unwrap();
        }
        assert!(!ch.passed_threshold());
    }

    #[test]
    fn buffers_flushed_callback_fires_once_on_drain() {
        let mut sink = LimitedSink::new(2);
        let mut ch = WriteChannel::new(1024);
        ch.feed(b"abcdef", &mut sink).unwrap();
        let fired = Rc::new(RefCell::new(0));
        let fired2 = fired.clone();
        ch.set_buffers_flushed_callback(move || *fired2.borrow_mut() += 1);
        while ch.bytes_queued() > 0 {
            ch.on_writable(&mut sink).unwrap();
        }
        assert_eq!(*fired.borrow(), 1);
        // further drains (no-op, queue already empty) must not refire it
        ch.on_writable(&mut sink).unwrap();
        assert_eq!(*fired.borrow(), 1);
    }

    #[test]
    fn feed_eof_acks_once_queue_drains_and_fires_data_then_buffers_flushed() {
        let mut sink = LimitedSink::new(2);
        let mut ch = WriteChannel::new(1024);
        ch.feed(b"abcd", &mut sink).unwrap();
        let order = Rc::new(RefCell::new(Vec::new()));
        let o1 = order.clone();
        ch.set_data_flushed_callback(move || o1.borrow_mut().push("data"));
        let o2 = order.clone();
        ch.set_buffers_flushed_callback(move || o2.borrow_mut().push("buffers"));
        ch.feed_eof(&mut sink).unwrap();
        assert!(!ch.end_acked());
        while ch.bytes_queued() > 0 {
            ch.on_writable(&mut sink).unwrap();
        }
        assert!(ch.end_acked());
        assert_eq!(*order.borrow(), vec!["data", "buffers"]);
    }

    #[test]
    fn start_reading_fires_its_callback_exactly_once() {
        let mut ch = WriteChannel::new(1024);
        let calls = Rc::new(RefCell::new(0));
        let c1 = calls.clone();
        ch.start_reading(move || *c1.borrow_mut() += 1);
        assert!(ch.read_started());
        let c2 = calls.clone();
        ch.start_reading(move || *c2.borrow_mut() += 1);
        assert_eq!(*calls.borrow(), 1);
    }

    #[test]
    fn broken_pipe_ends_channel_and_further_feeds_are_noops() {
        let mut sink = LimitedSink::new(0);
        sink.err = Some(io::ErrorKind::BrokenPipe);
        let mut ch = WriteChannel::new(1024);
        let err = ch.feed(b"abc", &mut sink).unwrap_err();
        assert!(matches!(err, Error::AppWritePipeBroken));
        assert!(ch.ended());
        // no panic, no further attempt to write
        ch.feed(b"more", &mut sink).unwrap();
    }

    #[test]
    fn other_write_errors_are_reported_and_end_the_channel() {
        let mut sink = LimitedSink::new(0);
        sink.err = Some(io::ErrorKind::PermissionDenied);
        let mut ch = WriteChannel::new(1024);
        let err = ch.feed(b"abc", &mut sink).unwrap_err();
        assert!(matches!(err, Error::AppWriteOther(_)));
        assert!(ch.ended());
    }
}
