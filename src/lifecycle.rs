//! Ties the header serializers, the Write Channel and the client body
//! source into the request's end-to-end lifecycle: header, then body (if
//! any), then waiting for the application's response, then half-close or
//! end.
//!
//! `Request<S, B>` is owned outright by whatever drives the event loop
//! (no shared ownership, no `Rc<RefCell<..>>`): every public method takes
//! `&mut self`. The one place this crate's own code needs to reach back
//! into a `Request` from a context that doesn't have `&mut self` handy is
//! the [`WriteChannel`]'s single-shot callbacks, which are plain `'static`
//! closures. Those closures capture a small `Rc<Cell<..>>` flag instead of
//! a back-reference to the request itself: they set the flag and return,
//! and the method that just called into the Write Channel checks the flag
//! immediately afterwards and acts on it with its own already-valid
//! `&mut self`. This sidesteps the double-borrow a `Weak<RefCell<Request>>`
//! callback would hit when the Write Channel drains synchronously inside
//! a call already holding `&mut self` (see `DESIGN.md`).

use std::cell::Cell;
use std::rc::Rc;

use error::Error;
use body_pump::{self, BodyChannel};
use config::Config;
use pool::MbufPool;
use request::ParsedRequest;
use serializer::{http_protocol, session_protocol};
use session::{Protocol, Session};
use socket::AppStream;
use write_channel::WriteChannel;

/// Where a request is in the header/body/response sequence.
///
/// Transitions monotonically: `SendingHeaderToApp` ->
/// `ForwardingBodyToApp` (skipped when there's no body to forward) ->
/// `WaitingForAppOutput` -> `Ended`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    SendingHeaderToApp,
    ForwardingBodyToApp,
    WaitingForAppOutput,
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Continuation {
    None,
    BeginBodyStage,
    ResumeBody,
}

/// A request in flight: the parsed client request, the application
/// session it's being forwarded to, and the plumbing driving that
/// forwarding.
pub struct Request<S: AppStream, B: BodyChannel> {
    state: RequestState,
    parsed: ParsedRequest,
    session: Session<S>,
    channel: WriteChannel,
    body: B,
    config: Rc<Config>,
    pool: MbufPool,
    half_close_app_connection: bool,
    response_begun: bool,
    ended: bool,
    shutdown_done: bool,
    pending_continuation: Rc<Cell<Continuation>>,
    pending_shutdown: Rc<Cell<bool>>,
    disconnect: Option<Box<dyn FnMut(String)>>,
    read_start_hook: Option<Box<dyn FnOnce()>>,
}

impl<S: AppStream, B: BodyChannel> Request<S, B> {
    pub fn new(
        parsed: ParsedRequest,
        session: Session<S>,
        config: Rc<Config>,
        pool: MbufPool,
        body: B,
    ) -> Request<S, B> {
        let half_close_app_connection = session.protocol().half_closes_app_connection();
        let channel = WriteChannel::new(config.high_watermark);
        Request {
            state: RequestState::SendingHeaderToApp,
            parsed,
            session,
            channel,
            body,
            config,
            pool,
            half_close_app_connection,
            response_begun: false,
            ended: false,
            shutdown_done: false,
            pending_continuation: Rc::new(Cell::new(Continuation::None)),
            pending_shutdown: Rc::new(Cell::new(false)),
            disconnect: None,
            read_start_hook: None,
        }
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    pub fn half_close_app_connection(&self) -> bool {
        self.half_close_app_connection
    }

    pub fn shutdown_performed(&self) -> bool {
        self.shutdown_done
    }

    /// Set by the (external) response path once it has started writing a
    /// response back to the client.
    pub fn mark_response_begun(&mut self) {
        self.response_begun = true;
    }

    /// Registers the sink for unrecoverable errors: invoked at most once,
    /// with a human-readable diagnostic, when the client connection must
    /// be torn down because of this request.
    pub fn set_disconnect_hook<F: FnMut(String) + 'static>(&mut self, hook: F) {
        self.disconnect = Some(Box::new(hook));
    }

    /// Registers the hook that lets the response-forwarding collaborator
    /// start reading the application's response socket. Fired at most
    /// once, as soon as the header has been handed to the Write Channel
    /// (not necessarily fully flushed yet, since most backends start
    /// producing a response before they've finished consuming the
    /// request).
    pub fn set_read_start_hook<F: FnOnce() + 'static>(&mut self, hook: F) {
        self.read_start_hook = Some(Box::new(hook));
    }

    /// Hands the application session back to its owner, e.g. to pass to
    /// the (external) response-forwarding collaborator. Only meaningful
    /// once this request no longer needs to write to it.
    pub fn into_session(self) -> Session<S> {
        self.session
    }

    /// Starts the engine: serializes and queues the request head, then
    /// begins forwarding the body (or moves straight to waiting for the
    /// application's response if there's no body).
    pub fn send(&mut self) -> Result<(), Error> {
        debug_assert!(matches!(self.state, RequestState::SendingHeaderToApp));
        let result = self.write_header();
        let hook = self.read_start_hook.take();
        self.channel.start_reading(move || {
            if let Some(hook) = hook {
                hook();
            }
        });
        match result {
            Ok(()) => {
                if self.channel.passed_threshold() {
                    let pending = self.pending_continuation.clone();
                    self.channel
                        .set_buffers_flushed_callback(move || pending.set(Continuation::BeginBodyStage));
                } else {
                    self.begin_body_or_wait();
                }
            }
            Err(e) => self.handle_app_input_error(e),
        }
        Ok(())
    }

    fn write_header(&mut self) -> Result<(), Error> {
        let Request { ref mut channel, ref mut session, ref parsed, ref config, ref pool, .. } = *self;
        match session.protocol() {
            Protocol::Session => {
                let buf = session_protocol::build(parsed, session, config, pool);
                channel.feed(&buf[..], session.stream_mut())
            }
            Protocol::Http => http_protocol::send_header(parsed, session.stream_mut(), channel),
        }
    }

    fn begin_body_or_wait(&mut self) {
        if self.parsed.has_body && !self.parsed.upgraded {
            self.state = RequestState::ForwardingBodyToApp;
            self.body.start();
        } else {
            self.state = RequestState::WaitingForAppOutput;
            self.maybe_half_close_app_input();
        }
    }

    /// Called by the owner of the client body source for every chunk (or
    /// end-of-stream notification) it reads.
    pub fn on_request_body(&mut self, chunk: &[u8], errcode: i32) {
        if self.ended {
            return;
        }
        if self.state != RequestState::ForwardingBodyToApp {
            // The application already closed its input (or we've moved
            // on for some other reason); drain without forwarding.
            return;
        }
        if !chunk.is_empty() {
            let result = {
                let Request { ref mut channel, ref mut session, .. } = *self;
                channel.feed(chunk, session.stream_mut())
            };
            self.drain_pending();
            match result {
                Ok(()) => {
                    if self.channel.passed_threshold() {
                        self.body.stop();
                        let pending = self.pending_continuation.clone();
                        self.channel
                            .set_buffers_flushed_callback(move || pending.set(Continuation::ResumeBody));
                    }
                }
                Err(e) => {
                    self.body.stop();
                    self.handle_app_input_error(e);
                }
            }
            return;
        }

        if body_pump::is_clean_eof(errcode) {
            self.state = RequestState::WaitingForAppOutput;
            self.maybe_half_close_app_input();
        } else {
            let message = Error::ClientBodyRead(errcode).to_string();
            self.fail(message);
        }
    }

    /// Called by the owner of the application socket once it becomes
    /// writable again, to resume draining whatever the Write Channel has
    /// queued.
    pub fn on_app_socket_writable(&mut self) {
        if self.ended {
            return;
        }
        let result = {
            let Request { ref mut channel, ref mut session, .. } = *self;
            channel.on_writable(session.stream_mut())
        };
        self.drain_pending();
        if let Err(e) = result {
            self.handle_app_input_error(e);
        }
    }

    fn maybe_half_close_app_input(&mut self) {
        if self.ended || !self.half_close_app_connection {
            return;
        }
        let result = {
            let Request { ref mut channel, ref mut session, .. } = *self;
            channel.feed_eof(session.stream_mut())
        };
        match result {
            Ok(()) => {}
            Err(e) => {
                self.handle_app_input_error(e);
                return;
            }
        }
        if self.channel.end_acked() {
            self.shutdown_write_now();
        } else {
            let pending = self.pending_shutdown.clone();
            self.channel.set_data_flushed_callback(move || pending.set(true));
        }
    }

    fn shutdown_write_now(&mut self) {
        if self.ended || self.shutdown_done {
            return;
        }
        self.shutdown_done = true;
        if let Err(e) = self.session.stream_mut().shutdown_write() {
            warn!("failed to shut down write side of application socket: {}", e);
        }
    }

    fn drain_pending(&mut self) {
        match self.pending_continuation.replace(Continuation::None) {
            Continuation::None => {}
            Continuation::BeginBodyStage => self.begin_body_or_wait(),
            Continuation::ResumeBody => {
                if !self.ended {
                    self.body.start();
                }
            }
        }
        if self.pending_shutdown.replace(false) {
            self.shutdown_write_now();
        }
    }

    fn handle_app_input_error(&mut self, err: Error) {
        match err {
            Error::AppWritePipeBroken => {
                warn!("application closed its input while we were still writing to it");
                // The application may still produce a valid response
                // from what it already read; let the response path take
                // over instead of failing the request.
                if self.state == RequestState::ForwardingBodyToApp {
                    self.body.stop();
                }
                self.state = RequestState::WaitingForAppOutput;
            }
            Error::AppWriteOther(io_err) => {
                if self.response_begun {
                    self.fail(format!("error writing to application socket: {}", io_err));
                } else {
                    self.end_cleanly();
                }
            }
            Error::ClientBodyRead(_) => {
                unreachable!("client body read errors are failed directly in on_request_body")
            }
        }
    }

    fn fail(&mut self, message: String) {
        if self.ended {
            return;
        }
        self.terminate_state();
        if let Some(hook) = self.disconnect.as_mut() {
            hook(message);
        }
    }

    fn end_cleanly(&mut self) {
        self.terminate_state();
    }

    fn terminate_state(&mut self) {
        if self.ended {
            return;
        }
        self.ended = true;
        self.state = RequestState::Ended;
        self.channel.clear_callbacks();
        self.body.stop();
    }

    /// Terminates the request from the outside (client disconnect,
    /// admission-level cancellation, ...). Clears pending callbacks,
    /// stops the body source, and guarantees the half-close path can
    /// never run afterwards. Does not close the session's file
    /// descriptor; that's released back to the pool by the session's
    /// owner.
    pub fn end(&mut self) {
        self.terminate_state();
    }
}

/// Starts forwarding `parsed` to the application over `session`: builds
/// the `Request` engine and immediately sends the header, beginning body
/// forwarding or the wait for the application's response as appropriate.
pub fn send_request<S: AppStream, B: BodyChannel>(
    parsed: ParsedRequest,
    session: Session<S>,
    config: Rc<Config>,
    pool: MbufPool,
    body: B,
) -> Result<Request<S, B>, Error> {
    let mut request = Request::new(parsed, session, config, pool, body);
    request.send()?;
    Ok(request)
}
