use std::io;

quick_error! {
    /// Errors that can occur while forwarding a request to the backend
    /// application.
    #[derive(Debug)]
    pub enum Error {
        /// The application closed its end of the socket while we still had
        /// bytes queued for it (`EPIPE` on write).
        ///
        /// Non-fatal: the response path may still produce a usable
        /// response, so the request is not aborted because of this alone.
        AppWritePipeBroken {
            description("application closed the connection while \
                writing request")
        }
        /// Any other write failure on the application socket.
        AppWriteOther(err: io::Error) {
            description("error writing to application socket")
            display("error writing to application socket: {}", err)
            cause(err)
        }
        /// The client body source reported a read error (non-zero,
        /// non-`ECONNRESET` errno).
        ClientBodyRead(errno: i32) {
            description("error reading request body from client")
            display("error reading request body from client: {} (errno={})",
                describe_errno(*errno), errno)
        }
    }
}

/// Best-effort human readable description of a raw POSIX errno, the way
/// the application that originated this crate's design used to format
/// them in its own log lines.
pub fn describe_errno(errno: i32) -> String {
    io::Error::from_raw_os_error(errno).to_string()
}
