//! Unifies the two socket families the application side can be reached
//! on (TCP or a Unix domain socket) behind one nonblocking I/O surface.

use std::io::{self, IoSlice, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::os::unix::net::UnixStream;

/// A nonblocking, half-closable duplex stream.
///
/// Implemented for the two concrete socket types the application
/// connection can be; both already give us everything we need directly
/// from `std`, including scatter-gather writes and a half-close that
/// only shuts down the write side.
pub trait AppStream: Read + Write {
    fn shutdown_write(&self) -> io::Result<()>;
}

impl AppStream for TcpStream {
    fn shutdown_write(&self) -> io::Result<()> {
        self.shutdown(Shutdown::Write)
    }
}

impl AppStream for UnixStream {
    fn shutdown_write(&self) -> io::Result<()> {
        self.shutdown(Shutdown::Write)
    }
}

/// Owned socket to the application, abstracting over the two transports
/// it may arrive over.
pub enum AppSocket {
    Tcp(TcpStream),
    Unix(UnixStream),
}

impl AppSocket {
    pub fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
        match *self {
            AppSocket::Tcp(ref s) => s.set_nonblocking(nonblocking),
            AppSocket::Unix(ref s) => s.set_nonblocking(nonblocking),
        }
    }
}

impl Read for AppSocket {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match *self {
            AppSocket::Tcp(ref mut s) => s.read(buf),
            AppSocket::Unix(ref mut s) => s.read(buf),
        }
    }
}

impl Write for AppSocket {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match *self {
            AppSocket::Tcp(ref mut s) => s.write(buf),
            AppSocket::Unix(ref mut s) => s.write(buf),
        }
    }

    fn write_vectored(&mut self, bufs: &[IoSlice]) -> io::Result<usize> {
        match *self {
            AppSocket::Tcp(ref mut s) => s.write_vectored(bufs),
            AppSocket::Unix(ref mut s) => s.write_vectored(bufs),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match *self {
            AppSocket::Tcp(ref mut s) => s.flush(),
            AppSocket::Unix(ref mut s) => s.flush(),
        }
    }
}

impl AppStream for AppSocket {
    fn shutdown_write(&self) -> io::Result<()> {
        match *self {
            AppSocket::Tcp(ref s) => s.shutdown(Shutdown::Write),
            AppSocket::Unix(ref s) => s.shutdown(Shutdown::Write),
        }
    }
}
