//! A small recycling pool for header scratch buffers, plus a plain
//! fallback for requests whose serialized header exceeds the pool's
//! chunk size.
//!
//! The original request-forwarding engine drew these buffers from a
//! process-wide memory-block pool so that the common case (a header
//! that fits one block) never touches the general allocator. This is
//! the same two-tier idea, sized without a global: callers construct
//! one `MbufPool` and hand clones of it (cheap, `Rc`-backed) to
//! whichever requests need a buffer.

use std::cell::RefCell;
use std::ops::{Deref, DerefMut};
use std::rc::Rc;

struct Inner {
    chunk_size: usize,
    free: Vec<Vec<u8>>,
}

/// A shared, single-threaded pool of fixed-size byte buffers.
#[derive(Clone)]
pub struct MbufPool {
    inner: Rc<RefCell<Inner>>,
}

impl MbufPool {
    pub fn new(chunk_size: usize) -> MbufPool {
        MbufPool {
            inner: Rc::new(RefCell::new(Inner { chunk_size, free: Vec::new() })),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.inner.borrow().chunk_size
    }

    /// Borrow a zero-filled buffer of exactly `chunk_size()` bytes, either
    /// recycled from a prior request or freshly allocated.
    pub fn get(&self) -> PooledBuf {
        let mut inner = self.inner.borrow_mut();
        let mut data = inner.free.pop().unwrap_or_default();
        let chunk_size = inner.chunk_size;
        data.clear();
        data.resize(chunk_size, 0);
        PooledBuf { data, pool: self.inner.clone() }
    }
}

/// A buffer borrowed from an [`MbufPool`]; returned to the pool's free
/// list when dropped.
pub struct PooledBuf {
    data: Vec<u8>,
    pool: Rc<RefCell<Inner>>,
}

impl Deref for PooledBuf {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl DerefMut for PooledBuf {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl Drop for PooledBuf {
    fn drop(&mut self) {
        let data = ::std::mem::take(&mut self.data);
        self.pool.borrow_mut().free.push(data);
    }
}

/// The header-construction scratch space for one request: either a
/// pooled block, when the serialized header fits one, or a one-off
/// allocation sized exactly to the header when it doesn't.
///
/// A pooled block's underlying storage is always `chunk_size` bytes (so
/// it can be recycled for any request), which is usually wider than
/// what this particular header needs; the `usize` tags the actual used
/// length so `Deref`/`DerefMut` never expose the unused pool slack.
pub enum HeaderBuffer {
    Pooled(PooledBuf, usize),
    Owned(Vec<u8>),
}

impl HeaderBuffer {
    /// Picks a pooled block when `size` fits, otherwise allocates exactly
    /// `size` bytes.
    pub fn for_size(pool: &MbufPool, size: usize) -> HeaderBuffer {
        if size <= pool.chunk_size() {
            HeaderBuffer::Pooled(pool.get(), size)
        } else {
            HeaderBuffer::Owned(vec![0u8; size])
        }
    }
}

impl Deref for HeaderBuffer {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        match *self {
            HeaderBuffer::Pooled(ref b, size) => &b[..size],
            HeaderBuffer::Owned(ref v) => v,
        }
    }
}

impl DerefMut for HeaderBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        match *self {
            HeaderBuffer::Pooled(ref mut b, size) => &mut b[..size],
            HeaderBuffer::Owned(ref mut v) => v,
        }
    }
}
