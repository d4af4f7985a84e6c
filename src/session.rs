//! Per-operation I/O sessions.
//!
//! A session is the scratch context a single read or append carries through
//! the file layer. The pool holds one session per admitted reader; the
//! coordinator keeps one extra session resident for the writer. Renting is
//! infallible because the shared lock already bounds the number of
//! concurrent readers to the pool size.

use std::sync::Mutex;

/// Scratch buffer for allocation-table I/O.
pub(crate) struct Session {
    buf: Vec<u8>,
}

impl Session {
    pub fn new(buffer_size: usize) -> Self {
        Self {
            buf: vec![0u8; buffer_size],
        }
    }

    /// A scratch slice of at most `len` bytes, capped at the session's
    /// buffer size.
    pub fn chunk(&mut self, len: usize) -> &mut [u8] {
        let len = len.min(self.buf.len());
        &mut self.buf[..len]
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }
}

pub(crate) struct SessionPool {
    buffer_size: usize,
    free: Mutex<Vec<Session>>,
}

impl SessionPool {
    pub fn new(buffer_size: usize, capacity: usize) -> Self {
        let free = (0..capacity).map(|_| Session::new(buffer_size)).collect();

        Self {
            buffer_size,
            free: Mutex::new(free),
        }
    }

    pub fn acquire(&self) -> Session {
        self.free
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_else(|| Session::new(self.buffer_size))
    }

    pub fn release(&self, session: Session) {
        self.free.lock().unwrap().push(session);
    }
}
