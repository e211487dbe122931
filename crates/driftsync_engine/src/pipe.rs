//! In-process byte pipes.
//!
//! The engine's transport is an opaque pair of byte streams; these pipes
//! provide that pair inside one process, which is how the tests and the
//! demo wire a source worker to a destination worker. Reads block until
//! data arrives or the write end drops, which then reads as EOF.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::io::{Read, Write};
use std::sync::Arc;

struct Shared {
    state: Mutex<PipeState>,
    readable: Condvar,
}

struct PipeState {
    data: VecDeque<u8>,
    closed: bool,
}

/// Create a unidirectional byte pipe. Use two, crossed, for a duplex
/// connection between two workers.
pub fn pipe() -> (PipeWriter, PipeReader) {
    let shared = Arc::new(Shared {
        state: Mutex::new(PipeState {
            data: VecDeque::new(),
            closed: false,
        }),
        readable: Condvar::new(),
    });
    (
        PipeWriter {
            shared: Arc::clone(&shared),
        },
        PipeReader { shared },
    )
}

/// The write end of a pipe. Dropping it closes the pipe; the reader then
/// sees EOF once the buffer drains.
pub struct PipeWriter {
    shared: Arc<Shared>,
}

impl Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut state = self.shared.state.lock();
        state.data.extend(buf);
        self.shared.readable.notify_one();
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Drop for PipeWriter {
    fn drop(&mut self) {
        self.shared.state.lock().closed = true;
        self.shared.readable.notify_all();
    }
}

/// The read end of a pipe.
pub struct PipeReader {
    shared: Arc<Shared>,
}

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let mut state = self.shared.state.lock();
        while state.data.is_empty() {
            if state.closed {
                return Ok(0);
            }
            self.shared.readable.wait(&mut state);
        }

        let mut copied = 0;
        while copied < buf.len() {
            match state.data.pop_front() {
                Some(byte) => {
                    buf[copied] = byte;
                    copied += 1;
                }
                None => break,
            }
        }
        Ok(copied)
    }
}
