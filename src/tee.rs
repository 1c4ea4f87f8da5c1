/// Line sink shared by the stdout and stderr pumps: every line is appended to
/// an in-memory buffer and echoed to the console under a single lock, so
/// lines from the two streams never tear into each other.
use std::io::Write;
use std::sync::{Mutex, MutexGuard, PoisonError};

struct Inner {
    buffer: String,
    console: Box<dyn Write + Send>,
    closed: bool,
}

pub struct TeeSink {
    inner: Mutex<Inner>,
}

impl TeeSink {
    /// Sink that echoes to an arbitrary writer.
    pub fn new(console: Box<dyn Write + Send>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                buffer: String::new(),
                console,
                closed: false,
            }),
        }
    }

    /// Sink that echoes to this process's stdout.
    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a chunk of text and mirror it to the console.
    ///
    /// Dropped once the sink is closed.
    pub fn append(&self, text: &str) {
        let mut inner = self.lock();
        if inner.closed {
            tracing::debug!(bytes = text.len(), "append after close dropped");
            return;
        }
        inner.buffer.push_str(text);
        let echoed = inner
            .console
            .write_all(text.as_bytes())
            .and_then(|_| inner.console.flush());
        if let Err(e) = echoed {
            tracing::warn!(error = %e, "failed to mirror output to console");
        }
    }

    /// Finalize the sink and hand back everything captured so far.
    pub fn close(&self) -> String {
        let mut inner = self.lock();
        inner.closed = true;
        std::mem::take(&mut inner.buffer)
    }
}
