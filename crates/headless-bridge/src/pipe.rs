//! Background pipe readers
//!
//! A worker that writes to a pipe nobody reads eventually blocks. Each worker
//! gets one reader task per output stream, running independently of request
//! pacing:
//! - stdout lines go to an unbounded hand-off queue consumed by `receive`
//! - stderr lines go to a bounded [`DiagnosticTail`] used for error reports

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::{mpsc, watch};
use tracing::debug;

/// Number of stderr lines kept for error reports
pub const STDERR_TAIL_LINES: usize = 120;

/// Ring of the most recent stderr lines of a worker
#[derive(Debug, Clone)]
pub struct DiagnosticTail {
    lines: Arc<Mutex<VecDeque<String>>>,
    capacity: usize,
}

impl DiagnosticTail {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    /// Append a line, dropping the oldest one when full
    pub fn push(&self, line: String) {
        if self.capacity == 0 {
            return;
        }
        let mut lines = self.lock();
        if lines.len() == self.capacity {
            lines.pop_front();
        }
        lines.push_back(line);
    }

    /// Copy of the retained lines, oldest first
    pub fn lines(&self) -> Vec<String> {
        self.lock().iter().cloned().collect()
    }

    /// Retained lines joined with newlines
    pub fn render(&self) -> String {
        self.lines().join("\n")
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<String>> {
        // A panicking holder can only leave a complete deque behind
        self.lines.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for DiagnosticTail {
    fn default() -> Self {
        Self::new(STDERR_TAIL_LINES)
    }
}

/// Destination for lines drained from a pipe
pub trait LineSink: Send + 'static {
    /// Hand over one line. Returning `false` stops the reader.
    fn accept(&mut self, line: String) -> bool;
}

impl LineSink for mpsc::UnboundedSender<String> {
    fn accept(&mut self, line: String) -> bool {
        self.send(line).is_ok()
    }
}

impl LineSink for DiagnosticTail {
    fn accept(&mut self, line: String) -> bool {
        self.push(line);
        true
    }
}

/// Drain `reader` line by line into `sink`.
///
/// Ends on end-of-stream, on a read error, when the sink refuses a line, or
/// when `stop` is raised (or its sender dropped). Never fails.
pub async fn pipe_reader_task<R, S>(
    reader: R,
    mut sink: S,
    mut stop: watch::Receiver<bool>,
    label: &'static str,
) where
    R: AsyncRead + Unpin + Send + 'static,
    S: LineSink,
{
    if *stop.borrow() {
        return;
    }

    let mut lines = BufReader::new(reader).lines();
    loop {
        tokio::select! {
            biased;

            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    debug!("{} reader stopped", label);
                    break;
                }
            }

            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        if !sink.accept(line) {
                            debug!("{} consumer gone, reader exiting", label);
                            break;
                        }
                    }
                    Ok(None) => {
                        debug!("{} reached end of stream", label);
                        break;
                    }
                    Err(e) => {
                        debug!("{} read failed: {}", label, e);
                        break;
                    }
                }
            }
        }
    }
}
