//! Fan-out writer for command output
//!
//! A [`Tee`] holds an ordered list of [`Sink`]s and copies every write to all
//! of them. The list can be changed while output is flowing, e.g. to stop
//! echoing to the terminal once a buffer has taken over.

use std::fmt;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;

/// Errors from one or more sinks during a tee operation
#[derive(Debug, Error)]
#[error("{}", join_errors(.errors))]
pub struct TeeError {
    pub errors: Vec<io::Error>,
}

fn join_errors(errors: &[io::Error]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<TeeError> for io::Error {
    fn from(err: TeeError) -> Self {
        io::Error::other(err)
    }
}

enum SinkState {
    Open {
        writer: Box<dyn Write + Send>,
        closable: bool,
    },
    Closed,
}

/// A shareable output destination.
///
/// Clones refer to the same destination; identity is what
/// [`Tee::remove_sink`] compares.
#[derive(Clone)]
pub struct Sink {
    state: Arc<Mutex<SinkState>>,
}

impl Sink {
    /// Wrap a writer that is left open by [`Sink::close`]
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self::with_state(Box::new(writer), false)
    }

    /// Wrap a writer that is flushed and dropped by [`Sink::close`]
    pub fn closable(writer: impl Write + Send + 'static) -> Self {
        Self::with_state(Box::new(writer), true)
    }

    /// The host process stdout
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    /// The host process stderr
    pub fn stderr() -> Self {
        Self::new(io::stderr())
    }

    /// Create or truncate `path` and write to it
    pub fn file(path: impl AsRef<Path>) -> io::Result<Self> {
        Ok(Self::closable(File::create(path)?))
    }

    fn with_state(writer: Box<dyn Write + Send>, closable: bool) -> Self {
        Self {
            state: Arc::new(Mutex::new(SinkState::Open { writer, closable })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SinkState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Whether both handles refer to the same destination
    pub fn same(&self, other: &Sink) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }

    /// Write the whole buffer
    pub fn write_bytes(&self, buf: &[u8]) -> io::Result<()> {
        match &mut *self.lock() {
            SinkState::Open { writer, .. } => writer.write_all(buf),
            SinkState::Closed => Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink is closed")),
        }
    }

    pub fn flush(&self) -> io::Result<()> {
        match &mut *self.lock() {
            SinkState::Open { writer, .. } => writer.flush(),
            SinkState::Closed => Ok(()),
        }
    }

    /// Close the sink if it owns its writer; other sinks are only flushed
    pub fn close(&self) -> io::Result<()> {
        let mut state = self.lock();
        match &mut *state {
            SinkState::Open { writer, closable } => {
                writer.flush()?;
                if *closable {
                    *state = SinkState::Closed;
                }
                Ok(())
            }
            SinkState::Closed => Ok(()),
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(*self.lock(), SinkState::Closed)
    }
}

impl PartialEq for Sink {
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

impl fmt::Debug for Sink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sink")
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// In-memory buffer shared between a sink and its reader
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink writing into this buffer
    pub fn sink(&self) -> Sink {
        Sink::new(self.clone())
    }

    /// Contents decoded as UTF-8, lossily
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.lock()).into_owned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, Vec<u8>> {
        self.bytes.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Writer duplicating output to every registered sink
#[derive(Debug, Default)]
pub struct Tee {
    sinks: Mutex<Vec<Sink>>,
}

impl Tee {
    pub fn new(sinks: Vec<Sink>) -> Self {
        Self {
            sinks: Mutex::new(sinks),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Sink>> {
        self.sinks.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_sink(&self, sink: Sink) {
        self.lock().push(sink);
    }

    /// Remove every registration of `sink`; returns whether one was found
    pub fn remove_sink(&self, sink: &Sink) -> bool {
        let mut sinks = self.lock();
        let before = sinks.len();
        sinks.retain(|s| !s.same(sink));
        sinks.len() != before
    }

    /// Swap in a new sink list. Old sinks are not closed.
    pub fn replace_sinks(&self, sinks: Vec<Sink>) -> Vec<Sink> {
        std::mem::replace(&mut *self.lock(), sinks)
    }

    /// Snapshot of the current sinks
    pub fn sinks(&self) -> Vec<Sink> {
        self.lock().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Write `buf` to every sink.
    ///
    /// A failing sink does not stop the others; all failures are returned
    /// together. The sink list lock is released before any sink is written.
    pub fn write_bytes(&self, buf: &[u8]) -> Result<usize, TeeError> {
        let sinks = self.sinks();
        let errors: Vec<io::Error> = sinks
            .iter()
            .filter_map(|sink| sink.write_bytes(buf).err())
            .collect();

        if errors.is_empty() {
            Ok(buf.len())
        } else {
            Err(TeeError { errors })
        }
    }

    /// Close every sink, joining their errors
    pub fn close(&self) -> Result<(), TeeError> {
        let errors: Vec<io::Error> = self
            .sinks()
            .iter()
            .filter_map(|sink| sink.close().err())
            .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(TeeError { errors })
        }
    }
}

impl Write for &Tee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(self.write_bytes(buf)?)
    }

    fn flush(&mut self) -> io::Result<()> {
        let errors: Vec<io::Error> = self
            .sinks()
            .iter()
            .filter_map(|sink| sink.flush().err())
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(TeeError { errors }.into())
        }
    }
}
