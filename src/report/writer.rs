//! Output destinations for report sinks
//!
//! A [`Destination`] names where a sink writes; opening it yields a
//! [`SharedWriter`] that concurrent per-test reports can hold. Per-test output is
//! either written straight through or buffered and flushed in one piece.

use std::fs::OpenOptions;
use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// How an output file is opened
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum OpenMode {
    #[default]
    Truncate,
    Append,
}

impl OpenMode {
    /// Accepts `w`/`write`/`truncate` and `a`/`append` (binary and `+` flags are ignored)
    pub fn from_str(s: &str) -> Option<Self> {
        let s = s.to_lowercase();
        match s.trim_end_matches(['b', '+']) {
            "w" | "write" | "truncate" => Some(OpenMode::Truncate),
            "a" | "append" => Some(OpenMode::Append),
            _ => None,
        }
    }
}

/// In-memory destination, mostly for tests
#[derive(Clone, Debug, Default)]
pub struct MemoryBuffer(Arc<Mutex<Vec<u8>>>);

impl MemoryBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        match self.0.lock() {
            Ok(buf) => String::from_utf8_lossy(&buf).into_owned(),
            Err(poisoned) => String::from_utf8_lossy(&poisoned.into_inner()).into_owned(),
        }
    }
}

impl Write for MemoryBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "memory buffer poisoned"))?
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Where a sink writes
#[derive(Clone, Debug)]
pub enum Destination {
    Stdout,
    Stderr,
    File { path: PathBuf, mode: OpenMode },
    Memory(MemoryBuffer),
}

impl Destination {
    /// `stdout`, `stderr`, or a file path
    pub fn parse(target: &str, mode: OpenMode) -> Self {
        match target {
            "stdout" | "-" => Destination::Stdout,
            "stderr" => Destination::Stderr,
            path => Destination::File {
                path: PathBuf::from(path),
                mode,
            },
        }
    }

    /// Open the destination, creating or truncating files as the mode says
    pub fn open(&self) -> io::Result<SharedWriter> {
        let (writer, is_terminal): (Box<dyn Write + Send>, bool) = match self {
            Destination::Stdout => (Box::new(io::stdout()), io::stdout().is_terminal()),
            Destination::Stderr => (Box::new(io::stderr()), io::stderr().is_terminal()),
            Destination::File { path, mode } => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
                let mut options = OpenOptions::new();
                match mode {
                    OpenMode::Truncate => options.write(true).create(true).truncate(true),
                    OpenMode::Append => options.append(true).create(true),
                };
                (Box::new(options.open(path)?), false)
            }
            Destination::Memory(buffer) => (Box::new(buffer.clone()), false),
        };
        Ok(SharedWriter {
            inner: Arc::new(Mutex::new(writer)),
            is_terminal,
        })
    }
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Destination::Stdout => write!(f, "stdout"),
            Destination::Stderr => write!(f, "stderr"),
            Destination::File { path, .. } => write!(f, "{}", path.display()),
            Destination::Memory(_) => write!(f, "memory"),
        }
    }
}

/// Stream shared by a suite sink and its per-test reports
#[derive(Clone)]
pub struct SharedWriter {
    inner: Arc<Mutex<Box<dyn Write + Send>>>,
    is_terminal: bool,
}

impl SharedWriter {
    /// Write all bytes and flush under one lock
    pub fn write_all(&self, bytes: &[u8]) -> io::Result<()> {
        let mut writer = self
            .inner
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "output stream poisoned"))?;
        writer.write_all(bytes)?;
        writer.flush()
    }

    pub fn write_str(&self, s: &str) -> io::Result<()> {
        self.write_all(s.as_bytes())
    }

    pub fn is_terminal(&self) -> bool {
        self.is_terminal
    }
}

/// Output of one per-test report
pub enum TestOutput {
    /// Written through to the shared stream as produced
    Direct(SharedWriter),
    /// Held back until the aggregator flushes it
    Buffered(Vec<u8>),
}

impl TestOutput {
    pub fn new(writer: &SharedWriter, buffered: bool) -> Self {
        if buffered {
            TestOutput::Buffered(Vec::new())
        } else {
            TestOutput::Direct(writer.clone())
        }
    }

    pub fn write_str(&mut self, s: &str) -> io::Result<()> {
        match self {
            TestOutput::Direct(writer) => writer.write_str(s),
            TestOutput::Buffered(buf) => {
                buf.extend_from_slice(s.as_bytes());
                Ok(())
            }
        }
    }

    /// Flush held-back output to `writer` in one write
    pub fn flush_to(self, writer: &SharedWriter) -> io::Result<()> {
        match self {
            TestOutput::Buffered(buf) if !buf.is_empty() => writer.write_all(&buf),
            _ => Ok(()),
        }
    }
}
