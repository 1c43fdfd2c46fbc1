//! Standard streams, replaceable for tests.

use std::io::{BufRead, IsTerminal, Write};
use std::sync::{Arc, Mutex, PoisonError};

/// A shared output stream.
///
/// Write errors are ignored: there is nowhere left to report them.
#[derive(Clone)]
pub struct Output {
    inner: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl std::fmt::Debug for Output {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Output")
    }
}

impl Output {
    /// Wraps a writer.
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    /// Writes text as is.
    pub fn print(&self, text: &str) {
        let mut w = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let _ = w.write_all(text.as_bytes());
        let _ = w.flush();
    }

    /// Writes text followed by a newline.
    pub fn println(&self, text: &str) {
        let mut w = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let _ = w.write_all(text.as_bytes());
        let _ = w.write_all(b"\n");
        let _ = w.flush();
    }
}

/// stdout, stderr and stdin of a command.
#[derive(Clone)]
pub struct Streams {
    /// Standard output.
    pub stdout: Output,
    /// Standard error.
    pub stderr: Output,
    stdin: Arc<Mutex<Box<dyn BufRead + Send>>>,
    stdin_terminal: bool,
}

impl std::fmt::Debug for Streams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Streams").finish_non_exhaustive()
    }
}

impl Streams {
    /// The process's standard streams.
    pub fn system() -> Self {
        Self {
            stdout: Output::new(std::io::stdout()),
            stderr: Output::new(std::io::stderr()),
            stdin: Arc::new(Mutex::new(Box::new(std::io::BufReader::new(std::io::stdin())))),
            stdin_terminal: std::io::stdin().is_terminal(),
        }
    }

    /// In-memory streams: `stdin` is read from the given text and output is
    /// captured.
    pub fn for_testing(stdin: &str) -> (Self, Captured) {
        let captured = Captured::default();
        let streams = Self {
            stdout: Output::new(SharedBuf(Arc::clone(&captured.stdout))),
            stderr: Output::new(SharedBuf(Arc::clone(&captured.stderr))),
            stdin: Arc::new(Mutex::new(Box::new(std::io::Cursor::new(stdin.as_bytes().to_vec())))),
            stdin_terminal: false,
        };
        (streams, captured)
    }

    /// Returns true if stdin is an interactive terminal.
    pub const fn stdin_is_terminal(&self) -> bool {
        self.stdin_terminal
    }

    /// Reads one line from stdin without the line ending. Returns `None` at
    /// end of input.
    pub fn read_line(&self) -> Option<String> {
        let mut stdin = self.stdin.lock().unwrap_or_else(PoisonError::into_inner);
        let mut line = String::new();
        match stdin.read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim_end_matches(['\r', '\n']).to_string()),
        }
    }

    /// Reads all of stdin.
    pub fn read_to_string(&self) -> std::io::Result<String> {
        let mut stdin = self.stdin.lock().unwrap_or_else(PoisonError::into_inner);
        let mut text = String::new();
        let _ = std::io::Read::read_to_string(&mut *stdin, &mut text)?;
        Ok(text)
    }
}

/// Output captured by [`Streams::for_testing`].
#[derive(Debug, Clone, Default)]
pub struct Captured {
    stdout: Arc<Mutex<Vec<u8>>>,
    stderr: Arc<Mutex<Vec<u8>>>,
}

impl Captured {
    /// Everything written to stdout so far.
    pub fn stdout(&self) -> String {
        String::from_utf8_lossy(&self.stdout.lock().unwrap_or_else(PoisonError::into_inner)).into_owned()
    }

    /// Everything written to stderr so far.
    pub fn stderr(&self) -> String {
        String::from_utf8_lossy(&self.stderr.lock().unwrap_or_else(PoisonError::into_inner)).into_owned()
    }

    /// Discards captured output.
    pub fn clear(&self) {
        self.stdout.lock().unwrap_or_else(PoisonError::into_inner).clear();
        self.stderr.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_output_and_reads_lines() {
        let (streams, captured) = Streams::for_testing("yes\nno\n");
        streams.stdout.println("hello");
        streams.stderr.print("oops");
        assert_eq!(captured.stdout(), "hello\n");
        assert_eq!(captured.stderr(), "oops");
        assert_eq!(streams.read_line().as_deref(), Some("yes"));
        assert_eq!(streams.read_line().as_deref(), Some("no"));
        assert_eq!(streams.read_line(), None);
    }
}
