//! Adapter log file.
//!
//! One file receives both `env_logger` records (through the [`Write`] impl) and, when traffic
//! tracing is on, every framed DAP payload tagged with its direction.

use anyhow::Context;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Client to adapter.
    Incoming,
    /// Adapter to client.
    Outgoing,
}

impl Direction {
    fn arrow(self) -> &'static str {
        match self {
            Direction::Incoming => "<-",
            Direction::Outgoing => "->",
        }
    }
}

/// Append-only log file shared between the logger and both transport halves.
#[derive(Clone)]
pub struct LogFile {
    file: Arc<Mutex<File>>,
}

impl LogFile {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open log file {}", path.display()))?;
        Ok(Self {
            file: Arc::new(Mutex::new(file)),
        })
    }

    fn file(&self) -> MutexGuard<'_, File> {
        self.file.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record one DAP payload. Write failures are ignored, tracing never breaks a session.
    pub fn traffic(&self, direction: Direction, payload: &[u8]) {
        let mut file = self.file();
        let _ = write!(file, "{} ", direction.arrow())
            .and_then(|_| file.write_all(payload))
            .and_then(|_| file.write_all(b"\n"));
    }
}

impl Write for LogFile {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.file().write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.file().flush()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_traffic_and_records_share_file() {
        let path = std::env::temp_dir().join(format!("dbgeng-dap-trace-{}.log", std::process::id()));
        let _ = std::fs::remove_file(&path);

        let log = LogFile::open(&path).unwrap();
        log.traffic(Direction::Incoming, br#"{"seq":1}"#);
        let mut records = log.clone();
        writeln!(records, "INFO record").unwrap();
        log.traffic(Direction::Outgoing, br#"{"seq":2}"#);

        let text = std::fs::read_to_string(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(
            text.lines().collect::<Vec<_>>(),
            vec![r#"<- {"seq":1}"#, "INFO record", r#"-> {"seq":2}"#]
        );
    }
}
