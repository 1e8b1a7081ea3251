//! DAP transport abstraction layer.
//! Supports both stdio (the default mode) and TCP (server mode).
//!
//! Reading and writing are split: requests are read on the session thread while responses and
//! events are written from the session thread and from the event forwarding thread.

use crate::dap::tracer::{Direction, LogFile};
use anyhow::anyhow;
use serde_json::Value;
use std::io::{BufRead, BufReader, Read, Stdin, Stdout, Write};
use std::net::TcpStream;

/// Source of DAP messages.
pub trait DapReader: Send {
    /// Read a single DAP message (with Content-Length framing), `None` if connection closed.
    fn read_message(&mut self) -> anyhow::Result<Option<Value>>;
}

/// Sink of DAP messages.
pub trait DapWriter: Send {
    /// Write a single DAP message (with Content-Length framing).
    fn write_message(&mut self, message: &Value) -> anyhow::Result<()>;
}

/// Content-Length framed reader, header lines end with `\r\n` and an empty line ends the header.
pub struct FramedReader<R> {
    reader: R,
    trace: Option<LogFile>,
}

impl<R: BufRead> FramedReader<R> {
    pub fn new(reader: R, trace: Option<LogFile>) -> Self {
        Self { reader, trace }
    }

    /// Body length of the next message, `None` on a clean end of stream.
    fn next_content_length(&mut self) -> anyhow::Result<Option<usize>> {
        let mut content_length = None;
        let mut in_header = false;
        let mut header_line = String::new();
        loop {
            header_line.clear();
            if self.reader.read_line(&mut header_line)? == 0 {
                if in_header {
                    return Err(anyhow!("DAP connection closed in the middle of a message"));
                }
                return Ok(None);
            }

            match header_line.trim_end_matches(['\r', '\n']) {
                "" if in_header => break,
                "" => continue,
                field => {
                    in_header = true;
                    if let Some((name, value)) = field.split_once(':') {
                        if name.trim().eq_ignore_ascii_case("Content-Length") {
                            content_length = Some(value.trim().parse::<usize>()?);
                        }
                    }
                }
            }
        }

        content_length
            .map(Some)
            .ok_or_else(|| anyhow!("Missing Content-Length header"))
    }
}

impl<R: BufRead + Send> DapReader for FramedReader<R> {
    fn read_message(&mut self) -> anyhow::Result<Option<Value>> {
        let Some(len) = self.next_content_length()? else {
            return Ok(None);
        };
        let mut body = vec![0u8; len];
        self.reader.read_exact(&mut body)?;
        if let Some(trace) = &self.trace {
            trace.traffic(Direction::Incoming, &body);
        }
        Ok(Some(serde_json::from_slice(&body)?))
    }
}

pub struct FramedWriter<W> {
    writer: W,
    trace: Option<LogFile>,
}

impl<W: Write> FramedWriter<W> {
    pub fn new(writer: W, trace: Option<LogFile>) -> Self {
        Self { writer, trace }
    }
}

impl<W: Write + Send> DapWriter for FramedWriter<W> {
    fn write_message(&mut self, message: &Value) -> anyhow::Result<()> {
        let payload = serde_json::to_vec(message)?;
        if let Some(trace) = &self.trace {
            trace.traffic(Direction::Outgoing, &payload);
        }
        write!(self.writer, "Content-Length: {}\r\n\r\n", payload.len())?;
        self.writer.write_all(&payload)?;
        self.writer.flush()?;
        Ok(())
    }
}

pub type StdioReader = FramedReader<BufReader<Stdin>>;
pub type StdioWriter = FramedWriter<Stdout>;

/// Stdio-based DAP transport.
pub fn stdio(trace: Option<LogFile>) -> (StdioReader, StdioWriter) {
    (
        FramedReader::new(BufReader::new(std::io::stdin()), trace.clone()),
        FramedWriter::new(std::io::stdout(), trace),
    )
}

pub type TcpReader = FramedReader<BufReader<TcpStream>>;
pub type TcpWriter = FramedWriter<TcpStream>;

/// TCP-based DAP transport (for server mode).
pub fn tcp(stream: TcpStream, trace: Option<LogFile>) -> anyhow::Result<(TcpReader, TcpWriter)> {
    stream.set_nodelay(true)?;
    let reader = BufReader::new(stream.try_clone()?);
    Ok((
        FramedReader::new(reader, trace.clone()),
        FramedWriter::new(stream, trace),
    ))
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;
    use std::io::Cursor;

    struct Shared(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl Write for Shared {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_write_then_read_frames() {
        let out = std::sync::Arc::new(std::sync::Mutex::new(vec![]));
        let mut writer = FramedWriter::new(Shared(out.clone()), None);
        writer
            .write_message(&json!({"seq": 1, "type": "request", "command": "threads"}))
            .unwrap();
        writer
            .write_message(&json!({"seq": 2, "type": "request", "command": "pause"}))
            .unwrap();

        let data = out.lock().unwrap().clone();
        assert!(data.starts_with(b"Content-Length: "));

        let mut reader = FramedReader::new(Cursor::new(data), None);
        let first = reader.read_message().unwrap().unwrap();
        assert_eq!(first["command"], "threads");
        let second = reader.read_message().unwrap().unwrap();
        assert_eq!(second["command"], "pause");
        assert!(reader.read_message().unwrap().is_none());
    }

    #[test]
    fn test_missing_content_length() {
        let mut reader = FramedReader::new(Cursor::new(b"X-Header: 1\r\n\r\n{}".to_vec()), None);
        assert!(reader.read_message().is_err());
    }

    #[test]
    fn test_extra_headers_and_case() {
        let body = br#"{"seq":3,"type":"request","command":"threads"}"#;
        let mut data = format!("X-Trace: on\r\ncontent-length: {}\r\n\r\n", body.len()).into_bytes();
        data.extend_from_slice(body);
        let mut reader = FramedReader::new(Cursor::new(data), None);
        assert_eq!(reader.read_message().unwrap().unwrap()["seq"], 3);
    }

    #[test]
    fn test_truncated_header() {
        let mut reader = FramedReader::new(Cursor::new(b"Content-Length: 10\r\n".to_vec()), None);
        assert!(reader.read_message().is_err());
    }
}
