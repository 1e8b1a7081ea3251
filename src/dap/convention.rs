//! Line and path conventions of both protocol sides.
//!
//! The debugger side is configured by the adapter (1-based lines and filesystem paths unless
//! told otherwise), the client declares its own conventions in the `initialize` request.

use log::warn;
use serde::Deserialize;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathFormat {
    Path,
    #[default]
    Uri,
}

impl FromStr for PathFormat {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "path" => Ok(PathFormat::Path),
            "uri" => Ok(PathFormat::Uri),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientConvention {
    pub lines_start_at1: bool,
    pub path_format: PathFormat,
    pub debugger_lines_start_at1: bool,
    pub debugger_path_format: PathFormat,
}

impl Default for ClientConvention {
    fn default() -> Self {
        Self::new(true, PathFormat::Path)
    }
}

fn line_base(starts_at1: bool) -> i64 {
    i64::from(starts_at1)
}

impl ClientConvention {
    /// Convention with the given debugger side and a default (1-based, uri) client.
    pub fn new(debugger_lines_start_at1: bool, debugger_path_format: PathFormat) -> Self {
        Self {
            lines_start_at1: true,
            path_format: PathFormat::default(),
            debugger_lines_start_at1,
            debugger_path_format,
        }
    }

    pub fn line_to_debugger(&self, line: i64) -> u32 {
        let line = line
            .saturating_sub(line_base(self.lines_start_at1))
            .saturating_add(line_base(self.debugger_lines_start_at1));
        line.clamp(0, u32::MAX as i64) as u32
    }

    pub fn line_to_client(&self, line: u32) -> i64 {
        i64::from(line)
            .saturating_sub(line_base(self.debugger_lines_start_at1))
            .saturating_add(line_base(self.lines_start_at1))
    }

    /// Client path to a debugger path, `None` if a path can't be converted.
    pub fn path_to_debugger(&self, path: &str) -> Option<String> {
        match (self.path_format, self.debugger_path_format) {
            (PathFormat::Path, PathFormat::Path) | (PathFormat::Uri, PathFormat::Uri) => {
                Some(path.to_string())
            }
            (PathFormat::Path, PathFormat::Uri) => path_to_uri(path),
            (PathFormat::Uri, PathFormat::Path) => {
                let local = uri_to_path(path);
                if local.is_none() {
                    warn!(target: "dap", "path not well formed: '{path}'");
                }
                local
            }
        }
    }

    /// Debugger path to a client path.
    pub fn path_to_client(&self, path: &str) -> Option<String> {
        match (self.debugger_path_format, self.path_format) {
            (PathFormat::Path, PathFormat::Path) | (PathFormat::Uri, PathFormat::Uri) => {
                Some(path.to_string())
            }
            (PathFormat::Path, PathFormat::Uri) => path_to_uri(path),
            (PathFormat::Uri, PathFormat::Path) => uri_to_path(path),
        }
    }
}

/// Convert an absolute filesystem path into a `file` uri.
pub fn path_to_uri(path: &str) -> Option<String> {
    let path = path.replace('\\', "/");
    let path = if path.starts_with('/') {
        path
    } else if is_drive_path(&path) {
        format!("/{path}")
    } else {
        return None;
    };

    let mut uri = String::with_capacity(path.len() + 7);
    uri.push_str("file://");
    for byte in path.bytes() {
        if byte.is_ascii_alphanumeric() || b"-._~/:".contains(&byte) {
            uri.push(byte as char);
        } else {
            uri.push_str(&format!("%{byte:02X}"));
        }
    }
    Some(uri)
}

/// Convert a `file` uri into a filesystem path.
pub fn uri_to_path(uri: &str) -> Option<String> {
    let rest = uri.strip_prefix("file://")?;
    let path = match rest.find('/') {
        Some(0) => rest,
        Some(idx) if &rest[..idx] == "localhost" => &rest[idx..],
        _ => return None,
    };

    let decoded = percent_decode(path)?;
    let without_root = &decoded[1..];
    if is_drive_path(without_root) {
        Some(without_root.replace('/', "\\"))
    } else {
        Some(decoded)
    }
}

fn is_drive_path(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

fn percent_decode(s: &str) -> Option<String> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = s.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}
