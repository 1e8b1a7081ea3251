use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::{json, Map, Value};
use std::fmt::{Display, Formatter};

/// Codes of error responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    PlatformNotSupported = 1,
    TargetDoesNotExist = 2,
    FailedToLaunch = 3,
    MissingVariablesReference = 4,
    MissingArgument = 5,
    FailedToAttach = 6,
    NoDebuggee = 7,
    UnrecognizedRequest = 1014,
    BadPathFormat = 1015,
    SourceNotSupported = 1020,
    DispatchFailed = 1104,
}

impl ErrorCode {
    pub fn id(self) -> i64 {
        self as i64
    }
}

static PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{(\w+)\}").expect("infallible regex"));

/// Substitute `{name}` placeholders of `format` from `variables`.
pub fn expand_variables(format: &str, variables: &Map<String, Value>) -> String {
    PLACEHOLDER_RE
        .replace_all(format, |caps: &Captures| {
            let name = &caps[1];
            match variables.get(name) {
                Some(Value::String(s)) => s.clone(),
                Some(value) => value.to_string(),
                None => format!("{{{name}: not found}}"),
            }
        })
        .into_owned()
}

/// Error reported to the client as a failed response.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorMessage {
    pub code: ErrorCode,
    pub format: String,
    pub variables: Map<String, Value>,
    pub show_user: bool,
    pub send_telemetry: bool,
}

impl ErrorMessage {
    pub fn new(code: ErrorCode, format: impl Into<String>) -> Self {
        Self {
            code,
            format: format.into(),
            variables: Map::new(),
            show_user: true,
            send_telemetry: false,
        }
    }

    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.variables.insert(name.to_string(), value.into());
        self
    }

    pub fn hidden(mut self) -> Self {
        self.show_user = false;
        self
    }

    pub fn missing_argument(name: &str) -> Self {
        ErrorMessage::new(ErrorCode::MissingArgument, "Missing argument '{_name}'.").with("_name", name)
    }

    pub fn no_debuggee() -> Self {
        ErrorMessage::new(ErrorCode::NoDebuggee, "No debuggee is running.")
    }

    pub fn unrecognized_request(command: &str) -> Self {
        ErrorMessage::new(ErrorCode::UnrecognizedRequest, "unrecognized request: {_request}")
            .with("_request", command)
    }

    pub fn dispatch_failed(command: &str, exception: &str) -> Self {
        ErrorMessage::new(
            ErrorCode::DispatchFailed,
            "error while processing request '{_request}' (exception: {_exception})",
        )
        .with("_request", command)
        .with("_exception", exception)
    }

    /// Message text with expanded placeholders.
    pub fn text(&self) -> String {
        expand_variables(&self.format, &self.variables)
    }

    /// Body of the error response.
    pub fn body(&self) -> Value {
        let mut error = json!({
            "id": self.code.id(),
            "format": self.format,
            "showUser": self.show_user,
            "sendTelemetry": self.send_telemetry,
        });
        if !self.variables.is_empty() {
            error["variables"] = Value::Object(self.variables.clone());
        }
        json!({ "error": error })
    }
}

impl Display for ErrorMessage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.text())
    }
}

impl std::error::Error for ErrorMessage {}
