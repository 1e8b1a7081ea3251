use serde::{Deserialize, Serialize};
use serde_json::Value;

/// DAP request envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct DapRequest {
    pub seq: i64,
    #[serde(rename = "type")]
    pub r#type: String,
    pub command: String,
    #[serde(default)]
    pub arguments: Value,
}

impl DapRequest {
    pub fn argument(&self, name: &str) -> Option<&Value> {
        self.arguments.get(name).filter(|value| !value.is_null())
    }

    pub fn str_argument(&self, name: &str) -> Option<&str> {
        self.argument(name).and_then(Value::as_str)
    }

    pub fn int_argument(&self, name: &str) -> Option<i64> {
        self.argument(name).and_then(|value| {
            value
                .as_i64()
                .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
        })
    }

    pub fn bool_argument(&self, name: &str) -> Option<bool> {
        self.argument(name).and_then(Value::as_bool)
    }

    /// String list argument, a single string is a list with one element.
    pub fn list_argument(&self, name: &str) -> Vec<String> {
        match self.argument(name) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| item.as_str().map(ToString::to_string))
                .collect(),
            Some(Value::String(s)) if !s.trim().is_empty() => vec![s.clone()],
            _ => vec![],
        }
    }
}

/// DAP response envelope.
///
/// `body` is omitted when the command has nothing to return.
#[derive(Debug, Serialize)]
pub struct DapResponse {
    pub seq: i64,
    #[serde(rename = "type")]
    pub r#type: &'static str,
    pub request_seq: i64,
    pub success: bool,
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl DapResponse {
    pub fn success(request: &DapRequest, body: Option<Value>) -> Self {
        Self {
            seq: 0,
            r#type: "response",
            request_seq: request.seq,
            success: true,
            command: request.command.clone(),
            message: None,
            body,
        }
    }

    pub fn error(request: &DapRequest, message: String, body: Value) -> Self {
        Self {
            seq: 0,
            r#type: "response",
            request_seq: request.seq,
            success: false,
            command: request.command.clone(),
            message: Some(message),
            body: Some(body),
        }
    }
}

/// DAP event envelope.
#[derive(Debug, Serialize)]
pub struct DapEvent {
    pub seq: i64,
    #[serde(rename = "type")]
    pub r#type: &'static str,
    pub event: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl DapEvent {
    pub fn new(event: &'static str, body: Option<Value>) -> Self {
        Self {
            seq: 0,
            r#type: "event",
            event,
            body,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    fn request(arguments: Value) -> DapRequest {
        serde_json::from_value(json!({
            "seq": 3,
            "type": "request",
            "command": "launch",
            "arguments": arguments,
        }))
        .unwrap()
    }

    #[test]
    fn test_request_arguments() {
        let req = request(json!({
            "target": "app.exe",
            "processId": "42",
            "args": "--fast",
            "sourcePaths": ["a", 1, "b"],
            "stopOnEntry": null,
        }));
        assert_eq!(req.str_argument("target"), Some("app.exe"));
        assert_eq!(req.int_argument("processId"), Some(42));
        assert_eq!(req.list_argument("args"), vec!["--fast"]);
        assert_eq!(req.list_argument("sourcePaths"), vec!["a", "b"]);
        assert!(req.argument("stopOnEntry").is_none());
        assert!(req.list_argument("symbolPaths").is_empty());
    }

    #[test]
    fn test_missing_arguments_field() {
        let req: DapRequest = serde_json::from_value(json!({
            "seq": 1,
            "type": "request",
            "command": "threads",
        }))
        .unwrap();
        assert!(req.arguments.is_null());
        assert_eq!(req.int_argument("threadId"), None);
    }

    #[test]
    fn test_response_serialization() {
        let req = request(Value::Null);
        let resp = serde_json::to_value(DapResponse::success(&req, None)).unwrap();
        assert_eq!(
            resp,
            json!({
                "seq": 0,
                "type": "response",
                "request_seq": 3,
                "success": true,
                "command": "launch",
            })
        );
    }
}
