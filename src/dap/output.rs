use crate::dap::protocol::{DapEvent, DapResponse};
use crate::dap::transport::DapWriter;
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Mutex, PoisonError};

/// Outgoing half of a session, shared by the request loop, the event forwarder and the logger.
///
/// Message sequence numbers are assigned here, so they grow in the order of writes.
pub struct ServerOutput {
    writer: Mutex<Box<dyn DapWriter>>,
    seq: AtomicI64,
}

impl ServerOutput {
    pub fn new(writer: impl DapWriter + 'static) -> Self {
        Self {
            writer: Mutex::new(Box::new(writer)),
            seq: AtomicI64::new(1),
        }
    }

    pub fn respond(&self, mut response: DapResponse) -> anyhow::Result<()> {
        self.send(|seq| {
            response.seq = seq;
            serde_json::to_value(&response)
        })
    }

    pub fn send_event(&self, mut event: DapEvent) -> anyhow::Result<()> {
        self.send(|seq| {
            event.seq = seq;
            serde_json::to_value(&event)
        })
    }

    pub fn event(&self, event: &'static str, body: impl Serialize) -> anyhow::Result<()> {
        let body = match serde_json::to_value(body)? {
            Value::Null => None,
            body => Some(body),
        };
        self.send_event(DapEvent::new(event, body))
    }

    fn send(&self, make: impl FnOnce(i64) -> serde_json::Result<Value>) -> anyhow::Result<()> {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let message = make(self.seq.fetch_add(1, Ordering::SeqCst))?;
        writer.write_message(&message)
    }
}
