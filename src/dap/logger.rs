use crate::dap::output::ServerOutput;
use log::LevelFilter;
use serde_json::json;
use std::cell::Cell;
use std::fmt::Write as _;
use std::sync::Arc;

thread_local! {
    static FORWARDING: Cell<bool> = const { Cell::new(false) };
}

/// Logger that also sends every record to the client as a `console` output event.
pub struct DapLogger {
    inner: env_logger::Logger,
    output: Arc<ServerOutput>,
}

impl DapLogger {
    pub fn new(inner: env_logger::Logger, output: Arc<ServerOutput>) -> Self {
        Self { inner, output }
    }

    pub fn filter(&self) -> LevelFilter {
        self.inner.filter()
    }
}

impl log::Log for DapLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        self.inner.enabled(metadata)
    }

    fn log(&self, record: &log::Record) {
        if !self.inner.matches(record) {
            return;
        }
        self.inner.log(record);

        // records produced while a record is forwarded are not forwarded again
        if FORWARDING.with(|f| f.replace(true)) {
            return;
        }

        let mut output = String::new();
        let _ = write!(output, "[{}] ", record.level());
        if let Some(module) = record.module_path() {
            let _ = write!(output, "{module} ");
        }
        let _ = writeln!(output, "{}", record.args());

        let _ = self
            .output
            .event("output", json!({"category": "console", "output": output}));

        FORWARDING.with(|f| f.set(false));
    }

    fn flush(&self) {
        self.inner.flush();
    }
}
