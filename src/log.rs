use log::{LevelFilter, Log, Metadata, Record};
use std::sync::{Once, PoisonError, RwLock};

/// Process wide logger. The first [`LoggerSwitcher::switch`] installs it, next calls replace the
/// active logger (for example, a session logger replaces the startup one).
pub static LOGGER_SWITCHER: LoggerSwitcher = LoggerSwitcher::new();

pub struct LoggerSwitcher {
    inner: RwLock<Option<Box<dyn Log>>>,
    install: Once,
}

impl LoggerSwitcher {
    const fn new() -> Self {
        Self {
            inner: RwLock::new(None),
            install: Once::new(),
        }
    }

    pub fn switch(&'static self, logger: impl Log + 'static, filter: LevelFilter) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = Some(Box::new(logger));
        self.install.call_once(|| {
            if log::set_logger(self).is_err() {
                eprintln!("another global logger is already installed");
            }
        });
        log::set_max_level(filter);
    }
}

impl Log for LoggerSwitcher {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|logger| logger.enabled(metadata))
            .unwrap_or_default()
    }

    fn log(&self, record: &Record) {
        if let Some(logger) = self
            .inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            logger.log(record);
        }
    }

    fn flush(&self) {
        if let Some(logger) = self
            .inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            logger.flush();
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serial_test::serial;
    use std::sync::{Arc, Mutex};

    struct Collect(Arc<Mutex<Vec<String>>>);

    impl Log for Collect {
        fn enabled(&self, _: &Metadata) -> bool {
            true
        }

        fn log(&self, record: &Record) {
            self.0.lock().unwrap().push(record.args().to_string());
        }

        fn flush(&self) {}
    }

    #[test]
    #[serial]
    fn test_switch_replaces_logger() {
        let first = Arc::new(Mutex::new(vec![]));
        let second = Arc::new(Mutex::new(vec![]));

        LOGGER_SWITCHER.switch(Collect(first.clone()), LevelFilter::Trace);
        log::info!(target: "test", "one");
        LOGGER_SWITCHER.switch(Collect(second.clone()), LevelFilter::Trace);
        log::info!(target: "test", "two");

        assert!(first.lock().unwrap().contains(&"one".to_string()));
        assert!(!first.lock().unwrap().contains(&"two".to_string()));
        assert!(second.lock().unwrap().contains(&"two".to_string()));
    }
}
