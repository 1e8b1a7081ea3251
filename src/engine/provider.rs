use crate::engine::{Engine, EngineError, EngineResult};
use std::path::PathBuf;

/// Options used for native engine creation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineOptions {
    /// Directory with the native engine libraries, default engine location if `None`.
    pub engine_path: Option<PathBuf>,
}

/// Factory of native engines.
///
/// [`EngineProvider::create`] is called on the engine thread, the created engine never leaves it.
pub trait EngineProvider: Send + Sync {
    /// Name of the engine backend, used in logs and in the "not supported" message.
    fn name(&self) -> &str;

    /// Return false if engine can't work on the current host.
    fn is_supported(&self) -> bool;

    fn create(&self, options: &EngineOptions) -> EngineResult<Box<dyn Engine>>;
}

/// Provider used when adapter is built without a native backend.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoNativeEngine;

impl EngineProvider for NoNativeEngine {
    fn name(&self) -> &str {
        "none"
    }

    fn is_supported(&self) -> bool {
        false
    }

    fn create(&self, _: &EngineOptions) -> EngineResult<Box<dyn Engine>> {
        Err(EngineError::Unsupported)
    }
}
