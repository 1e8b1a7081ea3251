use crate::engine::{Engine, EngineResult};
use crate::muted_error;
use log::debug;
use std::ops::{Deref, DerefMut};

/// Owner of a native engine for the lifetime of one debug session.
///
/// On [`EngineSession::close`] (or drop) the native session is ended first and the engine
/// interfaces are released afterwards, in the reverse order of their acquisition.
pub struct EngineSession {
    engine: Box<dyn Engine>,
    ended: bool,
}

impl EngineSession {
    pub fn new(engine: Box<dyn Engine>) -> Self {
        Self {
            engine,
            ended: false,
        }
    }

    /// End native session. Next calls are no-op.
    pub fn end(&mut self) -> EngineResult<()> {
        if self.ended {
            return Ok(());
        }
        self.ended = true;
        self.engine.end_session()
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// End the session and release the engine.
    pub fn close(self) {
        drop(self);
    }
}

impl Deref for EngineSession {
    type Target = dyn Engine;

    fn deref(&self) -> &Self::Target {
        self.engine.as_ref()
    }
}

impl DerefMut for EngineSession {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.engine.as_mut()
    }
}

impl Drop for EngineSession {
    fn drop(&mut self) {
        muted_error!(self.end(), "end native session:");
        debug!(target: "engine", "release native engine");
    }
}
