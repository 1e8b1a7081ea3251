//! Debug Adapter Protocol frontend: framing, envelopes, client conventions and the session.

pub mod convention;
pub mod error;
pub mod logger;
pub mod output;
pub mod protocol;
pub mod session;
pub mod sourcemap;
pub mod tracer;
pub mod transport;

pub use error::{ErrorCode, ErrorMessage};
pub use output::ServerOutput;
pub use session::{DebugSession, SessionState};
