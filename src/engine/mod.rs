//! Boundary to the native debugging engine.
//!
//! The engine is single-thread affine: every method of [`Engine`] and [`DataSpaces`] must be
//! called from the thread that created the engine. The only capability that may cross threads is
//! the [`Interrupt`] handle returned by [`Engine::interrupter`].

pub mod guard;
pub mod provider;

pub use guard::EngineSession;
pub use provider::{EngineOptions, EngineProvider, NoNativeEngine};

use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Duration;
use strum_macros::{Display as StrumDisplay, EnumIter, IntoStaticStr};

/// Native status code returned by a failed engine call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HResult(pub u32);

impl HResult {
    pub const FAIL: HResult = HResult(0x8000_4005);
    pub const INVALID_ARG: HResult = HResult(0x8007_0057);
    pub const NO_INTERFACE: HResult = HResult(0x8000_4002);
    pub const UNEXPECTED: HResult = HResult(0x8000_FFFF);
}

impl Display for HResult {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:08X}", self.0)
    }
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineError {
    #[error("engine call failed with status {0}")]
    Status(HResult),
    #[error("native engine is not available on this platform")]
    Unsupported,
}

impl EngineError {
    /// Native status code of the failure, `NO_INTERFACE` for missing capability.
    pub fn status(&self) -> HResult {
        match self {
            EngineError::Status(hr) => *hr,
            EngineError::Unsupported => HResult::NO_INTERFACE,
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Execution status as reported and accepted by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, StrumDisplay)]
#[strum(serialize_all = "snake_case")]
pub enum ExecutionStatus {
    NoDebuggee,
    Go,
    GoHandled,
    GoNotHandled,
    StepOver,
    StepInto,
    StepBranch,
    Break,
}

impl ExecutionStatus {
    /// True when a wait-for-event call is required before the engine stops again.
    pub fn is_running(self) -> bool {
        matches!(
            self,
            ExecutionStatus::Go
                | ExecutionStatus::GoHandled
                | ExecutionStatus::GoNotHandled
                | ExecutionStatus::StepOver
                | ExecutionStatus::StepInto
                | ExecutionStatus::StepBranch
        )
    }
}

/// Native notifications collected by the engine while waiting for an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeEvent {
    Breakpoint { id: u32 },
    Exception { code: u32, first_chance: bool },
    Break,
    ThreadCreated { system_id: u32 },
    ThreadExited { system_id: u32 },
    ProcessExited { exit_code: u32 },
    Output { text: String },
}

/// Kind of scope a symbol group is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, StrumDisplay, IntoStaticStr, EnumIter)]
pub enum ScopeKind {
    #[strum(serialize = "Locals")]
    Locals,
    #[strum(serialize = "Arguments")]
    Arguments,
}

/// Engine settings applied once the debuggee is stopped for the first time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    pub source_level_stepping: bool,
    pub radix: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            source_level_stepping: true,
            radix: 10,
        }
    }
}

/// One native stack frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NativeFrame {
    pub instruction_offset: u64,
    pub frame_number: u32,
}

/// Source position of a code offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLine {
    pub file: String,
    pub line: u32,
}

/// Symbol (debug info) tag of a typed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SymTag {
    #[default]
    Null,
    BaseType,
    UserDefinedType,
    Enum,
    Pointer,
    Array,
    Function,
    Other(u32),
}

/// Typed-memory handle: a location in the debuggee address space and its static type.
///
/// `type_id == 0` with tag [`SymTag::Null`] is the "no data" sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TypedData {
    pub module_base: u64,
    pub offset: u64,
    pub type_id: u32,
    pub size: u32,
    pub tag: SymTag,
    /// Raw value of the location for scalars and pointers.
    pub data: u64,
}

impl TypedData {
    pub const NONE: TypedData = TypedData {
        module_base: 0,
        offset: 0,
        type_id: 0,
        size: 0,
        tag: SymTag::Null,
        data: 0,
    };

    pub fn is_none(&self) -> bool {
        self.type_id == 0 && self.tag == SymTag::Null
    }
}

/// Request kinds understood by the engine typed-data interface.
#[derive(Debug, Clone, Copy)]
pub enum TypedRequest<'a> {
    FromTypeId {
        module_base: u64,
        offset: u64,
        type_id: u32,
    },
    Dereference(&'a TypedData),
    Field(&'a TypedData, &'a str),
    ArrayElement(&'a TypedData, u64),
    Evaluate(&'a str),
}

/// Text renderings the engine can produce for a typed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextRequest {
    TypeDefinition,
    SimpleValue,
}

/// A single symbol of a scope symbol group.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SymbolEntry {
    pub name: String,
    pub type_name: String,
    pub value_text: String,
    pub module_base: u64,
    pub offset: u64,
    pub type_id: u32,
    /// Index of the parent symbol, `None` for top level symbols.
    pub parent: Option<u32>,
    pub sub_elements: u32,
}

/// Native symbol group of a scope. Dropping a group releases it.
pub trait SymbolGroup {
    fn count(&self) -> EngineResult<u32>;

    fn entry(&self, index: u32) -> EngineResult<SymbolEntry>;
}

/// Cross thread capability that forces a blocking engine wait to return.
pub trait Interrupt: Send + Sync {
    fn interrupt(&self) -> EngineResult<()>;
}

/// Typed data and memory primitives of the engine.
pub trait DataSpaces {
    fn typed_data(&mut self, request: TypedRequest<'_>) -> EngineResult<TypedData>;

    fn typed_text(&mut self, request: TextRequest, data: &TypedData) -> EngineResult<String>;

    fn field_names(&mut self, data: &TypedData) -> EngineResult<Vec<String>>;

    fn type_name(&mut self, module_base: u64, type_id: u32) -> EngineResult<String>;

    fn read_virtual(&mut self, offset: u64, size: u32) -> EngineResult<Vec<u8>>;

    /// Read a NUL terminated string of at most `max_len` bytes.
    fn read_string(&mut self, offset: u64, max_len: u32) -> EngineResult<Vec<u8>>;

    /// Write bytes into the debuggee memory, return number of written bytes.
    fn write_virtual(&mut self, offset: u64, bytes: &[u8]) -> EngineResult<u32>;
}

/// Execution control, symbols, threads and stacks of the native engine.
pub trait Engine: DataSpaces {
    fn data_spaces(&mut self) -> &mut dyn DataSpaces;

    fn interrupter(&self) -> Arc<dyn Interrupt>;

    fn clear_breakpoints(&mut self) -> EngineResult<()>;

    fn create_process(&mut self, command_line: &str) -> EngineResult<()>;

    fn attach_process(&mut self, pid: u32) -> EngineResult<()>;

    /// Terminate the debuggee and end the native session.
    fn end_session(&mut self) -> EngineResult<()>;

    /// Block until the engine stops or `timeout` expires, return collected notifications.
    fn wait_for_event(&mut self, timeout: Option<Duration>) -> EngineResult<Vec<NativeEvent>>;

    fn execution_status(&mut self) -> EngineResult<ExecutionStatus>;

    fn set_execution_status(&mut self, status: ExecutionStatus) -> EngineResult<()>;

    /// Execute a native engine command, like `gu`.
    fn execute(&mut self, command: &str) -> EngineResult<()>;

    fn apply_settings(&mut self, settings: &EngineSettings) -> EngineResult<()>;

    fn set_symbol_path(&mut self, path: &str) -> EngineResult<()>;

    fn set_source_path(&mut self, path: &str) -> EngineResult<()>;

    fn main_module_name(&mut self) -> EngineResult<String>;

    fn reload_symbols(&mut self, module: &str) -> EngineResult<()>;

    fn offset_by_line(&mut self, file: &str, line: u32) -> EngineResult<u64>;

    fn line_by_offset(&mut self, offset: u64) -> EngineResult<SourceLine>;

    fn find_source_file(&mut self, file: &str) -> EngineResult<String>;

    fn name_by_offset(&mut self, offset: u64) -> EngineResult<String>;

    fn add_code_breakpoint(&mut self, id: u32, offset: u64) -> EngineResult<()>;

    fn remove_breakpoint(&mut self, id: u32) -> EngineResult<()>;

    fn thread_system_ids(&mut self) -> EngineResult<Vec<u32>>;

    fn current_thread_system_id(&mut self) -> EngineResult<u32>;

    fn set_current_thread(&mut self, system_id: u32) -> EngineResult<()>;

    fn current_process_system_id(&mut self) -> EngineResult<u32>;

    fn is_pointer_64bit(&mut self) -> EngineResult<bool>;

    fn stack_trace(&mut self, max_frames: usize) -> EngineResult<Vec<NativeFrame>>;

    fn current_scope_frame_index(&mut self) -> EngineResult<u32>;

    fn set_scope_frame_index(&mut self, index: u32) -> EngineResult<()>;

    /// Build symbol group for scope of current frame, `previous` group may be reused by the engine.
    fn scope_symbol_group(
        &mut self,
        kind: ScopeKind,
        previous: Option<Box<dyn SymbolGroup>>,
    ) -> EngineResult<Box<dyn SymbolGroup>>;
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_hresult_display() {
        assert_eq!(HResult(0x8000_4005).to_string(), "80004005");
        assert_eq!(HResult(1).to_string(), "00000001");
        assert_eq!(
            EngineError::Status(HResult::INVALID_ARG).to_string(),
            "engine call failed with status 80070057"
        );
    }

    #[test]
    fn test_running_statuses() {
        assert!(ExecutionStatus::Go.is_running());
        assert!(ExecutionStatus::StepInto.is_running());
        assert!(!ExecutionStatus::Break.is_running());
        assert!(!ExecutionStatus::NoDebuggee.is_running());
    }

    #[test]
    fn test_scope_kind_names() {
        assert_eq!(ScopeKind::Locals.to_string(), "Locals");
        let name: &'static str = ScopeKind::Arguments.into();
        assert_eq!(name, "Arguments");
    }
}
