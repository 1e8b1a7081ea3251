#![allow(dead_code)]

use dbgeng_dap::engine::{
    DataSpaces, Engine, EngineError, EngineOptions, EngineProvider, EngineResult, EngineSettings,
    ExecutionStatus, HResult, Interrupt, NativeEvent, NativeFrame, ScopeKind, SourceLine,
    SymTag, SymbolEntry, SymbolGroup, TextRequest, TypedData, TypedRequest,
};
use dbgeng_dap::gateway::{GatewayEvent, GatewayOptions};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{mpsc, Arc, Mutex, MutexGuard};
use std::thread::ThreadId;
use std::time::Duration;

pub const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

pub const MAIN_RS: &str = "/src/main.rs";
pub const MAIN_LINE_OFFSET: u64 = 0x1010;
pub const SECOND_LINE_OFFSET: u64 = 0x1020;

/// What the fake engine reports on the next native wait.
#[derive(Debug, Clone)]
pub enum Stop {
    Events(Vec<NativeEvent>),
    /// Hit of the engine breakpoint registered at the offset.
    BreakpointAt(u64),
}

#[derive(Debug, Clone)]
pub struct FakeFrame {
    pub offset: u64,
    pub source: Option<(String, u32)>,
    pub function: Option<String>,
}

/// Typed value known to the fake engine, addressed by type id.
#[derive(Debug, Clone)]
pub struct FakeValue {
    pub data: TypedData,
    pub type_name: String,
    /// Rendered value, read from memory if empty.
    pub text: String,
    pub fields: Vec<(String, u32)>,
}

/// Scripted engine state shared between the test and the engine thread.
pub struct Script {
    pub status: ExecutionStatus,
    pub threads: Vec<u32>,
    pub current_thread: u32,
    pub pid: u32,
    pub module: String,
    pub lines: HashMap<(String, u32), u64>,
    pub frames: Vec<FakeFrame>,
    pub frame_index: u32,
    pub breakpoints: HashMap<u32, u64>,
    pub stops: VecDeque<Stop>,
    pub interrupted: bool,
    pub ended: bool,
    pub locals: Vec<SymbolEntry>,
    pub arguments: Vec<SymbolEntry>,
    pub values: HashMap<u32, FakeValue>,
    pub evaluations: HashMap<String, u32>,
    pub memory: HashMap<u64, u8>,
    pub command_lines: Vec<String>,
    pub source_path: String,
    pub symbol_path: String,
    pub settings: Option<EngineSettings>,
    pub groups_created: u32,
    /// Native objects in order of their release.
    pub released: Vec<&'static str>,
    pub engine_threads: HashSet<ThreadId>,
    pub fail_init: bool,
    pub fail_create: bool,
    pub create_delay: Option<Duration>,
}

impl Default for Script {
    fn default() -> Self {
        let mut script = Self {
            status: ExecutionStatus::NoDebuggee,
            threads: vec![1],
            current_thread: 1,
            pid: 4242,
            module: "app".to_string(),
            lines: HashMap::from([
                ((MAIN_RS.to_string(), 10), MAIN_LINE_OFFSET),
                ((MAIN_RS.to_string(), 12), SECOND_LINE_OFFSET),
            ]),
            frames: vec![
                FakeFrame {
                    offset: MAIN_LINE_OFFSET,
                    source: Some((MAIN_RS.to_string(), 10)),
                    function: Some("app!app::main".to_string()),
                },
                FakeFrame {
                    offset: 0x7ff0_0000,
                    source: None,
                    function: None,
                },
            ],
            frame_index: 0,
            breakpoints: HashMap::new(),
            stops: VecDeque::new(),
            interrupted: false,
            ended: false,
            locals: vec![],
            arguments: vec![],
            values: HashMap::new(),
            evaluations: HashMap::new(),
            memory: HashMap::new(),
            command_lines: vec![],
            source_path: String::new(),
            symbol_path: String::new(),
            settings: None,
            groups_created: 0,
            released: vec![],
            engine_threads: HashSet::new(),
            fail_init: false,
            fail_create: false,
            create_delay: None,
        };
        script.put_locals();
        script
    }
}

impl Script {
    /// Locals `x: i32 = 5` and `p: Point { x: 1, y: 2 }`, argument `argc` known by text only.
    fn put_locals(&mut self) {
        let base = 0x4000_0000;
        self.put_value(1, 0x2000, 4, SymTag::BaseType, "i32", "");
        self.put_bytes(0x2000, &5u32.to_le_bytes());
        self.put_value(2, 0x2010, 8, SymTag::UserDefinedType, "app::Point", "{...}");
        self.put_value(3, 0x2010, 4, SymTag::BaseType, "i32", "1");
        self.put_value(4, 0x2014, 4, SymTag::BaseType, "i32", "2");
        if let Some(point) = self.values.get_mut(&2) {
            point.fields = vec![("x".to_string(), 3), ("y".to_string(), 4)];
        }
        self.evaluations.insert("p".to_string(), 2);

        let symbol = |name: &str, offset: u64, type_id: u32| SymbolEntry {
            name: name.to_string(),
            module_base: base,
            offset,
            type_id,
            ..SymbolEntry::default()
        };
        self.locals = vec![symbol("x", 0x2000, 1), symbol("p", 0x2010, 2)];
        self.arguments = vec![SymbolEntry {
            type_name: "i32".to_string(),
            value_text: "1".to_string(),
            ..symbol("argc", 0, 0)
        }];
    }

    pub fn put_value(
        &mut self,
        type_id: u32,
        offset: u64,
        size: u32,
        tag: SymTag,
        type_name: &str,
        text: &str,
    ) {
        let data = TypedData {
            module_base: 0x4000_0000,
            offset,
            type_id,
            size,
            tag,
            data: 0,
        };
        self.values.insert(
            type_id,
            FakeValue {
                data,
                type_name: type_name.to_string(),
                text: text.to_string(),
                fields: vec![],
            },
        );
    }

    pub fn put_bytes(&mut self, offset: u64, bytes: &[u8]) {
        for (i, b) in bytes.iter().enumerate() {
            self.memory.insert(offset + i as u64, *b);
        }
    }

    fn read(&self, offset: u64, size: u32) -> Option<Vec<u8>> {
        (0..size as u64)
            .map(|i| self.memory.get(&(offset + i)).copied())
            .collect()
    }

    fn value(&self, type_id: u32) -> EngineResult<&FakeValue> {
        self.values.get(&type_id).ok_or(fail())
    }
}

fn fail() -> EngineError {
    EngineError::Status(HResult::FAIL)
}

pub type SharedScript = Arc<Mutex<Script>>;

pub fn lock(script: &SharedScript) -> MutexGuard<'_, Script> {
    script.lock().unwrap()
}

pub struct FakeEngine {
    script: SharedScript,
}

impl FakeEngine {
    fn script(&self) -> MutexGuard<'_, Script> {
        let mut script = lock(&self.script);
        script.engine_threads.insert(std::thread::current().id());
        script
    }
}

struct FakeInterrupt(SharedScript);

impl Interrupt for FakeInterrupt {
    fn interrupt(&self) -> EngineResult<()> {
        lock(&self.0).interrupted = true;
        Ok(())
    }
}

struct FakeGroup {
    entries: Vec<SymbolEntry>,
    script: SharedScript,
}

impl SymbolGroup for FakeGroup {
    fn count(&self) -> EngineResult<u32> {
        Ok(self.entries.len() as u32)
    }

    fn entry(&self, index: u32) -> EngineResult<SymbolEntry> {
        self.entries.get(index as usize).cloned().ok_or(fail())
    }
}

impl Drop for FakeGroup {
    fn drop(&mut self) {
        if let Ok(mut script) = self.script.lock() {
            script.released.push("symbol group");
        }
    }
}

impl Drop for FakeEngine {
    fn drop(&mut self) {
        if let Ok(mut script) = self.script.lock() {
            script.released.push("engine");
        }
    }
}

impl DataSpaces for FakeEngine {
    fn typed_data(&mut self, request: TypedRequest<'_>) -> EngineResult<TypedData> {
        let script = self.script();
        match request {
            TypedRequest::FromTypeId { type_id, .. } => Ok(script.value(type_id)?.data),
            TypedRequest::Field(owner, name) => {
                let owner = script.value(owner.type_id)?;
                let (_, field) = owner
                    .fields
                    .iter()
                    .find(|(field, _)| field == name)
                    .ok_or(fail())?;
                Ok(script.value(*field)?.data)
            }
            TypedRequest::Evaluate(expression) => {
                if let Some(type_id) = script.evaluations.get(expression) {
                    return Ok(script.value(*type_id)?.data);
                }
                let literal: u64 = expression.trim().parse().map_err(|_| fail())?;
                Ok(TypedData {
                    type_id: 100,
                    size: 8,
                    tag: SymTag::BaseType,
                    data: literal,
                    ..TypedData::NONE
                })
            }
            TypedRequest::Dereference(_) | TypedRequest::ArrayElement(..) => Err(fail()),
        }
    }

    fn typed_text(&mut self, request: TextRequest, data: &TypedData) -> EngineResult<String> {
        let script = self.script();
        let value = script.value(data.type_id)?;
        match request {
            TextRequest::TypeDefinition => Err(fail()),
            TextRequest::SimpleValue if !value.text.is_empty() => Ok(value.text.clone()),
            TextRequest::SimpleValue => {
                let bytes = script.read(data.offset, data.size).ok_or(fail())?;
                let mut raw = [0u8; 8];
                raw[..bytes.len()].copy_from_slice(&bytes);
                Ok(u64::from_le_bytes(raw).to_string())
            }
        }
    }

    fn field_names(&mut self, data: &TypedData) -> EngineResult<Vec<String>> {
        let script = self.script();
        Ok(script
            .value(data.type_id)
            .map(|value| value.fields.iter().map(|(name, _)| name.clone()).collect())
            .unwrap_or_default())
    }

    fn type_name(&mut self, _: u64, type_id: u32) -> EngineResult<String> {
        Ok(self.script().value(type_id)?.type_name.clone())
    }

    fn read_virtual(&mut self, offset: u64, size: u32) -> EngineResult<Vec<u8>> {
        self.script().read(offset, size).ok_or(fail())
    }

    fn read_string(&mut self, offset: u64, max_len: u32) -> EngineResult<Vec<u8>> {
        let script = self.script();
        Ok((0..max_len as u64)
            .map_while(|i| script.memory.get(&(offset + i)).copied())
            .take_while(|b| *b != 0)
            .collect())
    }

    fn write_virtual(&mut self, offset: u64, bytes: &[u8]) -> EngineResult<u32> {
        self.script().put_bytes(offset, bytes);
        Ok(bytes.len() as u32)
    }
}

impl Engine for FakeEngine {
    fn data_spaces(&mut self) -> &mut dyn DataSpaces {
        self
    }

    fn interrupter(&self) -> Arc<dyn Interrupt> {
        Arc::new(FakeInterrupt(self.script.clone()))
    }

    fn clear_breakpoints(&mut self) -> EngineResult<()> {
        self.script().breakpoints.clear();
        Ok(())
    }

    fn create_process(&mut self, command_line: &str) -> EngineResult<()> {
        let delay = {
            let mut script = self.script();
            if script.fail_create {
                return Err(fail());
            }
            script.command_lines.push(command_line.to_string());
            script.status = ExecutionStatus::Break;
            script.ended = false;
            script.create_delay
        };
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        Ok(())
    }

    fn attach_process(&mut self, pid: u32) -> EngineResult<()> {
        let mut script = self.script();
        script.pid = pid;
        script.status = ExecutionStatus::Break;
        Ok(())
    }

    fn end_session(&mut self) -> EngineResult<()> {
        let mut script = self.script();
        script.ended = true;
        script.status = ExecutionStatus::NoDebuggee;
        Ok(())
    }

    fn wait_for_event(&mut self, _: Option<Duration>) -> EngineResult<Vec<NativeEvent>> {
        loop {
            {
                let mut script = self.script();
                if script.ended || !script.status.is_running() {
                    return Ok(vec![]);
                }
                if script.interrupted {
                    script.interrupted = false;
                    script.status = ExecutionStatus::Break;
                    return Ok(vec![NativeEvent::Break]);
                }
                if let Some(stop) = script.stops.pop_front() {
                    let events = match stop {
                        Stop::Events(events) => events,
                        Stop::BreakpointAt(offset) => script
                            .breakpoints
                            .iter()
                            .filter(|(_, at)| **at == offset)
                            .map(|(id, _)| NativeEvent::Breakpoint { id: *id })
                            .collect(),
                    };
                    let exited = events
                        .iter()
                        .any(|e| matches!(e, NativeEvent::ProcessExited { .. }));
                    script.status = if exited {
                        ExecutionStatus::NoDebuggee
                    } else {
                        ExecutionStatus::Break
                    };
                    return Ok(events);
                }
            }
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    fn execution_status(&mut self) -> EngineResult<ExecutionStatus> {
        Ok(self.script().status)
    }

    fn set_execution_status(&mut self, status: ExecutionStatus) -> EngineResult<()> {
        let mut script = self.script();
        if script.status == ExecutionStatus::NoDebuggee {
            return Err(EngineError::Status(HResult::UNEXPECTED));
        }
        script.interrupted = false;
        script.status = status;
        Ok(())
    }

    fn execute(&mut self, command: &str) -> EngineResult<()> {
        if command != "gu" {
            return Err(EngineError::Status(HResult::INVALID_ARG));
        }
        self.set_execution_status(ExecutionStatus::Go)
    }

    fn apply_settings(&mut self, settings: &EngineSettings) -> EngineResult<()> {
        self.script().settings = Some(*settings);
        Ok(())
    }

    fn set_symbol_path(&mut self, path: &str) -> EngineResult<()> {
        self.script().symbol_path = path.to_string();
        Ok(())
    }

    fn set_source_path(&mut self, path: &str) -> EngineResult<()> {
        self.script().source_path = path.to_string();
        Ok(())
    }

    fn main_module_name(&mut self) -> EngineResult<String> {
        Ok(self.script().module.clone())
    }

    fn reload_symbols(&mut self, _: &str) -> EngineResult<()> {
        Ok(())
    }

    fn offset_by_line(&mut self, file: &str, line: u32) -> EngineResult<u64> {
        self.script()
            .lines
            .get(&(file.to_string(), line))
            .copied()
            .ok_or(EngineError::Status(HResult::INVALID_ARG))
    }

    fn line_by_offset(&mut self, offset: u64) -> EngineResult<SourceLine> {
        self.script()
            .frames
            .iter()
            .find(|frame| frame.offset == offset)
            .and_then(|frame| frame.source.clone())
            .map(|(file, line)| SourceLine { file, line })
            .ok_or(fail())
    }

    fn find_source_file(&mut self, file: &str) -> EngineResult<String> {
        Ok(file.to_string())
    }

    fn name_by_offset(&mut self, offset: u64) -> EngineResult<String> {
        self.script()
            .frames
            .iter()
            .find(|frame| frame.offset == offset)
            .and_then(|frame| frame.function.clone())
            .ok_or(fail())
    }

    fn add_code_breakpoint(&mut self, id: u32, offset: u64) -> EngineResult<()> {
        self.script().breakpoints.insert(id, offset);
        Ok(())
    }

    fn remove_breakpoint(&mut self, id: u32) -> EngineResult<()> {
        self.script().breakpoints.remove(&id);
        Ok(())
    }

    fn thread_system_ids(&mut self) -> EngineResult<Vec<u32>> {
        Ok(self.script().threads.clone())
    }

    fn current_thread_system_id(&mut self) -> EngineResult<u32> {
        Ok(self.script().current_thread)
    }

    fn set_current_thread(&mut self, system_id: u32) -> EngineResult<()> {
        let mut script = self.script();
        if !script.threads.contains(&system_id) {
            return Err(EngineError::Status(HResult::INVALID_ARG));
        }
        script.current_thread = system_id;
        Ok(())
    }

    fn current_process_system_id(&mut self) -> EngineResult<u32> {
        Ok(self.script().pid)
    }

    fn is_pointer_64bit(&mut self) -> EngineResult<bool> {
        Ok(true)
    }

    fn stack_trace(&mut self, max_frames: usize) -> EngineResult<Vec<NativeFrame>> {
        Ok(self
            .script()
            .frames
            .iter()
            .take(max_frames)
            .enumerate()
            .map(|(i, frame)| NativeFrame {
                instruction_offset: frame.offset,
                frame_number: i as u32,
            })
            .collect())
    }

    fn current_scope_frame_index(&mut self) -> EngineResult<u32> {
        Ok(self.script().frame_index)
    }

    fn set_scope_frame_index(&mut self, index: u32) -> EngineResult<()> {
        self.script().frame_index = index;
        Ok(())
    }

    fn scope_symbol_group(
        &mut self,
        kind: ScopeKind,
        previous: Option<Box<dyn SymbolGroup>>,
    ) -> EngineResult<Box<dyn SymbolGroup>> {
        drop(previous);
        let mut script = self.script();
        script.groups_created += 1;
        let entries = match kind {
            ScopeKind::Locals => script.locals.clone(),
            ScopeKind::Arguments => script.arguments.clone(),
        };
        Ok(Box::new(FakeGroup {
            entries,
            script: self.script.clone(),
        }))
    }
}

pub struct FakeProvider {
    pub script: SharedScript,
}

impl EngineProvider for FakeProvider {
    fn name(&self) -> &str {
        "fake"
    }

    fn is_supported(&self) -> bool {
        true
    }

    fn create(&self, _: &EngineOptions) -> EngineResult<Box<dyn Engine>> {
        if lock(&self.script).fail_init {
            return Err(EngineError::Status(HResult::NO_INTERFACE));
        }
        Ok(Box::new(FakeEngine {
            script: self.script.clone(),
        }))
    }
}

pub fn fake_provider() -> (SharedScript, Arc<FakeProvider>) {
    let script = SharedScript::default();
    let provider = Arc::new(FakeProvider {
        script: script.clone(),
    });
    (script, provider)
}

pub fn gateway_options() -> GatewayOptions {
    GatewayOptions {
        request_timeout: Duration::from_secs(10),
        join_timeout: Duration::from_secs(5),
        idle_poll: Duration::from_millis(5),
        ..GatewayOptions::default()
    }
}

/// Path of an existing executable, usable as a launch target.
pub fn program() -> String {
    std::env::current_exe()
        .expect("test binary path")
        .to_string_lossy()
        .into_owned()
}

/// Wait for the first event matching `predicate`, skipping others.
pub fn wait_event(
    events: &mpsc::Receiver<GatewayEvent>,
    predicate: impl Fn(&GatewayEvent) -> bool,
) -> GatewayEvent {
    loop {
        let event = events
            .recv_timeout(EVENT_TIMEOUT)
            .expect("gateway event in time");
        if predicate(&event) {
            return event;
        }
    }
}
