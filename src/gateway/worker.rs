use crate::engine::guard::EngineSession;
use crate::engine::{EngineResult, ExecutionStatus, NativeEvent, ScopeKind, SymbolGroup};
use crate::gateway::breakpoint::{Breakpoint, BreakpointResult, BreakpointTable};
use crate::gateway::command::{
    AttachRequest, Command, EvaluateResult, ExecutionResult, LaunchRequest, LaunchResult,
    ProcessInfo, SetVariableResult, Step,
};
use crate::gateway::{lock, GatewayEvent, GatewayOptions, Subscribers};
use crate::memory::{MemoryGateway, TypeNameCache};
use crate::state::{Entity, EntityRef, Frame, Handle, Scope, StateError, StateStore, Thread, Variable};
use crate::visualizer::{VariableMetaData, Visualization, VisualizerRegistry};
use crate::{muted_error, sources, weak_error};
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use strum::IntoEnumIterator;

/// Engine command that resumed the debuggee last time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resume {
    Continue,
    Step,
}

/// Symbol group of one scope kind in one frame of one thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct GroupKey {
    thread: u32,
    frame: u32,
    kind: ScopeKind,
}

struct CachedGroup {
    group: Box<dyn SymbolGroup>,
    count: u32,
}

/// Create variable entity under `parent` from decoded metadata.
fn add_variable(
    state: &mut StateStore,
    parent: Handle,
    meta: VariableMetaData,
    visualization: Visualization,
) -> Result<Variable, StateError> {
    let variable = Variable {
        handle: Handle::NONE,
        name: meta.name.clone(),
        type_name: meta.type_name.clone(),
        value: visualization.value,
        has_children: visualization.has_children,
        meta,
    };
    let handle = state.add(parent, |handle| {
        Entity::Variable(Variable {
            handle,
            ..variable.clone()
        })
    })?;
    Ok(Variable { handle, ..variable })
}

/// Owner of the engine, lives on the engine thread.
pub(super) struct Worker {
    engine: EngineSession,
    commands: mpsc::Receiver<Command>,
    subscribers: Subscribers,
    cancel: Arc<AtomicBool>,
    options: GatewayOptions,

    state: StateStore,
    breakpoints: BreakpointTable,
    visualizers: VisualizerRegistry,
    type_names: TypeNameCache,
    symbol_groups: HashMap<GroupKey, CachedGroup>,

    process: Option<ProcessInfo>,
    resume: Option<Resume>,
    known_threads: Vec<u32>,
    exited: bool,
    /// Last native wait failed, don't spin on it.
    stalled: bool,
}

impl Worker {
    pub(super) fn new(
        engine: EngineSession,
        commands: mpsc::Receiver<Command>,
        subscribers: Subscribers,
        cancel: Arc<AtomicBool>,
        options: GatewayOptions,
    ) -> Self {
        Self {
            engine,
            commands,
            subscribers,
            cancel,
            options,
            state: StateStore::new(),
            breakpoints: BreakpointTable::new(),
            visualizers: VisualizerRegistry::with_rust_visualizers(),
            type_names: TypeNameCache::new(),
            symbol_groups: HashMap::new(),
            process: None,
            resume: None,
            known_threads: vec![],
            exited: false,
            stalled: false,
        }
    }

    pub(super) fn run(mut self) {
        weak_error!(
            self.engine.clear_breakpoints(),
            "clear breakpoints of a previous session:"
        );

        while !self.cancelled() {
            if self.is_running() && !self.stalled {
                self.wait_for_stop();
            }
            self.drain();
        }

        let rest: Vec<Command> = self.commands.try_iter().collect();
        for command in rest {
            match command {
                Command::Terminate(reply) => reply.send(self.terminate()),
                other => debug!(target: "gateway", "command `{}` dropped", other.name()),
            }
        }

        self.release();
    }

    /// Drop everything acquired from the engine, then the engine itself.
    fn release(mut self) {
        self.symbol_groups.clear();
        self.state.clear();
        self.type_names.clear();
        self.process = None;

        let Worker { engine, .. } = self;
        engine.close();
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    fn status(&mut self) -> ExecutionStatus {
        muted_error!(self.engine.execution_status(), "execution status:")
            .unwrap_or(ExecutionStatus::NoDebuggee)
    }

    fn is_running(&mut self) -> bool {
        self.status().is_running()
    }

    fn pointer_size(&self) -> u8 {
        self.process.as_ref().map(|p| p.pointer_size).unwrap_or(8)
    }

    fn emit(&self, event: GatewayEvent) {
        debug!(target: "gateway", "event: {event:?}");
        lock(&self.subscribers).retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }

    fn drain(&mut self) {
        let first = if self.is_running() && !self.stalled {
            match self.commands.try_recv() {
                Ok(command) => Some(command),
                Err(mpsc::TryRecvError::Empty) => None,
                Err(mpsc::TryRecvError::Disconnected) => {
                    self.cancel.store(true, Ordering::SeqCst);
                    None
                }
            }
        } else {
            match self.commands.recv_timeout(self.options.idle_poll) {
                Ok(command) => Some(command),
                Err(mpsc::RecvTimeoutError::Timeout) => None,
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    self.cancel.store(true, Ordering::SeqCst);
                    None
                }
            }
        };
        let Some(first) = first else {
            return;
        };
        self.dispatch(first);

        while !self.cancelled() {
            match self.commands.try_recv() {
                Ok(command) => self.dispatch(command),
                Err(mpsc::TryRecvError::Empty) => break,
                Err(mpsc::TryRecvError::Disconnected) => {
                    self.cancel.store(true, Ordering::SeqCst);
                    break;
                }
            }
        }
    }

    fn dispatch(&mut self, command: Command) {
        let name = command.name();
        debug!(target: "gateway", "handle `{name}`");
        let result = std::panic::catch_unwind(AssertUnwindSafe(|| self.execute(command)));
        if result.is_err() {
            error!(target: "gateway", "command `{name}` panicked");
        }
    }

    fn execute(&mut self, command: Command) {
        match command {
            Command::Launch(request, reply) => reply.send(self.launch(request)),
            Command::Attach(request, reply) => reply.send(self.attach(request)),
            Command::Continue(reply) => reply.send(self.resume()),
            Command::Step {
                step,
                thread,
                reply,
            } => reply.send(self.step(step, thread)),
            Command::Pause(reply) => reply.send(ExecutionResult::ok()),
            Command::Terminate(reply) => reply.send(self.terminate()),
            Command::SetBreakpoints { file, lines, reply } => {
                reply.send(self.set_breakpoints(file, lines))
            }
            Command::Threads(reply) => reply.send(self.threads()),
            Command::StackTrace { thread, reply } => reply.send(self.stack_trace(thread)),
            Command::Scopes { frame, reply } => reply.send(self.scopes(frame)),
            Command::Variables { reference, reply } => reply.send(self.variables(reference)),
            Command::SetVariable {
                reference,
                name,
                value,
                reply,
            } => reply.send(self.set_variable(reference, &name, &value)),
            Command::Evaluate {
                expression,
                frame,
                reply,
            } => reply.send(self.evaluate(&expression, frame)),
            Command::ProcessInfo(reply) => reply.send(self.process.clone()),
        }
    }

    // ------------------------------------ native events -----------------------------------------

    fn current_thread_id(&mut self) -> u32 {
        let id = muted_error!(self.engine.current_thread_system_id(), "current thread:")
            .unwrap_or_default();
        self.state.set_current_thread(id);
        id
    }

    fn wait_for_stop(&mut self) {
        let events = match self.engine.wait_for_event(None) {
            Ok(events) => events,
            Err(e) => {
                warn!(target: "gateway", "wait for engine event: {e}");
                self.stalled = true;
                return;
            }
        };
        if self.cancelled() {
            return;
        }

        let stopped = self.translate(events);
        self.sync_threads();

        let status = self.status();
        if status == ExecutionStatus::NoDebuggee {
            if !self.exited {
                self.exited = true;
                self.emit(GatewayEvent::ProcessExited { exit_code: 0 });
            }
        } else if !stopped && !status.is_running() {
            let thread = self.current_thread_id();
            match self.resume {
                Some(Resume::Step) => self.emit(GatewayEvent::StepCompleted { thread }),
                _ => self.emit(GatewayEvent::BreakHit { thread }),
            }
        }
        if !status.is_running() {
            self.resume = None;
        }
    }

    /// Publish native events, return true if one of them stops the debuggee.
    fn translate(&mut self, events: Vec<NativeEvent>) -> bool {
        let mut stopped = false;
        for event in events {
            match event {
                NativeEvent::Breakpoint { id } => {
                    stopped = true;
                    let thread = self.current_thread_id();
                    match self.breakpoints.get(id) {
                        Some(breakpoint) => self.emit(GatewayEvent::BreakpointHit {
                            breakpoint: breakpoint.clone(),
                            thread,
                        }),
                        None => self.emit(GatewayEvent::BreakHit { thread }),
                    }
                }
                NativeEvent::Exception { code, first_chance } => {
                    stopped = true;
                    let thread = self.current_thread_id();
                    self.emit(GatewayEvent::ExceptionHit {
                        code,
                        first_chance,
                        thread,
                    });
                }
                NativeEvent::Break => {
                    stopped = true;
                    let thread = self.current_thread_id();
                    self.emit(GatewayEvent::BreakHit { thread });
                }
                NativeEvent::ThreadCreated { system_id } => {
                    if !self.known_threads.contains(&system_id) {
                        self.known_threads.push(system_id);
                        self.emit(GatewayEvent::ThreadStarted { thread: system_id });
                    }
                }
                NativeEvent::ThreadExited { system_id } => {
                    if let Some(pos) = self.known_threads.iter().position(|t| *t == system_id) {
                        self.known_threads.remove(pos);
                        self.emit(GatewayEvent::ThreadExited { thread: system_id });
                    }
                }
                NativeEvent::ProcessExited { exit_code } => {
                    stopped = true;
                    self.exited = true;
                    self.emit(GatewayEvent::ProcessExited { exit_code });
                }
                NativeEvent::Output { text } => self.emit(GatewayEvent::Output { text }),
            }
        }
        stopped
    }

    /// Compare engine thread list with known threads, some engines report thread creation only.
    fn sync_threads(&mut self) {
        if self.exited {
            for thread in std::mem::take(&mut self.known_threads) {
                self.emit(GatewayEvent::ThreadExited { thread });
            }
            return;
        }
        let Some(alive) = muted_error!(self.engine.thread_system_ids(), "list threads:") else {
            return;
        };

        let exited: Vec<u32> = self
            .known_threads
            .iter()
            .filter(|t| !alive.contains(t))
            .copied()
            .collect();
        for thread in exited {
            self.emit(GatewayEvent::ThreadExited { thread });
        }
        for thread in alive.iter().filter(|t| !self.known_threads.contains(t)) {
            self.emit(GatewayEvent::ThreadStarted { thread: *thread });
        }

        self.known_threads = alive;
        let alive_groups = &self.known_threads;
        self.symbol_groups
            .retain(|key, _| alive_groups.contains(&key.thread));
    }

    // ------------------------------------ execution ---------------------------------------------

    fn launch(&mut self, request: LaunchRequest) -> LaunchResult {
        self.state.clear();
        info!(target: "gateway", "launch `{}`", request.command_line);
        if let Err(e) = self.engine.create_process(&request.command_line) {
            return LaunchResult::Failed(format!("Error creating process: {}", e.status()));
        }
        self.start(
            Some(request.target),
            &request.source_paths,
            &request.symbol_paths,
        )
    }

    fn attach(&mut self, request: AttachRequest) -> LaunchResult {
        self.state.clear();
        info!(target: "gateway", "attach to process {}", request.pid);
        if let Err(e) = self.engine.attach_process(request.pid) {
            return LaunchResult::Failed(format!("Error attaching to process: {}", e.status()));
        }
        self.start(request.target, &request.source_paths, &request.symbol_paths)
    }

    /// Wait for the initial stop and prepare sources and symbols of a new debuggee.
    fn start(
        &mut self,
        target: Option<PathBuf>,
        source_paths: &[String],
        symbol_paths: &[String],
    ) -> LaunchResult {
        match self.engine.wait_for_event(None) {
            Ok(events) => {
                for event in events {
                    if let NativeEvent::Output { text } = event {
                        self.emit(GatewayEvent::Output { text });
                    }
                }
            }
            Err(e) => {
                return LaunchResult::Failed(format!("Error attaching debugger: {}", e.status()))
            }
        }

        self.exited = false;
        self.resume = None;
        self.known_threads =
            muted_error!(self.engine.thread_system_ids(), "list threads:").unwrap_or_default();

        let pid = match self.engine.current_process_system_id() {
            Ok(pid) => pid,
            Err(e) => {
                return LaunchResult::Failed(format!("Error reading process info: {}", e.status()))
            }
        };
        let is_64bit = weak_error!(self.engine.is_pointer_64bit(), "detect pointer size:")
            .unwrap_or(true);

        let user_sources: Vec<&String> = source_paths
            .iter()
            .chain(self.options.source_paths.iter())
            .collect();
        let source_path = sources::source_path(&user_sources, self.options.std_lib_path.as_deref());
        if let Err(e) = self.engine.set_source_path(&source_path) {
            return LaunchResult::Failed(format!("Error setting source paths: {}", e.status()));
        }

        let user_symbols: Vec<&String> = symbol_paths
            .iter()
            .chain(self.options.symbol_paths.iter())
            .collect();
        let symbol_path = sources::symbol_path(target.as_deref(), &user_symbols);
        if let Err(e) = self.engine.set_symbol_path(&symbol_path) {
            return LaunchResult::Failed(format!("Error setting symbol paths: {}", e.status()));
        }

        let module = match self.engine.main_module_name() {
            Ok(module) => module,
            Err(e) => {
                return LaunchResult::Failed(format!(
                    "Error reading main module name: {}",
                    e.status()
                ))
            }
        };
        if let Err(e) = self.engine.reload_symbols(&module) {
            return LaunchResult::Failed(format!("Error loading debug symbols: {}", e.status()));
        }
        weak_error!(
            self.engine.apply_settings(&self.options.settings),
            "apply engine settings:"
        );

        let info = ProcessInfo {
            pid,
            pointer_size: if is_64bit { 8 } else { 4 },
            target,
        };
        info!(target: "gateway", "debuggee {pid} started, sources: `{source_path}`, symbols: `{symbol_path}`");
        self.process = Some(info.clone());
        LaunchResult::Started(info)
    }

    fn resume(&mut self) -> ExecutionResult {
        self.state.clear();
        match self.engine.set_execution_status(ExecutionStatus::Go) {
            Ok(()) => {
                self.resume = Some(Resume::Continue);
                self.stalled = false;
                ExecutionResult::ok()
            }
            Err(e) => ExecutionResult::failed(format!("Error continuing: {}", e.status())),
        }
    }

    fn step(&mut self, step: Step, thread: Option<u32>) -> ExecutionResult {
        if let Some(thread) = thread {
            if let Err(e) = self.ensure_thread(thread) {
                return ExecutionResult::failed(format!("Could not select thread {thread}: {e}"));
            }
        }

        self.state.clear();
        let result = match step {
            Step::Into => self
                .engine
                .set_execution_status(ExecutionStatus::StepInto),
            Step::Over => self
                .engine
                .set_execution_status(ExecutionStatus::StepOver),
            Step::Out => self.engine.execute("gu"),
        };
        match result {
            Ok(()) => {
                self.resume = Some(Resume::Step);
                self.stalled = false;
                ExecutionResult::ok()
            }
            Err(e) => ExecutionResult::failed(format!("Error stepping: {}", e.status())),
        }
    }

    fn terminate(&mut self) -> ExecutionResult {
        self.cancel.store(true, Ordering::SeqCst);
        let result = match self.engine.end() {
            Ok(()) => ExecutionResult::ok(),
            Err(e) => ExecutionResult::failed(format!("Error ending session: {}", e.status())),
        };
        self.state.clear();
        self.symbol_groups.clear();
        self.process = None;
        self.emit(GatewayEvent::Terminated);
        result
    }

    // ------------------------------------ breakpoints -------------------------------------------

    fn set_breakpoints(&mut self, file: String, lines: Vec<u32>) -> Vec<BreakpointResult> {
        for id in self.breakpoints.take_file(&file) {
            weak_error!(self.engine.remove_breakpoint(id), "remove breakpoint:");
        }

        let mut result = Vec::with_capacity(lines.len());
        for line in lines {
            let breakpoint = Breakpoint::new(file.clone(), line);
            let verified = match self.add_breakpoint(&breakpoint) {
                Ok(id) => {
                    debug!(target: "gateway", "breakpoint {id} set at {breakpoint}");
                    true
                }
                Err(e) => {
                    warn!(target: "gateway", "breakpoint not set at {breakpoint}: {e}");
                    false
                }
            };
            result.push(BreakpointResult {
                breakpoint,
                verified,
            });
        }
        result
    }

    fn add_breakpoint(&mut self, breakpoint: &Breakpoint) -> EngineResult<u32> {
        let offset = self
            .engine
            .offset_by_line(&breakpoint.file, breakpoint.line)?;
        let id = self.breakpoints.next_id();
        self.engine.add_code_breakpoint(id, offset)?;
        self.breakpoints.insert(id, breakpoint.clone());
        Ok(id)
    }

    // ------------------------------------ inspection --------------------------------------------

    fn ensure_thread(&mut self, system_id: u32) -> EngineResult<()> {
        if self.engine.current_thread_system_id()? != system_id {
            self.engine.set_current_thread(system_id)?;
        }
        self.state.set_current_thread(system_id);
        Ok(())
    }

    /// Make frame current in the engine, return (thread system id, frame order) of the frame.
    fn ensure_frame(&mut self, frame: Handle) -> EngineResult<Option<(u32, u32)>> {
        let Some(order) = self.state.frame(frame).map(|f| f.order) else {
            return Ok(None);
        };
        let thread = self.state.thread_of(frame);
        let Some(system_id) = self.state.thread(thread).map(|t| t.system_id) else {
            return Ok(None);
        };

        self.ensure_thread(system_id)?;
        if self.engine.current_scope_frame_index()? != order {
            self.engine.set_scope_frame_index(order)?;
        }
        self.state.set_current_frame(frame);
        Ok(Some((system_id, order)))
    }

    fn threads(&mut self) -> Vec<Thread> {
        let Some(ids) = weak_error!(self.engine.thread_system_ids(), "list threads:") else {
            return vec![];
        };
        self.state.retain_threads(&ids);
        for id in &ids {
            self.state.add_thread(*id, format!("Thread #{id}"));
        }
        self.state.threads().cloned().collect()
    }

    fn stack_trace(&mut self, system_id: u32) -> Vec<Frame> {
        if let Err(e) = self.ensure_thread(system_id) {
            warn!(target: "gateway", "select thread {system_id}: {e}");
            return vec![];
        }
        let thread = self
            .state
            .add_thread(system_id, format!("Thread #{system_id}"));
        let known: Vec<Frame> = self.state.frames_of(thread).cloned().collect();
        if !known.is_empty() {
            return known;
        }

        let Some(native_frames) = weak_error!(
            self.engine.stack_trace(self.options.max_frames),
            "stack trace:"
        ) else {
            return vec![];
        };

        let mut frames = Vec::with_capacity(native_frames.len());
        for native in native_frames {
            let (file, line) =
                match muted_error!(self.engine.line_by_offset(native.instruction_offset)) {
                    Some(source) => {
                        let file = muted_error!(self.engine.find_source_file(&source.file))
                            .unwrap_or(source.file);
                        (Some(file), source.line)
                    }
                    None => (None, 0),
                };
            let function = muted_error!(self.engine.name_by_offset(native.instruction_offset))
                .unwrap_or_else(|| format!("{:#x}", native.instruction_offset));

            let frame = Frame {
                handle: Handle::NONE,
                instruction_offset: native.instruction_offset,
                order: native.frame_number,
                file,
                line,
                function,
            };
            match self.state.add(thread, |handle| {
                Entity::Frame(Frame {
                    handle,
                    ..frame.clone()
                })
            }) {
                Ok(handle) => frames.push(Frame { handle, ..frame }),
                Err(e) => warn!(target: "gateway", "register frame: {e}"),
            }
        }
        frames
    }

    fn scopes(&mut self, frame: Handle) -> Vec<Scope> {
        if self.state.frame(frame).is_none() {
            debug!(target: "gateway", "unknown frame {frame}");
            return vec![];
        }
        if let Err(e) = self.ensure_frame(frame) {
            warn!(target: "gateway", "select frame {frame}: {e}");
            return vec![];
        }

        let mut scopes = vec![];
        for kind in ScopeKind::iter() {
            let known = self
                .state
                .scopes_of(frame)
                .find(|scope| scope.kind == kind)
                .cloned();
            let scope = match known {
                Some(scope) => scope,
                None => match self
                    .state
                    .add(frame, |handle| Entity::Scope(Scope { handle, kind }))
                {
                    Ok(handle) => Scope { handle, kind },
                    Err(e) => {
                        warn!(target: "gateway", "register scope: {e}");
                        continue;
                    }
                },
            };
            scopes.push(scope);
        }
        scopes
    }

    fn variables(&mut self, reference: Handle) -> Vec<Variable> {
        let scope = match self.state.get(reference) {
            Some(EntityRef::Scope(scope)) => Some(scope.clone()),
            Some(EntityRef::Variable(_)) => None,
            _ => {
                debug!(target: "gateway", "reference {reference} is not a scope or variable");
                return vec![];
            }
        };
        match scope {
            Some(scope) => self.scope_variables(scope),
            None => self.expand_variable(reference),
        }
    }

    fn scope_variables(&mut self, scope: Scope) -> Vec<Variable> {
        let frame = self.state.frame_of(scope.handle);
        let (thread, order) = match self.ensure_frame(frame) {
            Ok(Some(context)) => context,
            Ok(None) => return vec![],
            Err(e) => {
                warn!(target: "gateway", "select frame {frame}: {e}");
                return vec![];
            }
        };

        let key = GroupKey {
            thread,
            frame: order,
            kind: scope.kind,
        };
        let previous = self.symbol_groups.remove(&key);
        let previous_count = previous.as_ref().map(|cached| cached.count);
        let group = match self
            .engine
            .scope_symbol_group(scope.kind, previous.map(|cached| cached.group))
        {
            Ok(group) => group,
            Err(e) => {
                warn!(target: "gateway", "symbols of {} scope: {e}", scope.kind);
                return vec![];
            }
        };
        let count = weak_error!(group.count(), "count symbols:").unwrap_or_default();

        let known: Vec<Variable> = self.state.variables_of(scope.handle).cloned().collect();
        let variables = if previous_count == Some(count) && !known.is_empty() {
            known
        } else {
            self.state.remove_children(scope.handle);
            self.materialize(scope.handle, group.as_ref(), count)
        };

        self.symbol_groups.insert(key, CachedGroup { group, count });
        variables
    }

    /// Decode top level symbols of a group into scope variables.
    fn materialize(&mut self, scope: Handle, group: &dyn SymbolGroup, count: u32) -> Vec<Variable> {
        let pointer_size = self.pointer_size();
        let mut mem =
            MemoryGateway::new(self.engine.data_spaces(), &mut self.type_names, pointer_size);

        let mut variables = vec![];
        for index in 0..count {
            let Some(entry) = weak_error!(group.entry(index), "read symbol:") else {
                continue;
            };
            if entry.parent.is_some() {
                continue;
            }

            let data = mem.create(entry.module_base, entry.offset, entry.type_id);
            let type_name = if entry.type_name.is_empty() {
                mem.type_name(&data)
            } else {
                entry.type_name
            };
            let meta = VariableMetaData::new(entry.name, type_name, data);
            let visualization = if data.is_none() {
                Visualization::leaf(entry.value_text)
            } else {
                self.visualizers.resolve(&mut mem, &meta)
            };

            match add_variable(&mut self.state, scope, meta, visualization) {
                Ok(variable) => variables.push(variable),
                Err(e) => warn!(target: "gateway", "register variable: {e}"),
            }
        }
        variables
    }

    fn expand_variable(&mut self, handle: Handle) -> Vec<Variable> {
        let known: Vec<Variable> = self.state.variables_of(handle).cloned().collect();
        if !known.is_empty() {
            return known;
        }
        let Some(meta) = self.state.variable(handle).map(|v| v.meta.clone()) else {
            return vec![];
        };

        let pointer_size = self.pointer_size();
        let mut mem =
            MemoryGateway::new(self.engine.data_spaces(), &mut self.type_names, pointer_size);

        let mut variables = vec![];
        for child in self.visualizers.children(&mut mem, &meta) {
            let visualization = self.visualizers.resolve(&mut mem, &child);
            match add_variable(&mut self.state, handle, child, visualization) {
                Ok(variable) => variables.push(variable),
                Err(e) => warn!(target: "gateway", "register variable: {e}"),
            }
        }
        variables
    }

    fn set_variable(&mut self, container: Handle, name: &str, value: &str) -> SetVariableResult {
        let failed = |error: String| SetVariableResult {
            variable: None,
            error: Some(error),
        };

        let Some(target) = self
            .state
            .variables_of(container)
            .find(|v| v.name == name)
            .cloned()
        else {
            return failed(format!("variable `{name}` not found"));
        };
        let frame = self.state.frame_of(container);
        if let Err(e) = self.ensure_frame(frame) {
            warn!(target: "gateway", "select frame {frame}: {e}");
        }

        let pointer_size = self.pointer_size();
        let mut mem =
            MemoryGateway::new(self.engine.data_spaces(), &mut self.type_names, pointer_size);

        let new_value = mem.evaluate(value);
        if new_value.is_none() {
            return failed(format!("unable to evaluate `{value}`"));
        }
        let data = target.meta.data;
        let size = (data.size as usize).min(std::mem::size_of::<u64>());
        if size == 0 || data.offset == 0 {
            return failed(format!("variable `{name}` is not writable"));
        }
        if !mem.write_bytes(data.offset, &new_value.data.to_le_bytes()[..size]) {
            return failed(format!("unable to write `{name}`"));
        }

        let refreshed = mem.create(data.module_base, data.offset, data.type_id);
        let meta = VariableMetaData::new(target.name.clone(), target.type_name.clone(), refreshed);
        let visualization = self.visualizers.resolve(&mut mem, &meta);

        self.state.remove_children(target.handle);
        if let Some(variable) = self.state.variable_mut(target.handle) {
            variable.value = visualization.value;
            variable.has_children = visualization.has_children;
            variable.meta = meta;
        }
        SetVariableResult {
            variable: self.state.variable(target.handle).cloned(),
            error: None,
        }
    }

    fn evaluate(&mut self, expression: &str, frame: Option<Handle>) -> EvaluateResult {
        let frame = frame
            .or(self.state.current_frame())
            .filter(|frame| self.state.frame(*frame).is_some());
        if let Some(frame) = frame {
            if let Err(e) = self.ensure_frame(frame) {
                warn!(target: "gateway", "select frame {frame}: {e}");
            }
        }

        let pointer_size = self.pointer_size();
        let mut mem =
            MemoryGateway::new(self.engine.data_spaces(), &mut self.type_names, pointer_size);

        let data = mem.evaluate(expression);
        if data.is_none() {
            return EvaluateResult {
                error: Some(format!("unable to evaluate `{expression}`")),
                ..EvaluateResult::default()
            };
        }
        let meta = VariableMetaData::resolve(&mut mem, expression, data);
        let visualization = self.visualizers.resolve(&mut mem, &meta);

        let mut reference = Handle::NONE;
        if visualization.has_children {
            if let Some(frame) = frame {
                match add_variable(&mut self.state, frame, meta.clone(), visualization.clone()) {
                    Ok(variable) => reference = variable.reference(),
                    Err(e) => warn!(target: "gateway", "register evaluation result: {e}"),
                }
            }
        }

        EvaluateResult {
            value: visualization.value,
            type_name: meta.type_name,
            reference,
            error: None,
        }
    }
}
