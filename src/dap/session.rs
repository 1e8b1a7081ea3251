//! Debug session of a single client connection.
//!
//! Requests are handled one by one on the session thread, every request gets exactly one
//! response. Gateway events are forwarded to the client from a separate thread.

use crate::api::DebuggerApi;
use crate::config::AdapterConfig;
use crate::dap::convention::ClientConvention;
use crate::dap::error::{ErrorCode, ErrorMessage};
use crate::dap::output::ServerOutput;
use crate::dap::protocol::{DapRequest, DapResponse};
use crate::dap::sourcemap::SourceMap;
use crate::dap::transport::DapReader;
use crate::engine::provider::EngineProvider;
use crate::error::Error;
use crate::gateway::{
    AttachRequest, EngineGateway, ExecutionResult, GatewayError, GatewayEvent, LaunchRequest,
    LaunchResult, Step,
};
use crate::sources::RustEnvironment;
use crate::state::{Frame, Handle, Variable};
use crate::weak_error;
use anyhow::anyhow;
use indexmap::IndexMap;
use itertools::Itertools;
use log::{debug, error, info, warn};
use serde_json::{json, Value};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use strum_macros::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SessionState {
    Uninitialized,
    Initialized,
    Stopped,
    Running,
    Terminated,
}

type SharedState = Arc<Mutex<SessionState>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Result of a request handler: response body or a failure.
type HandlerResult = anyhow::Result<Option<Value>>;

pub struct DebugSession<R> {
    reader: R,
    output: Arc<ServerOutput>,
    provider: Arc<dyn EngineProvider>,
    config: AdapterConfig,
    state: SharedState,
    convention: ClientConvention,
    source_map: SourceMap,
    api: Option<DebuggerApi>,
    forwarder: Option<JoinHandle<()>>,
    /// Breakpoints received before the debuggee starts, by file.
    pending_breakpoints: IndexMap<String, Vec<u32>>,
    configuration_done: bool,
    /// Events sent right after the response of the current request.
    deferred: Vec<(&'static str, Value)>,
}

impl<R> DebugSession<R> {
    pub fn new(
        reader: R,
        output: Arc<ServerOutput>,
        provider: Arc<dyn EngineProvider>,
        config: AdapterConfig,
    ) -> Self {
        Self {
            reader,
            output,
            provider,
            state: Arc::new(Mutex::new(SessionState::Uninitialized)),
            convention: config.convention(),
            source_map: SourceMap::default(),
            api: None,
            forwarder: None,
            pending_breakpoints: IndexMap::new(),
            configuration_done: false,
            deferred: vec![],
            config,
        }
    }

    pub fn output(&self) -> &Arc<ServerOutput> {
        &self.output
    }

    pub fn state(&self) -> SessionState {
        *lock(&self.state)
    }

    fn set_state(&self, state: SessionState) {
        let mut current = lock(&self.state);
        if *current != SessionState::Terminated {
            *current = state;
        }
    }

    /// Handle a request and write the response.
    pub fn handle(&mut self, request: &DapRequest) -> anyhow::Result<()> {
        debug!(target: "dap", "{}: {}", request.seq, request.command);

        let result = panic::catch_unwind(AssertUnwindSafe(|| self.dispatch(request)));
        let failure = match result {
            Ok(Ok(body)) => {
                self.output.respond(DapResponse::success(request, body))?;
                for (event, body) in std::mem::take(&mut self.deferred) {
                    self.output.event(event, body)?;
                }
                return Ok(());
            }
            Ok(Err(err)) => match err.downcast::<ErrorMessage>() {
                Ok(message) => message,
                Err(err) => {
                    error!(target: "dap", "request {} failed: {err:#}", request.command);
                    ErrorMessage::dispatch_failed(&request.command, &format!("{err:#}"))
                }
            },
            Err(payload) => {
                let reason = panic_message(payload.as_ref());
                error!(target: "dap", "request {} panicked: {reason}", request.command);
                ErrorMessage::dispatch_failed(&request.command, &reason)
            }
        };

        self.deferred.clear();
        debug!(target: "dap", "error {}: {failure}", request.seq);
        self.output
            .respond(DapResponse::error(request, failure.text(), failure.body()))
    }

    fn dispatch(&mut self, req: &DapRequest) -> HandlerResult {
        match req.command.as_str() {
            "initialize" => self.initialize(req),
            "launch" => self.launch(req),
            "attach" => self.attach(req),
            "disconnect" => self.disconnect(),
            "setBreakpoints" => self.set_breakpoints(req),
            "setFunctionBreakpoints" => Ok(Some(json!({ "breakpoints": [] }))),
            "setExceptionBreakpoints" => Ok(None),
            "configurationDone" => self.configuration_done(),
            "continue" => self.resume(),
            "next" => self.step(req, Step::Over),
            "stepIn" => self.step(req, Step::Into),
            "stepOut" => self.step(req, Step::Out),
            "pause" => self.pause(),
            "stackTrace" => self.stack_trace(req),
            "scopes" => self.scopes(req),
            "variables" => self.variables(req),
            "setVariable" => self.set_variable(req),
            "threads" => self.threads(),
            "evaluate" => self.evaluate(req),
            "source" => {
                Err(ErrorMessage::new(ErrorCode::SourceNotSupported, "Source not supported").into())
            }
            other => Err(ErrorMessage::unrecognized_request(other).into()),
        }
    }

    fn api(&self) -> Result<&DebuggerApi, ErrorMessage> {
        self.api.as_ref().ok_or_else(ErrorMessage::no_debuggee)
    }

    fn initialize(&mut self, req: &DapRequest) -> HandlerResult {
        let mut convention = self.config.convention();
        if let Some(lines_start_at1) = req.bool_argument("linesStartAt1") {
            convention.lines_start_at1 = lines_start_at1;
        }
        if let Some(format) = req.str_argument("pathFormat") {
            convention.path_format = format.parse().map_err(|_| {
                ErrorMessage::new(
                    ErrorCode::BadPathFormat,
                    "initialize: bad value '{_format}' for pathFormat",
                )
                .with("_format", format)
            })?;
        }
        self.convention = convention;

        if !self.provider.is_supported() {
            return Err(ErrorMessage::new(
                ErrorCode::PlatformNotSupported,
                "Engine '{_engine}' is not supported on '{_platform}' platform.",
            )
            .with("_engine", self.provider.name())
            .with("_platform", std::env::consts::OS)
            .into());
        }

        self.set_state(SessionState::Initialized);
        self.deferred.push(("initialized", Value::Null));

        Ok(Some(json!({
            "supportsConfigurationDoneRequest": true,
            "supportsFunctionBreakpoints": false,
            "supportsConditionalBreakpoints": false,
            "supportsEvaluateForHovers": true,
            "supportsSetVariable": true,
            "exceptionBreakpointFilters": [],
        })))
    }

    fn ensure_not_started(&self, code: ErrorCode) -> Result<(), ErrorMessage> {
        if self.api.is_some() {
            return Err(ErrorMessage::new(code, "Debuggee is already started."));
        }
        Ok(())
    }

    fn launch(&mut self, req: &DapRequest) -> HandlerResult {
        self.ensure_not_started(ErrorCode::FailedToLaunch)?;

        let program = req
            .str_argument("target")
            .or_else(|| req.str_argument("program"))
            .filter(|program| !program.trim().is_empty())
            .ok_or_else(|| ErrorMessage::missing_argument("target"))?;

        let cwd = req
            .str_argument("workingDir")
            .or_else(|| req.str_argument("cwd"))
            .map(PathBuf::from)
            .filter(|cwd| cwd.is_dir());
        if let Some(cwd) = &cwd {
            weak_error!(std::env::set_current_dir(cwd), "change working directory:");
        }

        let request = match LaunchRequest::new(program, &req.list_argument("args"), cwd.as_deref())
        {
            Ok(request) => request,
            Err(Error::TargetNotFound(_)) => {
                return Err(ErrorMessage::new(
                    ErrorCode::TargetDoesNotExist,
                    "Could not launch '{_target}' as it does not exist.",
                )
                .with("_target", program)
                .into())
            }
            Err(err) => return Err(err.into()),
        }
        .with_paths(
            req.list_argument("sourcePaths"),
            req.list_argument("symbolPaths"),
        );

        info!(target: "dap", "launch `{}`", request.command_line);
        let api = self.start_gateway(req, ErrorCode::FailedToLaunch)?;
        let result = api.launch(request).map_err(gateway_error)?;
        self.started(req, api, result, ErrorCode::FailedToLaunch)
    }

    fn attach(&mut self, req: &DapRequest) -> HandlerResult {
        self.ensure_not_started(ErrorCode::FailedToAttach)?;

        let pid = req
            .int_argument("processId")
            .ok_or_else(|| ErrorMessage::missing_argument("processId"))?;
        let request = u32::try_from(pid)
            .map_err(|_| Error::AttachedProcessNotFound(0))
            .and_then(AttachRequest::new)
            .map_err(|err| {
                ErrorMessage::new(
                    ErrorCode::FailedToAttach,
                    "Could not attach to process {_pid}: {_error}",
                )
                .with("_pid", pid)
                .with("_error", err.to_string())
            })?
            .with_paths(
                req.list_argument("sourcePaths"),
                req.list_argument("symbolPaths"),
            );

        info!(target: "dap", "attach to process {pid}");
        let api = self.start_gateway(req, ErrorCode::FailedToAttach)?;
        let result = api.attach(request).map_err(gateway_error)?;
        self.started(req, api, result, ErrorCode::FailedToAttach)
    }

    fn start_gateway(&mut self, req: &DapRequest, code: ErrorCode) -> anyhow::Result<DebuggerApi> {
        let mut engine_options = self.config.engine_options();
        if let Some(path) = req
            .str_argument("windbgpath")
            .or_else(|| req.str_argument("enginePath"))
        {
            engine_options.engine_path = Some(PathBuf::from(path));
        }
        let options = self
            .config
            .gateway_options(RustEnvironment::current().std_lib_path());

        let gateway = EngineGateway::spawn(self.provider.clone(), engine_options, options)
            .map_err(|err| ErrorMessage::new(code, "{_error}").with("_error", err.to_string()))?;
        let api = DebuggerApi::new(Arc::new(gateway));

        let forwarder = EventForwarder {
            events: api.subscribe(),
            output: self.output.clone(),
            gateway: api.gateway().clone(),
            state: self.state.clone(),
        };
        match std::thread::Builder::new()
            .name("dap-events".to_string())
            .spawn(move || forwarder.run())
        {
            Ok(handle) => self.forwarder = Some(handle),
            Err(err) => {
                api.dispose();
                return Err(err.into());
            }
        }

        Ok(api)
    }

    fn started(
        &mut self,
        req: &DapRequest,
        api: DebuggerApi,
        result: LaunchResult,
        code: ErrorCode,
    ) -> HandlerResult {
        match result {
            LaunchResult::Started(process) => {
                info!(target: "dap", "debuggee started, pid {}", process.pid);
                self.source_map = SourceMap::from_launch_args(&req.arguments);
                self.api = Some(api);
                self.set_state(SessionState::Stopped);
                self.apply_pending_breakpoints()?;
                if self.configuration_done {
                    self.continue_after_configuration()?;
                }
                Ok(None)
            }
            LaunchResult::Failed(message) => {
                api.dispose();
                self.join_forwarder();
                Err(ErrorMessage::new(code, "{_error}")
                    .with("_error", message)
                    .into())
            }
        }
    }

    fn disconnect(&mut self) -> HandlerResult {
        *lock(&self.state) = SessionState::Terminated;
        self.shutdown();
        Ok(None)
    }

    /// Terminate debuggee and release the engine. Next calls are no-op.
    fn shutdown(&mut self) {
        if let Some(api) = self.api.take() {
            match api.terminate() {
                Ok(result) => {
                    if let Some(err) = result.error {
                        warn!(target: "dap", "terminate debuggee: {err}");
                    }
                }
                Err(err) => debug!(target: "dap", "terminate debuggee: {err}"),
            }
            api.dispose();
        }
        self.join_forwarder();
    }

    fn join_forwarder(&mut self) {
        if let Some(forwarder) = self.forwarder.take() {
            if forwarder.join().is_err() {
                error!(target: "dap", "event forwarder panicked");
            }
        }
    }

    /// Client path of `source.path` argument converted to a debugger path.
    fn source_path(&self, req: &DapRequest) -> anyhow::Result<Option<String>> {
        let path = req
            .argument("source")
            .and_then(|source| source.get("path"))
            .and_then(Value::as_str)
            .ok_or_else(|| ErrorMessage::missing_argument("source.path"))?;
        Ok(self.convention.path_to_debugger(path))
    }

    fn set_breakpoints(&mut self, req: &DapRequest) -> HandlerResult {
        let path = self.source_path(req)?;

        let client_lines = match req.argument("breakpoints") {
            Some(Value::Array(breakpoints)) => breakpoints
                .iter()
                .filter_map(|bp| bp.get("line").and_then(Value::as_i64))
                .collect_vec(),
            _ => match req.argument("lines") {
                Some(Value::Array(lines)) => lines.iter().filter_map(Value::as_i64).collect_vec(),
                _ => vec![],
            },
        };
        let lines = client_lines
            .iter()
            .map(|line| self.convention.line_to_debugger(*line))
            .collect_vec();

        let verified = match (path, &self.api) {
            (None, _) => vec![false; lines.len()],
            (Some(path), None) => {
                let count = lines.len();
                self.pending_breakpoints.insert(path, lines);
                vec![false; count]
            }
            (Some(path), Some(api)) => {
                let file = self.source_map.to_target(&path);
                let results = api.set_breakpoints(&file, lines).map_err(gateway_error)?;
                results.iter().map(|result| result.verified).collect_vec()
            }
        };

        let source = req.argument("source").cloned().unwrap_or(Value::Null);
        let breakpoints = client_lines
            .iter()
            .enumerate()
            .map(|(idx, line)| {
                json!({
                    "verified": verified.get(idx).copied().unwrap_or_default(),
                    "line": line,
                    "source": source,
                })
            })
            .collect_vec();
        Ok(Some(json!({ "breakpoints": breakpoints })))
    }

    fn apply_pending_breakpoints(&mut self) -> anyhow::Result<()> {
        let Some(api) = &self.api else {
            return Ok(());
        };
        for (path, lines) in std::mem::take(&mut self.pending_breakpoints) {
            let file = self.source_map.to_target(&path);
            let results = api.set_breakpoints(&file, lines).map_err(gateway_error)?;
            debug!(
                target: "dap",
                "{} of {} breakpoints set in {file}",
                results.iter().filter(|result| result.verified).count(),
                results.len()
            );
        }
        Ok(())
    }

    fn configuration_done(&mut self) -> HandlerResult {
        self.configuration_done = true;
        if self.api.is_some() && self.state() == SessionState::Stopped {
            self.continue_after_configuration()?;
        }
        Ok(None)
    }

    /// Start the debuggee held at its initial stop.
    ///
    /// `continued` goes out before the resume, a stop may be reported right after it.
    fn continue_after_configuration(&mut self) -> anyhow::Result<()> {
        let thread = self
            .api()?
            .threads()
            .map_err(gateway_error)?
            .first()
            .map(|thread| thread.system_id);
        if let Some(thread) = thread {
            self.output.event(
                "continued",
                json!({ "threadId": thread, "allThreadsContinued": true }),
            )?;
        }
        self.resume()?;
        Ok(())
    }

    /// Mark session running before the command, a stop may be reported before the reply.
    fn run_debuggee(
        &self,
        command: impl FnOnce(&DebuggerApi) -> Result<ExecutionResult, GatewayError>,
    ) -> anyhow::Result<()> {
        let api = self.api()?;
        let previous = self.state();
        self.set_state(SessionState::Running);
        let result = command(api).map_err(gateway_error);
        match result {
            Ok(ExecutionResult { error: None }) => Ok(()),
            Ok(ExecutionResult { error: Some(err) }) => {
                self.set_state(previous);
                Err(anyhow!(err))
            }
            Err(err) => {
                self.set_state(previous);
                Err(err)
            }
        }
    }

    fn resume(&mut self) -> HandlerResult {
        self.run_debuggee(DebuggerApi::continue_execution)?;
        Ok(Some(json!({ "allThreadsContinued": true })))
    }

    fn step(&mut self, req: &DapRequest, step: Step) -> HandlerResult {
        let thread = req
            .int_argument("threadId")
            .and_then(|thread| u32::try_from(thread).ok());
        self.run_debuggee(|api| api.step(step, thread))?;
        Ok(None)
    }

    fn pause(&mut self) -> HandlerResult {
        let result = self.api()?.pause().map_err(gateway_error)?;
        if let Some(err) = result.error {
            return Err(anyhow!(err));
        }
        Ok(None)
    }

    fn frame_body(&self, frame: &Frame) -> Value {
        let mut body = json!({
            "id": frame.handle.as_raw(),
            "name": frame.function,
            "line": 0,
            "column": 0,
            "instructionPointerReference": format!("0x{:X}", frame.instruction_offset),
        });

        let client_path = frame.file.as_deref().and_then(|file| {
            let mapped = self.source_map.to_client(file);
            self.convention.path_to_client(&mapped)
        });
        if let (Some(file), Some(path)) = (&frame.file, client_path) {
            let name = Path::new(&file.replace('\\', "/"))
                .file_name()
                .map(|name| name.to_string_lossy().to_string())
                .unwrap_or_else(|| file.clone());
            body["source"] = json!({ "name": name, "path": path });
            body["line"] = json!(self.convention.line_to_client(frame.line));
            body["column"] = json!(1);
        }
        body
    }

    fn stack_trace(&mut self, req: &DapRequest) -> HandlerResult {
        let thread = req
            .int_argument("threadId")
            .ok_or_else(|| ErrorMessage::missing_argument("threadId"))?;
        let thread = u32::try_from(thread).map_err(|_| anyhow!("invalid thread id {thread}"))?;

        let frames = self.api()?.stack_trace(thread).map_err(gateway_error)?;
        let start = req.int_argument("startFrame").unwrap_or(0).max(0) as usize;
        let levels = req
            .int_argument("levels")
            .filter(|levels| *levels > 0)
            .map(|levels| levels as usize)
            .unwrap_or(usize::MAX);

        let stack_frames = frames
            .iter()
            .skip(start)
            .take(levels)
            .map(|frame| self.frame_body(frame))
            .collect_vec();
        Ok(Some(json!({
            "stackFrames": stack_frames,
            "totalFrames": frames.len(),
        })))
    }

    fn scopes(&mut self, req: &DapRequest) -> HandlerResult {
        let frame = req
            .int_argument("frameId")
            .ok_or_else(|| ErrorMessage::missing_argument("frameId"))?;
        let scopes = self
            .api()?
            .scopes(Handle::from_raw(frame))
            .map_err(gateway_error)?;
        let scopes = scopes
            .iter()
            .map(|scope| {
                json!({
                    "name": scope.kind.to_string(),
                    "variablesReference": scope.handle.as_raw(),
                    "expensive": false,
                })
            })
            .collect_vec();
        Ok(Some(json!({ "scopes": scopes })))
    }

    fn variables(&mut self, req: &DapRequest) -> HandlerResult {
        let reference = variables_reference(req)?;
        if reference.is_none() {
            return Ok(Some(json!({ "variables": [] })));
        }
        let variables = self
            .api()?
            .variables(reference)
            .map_err(gateway_error)?
            .iter()
            .map(variable_body)
            .collect_vec();
        Ok(Some(json!({ "variables": variables })))
    }

    fn set_variable(&mut self, req: &DapRequest) -> HandlerResult {
        let reference = variables_reference(req)?;
        let name = req
            .str_argument("name")
            .ok_or_else(|| ErrorMessage::missing_argument("name"))?;
        let value = req
            .str_argument("value")
            .ok_or_else(|| ErrorMessage::missing_argument("value"))?;

        let result = self
            .api()?
            .set_variable(reference, name, value)
            .map_err(gateway_error)?;
        if let Some(err) = result.error {
            return Err(anyhow!(err));
        }
        let variable = result
            .variable
            .ok_or_else(|| anyhow!("variable `{name}` not found"))?;
        Ok(Some(json!({
            "value": variable.value,
            "type": variable.type_name,
            "variablesReference": variable.reference().as_raw(),
        })))
    }

    fn threads(&mut self) -> HandlerResult {
        let threads = match &self.api {
            None => vec![],
            Some(api) => api.threads().map_err(gateway_error)?,
        };
        let threads = threads
            .iter()
            .map(|thread| json!({ "id": thread.system_id, "name": thread.name }))
            .collect_vec();
        Ok(Some(json!({ "threads": threads })))
    }

    fn evaluate(&mut self, req: &DapRequest) -> HandlerResult {
        let expression = req
            .str_argument("expression")
            .ok_or_else(|| ErrorMessage::missing_argument("expression"))?;
        let frame = req.int_argument("frameId").map(Handle::from_raw);

        let result = self
            .api()?
            .evaluate(expression, frame)
            .map_err(gateway_error)?;
        if let Some(err) = result.error {
            return Err(anyhow!(err));
        }
        Ok(Some(json!({
            "result": result.value,
            "type": result.type_name,
            "variablesReference": result.reference.as_raw(),
        })))
    }
}

impl<R: DapReader> DebugSession<R> {
    /// Serve requests until the client disconnects or closes the connection.
    pub fn run(mut self) -> anyhow::Result<()> {
        loop {
            let Some(message) = self.reader.read_message()? else {
                info!(target: "dap", "client closed the connection");
                break;
            };
            let request: DapRequest = match serde_json::from_value(message) {
                Ok(request) => request,
                Err(err) => {
                    warn!(target: "dap", "skip malformed message: {err}");
                    continue;
                }
            };
            if request.r#type != "request" {
                debug!(target: "dap", "skip message of type `{}`", request.r#type);
                continue;
            }

            self.handle(&request)?;

            if request.command == "disconnect" {
                break;
            }
        }
        Ok(())
    }
}

impl<R> Drop for DebugSession<R> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn variables_reference(req: &DapRequest) -> Result<Handle, ErrorMessage> {
    req.int_argument("variablesReference")
        .map(Handle::from_raw)
        .ok_or_else(|| {
            ErrorMessage::new(
                ErrorCode::MissingVariablesReference,
                "Missing argument 'variablesReference'.",
            )
        })
}

fn variable_body(variable: &Variable) -> Value {
    json!({
        "name": variable.name,
        "value": variable.value,
        "type": variable.type_name,
        "variablesReference": variable.reference().as_raw(),
    })
}

fn gateway_error(err: GatewayError) -> anyhow::Error {
    match err {
        GatewayError::Closed => ErrorMessage::no_debuggee().into(),
        err => err.into(),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Translates gateway events into protocol events.
struct EventForwarder {
    events: mpsc::Receiver<GatewayEvent>,
    output: Arc<ServerOutput>,
    gateway: Arc<EngineGateway>,
    state: SharedState,
}

impl EventForwarder {
    fn run(self) {
        for event in self.events.iter() {
            if let Err(err) = self.forward(event) {
                warn!(target: "dap", "forward event: {err:#}");
            }
        }
        debug!(target: "dap", "event forwarding finished");
    }

    fn forward(&self, event: GatewayEvent) -> anyhow::Result<()> {
        match event {
            GatewayEvent::BreakpointHit { thread, .. } => self.stopped("breakpoint", thread, None),
            GatewayEvent::ExceptionHit {
                code,
                first_chance,
                thread,
            } => {
                let chance = if first_chance { "first" } else { "second" };
                let text = format!("Exception 0x{code:08X} ({chance} chance)");
                self.stopped("exception", thread, Some(text))
            }
            GatewayEvent::BreakHit { thread } => self.stopped("break", thread, None),
            GatewayEvent::StepCompleted { thread } => self.stopped("step", thread, None),
            GatewayEvent::ThreadStarted { thread } => self
                .output
                .event("thread", json!({ "reason": "started", "threadId": thread })),
            GatewayEvent::ThreadExited { thread } => self
                .output
                .event("thread", json!({ "reason": "exited", "threadId": thread })),
            GatewayEvent::Output { text } => self
                .output
                .event("output", json!({ "category": "stdout", "output": text })),
            GatewayEvent::ProcessExited { exit_code } => {
                self.output
                    .event("exited", json!({ "exitCode": exit_code }))?;
                self.terminated()?;
                self.gateway.dispose();
                Ok(())
            }
            GatewayEvent::Terminated => self.terminated(),
        }
    }

    fn stopped(&self, reason: &str, thread: u32, text: Option<String>) -> anyhow::Result<()> {
        {
            let mut state = lock(&self.state);
            if *state == SessionState::Terminated {
                return Ok(());
            }
            *state = SessionState::Stopped;
        }
        let mut body = json!({
            "reason": reason,
            "threadId": thread,
            "allThreadsStopped": true,
        });
        if let Some(text) = text {
            body["text"] = json!(text);
        }
        self.output.event("stopped", body)
    }

    fn terminated(&self) -> anyhow::Result<()> {
        let previous = std::mem::replace(&mut *lock(&self.state), SessionState::Terminated);
        if previous != SessionState::Terminated {
            self.output.event("terminated", Value::Null)?;
        }
        Ok(())
    }
}
