//! Typed client of the engine gateway.
//!
//! Every call submits one command and blocks the calling thread until the result arrives or the
//! gateway request timeout expires (then the result type default is returned).

use crate::gateway::{
    AttachRequest, BreakpointResult, Command, EngineGateway, EvaluateResult, ExecutionResult,
    GatewayError, GatewayEvent, LaunchRequest, LaunchResult, ProcessInfo, SetVariableResult, Step,
};
use crate::state::{Frame, Handle, Scope, Thread, Variable};
use std::sync::{mpsc, Arc};

#[derive(Clone)]
pub struct DebuggerApi {
    gateway: Arc<EngineGateway>,
}

impl DebuggerApi {
    pub fn new(gateway: Arc<EngineGateway>) -> Self {
        Self { gateway }
    }

    pub fn gateway(&self) -> &Arc<EngineGateway> {
        &self.gateway
    }

    pub fn subscribe(&self) -> mpsc::Receiver<GatewayEvent> {
        self.gateway.subscribe()
    }

    pub fn launch(&self, request: LaunchRequest) -> Result<LaunchResult, GatewayError> {
        Ok(self
            .gateway
            .submit(|reply| Command::Launch(request, reply))?
            .wait())
    }

    pub fn attach(&self, request: AttachRequest) -> Result<LaunchResult, GatewayError> {
        Ok(self
            .gateway
            .submit(|reply| Command::Attach(request, reply))?
            .wait())
    }

    pub fn continue_execution(&self) -> Result<ExecutionResult, GatewayError> {
        Ok(self.gateway.submit(Command::Continue)?.wait())
    }

    pub fn step(&self, step: Step, thread: Option<u32>) -> Result<ExecutionResult, GatewayError> {
        Ok(self
            .gateway
            .submit(|reply| Command::Step {
                step,
                thread,
                reply,
            })?
            .wait())
    }

    pub fn pause(&self) -> Result<ExecutionResult, GatewayError> {
        Ok(self.gateway.pause()?.wait())
    }

    pub fn terminate(&self) -> Result<ExecutionResult, GatewayError> {
        Ok(self.gateway.terminate()?.wait())
    }

    /// Replace breakpoints of `file`.
    pub fn set_breakpoints(
        &self,
        file: &str,
        lines: Vec<u32>,
    ) -> Result<Vec<BreakpointResult>, GatewayError> {
        Ok(self
            .gateway
            .submit(|reply| Command::SetBreakpoints {
                file: file.to_string(),
                lines,
                reply,
            })?
            .wait())
    }

    pub fn threads(&self) -> Result<Vec<Thread>, GatewayError> {
        Ok(self.gateway.submit(Command::Threads)?.wait())
    }

    pub fn stack_trace(&self, thread: u32) -> Result<Vec<Frame>, GatewayError> {
        Ok(self
            .gateway
            .submit(|reply| Command::StackTrace { thread, reply })?
            .wait())
    }

    pub fn scopes(&self, frame: Handle) -> Result<Vec<Scope>, GatewayError> {
        Ok(self
            .gateway
            .submit(|reply| Command::Scopes { frame, reply })?
            .wait())
    }

    /// Variables of a scope or children of a variable.
    pub fn variables(&self, reference: Handle) -> Result<Vec<Variable>, GatewayError> {
        Ok(self
            .gateway
            .submit(|reply| Command::Variables { reference, reply })?
            .wait())
    }

    pub fn set_variable(
        &self,
        reference: Handle,
        name: &str,
        value: &str,
    ) -> Result<SetVariableResult, GatewayError> {
        Ok(self
            .gateway
            .submit(|reply| Command::SetVariable {
                reference,
                name: name.to_string(),
                value: value.to_string(),
                reply,
            })?
            .wait())
    }

    pub fn evaluate(
        &self,
        expression: &str,
        frame: Option<Handle>,
    ) -> Result<EvaluateResult, GatewayError> {
        Ok(self
            .gateway
            .submit(|reply| Command::Evaluate {
                expression: expression.to_string(),
                frame,
                reply,
            })?
            .wait())
    }

    pub fn process_info(&self) -> Result<Option<ProcessInfo>, GatewayError> {
        Ok(self.gateway.submit(Command::ProcessInfo)?.wait())
    }

    pub fn dispose(&self) {
        self.gateway.dispose();
    }
}
