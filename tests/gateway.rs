mod common;

use common::{
    fake_provider, gateway_options, lock, program, wait_event, SharedScript, Stop, MAIN_RS,
};
use dbgeng_dap::api::DebuggerApi;
use dbgeng_dap::engine::{EngineOptions, NativeEvent, ScopeKind};
use dbgeng_dap::gateway::{
    Breakpoint, Command, EngineGateway, GatewayError, GatewayEvent, GatewayOptions,
    LaunchRequest, LaunchResult, Step,
};
use dbgeng_dap::state::Handle;
use std::sync::Arc;
use std::time::Duration;

fn start_with(options: GatewayOptions) -> (SharedScript, DebuggerApi) {
    let (script, provider) = fake_provider();
    let gateway = EngineGateway::spawn(provider, EngineOptions::default(), options).unwrap();
    (script, DebuggerApi::new(Arc::new(gateway)))
}

fn start() -> (SharedScript, DebuggerApi) {
    start_with(gateway_options())
}

fn launch(api: &DebuggerApi) {
    let request = LaunchRequest::new(&program(), &["--flag".to_string()], None).unwrap();
    match api.launch(request).unwrap() {
        LaunchResult::Started(info) => {
            assert_eq!(info.pid, 4242);
            assert_eq!(info.pointer_size, 8);
        }
        LaunchResult::Failed(e) => panic!("launch failed: {e}"),
    }
}

#[test]
fn test_launch() {
    let (script, api) = start();
    launch(&api);

    let process = api.process_info().unwrap().unwrap();
    assert_eq!(process.pid, 4242);

    let script = lock(&script);
    assert_eq!(script.command_lines.len(), 1);
    assert!(script.command_lines[0].ends_with("--flag"));
    assert!(script.settings.unwrap().source_level_stepping);
    let target_dir = std::path::Path::new(&program())
        .parent()
        .unwrap()
        .to_string_lossy()
        .into_owned();
    assert!(script.symbol_path.starts_with(&target_dir));
    assert_eq!(script.engine_threads.len(), 1);
}

#[test]
fn test_launch_failure() {
    let (script, api) = start();
    lock(&script).fail_create = true;

    let request = LaunchRequest::new(&program(), &[], None).unwrap();
    let LaunchResult::Failed(error) = api.launch(request).unwrap() else {
        panic!("launch must fail");
    };
    assert!(error.starts_with("Error creating process: 80004005"));
    assert!(api.process_info().unwrap().is_none());
}

#[test]
fn test_engine_init_failure() {
    let (script, provider) = fake_provider();
    lock(&script).fail_init = true;
    let result = EngineGateway::spawn(provider, EngineOptions::default(), gateway_options());
    assert!(matches!(result, Err(GatewayError::Init(_))));
}

#[test]
fn test_set_breakpoints() {
    let (script, api) = start();
    launch(&api);

    let result = api.set_breakpoints(MAIN_RS, vec![10, 9999999]).unwrap();
    assert_eq!(result.len(), 2);
    assert_eq!(result[0].breakpoint, Breakpoint::new(MAIN_RS, 10));
    assert!(result[0].verified);
    assert_eq!(result[1].breakpoint.line, 9999999);
    assert!(!result[1].verified);
    assert_eq!(lock(&script).breakpoints.len(), 1);

    // breakpoints of a file are replaced, not merged
    let result = api.set_breakpoints(MAIN_RS, vec![12]).unwrap();
    assert!(result[0].verified);
    assert_eq!(lock(&script).breakpoints.len(), 1);

    let result = api.set_breakpoints(MAIN_RS, vec![]).unwrap();
    assert!(result.is_empty());
    assert!(lock(&script).breakpoints.is_empty());
}

#[test]
fn test_breakpoint_hit() {
    let (script, api) = start();
    let events = api.subscribe();
    launch(&api);
    api.set_breakpoints(MAIN_RS, vec![10]).unwrap();

    {
        let mut script = lock(&script);
        script.threads.push(2);
        script.stops.push_back(Stop::BreakpointAt(common::MAIN_LINE_OFFSET));
    }
    assert!(api.continue_execution().unwrap().is_ok());

    let hit = wait_event(&events, |e| matches!(e, GatewayEvent::BreakpointHit { .. }));
    assert_eq!(
        hit,
        GatewayEvent::BreakpointHit {
            breakpoint: Breakpoint::new(MAIN_RS, 10),
            thread: 1
        }
    );
    let started = wait_event(&events, |e| matches!(e, GatewayEvent::ThreadStarted { .. }));
    assert_eq!(started, GatewayEvent::ThreadStarted { thread: 2 });

    let threads = api.threads().unwrap();
    assert_eq!(threads.len(), 2);
    assert_eq!(threads[1].name, "Thread #2");
}

#[test]
fn test_step_and_exception_events() {
    let (script, api) = start();
    let events = api.subscribe();
    launch(&api);

    lock(&script).stops.push_back(Stop::Events(vec![]));
    assert!(api.step(Step::Over, Some(1)).unwrap().is_ok());
    let event = wait_event(&events, |e| matches!(e, GatewayEvent::StepCompleted { .. }));
    assert_eq!(event, GatewayEvent::StepCompleted { thread: 1 });

    lock(&script).stops.push_back(Stop::Events(vec![
        NativeEvent::Output {
            text: "hello\n".to_string(),
        },
        NativeEvent::Exception {
            code: 0xC000_0005,
            first_chance: true,
        },
    ]));
    assert!(api.step(Step::Out, None).unwrap().is_ok());
    let output = wait_event(&events, |e| matches!(e, GatewayEvent::Output { .. }));
    assert_eq!(
        output,
        GatewayEvent::Output {
            text: "hello\n".to_string()
        }
    );
    let exception = wait_event(&events, |e| matches!(e, GatewayEvent::ExceptionHit { .. }));
    assert_eq!(
        exception,
        GatewayEvent::ExceptionHit {
            code: 0xC000_0005,
            first_chance: true,
            thread: 1
        }
    );

    let result = api.step(Step::Into, Some(77)).unwrap();
    assert!(result.error.unwrap().starts_with("Could not select thread 77"));
}

#[test]
fn test_inspection() {
    let (_script, api) = start();
    launch(&api);

    let frames = api.stack_trace(1).unwrap();
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].function, "app!app::main");
    assert_eq!(frames[0].file.as_deref(), Some(MAIN_RS));
    assert_eq!(frames[0].line, 10);
    assert_eq!(frames[1].file, None);
    assert_eq!(frames[1].line, 0);
    assert_eq!(frames[1].function, "0x7ff00000");

    // repeated request reuses the same entities
    let again = api.stack_trace(1).unwrap();
    assert_eq!(again[0].handle, frames[0].handle);

    let scopes = api.scopes(frames[0].handle).unwrap();
    assert_eq!(scopes.len(), 2);
    assert_eq!(scopes[0].kind, ScopeKind::Locals);
    assert_eq!(scopes[1].kind, ScopeKind::Arguments);

    let locals = api.variables(scopes[0].handle).unwrap();
    assert_eq!(locals.len(), 2);
    assert_eq!(locals[0].name, "x");
    assert_eq!(locals[0].type_name, "i32");
    assert_eq!(locals[0].value, "5");
    assert_eq!(locals[0].reference(), Handle::NONE);
    assert_eq!(locals[1].name, "p");
    assert_eq!(locals[1].type_name, "app::Point");
    assert!(locals[1].has_children);

    let fields = api.variables(locals[1].reference()).unwrap();
    let fields: Vec<(&str, &str)> = fields
        .iter()
        .map(|v| (v.name.as_str(), v.value.as_str()))
        .collect();
    assert_eq!(fields, vec![("x", "1"), ("y", "2")]);

    let arguments = api.variables(scopes[1].handle).unwrap();
    assert_eq!(arguments.len(), 1);
    assert_eq!(arguments[0].name, "argc");
    assert_eq!(arguments[0].value, "1");

    assert!(api.variables(Handle::from_raw(100_000)).unwrap().is_empty());
    assert!(api.scopes(Handle::from_raw(100_000)).unwrap().is_empty());
}

#[test]
fn test_symbol_group_reused() {
    let (script, api) = start();
    launch(&api);

    let frames = api.stack_trace(1).unwrap();
    let scopes = api.scopes(frames[0].handle).unwrap();
    let first = api.variables(scopes[0].handle).unwrap();
    let second = api.variables(scopes[0].handle).unwrap();
    assert_eq!(first[0].handle, second[0].handle);
    assert_eq!(lock(&script).groups_created, 2);
}

#[test]
fn test_symbol_groups_released_before_engine() {
    let (script, api) = start();
    launch(&api);

    let frames = api.stack_trace(1).unwrap();
    for scope in api.scopes(frames[0].handle).unwrap() {
        api.variables(scope.handle).unwrap();
    }
    assert!(lock(&script).released.is_empty());

    api.dispose();
    let script = lock(&script);
    assert_eq!(script.released.last(), Some(&"engine"));
    assert_eq!(
        script.released.iter().filter(|r| **r == "symbol group").count() as u32,
        script.groups_created
    );
    assert_eq!(script.released.iter().filter(|r| **r == "engine").count(), 1);
}

#[test]
fn test_stale_handles_after_continue() {
    let (script, api) = start();
    let events = api.subscribe();
    launch(&api);

    let frames = api.stack_trace(1).unwrap();
    let scopes = api.scopes(frames[0].handle).unwrap();
    assert!(!api.variables(scopes[0].handle).unwrap().is_empty());

    lock(&script)
        .stops
        .push_back(Stop::Events(vec![NativeEvent::Break]));
    assert!(api.continue_execution().unwrap().is_ok());
    wait_event(&events, |e| matches!(e, GatewayEvent::BreakHit { .. }));

    assert!(api.scopes(frames[0].handle).unwrap().is_empty());
    assert!(api.variables(scopes[0].handle).unwrap().is_empty());
    assert_eq!(api.stack_trace(1).unwrap().len(), 2);
}

#[test]
fn test_set_variable() {
    let (_script, api) = start();
    launch(&api);

    let frames = api.stack_trace(1).unwrap();
    let scopes = api.scopes(frames[0].handle).unwrap();
    api.variables(scopes[0].handle).unwrap();

    let result = api.set_variable(scopes[0].handle, "x", "7").unwrap();
    assert_eq!(result.error, None);
    assert_eq!(result.variable.unwrap().value, "7");
    let locals = api.variables(scopes[0].handle).unwrap();
    assert_eq!(locals[0].value, "7");

    let result = api.set_variable(scopes[0].handle, "z", "7").unwrap();
    assert_eq!(result.error.as_deref(), Some("variable `z` not found"));

    let result = api.set_variable(scopes[0].handle, "x", "abc").unwrap();
    assert_eq!(result.error.as_deref(), Some("unable to evaluate `abc`"));
}

#[test]
fn test_evaluate() {
    let (_script, api) = start();
    launch(&api);

    let frames = api.stack_trace(1).unwrap();
    api.scopes(frames[0].handle).unwrap();

    let result = api.evaluate("p", Some(frames[0].handle)).unwrap();
    assert_eq!(result.error, None);
    assert_eq!(result.type_name, "app::Point");
    assert!(!result.reference.is_none());
    let children = api.variables(result.reference).unwrap();
    assert_eq!(children.len(), 2);

    let result = api.evaluate("no_such_symbol", None).unwrap();
    assert_eq!(
        result.error.as_deref(),
        Some("unable to evaluate `no_such_symbol`")
    );
}

#[test]
fn test_process_exit() {
    let (script, api) = start();
    let events = api.subscribe();
    launch(&api);

    lock(&script)
        .stops
        .push_back(Stop::Events(vec![NativeEvent::ProcessExited { exit_code: 3 }]));
    assert!(api.continue_execution().unwrap().is_ok());

    let exited = wait_event(&events, |e| matches!(e, GatewayEvent::ProcessExited { .. }));
    assert_eq!(exited, GatewayEvent::ProcessExited { exit_code: 3 });
    let thread = wait_event(&events, |e| matches!(e, GatewayEvent::ThreadExited { .. }));
    assert_eq!(thread, GatewayEvent::ThreadExited { thread: 1 });

    // continue after exit reports an error instead of hanging
    assert!(!api.continue_execution().unwrap().is_ok());
}

#[test]
fn test_pause() {
    let (_script, api) = start();
    let events = api.subscribe();
    launch(&api);

    assert!(api.continue_execution().unwrap().is_ok());
    assert!(api.pause().unwrap().is_ok());
    let event = wait_event(&events, |e| matches!(e, GatewayEvent::BreakHit { .. }));
    assert_eq!(event, GatewayEvent::BreakHit { thread: 1 });
}

#[test]
fn test_terminate() {
    let (script, api) = start();
    let events = api.subscribe();
    launch(&api);
    assert!(api.continue_execution().unwrap().is_ok());

    assert!(api.terminate().unwrap().is_ok());
    wait_event(&events, |e| *e == GatewayEvent::Terminated);
    assert!(lock(&script).ended);

    assert_eq!(api.threads().unwrap_err(), GatewayError::Closed);
    api.dispose();
    api.dispose();
    assert_eq!(api.continue_execution().unwrap_err(), GatewayError::Closed);
}

#[test]
fn test_dispose_while_running() {
    let (script, api) = start();
    launch(&api);
    assert!(api.continue_execution().unwrap().is_ok());

    api.dispose();
    assert!(lock(&script).ended);
    assert!(!api.gateway().is_accepting());
    assert_eq!(api.pause().unwrap_err(), GatewayError::Closed);
}

#[test]
fn test_request_timeout() {
    let (script, api) = start();
    lock(&script).create_delay = Some(Duration::from_millis(500));

    let request = LaunchRequest::new(&program(), &[], None).unwrap();
    let result = api
        .gateway()
        .submit(|reply| Command::Launch(request, reply))
        .unwrap()
        .with_timeout(Duration::from_millis(50))
        .wait();
    assert_eq!(result, LaunchResult::default());

    // engine thread is still responsive after the late result is dropped
    assert_eq!(api.threads().unwrap().len(), 1);
    api.dispose();
}

#[test]
fn test_commands_from_many_threads() {
    let (script, api) = start();
    launch(&api);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let api = api.clone();
            std::thread::spawn(move || api.threads().unwrap().len())
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap(), 1);
    }
    assert_eq!(lock(&script).engine_threads.len(), 1);
}
