//! Engine gateway.
//!
//! The native engine may be called from one thread only. [`EngineGateway`] owns that thread: it
//! creates the engine there, accepts [`Command`]s from any other thread through a FIFO queue and
//! publishes [`GatewayEvent`]s to subscribers. Between commands the engine thread blocks in the
//! native wait while the debuggee runs.

pub mod breakpoint;
pub mod command;
mod worker;

pub use breakpoint::{Breakpoint, BreakpointResult, BreakpointTable};
pub use command::{
    AttachRequest, Command, EvaluateResult, ExecutionResult, LaunchRequest, LaunchResult,
    Pending, PendingError, ProcessInfo, Reply, SetVariableResult, Step,
};

use crate::engine::guard::EngineSession;
use crate::engine::provider::{EngineOptions, EngineProvider};
use crate::engine::{Engine, EngineError, EngineResult, EngineSettings, Interrupt};
use crate::weak_error;
use log::{debug, error, warn};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;
use worker::Worker;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(3 * 60);
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_IDLE_POLL: Duration = Duration::from_millis(100);
pub const DEFAULT_MAX_FRAMES: usize = 1000;

/// Debug event raised on the engine thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayEvent {
    BreakpointHit {
        breakpoint: Breakpoint,
        thread: u32,
    },
    ExceptionHit {
        code: u32,
        first_chance: bool,
        thread: u32,
    },
    BreakHit {
        thread: u32,
    },
    StepCompleted {
        thread: u32,
    },
    ThreadStarted {
        thread: u32,
    },
    ThreadExited {
        thread: u32,
    },
    ProcessExited {
        exit_code: u32,
    },
    Output {
        text: String,
    },
    Terminated,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("engine gateway doesn't accept commands anymore")]
    Closed,
    #[error("engine initialization failed: {0}")]
    Init(EngineError),
    #[error("engine thread did not start in time")]
    StartTimeout,
    #[error("start engine thread: {0}")]
    Spawn(String),
}

#[derive(Debug, Clone)]
pub struct GatewayOptions {
    /// Time a caller waits for a command result.
    pub request_timeout: Duration,
    /// Time [`EngineGateway::dispose`] waits for the engine thread.
    pub join_timeout: Duration,
    /// Queue poll interval while the debuggee is stopped.
    pub idle_poll: Duration,
    pub max_frames: usize,
    pub settings: EngineSettings,
    /// Source paths added to the paths of each launch request.
    pub source_paths: Vec<String>,
    /// Symbol paths added to the paths of each launch request.
    pub symbol_paths: Vec<String>,
    /// Sources of the rust standard library.
    pub std_lib_path: Option<PathBuf>,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            join_timeout: DEFAULT_JOIN_TIMEOUT,
            idle_poll: DEFAULT_IDLE_POLL,
            max_frames: DEFAULT_MAX_FRAMES,
            settings: EngineSettings::default(),
            source_paths: vec![],
            symbol_paths: vec![],
            std_lib_path: None,
        }
    }
}

pub(crate) type Subscribers = Arc<Mutex<Vec<mpsc::Sender<GatewayEvent>>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct EngineGateway {
    /// `None` once the gateway stops accepting commands.
    queue: Mutex<Option<mpsc::Sender<Command>>>,
    interrupter: Arc<dyn Interrupt>,
    subscribers: Subscribers,
    cancel: Arc<AtomicBool>,
    finished: Mutex<Option<mpsc::Receiver<()>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
    disposed: AtomicBool,
    options: GatewayOptions,
}

impl EngineGateway {
    /// Start the engine thread with an engine from `provider`.
    pub fn spawn(
        provider: Arc<dyn EngineProvider>,
        engine_options: EngineOptions,
        options: GatewayOptions,
    ) -> Result<Self, GatewayError> {
        Self::spawn_with(move || provider.create(&engine_options), options)
    }

    /// Start the engine thread, `factory` is called on it.
    pub fn spawn_with<F>(factory: F, options: GatewayOptions) -> Result<Self, GatewayError>
    where
        F: FnOnce() -> EngineResult<Box<dyn Engine>> + Send + 'static,
    {
        let (command_tx, command_rx) = mpsc::channel();
        let (init_tx, init_rx) = mpsc::sync_channel(1);
        let (finished_tx, finished_rx) = mpsc::sync_channel(1);
        let subscribers: Subscribers = Arc::default();
        let cancel = Arc::new(AtomicBool::new(false));

        let thread = std::thread::Builder::new()
            .name("engine".to_string())
            .spawn({
                let subscribers = subscribers.clone();
                let cancel = cancel.clone();
                let options = options.clone();
                move || {
                    let engine = match factory() {
                        Ok(engine) => engine,
                        Err(e) => {
                            let _ = init_tx.send(Err(e));
                            return;
                        }
                    };
                    let _ = init_tx.send(Ok(engine.interrupter()));

                    Worker::new(
                        EngineSession::new(engine),
                        command_rx,
                        subscribers,
                        cancel,
                        options,
                    )
                    .run();

                    let _ = finished_tx.send(());
                    debug!(target: "gateway", "engine thread finished");
                }
            })
            .map_err(|e| GatewayError::Spawn(e.to_string()))?;

        let interrupter = match init_rx.recv_timeout(options.request_timeout) {
            Ok(Ok(interrupter)) => interrupter,
            Ok(Err(e)) => {
                if thread.join().is_err() {
                    error!(target: "gateway", "engine thread panicked");
                }
                return Err(GatewayError::Init(e));
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                cancel.store(true, Ordering::SeqCst);
                return Err(GatewayError::StartTimeout);
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                return Err(GatewayError::Spawn(
                    "engine thread exited during start".to_string(),
                ));
            }
        };

        Ok(Self {
            queue: Mutex::new(Some(command_tx)),
            interrupter,
            subscribers,
            cancel,
            finished: Mutex::new(Some(finished_rx)),
            thread: Mutex::new(Some(thread)),
            disposed: AtomicBool::new(false),
            options,
        })
    }

    pub fn options(&self) -> &GatewayOptions {
        &self.options
    }

    pub fn is_accepting(&self) -> bool {
        lock(&self.queue).is_some()
    }

    fn enqueue(&self, command: Command) -> Result<(), GatewayError> {
        let mut queue = lock(&self.queue);
        let sender = queue.as_ref().ok_or(GatewayError::Closed)?;
        let terminate = matches!(command, Command::Terminate(_));
        sender.send(command).map_err(|_| GatewayError::Closed)?;
        if terminate {
            *queue = None;
        }
        Ok(())
    }

    /// Enqueue a command, the result is delivered through returned [`Pending`].
    pub fn submit<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<Pending<T>, GatewayError> {
        let (reply, receiver) = Reply::channel();
        let command = make(reply);
        let name = command.name();
        self.enqueue(command)?;
        Ok(Pending::new(receiver, self.options.request_timeout, name))
    }

    /// Enqueue a command, its result is discarded.
    pub fn submit_no_result<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<(), GatewayError> {
        self.submit(make).map(drop)
    }

    /// Force a blocking engine wait to return.
    pub fn interrupt(&self) {
        weak_error!(self.interrupter.interrupt(), "interrupt engine:");
    }

    pub fn pause(&self) -> Result<Pending<ExecutionResult>, GatewayError> {
        let pending = self.submit(Command::Pause)?;
        self.interrupt();
        Ok(pending)
    }

    /// End the debug session. Gateway stops accepting commands.
    pub fn terminate(&self) -> Result<Pending<ExecutionResult>, GatewayError> {
        let pending = self.submit(Command::Terminate)?;
        self.interrupt();
        Ok(pending)
    }

    /// Register event subscriber. Subscriber is removed when its receiver is dropped.
    pub fn subscribe(&self) -> mpsc::Receiver<GatewayEvent> {
        let (sender, receiver) = mpsc::channel();
        lock(&self.subscribers).push(sender);
        receiver
    }

    /// Terminate the session, stop the engine thread and remove all subscribers.
    ///
    /// The engine is released on the engine thread. Next calls are no-op.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(queue) = lock(&self.queue).take() {
            let (reply, _) = Reply::channel();
            let _ = queue.send(Command::Terminate(reply));
        }
        self.cancel.store(true, Ordering::SeqCst);
        self.interrupt();

        let finished = lock(&self.finished).take();
        let stopped = match finished {
            Some(finished) => !matches!(
                finished.recv_timeout(self.options.join_timeout),
                Err(mpsc::RecvTimeoutError::Timeout)
            ),
            None => true,
        };
        if stopped {
            if let Some(thread) = lock(&self.thread).take() {
                if thread.join().is_err() {
                    error!(target: "gateway", "engine thread panicked");
                }
            }
        } else {
            warn!(target: "gateway", "engine thread did not stop in {:?}, detached", self.options.join_timeout);
        }

        lock(&self.subscribers).clear();
        debug!(target: "gateway", "gateway disposed");
    }
}

impl Drop for EngineGateway {
    fn drop(&mut self) {
        self.dispose();
    }
}
