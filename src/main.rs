//! dbgeng-dap - Debug Adapter Protocol server for native debugging engines.
//!
//! Talks to a client over stdio by default, or serves clients one by one over TCP when
//! `--port` or `--listen` is given.

use anyhow::Context;
use clap::Parser;
use dbgeng_dap::config::AdapterConfig;
use dbgeng_dap::dap::logger::DapLogger;
use dbgeng_dap::dap::tracer::LogFile;
use dbgeng_dap::dap::transport::{self, DapReader, DapWriter};
use dbgeng_dap::dap::{DebugSession, ServerOutput};
use dbgeng_dap::engine::{EngineProvider, NoNativeEngine};
use dbgeng_dap::log::LOGGER_SWITCHER;
use log::{info, warn, LevelFilter};
use std::net::{SocketAddr, TcpListener};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Serve clients over TCP on 127.0.0.1:<PORT> instead of stdio
    #[clap(short, long)]
    port: Option<u16>,

    /// Serve clients over TCP on this address instead of stdio
    #[clap(long, conflicts_with = "port")]
    listen: Option<String>,

    /// Exit after the first debug session ends (server mode only)
    #[clap(long)]
    oneshot: bool,

    /// Log verbosity: off, error, warn, info, debug or trace. RUST_LOG overrides it
    #[clap(short, long, default_value = "info", env = "DBGENG_DAP_VERBOSITY")]
    verbosity: LevelFilter,

    /// Write adapter logs into a file instead of stderr
    #[clap(long)]
    log_file: Option<PathBuf>,

    /// Trace DAP traffic (requests/responses/events) into the log file.
    /// Requires --log-file.
    #[clap(long)]
    trace_dap: bool,

    /// Send adapter logs to the client as console output
    #[clap(long)]
    client_log: bool,

    /// Adapter config file, ~/.config/dbgeng-dap/config.toml by default
    #[clap(long)]
    config: Option<PathBuf>,

    /// Working directory of the adapter
    #[clap(long)]
    current_directory: Option<PathBuf>,
}

impl Args {
    fn listen_addr(&self) -> Option<String> {
        self.listen
            .clone()
            .or_else(|| self.port.map(|port| format!("127.0.0.1:{port}")))
    }
}

struct Adapter {
    args: Args,
    log_file: Option<LogFile>,
    config: AdapterConfig,
    provider: Arc<dyn EngineProvider>,
}

impl Adapter {
    fn logger(&self) -> env_logger::Logger {
        let mut builder = env_logger::Builder::new();
        builder.filter_level(self.args.verbosity).parse_default_env();
        if let Some(file) = &self.log_file {
            builder.target(env_logger::Target::Pipe(Box::new(file.clone())));
        }
        builder.build()
    }

    fn install_logger(&self) {
        let logger = self.logger();
        let filter = logger.filter();
        LOGGER_SWITCHER.switch(logger, filter);
    }

    fn traffic_log(&self) -> Option<LogFile> {
        self.log_file.clone().filter(|_| self.args.trace_dap)
    }

    fn serve(
        &self,
        reader: impl DapReader,
        writer: impl DapWriter + 'static,
    ) -> anyhow::Result<()> {
        let output = Arc::new(ServerOutput::new(writer));
        if self.args.client_log {
            let logger = DapLogger::new(self.logger(), output.clone());
            let filter = logger.filter();
            LOGGER_SWITCHER.switch(logger, filter);
        }

        let result =
            DebugSession::new(reader, output, self.provider.clone(), self.config.clone()).run();

        if self.args.client_log {
            self.install_logger();
        }
        result
    }

    fn run_stdio(&self) -> anyhow::Result<()> {
        info!(target: "dap", "listen for a client on stdio");
        let (reader, writer) = transport::stdio(self.traffic_log());
        self.serve(reader, writer)
    }

    fn run_server(&self, addr: &str) -> anyhow::Result<()> {
        let addr: SocketAddr = addr.parse().context("Invalid listen address")?;
        let listener = TcpListener::bind(addr).with_context(|| format!("bind {addr}"))?;
        info!(target: "dap", "listening on {addr}");

        // one client at a time, each connection is a separate debug session
        for incoming in listener.incoming() {
            let stream = match incoming {
                Ok(stream) => stream,
                Err(err) => {
                    warn!(target: "dap", "client connection rejected: {err:#}");
                    continue;
                }
            };
            let peer = stream
                .peer_addr()
                .map(|addr| addr.to_string())
                .unwrap_or_else(|_| "unknown peer".to_string());
            info!(target: "dap", "client {peer} connected");

            let outcome = transport::tcp(stream, self.traffic_log())
                .and_then(|(reader, writer)| self.serve(reader, writer));
            match outcome {
                Ok(()) => info!(target: "dap", "client {peer} disconnected"),
                Err(err) => warn!(target: "dap", "client {peer}: {err:#}"),
            }

            if self.args.oneshot {
                break;
            }
        }
        Ok(())
    }
}

fn main() -> anyhow::Result<()> {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            let _ = err.print();
            std::process::exit(if err.use_stderr() { 1 } else { 0 });
        }
    };

    let log_file = args.log_file.as_deref().map(LogFile::open).transpose()?;
    let mut adapter = Adapter {
        args,
        log_file,
        config: AdapterConfig::default(),
        provider: Arc::new(NoNativeEngine),
    };
    adapter.install_logger();
    if adapter.args.trace_dap && adapter.log_file.is_none() {
        warn!(target: "dap", "--trace-dap requires --log-file; tracing disabled");
    }

    if let Some(dir) = adapter.args.current_directory.as_deref().filter(|dir| dir.is_dir()) {
        std::env::set_current_dir(dir)
            .with_context(|| format!("change directory to {}", dir.display()))?;
    }
    adapter.config = AdapterConfig::load(adapter.args.config.as_deref());

    match adapter.args.listen_addr() {
        Some(addr) => adapter.run_server(&addr),
        None => adapter.run_stdio(),
    }
}
