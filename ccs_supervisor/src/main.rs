//! # CCS Supervisor Binary
//!
//! Ship cooling-control supervisor: loads and validates the configuration,
//! selects the telemetry transport, and runs the two-second control loop
//! until a shutdown signal arrives. Exits 0 after the final safe command,
//! 2 on configuration errors, 1 on fatal transport errors.
//!
//! # Usage
//!
//! ```bash
//! # Run against the live PLC
//! ccs_supervisor --config /etc/ccs/supervisor.toml
//!
//! # Run on the deterministic physics simulator
//! ccs_supervisor --config config/supervisor.toml --simulate
//!
//! # Verbose JSON logs
//! ccs_supervisor -c config/supervisor.toml -s -v --json
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use ccs_common::config::{SupervisorConfig, TransportBackend};
use ccs_common::error::SupervisorError;
use ccs_control::api::ModeSwitch;
use ccs_control::config::load_config;
use ccs_control::events::EventSink;
use ccs_control::predictor::spawn_loader;
use ccs_control::scheduler::TickRunner;
use ccs_control::store::{ControlSnapshot, new_store};
use ccs_plc::adapter::FrameTransport;
use ccs_plc::live::ModbusTransport;
use ccs_plc::{PlcAdapter, SimTransport};

/// CCS Supervisor - closed-loop cooling control for the engine room
#[derive(Parser, Debug)]
#[command(name = "ccs_supervisor")]
#[command(author = "RTS007")]
#[command(version)]
#[command(about = "Ship cooling-control supervisor")]
#[command(long_about = None)]
struct Args {
    /// Path to the supervisor configuration file
    #[arg(short, long, default_value = "/etc/ccs/supervisor.toml")]
    config: PathBuf,

    /// Force the simulation transport (ignores the configured back-end)
    #[arg(short = 's', long)]
    simulate: bool,

    /// Run on built-in defaults instead of a configuration file
    /// (simulation only, for commissioning)
    #[arg(long)]
    default_config: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,
}

fn main() {
    let args = Args::parse();
    setup_tracing(&args);

    if let Err(e) = run(&args) {
        error!("supervisor startup failed: {e}");
        let code = match e {
            SupervisorError::Config(_) => 2,
            SupervisorError::Transport(_) => 1,
        };
        std::process::exit(code);
    }
}

fn setup_tracing(args: &Args) {
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    if args.json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn run(args: &Args) -> Result<(), SupervisorError> {
    info!("CCS Supervisor v{} starting...", env!("CARGO_PKG_VERSION"));

    // ── Configuration ──
    let mut cfg: SupervisorConfig = if args.default_config {
        SupervisorConfig::simulation_default()
    } else {
        load_config(&args.config).map_err(|e| SupervisorError::Config(e.to_string()))?
    };
    if args.simulate {
        info!("simulation transport forced from the command line");
        cfg.transport.backend = TransportBackend::Simulation;
    }

    // ── Transport & adapter ──
    let transport: Box<dyn FrameTransport> = match cfg.transport.backend {
        TransportBackend::Simulation => {
            let (transport, _handle) = SimTransport::new(cfg.scheduler.tick_period_s());
            Box::new(transport)
        }
        TransportBackend::Modbus => {
            let address = cfg
                .transport
                .address
                .as_deref()
                .expect("validated: modbus requires an address");
            info!(address, unit_id = cfg.transport.unit_id, "connecting to PLC");
            Box::new(ModbusTransport::connect(address, cfg.transport.unit_id)?)
        }
    };
    let adapter = PlcAdapter::new(
        transport,
        Duration::from_millis(cfg.scheduler.read_deadline_ms),
        Duration::from_millis(cfg.scheduler.write_deadline_ms),
    );

    // ── Store, events, operator surface ──
    let (writer, _reader) = new_store(ControlSnapshot::initial(
        &cfg.envelopes(),
        cfg.scheduler.window_capacity,
    ));
    let sink = EventSink::new(cfg.events.queue_capacity);
    let drain = sink.spawn_drain(cfg.events.log_path.clone());
    let mode = ModeSwitch::new(Default::default());

    // ── Shutdown signal ──
    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = Arc::clone(&shutdown);
        ctrlc::set_handler(move || {
            info!("shutdown signal received");
            shutdown.store(true, Ordering::Release);
        })
        .map_err(|e| SupervisorError::Config(format!("signal handler: {e}")))?;
    }

    // ── Control loop ──
    let artefact = cfg.predictor.artefact_path.clone();
    let mut runner = TickRunner::new(cfg, adapter, writer, sink.clone(), mode, shutdown);
    if let Some(path) = artefact {
        runner.attach_loader(spawn_loader(path));
    } else {
        info!("no prediction artefact configured, null predictor in force");
    }

    runner.run();

    // ── Teardown ──
    sink.shutdown();
    let _ = drain.join();
    info!("CCS Supervisor shutdown complete");
    Ok(())
}
