//! bridge-cli — entry point wiring config, transport, world model, RL codec
//! and the control loop into a running process.
//!
//! The agent itself is out of scope for this binary (the core does not
//! train or interpret policies); absent an external agent this defaults to
//! a halting agent, useful for exercising the wire protocol and the rest
//! of the pipeline without a real policy attached.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use bridge::{CommandScheduler, ControlLoop};
use config::BridgeConfig;
use rl::{DlCodec, DlCodecConfig, RlCodec};
use transport::{ClockConfig, ClockSync, LineTransport, TransportConfig};
use worldmodel::{AssemblerConfig, WorldModelAssembler};

#[derive(Parser)]
#[command(name = "bridge-cli", about = "Rover teleop/RL control bridge")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "config/bridge.toml")]
    config: PathBuf,

    /// Override the vehicle host from the config file.
    #[arg(long)]
    host: Option<String>,

    /// Override the vehicle port from the config file.
    #[arg(long)]
    port: Option<u16>,

    /// Use the single-axis RL codec dialect instead of the default
    /// discrete multi-tensor (DL) dialect.
    #[arg(long)]
    scalar_codec: bool,

    /// Directory for rotated log files.
    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,

    /// Log level for the `bridge_cli`/`bridge` targets.
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let _guard = init_logging(&args.log_dir, &args.log_level)?;

    let mut bridge_config = BridgeConfig::load(&args.config)?;
    if let Some(host) = args.host {
        bridge_config.host = host;
    }
    if let Some(port) = args.port {
        bridge_config.port = port;
    }

    info!(host = %bridge_config.host, port = bridge_config.port, "starting bridge");

    let transport_config = TransportConfig {
        host: bridge_config.host.clone(),
        port: bridge_config.port,
        connect_timeout: std::time::Duration::from_millis(bridge_config.connection_timeout_ms as u64),
        retry_interval: std::time::Duration::from_millis(bridge_config.retry_connection_interval_ms as u64),
        read_timeout: std::time::Duration::from_millis(bridge_config.read_timeout_ms as u64),
        ..TransportConfig::default()
    };
    let (mut transport, transport_handle) = LineTransport::connect(transport_config);
    let mut clock = ClockSync::new(ClockConfig::default());

    let assembler = WorldModelAssembler::new(AssemblerConfig {
        grid_size: bridge_config.scanner.grid_size,
        safe_distance: bridge_config.scanner.safe_distance,
        grid_width: bridge_config.scanner.grid_width,
        grid_height: bridge_config.scanner.grid_height,
        num_radar_sectors: bridge_config.num_radar_sectors,
        min_radar_distance: bridge_config.min_radar_distance,
        max_radar_distance: bridge_config.max_radar_distance,
        marker_hold: bridge_config.scanner.marker_hold_ms,
        insert_contact_obstacles: bridge_config.scanner.insert_contact_obstacles,
    });

    let codec_config = DlCodecConfig {
        num_directions: bridge_config.num_direction_values,
        num_speeds: bridge_config.num_speed_values,
        num_sensor_directions: bridge_config.num_sensor_values,
        marker_labels: bridge_config.marker_labels.clone(),
        max_radar_distance: bridge_config.max_radar_distance,
        max_pps: bridge_config.robot.max_pps,
        grid_width: bridge_config.scanner.grid_width,
        grid_height: bridge_config.scanner.grid_height,
    };

    let scheduler = CommandScheduler::new(
        0.1 * bridge_config.robot.max_pps,
        std::time::Duration::from_millis(bridge_config.command_interval_ms as u64),
        std::time::Duration::from_millis(bridge_config.scan_throttle_ms as u64),
    );

    let (results_tx, mut results_rx) = mpsc::channel(16);
    let (errors_tx, mut errors_rx) = mpsc::unbounded_channel();
    let (_markers_tx, markers_rx) = mpsc::unbounded_channel();

    let reaction_interval_ms = bridge_config.reaction_interval_ms;
    let clock_probe_interval = std::time::Duration::from_millis(bridge_config.interval_ms as u64);

    let observers = tokio::spawn(async move {
        loop {
            tokio::select! {
                Some(result) = results_rx.recv() => {
                    tracing::debug!(reward = result.reward, "cycle result");
                }
                Some(err) = errors_rx.recv() => {
                    warn!(%err, "bridge error");
                }
                else => break,
            }
        }
    });

    let num_directions = codec_config.num_directions;
    let num_speeds = codec_config.num_speeds;
    let max_pps = codec_config.max_pps;

    let run_handle = if args.scalar_codec {
        let halt_index = num_directions * num_speeds / 2;
        let agent = move |_: &std::collections::HashMap<String, rl::Tensor>| halting_actions(halt_index as f64, 0.0);
        let codec = RlCodec::new(codec_config);
        let control_loop = ControlLoop::new(assembler, codec, agent, scheduler);
        tokio::spawn(async move {
            control_loop
                .run(
                    &mut transport,
                    &mut clock,
                    results_tx,
                    errors_tx,
                    markers_rx,
                    reaction_interval_ms,
                    clock_probe_interval,
                )
                .await;
            transport
        })
    } else {
        let halt_move = rl::dl::encode_move(0.0, 0.0, num_directions, num_speeds, max_pps);
        let agent = move |_: &std::collections::HashMap<String, rl::Tensor>| halting_actions(halt_move as f64, 0.0);
        let codec = DlCodec::new(codec_config);
        let control_loop = ControlLoop::new(assembler, codec, agent, scheduler);
        tokio::spawn(async move {
            control_loop
                .run(
                    &mut transport,
                    &mut clock,
                    results_tx,
                    errors_tx,
                    markers_rx,
                    reaction_interval_ms,
                    clock_probe_interval,
                )
                .await;
            transport
        })
    };

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");

    run_handle.await?;
    transport_handle.abort();
    observers.await?;

    Ok(())
}

/// Builds the `{move, sensorAction}` tensors for a no-op agent that always
/// decodes to a halt, useful for exercising the wire protocol and the rest
/// of the pipeline without a real policy attached.
fn halting_actions(move_value: f64, sensor_value: f64) -> std::collections::HashMap<String, rl::Tensor> {
    let mut actions = std::collections::HashMap::new();
    actions.insert("move".to_string(), rl::Tensor::scalar(rl::Dtype::Int, move_value));
    actions.insert("sensorAction".to_string(), rl::Tensor::scalar(rl::Dtype::Int, sensor_value));
    actions
}

fn init_logging(log_dir: &std::path::Path, level: &str) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    std::fs::create_dir_all(log_dir)?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, log_dir, "bridge-cli.log");
    let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("bridge_cli={level},bridge={level},transport={level}")));

    let stdout_layer = tracing_subscriber::fmt::layer().with_target(true).with_thread_ids(false);
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false)
        .with_target(true);

    tracing_subscriber::registry().with(filter).with(stdout_layer).with(file_layer).init();

    Ok(guard)
}
