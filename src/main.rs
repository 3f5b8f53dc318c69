use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use joybridge::config::{self, BridgeConfig};
use joybridge::controller::device::{list_devices, NameMatcher};
use joybridge::controller::gamepad::{GamepadCollectorHandle, GamepadSettings};
use joybridge::Bridge;
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Streams joystick axis events to a remote listener over UDP
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Target host receiving the control datagrams
    #[arg(long, env = "JOYBRIDGE_HOST")]
    host: Option<String>,

    /// Target UDP port
    #[arg(short, long, env = "JOYBRIDGE_PORT")]
    port: Option<String>,

    /// Send interval in milliseconds
    #[arg(short, long)]
    interval_ms: Option<String>,

    /// TCP port accepting event lines
    #[arg(long)]
    ingest_port: Option<String>,

    /// Do not read a locally attached gamepad
    #[arg(long)]
    no_gamepad: bool,

    /// List input devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    setup(&args.log_level)?;

    if args.list_devices {
        print_devices();
        return Ok(());
    }

    let config = load_config(&args).await;
    debug!("Effective configuration: {:?}", config);

    let mut bridge = Bridge::new(&config);
    install_update_logger(&bridge);

    let report = bridge
        .start_ingest(config.ingest.port)
        .await
        .map_err(|e| eyre!("Failed to start ingest: {}", e))?;
    info!("{}", bridge.ingest_line());
    if !report.device_found() {
        info!(
            "Feed events with: getevent -l /dev/input/event4 | nc <this-host> {}",
            report.local_addr.port()
        );
    }

    let collector = if config.gamepad.enabled {
        let settings = GamepadSettings {
            joystick_deadzone: config.gamepad.deadzone,
        };
        let matcher = NameMatcher::new(&config.ingest.device_name_patterns);
        match GamepadCollectorHandle::spawn(settings, bridge.direct_adapter(), matcher) {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!("Gamepad input disabled: {}", e);
                None
            }
        }
    } else {
        None
    };

    bridge
        .start_send(config.target.clone())
        .await
        .map_err(|e| eyre!("Failed to start sender: {}", e))?;
    info!("{}", bridge.status_line());

    tokio::signal::ctrl_c().await?;
    info!("Interrupt received");

    bridge.shutdown().await;
    if let Some(collector) = collector {
        tokio::task::spawn_blocking(move || collector.shutdown()).await?;
    }

    let status = bridge.sender_status();
    info!(
        "Sent {} packets ({} send errors)",
        status.packets_sent, status.send_errors
    );
    Ok(())
}

fn setup(log_level: &str) -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    setup_logging_env(log_level)
}

fn setup_logging_env(log_level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .map_err(|e| eyre!("Invalid log level {}: {}", log_level, e))?;

    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
    Ok(())
}

async fn load_config(args: &Args) -> BridgeConfig {
    let mut config = match &args.config {
        Some(path) => BridgeConfig::load_or_default(path).await,
        None => match config::default_config_path() {
            Ok(path) => {
                if let Err(e) = config::ensure_default_config(&path).await {
                    warn!("Could not create default configuration: {}", e);
                }
                BridgeConfig::load_or_default(&path).await
            }
            Err(e) => {
                warn!("{}", e);
                BridgeConfig::default()
            }
        },
    };

    if let Some(host) = args.host.as_deref().map(str::trim).filter(|h| !h.is_empty()) {
        config.target.host = host.to_string();
    }
    if let Some(port) = &args.port {
        config.target.port = config::parse_port(port, config::DEFAULT_TARGET_PORT);
    }
    if let Some(interval) = &args.interval_ms {
        config.target.interval_ms = config::parse_interval_ms(interval);
    }
    if let Some(port) = &args.ingest_port {
        config.ingest.port = config::parse_port(port, config::DEFAULT_INGEST_PORT);
    }
    if args.no_gamepad {
        config.gamepad.enabled = false;
    }
    config
}

fn install_update_logger(bridge: &Bridge) {
    let count = AtomicU64::new(0);
    bridge.on_control_update(move |report| {
        let n = count.fetch_add(1, Ordering::Relaxed) + 1;
        if n % 100 == 0 {
            info!(
                "Joystick [{}] L({},{}) R({},{}) dials({},{})",
                n,
                report.left_stick_h,
                report.left_stick_v,
                report.right_stick_h,
                report.right_stick_v,
                report.left_dial,
                report.right_dial
            );
        }
    });
}

fn print_devices() {
    match list_devices() {
        Ok(devices) if devices.is_empty() => println!("No input devices found"),
        Ok(devices) => {
            for device in devices {
                println!(
                    "[{}] {} (connected={})",
                    device.id, device.name, device.connected
                );
            }
        }
        Err(e) => println!("Device enumeration unavailable: {}", e),
    }
}
