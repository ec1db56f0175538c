//! Synthetic frame producer speaking the bridge's producer contract.
//!
//! Stands in for the emulated capture process: binds the endpoint, renders a
//! moving gradient and pushes it through the same lossy sender.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use aria_bridge::capture::{FrameEmitter, Image};
use aria_bridge::protocol::{CameraChannel, ProtocolVersion};
use aria_bridge::transport::{self, Endpoint};
use clap::Parser;
use color_eyre::{eyre::bail, Result};
use tokio::time::MissedTickBehavior;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "mock-producer")]
#[command(about = "Emit synthetic camera frames over the bridge transport")]
struct Args {
    #[arg(long, default_value = "usb", value_parser = ["usb", "wifi"])]
    interface: String,

    /// Device address, required with --interface wifi
    #[arg(long)]
    device_ip: Option<String>,

    #[arg(long = "zmq-endpoint", alias = "endpoint", default_value = aria_bridge::transport::DEFAULT_ENDPOINT)]
    endpoint: Endpoint,

    #[arg(long, default_value = aria_bridge::PROFILE_STREAMING)]
    profile: String,

    #[arg(long, default_value_t = 30, value_parser = clap::value_parser!(u32).range(1..=1000))]
    fps: u32,

    #[arg(long, default_value_t = 1408)]
    width: u32,

    #[arg(long, default_value_t = 1408)]
    height: u32,

    #[arg(long, default_value = "rgb")]
    camera: CameraChannel,

    /// Stop after this many frames
    #[arg(long)]
    frames: Option<u64>,

    /// Send v1 (`ARIA`) headers
    #[arg(long)]
    legacy: bool,

    /// Outstanding messages before frames are dropped
    #[arg(long, default_value_t = 2)]
    depth: usize,

    /// Wait before exiting with --frames so queued messages get delivered
    #[arg(long, default_value_t = 500)]
    linger_ms: u64,
}

fn render(buf: &mut [u8], width: u32, tick: u64) {
    let shift = (tick % 256) as usize;
    let width = width as usize;
    for (i, px) in buf.chunks_exact_mut(3).enumerate() {
        let (row, col) = (i / width, i % width);
        px[0] = ((col + shift) % 256) as u8;
        px[1] = ((row + shift) % 256) as u8;
        px[2] = ((row + col) % 256) as u8;
    }
}

/// Resolves on SIGTERM, the way the bridge stops its producer.
#[cfg(unix)]
async fn terminated() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    signal(SignalKind::terminate())?.recv().await;
    Ok(())
}

#[cfg(not(unix))]
async fn terminated() -> std::io::Result<()> {
    std::future::pending().await
}

fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default()
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "aria_bridge=info,mock_producer=info".into()),
        )
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();

    let args = Args::parse();
    if args.interface == "wifi" && args.device_ip.is_none() {
        bail!("--device-ip is required with --interface wifi");
    }
    if args.width == 0 || args.height == 0 {
        bail!("--width and --height must be positive");
    }

    let sender = transport::bind(&args.endpoint, args.depth)?;
    info!(
        endpoint = %args.endpoint,
        bound = %sender.endpoint(),
        interface = %args.interface,
        profile = %args.profile,
        camera = %args.camera,
        "mock producer streaming"
    );

    let version = if args.legacy {
        ProtocolVersion::V1
    } else {
        ProtocolVersion::V2
    };
    let mut emitter = FrameEmitter::new(sender).with_version(version);

    let term = terminated();
    tokio::pin!(term);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut ticker = tokio::time::interval(Duration::from_secs(1) / args.fps);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut pixels = vec![0u8; args.width as usize * args.height as usize * 3];
    let mut tick = 0u64;

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("interrupted");
                break;
            }
            result = &mut term => {
                result?;
                info!("terminated");
                break;
            }
            _ = ticker.tick() => {
                render(&mut pixels, args.width, tick);
                let image = Image::new(args.width, args.height, 3, &pixels)?;
                emitter.emit(args.camera, now_ns(), &image)?;
                tick += 1;

                if args.frames.is_some_and(|n| tick >= n) {
                    tokio::time::sleep(Duration::from_millis(args.linger_ms)).await;
                    break;
                }
            }
        }
    }

    let (queued, dropped) = emitter.sink().stats();
    info!(sent = emitter.total_sent(), queued, dropped, "mock producer exiting");
    drop(emitter);
    Ok(())
}
