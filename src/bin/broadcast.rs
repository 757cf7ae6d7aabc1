// Command broadcaster: sends turn-and-burst frames the way the control server does
//
// Usage: cargo run --bin broadcast -- -c 1:45,80 -c 2:-30,120
//        cargo run --bin broadcast -- --target 127.0.0.1:8080 -c 1:90,60 --repeat 3

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use tokio::net::UdpSocket;
use tracing::info;

use pathfinder_runtime::config::DEFAULT_RX_PORT;
use pathfinder_runtime::parser::encode_frame;
use pathfinder_runtime::{Command, RobotId};

#[derive(Debug, Parser)]
#[command(name = "broadcast", version)]
struct Args {
    /// Destination (broadcast) address
    #[arg(long, default_value_t = SocketAddr::from(([255, 255, 255, 255], DEFAULT_RX_PORT)))]
    target: SocketAddr,

    /// Robot command as ID:ANGLE,VELOCITY (repeatable)
    #[arg(short, long = "command", value_parser = parse_robot_command, required = true)]
    commands: Vec<(RobotId, Command)>,

    /// Number of times to send the frame
    #[arg(long, default_value_t = 1)]
    repeat: u32,

    /// Pause between repeats
    #[arg(long, default_value_t = 1000)]
    interval_ms: u64,
}

fn parse_robot_command(text: &str) -> Result<(RobotId, Command), String> {
    let (id, fields) = text
        .split_once(':')
        .ok_or_else(|| format!("expected ID:ANGLE,VELOCITY, got {text:?}"))?;
    let (angle, velocity) = fields
        .split_once(',')
        .ok_or_else(|| format!("expected ANGLE,VELOCITY, got {fields:?}"))?;

    let id = id.trim().parse::<u32>().map_err(|e| format!("bad id: {e}"))?;
    let angle = angle.trim().parse::<f32>().map_err(|e| format!("bad angle: {e}"))?;
    let velocity = velocity
        .trim()
        .parse::<f32>()
        .map_err(|e| format!("bad velocity: {e}"))?;

    Ok((RobotId(id), Command::new(angle, velocity)))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let args = Args::parse();
    let frame = encode_frame(&args.commands);

    let socket = UdpSocket::bind(SocketAddr::from(([0, 0, 0, 0], 0))).await?;
    socket.set_broadcast(true)?;

    for i in 0..args.repeat {
        if i > 0 {
            tokio::time::sleep(Duration::from_millis(args.interval_ms)).await;
        }
        socket.send_to(frame.as_bytes(), args.target).await?;
        info!("Sent {} to {}", frame, args.target);
    }

    Ok(())
}
