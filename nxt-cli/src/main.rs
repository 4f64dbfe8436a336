mod drive;
mod transport;

use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use nxt_lib::{Brick, OutputPort, SensorEvent, SensorKind, SensorPort};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use drive::DriveContext;
use transport::SerialTransport;

/// Talk to a LEGO Mindstorms NXT brick over its Bluetooth serial port.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Serial port of the brick's Bluetooth link.
    #[arg(short, long, default_value = "/dev/rfcomm0")]
    port: String,
    /// Baud rate; ignored by most Bluetooth virtual COM ports.
    #[arg(long, default_value_t = 115_200)]
    baud: u32,
    #[command(flatten)]
    verbose: Verbosity<InfoLevel>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the brick's identity, firmware and battery state.
    Info {
        /// Print as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Read the battery voltage.
    Battery,
    /// Play a tone.
    Tone {
        #[arg(default_value_t = 440)]
        frequency: u16,
        #[arg(default_value_t = 500)]
        duration_ms: u16,
    },
    /// Drive a two-motor vehicle (motors on ports B and C).
    Drive {
        direction: Direction,
        /// How long to keep moving before stopping.
        #[arg(long, default_value_t = 1500)]
        ms: u64,
    },
    /// Watch a sensor: poll in the background and print edge events.
    Sensor {
        kind: SensorKindArg,
        /// Sensor port, 1-4.
        #[arg(long, default_value_t = 1)]
        port: u8,
        /// Edge-detection threshold for scalar sensors.
        #[arg(long)]
        threshold: Option<i32>,
        /// Turn the light sensor's floodlight on.
        #[arg(long)]
        floodlight: bool,
        /// How long to watch.
        #[arg(long, default_value_t = 10)]
        seconds: u64,
    },
    /// List files on the brick's flash.
    Files {
        #[arg(default_value = "*.*")]
        pattern: String,
    },
    /// List firmware modules.
    Modules {
        #[arg(default_value = "*.mod")]
        pattern: String,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Direction {
    Forward,
    Backward,
    Left,
    Right,
    Stop,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SensorKindArg {
    Touch,
    Light,
    Sound,
    Ultrasonic,
}

fn init_logging(verbosity: &Verbosity<InfoLevel>) {
    let filter = EnvFilter::builder()
        .with_default_directive(verbosity.tracing_level_filter().into())
        .from_env_lossy();
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .without_time(),
        )
        .init();
}

fn sensor_port(n: u8) -> anyhow::Result<SensorPort> {
    SensorPort::try_from(n.checked_sub(1).unwrap_or(u8::MAX))
        .map_err(|_| anyhow::anyhow!("sensor port must be 1-4, got {n}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.verbose);

    let transport = SerialTransport::new(&cli.port, cli.baud);
    let mut brick = Brick::new(transport);

    match cli.command {
        Command::Info { json } => {
            brick.set_poll_interval(None);
            brick.connect().await.context("connecting to the brick")?;
            let info = brick.device_info().await?;
            let version = brick.firmware_version().await?;
            let battery = brick.battery_level().await?;
            if json {
                let out = serde_json::json!({
                    "name": info.name,
                    "bt_address": info.bt_address_string(),
                    "signal_strength": info.signal_strength,
                    "free_user_flash": info.free_user_flash,
                    "firmware": version,
                    "battery_mv": battery,
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                println!("Name:       {}", info.name);
                println!("Address:    {}", info.bt_address_string());
                println!("Free flash: {} bytes", info.free_user_flash);
                println!("Version:    {version}");
                println!("Battery:    {battery} mV");
            }
            brick.disconnect().await?;
        }
        Command::Battery => {
            brick.set_poll_interval(None);
            brick.connect().await.context("connecting to the brick")?;
            println!("{} mV", brick.battery_level().await?);
            brick.disconnect().await?;
        }
        Command::Tone {
            frequency,
            duration_ms,
        } => {
            brick.set_poll_interval(None);
            brick.connect().await.context("connecting to the brick")?;
            brick.play_tone(frequency, duration_ms).await?;
            tokio::time::sleep(Duration::from_millis(duration_ms.into())).await;
            brick.disconnect().await?;
        }
        Command::Drive { direction, ms } => {
            brick.set_poll_interval(None);
            let pair = brick.attach_motor_pair(OutputPort::B, OutputPort::C);
            brick.connect().await.context("connecting to the brick")?;
            let context = DriveContext::new(pair);
            match direction {
                Direction::Forward => context.forward().await?,
                Direction::Backward => context.backward().await?,
                Direction::Left => context.turn_left().await?,
                Direction::Right => context.turn_right().await?,
                Direction::Stop => context.stop().await?,
            }
            if !matches!(direction, Direction::Stop) {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                context.stop().await?;
            }
            brick.disconnect().await?;
        }
        Command::Sensor {
            kind,
            port,
            threshold,
            floodlight,
            seconds,
        } => {
            let port = sensor_port(port)?;
            let kind = match kind {
                SensorKindArg::Touch => SensorKind::Touch,
                SensorKindArg::Light => SensorKind::Light { floodlight },
                SensorKindArg::Sound => SensorKind::Sound { adjusted: true },
                SensorKindArg::Ultrasonic => SensorKind::Ultrasonic,
            };
            let sensor = brick.attach_sensor(port, kind);
            if let Some(threshold) = threshold {
                sensor.set_threshold(threshold).await;
            }
            let mut events = sensor.subscribe();
            brick.connect().await.context("connecting to the brick")?;

            println!("watching port {port} for {seconds}s...");
            let deadline = tokio::time::Instant::now() + Duration::from_secs(seconds);
            loop {
                tokio::select! {
                    event = events.recv() => match event {
                        Ok(SensorEvent::Pressed) => println!("pressed"),
                        Ok(SensorEvent::Released) => println!("released"),
                        Ok(SensorEvent::CrossedAbove { value, threshold }) => {
                            println!("crossed above {threshold}: {value}");
                        }
                        Ok(SensorEvent::CrossedBelow { value, threshold }) => {
                            println!("crossed below {threshold}: {value}");
                        }
                        Err(_) => break,
                    },
                    _ = tokio::time::sleep_until(deadline) => break,
                }
            }
            if let Some(reading) = sensor.last_reading().await {
                println!("last reading: {reading}");
            }
            brick.disconnect().await?;
        }
        Command::Files { pattern } => {
            brick.set_poll_interval(None);
            brick.connect().await.context("connecting to the brick")?;
            let conn = brick.connection();
            let mut conn = conn.lock().await;
            let mut entry = conn.find_first(&pattern).await?;
            if entry.is_none() {
                println!("no files match {pattern}");
            }
            while let Some(info) = entry {
                println!("{:<20} {:>8} bytes", info.name, info.size);
                entry = conn.find_next(info.handle).await?;
            }
            drop(conn);
            brick.disconnect().await?;
        }
        Command::Modules { pattern } => {
            brick.set_poll_interval(None);
            brick.connect().await.context("connecting to the brick")?;
            let conn = brick.connection();
            let mut conn = conn.lock().await;
            let mut entry = conn.request_first_module(&pattern).await?;
            if entry.is_none() {
                println!("no modules match {pattern}");
            }
            let mut listing_handle = None;
            while let Some(info) = entry {
                println!(
                    "{:<20} {}  io-map {} bytes",
                    info.name, info.module_id, info.io_map_size
                );
                listing_handle = Some(info.handle);
                entry = conn.request_next_module(info.handle).await?;
            }
            if let Some(handle) = listing_handle {
                let _ = conn.close_module_handle(handle).await;
            }
            drop(conn);
            brick.disconnect().await?;
        }
    }

    Ok(())
}
