use std::time::Duration;

use buildhat::gpio::{reset_hat, SysfsGpio};
use buildhat::{Cli, Command, Hat, HatConfig, HatError, MatrixAction, MotorAction};
use buildhat_core::devices::matrix::Pixel;
use clap::Parser;
use miette::{IntoDiagnostic, Result};
use tokio_graceful_shutdown::{SubsystemBuilder, SubsystemHandle, Toplevel};

/// How long a command waits for its device to show up.
const DEVICE_WAIT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    env_logger::Builder::new()
        .filter_level(args.verbose.log_level_filter())
        .init();

    let mut config = HatConfig::load(args.config.as_deref()).into_diagnostic()?;
    if let Some(device) = args.device {
        config.device = device;
    }
    let command = args.command;

    Toplevel::new(|s| async move {
        s.start(SubsystemBuilder::new("BuildHat", move |subsys| {
            run(subsys, command, config)
        }));
    })
    .catch_signals()
    .handle_shutdown_requests(Duration::from_secs(5))
    .await
    .map_err(Into::into)
}

async fn run(subsys: SubsystemHandle, command: Command, config: HatConfig) -> Result<(), HatError> {
    if let Command::Reset = command {
        let mut pins = SysfsGpio::new(&config.gpio_root);
        let result = reset_hat(
            &mut pins,
            config.reset_pin,
            config.boot0_pin,
            config.reset_time_unit(),
        )
        .await;
        subsys.request_shutdown();
        return result;
    }

    let hat = Hat::open(&config).await?;
    let result = tokio::select! {
        r = execute(&hat, command) => r,
        _ = subsys.on_shutdown_requested() => {
            log::info!("Interrupted");
            Ok(())
        }
    };
    let closed = hat.shutdown().await;
    subsys.request_shutdown();
    result.and(closed)
}

async fn execute(hat: &Hat, command: Command) -> Result<(), HatError> {
    match command {
        Command::List { json } => {
            let devices = hat.devices();
            if json {
                println!("{}", serde_json::to_string_pretty(&devices)?);
            } else if devices.is_empty() {
                println!("No devices attached");
            } else {
                for device in devices {
                    println!("{}: {} (id {})", device.port, device.name, device.type_id);
                }
            }
        }
        Command::Monitor => {
            let mut events = hat.events();
            loop {
                match events.recv().await {
                    Ok(event) => println!("{:?}", event),
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        log::warn!("Missed {} events", n)
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        }
        Command::Voltage => {
            println!("{:.1} V", hat.voltage().await?);
        }
        Command::Motor { port, action } => {
            let motor = tokio::time::timeout(DEVICE_WAIT, hat.motor(port)).await??;
            let motion = match action {
                MotorAction::Degrees { degrees, speed } => {
                    motor.run_for_degrees(degrees, speed).await?
                }
                MotorAction::Rotations { rotations, speed } => {
                    motor.run_for_rotations(rotations, speed).await?
                }
                MotorAction::Position {
                    degrees,
                    speed,
                    direction,
                } => motor.run_to_position(degrees, speed, direction).await?,
                MotorAction::Seconds { seconds, speed } => {
                    motor.run_for_seconds(seconds, speed).await?
                }
            };
            motion.wait().await?;
            log::info!("{}: done at {:.1} degrees", port, motor.position().await?);
        }
        Command::Matrix { port, action } => {
            let matrix = tokio::time::timeout(DEVICE_WAIT, hat.matrix(port)).await??;
            match action {
                MatrixAction::Clear { color, brightness } => {
                    matrix.clear(Pixel::new(color, brightness)?).await?
                }
                MatrixAction::Level { level } => matrix.level(level).await?,
            }
        }
        // Handled in run before the board is opened
        Command::Reset => {}
    }
    Ok(())
}
