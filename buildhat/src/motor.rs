//! Motors.
//!
//! [`Motor`] drives the encoder motors with positional ramps and timed
//! pulses computed by [`buildhat_core::kinematics`]; [`PassiveMotor`] covers
//! train and simple motors, which only take a PWM level.
//!
//! Every argument is validated before anything is written, so a rejected
//! call leaves the board untouched.

use buildhat_core::devices::motor::{ABSOLUTE_POSITION, POSITION, SPEED};
use buildhat_core::kinematics::{self, Direction, Ramp};
use buildhat_core::protocol::command;
use buildhat_core::{Family, Port, Reading};
use tokio::sync::watch;

use crate::device::{Completions, Device};
use crate::error::{HatError, Result};

fn invalid(msg: String) -> HatError {
    buildhat_core::Error::InvalidArgument(msg).into()
}

fn check_unit(what: &str, value: f64, min: f64) -> Result<()> {
    if !(min..=1.0).contains(&value) {
        return Err(invalid(format!(
            "{} should be between {} and 1, got {}",
            what, min, value
        )));
    }
    Ok(())
}

// =============================================================================
// Motion
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MotionKind {
    Ramp,
    Pulse,
}

impl MotionKind {
    fn count(self, done: &Completions) -> u64 {
        match self {
            MotionKind::Ramp => done.ramps,
            MotionKind::Pulse => done.pulses,
        }
    }
}

/// A ramp or pulse the board is executing.
///
/// Dropping it does not stop the motor; it only stops waiting.
pub struct Motion {
    device: Device,
    kind: MotionKind,
    done: watch::Receiver<Completions>,
    /// Completions of this kind already counted when the move was sent
    baseline: u64,
}

impl Motion {
    fn finished(&mut self) -> bool {
        self.kind.count(&self.done.borrow_and_update()) > self.baseline
    }

    /// Resolves when the board reports the move as done.
    pub async fn wait(mut self) -> Result<()> {
        let hat = self.device.hat()?;
        let device = self.device.clone();
        loop {
            if self.finished() {
                return Ok(());
            }
            tokio::select! {
                biased;
                _ = hat.closed.cancelled() => return Err(hat.closed_error()),
                changed = self.done.changed() => {
                    if changed.is_err() {
                        return Err(HatError::Detached);
                    }
                }
                _ = device.wait_detached() => {
                    return if self.finished() {
                        Ok(())
                    } else {
                        Err(HatError::Detached)
                    };
                }
            }
        }
    }
}

// =============================================================================
// Encoder motors
// =============================================================================

#[derive(Debug, Clone)]
pub struct Motor {
    device: Device,
}

impl Motor {
    pub fn new(device: Device) -> Result<Motor> {
        device.expect_kind(|kind| kind.family() == Family::Motor, "motor")?;
        Ok(Motor { device })
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn port(&self) -> Port {
        self.device.port()
    }

    /// Subscribe just long enough for one reading.
    async fn read_channel(&self, channel: &str) -> Result<Reading> {
        let mut subscription = self.device.subscribe(channel).await?;
        let reading = subscription.next_reading().await;
        subscription.unsubscribe().await?;
        reading
    }

    async fn read_scalar(&self, channel: &str) -> Result<f64> {
        let reading = self.read_channel(channel).await?;
        reading
            .as_scalar()
            .ok_or_else(|| HatError::UnexpectedReading(reading.to_string()))
    }

    /// Accumulated position in degrees.
    pub async fn position(&self) -> Result<f64> {
        self.read_scalar(self.channel_name(POSITION)?).await
    }

    /// Absolute angle in degrees, -180 to 180.
    pub async fn absolute_position(&self) -> Result<f64> {
        self.read_scalar(self.channel_name(ABSOLUTE_POSITION)?).await
    }

    pub async fn speed(&self) -> Result<f64> {
        self.read_scalar(self.channel_name(SPEED)?).await
    }

    fn channel_name(&self, mode: u8) -> Result<&'static str> {
        self.device
            .kind()
            .descriptor()
            .channel_for_mode(mode)
            .map(|channel| channel.name)
            .ok_or_else(|| invalid(format!("{} has no mode {}", self.device.name(), mode)))
    }

    async fn start(&self, cmd: String, kind: MotionKind) -> Result<Motion> {
        // Count before writing so the done line cannot be missed
        let done = self.device.completions();
        let baseline = kind.count(&done.borrow());
        self.device.write(&cmd).await?;
        Ok(Motion {
            device: self.device.clone(),
            kind,
            done,
            baseline,
        })
    }

    async fn run_ramp(&self, ramp: Ramp) -> Result<Motion> {
        log::debug!(
            "{}: ramp {:.4} -> {:.4} over {:.2}s",
            self.port(),
            ramp.from,
            ramp.to,
            ramp.duration
        );
        self.start(command::ramp(self.port(), &ramp), MotionKind::Ramp)
            .await
    }

    /// Turn by `degrees`; a negative `speed` turns the other way.
    pub async fn run_for_degrees(&self, degrees: f64, speed: f64) -> Result<Motion> {
        kinematics::validate_signed_speed(speed)?;
        kinematics::validate_ramp_speed(speed)?;
        let position = self.position().await?;
        self.run_ramp(kinematics::degrees_ramp(degrees, speed, position))
            .await
    }

    pub async fn run_for_rotations(&self, rotations: f64, speed: f64) -> Result<Motion> {
        self.run_for_degrees(rotations * 360.0, speed).await
    }

    /// Turn to absolute angle `degrees`.
    pub async fn run_to_position(
        &self,
        degrees: f64,
        speed: f64,
        direction: Direction,
    ) -> Result<Motion> {
        kinematics::validate_unsigned_speed(speed)?;
        kinematics::validate_ramp_speed(speed)?;
        kinematics::validate_angle(degrees)?;
        let status = self.read_channel("status").await?;
        let (position, absolute) = match status.values() {
            [_, position, absolute, ..] => (*position, *absolute),
            _ => return Err(HatError::UnexpectedReading(status.to_string())),
        };
        self.run_ramp(kinematics::position_ramp(
            degrees, speed, direction, position, absolute,
        ))
        .await
    }

    pub async fn run_for_seconds(&self, seconds: f64, speed: f64) -> Result<Motion> {
        kinematics::validate_unsigned_speed(speed)?;
        if !(seconds >= 0.0 && seconds.is_finite()) {
            return Err(invalid(format!("seconds should be positive, got {}", seconds)));
        }
        self.start(command::pulse(self.port(), speed, seconds), MotionKind::Pulse)
            .await
    }

    /// Run continuously at `speed`, -100 to 100.
    pub async fn set_speed(&self, speed: f64) -> Result<()> {
        kinematics::validate_signed_speed(speed)?;
        self.device
            .write(&command::set_speed(self.port(), speed))
            .await
    }

    pub async fn stop(&self) -> Result<()> {
        self.coast().await
    }

    pub async fn coast(&self) -> Result<()> {
        self.device.write(&command::coast(self.port())).await
    }

    /// Hold position with zero drive.
    pub async fn float(&self) -> Result<()> {
        self.pwm(0.0).await
    }

    pub async fn pwm(&self, value: f64) -> Result<()> {
        check_unit("pwm", value, -1.0)?;
        self.device.write(&command::pwm(self.port(), value)).await
    }

    pub async fn plimit(&self, limit: f64) -> Result<()> {
        check_unit("plimit", limit, 0.0)?;
        self.device.write(&command::plimit(self.port(), limit)).await
    }

    pub async fn bias(&self, bias: f64) -> Result<()> {
        check_unit("bias", bias, 0.0)?;
        self.device.write(&command::bias(self.port(), bias)).await
    }
}

// =============================================================================
// Passive motors
// =============================================================================

#[derive(Debug, Clone)]
pub struct PassiveMotor {
    device: Device,
}

impl PassiveMotor {
    pub fn new(device: Device) -> Result<PassiveMotor> {
        device.expect_kind(|kind| kind.family() == Family::PassiveMotor, "passive motor")?;
        Ok(PassiveMotor { device })
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Drive at `power`, -100 to 100.
    pub async fn set_power(&self, power: f64) -> Result<()> {
        kinematics::validate_signed_speed(power)?;
        self.device
            .write(&command::pwm(self.device.port(), power / 100.0))
            .await
    }

    /// Cut the drive entirely.
    pub async fn stop(&self) -> Result<()> {
        self.device.write(&command::off(self.device.port())).await
    }

    pub async fn coast(&self) -> Result<()> {
        self.device.write(&command::coast(self.device.port())).await
    }

    pub async fn plimit(&self, limit: f64) -> Result<()> {
        check_unit("plimit", limit, 0.0)?;
        self.device
            .write(&command::plimit(self.device.port(), limit))
            .await
    }

    pub async fn bias(&self, bias: f64) -> Result<()> {
        check_unit("bias", bias, 0.0)?;
        self.device
            .write(&command::bias(self.device.port(), bias))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hat::tests::start;
    use crate::testing::Script;
    use std::time::Duration;

    async fn motor_on_a() -> (Motor, crate::testing::Board, crate::Hat) {
        let (hat, board) = start(Script::firmware().with_device(Port::A, 48)).await;
        let motor = hat.motor(Port::A).await.unwrap();
        (motor, board, hat)
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_for_degrees() {
        let (motor, board, _hat) = motor_on_a().await;

        let run = tokio::spawn({
            let motor = motor.clone();
            async move { motor.run_for_degrees(720.0, 50.0).await }
        });
        board.wait_for("port 0 ; select 2").await;
        board.send("P0C2: 10");
        let motion = run.await.unwrap().unwrap();

        board.wait_for("port 0 ; select").await;
        let ramp = command::ramp(Port::A, &kinematics::degrees_ramp(720.0, 50.0, 10.0));
        board.wait_for(ramp.trim_end_matches('\r')).await;

        board.send("P0: ramp done");
        motion.wait().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_to_position_uses_status() {
        let (motor, board, _hat) = motor_on_a().await;

        let run = tokio::spawn({
            let motor = motor.clone();
            async move {
                motor
                    .run_to_position(90.0, 100.0, Direction::Clockwise)
                    .await
            }
        });
        board.wait_for("port 0 ; select 0").await;
        board.send("P0C0: 0 360 0");
        run.await.unwrap().unwrap();

        let ramp = kinematics::position_ramp(90.0, 100.0, Direction::Clockwise, 360.0, 0.0);
        board
            .wait_for(command::ramp(Port::A, &ramp).trim_end_matches('\r'))
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_pulse_waits_for_its_own_port() {
        let (motor, board, _hat) = motor_on_a().await;

        let motion = motor.run_for_seconds(2.0, 75.0).await.unwrap();
        board.wait_for("port 0 ; set pulse 75 0.0 2 0").await;

        let wait = tokio::spawn(motion.wait());
        board.send("P1: pulse done");
        board.send("P0: ramp done");
        board.send("P0: pulse done");
        wait.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_done_survives_busy_telemetry() {
        let (motor, board, _hat) = motor_on_a().await;

        let motion = motor.run_for_seconds(1.0, 30.0).await.unwrap();
        board.wait_for("port 0 ; set pulse 30 0.0 1 0").await;
        board.send("P0: pulse done");
        for i in 0..300 {
            board.send(&format!("P0C0: 0 {} 0", i));
        }
        tokio::time::sleep(Duration::from_millis(100)).await;

        let waited = tokio::time::timeout(Duration::from_secs(5), motion.wait()).await;
        assert!(matches!(waited, Ok(Ok(()))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_earlier_completion_does_not_count() {
        let (motor, board, _hat) = motor_on_a().await;

        let first = motor.run_for_seconds(1.0, 30.0).await.unwrap();
        board.send("P0: pulse done");
        first.wait().await.unwrap();

        let second = motor.run_for_seconds(1.0, 30.0).await.unwrap();
        let waited = tokio::time::timeout(Duration::from_secs(1), second.wait()).await;
        assert!(waited.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_motion_fails_on_disconnect() {
        let (motor, board, _hat) = motor_on_a().await;

        let motion = motor.run_for_seconds(1.0, 10.0).await.unwrap();
        board.send("P0: disconnected");
        assert!(matches!(motion.wait().await, Err(HatError::Detached)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_validation_precedes_traffic() {
        let (motor, board, _hat) = motor_on_a().await;
        board.wait_for("port 0 ; bias 0.3").await;
        let before = board.received().len();

        assert!(motor.run_for_degrees(90.0, 101.0).await.is_err());
        assert!(motor.run_for_degrees(90.0, 0.0).await.is_err());
        assert!(motor
            .run_to_position(181.0, 50.0, Direction::Shortest)
            .await
            .is_err());
        assert!(motor
            .run_to_position(90.0, -5.0, Direction::Shortest)
            .await
            .is_err());
        assert!(motor.run_for_seconds(-1.0, 50.0).await.is_err());
        assert!(motor.set_speed(-100.5).await.is_err());
        assert!(motor.pwm(1.5).await.is_err());
        assert!(motor.plimit(-0.1).await.is_err());

        tokio::task::yield_now().await;
        assert_eq!(board.received().len(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wrong_family_is_rejected() {
        let (hat, _board) = start(Script::firmware().with_device(Port::B, 62)).await;
        assert!(matches!(
            hat.motor(Port::B).await,
            Err(HatError::WrongDevice { port: Port::B, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_passive_motor_power() {
        let (hat, board) = start(Script::firmware().with_device(Port::C, 2)).await;
        let train = hat.passive_motor(Port::C).await.unwrap();

        train.set_power(-50.0).await.unwrap();
        train.stop().await.unwrap();
        board.wait_for("port 2 ; off").await;
        assert_eq!(
            board.received_after("port 2 ; bias 0.3"),
            vec!["port 2 ; pwm ; set -0.5", "port 2 ; off"]
        );
    }
}
