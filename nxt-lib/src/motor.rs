//! Stateful motor handles on top of the command protocol.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use crate::connection::{SharedConnection, Transport};
use crate::error::NxtError;
use crate::types::{OutputMode, OutputPort, OutputState, RegulationMode, RunState};

/// Last commanded values plus the last polled output state.
#[derive(Debug, Clone, Copy, Default)]
struct MotorSnapshot {
    power: i8,
    mode: Option<OutputMode>,
    regulation: Option<RegulationMode>,
    turn_ratio: i8,
    run_state: Option<RunState>,
    last_output: Option<OutputState>,
}

/// One motor port of a brick.
///
/// Handles are cheap to clone through `Arc` and safe to use from several
/// tasks; every command goes through the shared connection, and the cached
/// snapshot sits behind its own lock.
pub struct Motor<T: Transport> {
    conn: SharedConnection<T>,
    port: OutputPort,
    snapshot: Mutex<MotorSnapshot>,
}

impl<T: Transport> Motor<T> {
    pub(crate) fn new(conn: SharedConnection<T>, port: OutputPort) -> Arc<Self> {
        Arc::new(Self {
            conn,
            port,
            snapshot: Mutex::new(MotorSnapshot::default()),
        })
    }

    pub fn port(&self) -> OutputPort {
        self.port
    }

    /// Run the motor with speed regulation. Power is clamped to [-100, 100];
    /// `tacho_limit` of 0 runs until further notice.
    pub async fn run(&self, power: i32, tacho_limit: u32) -> Result<(), NxtError> {
        self.apply(
            power,
            OutputMode::MOTOR_ON | OutputMode::REGULATED,
            RegulationMode::MotorSpeed,
            0,
            RunState::Running,
            tacho_limit,
        )
        .await
    }

    /// Let the motor coast.
    pub async fn idle(&self) -> Result<(), NxtError> {
        self.apply(0, OutputMode::IDLE, RegulationMode::Idle, 0, RunState::Idle, 0)
            .await
    }

    /// Actively hold the current position.
    pub async fn brake(&self) -> Result<(), NxtError> {
        self.apply(
            0,
            OutputMode::MOTOR_ON | OutputMode::BRAKE | OutputMode::REGULATED,
            RegulationMode::MotorSpeed,
            0,
            RunState::Running,
            0,
        )
        .await
    }

    pub(crate) async fn apply(
        &self,
        power: i32,
        mode: OutputMode,
        regulation: RegulationMode,
        turn_ratio: i32,
        run_state: RunState,
        tacho_limit: u32,
    ) -> Result<(), NxtError> {
        {
            let mut conn = self.conn.lock().await;
            conn.set_output_state(self.port, power, mode, regulation, turn_ratio, run_state, tacho_limit)
                .await?;
        }
        let mut snap = self.snapshot.lock().await;
        snap.power = power.clamp(-100, 100) as i8;
        snap.mode = Some(mode);
        snap.regulation = Some(regulation);
        snap.turn_ratio = turn_ratio.clamp(-100, 100) as i8;
        snap.run_state = Some(run_state);
        debug!(port = %self.port, power = snap.power, "motor state applied");
        Ok(())
    }

    /// Reset the position counter. `relative` resets the block-relative
    /// counter instead of the program-relative one.
    pub async fn reset_position(&self, relative: bool) -> Result<(), NxtError> {
        let mut conn = self.conn.lock().await;
        conn.reset_motor_position(self.port, relative).await
    }

    /// Refresh the cached tachometer state. A no-op while disconnected.
    pub async fn poll(&self) -> Result<(), NxtError> {
        let mut snap = self.snapshot.lock().await;
        let state = {
            let mut conn = self.conn.lock().await;
            if !conn.is_open() {
                return Ok(());
            }
            conn.get_output_state(self.port).await?
        };
        snap.last_output = Some(state);
        Ok(())
    }

    /// The output state captured by the most recent poll, if any.
    pub async fn last_output(&self) -> Option<OutputState> {
        self.snapshot.lock().await.last_output
    }

    /// The most recently commanded power.
    pub async fn commanded_power(&self) -> i8 {
        self.snapshot.lock().await.power
    }
}

/// Two motors driven in lockstep through the firmware's synchronization
/// regulation.
///
/// Both set-output-state exchanges happen under one connection lock, so a
/// concurrent caller can never slip a command between the two halves of a
/// pair update.
pub struct MotorPair<T: Transport> {
    conn: SharedConnection<T>,
    left: Arc<Motor<T>>,
    right: Arc<Motor<T>>,
}

impl<T: Transport> MotorPair<T> {
    pub(crate) fn new(conn: SharedConnection<T>, left: Arc<Motor<T>>, right: Arc<Motor<T>>) -> Self {
        Self { conn, left, right }
    }

    pub fn left(&self) -> &Arc<Motor<T>> {
        &self.left
    }

    pub fn right(&self) -> &Arc<Motor<T>> {
        &self.right
    }

    /// Drive both motors. A non-zero turn ratio steers: -100 spins in place
    /// one way, 100 the other. Both values are clamped to [-100, 100].
    pub async fn run(&self, power: i32, turn_ratio: i32, tacho_limit: u32) -> Result<(), NxtError> {
        let mode = OutputMode::MOTOR_ON | OutputMode::REGULATED;
        {
            let mut conn = self.conn.lock().await;
            conn.set_output_state(
                self.left.port(),
                power,
                mode,
                RegulationMode::MotorSync,
                turn_ratio,
                RunState::Running,
                tacho_limit,
            )
            .await?;
            conn.set_output_state(
                self.right.port(),
                power,
                mode,
                RegulationMode::MotorSync,
                turn_ratio,
                RunState::Running,
                tacho_limit,
            )
            .await?;
        }
        self.record(power, mode, RegulationMode::MotorSync, turn_ratio, RunState::Running)
            .await;
        Ok(())
    }

    /// Let both motors coast.
    pub async fn idle(&self) -> Result<(), NxtError> {
        {
            let mut conn = self.conn.lock().await;
            conn.set_output_state(
                self.left.port(),
                0,
                OutputMode::IDLE,
                RegulationMode::Idle,
                0,
                RunState::Idle,
                0,
            )
            .await?;
            conn.set_output_state(
                self.right.port(),
                0,
                OutputMode::IDLE,
                RegulationMode::Idle,
                0,
                RunState::Idle,
                0,
            )
            .await?;
        }
        self.record(0, OutputMode::IDLE, RegulationMode::Idle, 0, RunState::Idle)
            .await;
        Ok(())
    }

    async fn record(
        &self,
        power: i32,
        mode: OutputMode,
        regulation: RegulationMode,
        turn_ratio: i32,
        run_state: RunState,
    ) {
        for motor in [&self.left, &self.right] {
            let mut snap = motor.snapshot.lock().await;
            snap.power = power.clamp(-100, 100) as i8;
            snap.mode = Some(mode);
            snap.regulation = Some(regulation);
            snap.turn_ratio = turn_ratio.clamp(-100, 100) as i8;
            snap.run_state = Some(run_state);
        }
    }
}
