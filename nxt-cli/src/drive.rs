//! The remote-control surface: five directional operations over a motor
//! pair, carried in an explicit context instead of global state.

use nxt_lib::{MotorPair, NxtError, Transport};

const DRIVE_POWER: i32 = 75;
const TURN_POWER: i32 = 60;

/// Everything a remote-control handler needs to move the vehicle.
pub struct DriveContext<T: Transport> {
    pair: MotorPair<T>,
}

impl<T: Transport> DriveContext<T> {
    pub fn new(pair: MotorPair<T>) -> Self {
        Self { pair }
    }

    pub async fn forward(&self) -> Result<(), NxtError> {
        self.pair.run(DRIVE_POWER, 0, 0).await
    }

    pub async fn backward(&self) -> Result<(), NxtError> {
        self.pair.run(-DRIVE_POWER, 0, 0).await
    }

    pub async fn turn_left(&self) -> Result<(), NxtError> {
        self.pair.run(TURN_POWER, -100, 0).await
    }

    pub async fn turn_right(&self) -> Result<(), NxtError> {
        self.pair.run(TURN_POWER, 100, 0).await
    }

    pub async fn stop(&self) -> Result<(), NxtError> {
        self.pair.idle().await
    }
}
