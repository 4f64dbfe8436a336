//! Sensor handles: passive analog kinds read through get-input-values,
//! digital kinds speak I²C through the low-speed channel.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{Mutex, broadcast};
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use crate::connection::{Connection, SharedConnection, Transport};
use crate::constants::{EXCHANGE_TIMEOUT, LS_POLL_DELAY};
use crate::error::NxtError;
use crate::poll::{BoolEdge, ThresholdEdge, boolean_edge, threshold_edge};
use crate::telegram::StatusCode;
use crate::types::{InputValues, SensorMode, SensorPort, SensorType};

// I2C constants of the ultrasonic sensor.
const US_I2C_ADDRESS: u8 = 0x02;
const US_COMMAND_REGISTER: u8 = 0x41;
const US_MEASUREMENT_0: u8 = 0x42;
const US_CONTINUOUS_MEASUREMENT: u8 = 0x02;
const US_MAX_MEASUREMENT_INDEX: u8 = 7;

/// Default threshold for scalar sensors, in scaled units.
const DEFAULT_THRESHOLD: i32 = 50;
/// Default threshold for the ultrasonic sensor, in centimeters.
const DEFAULT_DISTANCE_THRESHOLD: i32 = 25;

/// What is plugged into a sensor port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorKind {
    /// Touch sensor, read in boolean mode.
    Touch,
    /// Light sensor; `floodlight` turns the red illumination LED on.
    Light { floodlight: bool },
    /// Sound sensor; `adjusted` selects the ear-weighted dBA curve.
    Sound { adjusted: bool },
    /// Ultrasonic range sensor (digital, I²C).
    Ultrasonic,
    /// Any other digital device, driven through [`Sensor::i2c_exchange`].
    Digital,
}

impl SensorKind {
    /// The type/mode pair pushed to the firmware for this kind.
    fn configuration(self) -> (SensorType, SensorMode) {
        match self {
            SensorKind::Touch => (SensorType::Switch, SensorMode::Boolean),
            SensorKind::Light { floodlight: true } => {
                (SensorType::LightActive, SensorMode::PctFullScale)
            }
            SensorKind::Light { floodlight: false } => {
                (SensorType::LightInactive, SensorMode::PctFullScale)
            }
            SensorKind::Sound { adjusted: true } => (SensorType::SoundDba, SensorMode::PctFullScale),
            SensorKind::Sound { adjusted: false } => (SensorType::SoundDb, SensorMode::PctFullScale),
            SensorKind::Ultrasonic | SensorKind::Digital => (SensorType::LowSpeed9V, SensorMode::Raw),
        }
    }

    fn is_digital(self) -> bool {
        matches!(self, SensorKind::Ultrasonic | SensorKind::Digital)
    }
}

/// Edge notification fired by a poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorEvent {
    /// Touch sensor went from released to pressed.
    Pressed,
    /// Touch sensor went from pressed to released.
    Released,
    /// Scalar reading crossed the threshold going up.
    CrossedAbove { value: i32, threshold: i32 },
    /// Scalar reading crossed the threshold going down.
    CrossedBelow { value: i32, threshold: i32 },
}

#[derive(Debug)]
struct SensorState {
    sensor_type: SensorType,
    mode: SensorMode,
    threshold: i32,
    /// Derived value of the previous poll; `None` until the first poll lands.
    previous: Option<i32>,
    last_values: Option<InputValues>,
    last_distance: Option<u8>,
}

/// One sensor port of a brick.
pub struct Sensor<T: Transport> {
    conn: SharedConnection<T>,
    port: SensorPort,
    kind: SensorKind,
    state: Mutex<SensorState>,
    events: broadcast::Sender<SensorEvent>,
}

impl<T: Transport> Sensor<T> {
    pub(crate) fn new(conn: SharedConnection<T>, port: SensorPort, kind: SensorKind) -> Arc<Self> {
        let (sensor_type, mode) = kind.configuration();
        let threshold = match kind {
            SensorKind::Ultrasonic => DEFAULT_DISTANCE_THRESHOLD,
            _ => DEFAULT_THRESHOLD,
        };
        let (events, _) = broadcast::channel(16);
        Arc::new(Self {
            conn,
            port,
            kind,
            state: Mutex::new(SensorState {
                sensor_type,
                mode,
                threshold,
                previous: None,
                last_values: None,
                last_distance: None,
            }),
            events,
        })
    }

    pub fn port(&self) -> SensorPort {
        self.port
    }

    pub fn kind(&self) -> SensorKind {
        self.kind
    }

    /// Subscribe to edge notifications. Any number of subscribers is fine,
    /// including none.
    pub fn subscribe(&self) -> broadcast::Receiver<SensorEvent> {
        self.events.subscribe()
    }

    pub async fn threshold(&self) -> i32 {
        self.state.lock().await.threshold
    }

    /// Set the edge-detection threshold (scaled units, or centimeters for the
    /// ultrasonic sensor).
    pub async fn set_threshold(&self, threshold: i32) {
        self.state.lock().await.threshold = threshold;
    }

    /// Change the device-side type/mode and push the new configuration
    /// immediately when connected. Until the push succeeds, readings are not
    /// to be trusted.
    pub async fn set_configuration(
        &self,
        sensor_type: SensorType,
        mode: SensorMode,
    ) -> Result<(), NxtError> {
        {
            let mut state = self.state.lock().await;
            state.sensor_type = sensor_type;
            state.mode = mode;
            state.previous = None;
        }
        let connected = self.conn.lock().await.is_open();
        if connected { self.init().await } else { Ok(()) }
    }

    /// Push the current configuration to the brick. For digital kinds this
    /// also drains stale bytes out of the low-speed buffer and, for the
    /// ultrasonic sensor, starts continuous measurement.
    pub async fn init(&self) -> Result<(), NxtError> {
        let (sensor_type, mode) = {
            let state = self.state.lock().await;
            (state.sensor_type, state.mode)
        };
        let mut conn = self.conn.lock().await;
        conn.set_input_mode(self.port, sensor_type, mode).await?;
        if self.kind.is_digital() {
            self.drain_lowspeed(&mut conn).await?;
        }
        if self.kind == SensorKind::Ultrasonic {
            conn.ls_write(
                self.port,
                &[US_I2C_ADDRESS, US_COMMAND_REGISTER, US_CONTINUOUS_MEASUREMENT],
                0,
            )
            .await?;
        }
        debug!(port = %self.port, ?sensor_type, ?mode, "sensor initialized");
        Ok(())
    }

    /// Throw away whatever a previous session left in the port's low-speed
    /// receive buffer.
    async fn drain_lowspeed(&self, conn: &mut Connection<T>) -> Result<(), NxtError> {
        loop {
            let ready = match conn.ls_get_status(self.port).await {
                Ok(n) => n,
                // Nothing readable to drain; a fresh transaction will clear it.
                Err(NxtError::CommandFailed { .. }) => return Ok(()),
                Err(e) => return Err(e),
            };
            if ready == 0 {
                return Ok(());
            }
            conn.ls_read(self.port).await?;
        }
    }

    /// Run one I²C transaction against a digital sensor: write `tx`, wait for
    /// `rx_len` answer bytes, read them.
    ///
    /// `Ok(None)` means the bus reported an error that was cleared locally
    /// (no data this time); the next transaction is expected to succeed.
    pub async fn i2c_exchange(&self, tx: &[u8], rx_len: u8) -> Result<Option<Bytes>, NxtError> {
        let mut conn = self.conn.lock().await;
        self.i2c_exchange_locked(&mut conn, tx, rx_len).await
    }

    async fn i2c_exchange_locked(
        &self,
        conn: &mut Connection<T>,
        tx: &[u8],
        rx_len: u8,
    ) -> Result<Option<Bytes>, NxtError> {
        conn.ls_write(self.port, tx, rx_len).await?;
        if rx_len == 0 {
            return Ok(None);
        }

        // The sensor needs a few milliseconds before the answer bytes appear;
        // the firmware reports progress through ls-get-status. The whole wait
        // shares the ordinary exchange deadline.
        enum Wait {
            Ready,
            BusError,
        }
        let waited = timeout(EXCHANGE_TIMEOUT, async {
            loop {
                match conn.ls_get_status(self.port).await {
                    Ok(n) if n >= rx_len => return Ok(Wait::Ready),
                    Ok(_) => sleep(LS_POLL_DELAY).await,
                    Err(NxtError::CommandFailed {
                        status: StatusCode::PendingCommunication,
                        ..
                    }) => sleep(LS_POLL_DELAY).await,
                    Err(NxtError::CommandFailed {
                        status: StatusCode::CommunicationBusError,
                        ..
                    }) => return Ok(Wait::BusError),
                    Err(e) => return Err(e),
                }
            }
        })
        .await??;

        match waited {
            Wait::Ready => Ok(Some(conn.ls_read(self.port).await?)),
            Wait::BusError => {
                // A bus error leaves the channel wedged; a throwaway read
                // clears it. The caller gets no data for this transaction.
                warn!(port = %self.port, "I2C bus error, clearing with a dummy read");
                let _ = conn.ls_read(self.port).await;
                Ok(None)
            }
        }
    }

    /// Read one of the ultrasonic sensor's eight measurement bytes.
    /// `Ok(Some(0xFF))` means no echo was received.
    pub async fn read_measurement_byte(&self, index: u8) -> Result<Option<u8>, NxtError> {
        if index > US_MAX_MEASUREMENT_INDEX {
            return Err(NxtError::OutOfRange {
                what: "measurement byte index",
                value: index.into(),
                min: 0,
                max: US_MAX_MEASUREMENT_INDEX.into(),
            });
        }
        let mut conn = self.conn.lock().await;
        let answer = self
            .i2c_exchange_locked(&mut conn, &[US_I2C_ADDRESS, US_MEASUREMENT_0 + index], 1)
            .await?;
        Ok(answer.and_then(|bytes| bytes.first().copied()))
    }

    /// Refresh the cached reading and fire edge notifications. A no-op while
    /// disconnected; the first successful poll only establishes the baseline.
    pub async fn poll(&self) -> Result<(), NxtError> {
        let mut state = self.state.lock().await;
        let threshold = state.threshold;
        let previous = state.previous;

        let derived = {
            let mut conn = self.conn.lock().await;
            if !conn.is_open() {
                return Ok(());
            }
            match self.kind {
                SensorKind::Touch
                | SensorKind::Light { .. }
                | SensorKind::Sound { .. } => {
                    let values = conn.get_input_values(self.port).await?;
                    drop(conn);
                    state.last_values = Some(values);
                    Some(i32::from(values.scaled))
                }
                SensorKind::Ultrasonic => {
                    let distance = self
                        .i2c_exchange_locked(&mut conn, &[US_I2C_ADDRESS, US_MEASUREMENT_0], 1)
                        .await?
                        .and_then(|bytes| bytes.first().copied());
                    drop(conn);
                    match distance {
                        Some(d) => {
                            state.last_distance = Some(d);
                            Some(i32::from(d))
                        }
                        // Recovered bus fault: keep the old baseline.
                        None => None,
                    }
                }
                SensorKind::Digital => None,
            }
        };

        let Some(current) = derived else {
            return Ok(());
        };

        match self.kind {
            SensorKind::Touch => {
                let edge = boolean_edge(previous.map(|p| p != 0), current != 0);
                match edge {
                    Some(BoolEdge::Rose) => {
                        let _ = self.events.send(SensorEvent::Pressed);
                    }
                    Some(BoolEdge::Fell) => {
                        let _ = self.events.send(SensorEvent::Released);
                    }
                    None => {}
                }
            }
            SensorKind::Light { .. } | SensorKind::Sound { .. } | SensorKind::Ultrasonic => {
                match threshold_edge(previous, current, threshold) {
                    Some(ThresholdEdge::Above) => {
                        let _ = self.events.send(SensorEvent::CrossedAbove {
                            value: current,
                            threshold,
                        });
                    }
                    Some(ThresholdEdge::Below) => {
                        let _ = self.events.send(SensorEvent::CrossedBelow {
                            value: current,
                            threshold,
                        });
                    }
                    None => {}
                }
            }
            SensorKind::Digital => {}
        }

        state.previous = Some(current);
        Ok(())
    }

    /// The full input-values record of the most recent poll (analog kinds).
    pub async fn last_values(&self) -> Option<InputValues> {
        self.state.lock().await.last_values
    }

    /// The distance in centimeters from the most recent poll (ultrasonic);
    /// 0xFF means no echo.
    pub async fn last_distance(&self) -> Option<u8> {
        self.state.lock().await.last_distance
    }

    /// The derived scalar of the most recent poll: 0/1 for touch, scaled
    /// units for light and sound, centimeters for ultrasonic.
    pub async fn last_reading(&self) -> Option<i32> {
        self.state.lock().await.previous
    }

    /// Whether the touch sensor was pressed at the most recent poll.
    pub async fn is_pressed(&self) -> bool {
        self.state.lock().await.previous.is_some_and(|v| v != 0)
    }
}
