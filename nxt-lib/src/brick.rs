//! The brick: device slots, connection lifecycle, background tasks.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{info, warn};

use crate::connection::{Connection, SharedConnection, Transport};
use crate::constants::{DEFAULT_POLL_INTERVAL, KEEP_ALIVE_INTERVAL};
use crate::error::NxtError;
use crate::motor::{Motor, MotorPair};
use crate::sensor::{Sensor, SensorKind};
use crate::types::{DeviceInfo, FirmwareVersion, OutputPort, SensorPort};

/// One NXT brick with up to three motors and four sensors attached.
///
/// Attach devices first, then call [`connect`](Brick::connect): connecting
/// pushes every attached sensor's configuration to the device and starts the
/// keep-alive and auto-poll tasks. [`disconnect`](Brick::disconnect) stops
/// the tasks before the transport closes, so no exchange is cut off halfway.
pub struct Brick<T: Transport> {
    conn: SharedConnection<T>,
    motors: [Option<Arc<Motor<T>>>; 3],
    sensors: [Option<Arc<Sensor<T>>>; 4],
    poll_interval: Option<Duration>,
    stop: Option<watch::Sender<bool>>,
    tasks: Vec<JoinHandle<()>>,
}

impl<T: Transport> Brick<T> {
    pub fn new(transport: T) -> Self {
        Self {
            conn: Connection::new(transport).into_shared(),
            motors: [None, None, None],
            sensors: [None, None, None, None],
            poll_interval: Some(DEFAULT_POLL_INTERVAL),
            stop: None,
            tasks: Vec::new(),
        }
    }

    /// The shared connection, for issuing protocol commands directly.
    pub fn connection(&self) -> SharedConnection<T> {
        Arc::clone(&self.conn)
    }

    /// Cadence of the background poll task started by `connect`, or `None`
    /// to poll manually.
    pub fn set_poll_interval(&mut self, interval: Option<Duration>) {
        self.poll_interval = interval;
    }

    /// Attach a motor to a port, replacing whatever was there.
    pub fn attach_motor(&mut self, port: OutputPort) -> Arc<Motor<T>> {
        let motor = Motor::new(Arc::clone(&self.conn), port);
        self.motors[usize::from(u8::from(port))] = Some(Arc::clone(&motor));
        motor
    }

    pub fn motor(&self, port: OutputPort) -> Option<Arc<Motor<T>>> {
        self.motors[usize::from(u8::from(port))].clone()
    }

    /// Attach two motors and drive them as a synchronized pair.
    pub fn attach_motor_pair(&mut self, left: OutputPort, right: OutputPort) -> MotorPair<T> {
        let left = self.attach_motor(left);
        let right = self.attach_motor(right);
        MotorPair::new(Arc::clone(&self.conn), left, right)
    }

    /// Attach a sensor to a port, replacing whatever was there.
    pub fn attach_sensor(&mut self, port: SensorPort, kind: SensorKind) -> Arc<Sensor<T>> {
        let sensor = Sensor::new(Arc::clone(&self.conn), port, kind);
        self.sensors[usize::from(u8::from(port))] = Some(Arc::clone(&sensor));
        sensor
    }

    pub fn sensor(&self, port: SensorPort) -> Option<Arc<Sensor<T>>> {
        self.sensors[usize::from(u8::from(port))].clone()
    }

    pub async fn is_connected(&self) -> bool {
        self.conn.lock().await.is_open()
    }

    /// Open the transport, initialize every attached sensor, start the
    /// background tasks. A no-op when already connected.
    pub async fn connect(&mut self) -> Result<(), NxtError> {
        {
            let mut conn = self.conn.lock().await;
            if conn.is_open() {
                return Ok(());
            }
            conn.open()?;
        }
        info!("connected to brick");

        for sensor in self.sensors.iter().flatten() {
            sensor.init().await?;
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let keep_alive = self.spawn_keep_alive(stop_rx.clone());
        self.tasks.push(keep_alive);
        if let Some(period) = self.poll_interval {
            let poll = self.spawn_poll(period, stop_rx);
            self.tasks.push(poll);
        }
        self.stop = Some(stop_tx);
        Ok(())
    }

    /// Stop the background tasks, then close the transport. A no-op when
    /// already disconnected.
    pub async fn disconnect(&mut self) -> Result<(), NxtError> {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(true);
        }
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
        let mut conn = self.conn.lock().await;
        if conn.is_open() {
            conn.close()?;
            info!("disconnected from brick");
        }
        Ok(())
    }

    fn spawn_keep_alive(&self, mut stop: watch::Receiver<bool>) -> JoinHandle<()> {
        let conn = Arc::clone(&self.conn);
        tokio::spawn(async move {
            let mut ticker = interval(KEEP_ALIVE_INTERVAL);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The interval yields immediately once; the first ping comes a
            // full period after connect.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let mut conn = conn.lock().await;
                        if !conn.is_open() {
                            break;
                        }
                        match conn.keep_alive().await {
                            Ok(sleep_ms) => {
                                tracing::debug!(sleep_ms, "keep-alive acknowledged");
                            }
                            Err(e) => warn!("keep-alive failed: {e}"),
                        }
                    }
                    _ = stop.changed() => break,
                }
            }
        })
    }

    fn spawn_poll(&self, period: Duration, mut stop: watch::Receiver<bool>) -> JoinHandle<()> {
        let sensors: Vec<Arc<Sensor<T>>> = self.sensors.iter().flatten().cloned().collect();
        let motors: Vec<Arc<Motor<T>>> = self.motors.iter().flatten().cloned().collect();
        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        for sensor in &sensors {
                            if let Err(e) = sensor.poll().await {
                                warn!(port = %sensor.port(), "sensor poll failed: {e}");
                            }
                        }
                        for motor in &motors {
                            if let Err(e) = motor.poll().await {
                                warn!(port = %motor.port(), "motor poll failed: {e}");
                            }
                        }
                    }
                    _ = stop.changed() => break,
                }
            }
        })
    }

    // --- convenience queries --------------------------------------------

    /// Battery voltage in millivolts.
    pub async fn battery_level(&self) -> Result<u16, NxtError> {
        self.conn.lock().await.get_battery_level().await
    }

    pub async fn device_info(&self) -> Result<DeviceInfo, NxtError> {
        self.conn.lock().await.get_device_info().await
    }

    pub async fn firmware_version(&self) -> Result<FirmwareVersion, NxtError> {
        self.conn.lock().await.get_firmware_version().await
    }

    /// Play a tone. Frequency in Hz, duration in milliseconds.
    pub async fn play_tone(&self, frequency: u16, duration_ms: u16) -> Result<(), NxtError> {
        self.conn.lock().await.play_tone(frequency, duration_ms).await
    }

    /// Rename the brick.
    pub async fn set_name(&self, name: &str) -> Result<(), NxtError> {
        self.conn.lock().await.set_brick_name(name).await
    }
}
