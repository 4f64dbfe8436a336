//! Tests for the brick lifecycle, sensor initialization, and motor-pair
//! atomicity.

mod common;

use common::*;

use nxt_lib::brick::Brick;
use nxt_lib::sensor::SensorKind;
use nxt_lib::types::{OutputPort, SensorPort};

fn quiet_brick(transport: MockTransport) -> Brick<MockTransport> {
    let mut brick = Brick::new(transport);
    // Tests drive polls by hand.
    brick.set_poll_interval(None);
    brick
}

#[tokio::test]
async fn connect_is_idempotent_and_disconnect_closes() {
    let (transport, handle) = MockTransport::new();
    let mut brick = quiet_brick(transport);

    brick.connect().await.unwrap();
    assert!(brick.is_connected().await);
    brick.connect().await.unwrap();
    assert!(handle.writes().is_empty(), "no devices, no traffic");

    brick.disconnect().await.unwrap();
    assert!(!brick.is_connected().await);
    brick.disconnect().await.unwrap();
}

#[tokio::test]
async fn connect_pushes_sensor_configuration() {
    let (transport, handle) = MockTransport::new();
    let mut brick = quiet_brick(transport);
    brick.attach_sensor(SensorPort::S1, SensorKind::Touch);

    handle.queue_reply(&reply(0x05, 0x00, &[]));
    brick.connect().await.unwrap();

    let writes = handle.writes();
    assert_eq!(writes.len(), 1);
    // set-input-mode: port 0, switch, boolean.
    assert_eq!(writes[0], vec![0x05, 0x00, 0x00, 0x05, 0x00, 0x01, 0x20]);

    brick.disconnect().await.unwrap();
}

#[tokio::test]
async fn ultrasonic_init_drains_buffer_and_starts_continuous_mode() {
    let (transport, handle) = MockTransport::new();
    let mut brick = quiet_brick(transport);
    brick.attach_sensor(SensorPort::S4, SensorKind::Ultrasonic);

    // set-input-mode, then a stale byte to drain (status 1, read, status 0),
    // then the continuous-measurement ls-write.
    handle.queue_reply(&reply(0x05, 0x00, &[]));
    handle.queue_reply(&reply(0x0E, 0x00, &[1]));
    let mut stale = vec![1u8];
    stale.extend_from_slice(&[0x42; 16]);
    handle.queue_reply(&reply(0x10, 0x00, &stale));
    handle.queue_reply(&reply(0x0E, 0x00, &[0]));
    handle.queue_reply(&reply(0x0F, 0x00, &[]));

    brick.connect().await.unwrap();

    let writes = handle.writes();
    assert_eq!(writes.len(), 5);
    // Last write is the ls-write carrying [address, command register,
    // continuous-measurement], no answer bytes requested.
    assert_eq!(
        writes[4],
        vec![0x08, 0x00, 0x00, 0x0F, 0x03, 0x03, 0x00, 0x02, 0x41, 0x02]
    );

    brick.disconnect().await.unwrap();
}

#[tokio::test]
async fn motor_run_and_idle_update_cached_command() {
    let (transport, handle) = MockTransport::new();
    let mut brick = quiet_brick(transport);
    let motor = brick.attach_motor(OutputPort::B);

    brick.connect().await.unwrap();
    {
        let conn = brick.connection();
        conn.lock().await.set_reply_required(false);
    }

    motor.run(160, 0).await.unwrap();
    assert_eq!(motor.commanded_power().await, 100, "clamped");

    motor.idle().await.unwrap();
    assert_eq!(motor.commanded_power().await, 0);

    let writes = handle.writes();
    assert_eq!(writes.len(), 2);
    assert_eq!(writes[1][5], 0x00, "idle sets power 0");
    assert_eq!(writes[1][9], 0x00, "idle run state");

    brick.disconnect().await.unwrap();
}

#[tokio::test]
async fn motor_pair_commands_never_interleave() {
    let (transport, handle) = MockTransport::new();
    let mut brick = quiet_brick(transport);
    let pair = std::sync::Arc::new(brick.attach_motor_pair(OutputPort::B, OutputPort::C));

    brick.connect().await.unwrap();
    {
        let conn = brick.connection();
        conn.lock().await.set_reply_required(false);
    }

    let mut tasks = Vec::new();
    for i in 0..8 {
        let pair = std::sync::Arc::clone(&pair);
        tasks.push(tokio::spawn(async move {
            if i % 2 == 0 {
                pair.run(75, 0, 0).await.unwrap();
            } else {
                pair.idle().await.unwrap();
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let writes = handle.writes();
    assert_eq!(writes.len(), 16);
    for frame in &writes {
        let len = u16::from_le_bytes([frame[0], frame[1]]) as usize;
        assert_eq!(frame.len(), len + 2, "one complete frame per write");
        assert_eq!(frame[3], 0x04, "every frame is a set-output-state");
    }
    // The two halves of a pair update are adjacent: writes come in (B, C)
    // bursts that a concurrent caller cannot split.
    for chunk in writes.chunks(2) {
        assert_eq!(chunk[0][4], 0x01, "first half drives port B");
        assert_eq!(chunk[1][4], 0x02, "second half drives port C");
        assert_eq!(chunk[0][5], chunk[1][5], "same power on both halves");
    }

    brick.disconnect().await.unwrap();
}

#[tokio::test]
async fn brick_queries_pass_through() {
    let (transport, handle) = MockTransport::new();
    let mut brick = quiet_brick(transport);
    brick.connect().await.unwrap();

    handle.queue_reply(&reply(0x0B, 0x00, &8_400u16.to_le_bytes()));
    assert_eq!(brick.battery_level().await.unwrap(), 8_400);

    brick.disconnect().await.unwrap();
}
