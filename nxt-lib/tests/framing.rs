//! Tests for telegram framing and the exchange discipline.

mod common;

use common::*;

use nxt_lib::connection::Connection;
use nxt_lib::error::NxtError;
use nxt_lib::telegram::StatusCode;
use nxt_lib::types::{OutputPort, SensorPort};

#[tokio::test]
async fn no_reply_command_writes_once_and_never_reads() {
    let (transport, handle) = MockTransport::new();
    let mut conn = Connection::new(transport);
    conn.open().unwrap();
    conn.set_reply_required(false);

    conn.stop_program().await.expect("send should succeed");

    let writes = handle.writes();
    assert_eq!(writes.len(), 1, "exactly one write");
    // Length prefix plus [0x80, 0x01]: direct no-reply stop-program.
    assert_eq!(writes[0], vec![0x02, 0x00, 0x80, 0x01]);
    // Nothing was queued for reading, and nothing tried to read: no error.
}

#[tokio::test]
async fn reply_command_is_length_prefixed() {
    let (transport, handle) = MockTransport::new();
    let mut conn = Connection::new(transport);
    conn.open().unwrap();
    // Captured battery exchange: reply 0x02 0x0b 0x00, 10000 mV.
    handle.queue_reply(&hex::decode("020b001027").unwrap());

    let mv = conn.get_battery_level().await.unwrap();
    assert_eq!(mv, 10_000);

    let writes = handle.writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0], hex::decode("0200000b").unwrap());
}

#[tokio::test]
async fn send_fails_when_not_connected() {
    let (transport, _handle) = MockTransport::new();
    let mut conn = Connection::new(transport);

    let err = conn.get_battery_level().await.unwrap_err();
    assert!(matches!(err, NxtError::NotConnected));
}

#[tokio::test]
async fn bad_reply_marker_is_a_protocol_fault() {
    let (transport, handle) = MockTransport::new();
    let mut conn = Connection::new(transport);
    conn.open().unwrap();
    // Correct opcode echo and status, wrong marker: must fail on the marker
    // before anything else is looked at.
    handle.queue_reply(&[0x01, 0x0B, 0x00, 0x10, 0x27]);

    let err = conn.get_battery_level().await.unwrap_err();
    assert!(matches!(err, NxtError::ReplyMarker { found: 0x01 }));
}

#[tokio::test]
async fn wrong_opcode_echo_is_a_protocol_fault() {
    let (transport, handle) = MockTransport::new();
    let mut conn = Connection::new(transport);
    conn.open().unwrap();
    handle.queue_reply(&reply(0x0D, 0x00, &[0x10, 0x27]));

    let err = conn.get_battery_level().await.unwrap_err();
    assert!(matches!(
        err,
        NxtError::OpcodeEcho {
            sent: 0x0B,
            echoed: 0x0D
        }
    ));
}

#[tokio::test]
async fn non_success_status_carries_opcode_and_status() {
    let (transport, handle) = MockTransport::new();
    let mut conn = Connection::new(transport);
    conn.open().unwrap();
    handle.queue_reply(&reply(0x06, 0xF0, &[]));

    let err = conn.get_output_state(OutputPort::A).await.unwrap_err();
    match err {
        NxtError::CommandFailed { opcode, status } => {
            assert_eq!(opcode, 0x06);
            assert_eq!(status, StatusCode::BadInputOutput);
        }
        other => panic!("expected CommandFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn exchanges_do_not_interleave_on_the_wire() {
    let (transport, handle) = MockTransport::new();
    let mut conn = Connection::new(transport);
    conn.open().unwrap();
    conn.set_reply_required(false);
    let conn = conn.into_shared();

    let a = {
        let conn = conn.clone();
        tokio::spawn(async move {
            for _ in 0..10 {
                conn.lock()
                    .await
                    .set_input_mode(
                        SensorPort::S1,
                        nxt_lib::types::SensorType::Switch,
                        nxt_lib::types::SensorMode::Boolean,
                    )
                    .await
                    .unwrap();
            }
        })
    };
    let b = {
        let conn = conn.clone();
        tokio::spawn(async move {
            for _ in 0..10 {
                conn.lock().await.play_tone(440, 100).await.unwrap();
            }
        })
    };
    a.await.unwrap();
    b.await.unwrap();

    let writes = handle.writes();
    assert_eq!(writes.len(), 20);
    for frame in writes {
        let len = u16::from_le_bytes([frame[0], frame[1]]) as usize;
        assert_eq!(frame.len(), len + 2, "every write is one complete frame");
    }
}

#[tokio::test(start_paused = true)]
async fn stalled_reply_hits_the_exchange_deadline() {
    let (transport, _handle) = MockTransport::stalled();
    let mut conn = Connection::new(transport);
    conn.open().unwrap();

    let err = conn.get_battery_level().await.unwrap_err();
    assert!(matches!(err, NxtError::Timeout(_)));
}
