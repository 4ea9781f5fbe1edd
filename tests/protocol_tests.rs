//! Integration tests for the envelope codec and router

use gmconsole::channel::{GmChannel, TargetMultiplexer};
use gmconsole::protocol::{decode, encode, kind, Envelope, ProtocolError};
use gmconsole::session::{RouteOutcome, Router};
use serde_json::json;

#[test]
fn test_backend_frames_decode() {
    let frames = [
        r#"{"type":"servers","data":["game.1001.1","game.1001.2"]}"#,
        r#"{"type":"message","target":"game.1001.1","data":"ok"}"#,
        r#"{"type":"gmList","data":"{}","target":"","command":""}"#,
        r#"{"type":"gmCommand","data":"kicked","command":"kick"}"#,
        r#"{"type":"tableConfig","data":"{\"export_cmd\":\"run\"}"}"#,
        r#"{"type":"exportTable","data":"item.xlsx done\n"}"#,
    ];
    for frame in frames {
        let env = decode(frame).expect("decode failed");
        assert!(!env.kind.is_empty());
    }
}

#[test]
fn test_encode_omits_absent_fields() {
    assert_eq!(
        encode(&Envelope::new(kind::GM_LIST)).unwrap(),
        r#"{"type":"gmList"}"#
    );
    assert_eq!(
        encode(
            &Envelope::new(kind::MESSAGE)
                .with_target("game.1001.1")
                .with_data("print(1)")
        )
        .unwrap(),
        r#"{"type":"message","data":"print(1)","target":"game.1001.1"}"#
    );
}

#[test]
fn test_oversized_frame_is_rejected() {
    let frame = format!(r#"{{"type":"message","data":"{}"}}"#, "x".repeat(11 * 1024 * 1024));
    assert!(matches!(
        decode(&frame),
        Err(ProtocolError::FrameTooLarge { .. })
    ));
}

#[test]
fn test_error_frame_short_circuits_every_channel() {
    let frame = r#"{"type":"error","data":"no such server"}"#;

    let mut console = Router::new(TargetMultiplexer::new());
    assert!(matches!(
        console.route(frame),
        RouteOutcome::ServerError(text) if text == "no such server"
    ));

    let mut gm = Router::new(GmChannel::new());
    assert!(matches!(gm.route(frame), RouteOutcome::ServerError(_)));
}

#[test]
fn test_unknown_type_is_ignored() {
    let mut router = Router::new(TargetMultiplexer::new());
    assert!(matches!(
        router.route(r#"{"type":"heartbeat"}"#),
        RouteOutcome::Ignored(kind) if kind == "heartbeat"
    ));
}

#[test]
fn test_foreign_channel_type_is_ignored() {
    // A GM message on the console socket is not part of its vocabulary
    let mut router = Router::new(TargetMultiplexer::new());
    assert!(matches!(
        router.route(r#"{"type":"gmList","data":"{}"}"#),
        RouteOutcome::Ignored(_)
    ));
}

#[test]
fn test_bad_payload_is_dropped_without_state_change() {
    let mut router = Router::new(TargetMultiplexer::new());
    router.route(r#"{"type":"servers","data":["a"]}"#);
    assert!(matches!(
        router.route(r#"{"type":"servers","data":{"a":1}}"#),
        RouteOutcome::Dropped(ProtocolError::InvalidPayload { .. })
    ));
    assert_eq!(router.handler().active(), Some("a"));
}

#[test]
fn test_binary_frames_route_like_text() {
    let mut router = Router::new(TargetMultiplexer::new());
    let frame = json!({"type": "servers", "data": ["a", "b"]}).to_string();
    assert!(matches!(
        router.route_bytes(frame.as_bytes()),
        RouteOutcome::Handled(_)
    ));
    assert_eq!(router.handler().targets().len(), 2);
}
