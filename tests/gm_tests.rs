//! Integration tests for the GM channel

use gmconsole::channel::{CommandCatalog, GmChannel, GmIntent, ResponseSlot, ValidationError};
use gmconsole::session::{Notice, Session};
use gmconsole::transport::{ConnectionState, ReconnectPolicy, SendOutcome};
use proptest::prelude::*;
use serde_json::{json, Map, Value};
use tokio::sync::mpsc;

const CATALOG: &str = r#"[
    {"name":"Player","value":{
        "kick":{"name":"KickPlayer","args":[{"type":"string","name":"Reason","index":"reason"}]},
        "add_gold":{"name":"AddGold","args":[
            {"type":"number","name":"Amount","index":"amount","min":1,"max":1000}
        ]}
    }}
]"#;

fn catalog_frame() -> String {
    json!({"type": "gmList", "data": CATALOG}).to_string()
}

fn values(v: Value) -> Map<String, Value> {
    v.as_object().cloned().unwrap_or_default()
}

fn open_gm() -> (Session<GmChannel>, mpsc::UnboundedReceiver<String>) {
    let mut session = Session::new(GmChannel::new(), "ws://localhost:9000/gm", ReconnectPolicy::Lazy);
    let (tx, mut rx) = mpsc::unbounded_channel();
    session.connect();
    session.on_open(Box::new(tx));
    assert_eq!(rx.try_recv().unwrap(), r#"{"type":"gmList"}"#);
    session.on_frame(&catalog_frame());
    session.take_notices();
    (session, rx)
}

#[test]
fn test_kick_round_trip() -> anyhow::Result<()> {
    let (mut session, mut rx) = open_gm();
    session.apply(GmIntent::Select("KickPlayer(kick)".into()))?;
    session.apply(GmIntent::Invoke {
        command: "kick".into(),
        values: values(json!({"reason": "test"})),
    })?;

    assert_eq!(
        rx.try_recv()?,
        r#"{"type":"gmCommand","data":{"reason":"test","command":"kick"},"command":"kick"}"#
    );
    assert_eq!(
        session.handler().selected_response(),
        Some(&ResponseSlot::Pending)
    );

    session.on_frame(r#"{"type":"gmCommand","data":"kicked 1 player","command":"kick"}"#);
    assert_eq!(
        session.handler().invoker().response("kick"),
        Some(&json!("kicked 1 player"))
    );
    Ok(())
}

#[test]
fn test_response_for_other_command_does_not_fill_slot() -> anyhow::Result<()> {
    let (mut session, _rx) = open_gm();
    session.apply(GmIntent::Invoke {
        command: "kick".into(),
        values: Map::new(),
    })?;
    session.on_frame(r#"{"type":"gmCommand","data":"ok","command":"add_gold"}"#);
    assert_eq!(
        session.handler().invoker().slot("kick"),
        Some(&ResponseSlot::Pending)
    );
    Ok(())
}

#[test]
fn test_invalid_invocation_sends_nothing() {
    let (mut session, mut rx) = open_gm();
    let err = session
        .apply(GmIntent::Invoke {
            command: "add_gold".into(),
            values: values(json!({"amount": 0})),
        })
        .unwrap_err();
    assert!(matches!(err, ValidationError::OutOfRange { .. }));
    assert!(rx.try_recv().is_err());
    assert!(matches!(session.take_notices().as_slice(), [Notice::Hint(_)]));
}

#[test]
fn test_unknown_command_is_rejected() {
    let (mut session, _rx) = open_gm();
    assert_eq!(
        session.apply(GmIntent::Select("ban".into())),
        Err(ValidationError::UnknownCommand("ban".into()))
    );
}

#[test]
fn test_lazy_channel_queues_until_open() -> anyhow::Result<()> {
    let (mut session, _old) = open_gm();
    session.on_close();
    assert_eq!(session.state(), ConnectionState::Disconnected);

    let outcomes = session.apply(GmIntent::Invoke {
        command: "kick".into(),
        values: values(json!({"reason": "afk"})),
    })?;
    assert_eq!(outcomes, vec![SendOutcome::Queued { connect: true }]);
    assert_eq!(session.state(), ConnectionState::Connecting);

    let (tx, mut rx) = mpsc::unbounded_channel();
    session.on_open(Box::new(tx));
    assert_eq!(
        rx.try_recv()?,
        r#"{"type":"gmCommand","data":{"reason":"afk","command":"kick"},"command":"kick"}"#
    );
    assert_eq!(rx.try_recv()?, r#"{"type":"gmList"}"#);
    Ok(())
}

#[test]
fn test_empty_catalog_object() {
    let (mut session, _rx) = open_gm();
    session.on_frame(r#"{"type":"gmList","data":"{}"}"#);
    assert!(session.handler().catalog().is_empty());
    assert_eq!(session.handler().selected(), None);
}

fn arb_catalog() -> impl Strategy<Value = Value> {
    let arg = ("[a-z]{1,6}", prop_oneof!["number", "string", "bool"]).prop_map(|(index, kind)| {
        json!({"type": kind, "name": index.to_uppercase(), "index": index})
    });
    let command = ("[A-Z][a-z]{1,6}", prop::collection::vec(arg, 0..4))
        .prop_map(|(name, args)| json!({"name": name, "args": args}));
    let category = (
        "[A-Z][a-z]{1,6}",
        prop::collection::btree_map("[a-z_]{1,8}", command, 0..5),
    )
        .prop_map(|(name, commands)| json!({"name": name, "value": commands}));
    prop::collection::vec(category, 0..4).prop_map(Value::from)
}

proptest! {
    #[test]
    fn prop_catalog_reingestion_is_idempotent(data in arb_catalog()) {
        let mut once = CommandCatalog::new();
        once.ingest(&data).unwrap();
        let mut twice = CommandCatalog::new();
        twice.ingest(&data).unwrap();
        twice.ingest(&data).unwrap();

        prop_assert_eq!(once.labels(), twice.labels());
        prop_assert_eq!(once.categories(), twice.categories());
        for label in once.labels() {
            prop_assert_eq!(once.get(label), twice.get(label));
        }
    }

    #[test]
    fn prop_slot_is_ready_only_after_matching_response(
        responses in prop::collection::vec(prop_oneof![Just("kick"), Just("add_gold")], 0..6)
    ) {
        let (mut session, _rx) = open_gm();
        session.apply(GmIntent::Invoke { command: "kick".into(), values: Map::new() }).unwrap();
        prop_assert_eq!(session.handler().invoker().response("kick"), None);

        for (i, id) in responses.iter().enumerate() {
            let frame = json!({"type": "gmCommand", "data": i, "command": id}).to_string();
            session.on_frame(&frame);
        }
        let last_kick = responses.iter().rposition(|id| *id == "kick");
        let expected = last_kick.map(|i| json!(i));
        prop_assert_eq!(session.handler().invoker().response("kick").cloned(), expected);
    }
}
