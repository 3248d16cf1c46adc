//! Replay projection: frames derive from the committed chain and nothing
//! else, in strict sequence order, with explicit gaps and drops.

mod common;

use common::{export_events, seal_block, seal_chain, AUTHORITY, SESSION};
use provlog_core::replay::{build_replay, FrameType};
use provlog_core::verifier::VerifyOptions;
use provlog_core::{export, ChainState, SealMode, Sealer, Validator};
use serde_json::{json, Value};
use uuid::Uuid;

fn opts() -> VerifyOptions {
    VerifyOptions::with_authorities([AUTHORITY])
}

#[test]
fn frames_follow_sequence_order_with_verbatim_payloads() {
    let chain = seal_chain(&[
        ("SESSION_START", json!({"agent_id": "a1"})),
        ("TOOL_CALL", json!({"tool_name": "calculator", "args": {"expression": "2+2"}})),
        ("TOOL_RESULT", json!({"result": "4"})),
        ("SESSION_END", json!({})),
    ]);
    let seal = seal_block(&chain);
    let replay = build_replay(&export_events(&chain), Some(&seal), &opts()).unwrap();

    assert_eq!(replay.frames.len(), 4);
    assert_eq!(replay.event_count, 4);
    assert_eq!(replay.total_drops, 0);
    assert_eq!(replay.evidence_class, "A");
    assert!(replay.seal_present);

    for (i, frame) in replay.frames.iter().enumerate() {
        assert_eq!(frame.frame_type, FrameType::Event);
        assert_eq!(frame.position, i);
        assert_eq!(frame.sequence_number, Some(i as u64));
    }
    // Payload is the canonical byte string, verbatim.
    assert_eq!(
        replay.frames[2].payload.as_deref(),
        Some(r#"{"result":"4"}"#)
    );
    assert_eq!(
        replay.final_hash.as_deref(),
        Some(chain.last().unwrap().event_hash.as_str())
    );
}

#[test]
fn log_drop_events_become_log_drop_frames() {
    let chain = seal_chain(&[
        ("SESSION_START", json!({"agent_id": "a1"})),
        ("LOG_DROP", json!({"dropped_count": 5, "reason": "buffer_overflow"})),
        ("SESSION_END", json!({})),
    ]);
    let replay = build_replay(&export_events(&chain), None, &opts()).unwrap();

    let drop_frame = &replay.frames[1];
    assert_eq!(drop_frame.frame_type, FrameType::LogDrop);
    assert_eq!(drop_frame.dropped_count, Some(5));
    assert_eq!(drop_frame.drop_reason.as_deref(), Some("buffer_overflow"));
    assert_eq!(replay.total_drops, 5);
    assert_eq!(replay.evidence_class, "B");
}

#[test]
fn redacted_event_gets_an_annotation_frame() {
    let chain = seal_chain(&[
        ("SESSION_START", json!({"agent_id": "a1"})),
        (
            "MODEL_RESPONSE",
            json!({"email": "[REDACTED]", "email_hash": "ab".repeat(32)}),
        ),
    ]);
    let replay = build_replay(&export_events(&chain), None, &opts()).unwrap();

    assert_eq!(replay.frames.len(), 3);
    let annotation = &replay.frames[2];
    assert_eq!(annotation.frame_type, FrameType::Redaction);
    assert_eq!(annotation.sequence_number, Some(1));
    assert_eq!(annotation.redacted_fields, vec!["payload.email".to_string()]);
}

#[test]
fn committed_gaps_surface_as_gap_frames() {
    // A non-strict ingester documents a gap and admits the late event at its
    // claimed sequence; the numeric hole remains in the committed chain.
    let validator = Validator::default();
    let permissive = Sealer::new(AUTHORITY, SealMode::Permissive);

    let genesis = permissive
        .seal(
            &validator
                .validate(&json!({
                    "event_id": Uuid::new_v4().to_string(),
                    "session_id": SESSION,
                    "sequence_number": 0,
                    "timestamp_wall": "2024-05-01T12:00:00Z",
                    "event_type": "SESSION_START",
                    "payload": {"agent_id": "a1"},
                }))
                .unwrap(),
            None,
        )
        .unwrap()
        .event;

    let state = ChainState {
        session_id: genesis.session_id,
        last_sequence: 0,
        last_event_hash: genesis.event_hash.clone(),
        closed: false,
    };
    let outcome = permissive
        .seal(
            &validator
                .validate(&json!({
                    "event_id": Uuid::new_v4().to_string(),
                    "session_id": SESSION,
                    "sequence_number": 4,
                    "timestamp_wall": "2024-05-01T12:00:04Z",
                    "event_type": "TOOL_RESULT",
                    "payload": {"result": "late"},
                }))
                .unwrap(),
            Some(&state),
        )
        .unwrap();

    let chain = vec![genesis, outcome.drop_event.unwrap(), outcome.event];
    let events: Vec<Value> = chain
        .iter()
        .map(|e| export::exported_event(e).unwrap())
        .collect();

    let replay = build_replay(&events, None, &opts()).unwrap();

    // SESSION_START, LOG_DROP(seq 1), GAP(2..3), TOOL_RESULT(seq 4)
    let kinds: Vec<FrameType> = replay.frames.iter().map(|f| f.frame_type).collect();
    assert_eq!(
        kinds,
        vec![
            FrameType::Event,
            FrameType::LogDrop,
            FrameType::Gap,
            FrameType::Event
        ]
    );
    let gap = &replay.frames[2];
    assert_eq!(gap.gap_start, Some(2));
    assert_eq!(gap.gap_end, Some(3));
    assert_eq!(replay.evidence_class, "B");
}

#[test]
fn tampered_chain_refuses_with_no_frames() {
    let chain = seal_chain(&[
        ("SESSION_START", json!({"agent_id": "a1"})),
        ("MODEL_RESPONSE", json!({"x": "a"})),
    ]);
    let mut events = export_events(&chain);
    events[1]["payload"]["x"] = json!("b");

    let failure = build_replay(&events, None, &opts()).unwrap_err();
    assert_eq!(failure.error_code, "payload-tamper");
    assert_eq!(failure.session_id, SESSION);
}

#[test]
fn non_monotonic_timestamps_warn_but_never_reorder() {
    let validator = Validator::default();
    let sealer = Sealer::new(AUTHORITY, SealMode::Strict);

    let mut chain = Vec::new();
    let mut state: Option<ChainState> = None;
    // Wall clock runs backwards between the two events.
    for (i, ts) in [(0u64, "2024-05-01T12:00:30Z"), (1, "2024-05-01T12:00:10Z")] {
        let claim = validator
            .validate(&json!({
                "event_id": Uuid::new_v4().to_string(),
                "session_id": SESSION,
                "sequence_number": i,
                "timestamp_wall": ts,
                "event_type": if i == 0 { "SESSION_START" } else { "ANNOTATION" },
                "payload": {},
            }))
            .unwrap();
        let sealed = sealer.seal(&claim, state.as_ref()).unwrap().event;
        state = Some(ChainState {
            session_id: sealed.session_id,
            last_sequence: sealed.sequence_number,
            last_event_hash: sealed.event_hash.clone(),
            closed: false,
        });
        chain.push(sealed);
    }

    let events: Vec<Value> = chain
        .iter()
        .map(|e| export::exported_event(e).unwrap())
        .collect();
    let replay = build_replay(&events, None, &opts()).unwrap();

    // Order is sequence order, untouched.
    assert_eq!(replay.frames[0].sequence_number, Some(0));
    assert_eq!(replay.frames[1].sequence_number, Some(1));
    assert!(replay
        .warnings
        .iter()
        .any(|w| w.message.contains("earlier than its predecessor")));
}
