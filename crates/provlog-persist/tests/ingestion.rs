//! Ingestion orchestration: atomicity, sequence discipline, sealing,
//! idempotence, and serialization of concurrent batches.

use std::sync::Arc;

use provlog_core::error::IngestErrorCode;
use provlog_core::export::parse_export;
use provlog_core::policy::{PolicyConfig, PolicyEngine};
use provlog_core::verifier::{verify_session, EvidenceClass, VerificationStatus, VerifyOptions};
use provlog_persist::{
    export_session, EventStore, IngestBatch, IngestionService, ServiceConfig, StoreConfig,
};
use serde_json::{json, Value};
use uuid::Uuid;

async fn service() -> IngestionService {
    let store = EventStore::with_config(StoreConfig::memory()).await.unwrap();
    let engine = PolicyEngine::from_config(&PolicyConfig::default()).unwrap();
    IngestionService::new(store, engine, &ServiceConfig::default())
}

fn event(session_id: Uuid, seq: u64, event_type: &str, payload: Value) -> Value {
    json!({
        "event_id": Uuid::new_v4(),
        "session_id": session_id,
        "sequence_number": seq,
        "timestamp_wall": format!("2024-05-01T12:00:{:02}Z", seq % 60),
        "event_type": event_type,
        "payload": payload,
    })
}

fn batch(session_id: Uuid, events: Vec<Value>, seal: bool) -> IngestBatch {
    IngestBatch {
        session_id,
        events,
        seal,
    }
}

#[tokio::test]
async fn genesis_batch_commits_and_chains() {
    let svc = service().await;
    let session = Uuid::new_v4();

    let receipt = svc
        .ingest_batch(&batch(
            session,
            vec![
                event(session, 0, "SESSION_START", json!({"agent_id": "a1"})),
                event(session, 1, "TOOL_CALL", json!({"tool_name": "calculator"})),
            ],
            false,
        ))
        .await
        .unwrap();

    assert_eq!(receipt.accepted_count, 2);
    assert!(!receipt.sealed);

    let state = svc.store().chain_state(session).await.unwrap().unwrap();
    assert_eq!(state.last_sequence, 1);
    assert_eq!(state.last_event_hash, receipt.final_hash);
    assert!(!state.closed);

    let events = svc.store().session_events(session).await.unwrap();
    assert_eq!(events.len(), 2);
    assert!(events[0].prev_event_hash.is_none());
    assert_eq!(
        events[1].prev_event_hash.as_deref(),
        Some(events[0].event_hash.as_str())
    );
    assert_eq!(events[1].chain_authority, svc.authority());
}

#[tokio::test]
async fn a_rejected_event_rolls_back_the_whole_batch() {
    let svc = service().await;
    let session = Uuid::new_v4();

    let mut bad = event(session, 1, "TOOL_CALL", json!({}));
    bad["event_type"] = json!("NOT_A_TYPE");

    let failure = svc
        .ingest_batch(&batch(
            session,
            vec![event(session, 0, "SESSION_START", json!({})), bad],
            false,
        ))
        .await
        .unwrap_err();
    assert_eq!(
        failure.rejection().unwrap().error_code,
        IngestErrorCode::SchemaInvalid
    );

    // Nothing committed, not even the valid first event.
    assert!(svc.store().chain_state(session).await.unwrap().is_none());
    assert!(svc.store().session_events(session).await.unwrap().is_empty());
}

#[tokio::test]
async fn replaying_a_committed_batch_is_a_conflict() {
    let svc = service().await;
    let session = Uuid::new_v4();
    let b = batch(
        session,
        vec![event(session, 0, "SESSION_START", json!({}))],
        false,
    );

    svc.ingest_batch(&b).await.unwrap();
    let failure = svc.ingest_batch(&b).await.unwrap_err();
    assert!(failure.is_conflict(IngestErrorCode::DuplicateSequence));
}

#[tokio::test]
async fn a_batch_that_skips_ahead_is_a_gap() {
    let svc = service().await;
    let session = Uuid::new_v4();

    svc.ingest_batch(&batch(
        session,
        vec![event(session, 0, "SESSION_START", json!({}))],
        false,
    ))
    .await
    .unwrap();

    let failure = svc
        .ingest_batch(&batch(
            session,
            vec![event(session, 5, "ANNOTATION", json!({}))],
            false,
        ))
        .await
        .unwrap_err();
    assert_eq!(
        failure.rejection().unwrap().error_code,
        IngestErrorCode::SequenceGap
    );
}

#[tokio::test]
async fn sealing_produces_a_verifiable_export() {
    let svc = service().await;
    let session = Uuid::new_v4();

    let receipt = svc
        .ingest_batch(&batch(
            session,
            vec![
                event(session, 0, "SESSION_START", json!({"agent_id": "a1"})),
                event(session, 1, "TOOL_RESULT", json!({"result": "4"})),
                event(session, 2, "SESSION_END", json!({})),
            ],
            true,
        ))
        .await
        .unwrap();

    assert!(receipt.sealed);
    assert_eq!(receipt.evidence_class.as_deref(), Some("AUTHORITATIVE_EVIDENCE"));
    let digest = receipt.session_digest.clone().unwrap();

    let seal = svc.store().get_seal(session).await.unwrap().unwrap();
    assert_eq!(seal.session_digest, digest);
    assert_eq!(seal.event_count, 3);
    assert_eq!(seal.final_event_hash, receipt.final_hash);

    // The full loop: export, parse, verify offline.
    let export = export_session(svc.store(), session).await.unwrap().unwrap();
    let doc = serde_json::to_value(&export).unwrap();
    let parsed = parse_export(&doc).unwrap();
    let report = verify_session(
        &parsed.events,
        parsed.seal.as_ref(),
        &VerifyOptions::with_authorities([svc.authority()]),
    );
    assert_eq!(report.status, VerificationStatus::Pass);
    assert_eq!(report.evidence_class(), EvidenceClass::A);
}

#[tokio::test]
async fn resealing_returns_the_existing_seal() {
    let svc = service().await;
    let session = Uuid::new_v4();

    let first = svc
        .ingest_batch(&batch(
            session,
            vec![
                event(session, 0, "SESSION_START", json!({})),
                event(session, 1, "SESSION_END", json!({})),
            ],
            true,
        ))
        .await
        .unwrap();

    let again = svc
        .ingest_batch(&batch(session, vec![], true))
        .await
        .unwrap();
    assert!(again.sealed);
    assert_eq!(again.accepted_count, 0);
    assert_eq!(again.session_digest, first.session_digest);
}

#[tokio::test]
async fn sealed_sessions_accept_nothing() {
    let svc = service().await;
    let session = Uuid::new_v4();

    svc.ingest_batch(&batch(
        session,
        vec![
            event(session, 0, "SESSION_START", json!({})),
            event(session, 1, "SESSION_END", json!({})),
        ],
        true,
    ))
    .await
    .unwrap();

    let failure = svc
        .ingest_batch(&batch(
            session,
            vec![event(session, 2, "ANNOTATION", json!({}))],
            false,
        ))
        .await
        .unwrap_err();
    assert!(failure.is_conflict(IngestErrorCode::AlreadySealed));
}

#[tokio::test]
async fn seal_requires_a_terminating_session_end() {
    let svc = service().await;
    let session = Uuid::new_v4();

    let failure = svc
        .ingest_batch(&batch(
            session,
            vec![event(session, 0, "SESSION_START", json!({}))],
            true,
        ))
        .await
        .unwrap_err();
    assert_eq!(
        failure.rejection().unwrap().error_code,
        IngestErrorCode::InvalidSealRequest
    );
}

#[tokio::test]
async fn closed_sessions_refuse_backfill() {
    let svc = service().await;
    let session = Uuid::new_v4();

    svc.ingest_batch(&batch(
        session,
        vec![
            event(session, 0, "SESSION_START", json!({})),
            event(session, 1, "SESSION_END", json!({})),
        ],
        false,
    ))
    .await
    .unwrap();

    let failure = svc
        .ingest_batch(&batch(
            session,
            vec![event(session, 2, "ANNOTATION", json!({}))],
            false,
        ))
        .await
        .unwrap_err();
    assert_eq!(
        failure.rejection().unwrap().error_code,
        IngestErrorCode::SessionClosed
    );
}

#[tokio::test]
async fn authority_leak_rejects_the_batch() {
    let svc = service().await;
    let session = Uuid::new_v4();

    let mut leaked = event(session, 0, "SESSION_START", json!({}));
    leaked["event_hash"] = json!("deadbeef");

    let failure = svc
        .ingest_batch(&batch(session, vec![leaked], false))
        .await
        .unwrap_err();
    assert_eq!(
        failure.rejection().unwrap().error_code,
        IngestErrorCode::AuthorityLeak
    );
}

#[tokio::test]
async fn policy_violations_commit_with_the_batch() {
    let svc = service().await;
    let session = Uuid::new_v4();

    svc.ingest_batch(&batch(
        session,
        vec![
            event(session, 0, "SESSION_START", json!({})),
            event(
                session,
                1,
                "MODEL_RESPONSE",
                json!({"text": "contact user@example.com"}),
            ),
        ],
        false,
    ))
    .await
    .unwrap();

    let violations = svc.store().session_violations(session).await.unwrap();
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].policy_name, "pii_heuristic");
    assert_eq!(violations[0].severity, "WARNING");
    assert_eq!(violations[0].event_sequence_number, 1);
    assert!(!violations[0].created_at.is_empty());
    assert_eq!(violations[0].policy_hash.len(), 64);
}

#[tokio::test]
async fn concurrent_genesis_batches_serialize() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!(
        "sqlite:{}?mode=rwc",
        dir.path().join("concurrency.db").display()
    );
    let store = EventStore::connect(&url).await.unwrap();
    let engine = PolicyEngine::from_config(&PolicyConfig::default()).unwrap();
    let svc = Arc::new(IngestionService::new(
        store,
        engine,
        &ServiceConfig::default(),
    ));

    let session = Uuid::new_v4();
    let make_batch = |payload: Value| {
        batch(
            session,
            vec![event(session, 0, "SESSION_START", payload)],
            false,
        )
    };

    let a = {
        let svc = svc.clone();
        let b = make_batch(json!({"writer": "a"}));
        tokio::spawn(async move { svc.ingest_batch(&b).await })
    };
    let b = {
        let svc = svc.clone();
        let b = make_batch(json!({"writer": "b"}));
        tokio::spawn(async move { svc.ingest_batch(&b).await })
    };

    let results = [a.await.unwrap(), b.await.unwrap()];
    let ok = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(ok, 1, "exactly one concurrent genesis batch may win");

    let loser = results.iter().find(|r| r.is_err()).unwrap();
    let code = loser
        .as_ref()
        .unwrap_err()
        .rejection()
        .expect("loser sees a structured conflict")
        .error_code;
    assert!(
        code == IngestErrorCode::DuplicateSequence || code == IngestErrorCode::SequenceRewind,
        "unexpected loser code: {code}"
    );

    // No interleaved rows: the single committed event is the winner's.
    let events = svc.store().session_events(session).await.unwrap();
    assert_eq!(events.len(), 1);
}
