//! End-to-end behaviour of the detail controller over the scripted source.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use serde_json::{json, Map, Value};

use tokio::task::JoinHandle;

use staffdesk_client::{Aggregator, DetailController, LoadConfig, LoadState, SessionError};
use staffdesk_shared::{
    AggregatedRecord, Advance, AdvanceStatus, EditSet, EmployeeId, EmployeeRecord, FailureClass,
    IdentityDocumentPatch, SaveError, SaveFailure, Slot, Subcollection, TransportError,
};
use staffdesk_store::{Behavior, Route, ScriptedSource};

fn fields(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => panic!("expected object"),
    }
}

fn seeded_source() -> Arc<ScriptedSource> {
    let source = Arc::new(ScriptedSource::new());
    for (id, name) in [("e1", "Amina Yusuf"), ("e2", "Omar Haddad")] {
        source.put(
            "employees",
            id,
            fields(json!({
                "name": name,
                "department": "Finance",
                "salary": 7200,
                "passport": { "number": "P123", "expiry": "2030-01-31" },
                "bankDetails": { "bankName": "QNB", "accountNumber": "0001" }
            })),
        );
        source.put_sub(
            "employees",
            id,
            "advances",
            "a1",
            fields(json!({"amount": 500, "date": "2024-03-01", "reason": "rent", "status": "pending"})),
        );
        source.put_sub(
            "employees",
            id,
            "transactions",
            "t1",
            fields(json!({"amount": 7200, "date": "2024-03-31", "type": "salary"})),
        );
    }
    source
}

fn controller(source: &Arc<ScriptedSource>) -> DetailController {
    DetailController::new(source.clone(), LoadConfig::default())
}

fn e1() -> EmployeeId {
    EmployeeId::new("e1")
}

#[tokio::test(start_paused = true)]
async fn degraded_load_recovers_on_retry() {
    let source = seeded_source();
    source.script(
        Route::list("employees", "e1", "advances"),
        [Behavior::delay_ms(6_000), Behavior::delay_ms(10)],
    );
    let detail = controller(&source);

    let state = detail.open_detail(e1(), None).settled().await.unwrap();
    let LoadState::Degraded { record, partial, .. } = &state else {
        panic!("expected degraded, got {state:?}");
    };
    assert_eq!(partial.unavailable, vec![Subcollection::Advances]);
    assert_eq!(
        record.advances,
        Slot::Unavailable {
            reason: FailureClass::Timeout
        }
    );
    assert!(record.transactions.is_loaded());

    let state = detail.retry_detail().unwrap().settled().await.unwrap();
    let expected = Aggregator::new(source.clone(), LoadConfig::default())
        .load_record(&e1(), None)
        .await
        .unwrap()
        .record;
    assert_eq!(
        state,
        LoadState::Ready {
            record: expected,
            retries: 1
        }
    );
}

#[tokio::test(start_paused = true)]
async fn opening_another_record_discards_the_first() {
    let source = seeded_source();
    source.script(Route::get("employees", "e1"), [Behavior::delay_ms(3_000)]);
    let detail = controller(&source);
    let mut states = detail.subscribe();

    let first = detail.open_detail(e1(), None);
    let second = detail.open_detail(EmployeeId::new("e2"), None);

    let state = second.settled().await.unwrap();
    assert_eq!(state.record().unwrap().id(), &EmployeeId::new("e2"));
    assert!(first.settled().await.is_none());

    // Let the slow e1 fetch finish; nothing observable may change.
    states.borrow_and_update();
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(source.completed(&Route::get("employees", "e1")), 1);
    assert!(!states.has_changed().unwrap());
    assert_eq!(detail.state(), state);
}

#[tokio::test(start_paused = true)]
async fn opening_the_same_record_twice_shares_one_load() {
    let source = seeded_source();
    source.script(Route::get("employees", "e1"), [Behavior::delay_ms(500)]);
    let detail = controller(&source);

    let first = detail.open_detail(e1(), None);
    let second = detail.open_detail(e1(), None);
    assert_eq!(first.ticket(), second.ticket());

    let (a, b) = tokio::join!(first.settled(), second.settled());
    assert_eq!(a, b);
    assert_eq!(source.started(&Route::get("employees", "e1")), 1);
}

#[tokio::test(start_paused = true)]
async fn closing_while_loading_returns_to_idle() {
    let source = seeded_source();
    source.script(Route::get("employees", "e1"), [Behavior::delay_ms(1_000)]);
    let detail = controller(&source);

    let handle = detail.open_detail(e1(), None);
    assert!(detail.state().is_loading());
    detail.close_detail();

    assert!(handle.settled().await.is_none());
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(detail.state(), LoadState::Idle);
    assert_eq!(*detail.subscribe().borrow(), LoadState::Idle);
}

#[tokio::test(start_paused = true)]
async fn failed_primary_keeps_seed_and_counts_retries() {
    let source = seeded_source();
    source.script(
        Route::get("employees", "e1"),
        [Behavior::fail(TransportError::Network("offline".into()))],
    );
    let detail = controller(&source);
    let seed = EmployeeRecord::shallow(e1(), "Amina Yusuf");

    let state = detail
        .open_detail(e1(), Some(seed.clone()))
        .settled()
        .await
        .unwrap();
    let LoadState::Failed {
        error,
        fallback,
        retries,
    } = &state
    else {
        panic!("expected failed, got {state:?}");
    };
    assert_eq!(error.class, FailureClass::Network);
    assert_eq!(fallback.as_ref(), Some(&seed));
    assert_eq!(*retries, 0);

    detail.retry_detail().unwrap().settled().await;
    let state = detail.retry_detail().unwrap().settled().await.unwrap();
    assert_eq!(state.name(), "failed");
    assert_eq!(state.retries(), 2);
}

#[tokio::test(start_paused = true)]
async fn retry_is_rejected_while_loading_or_ready() {
    let source = seeded_source();
    source.script(Route::get("employees", "e1"), [Behavior::delay_ms(100)]);
    let detail = controller(&source);

    let handle = detail.open_detail(e1(), None);
    assert!(matches!(
        detail.retry_detail(),
        Err(SessionError::RetryNotAllowed { state: "loading" })
    ));
    handle.settled().await;
    assert!(matches!(
        detail.retry_detail(),
        Err(SessionError::RetryNotAllowed { state: "ready" })
    ));
}

#[tokio::test(start_paused = true)]
async fn refresh_failure_keeps_last_known_items() {
    let source = seeded_source();
    let detail = controller(&source);
    let state = detail.open_detail(e1(), None).settled().await.unwrap();
    assert_eq!(state.name(), "ready");

    source.script(
        Route::list("employees", "e1", "advances"),
        [Behavior::fail(TransportError::PermissionDenied("rules".into()))],
    );
    let state = detail.open_detail(e1(), None).settled().await.unwrap();

    let LoadState::Degraded { record, .. } = &state else {
        panic!("expected degraded, got {state:?}");
    };
    let Slot::Stale { items, reason } = &record.advances else {
        panic!("expected stale advances, got {:?}", record.advances);
    };
    assert_eq!(items[0].id, "a1");
    assert_eq!(*reason, FailureClass::Permission);
}

#[tokio::test(start_paused = true)]
async fn save_sends_only_edited_fields_and_updates_state() {
    let source = seeded_source();
    let detail = controller(&source);
    detail.open_detail(e1(), None).settled().await;

    let saved = detail
        .save_edits(EditSet {
            salary: Some(9000.0),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(source.writes()[0].fields, fields(json!({"salary": 9000.0})));
    assert_eq!(saved.employee.salary, 9000.0);
    assert_eq!(saved.employee.passport.as_ref().unwrap().number, "P123");
    assert_eq!(detail.state().record(), Some(&saved));
}

#[tokio::test(start_paused = true)]
async fn save_without_loaded_record_has_no_baseline() {
    let source = seeded_source();
    let detail = controller(&source);
    let edits = EditSet {
        name: Some("A. Yusuf".into()),
        ..Default::default()
    };

    let err = detail.save_edits(edits.clone()).await.unwrap_err();
    assert_eq!(err.failure, SaveFailure::NoBaseline);
    assert_eq!(err.edits, edits);
    assert!(source.writes().is_empty());
}

#[tokio::test(start_paused = true)]
async fn failed_save_leaves_state_alone() {
    let source = seeded_source();
    source.script(
        Route::update("employees", "e1"),
        [Behavior::fail(TransportError::Conflict("version mismatch".into()))],
    );
    let detail = controller(&source);
    let before = detail.open_detail(e1(), None).settled().await.unwrap();

    let err = detail
        .save_edits(EditSet {
            position: Some("Controller".into()),
            ..Default::default()
        })
        .await
        .unwrap_err();

    assert!(err.is_conflict());
    assert_eq!(err.edits.position.as_deref(), Some("Controller"));
    assert_eq!(detail.state(), before);
}

#[tokio::test(start_paused = true)]
async fn save_landing_after_switch_does_not_touch_new_record() {
    let source = seeded_source();
    source.script(Route::update("employees", "e1"), [Behavior::delay_ms(500)]);
    let detail = controller(&source);
    detail.open_detail(e1(), None).settled().await;

    let saving = {
        let detail = detail.clone();
        tokio::spawn(async move {
            detail
                .save_edits(EditSet {
                    salary: Some(9000.0),
                    ..Default::default()
                })
                .await
        })
    };
    tokio::task::yield_now().await;
    let other = detail
        .open_detail(EmployeeId::new("e2"), None)
        .settled()
        .await
        .unwrap();

    let saved = saving.await.unwrap().unwrap();
    assert_eq!(saved.id(), &e1());
    assert_eq!(saved.employee.salary, 9000.0);
    assert_eq!(detail.state(), other);
    assert_eq!(detail.state().record().unwrap().employee.salary, 7200.0);
}

fn spawn_salary_save(
    detail: &DetailController,
    salary: f64,
) -> JoinHandle<Result<AggregatedRecord, SaveError>> {
    let detail = detail.clone();
    tokio::spawn(async move {
        detail
            .save_edits(EditSet {
                salary: Some(salary),
                ..Default::default()
            })
            .await
    })
}

#[tokio::test(start_paused = true)]
async fn save_landing_after_retry_updates_the_reloaded_record() {
    let source = seeded_source();
    source.script(
        Route::list("employees", "e1", "advances"),
        [Behavior::delay_ms(6_000), Behavior::delay_ms(10)],
    );
    source.script(Route::update("employees", "e1"), [Behavior::delay_ms(500)]);
    let detail = controller(&source);
    let state = detail.open_detail(e1(), None).settled().await.unwrap();
    assert_eq!(state.name(), "degraded");

    let saving = spawn_salary_save(&detail, 9000.0);
    tokio::task::yield_now().await;
    let reloaded = detail.retry_detail().unwrap().settled().await.unwrap();
    // The reload finished before the write landed.
    assert_eq!(reloaded.name(), "ready");
    assert_eq!(reloaded.record().unwrap().employee.salary, 7200.0);

    let saved = saving.await.unwrap().unwrap();
    assert_eq!(saved.employee.salary, 9000.0);
    let stored: EmployeeRecord = source.document("employees", "e1").unwrap().decode().unwrap();
    assert_eq!(stored.salary, 9000.0);

    let state = detail.state();
    assert_eq!(state.name(), "ready");
    assert_eq!(state.record(), Some(&saved));
    assert!(state.record().unwrap().advances.is_loaded());
}

#[tokio::test(start_paused = true)]
async fn save_committed_during_retry_is_replayed_onto_the_reload() {
    let source = seeded_source();
    source.script(
        Route::list("employees", "e1", "advances"),
        [Behavior::delay_ms(6_000), Behavior::delay_ms(1_000)],
    );
    source.script(Route::update("employees", "e1"), [Behavior::delay_ms(500)]);
    let detail = controller(&source);
    detail.open_detail(e1(), None).settled().await;

    let saving = spawn_salary_save(&detail, 9000.0);
    tokio::task::yield_now().await;
    let reload = detail.retry_detail().unwrap();

    // The reload has already read the old document; the save lands first.
    let saved = saving.await.unwrap().unwrap();
    assert_eq!(saved.employee.salary, 9000.0);
    let LoadState::Loading { preview, .. } = detail.state() else {
        panic!("expected loading, got {:?}", detail.state());
    };
    assert_eq!(preview.unwrap().salary, 9000.0);

    let state = reload.settled().await.unwrap();
    let LoadState::Ready { record, retries } = &state else {
        panic!("expected ready, got {state:?}");
    };
    assert_eq!(*retries, 1);
    assert_eq!(record.employee.salary, 9000.0);
    assert_eq!(record.employee.passport.as_ref().unwrap().number, "P123");

    // A nested edit now resolves against the saved record.
    detail
        .save_edits(EditSet {
            passport: Some(IdentityDocumentPatch {
                number: Some("P999".into()),
                ..Default::default()
            }),
            ..Default::default()
        })
        .await
        .unwrap();
    let stored: EmployeeRecord = source.document("employees", "e1").unwrap().decode().unwrap();
    assert_eq!(stored.salary, 9000.0);
    assert_eq!(stored.passport.unwrap().number, "P999");
    assert_eq!(detail.state().record().unwrap().employee.salary, 9000.0);
}

#[tokio::test(start_paused = true)]
async fn append_overlapping_a_refresh_appears_once() {
    let source = seeded_source();
    let detail = controller(&source);
    detail.open_detail(e1(), None).settled().await;

    source.script(
        Route::add("employees", "e1", "advances"),
        [Behavior::delay_ms(500)],
    );
    source.script(
        Route::list("employees", "e1", "advances"),
        [Behavior::delay_ms(1_000)],
    );
    let appending = {
        let detail = detail.clone();
        tokio::spawn(async move {
            detail
                .append_advance(Advance {
                    id: String::new(),
                    amount: 300.0,
                    date: NaiveDate::from_ymd_opt(2024, 4, 10).unwrap(),
                    reason: "medical".into(),
                    status: AdvanceStatus::Pending,
                })
                .await
        })
    };
    tokio::task::yield_now().await;
    let refresh = detail.open_detail(e1(), None);

    let appended = appending.await.unwrap().unwrap();
    assert_eq!(appended.advances.items().unwrap().len(), 2);

    // The refresh lists advances after the append landed, so it sees the
    // new item itself.
    let state = refresh.settled().await.unwrap();
    let advances = state.record().unwrap().advances.items().unwrap();
    assert_eq!(advances.len(), 2);
    assert_eq!(advances, appended.advances.items().unwrap());
}

#[tokio::test(start_paused = true)]
async fn appends_fold_only_into_loaded_slots() {
    let source = seeded_source();
    source.script(
        Route::list("employees", "e1", "advances"),
        [Behavior::fail(TransportError::Network("reset".into()))],
    );
    let detail = controller(&source);
    detail.open_detail(e1(), None).settled().await;

    let advance = Advance {
        id: String::new(),
        amount: 300.0,
        date: NaiveDate::from_ymd_opt(2024, 4, 10).unwrap(),
        reason: "medical".into(),
        status: AdvanceStatus::Pending,
    };
    let record = detail.append_advance(advance).await.unwrap();

    // Written to the store, but the unknown slot stays unknown.
    assert_eq!(source.writes().len(), 1);
    assert!(record.advances.is_unavailable());
    assert_eq!(record.transactions.items().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn advance_status_change_is_reflected_locally() {
    let source = seeded_source();
    let detail = controller(&source);
    detail.open_detail(e1(), None).settled().await;

    let record = detail
        .set_advance_status("a1", AdvanceStatus::Approved)
        .await
        .unwrap();

    assert_eq!(
        record.advances.items().unwrap()[0].status,
        AdvanceStatus::Approved
    );
    assert_eq!(detail.state().record(), Some(&record));
}
