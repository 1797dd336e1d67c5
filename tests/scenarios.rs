use anyhow::Context;
use std::sync::Arc;
use tempfile::{tempdir, TempDir};
use yard_tracker::config::StorageConfig;
use yard_tracker::reference::ReferenceSet;
use yard_tracker::sled_store::SledStore;
use yard_tracker::{
    Command, Field, FieldValue, KnownStatus, Outcome, Status, TransitionKind, UndoRefusal,
    ValidationError, YardError, YardService,
};

const NUMBER: &str = "ABC1234567";

// sled locks its directory, so every test gets its own database
fn service() -> anyhow::Result<(YardService, TempDir)> {
    let temp_dir = tempdir()?;
    let store = SledStore::open(&StorageConfig::at(temp_dir.path().join("yard.db")))?;
    let references = ReferenceSet::new()
        .with_location("Yard A")
        .with_location("Yard B")
        .with_driver("Jane Doe", "D-1", "XYZ 123")
        .with_container_type("40ft");

    Ok((
        YardService::new(Arc::new(store), Arc::new(references)),
        temp_dir,
    ))
}

async fn intake(service: &YardService) -> anyhow::Result<()> {
    service.register_booking("BK1", 2, "40ft").await?;
    service.create_container(NUMBER, "BK1", None).await?;
    Ok(())
}

/// Walks a container from intake to `ALL GOOD, BOOK FOR DELIVERY` with every delivery field set.
async fn ready_for_delivery(service: &YardService) -> anyhow::Result<()> {
    intake(service).await?;
    service.move_to_location(NUMBER, "Yard A").await?;
    service.mark_loaded(NUMBER).await?;

    let proposed = service
        .container(NUMBER)
        .await?
        .context("container missing")?
        .set_status(KnownStatus::AllGoodBookForDelivery.into())
        .set_truck("T-9")
        .set_chassis("CH-1")
        .set_seal("S-42")
        .set_gross_weight(24_500.0);
    service.update_container(NUMBER, proposed).await?;
    Ok(())
}

#[tokio::test]
async fn create_seeds_container_from_booking() -> anyhow::Result<()> {
    let (service, _dir) = service()?;
    service.register_booking("bk1", 2, "40ft").await?;

    let container = service.create_container("abc1234567", "BK1", None).await?;

    assert_eq!(container.id, NUMBER);
    assert_eq!(container.status, Status::Known(KnownStatus::New));
    assert_eq!(container.booked_for, "40ft");

    let history = service.history(NUMBER).await?;
    assert_eq!(history.len(), 1);
    let created = history.newest().context("no creation event")?;
    assert!(created.changes().is_none());
    assert_eq!(
        created.details.action,
        "Container created with status: New for booking BK1"
    );
    Ok(())
}

#[tokio::test]
async fn create_twice_is_refused() -> anyhow::Result<()> {
    let (service, _dir) = service()?;
    intake(&service).await?;

    let err = service.create_container(NUMBER, "BK1", None).await.unwrap_err();
    assert!(matches!(err, YardError::AlreadyExists(_)));
    assert_eq!(service.history(NUMBER).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn move_to_location_records_status_diff() -> anyhow::Result<()> {
    let (service, _dir) = service()?;
    intake(&service).await?;

    let moved = service.move_to_location(NUMBER, "Yard A").await?;
    assert_eq!(moved.status.label(), "Yard A");

    let history = service.history(NUMBER).await?;
    assert_eq!(history.len(), 2);
    let head = history.newest().context("no events")?;
    assert_eq!(head.details.action, "Container moved to location");
    assert_eq!(
        head.changes().map(ToString::to_string).as_deref(),
        Some("status changed from 'New' to 'Yard A'")
    );
    Ok(())
}

#[tokio::test]
async fn delivery_gate_blocks_incomplete_update() -> anyhow::Result<()> {
    let (service, _dir) = service()?;
    intake(&service).await?;
    service.move_to_location(NUMBER, "Yard A").await?;
    service.mark_loaded(NUMBER).await?;

    let before = service.container(NUMBER).await?.context("container missing")?;
    let proposed = before
        .clone()
        .set_status(KnownStatus::AllGoodBookForDelivery.into())
        .set_truck("")
        .set_chassis("CH-1")
        .set_seal("S-42")
        .set_gross_weight(24_500.0);

    let err = service.update_container(NUMBER, proposed).await.unwrap_err();
    assert!(matches!(
        err,
        YardError::ValidationFailed(ValidationError::MissingDeliveryFields(ref fields))
            if fields == &vec![Field::Truck]
    ));

    assert_eq!(service.container(NUMBER).await?, Some(before));
    assert_eq!(service.history(NUMBER).await?.len(), 3);
    Ok(())
}

#[tokio::test]
async fn identical_update_records_nothing() -> anyhow::Result<()> {
    let (service, _dir) = service()?;
    intake(&service).await?;
    service.move_to_location(NUMBER, "Yard A").await?;
    service.mark_loaded(NUMBER).await?;

    let stored = service.container(NUMBER).await?.context("container missing")?;
    let outcome = service
        .execute(Command::Update {
            id: NUMBER.into(),
            proposed: stored.clone(),
        })
        .await?;

    assert_eq!(outcome, Outcome::Unchanged(stored));
    assert_eq!(service.history(NUMBER).await?.len(), 3);
    Ok(())
}

#[tokio::test]
async fn assign_driver_then_accept_archives() -> anyhow::Result<()> {
    let (service, _dir) = service()?;
    ready_for_delivery(&service).await?;

    let assigned = service.assign_driver(NUMBER, "Jane Doe").await?;
    assert_eq!(assigned.status.label(), "Assigned to Driver - Jane Doe");
    assert_eq!(assigned.delivery_driver, "Jane Doe");

    let head = service.history(NUMBER).await?;
    let changes = head.newest().and_then(|e| e.changes()).context("no diff")?;
    assert!(changes.get(Field::Status).is_some());
    assert!(changes.get(Field::DeliveryDriver).is_some());

    let events_before = service.history(NUMBER).await?.len();
    let outcome = service.pier_response(NUMBER, true).await?;
    let Outcome::Archived(record) = outcome else {
        anyhow::bail!("expected the container to be archived");
    };

    assert_eq!(record.snapshot.status, Status::Known(KnownStatus::PierAccepted));
    assert!(record.verify()?);
    assert!(service.container(NUMBER).await?.is_none());
    assert_eq!(service.archived(NUMBER).await?, vec![record]);

    // earlier events survive, one more describes the archival
    let history = service.history(NUMBER).await?;
    assert_eq!(history.len(), events_before + 1);
    assert_eq!(
        history.newest().map(|e| e.details.action.as_str()),
        Some("Pier Accepted & Archived")
    );
    Ok(())
}

#[tokio::test]
async fn pier_denial_is_an_ordinary_update() -> anyhow::Result<()> {
    let (service, _dir) = service()?;
    ready_for_delivery(&service).await?;
    service.assign_driver(NUMBER, "Jane Doe").await?;

    let outcome = service.pier_response(NUMBER, false).await?;
    let container = outcome.into_container().context("container missing")?;
    assert_eq!(container.status, Status::denied());
    assert!(service.archive().await?.is_empty());

    // denial is undoable and restores the composite status
    let reverted = service.undo_last(NUMBER).await?;
    assert_eq!(reverted.status, Status::AssignedToDriver("Jane Doe".into()));
    Ok(())
}

#[tokio::test]
async fn guards_refuse_out_of_order_transitions() -> anyhow::Result<()> {
    let (service, _dir) = service()?;
    intake(&service).await?;

    let err = service.mark_loaded(NUMBER).await.unwrap_err();
    assert!(matches!(
        err,
        YardError::IllegalTransition { operation: TransitionKind::MarkLoaded, ref status } if status == "New"
    ));
    assert!(service.assign_driver(NUMBER, "Jane Doe").await.is_err());
    assert!(service.pier_response(NUMBER, true).await.is_err());
    assert_eq!(service.history(NUMBER).await?.len(), 1);

    assert_eq!(
        service.legal_transitions(NUMBER).await?,
        vec![TransitionKind::MoveToLocation, TransitionKind::Delete]
    );
    Ok(())
}

#[tokio::test]
async fn undo_walks_back_one_event_at_a_time() -> anyhow::Result<()> {
    let (service, _dir) = service()?;
    intake(&service).await?;
    service.move_to_location(NUMBER, "Yard A").await?;
    service.mark_loaded(NUMBER).await?;
    let after_first = service.container(NUMBER).await?.context("container missing")?;

    let proposed = after_first
        .clone()
        .set_status(KnownStatus::NeedsWelding.into())
        .set_seal("S-1");
    service.update_container(NUMBER, proposed).await?;
    let proposed = service
        .container(NUMBER)
        .await?
        .context("container missing")?
        .set_status(KnownStatus::InWorkshop.into())
        .set_holes_before_squish(true)
        .set_gross_weight(19_000.5);
    service.update_container(NUMBER, proposed).await?;

    // created, moved, loaded + two updates
    assert_eq!(service.history(NUMBER).await?.len(), 5);

    service.undo_last(NUMBER).await?;
    let reverted = service.undo_last(NUMBER).await?;

    let mut expected = after_first;
    expected.last_update = reverted.last_update;
    assert_eq!(reverted, expected);
    assert_eq!(service.history(NUMBER).await?.len(), 3);
    Ok(())
}

#[tokio::test]
async fn undo_refuses_the_creation_event() -> anyhow::Result<()> {
    let (service, _dir) = service()?;
    intake(&service).await?;
    let before = service.container(NUMBER).await?;

    let err = service.undo_last(NUMBER).await.unwrap_err();
    assert!(matches!(err, YardError::Unrevertable(UndoRefusal::CreationEvent)));
    assert_eq!(service.container(NUMBER).await?, before);
    assert_eq!(service.history(NUMBER).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn delete_cascades_to_events() -> anyhow::Result<()> {
    let (service, _dir) = service()?;
    intake(&service).await?;
    service.move_to_location(NUMBER, "Yard B").await?;

    let removed = service.delete_container(NUMBER).await?;

    assert_eq!(removed, 2);
    assert!(service.container(NUMBER).await?.is_none());
    assert!(service.history(NUMBER).await?.is_empty());
    assert!(matches!(
        service.delete_container(NUMBER).await.unwrap_err(),
        YardError::NotFound(_)
    ));
    Ok(())
}

#[tokio::test]
async fn unknown_booking_is_recorded_as_not_applicable() -> anyhow::Result<()> {
    let (service, _dir) = service()?;

    let container = service.create_container("XYZ0000001", "BK404", Some(2200.0)).await?;

    assert_eq!(container.booked_for, "N/A");
    assert_eq!(container.tare_weight, 2200.0);
    Ok(())
}

#[tokio::test]
async fn missing_container_is_not_found() -> anyhow::Result<()> {
    let (service, _dir) = service()?;

    let err = service.move_to_location("NOPE1", "Yard A").await.unwrap_err();
    assert!(matches!(err, YardError::NotFound(ref id) if id == "NOPE1"));
    Ok(())
}

#[tokio::test]
async fn subscriptions_follow_the_lifecycle() -> anyhow::Result<()> {
    let (service, _dir) = service()?;
    let mut in_yard = service.subscribe_search("abc");
    let mut history = service.subscribe_history(NUMBER);

    assert_eq!(in_yard.recv().await, Some(vec![]));
    assert_eq!(history.recv().await, Some(vec![]));

    intake(&service).await?;
    let snapshot = in_yard.recv().await.context("feed closed")?;
    assert_eq!(snapshot.len(), 1);
    assert_eq!(history.recv().await.map(|events| events.len()), Some(1));

    service.move_to_location(NUMBER, "Yard A").await?;
    let snapshot = in_yard.recv().await.context("feed closed")?;
    assert_eq!(snapshot[0].status.label(), "Yard A");
    let events = history.recv().await.context("feed closed")?;
    assert_eq!(events.len(), 2);
    assert_eq!(
        events[0].changes().and_then(|c| c.get(Field::Status)).map(|c| c.new.clone()),
        Some(FieldValue::Text("Yard A".into()))
    );
    Ok(())
}

#[tokio::test]
async fn concurrent_clerks_never_interleave_partial_writes() -> anyhow::Result<()> {
    let (service, _dir) = service()?;
    intake(&service).await?;
    service.move_to_location(NUMBER, "Yard A").await?;
    service.mark_loaded(NUMBER).await?;
    let service = Arc::new(service);

    let mut handles = Vec::new();
    for n in 0..8 {
        let service = Arc::clone(&service);
        handles.push(tokio::spawn(async move {
            let proposed = service
                .container(NUMBER)
                .await?
                .ok_or_else(|| YardError::NotFound(NUMBER.into()))?
                .set_seal(&format!("S-{n}"));
            service.update_container(NUMBER, proposed).await
        }));
    }
    for handle in handles {
        handle.await??;
    }

    // every committed update carries its event
    let history = service.history(NUMBER).await?;
    assert!(history.is_well_formed());
    let stored = service.container(NUMBER).await?.context("container missing")?;
    let head = history.newest().and_then(|e| e.changes()).context("no diff")?;
    assert!(stored.seal.starts_with("S-"));
    assert!(head.get(Field::Seal).is_some());
    Ok(())
}

#[tokio::test]
async fn move_only_targets_registered_locations() -> anyhow::Result<()> {
    let (service, _dir) = service()?;
    intake(&service).await?;

    for target in ["Lot 9", "ALL GOOD, BOOK FOR DELIVERY", "Assigned to Driver - Nobody"] {
        let err = service.move_to_location(NUMBER, target).await.unwrap_err();
        assert!(
            matches!(err, YardError::ValidationFailed(ValidationError::UnknownLocation(_))),
            "{target}: {err}"
        );
    }

    let container = service.container(NUMBER).await?.context("container missing")?;
    assert_eq!(container.status, Status::Known(KnownStatus::New));
    assert_eq!(service.history(NUMBER).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn assign_requires_a_registered_driver() -> anyhow::Result<()> {
    let (service, _dir) = service()?;
    ready_for_delivery(&service).await?;

    let err = service.assign_driver(NUMBER, "Nobody").await.unwrap_err();
    assert!(matches!(
        err,
        YardError::ValidationFailed(ValidationError::UnknownDriver(ref name)) if name == "Nobody"
    ));
    Ok(())
}

#[tokio::test]
async fn non_finite_weights_are_refused() -> anyhow::Result<()> {
    let (service, _dir) = service()?;
    intake(&service).await?;
    service.move_to_location(NUMBER, "Yard A").await?;
    service.mark_loaded(NUMBER).await?;
    let events_before = service.history(NUMBER).await?.len();

    let proposed = service
        .container(NUMBER)
        .await?
        .context("container missing")?
        .set_gross_weight(f64::NAN);
    let err = service.update_container(NUMBER, proposed).await.unwrap_err();

    assert!(matches!(
        err,
        YardError::ValidationFailed(ValidationError::NonFiniteNumber(Field::GrossWeight))
    ));
    assert_eq!(service.history(NUMBER).await?.len(), events_before);
    Ok(())
}

#[tokio::test]
async fn stale_undo_cannot_revive_an_archived_container() -> anyhow::Result<()> {
    let (service, _dir) = service()?;
    ready_for_delivery(&service).await?;
    service.assign_driver(NUMBER, "Jane Doe").await?;

    // one clerk plans an undo, another accepts at the pier before it commits
    let current = service.container(NUMBER).await?.context("container missing")?;
    let log = service.history(NUMBER).await?;
    let planned = yard_tracker::undo::plan_undo(&current, &log, yard_tracker::TimeStamp::new())?;

    service.pier_response(NUMBER, true).await?;
    let err = service.store().commit(planned.batch).await.unwrap_err();

    assert!(matches!(err, YardError::NotFound(ref id) if id == NUMBER));
    assert!(service.container(NUMBER).await?.is_none());
    assert_eq!(service.archived(NUMBER).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn concurrent_undos_consume_one_event() -> anyhow::Result<()> {
    let (service, _dir) = service()?;
    intake(&service).await?;
    service.move_to_location(NUMBER, "Yard A").await?;
    service.mark_loaded(NUMBER).await?;

    let current = service.container(NUMBER).await?.context("container missing")?;
    let log = service.history(NUMBER).await?;
    let stale = yard_tracker::undo::plan_undo(&current, &log, yard_tracker::TimeStamp::new())?;

    let reverted = service.undo_last(NUMBER).await?;
    let err = service.store().commit(stale.batch).await.unwrap_err();

    assert!(matches!(err, YardError::Conflict(ref id) if id == NUMBER));
    assert_eq!(service.container(NUMBER).await?, Some(reverted));
    assert_eq!(service.history(NUMBER).await?.len(), 2);
    Ok(())
}
