//! Property-based tests for the change set codec
//!
//! Every diffable field must survive both directions: the structured change
//! set inverted onto the newer record, and the free-text rendering read back
//! with `parse_legacy`.

use proptest::prelude::*;
use yard_tracker::{ChangeSet, Container, Field, FieldChange, FieldValue, KnownStatus, Status, TimeStamp};

// quotes and the clause separator are the only things the text form cannot carry
fn text() -> impl Strategy<Value = String> {
    "[A-Za-z0-9 ,()-]{0,16}"
}

fn weight() -> impl Strategy<Value = f64> {
    prop_oneof![Just(0.0), -1.0e9..1.0e9f64]
}

fn status() -> impl Strategy<Value = Status> {
    prop_oneof![
        prop::sample::select(KnownStatus::all().collect::<Vec<_>>()).prop_map(Status::Known),
        "[A-Za-z ]{1,12}".prop_map(|name| Status::from_label(name.trim())),
        "[A-Za-z]{1,12}".prop_map(Status::AssignedToDriver),
    ]
}

prop_compose! {
    fn container()(
        status in status(),
        booking in text(),
        truck in text(),
        driver in text(),
        chassis in text(),
        seal in text(),
        gross in weight(),
        tare in weight(),
        before in any::<bool>(),
        after in any::<bool>(),
    ) -> Container {
        Container::intake("ABC1234567", &booking, "40ft", TimeStamp::new_with(2024, 1, 1, 0, 0, 0))
            .set_status(status)
            .set_truck(&truck)
            .set_delivery_driver(&driver)
            .set_chassis(&chassis)
            .set_seal(&seal)
            .set_gross_weight(gross)
            .set_tare_weight(tare)
            .set_holes_before_squish(before)
            .set_holes_after_squish(after)
    }
}

proptest! {
    /// Property: applying the inverse patch to the newer record restores the older one
    #[test]
    fn prop_inverse_patch_restores_old_record(old in container(), new in container()) {
        let changes = ChangeSet::between(&old, &new);

        let mut reverted = new.clone();
        changes.inverse_patch().apply(&mut reverted);
        reverted.last_update = old.last_update;

        prop_assert_eq!(reverted, old);
    }

    /// Property: the forward patch turns the older record into the newer one
    #[test]
    fn prop_forward_patch_reaches_new_record(old in container(), new in container()) {
        let mut patched = old.clone();
        ChangeSet::between(&old, &new).forward_patch().apply(&mut patched);
        patched.last_update = new.last_update;

        prop_assert_eq!(patched, new);
    }

    /// Property: the free-text form parses back to the same typed values,
    /// including empty strings
    #[test]
    fn prop_text_form_round_trips(
        seal in (text(), text()),
        gross in (weight(), weight()),
        holes in (any::<bool>(), any::<bool>()),
    ) {
        let changes: ChangeSet = [
            FieldChange::new(Field::Seal, FieldValue::Text(seal.0), FieldValue::Text(seal.1)),
            FieldChange::new(Field::GrossWeight, FieldValue::Number(gross.0), FieldValue::Number(gross.1)),
            FieldChange::new(Field::HasHolesAfterSquish, FieldValue::Flag(holes.0), FieldValue::Flag(holes.1)),
        ]
        .into_iter()
        .collect();

        let parsed = ChangeSet::parse_legacy(&changes.to_string());

        prop_assert_eq!(parsed, changes);
    }

    /// Property: identical records never produce a change
    #[test]
    fn prop_identical_records_have_no_changes(record in container()) {
        let mut touched = record.clone();
        touched.last_update = TimeStamp::new();

        prop_assert!(ChangeSet::between(&record, &touched).is_empty());
    }
}
