//! Field-level change sets between two versions of a container
//!
//! Events store a structured [`ChangeSet`]: one typed `(field, old, new)`
//! triple per field that differs. The human readable form
//! `"<field> changed from '<old>' to '<new>'; ..."` is produced by
//! `Display` and can be read back with [`ChangeSet::parse_legacy`].

use super::container::{Container, ContainerPatch};
use super::status::Status;
use std::fmt;
use tracing::warn;

const CLAUSE_SEPARATOR: &str = "; ";
const FROM_MARKER: &str = " changed from '";
const TO_MARKER: &str = "' to '";

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    #[n(0)]
    Status,
    #[n(1)]
    Booking,
    #[n(2)]
    BookedFor,
    #[n(3)]
    Truck,
    #[n(4)]
    DeliveryDriver,
    #[n(5)]
    Chassis,
    #[n(6)]
    Seal,
    #[n(7)]
    GrossWeight,
    #[n(8)]
    TareWeight,
    #[n(9)]
    HasHolesBeforeSquish,
    #[n(10)]
    HasHolesAfterSquish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Number,
    Flag,
}

impl Field {
    /// Every diffable field, in declaration order. Identity and `last_update` are not diffed.
    pub const ALL: [Field; 11] = [
        Field::Status,
        Field::Booking,
        Field::BookedFor,
        Field::Truck,
        Field::DeliveryDriver,
        Field::Chassis,
        Field::Seal,
        Field::GrossWeight,
        Field::TareWeight,
        Field::HasHolesBeforeSquish,
        Field::HasHolesAfterSquish,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Field::Status => "status",
            Field::Booking => "booking",
            Field::BookedFor => "bookedFor",
            Field::Truck => "truck",
            Field::DeliveryDriver => "deliveryDriver",
            Field::Chassis => "chassis",
            Field::Seal => "seal",
            Field::GrossWeight => "grossWeight",
            Field::TareWeight => "tareWeight",
            Field::HasHolesBeforeSquish => "hasHolesBeforeSquish",
            Field::HasHolesAfterSquish => "hasHolesAfterSquish",
        }
    }

    pub fn from_name(name: &str) -> Option<Field> {
        let name = name.trim();
        Field::ALL
            .into_iter()
            .find(|f| f.name().eq_ignore_ascii_case(name))
    }

    pub fn kind(self) -> FieldKind {
        match self {
            Field::GrossWeight | Field::TareWeight => FieldKind::Number,
            Field::HasHolesBeforeSquish | Field::HasHolesAfterSquish => FieldKind::Flag,
            _ => FieldKind::Text,
        }
    }

    pub fn read(self, container: &Container) -> FieldValue {
        match self {
            Field::Status => FieldValue::Text(container.status.label()),
            Field::Booking => FieldValue::Text(container.booking.clone()),
            Field::BookedFor => FieldValue::Text(container.booked_for.clone()),
            Field::Truck => FieldValue::Text(container.truck.clone()),
            Field::DeliveryDriver => FieldValue::Text(container.delivery_driver.clone()),
            Field::Chassis => FieldValue::Text(container.chassis.clone()),
            Field::Seal => FieldValue::Text(container.seal.clone()),
            Field::GrossWeight => FieldValue::Number(container.gross_weight),
            Field::TareWeight => FieldValue::Number(container.tare_weight),
            Field::HasHolesBeforeSquish => FieldValue::Flag(container.has_holes_before_squish),
            Field::HasHolesAfterSquish => FieldValue::Flag(container.has_holes_after_squish),
        }
    }

    /// Sets this field on `patch`, coercing `value` to the field's kind.
    pub fn write(self, value: &FieldValue, patch: &mut ContainerPatch) {
        let value = value.coerce(self.kind());
        match self {
            Field::Status => patch.status = Some(Status::from_label(&value.to_string())),
            Field::Booking => patch.booking = Some(value.to_string()),
            Field::BookedFor => patch.booked_for = Some(value.to_string()),
            Field::Truck => patch.truck = Some(value.to_string()),
            Field::DeliveryDriver => patch.delivery_driver = Some(value.to_string()),
            Field::Chassis => patch.chassis = Some(value.to_string()),
            Field::Seal => patch.seal = Some(value.to_string()),
            Field::GrossWeight => patch.gross_weight = value.as_number(),
            Field::TareWeight => patch.tare_weight = value.as_number(),
            Field::HasHolesBeforeSquish => patch.has_holes_before_squish = value.as_flag(),
            Field::HasHolesAfterSquish => patch.has_holes_after_squish = value.as_flag(),
        }
    }

    pub fn list(fields: &[Field]) -> String {
        fields
            .iter()
            .map(|f| f.name())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub enum FieldValue {
    #[n(0)]
    Text(#[n(0)] String),
    #[n(1)]
    Number(#[n(0)] f64),
    #[n(2)]
    Flag(#[n(0)] bool),
}

impl FieldValue {
    /// Best-effort conversion used when a stored value does not match the
    /// field's kind: flags compare against the literal `true`, numbers parse
    /// as floating point and fall back to 0.
    pub fn coerce(&self, kind: FieldKind) -> FieldValue {
        match (kind, self) {
            (FieldKind::Text, FieldValue::Text(_))
            | (FieldKind::Number, FieldValue::Number(_))
            | (FieldKind::Flag, FieldValue::Flag(_)) => self.clone(),
            (FieldKind::Text, other) => FieldValue::Text(other.to_string()),
            (kind, other) => FieldValue::from_raw(kind, &other.to_string()),
        }
    }

    pub fn from_raw(kind: FieldKind, raw: &str) -> FieldValue {
        match kind {
            FieldKind::Text => FieldValue::Text(raw.to_string()),
            FieldKind::Flag => FieldValue::Flag(raw == "true"),
            FieldKind::Number => FieldValue::Number(
                raw.trim()
                    .parse::<f64>()
                    .ok()
                    .filter(|n| n.is_finite())
                    .unwrap_or_else(|| {
                        warn!(raw, "unparseable number in change set, using 0");
                        0.0
                    }),
            ),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self {
            FieldValue::Flag(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::Number(n) => write!(f, "{n}"),
            FieldValue::Flag(b) => write!(f, "{b}"),
        }
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct FieldChange {
    #[n(0)]
    pub field: Field,
    #[n(1)]
    pub old: FieldValue,
    #[n(2)]
    pub new: FieldValue,
}

impl FieldChange {
    pub fn new(field: Field, old: FieldValue, new: FieldValue) -> Self {
        Self { field, old, new }
    }
}

impl fmt::Display for FieldChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{FROM_MARKER}{}{TO_MARKER}{}'",
            self.field, self.old, self.new
        )
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    #[n(0)]
    changes: Vec<FieldChange>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every field whose value differs between `old` and `new`.
    pub fn between(old: &Container, new: &Container) -> Self {
        let changes = Field::ALL
            .into_iter()
            .filter_map(|field| {
                let before = field.read(old);
                let after = field.read(new);
                (before != after).then(|| FieldChange::new(field, before, after))
            })
            .collect();

        Self { changes }
    }

    pub fn with(mut self, field: Field, old: FieldValue, new: FieldValue) -> Self {
        self.changes.push(FieldChange::new(field, old, new));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldChange> {
        self.changes.iter()
    }

    pub fn get(&self, field: Field) -> Option<&FieldChange> {
        self.changes.iter().find(|c| c.field == field)
    }

    /// Patch carrying the new values.
    pub fn forward_patch(&self) -> ContainerPatch {
        let mut patch = ContainerPatch::new();
        for change in &self.changes {
            change.field.write(&change.new, &mut patch);
        }
        patch
    }

    /// Patch restoring the old values.
    pub fn inverse_patch(&self) -> ContainerPatch {
        let mut patch = ContainerPatch::new();
        for change in &self.changes {
            change.field.write(&change.old, &mut patch);
        }
        patch
    }

    /// Decodes the free-text form. Clauses that do not match the
    /// `<field> changed from '<old>' to '<new>'` shape, or that name a field
    /// the container does not have, are skipped.
    pub fn parse_legacy(text: &str) -> Self {
        let changes = text
            .split(CLAUSE_SEPARATOR)
            .filter_map(|clause| {
                let (name, old, new) = split_clause(clause)?;
                let Some(field) = Field::from_name(name) else {
                    warn!(name, "skipping change for unknown field");
                    return None;
                };
                Some(FieldChange::new(
                    field,
                    FieldValue::from_raw(field.kind(), old),
                    FieldValue::from_raw(field.kind(), new),
                ))
            })
            .collect();

        Self { changes }
    }
}

// "<name> changed from '<old>' to '<new>'", old and new may be empty
fn split_clause(clause: &str) -> Option<(&str, &str, &str)> {
    let (name, rest) = clause.split_once(FROM_MARKER)?;
    let split = rest.rfind(TO_MARKER)?;
    let old = &rest[..split];
    let tail = &rest[split + TO_MARKER.len()..];
    let new = &tail[..tail.rfind('\'')?];

    Some((name, old, new))
}

impl fmt::Display for ChangeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, change) in self.changes.iter().enumerate() {
            if i > 0 {
                f.write_str(CLAUSE_SEPARATOR)?;
            }
            write!(f, "{change}")?;
        }
        Ok(())
    }
}

impl FromIterator<FieldChange> for ChangeSet {
    fn from_iter<I: IntoIterator<Item = FieldChange>>(iter: I) -> Self {
        Self {
            changes: iter.into_iter().collect(),
        }
    }
}
