//! Container, booking and archive records
use super::error::{Result, ValidationError, YardError};
use super::status::Status;
use super::utils;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::cmp::Ordering;

/// Label stored in `booked_for` when the selected booking cannot be resolved.
pub const UNRESOLVED_BOOKING_TYPE: &str = "N/A";

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct TimeStamp<T: TimeZone>(DateTime<T>)
where
    T::Offset: Copy;

impl TimeStamp<Utc> {
    pub fn new() -> Self {
        Self(Utc::now())
    }
    pub fn new_with(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Self {
        Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
            .single()
            .unwrap_or_default()
            .into()
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
    /// The smallest representable step after this instant.
    pub fn next_tick(&self) -> Self {
        Self(self.0 + Duration::nanoseconds(1))
    }
    pub fn as_nanos(&self) -> i64 {
        self.0.timestamp_nanos_opt().unwrap_or(i64::MAX)
    }
}

impl PartialOrd for TimeStamp<Utc> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimeStamp<Utc> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl Default for TimeStamp<Utc> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TimeZone> From<DateTime<T>> for TimeStamp<T>
where
    T::Offset: Copy,
{
    fn from(value: DateTime<T>) -> Self {
        TimeStamp(value)
    }
}

impl<C> minicbor::Encode<C> for TimeStamp<Utc> {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> std::result::Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp<Utc> {
    fn decode(
        d: &mut minicbor::Decoder<'b>,
        _: &mut C,
    ) -> std::result::Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

/// The canonical record of a container in the active yard.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct Container {
    #[n(0)]
    pub id: String, // upper-cased container number, never changes
    #[n(1)]
    pub status: Status,
    #[n(2)]
    pub booking: String,
    #[n(3)]
    pub booked_for: String, // container type copied from the booking at intake
    #[n(4)]
    pub truck: String,
    #[n(5)]
    pub delivery_driver: String,
    #[n(6)]
    pub chassis: String,
    #[n(7)]
    pub seal: String,
    #[n(8)]
    pub gross_weight: f64,
    #[n(9)]
    pub tare_weight: f64,
    #[n(10)]
    pub has_holes_before_squish: bool,
    #[n(11)]
    pub has_holes_after_squish: bool,
    #[n(12)]
    pub last_update: TimeStamp<Utc>,
}

impl Container {
    /// A freshly received container: status `New`, every other field zeroed.
    pub fn intake(id: &str, booking: &str, booked_for: &str, last_update: TimeStamp<Utc>) -> Self {
        Self {
            id: id.to_string(),
            status: Status::new_intake(),
            booking: booking.to_string(),
            booked_for: booked_for.to_string(),
            truck: String::new(),
            delivery_driver: String::new(),
            chassis: String::new(),
            seal: String::new(),
            gross_weight: 0.0,
            tare_weight: 0.0,
            has_holes_before_squish: false,
            has_holes_after_squish: false,
            last_update,
        }
    }
    pub fn set_status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }
    pub fn set_truck(mut self, truck: &str) -> Self {
        self.truck = truck.to_string();
        self
    }
    pub fn set_delivery_driver(mut self, driver: &str) -> Self {
        self.delivery_driver = driver.to_string();
        self
    }
    pub fn set_chassis(mut self, chassis: &str) -> Self {
        self.chassis = chassis.to_string();
        self
    }
    pub fn set_seal(mut self, seal: &str) -> Self {
        self.seal = seal.to_string();
        self
    }
    pub fn set_gross_weight(mut self, weight: f64) -> Self {
        self.gross_weight = weight;
        self
    }
    pub fn set_tare_weight(mut self, weight: f64) -> Self {
        self.tare_weight = weight;
        self
    }
    pub fn set_holes_before_squish(mut self, holes: bool) -> Self {
        self.has_holes_before_squish = holes;
        self
    }
    pub fn set_holes_after_squish(mut self, holes: bool) -> Self {
        self.has_holes_after_squish = holes;
        self
    }

    /// Case-insensitive match on container number, booking, truck and type.
    pub fn matches_search(&self, term: &str) -> bool {
        let term = term.trim().to_lowercase();
        if term.is_empty() {
            return true;
        }
        [&self.id, &self.booking, &self.truck, &self.booked_for]
            .iter()
            .any(|value| value.to_lowercase().contains(&term))
    }
}

/// Merge patch over a [`Container`]; `None` leaves the stored value untouched.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Default, PartialEq)]
pub struct ContainerPatch {
    #[n(0)]
    pub status: Option<Status>,
    #[n(1)]
    pub booking: Option<String>,
    #[n(2)]
    pub booked_for: Option<String>,
    #[n(3)]
    pub truck: Option<String>,
    #[n(4)]
    pub delivery_driver: Option<String>,
    #[n(5)]
    pub chassis: Option<String>,
    #[n(6)]
    pub seal: Option<String>,
    #[n(7)]
    pub gross_weight: Option<f64>,
    #[n(8)]
    pub tare_weight: Option<f64>,
    #[n(9)]
    pub has_holes_before_squish: Option<bool>,
    #[n(10)]
    pub has_holes_after_squish: Option<bool>,
    #[n(11)]
    pub last_update: Option<TimeStamp<Utc>>,
}

impl ContainerPatch {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn status(mut self, status: Status) -> Self {
        self.status = Some(status);
        self
    }
    pub fn touched(mut self, at: TimeStamp<Utc>) -> Self {
        self.last_update = Some(at);
        self
    }
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn apply(&self, container: &mut Container) {
        if let Some(status) = &self.status {
            container.status = status.clone();
        }
        if let Some(booking) = &self.booking {
            container.booking = booking.clone();
        }
        if let Some(booked_for) = &self.booked_for {
            container.booked_for = booked_for.clone();
        }
        if let Some(truck) = &self.truck {
            container.truck = truck.clone();
        }
        if let Some(driver) = &self.delivery_driver {
            container.delivery_driver = driver.clone();
        }
        if let Some(chassis) = &self.chassis {
            container.chassis = chassis.clone();
        }
        if let Some(seal) = &self.seal {
            container.seal = seal.clone();
        }
        if let Some(weight) = self.gross_weight {
            container.gross_weight = weight;
        }
        if let Some(weight) = self.tare_weight {
            container.tare_weight = weight;
        }
        if let Some(holes) = self.has_holes_before_squish {
            container.has_holes_before_squish = holes;
        }
        if let Some(holes) = self.has_holes_after_squish {
            container.has_holes_after_squish = holes;
        }
        if let Some(at) = self.last_update {
            container.last_update = at;
        }
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct Booking {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub quantity: u32,
    #[n(2)]
    pub container_type: String,
    #[n(3)]
    pub created_at: TimeStamp<Utc>,
}

impl Booking {
    /// Checks every field is present and normalises the id.
    pub fn new(id: &str, quantity: u32, container_type: &str) -> Result<Self> {
        let id = utils::normalise_key(id);
        if id.is_empty() {
            return Err(ValidationError::BookingIncomplete("id").into());
        }
        if quantity == 0 {
            return Err(ValidationError::BookingIncomplete("quantity").into());
        }
        if container_type.trim().is_empty() {
            return Err(ValidationError::BookingIncomplete("type").into());
        }

        Ok(Self {
            id,
            quantity,
            container_type: container_type.trim().to_string(),
            created_at: TimeStamp::new(),
        })
    }
}

/// Frozen copy of a container that was accepted at the pier.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct ArchiveRecord {
    #[n(0)]
    pub snapshot: Container, // status is always `Pier Accepted`
    #[n(1)]
    pub archived_at: TimeStamp<Utc>,
    #[n(2)]
    pub digest: String, // sha256 over the CBOR encoding of `snapshot`
}

impl ArchiveRecord {
    pub fn seal(mut snapshot: Container, archived_at: TimeStamp<Utc>) -> Result<Self> {
        snapshot.status = Status::pier_accepted();
        let digest = sha256::digest(minicbor::to_vec(&snapshot)?);

        Ok(Self {
            snapshot,
            archived_at,
            digest,
        })
    }
    pub fn container_id(&self) -> &str {
        &self.snapshot.id
    }
    /// Recomputes the snapshot digest and compares it with the stored one.
    pub fn verify(&self) -> Result<bool> {
        let contents = minicbor::to_vec(&self.snapshot)?;
        Ok(sha256::digest(contents) == self.digest)
    }
    pub fn storage_key(&self) -> String {
        format!("{}/{:020}", self.snapshot.id, self.archived_at.as_nanos())
    }
}

pub(crate) fn decode_container(bytes: &[u8]) -> Result<Container> {
    minicbor::decode(bytes).map_err(YardError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::KnownStatus;

    fn sample() -> Container {
        Container::intake("ABC1234567", "BK1", "40ft", TimeStamp::new_with(2024, 6, 1, 8, 0, 0))
    }

    #[test]
    fn timestamp_encoding() {
        let original = TimeStamp::new();

        let encoding = minicbor::to_vec(original).unwrap();
        let decode: TimeStamp<Utc> = minicbor::decode(&encoding).unwrap();

        assert_eq!(original, decode);
    }

    #[test]
    fn intake_zeroes_everything_but_identity() {
        let container = sample();

        assert_eq!(container.status, Status::Known(KnownStatus::New));
        assert_eq!(container.gross_weight, 0.0);
        assert_eq!(container.tare_weight, 0.0);
        assert!(!container.has_holes_before_squish);
        assert!(!container.has_holes_after_squish);
        assert!(container.truck.is_empty());
    }

    #[test]
    fn container_cbor_roundtrip_keeps_composite_status() {
        let container = sample()
            .set_status(Status::AssignedToDriver("Jane Doe".into()))
            .set_gross_weight(24_500.5);

        let bytes = minicbor::to_vec(&container).unwrap();
        let decoded = decode_container(&bytes).unwrap();

        assert_eq!(container, decoded);
    }

    #[test]
    fn patch_only_touches_specified_fields() {
        let mut container = sample().set_truck("T-9");
        let patch = ContainerPatch::new().status(Status::Custom("Yard A".into()));

        patch.apply(&mut container);

        assert_eq!(container.status.label(), "Yard A");
        assert_eq!(container.truck, "T-9");
        assert_eq!(container.booking, "BK1");
    }

    #[test]
    fn search_is_case_insensitive() {
        let container = sample().set_truck("Blue Mack");

        assert!(container.matches_search("abc12"));
        assert!(container.matches_search("bk1"));
        assert!(container.matches_search("MACK"));
        assert!(container.matches_search("40FT"));
        assert!(!container.matches_search("reefer"));
        assert!(container.matches_search("  "));
    }

    #[test]
    fn booking_requires_every_field() {
        assert!(matches!(
            Booking::new(" ", 1, "40ft"),
            Err(YardError::ValidationFailed(ValidationError::BookingIncomplete("id")))
        ));
        assert!(matches!(
            Booking::new("bk1", 0, "40ft"),
            Err(YardError::ValidationFailed(ValidationError::BookingIncomplete("quantity")))
        ));
        let booking = Booking::new("bk1", 2, "40ft").unwrap();
        assert_eq!(booking.id, "BK1");
    }

    #[test]
    fn archive_record_is_sealed_and_verifiable() {
        let record = ArchiveRecord::seal(
            sample().set_status(Status::AssignedToDriver("Jane Doe".into())),
            TimeStamp::new(),
        )
        .unwrap();

        assert_eq!(record.snapshot.status, Status::Known(KnownStatus::PierAccepted));
        assert!(record.verify().unwrap());

        let mut tampered = record.clone();
        tampered.snapshot.seal = "forged".into();
        assert!(!tampered.verify().unwrap());
    }
}
