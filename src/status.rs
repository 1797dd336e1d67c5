//! Container status labels and the option lists derived from them
//!
//! A status is either one of the canonical labels in [`KnownStatus`], the
//! composite driver assignment (`Assigned to Driver - <name>`), or any other
//! label (a yard location, or a legacy value) which is carried verbatim.

use std::fmt;

pub const ASSIGNED_TO_DRIVER: &str = "Assigned to Driver";
const ASSIGNED_SEPARATOR: &str = " - ";
const LOCATION_ICON: &str = "📍";
const DRIVER_ICON: &str = "👨‍✈️";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KnownStatus {
    New,
    InYard,
    OnFloor,
    NeedsWelding,
    NeedSquish,
    NeedSquishAndWelding,
    NeedsWeightAndSquish,
    NeedsEverything,
    InWorkshop,
    InShredTilter,
    InScaleTilter,
    InTrackTilter,
    AtCrane,
    WaitForUpdateFromOffice,
    BusyParkedAndWaiting,
    AllGoodBookForDelivery,
    LoadingComplete,
    EnRouteToPier,
    ReturnedEmpty,
    PierAccepted,
    Denied,
    ChassisNeedsRepair,
    DocsIssue,
    NuclearOnHold,
}

struct StatusEntry {
    status: KnownStatus,
    label: &'static str,
    icon: &'static str,
    is_update_option: bool,
    is_dispatch_option: bool,
}

const fn entry(
    status: KnownStatus,
    label: &'static str,
    icon: &'static str,
    is_update_option: bool,
    is_dispatch_option: bool,
) -> StatusEntry {
    StatusEntry {
        status,
        label,
        icon,
        is_update_option,
        is_dispatch_option,
    }
}

// display order of the option lists
static STATUS_TABLE: [StatusEntry; 24] = [
    entry(KnownStatus::New, "New", "🆕", false, false),
    entry(KnownStatus::InYard, "In Yard", "🏞️", false, false),
    entry(KnownStatus::OnFloor, "On Floor", "🏢", false, false),
    entry(KnownStatus::NeedsWelding, "NEEDS WELDING", "👨🏻‍🏭", true, true),
    entry(KnownStatus::NeedSquish, "NEED SQUISH", "🤛🏻💨", true, true),
    entry(KnownStatus::NeedSquishAndWelding, "NEED SQUISH AND WELDING", "🤛🏻💨👨🏻‍🏭", true, true),
    entry(KnownStatus::NeedsWeightAndSquish, "NEEDS WEIGHT AND SQUISH", "⚖️🤛🏻💨", true, true),
    entry(KnownStatus::NeedsEverything, "NEEDS EVERYTHING", "⚖️🤛🏻💨👨🏻‍🏭", true, true),
    entry(KnownStatus::InWorkshop, "IN WORKSHOP", "👨🏻‍🏭🏭", true, true),
    entry(KnownStatus::InShredTilter, "In Shred Tilter", "⚙️", false, false),
    entry(KnownStatus::InScaleTilter, "In Scale Tilter", "⚖️", false, false),
    entry(KnownStatus::InTrackTilter, "In Track Tilter", "🛤️", false, false),
    entry(KnownStatus::AtCrane, "At Crane", "🏗️", true, false),
    entry(KnownStatus::WaitForUpdateFromOffice, "WAIT FOR UPDATE FROM OFFICE", "⌛", true, true),
    entry(KnownStatus::BusyParkedAndWaiting, "Busy PARKED AND WAITING", "🔥", true, true),
    entry(KnownStatus::AllGoodBookForDelivery, "ALL GOOD, BOOK FOR DELIVERY", "👍🏻", true, true),
    entry(KnownStatus::LoadingComplete, "Loading Complete", "☑️", true, false),
    entry(KnownStatus::EnRouteToPier, "En Route to Pier", "🚛", true, false),
    entry(KnownStatus::ReturnedEmpty, "Returned Empty", "💨", false, false),
    entry(KnownStatus::PierAccepted, "Pier Accepted", "Y", false, false),
    entry(KnownStatus::Denied, "Denied", "🚫", false, false),
    entry(KnownStatus::ChassisNeedsRepair, "CHASSIS NEEDS REPAIR", "🛞", true, true),
    entry(KnownStatus::DocsIssue, "Docs Issue", "📝", false, false),
    entry(KnownStatus::NuclearOnHold, "Nuclear (On Hold)", "☢️", true, false),
];

impl KnownStatus {
    pub fn all() -> impl Iterator<Item = KnownStatus> {
        STATUS_TABLE.iter().map(|e| e.status)
    }
    fn entry(self) -> &'static StatusEntry {
        // the table holds every variant exactly once
        STATUS_TABLE
            .iter()
            .find(|e| e.status == self)
            .unwrap_or(&STATUS_TABLE[0])
    }
    pub fn label(self) -> &'static str {
        self.entry().label
    }
    pub fn icon(self) -> &'static str {
        self.entry().icon
    }
    pub fn is_update_option(self) -> bool {
        self.entry().is_update_option
    }
    pub fn is_dispatch_option(self) -> bool {
        self.entry().is_dispatch_option
    }
    pub fn from_label(label: &str) -> Option<Self> {
        STATUS_TABLE
            .iter()
            .find(|e| e.label == label)
            .map(|e| e.status)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Status {
    Known(KnownStatus),
    AssignedToDriver(String),
    /// A location name or any label outside the canonical table.
    Custom(String),
}

impl Status {
    pub fn new_intake() -> Self {
        Status::Known(KnownStatus::New)
    }
    pub fn pier_accepted() -> Self {
        Status::Known(KnownStatus::PierAccepted)
    }
    pub fn denied() -> Self {
        Status::Known(KnownStatus::Denied)
    }

    /// Total inverse of [`Status::label`].
    pub fn from_label(label: &str) -> Self {
        if let Some(rest) = label.strip_prefix(ASSIGNED_TO_DRIVER) {
            let name = rest.strip_prefix(ASSIGNED_SEPARATOR).unwrap_or(rest);
            if rest.is_empty() || rest.starts_with(ASSIGNED_SEPARATOR) {
                return Status::AssignedToDriver(name.to_string());
            }
        }
        match KnownStatus::from_label(label) {
            Some(known) => Status::Known(known),
            None => Status::Custom(label.to_string()),
        }
    }

    pub fn label(&self) -> String {
        match self {
            Status::Known(known) => known.label().to_string(),
            Status::AssignedToDriver(name) if name.is_empty() => ASSIGNED_TO_DRIVER.to_string(),
            Status::AssignedToDriver(name) => {
                format!("{ASSIGNED_TO_DRIVER}{ASSIGNED_SEPARATOR}{name}")
            }
            Status::Custom(label) => label.clone(),
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            Status::Known(known) => known.icon(),
            Status::AssignedToDriver(_) => DRIVER_ICON,
            Status::Custom(_) => LOCATION_ICON,
        }
    }

    pub fn is(&self, known: KnownStatus) -> bool {
        matches!(self, Status::Known(k) if *k == known)
    }

    pub fn is_assigned_to_driver(&self) -> bool {
        matches!(self, Status::AssignedToDriver(_))
    }

    pub fn is_update_option(&self) -> bool {
        matches!(self, Status::Known(k) if k.is_update_option())
    }

    pub fn is_dispatch_option(&self) -> bool {
        matches!(self, Status::Known(k) if k.is_dispatch_option())
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

impl From<KnownStatus> for Status {
    fn from(value: KnownStatus) -> Self {
        Status::Known(value)
    }
}

impl<C> minicbor::Encode<C> for Status {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.str(&self.label())?.ok()
    }
}

impl<'b, C> minicbor::Decode<'b, C> for Status {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        Ok(Status::from_label(d.str()?))
    }
}

/// One selectable entry of a status drop-down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusOption {
    pub status: Status,
    pub label: String,
    pub icon: &'static str,
    /// Present only because it is the current value.
    pub synthesized: bool,
}

impl StatusOption {
    fn of(status: Status, synthesized: bool) -> Self {
        Self {
            label: status.label(),
            icon: status.icon(),
            status,
            synthesized,
        }
    }
}

fn options_with_current(current: &Status, include: fn(KnownStatus) -> bool) -> Vec<StatusOption> {
    let mut options: Vec<StatusOption> = KnownStatus::all()
        .filter(|k| include(*k))
        .map(|k| StatusOption::of(Status::Known(k), false))
        .collect();

    if !options.iter().any(|o| o.status == *current) {
        options.insert(0, StatusOption::of(current.clone(), true));
    }
    options
}

/// Statuses a clerk may pick when free-editing, current value first if absent.
pub fn update_options(current: &Status) -> Vec<StatusOption> {
    options_with_current(current, KnownStatus::is_update_option)
}

/// Statuses offered by the constrained dispatch form, current value first if absent.
pub fn dispatch_options(current: &Status) -> Vec<StatusOption> {
    options_with_current(current, KnownStatus::is_dispatch_option)
}
