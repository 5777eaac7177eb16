use std::fmt::Debug;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveTime};
use num_derive::FromPrimitive;
use serde::Deserialize;

use crate::store::registry::{RouteId, StationId};
use crate::vehicle::VehicleId;

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TripId(pub i64);
impl Debug for TripId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("t#{}", self.0))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    Morning = 0,
    Evening = 1,
}

impl Period {
    pub fn as_str(self) -> &'static str {
        match self {
            Period::Morning => "morning",
            Period::Evening => "evening",
        }
    }
}

impl FromStr for Period {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "morning" => Ok(Period::Morning),
            "evening" => Ok(Period::Evening),
            other => Err(format!("unknown period: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
pub enum TripStatus {
    Scheduled = 0,
    InProgress = 1,
    Completed = 2,
    Cancelled = 3,
}

impl TripStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TripStatus::Scheduled => "scheduled",
            TripStatus::InProgress => "in_progress",
            TripStatus::Completed => "completed",
            TripStatus::Cancelled => "cancelled",
        }
    }

    /// Whether tickets may still be created on the trip.
    pub fn is_open(self) -> bool {
        matches!(self, TripStatus::Scheduled | TripStatus::InProgress)
    }

    /// Status transitions only move forward; the two terminal states are
    /// never left again.
    pub fn can_advance_to(self, to: TripStatus) -> bool {
        match self {
            TripStatus::Scheduled => matches!(
                to,
                TripStatus::InProgress | TripStatus::Completed | TripStatus::Cancelled
            ),
            TripStatus::InProgress => {
                matches!(to, TripStatus::Completed | TripStatus::Cancelled)
            }
            TripStatus::Completed | TripStatus::Cancelled => false,
        }
    }
}

impl FromStr for TripStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(TripStatus::Scheduled),
            "in_progress" => Ok(TripStatus::InProgress),
            "completed" => Ok(TripStatus::Completed),
            "cancelled" => Ok(TripStatus::Cancelled),
            other => Err(format!("unknown trip status: {other}")),
        }
    }
}

/// The natural key of a trip. Several departures of the same route at the
/// same date and time are disambiguated by `departure_index`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TripKey {
    pub station: StationId,
    pub route: RouteId,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub period: Period,
    pub departure_index: u32,
}

#[derive(Debug, Clone)]
pub struct TripRow {
    pub id: TripId,
    pub key: TripKey,
    pub vehicle: Option<VehicleId>,
    pub status: TripStatus,
}
