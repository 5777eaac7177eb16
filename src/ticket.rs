use std::fmt::Debug;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use num_derive::FromPrimitive;
use serde::Deserialize;

use crate::primitives::{Amount, SeatNumber};
use crate::store::registry::DestinationId;
use crate::trip::{Period, TripId};

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TicketId(pub i64);
impl Debug for TicketId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("tk#{}", self.0))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
pub enum TicketStatus {
    Reserved = 0,
    Paid = 1,
    /// Terminal. The seat is released, the amount zeroed, and a successor
    /// ticket exists on another trip.
    Transferred = 2,
}

impl TicketStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TicketStatus::Reserved => "reserved",
            TicketStatus::Paid => "paid",
            TicketStatus::Transferred => "transferred",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash = 0,
    Wave = 1,
    OrangeMoney = 2,
    MtnMoney = 3,
    MoovMoney = 4,
}

impl PaymentMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Wave => "wave",
            PaymentMethod::OrangeMoney => "orange_money",
            PaymentMethod::MtnMoney => "mtn_money",
            PaymentMethod::MoovMoney => "moov_money",
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cash" => Ok(PaymentMethod::Cash),
            "wave" => Ok(PaymentMethod::Wave),
            "orange_money" => Ok(PaymentMethod::OrangeMoney),
            "mtn_money" => Ok(PaymentMethod::MtnMoney),
            "moov_money" => Ok(PaymentMethod::MoovMoney),
            other => Err(format!("unknown payment method: {other}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Ticket {
    pub id: TicketId,
    pub number: String,
    pub trip: TripId,
    pub destination: DestinationId,
    pub customer_name: String,
    pub customer_phone: String,
    pub seat: SeatNumber,
    pub amount: Amount,
    pub status: TicketStatus,
    pub payment_method: PaymentMethod,
    pub operator: String,
    pub created_at: NaiveDateTime,
    pub paid_at: Option<NaiveDateTime>,
    /// Set once the ticket has been transferred; points at the ticket
    /// created in its place.
    pub successor: Option<TicketId>,
}

/// Everything the counter needs to print a ticket.
#[derive(Debug, Clone)]
pub struct TicketSummary {
    pub number: String,
    pub customer_name: String,
    pub customer_phone: String,
    pub seat: SeatNumber,
    pub amount: Amount,
    pub status: TicketStatus,
    pub payment_method: PaymentMethod,
    pub route: String,
    pub destination_city: String,
    pub departure_date: NaiveDate,
    pub departure_time: NaiveTime,
    pub period: Period,
    pub departure_index: u32,
    pub station_name: String,
    pub station_city: String,
    pub company_name: Option<String>,
    pub company_phone: Option<String>,
}

/// One row of the append-only transfer audit trail. Never mutated after
/// creation; references tickets and trips weakly, for reporting only.
#[derive(Debug, Clone)]
pub struct TransferRecord {
    pub origin_ticket: TicketId,
    pub new_ticket: TicketId,
    pub origin_trip: TripId,
    pub destination_trip: TripId,
    pub origin_seat: SeatNumber,
    pub destination_seat: SeatNumber,
    pub operator: String,
    pub reason: String,
    pub transferred_at: NaiveDateTime,
}
