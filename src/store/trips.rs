//! Trip rows: creation against the composite natural key, vehicle
//! assignment, the forward-only status machine, and the ticket-derived
//! aggregates other modules overlay on a trip.

use chrono::{NaiveDate, NaiveTime};
use log::info;
use num_traits::FromPrimitive;
use sqlite::{Connection, State};

use crate::layout::LayoutConfig;
use crate::primitives::{Amount, SeatNumber};
use crate::store::registry::{self, RegistryError, RouteId, StationId};
use crate::store::{is_constraint_violation, last_insert_id, with_tx};
use crate::ticket::TicketStatus;
use crate::trip::{Period, TripId, TripKey, TripRow, TripStatus};
use crate::vehicle::{VehicleId, VehicleState};

#[derive(Debug)]
pub enum TripError {
    NotFound(TripId),
    /// Natural-key collision: such a departure already exists.
    Duplicate(TripKey),
    VehicleNotFound(VehicleId),
    VehicleNotActive {
        vehicle: VehicleId,
        state: VehicleState,
    },
    /// The vehicle cannot cover seats that were already sold.
    CapacityExceeded {
        vehicle: VehicleId,
        capacity: u32,
        highest_sold_seat: SeatNumber,
    },
    NotForward {
        from: TripStatus,
        to: TripStatus,
    },
    BadDate(String),
    BadTime(String),
    Registry(RegistryError),
    Storage(sqlite::Error),
}

impl From<sqlite::Error> for TripError {
    fn from(err: sqlite::Error) -> Self {
        TripError::Storage(err)
    }
}

impl From<RegistryError> for TripError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::Storage(err) => TripError::Storage(err),
            other => TripError::Registry(other),
        }
    }
}

/// Creates a trip with no vehicle attached. The natural key is checked
/// first so a duplicate is rejected before persistence; the unique index
/// remains the backstop under concurrent creation.
pub fn create_trip(conn: &Connection, key: &TripKey) -> Result<TripId, TripError> {
    with_tx(conn, |conn| {
        let mut stmt = conn.prepare(
            "SELECT 1 FROM trip WHERE station_id = ? AND route_id = ? AND date = ?
             AND time = ? AND period = ? AND departure_index = ?;",
        )?;
        bind_key(&mut stmt, key)?;
        if matches!(stmt.next()?, State::Row) {
            return Err(TripError::Duplicate(key.clone()));
        }

        let mut stmt = conn.prepare(
            "INSERT INTO trip (station_id, route_id, date, time, period, departure_index)
             VALUES (?, ?, ?, ?, ?, ?);",
        )?;
        bind_key(&mut stmt, key)?;
        match stmt.next() {
            Ok(_) => {}
            Err(err) if is_constraint_violation(&err) => {
                return Err(TripError::Duplicate(key.clone()))
            }
            Err(err) => return Err(err.into()),
        }
        let id = TripId(last_insert_id(conn)?);
        info!("Created trip {:?} ({:?})", id, key);
        Ok(id)
    })
}

fn bind_key(stmt: &mut sqlite::Statement, key: &TripKey) -> Result<(), sqlite::Error> {
    stmt.bind((1, key.station.0))?;
    stmt.bind((2, key.route.0))?;
    stmt.bind((3, key.date.format("%Y-%m-%d").to_string().as_str()))?;
    stmt.bind((4, key.time.format("%H:%M").to_string().as_str()))?;
    stmt.bind((5, key.period as i64))?;
    stmt.bind((6, key.departure_index as i64))?;
    Ok(())
}

pub fn trip(conn: &Connection, id: TripId) -> Result<Option<TripRow>, TripError> {
    let mut stmt = conn.prepare(
        "SELECT id, station_id, route_id, date, time, period, departure_index, vehicle_id, status
         FROM trip WHERE id = ?;",
    )?;
    stmt.bind((1, id.0))?;
    match stmt.next()? {
        State::Row => Ok(Some(read_trip(&mut stmt)?)),
        State::Done => Ok(None),
    }
}

fn read_trip(stmt: &mut sqlite::Statement) -> Result<TripRow, TripError> {
    let date_text: String = stmt.read(3)?;
    let time_text: String = stmt.read(4)?;
    let period_code: i64 = stmt.read(5)?;
    let status_code: i64 = stmt.read(8)?;
    Ok(TripRow {
        id: TripId(stmt.read(0)?),
        key: TripKey {
            station: StationId(stmt.read(1)?),
            route: RouteId(stmt.read(2)?),
            date: NaiveDate::parse_from_str(&date_text, "%Y-%m-%d")
                .map_err(|_| TripError::BadDate(date_text))?,
            time: NaiveTime::parse_from_str(&time_text, "%H:%M")
                .map_err(|_| TripError::BadTime(time_text))?,
            period: Period::from_i64(period_code).ok_or(TripError::Registry(
                RegistryError::InvalidEnum {
                    table: "trip.period",
                    value: period_code,
                },
            ))?,
            departure_index: stmt.read::<i64, _>(6)? as u32,
        },
        vehicle: stmt.read::<Option<i64>, _>(7)?.map(VehicleId),
        status: TripStatus::from_i64(status_code).ok_or(TripError::Registry(
            RegistryError::InvalidEnum {
                table: "trip.status",
                value: status_code,
            },
        ))?,
    })
}

/// Assigns (or replaces) the vehicle of a trip. Rejected when the vehicle
/// is not active or its capacity does not cover the highest seat number
/// already sold on the trip.
pub fn assign_vehicle(conn: &Connection, id: TripId, vehicle: VehicleId) -> Result<(), TripError> {
    with_tx(conn, |conn| {
        trip(conn, id)?.ok_or(TripError::NotFound(id))?;
        let vehicle_row =
            registry::vehicle(conn, vehicle)?.ok_or(TripError::VehicleNotFound(vehicle))?;
        if vehicle_row.state != VehicleState::Active {
            return Err(TripError::VehicleNotActive {
                vehicle,
                state: vehicle_row.state,
            });
        }
        let model = registry::model(conn, vehicle_row.model)?
            .ok_or(TripError::VehicleNotFound(vehicle))?;
        if let Some(highest) = highest_sold_seat(conn, id)? {
            if highest > model.capacity {
                return Err(TripError::CapacityExceeded {
                    vehicle,
                    capacity: model.capacity,
                    highest_sold_seat: highest,
                });
            }
        }

        let mut stmt = conn.prepare("UPDATE trip SET vehicle_id = ? WHERE id = ?;")?;
        stmt.bind((1, vehicle.0))?;
        stmt.bind((2, id.0))?;
        stmt.next()?;
        info!("Assigned {:?} to {:?}", vehicle, id);
        Ok(())
    })
}

/// Moves the trip status forward. Completed and cancelled are terminal;
/// nothing is reversible through here.
pub fn advance_status(conn: &Connection, id: TripId, to: TripStatus) -> Result<(), TripError> {
    with_tx(conn, |conn| {
        let row = trip(conn, id)?.ok_or(TripError::NotFound(id))?;
        if !row.status.can_advance_to(to) {
            return Err(TripError::NotForward {
                from: row.status,
                to,
            });
        }
        let mut stmt = conn.prepare("UPDATE trip SET status = ? WHERE id = ?;")?;
        stmt.bind((1, to as i64))?;
        stmt.bind((2, id.0))?;
        stmt.next()?;
        info!("{:?}: {} -> {}", id, row.status.as_str(), to.as_str());
        Ok(())
    })
}

/// Capacity and layout of the trip's vehicle, or `None` when no vehicle
/// is attached (such a trip offers no seats).
pub fn vehicle_profile(
    conn: &Connection,
    row: &TripRow,
) -> Result<Option<(u32, Option<LayoutConfig>)>, TripError> {
    let Some(vehicle_id) = row.vehicle else {
        return Ok(None);
    };
    let vehicle =
        registry::vehicle(conn, vehicle_id)?.ok_or(TripError::VehicleNotFound(vehicle_id))?;
    let model =
        registry::model(conn, vehicle.model)?.ok_or(TripError::VehicleNotFound(vehicle_id))?;
    Ok(Some((model.capacity, model.layout)))
}

/// Seat and status of every ticket currently occupying a seat on the
/// trip. Transferred tickets do not occupy anything.
pub fn seat_usage(
    conn: &Connection,
    id: TripId,
) -> Result<Vec<(SeatNumber, TicketStatus)>, TripError> {
    let mut stmt =
        conn.prepare("SELECT seat, status FROM ticket WHERE trip_id = ? AND status != ?;")?;
    stmt.bind((1, id.0))?;
    stmt.bind((2, TicketStatus::Transferred as i64))?;
    let mut usage = Vec::new();
    while let State::Row = stmt.next()? {
        let seat = stmt.read::<i64, _>(0)? as SeatNumber;
        let status_code: i64 = stmt.read(1)?;
        let status = TicketStatus::from_i64(status_code).ok_or(TripError::Registry(
            RegistryError::InvalidEnum {
                table: "ticket.status",
                value: status_code,
            },
        ))?;
        usage.push((seat, status));
    }
    Ok(usage)
}

fn highest_sold_seat(conn: &Connection, id: TripId) -> Result<Option<SeatNumber>, sqlite::Error> {
    let mut stmt =
        conn.prepare("SELECT MAX(seat) FROM ticket WHERE trip_id = ? AND status != ?;")?;
    stmt.bind((1, id.0))?;
    stmt.bind((2, TicketStatus::Transferred as i64))?;
    stmt.next()?;
    Ok(stmt.read::<Option<i64>, _>(0)?.map(|it| it as SeatNumber))
}

/// Paid-ticket revenue of the trip. Transferred tickets were zeroed, so
/// the sum never double-counts a rebooked seat.
pub fn revenue(conn: &Connection, id: TripId) -> Result<Amount, sqlite::Error> {
    let mut stmt =
        conn.prepare("SELECT COALESCE(SUM(amount), 0) FROM ticket WHERE trip_id = ? AND status = ?;")?;
    stmt.bind((1, id.0))?;
    stmt.bind((2, TicketStatus::Paid as i64))?;
    stmt.next()?;
    stmt.read(0)
}
