//! The ticket lifecycle: selling seats, converting reservations to
//! payments, and transferring a sold seat to another trip.
//!
//! Every write runs inside its own immediate transaction and re-validates
//! seat availability against the store: a read made by the caller before
//! the write is treated as a hint only. The partial unique index on
//! `(trip, seat)` over non-transferred tickets is the final race-breaker;
//! a constraint violation is reported as [`SaleError::SeatUnavailable`]
//! like any ordinary lost seat.

use chrono::NaiveDateTime;
use log::{debug, info};
use num_traits::FromPrimitive;
use sqlite::{Connection, State};

use crate::inventory::Inventory;
use crate::numbering::{self, NumberingError};
use crate::primitives::{Amount, SeatNumber};
use crate::store::registry::{self, CompanyInfo, DestinationId, RegistryError, StationId};
use crate::store::trips::{self, TripError};
use crate::store::{is_constraint_violation, last_insert_id, with_tx};
use crate::ticket::{PaymentMethod, Ticket, TicketId, TicketStatus, TicketSummary, TransferRecord};
use crate::trip::{TripId, TripRow};

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug)]
pub enum SaleError {
    TripNotFound(TripId),
    TicketNotFound(TicketId),
    /// The seat is not sellable on this trip, already occupied, or was
    /// lost to a concurrent sale. Retryable: pick another seat.
    SeatUnavailable { trip: TripId, seat: SeatNumber },
    /// Missing, inactive, or belonging to a different station/route.
    InvalidDestination {
        destination: DestinationId,
        trip: TripId,
    },
    StationNotFound(StationId),
    Trip(TripError),
    Storage(sqlite::Error),
}

impl From<sqlite::Error> for SaleError {
    fn from(err: sqlite::Error) -> Self {
        SaleError::Storage(err)
    }
}

impl From<TripError> for SaleError {
    fn from(err: TripError) -> Self {
        match err {
            TripError::NotFound(id) => SaleError::TripNotFound(id),
            TripError::Storage(err) => SaleError::Storage(err),
            other => SaleError::Trip(other),
        }
    }
}

impl From<NumberingError> for SaleError {
    fn from(err: NumberingError) -> Self {
        match err {
            NumberingError::StationNotFound(id) => SaleError::StationNotFound(id),
            NumberingError::Storage(err) => SaleError::Storage(err),
        }
    }
}

#[derive(Debug)]
pub enum TransferError {
    TicketNotFound(TicketId),
    TripNotFound(TripId),
    /// A transferred ticket is terminal and cannot move again.
    AlreadyTransferred(TicketId),
    /// Only a paid ticket can be rebooked; a reservation has to be paid
    /// first, otherwise the successor would record revenue that was
    /// never collected.
    NotPaid(TicketId),
    /// Transfers always carry a reason into the audit trail.
    MissingReason,
    /// Transfers never cross stations or routes.
    TripMismatch {
        origin: TripId,
        destination: TripId,
    },
    SeatUnavailable { trip: TripId, seat: SeatNumber },
    StationNotFound(StationId),
    Trip(TripError),
    Storage(sqlite::Error),
}

impl From<sqlite::Error> for TransferError {
    fn from(err: sqlite::Error) -> Self {
        TransferError::Storage(err)
    }
}

impl From<TripError> for TransferError {
    fn from(err: TripError) -> Self {
        match err {
            TripError::NotFound(id) => TransferError::TripNotFound(id),
            TripError::Storage(err) => TransferError::Storage(err),
            other => TransferError::Trip(other),
        }
    }
}

impl From<NumberingError> for TransferError {
    fn from(err: NumberingError) -> Self {
        match err {
            NumberingError::StationNotFound(id) => TransferError::StationNotFound(id),
            NumberingError::Storage(err) => TransferError::Storage(err),
        }
    }
}

/// Everything about a sale except the seat, so a range sale can reuse one
/// request for every seat in the range.
#[derive(Debug, Clone)]
pub struct SaleRequest<'a> {
    pub trip: TripId,
    pub destination: DestinationId,
    pub customer_name: &'a str,
    pub customer_phone: &'a str,
    pub operator: &'a str,
    pub pay_immediately: bool,
    pub payment_method: PaymentMethod,
}

/// Sells one seat. The price is read from the destination row inside the
/// transaction; a client-supplied amount is never trusted.
pub fn sell_single(
    conn: &Connection,
    request: &SaleRequest,
    seat: SeatNumber,
    now: NaiveDateTime,
) -> Result<Ticket, SaleError> {
    with_tx(conn, |conn| sell_in_tx(conn, request, seat, now))
}

fn sell_in_tx(
    conn: &Connection,
    request: &SaleRequest,
    seat: SeatNumber,
    now: NaiveDateTime,
) -> Result<Ticket, SaleError> {
    let trip_row =
        trips::trip(conn, request.trip)?.ok_or(SaleError::TripNotFound(request.trip))?;
    // A closed trip offers no seats at all.
    if !trip_row.status.is_open() {
        return Err(SaleError::SeatUnavailable {
            trip: request.trip,
            seat,
        });
    }

    let destination = registry::destination(conn, request.destination)?
        .filter(|it| {
            it.active && it.station == trip_row.key.station && it.route == trip_row.key.route
        })
        .ok_or(SaleError::InvalidDestination {
            destination: request.destination,
            trip: request.trip,
        })?;

    // Re-checked at write time; the caller's earlier availability read may
    // be stale by now.
    let inventory = Inventory::for_trip(conn, &trip_row)?;
    if !inventory.seat_is_available(seat) {
        return Err(SaleError::SeatUnavailable {
            trip: request.trip,
            seat,
        });
    }

    let number = numbering::next_ticket_number(conn, trip_row.key.station, now)?;
    let status = if request.pay_immediately {
        TicketStatus::Paid
    } else {
        TicketStatus::Reserved
    };
    let paid_at = request.pay_immediately.then_some(now);
    let id = insert_ticket(
        conn,
        &trip_row,
        &number,
        request,
        seat,
        destination.price,
        status,
        paid_at,
        now,
    )?;
    info!(
        "Sold seat {} on {:?} as {} ({})",
        seat,
        request.trip,
        number,
        status.as_str()
    );
    Ok(Ticket {
        id,
        number,
        trip: request.trip,
        destination: request.destination,
        customer_name: request.customer_name.to_owned(),
        customer_phone: request.customer_phone.to_owned(),
        seat,
        amount: destination.price,
        status,
        payment_method: request.payment_method,
        operator: request.operator.to_owned(),
        created_at: now,
        paid_at,
        successor: None,
    })
}

#[allow(clippy::too_many_arguments)]
fn insert_ticket(
    conn: &Connection,
    trip_row: &TripRow,
    number: &str,
    request: &SaleRequest,
    seat: SeatNumber,
    amount: Amount,
    status: TicketStatus,
    paid_at: Option<NaiveDateTime>,
    now: NaiveDateTime,
) -> Result<TicketId, SaleError> {
    let mut stmt = conn.prepare(
        "INSERT INTO ticket (number, trip_id, destination_id, customer_name, customer_phone,
             seat, amount, status, payment_method, operator, created_at, paid_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?);",
    )?;
    stmt.bind((1, number))?;
    stmt.bind((2, trip_row.id.0))?;
    stmt.bind((3, request.destination.0))?;
    stmt.bind((4, request.customer_name))?;
    stmt.bind((5, request.customer_phone))?;
    stmt.bind((6, seat as i64))?;
    stmt.bind((7, amount))?;
    stmt.bind((8, status as i64))?;
    stmt.bind((9, request.payment_method as i64))?;
    stmt.bind((10, request.operator))?;
    stmt.bind((11, format_datetime(now).as_str()))?;
    let paid_text = paid_at.map(format_datetime);
    stmt.bind((12, paid_text.as_deref()))?;
    match stmt.next() {
        Ok(_) => Ok(TicketId(last_insert_id(conn)?)),
        // Another operator inserted the same (trip, seat) between our
        // availability check and this insert. The index is the authority.
        Err(err) if is_constraint_violation(&err) => Err(SaleError::SeatUnavailable {
            trip: trip_row.id,
            seat,
        }),
        Err(err) => Err(err.into()),
    }
}

/// Sells every currently-available seat in the inclusive range, skipping
/// seats that are not sellable or were taken while iterating. Partial
/// success is the contract; an empty vector means nothing could be sold.
pub fn sell_range(
    conn: &Connection,
    request: &SaleRequest,
    seat_start: SeatNumber,
    seat_end: SeatNumber,
    now: NaiveDateTime,
) -> Result<Vec<Ticket>, SaleError> {
    let (start, end) = if seat_start <= seat_end {
        (seat_start, seat_end)
    } else {
        (seat_end, seat_start)
    };
    let mut sold = Vec::new();
    for seat in start..=end {
        match sell_single(conn, request, seat, now) {
            Ok(ticket) => sold.push(ticket),
            Err(SaleError::SeatUnavailable { .. }) => {
                debug!("Skipping seat {} on {:?}", seat, request.trip);
            }
            Err(err) => return Err(err),
        }
    }
    Ok(sold)
}

/// Converts a reservation into a payment. Returns `false` without
/// touching anything when the ticket is not in the reserved state, so a
/// double-submitted payment is harmless.
pub fn mark_paid(
    conn: &Connection,
    id: TicketId,
    payment_method: PaymentMethod,
    now: NaiveDateTime,
) -> Result<bool, SaleError> {
    with_tx(conn, |conn| {
        let ticket = load_ticket(conn, id)?.ok_or(SaleError::TicketNotFound(id))?;
        if ticket.status != TicketStatus::Reserved {
            return Ok(false);
        }
        let mut stmt = conn.prepare(
            "UPDATE ticket SET status = ?, payment_method = ?, paid_at = ? WHERE id = ?;",
        )?;
        stmt.bind((1, TicketStatus::Paid as i64))?;
        stmt.bind((2, payment_method as i64))?;
        stmt.bind((3, format_datetime(now).as_str()))?;
        stmt.bind((4, id.0))?;
        stmt.next()?;
        info!("Ticket {} paid ({})", ticket.number, payment_method.as_str());
        Ok(true)
    })
}

/// Rebooks a paid ticket onto another trip of the same station and route.
///
/// One transaction covers all three effects: the successor ticket is
/// created paid on the destination seat, the origin ticket is marked
/// transferred with its amount zeroed and linked to the successor, and
/// an audit row is appended. Any failure leaves no trace of the attempt.
pub fn transfer(
    conn: &Connection,
    id: TicketId,
    destination_trip: TripId,
    destination_seat: SeatNumber,
    reason: &str,
    operator: &str,
    now: NaiveDateTime,
) -> Result<Ticket, TransferError> {
    if reason.trim().is_empty() {
        return Err(TransferError::MissingReason);
    }
    with_tx(conn, |conn| {
        let origin = load_ticket(conn, id)?.ok_or(TransferError::TicketNotFound(id))?;
        if origin.status == TicketStatus::Transferred {
            return Err(TransferError::AlreadyTransferred(id));
        }
        if origin.status != TicketStatus::Paid {
            return Err(TransferError::NotPaid(id));
        }
        let origin_trip =
            trips::trip(conn, origin.trip)?.ok_or(TransferError::TripNotFound(origin.trip))?;
        let dest_trip = trips::trip(conn, destination_trip)?
            .ok_or(TransferError::TripNotFound(destination_trip))?;
        if origin_trip.key.station != dest_trip.key.station
            || origin_trip.key.route != dest_trip.key.route
        {
            return Err(TransferError::TripMismatch {
                origin: origin.trip,
                destination: destination_trip,
            });
        }
        if !dest_trip.status.is_open() {
            return Err(TransferError::SeatUnavailable {
                trip: destination_trip,
                seat: destination_seat,
            });
        }
        let inventory = Inventory::for_trip(conn, &dest_trip)?;
        if !inventory.seat_is_available(destination_seat) {
            return Err(TransferError::SeatUnavailable {
                trip: destination_trip,
                seat: destination_seat,
            });
        }

        let number = numbering::next_ticket_number(conn, dest_trip.key.station, now)?;
        let mut stmt = conn.prepare(
            "INSERT INTO ticket (number, trip_id, destination_id, customer_name, customer_phone,
                 seat, amount, status, payment_method, operator, created_at, paid_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?);",
        )?;
        stmt.bind((1, number.as_str()))?;
        stmt.bind((2, destination_trip.0))?;
        stmt.bind((3, origin.destination.0))?;
        stmt.bind((4, origin.customer_name.as_str()))?;
        stmt.bind((5, origin.customer_phone.as_str()))?;
        stmt.bind((6, destination_seat as i64))?;
        stmt.bind((7, origin.amount))?;
        stmt.bind((8, TicketStatus::Paid as i64))?;
        stmt.bind((9, origin.payment_method as i64))?;
        stmt.bind((10, operator))?;
        stmt.bind((11, format_datetime(now).as_str()))?;
        stmt.bind((12, format_datetime(now).as_str()))?;
        match stmt.next() {
            Ok(_) => {}
            Err(err) if is_constraint_violation(&err) => {
                return Err(TransferError::SeatUnavailable {
                    trip: destination_trip,
                    seat: destination_seat,
                })
            }
            Err(err) => return Err(err.into()),
        }
        let new_id = TicketId(last_insert_id(conn)?);

        let mut stmt = conn.prepare(
            "UPDATE ticket SET status = ?, amount = 0, successor_id = ? WHERE id = ?;",
        )?;
        stmt.bind((1, TicketStatus::Transferred as i64))?;
        stmt.bind((2, new_id.0))?;
        stmt.bind((3, id.0))?;
        stmt.next()?;

        let mut stmt = conn.prepare(
            "INSERT INTO transfer_log (origin_ticket_id, new_ticket_id, origin_trip_id,
                 destination_trip_id, origin_seat, destination_seat, operator, reason,
                 transferred_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?);",
        )?;
        stmt.bind((1, id.0))?;
        stmt.bind((2, new_id.0))?;
        stmt.bind((3, origin.trip.0))?;
        stmt.bind((4, destination_trip.0))?;
        stmt.bind((5, origin.seat as i64))?;
        stmt.bind((6, destination_seat as i64))?;
        stmt.bind((7, operator))?;
        stmt.bind((8, reason))?;
        stmt.bind((9, format_datetime(now).as_str()))?;
        stmt.next()?;

        info!(
            "Transferred {} (seat {} on {:?}) to seat {} on {:?} as {}",
            origin.number, origin.seat, origin.trip, destination_seat, destination_trip, number
        );
        Ok(Ticket {
            id: new_id,
            number,
            trip: destination_trip,
            destination: origin.destination,
            customer_name: origin.customer_name,
            customer_phone: origin.customer_phone,
            seat: destination_seat,
            amount: origin.amount,
            status: TicketStatus::Paid,
            payment_method: origin.payment_method,
            operator: operator.to_owned(),
            created_at: now,
            paid_at: Some(now),
            successor: None,
        })
    })
}

pub fn ticket(conn: &Connection, id: TicketId) -> Result<Option<Ticket>, SaleError> {
    Ok(load_ticket(conn, id)?)
}

fn load_ticket(conn: &Connection, id: TicketId) -> Result<Option<Ticket>, TripError> {
    let mut stmt = conn.prepare(
        "SELECT id, number, trip_id, destination_id, customer_name, customer_phone, seat,
             amount, status, payment_method, operator, created_at, paid_at, successor_id
         FROM ticket WHERE id = ?;",
    )?;
    stmt.bind((1, id.0))?;
    if !matches!(stmt.next()?, State::Row) {
        return Ok(None);
    }
    let status_code: i64 = stmt.read(8)?;
    let method_code: i64 = stmt.read(9)?;
    let created_text: String = stmt.read(11)?;
    let paid_text: Option<String> = stmt.read(12)?;
    Ok(Some(Ticket {
        id: TicketId(stmt.read(0)?),
        number: stmt.read(1)?,
        trip: TripId(stmt.read(2)?),
        destination: DestinationId(stmt.read(3)?),
        customer_name: stmt.read(4)?,
        customer_phone: stmt.read(5)?,
        seat: stmt.read::<i64, _>(6)? as SeatNumber,
        amount: stmt.read(7)?,
        status: TicketStatus::from_i64(status_code).ok_or(TripError::Registry(
            RegistryError::InvalidEnum {
                table: "ticket.status",
                value: status_code,
            },
        ))?,
        payment_method: PaymentMethod::from_i64(method_code).ok_or(TripError::Registry(
            RegistryError::InvalidEnum {
                table: "ticket.payment_method",
                value: method_code,
            },
        ))?,
        operator: stmt.read(10)?,
        created_at: parse_datetime(&created_text)?,
        paid_at: paid_text.as_deref().map(parse_datetime).transpose()?,
        successor: stmt.read::<Option<i64>, _>(13)?.map(TicketId),
    }))
}

/// Joins a ticket with its trip, route, destination, station and the
/// company configuration into the shape the counter prints.
pub fn ticket_summary(
    conn: &Connection,
    id: TicketId,
    company: Option<&CompanyInfo>,
) -> Result<TicketSummary, SaleError> {
    let ticket = load_ticket(conn, id)?.ok_or(SaleError::TicketNotFound(id))?;
    let trip_row =
        trips::trip(conn, ticket.trip)?.ok_or(SaleError::TripNotFound(ticket.trip))?;
    let route = registry::route(conn, trip_row.key.route)?;
    let destination =
        registry::destination(conn, ticket.destination)?.ok_or(SaleError::InvalidDestination {
            destination: ticket.destination,
            trip: ticket.trip,
        })?;
    let station = registry::station(conn, trip_row.key.station)?
        .ok_or(SaleError::StationNotFound(trip_row.key.station))?;
    Ok(TicketSummary {
        number: ticket.number,
        customer_name: ticket.customer_name,
        customer_phone: ticket.customer_phone,
        seat: ticket.seat,
        amount: ticket.amount,
        status: ticket.status,
        payment_method: ticket.payment_method,
        route: route.map(|it| it.name).unwrap_or_default(),
        destination_city: destination.city,
        departure_date: trip_row.key.date,
        departure_time: trip_row.key.time,
        period: trip_row.key.period,
        departure_index: trip_row.key.departure_index,
        station_name: station.name,
        station_city: station.city,
        company_name: company.map(|it| it.name.clone()),
        company_phone: company.map(|it| it.phone.clone()),
    })
}

/// Audit rows touching a trip, oldest first. The log is append-only and
/// is read here for reporting only.
pub fn transfer_records(
    conn: &Connection,
    trip: TripId,
) -> Result<Vec<TransferRecord>, TripError> {
    let mut stmt = conn.prepare(
        "SELECT origin_ticket_id, new_ticket_id, origin_trip_id, destination_trip_id,
             origin_seat, destination_seat, operator, reason, transferred_at
         FROM transfer_log
         WHERE origin_trip_id = ? OR destination_trip_id = ?
         ORDER BY id ASC;",
    )?;
    stmt.bind((1, trip.0))?;
    stmt.bind((2, trip.0))?;
    let mut records = Vec::new();
    while let State::Row = stmt.next()? {
        let transferred_text: String = stmt.read(8)?;
        records.push(TransferRecord {
            origin_ticket: TicketId(stmt.read(0)?),
            new_ticket: TicketId(stmt.read(1)?),
            origin_trip: TripId(stmt.read(2)?),
            destination_trip: TripId(stmt.read(3)?),
            origin_seat: stmt.read::<i64, _>(4)? as SeatNumber,
            destination_seat: stmt.read::<i64, _>(5)? as SeatNumber,
            operator: stmt.read(6)?,
            reason: stmt.read(7)?,
            transferred_at: parse_datetime(&transferred_text)?,
        });
    }
    Ok(records)
}

fn format_datetime(value: NaiveDateTime) -> String {
    value.format(DATETIME_FORMAT).to_string()
}

fn parse_datetime(text: &str) -> Result<NaiveDateTime, TripError> {
    NaiveDateTime::parse_from_str(text, DATETIME_FORMAT)
        .map_err(|_| TripError::BadDate(text.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample;
    use crate::trip::TripStatus;

    #[test]
    fn a_seat_cannot_be_sold_twice() {
        let fixture = sample::sample_db();
        fixture.sell_paid(3);
        assert!(matches!(
            sell_single(
                &fixture.conn,
                &SaleRequest {
                    trip: fixture.trip,
                    destination: fixture.destination,
                    customer_name: "Fanta Camara",
                    customer_phone: "+224621111111",
                    operator: "ousmane",
                    pay_immediately: false,
                    payment_method: PaymentMethod::Wave,
                },
                3,
                fixture.now,
            ),
            Err(SaleError::SeatUnavailable { seat: 3, .. })
        ));
    }

    #[test]
    fn a_non_sellable_seat_cannot_be_sold() {
        let fixture = sample::sample_db();
        // Seat 2 exists on the grid but is excluded from sale.
        assert!(matches!(
            sell_single(
                &fixture.conn,
                &SaleRequest {
                    trip: fixture.trip,
                    destination: fixture.destination,
                    customer_name: "Fanta Camara",
                    customer_phone: "+224621111111",
                    operator: "ousmane",
                    pay_immediately: true,
                    payment_method: PaymentMethod::Cash,
                },
                2,
                fixture.now,
            ),
            Err(SaleError::SeatUnavailable { seat: 2, .. })
        ));
    }

    #[test]
    fn a_row_planted_by_another_counter_blocks_the_sale() {
        let fixture = sample::sample_db();
        fixture.raw_insert_ticket("CKY-202608-00099", 4).unwrap();
        assert!(matches!(
            sell_single(
                &fixture.conn,
                &SaleRequest {
                    trip: fixture.trip,
                    destination: fixture.destination,
                    customer_name: "Fanta Camara",
                    customer_phone: "+224621111111",
                    operator: "ousmane",
                    pay_immediately: true,
                    payment_method: PaymentMethod::Cash,
                },
                4,
                fixture.now,
            ),
            Err(SaleError::SeatUnavailable { seat: 4, .. })
        ));
    }

    #[test]
    fn the_unique_index_catches_a_write_past_a_stale_availability_check() {
        let fixture = sample::sample_db();
        fixture.sell_paid(3);
        let trip_row = trips::trip(&fixture.conn, fixture.trip).unwrap().unwrap();
        // Skip the availability read and write straight into the occupied
        // seat, the way a racing counter effectively does.
        let result = insert_ticket(
            &fixture.conn,
            &trip_row,
            "CKY-202608-00099",
            &SaleRequest {
                trip: fixture.trip,
                destination: fixture.destination,
                customer_name: "Fanta Camara",
                customer_phone: "+224621111111",
                operator: "ousmane",
                pay_immediately: true,
                payment_method: PaymentMethod::Cash,
            },
            3,
            50_000,
            TicketStatus::Paid,
            Some(fixture.now),
            fixture.now,
        );
        assert!(matches!(
            result,
            Err(SaleError::SeatUnavailable { seat: 3, .. })
        ));
    }

    #[test]
    fn sales_on_a_closed_trip_are_rejected() {
        let fixture = sample::sample_db();
        trips::advance_status(&fixture.conn, fixture.trip, TripStatus::InProgress).unwrap();
        trips::advance_status(&fixture.conn, fixture.trip, TripStatus::Completed).unwrap();
        assert!(matches!(
            sell_single(
                &fixture.conn,
                &SaleRequest {
                    trip: fixture.trip,
                    destination: fixture.destination,
                    customer_name: "Fanta Camara",
                    customer_phone: "+224621111111",
                    operator: "ousmane",
                    pay_immediately: true,
                    payment_method: PaymentMethod::Cash,
                },
                1,
                fixture.now,
            ),
            Err(SaleError::SeatUnavailable { .. })
        ));
    }

    #[test]
    fn a_destination_of_another_route_is_rejected() {
        let fixture = sample::sample_db();
        let other_route = registry::insert_route(
            &fixture.conn,
            fixture.station,
            "Conakry - Boke",
            "Conakry",
            "Boke",
        )
        .unwrap();
        let foreign = registry::insert_destination(
            &fixture.conn,
            fixture.station,
            other_route,
            "Boke",
            80_000,
        )
        .unwrap();
        assert!(matches!(
            sell_single(
                &fixture.conn,
                &SaleRequest {
                    trip: fixture.trip,
                    destination: foreign,
                    customer_name: "Fanta Camara",
                    customer_phone: "+224621111111",
                    operator: "ousmane",
                    pay_immediately: true,
                    payment_method: PaymentMethod::Cash,
                },
                1,
                fixture.now,
            ),
            Err(SaleError::InvalidDestination { .. })
        ));
    }

    #[test]
    fn range_sale_skips_non_sellable_and_taken_seats() {
        let fixture = sample::sample_db();
        fixture.sell_paid(3);

        let request = SaleRequest {
            trip: fixture.trip,
            destination: fixture.destination,
            customer_name: "Fanta Camara",
            customer_phone: "+224621111111",
            operator: "ousmane",
            pay_immediately: false,
            payment_method: PaymentMethod::Cash,
        };
        // Seat 2 is excluded by the layout, seat 3 already sold; order of
        // the bounds does not matter.
        let sold = sell_range(&fixture.conn, &request, 4, 1, fixture.now).unwrap();
        let seats = sold.iter().map(|it| it.seat).collect::<Vec<_>>();
        assert_eq!(seats, vec![1, 4]);
    }

    #[test]
    fn range_sale_over_a_full_trip_sells_nothing() {
        let fixture = sample::sample_db();
        fixture.sell_paid(1);
        fixture.sell_paid(3);
        fixture.sell_paid(4);
        let request = SaleRequest {
            trip: fixture.trip,
            destination: fixture.destination,
            customer_name: "Fanta Camara",
            customer_phone: "+224621111111",
            operator: "ousmane",
            pay_immediately: true,
            payment_method: PaymentMethod::Cash,
        };
        let sold = sell_range(&fixture.conn, &request, 1, 4, fixture.now).unwrap();
        assert!(sold.is_empty());
    }

    #[test]
    fn payment_is_applied_once() {
        let fixture = sample::sample_db();
        let reserved = fixture.sell_reserved(1);
        assert_eq!(reserved.status, TicketStatus::Reserved);
        assert_eq!(reserved.paid_at, None);

        assert!(mark_paid(&fixture.conn, reserved.id, PaymentMethod::Wave, fixture.now).unwrap());
        let paid = ticket(&fixture.conn, reserved.id).unwrap().unwrap();
        assert_eq!(paid.status, TicketStatus::Paid);
        assert_eq!(paid.payment_method, PaymentMethod::Wave);
        assert_eq!(paid.created_at, fixture.now);
        assert_eq!(paid.paid_at, Some(fixture.now));

        // The second submission is a no-op and keeps the first method.
        assert!(!mark_paid(&fixture.conn, reserved.id, PaymentMethod::Cash, fixture.now).unwrap());
        let still = ticket(&fixture.conn, reserved.id).unwrap().unwrap();
        assert_eq!(still.payment_method, PaymentMethod::Wave);
    }

    #[test]
    fn ticket_numbers_run_sequentially_within_a_station_month() {
        let fixture = sample::sample_db();
        assert_eq!(fixture.sell_paid(1).number, "CKY-202608-00001");
        assert_eq!(fixture.sell_reserved(3).number, "CKY-202608-00002");
        assert_eq!(fixture.sell_paid(4).number, "CKY-202608-00003");
    }

    #[test]
    fn transfer_moves_the_seat_and_leaves_an_audit_row() {
        let fixture = sample::sample_db();
        let origin = fixture.sell_paid(3);
        let later = fixture.second_trip();

        let new = transfer(
            &fixture.conn,
            origin.id,
            later,
            4,
            "vehicle breakdown",
            "ousmane",
            fixture.now,
        )
        .unwrap();
        assert_eq!(new.trip, later);
        assert_eq!(new.seat, 4);
        assert_eq!(new.status, TicketStatus::Paid);
        assert_eq!(new.amount, origin.amount);

        let old = ticket(&fixture.conn, origin.id).unwrap().unwrap();
        assert_eq!(old.status, TicketStatus::Transferred);
        assert_eq!(old.amount, 0);
        assert_eq!(old.successor, Some(new.id));

        // The origin seat is sellable again, and the zeroed origin ticket
        // never counts towards revenue.
        fixture.sell_paid(3);
        assert_eq!(trips::revenue(&fixture.conn, fixture.trip).unwrap(), 50_000);
        assert_eq!(trips::revenue(&fixture.conn, later).unwrap(), 50_000);

        let records = transfer_records(&fixture.conn, later).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].origin_ticket, origin.id);
        assert_eq!(records[0].new_ticket, new.id);
        assert_eq!(records[0].origin_seat, 3);
        assert_eq!(records[0].destination_seat, 4);
        assert_eq!(records[0].reason, "vehicle breakdown");
    }

    #[test]
    fn failed_transfer_leaves_no_trace() {
        let fixture = sample::sample_db();
        let origin = fixture.sell_paid(3);
        let later = fixture.second_trip();
        // Occupy the target seat so the transfer fails after validation of
        // the origin side.
        sell_single(
            &fixture.conn,
            &SaleRequest {
                trip: later,
                destination: fixture.destination,
                customer_name: "Fanta Camara",
                customer_phone: "+224621111111",
                operator: "ousmane",
                pay_immediately: true,
                payment_method: PaymentMethod::Cash,
            },
            4,
            fixture.now,
        )
        .unwrap();

        assert!(matches!(
            transfer(
                &fixture.conn,
                origin.id,
                later,
                4,
                "vehicle breakdown",
                "ousmane",
                fixture.now,
            ),
            Err(TransferError::SeatUnavailable { seat: 4, .. })
        ));

        let unchanged = ticket(&fixture.conn, origin.id).unwrap().unwrap();
        assert_eq!(unchanged.status, TicketStatus::Paid);
        assert_eq!(unchanged.amount, origin.amount);
        assert_eq!(unchanged.successor, None);
        assert!(transfer_records(&fixture.conn, later).unwrap().is_empty());
    }

    #[test]
    fn transfer_preconditions_are_enforced() {
        let fixture = sample::sample_db();
        let origin = fixture.sell_paid(3);
        let later = fixture.second_trip();

        assert!(matches!(
            transfer(&fixture.conn, origin.id, later, 4, "  ", "ousmane", fixture.now),
            Err(TransferError::MissingReason)
        ));

        let other_station =
            registry::insert_station(&fixture.conn, "KIN", "Gare de Kindia", "Kindia").unwrap();
        let other_route = registry::insert_route(
            &fixture.conn,
            other_station,
            "Kindia - Conakry",
            "Kindia",
            "Conakry",
        )
        .unwrap();
        let foreign_trip = trips::create_trip(
            &fixture.conn,
            &crate::trip::TripKey {
                station: other_station,
                route: other_route,
                ..fixture.trip_key.clone()
            },
        )
        .unwrap();
        assert!(matches!(
            transfer(
                &fixture.conn,
                origin.id,
                foreign_trip,
                1,
                "wrong gate",
                "ousmane",
                fixture.now,
            ),
            Err(TransferError::TripMismatch { .. })
        ));

        transfer(&fixture.conn, origin.id, later, 4, "breakdown", "ousmane", fixture.now).unwrap();
        assert!(matches!(
            transfer(&fixture.conn, origin.id, later, 1, "again", "ousmane", fixture.now),
            Err(TransferError::AlreadyTransferred(id)) if id == origin.id
        ));
    }

    #[test]
    fn an_unpaid_reservation_cannot_be_transferred() {
        let fixture = sample::sample_db();
        let reserved = fixture.sell_reserved(3);
        let later = fixture.second_trip();

        assert!(matches!(
            transfer(
                &fixture.conn,
                reserved.id,
                later,
                4,
                "vehicle breakdown",
                "ousmane",
                fixture.now,
            ),
            Err(TransferError::NotPaid(id)) if id == reserved.id
        ));

        // No paid successor was minted, so no revenue appeared anywhere.
        let unchanged = ticket(&fixture.conn, reserved.id).unwrap().unwrap();
        assert_eq!(unchanged.status, TicketStatus::Reserved);
        assert_eq!(unchanged.amount, reserved.amount);
        assert_eq!(unchanged.successor, None);
        assert_eq!(trips::revenue(&fixture.conn, fixture.trip).unwrap(), 0);
        assert_eq!(trips::revenue(&fixture.conn, later).unwrap(), 0);
        assert!(transfer_records(&fixture.conn, later).unwrap().is_empty());

        // Once the reservation is paid the same transfer goes through.
        assert!(mark_paid(&fixture.conn, reserved.id, PaymentMethod::Cash, fixture.now).unwrap());
        transfer(
            &fixture.conn,
            reserved.id,
            later,
            4,
            "vehicle breakdown",
            "ousmane",
            fixture.now,
        )
        .unwrap();
        assert_eq!(trips::revenue(&fixture.conn, later).unwrap(), 50_000);
    }

    #[test]
    fn summary_joins_trip_route_and_company() {
        let fixture = sample::sample_db();
        registry::set_company(
            &fixture.conn,
            &CompanyInfo {
                name: "Transport Kaba".to_owned(),
                address: "Conakry".to_owned(),
                phone: "+224622000000".to_owned(),
            },
        )
        .unwrap();
        let sold = fixture.sell_paid(1);
        let company = registry::company(&fixture.conn).unwrap();
        let summary = ticket_summary(&fixture.conn, sold.id, company.as_ref()).unwrap();
        assert_eq!(summary.number, sold.number);
        assert_eq!(summary.route, "Conakry - Kankan");
        assert_eq!(summary.destination_city, "Kindia");
        assert_eq!(summary.station_name, "Gare de Conakry");
        assert_eq!(summary.company_name.as_deref(), Some("Transport Kaba"));
    }
}
