//! A small in-memory station shared by the store-backed tests: one
//! route, one destination, one four-seat vehicle with seat 2 excluded,
//! and a scheduled trip with the vehicle already assigned.

use chrono::{NaiveDate, NaiveDateTime};
use sqlite::Connection;

use crate::booking::{self, SaleRequest};
use crate::layout::{LayoutConfig, LayoutRow};
use crate::primitives::SeatNumber;
use crate::store::registry::{self, DestinationId, RouteId, StationId};
use crate::store::trips;
use crate::store::{self, with_tx};
use crate::ticket::{PaymentMethod, Ticket};
use crate::trip::{Period, TripId, TripKey};
use crate::vehicle::{ModelId, VehicleId, VehicleState};

pub struct SampleDb {
    pub conn: Connection,
    pub station: StationId,
    pub route: RouteId,
    pub destination: DestinationId,
    pub model: ModelId,
    pub vehicle: VehicleId,
    pub trip: TripId,
    pub trip_key: TripKey,
    pub now: NaiveDateTime,
}

/// Two rows of two seats around a middle aisle; seat 2 is non-sellable,
/// so the sellable set is {1, 3, 4}.
pub fn four_seat_layout() -> LayoutConfig {
    LayoutConfig {
        columns: 3,
        rows: vec![
            LayoutRow {
                row: 1,
                cells: vec![Some(1), None, Some(2)],
            },
            LayoutRow {
                row: 2,
                cells: vec![Some(3), None, Some(4)],
            },
        ],
        excluded_seats: vec![2],
    }
}

pub fn sample_db() -> SampleDb {
    let conn = store::open(":memory:").unwrap();
    store::init_schema(&conn).unwrap();

    let station = registry::insert_station(&conn, "CKY", "Gare de Conakry", "Conakry").unwrap();
    let route = registry::insert_route(&conn, station, "Conakry - Kankan", "Conakry", "Kankan")
        .unwrap();
    let destination = registry::insert_destination(&conn, station, route, "Kindia", 50_000).unwrap();
    let model =
        registry::insert_model(&conn, "Coaster 4", "Toyota", 4, Some(&four_seat_layout())).unwrap();
    let vehicle = registry::insert_vehicle(&conn, "GN-0001-AA", model, VehicleState::Active)
        .unwrap();

    let trip_key = TripKey {
        station,
        route,
        date: NaiveDate::from_ymd_opt(2026, 8, 29).unwrap(),
        time: chrono::NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
        period: Period::Morning,
        departure_index: 1,
    };
    let trip = trips::create_trip(&conn, &trip_key).unwrap();
    trips::assign_vehicle(&conn, trip, vehicle).unwrap();

    SampleDb {
        conn,
        station,
        route,
        destination,
        model,
        vehicle,
        trip,
        trip_key,
        now: NaiveDate::from_ymd_opt(2026, 8, 29)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap(),
    }
}

impl SampleDb {
    fn request(&self) -> SaleRequest<'static> {
        SaleRequest {
            trip: self.trip,
            destination: self.destination,
            customer_name: "Mamadou Diallo",
            customer_phone: "+224620000000",
            operator: "aissatou",
            pay_immediately: true,
            payment_method: PaymentMethod::Cash,
        }
    }

    pub fn sell_paid(&self, seat: SeatNumber) -> Ticket {
        booking::sell_single(&self.conn, &self.request(), seat, self.now).unwrap()
    }

    pub fn sell_reserved(&self, seat: SeatNumber) -> Ticket {
        let request = SaleRequest {
            pay_immediately: false,
            ..self.request()
        };
        booking::sell_single(&self.conn, &request, seat, self.now).unwrap()
    }

    /// A later departure on the same route, sharing the vehicle.
    pub fn second_trip(&self) -> TripId {
        let key = TripKey {
            departure_index: 2,
            ..self.trip_key.clone()
        };
        let trip = trips::create_trip(&self.conn, &key).unwrap();
        trips::assign_vehicle(&self.conn, trip, self.vehicle).unwrap();
        trip
    }

    /// Inserts a ticket row directly, bypassing the availability check,
    /// so tests can race the unique seat index on purpose.
    pub fn raw_insert_ticket(&self, number: &str, seat: SeatNumber) -> Result<(), sqlite::Error> {
        with_tx(&self.conn, |conn| {
            conn.execute(format!(
                "INSERT INTO ticket (number, trip_id, destination_id, customer_name, \
                 customer_phone, seat, amount, status, operator, created_at) \
                 VALUES ('{number}', {}, {}, 'raw', 'raw', {seat}, 50000, 0, 'raw', \
                 '2026-08-29 08:00:00');",
                self.trip.0, self.destination.0
            ))
        })
    }
}
