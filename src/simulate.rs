//! Seeded random exerciser: drives a fresh in-memory database through
//! many random sales, payments and transfers, then checks the inventory
//! invariants that must hold no matter the interleaving.

use chrono::NaiveDate;
use log::info;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sqlite::State;

use crate::booking::{self, SaleError, SaleRequest, TransferError};
use crate::col;
use crate::inventory::Inventory;
use crate::layout::LayoutConfig;
use crate::store::registry;
use crate::store::trips;
use crate::store;
use crate::ticket::{PaymentMethod, TicketId, TicketStatus};
use crate::trip::{Period, TripId, TripKey};
use crate::vehicle::VehicleState;

const PAYMENT_METHODS: [PaymentMethod; 5] = [
    PaymentMethod::Cash,
    PaymentMethod::Wave,
    PaymentMethod::OrangeMoney,
    PaymentMethod::MtnMoney,
    PaymentMethod::MoovMoney,
];

pub fn run(seed: u64, rounds: usize) {
    let capacity: u32 = 30;
    let num_trips = 4;

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let conn = store::open(":memory:").unwrap();
    store::init_schema(&conn).unwrap();

    let station = registry::insert_station(&conn, "CKY", "Gare de Conakry", "Conakry").unwrap();
    let route =
        registry::insert_route(&conn, station, "Conakry - Kankan", "Conakry", "Kankan").unwrap();
    let destinations = [
        registry::insert_destination(&conn, station, route, "Kindia", 50_000).unwrap(),
        registry::insert_destination(&conn, station, route, "Mamou", 80_000).unwrap(),
        registry::insert_destination(&conn, station, route, "Kankan", 150_000).unwrap(),
    ];
    let grid = LayoutConfig::generate(5, capacity.div_ceil(4), Some(2), vec![7, 13]);
    let model =
        registry::insert_model(&conn, "Coaster 30", "Toyota", capacity, Some(&grid)).unwrap();
    let vehicle =
        registry::insert_vehicle(&conn, "GN-0001-AA", model, VehicleState::Active).unwrap();

    let trip_ids = (1..=num_trips)
        .map(|index| {
            let trip = trips::create_trip(
                &conn,
                &TripKey {
                    station,
                    route,
                    date: NaiveDate::from_ymd_opt(2026, 8, 29).unwrap(),
                    time: chrono::NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
                    period: Period::Morning,
                    departure_index: index,
                },
            )
            .unwrap();
            trips::assign_vehicle(&conn, trip, vehicle).unwrap();
            trip
        })
        .collect::<Vec<_>>();

    let now = NaiveDate::from_ymd_opt(2026, 8, 29)
        .unwrap()
        .and_hms_opt(8, 0, 0)
        .unwrap();

    let mut sold: Vec<TicketId> = Vec::new();
    let mut sales = 0usize;
    let mut rejections = 0usize;
    let mut payments = 0usize;
    let mut transfers = 0usize;
    for round in 0..rounds {
        let trip = trip_ids[rng.gen_range(0..trip_ids.len())];
        match rng.gen_range(0..10) {
            0..=5 => {
                let request = SaleRequest {
                    trip,
                    destination: destinations[rng.gen_range(0..destinations.len())],
                    customer_name: "Simulated",
                    customer_phone: "+224620000000",
                    operator: "sim",
                    pay_immediately: rng.gen_bool(0.5),
                    payment_method: PAYMENT_METHODS[rng.gen_range(0..PAYMENT_METHODS.len())],
                };
                let seat = rng.gen_range(1..=capacity + 2);
                match booking::sell_single(&conn, &request, seat, now) {
                    Ok(ticket) => {
                        sold.push(ticket.id);
                        sales += 1;
                    }
                    Err(SaleError::SeatUnavailable { .. }) => rejections += 1,
                    Err(err) => panic!("round {round}: unexpected sale error {err:?}"),
                }
            }
            6..=7 => {
                if let Some(&id) = pick(&mut rng, &sold) {
                    let method = PAYMENT_METHODS[rng.gen_range(0..PAYMENT_METHODS.len())];
                    if booking::mark_paid(&conn, id, method, now).unwrap() {
                        payments += 1;
                    }
                }
            }
            _ => {
                if let Some(&id) = pick(&mut rng, &sold) {
                    let target = trip_ids[rng.gen_range(0..trip_ids.len())];
                    let seat = rng.gen_range(1..=capacity);
                    match booking::transfer(&conn, id, target, seat, "simulated", "sim", now) {
                        Ok(ticket) => {
                            sold.push(ticket.id);
                            transfers += 1;
                        }
                        Err(
                            TransferError::SeatUnavailable { .. }
                            | TransferError::AlreadyTransferred(_)
                            | TransferError::NotPaid(_),
                        ) => rejections += 1,
                        Err(err) => panic!("round {round}: unexpected transfer error {err:?}"),
                    }
                }
            }
        }
    }

    info!(
        "Seed {seed}: {sales} sales, {payments} payments, {transfers} transfers, \
         {rejections} rejections"
    );

    for &trip in &trip_ids {
        check_trip(&conn, trip);
    }
    check_numbers_distinct(&conn);
}

fn pick<'a, T>(rng: &mut ChaCha8Rng, items: &'a [T]) -> Option<&'a T> {
    if items.is_empty() {
        None
    } else {
        Some(&items[rng.gen_range(0..items.len())])
    }
}

/// Every sellable seat is available, reserved or paid, and no seat holds
/// more than one non-transferred ticket.
fn check_trip(conn: &sqlite::Connection, trip: TripId) {
    let inventory = Inventory::load(conn, trip).unwrap();
    let counts = inventory.occupancy_counts();
    assert_eq!(
        counts.available + counts.reserved + counts.paid,
        inventory.sellable_seats().len(),
        "occupancy of {trip:?} does not partition its sellable seats"
    );

    let mut stmt = conn
        .prepare(
            "SELECT seat, COUNT(*) FROM ticket WHERE trip_id = ? AND status != ?
             GROUP BY seat HAVING COUNT(*) > 1;",
        )
        .unwrap();
    stmt.bind((1, trip.0)).unwrap();
    stmt.bind((2, TicketStatus::Transferred as i64)).unwrap();
    assert!(
        !matches!(stmt.next().unwrap(), State::Row),
        "a seat of {trip:?} is held by more than one active ticket"
    );
}

fn check_numbers_distinct(conn: &sqlite::Connection) {
    let mut numbers = col::set_new();
    let mut stmt = conn.prepare("SELECT number FROM ticket;").unwrap();
    while let State::Row = stmt.next().unwrap() {
        let number: String = stmt.read(0).unwrap();
        assert!(numbers.insert(number), "duplicate ticket number");
    }
}

pub fn run_samples(rounds: usize) {
    for seed in 0..4 {
        info!("Seed: {seed}");
        run(seed, rounds);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_activity_keeps_the_invariants() {
        run_samples(300);
    }
}
