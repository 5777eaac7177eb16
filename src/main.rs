use std::path::Path;
use std::process::exit;

use chrono::Local;
use clap::{Args, Parser, Subcommand};
use log::{error, info};
use sqlite::Connection;

use crate::booking::SaleRequest;
use crate::inventory::{Inventory, SeatState};
use crate::layout::CellKind;
use crate::store::registry;
use crate::store::trips;
use crate::ticket::{PaymentMethod, TicketId};
use crate::trip::{Period, TripId, TripKey, TripStatus};

mod booking;
mod col;
mod inventory;
mod layout;
mod numbering;
mod primitives;
#[cfg(test)]
mod sample;
mod seed;
mod simulate;
mod store;
mod ticket;
mod trip;
mod vehicle;

#[derive(Parser, Debug)]
#[command(
    version,
    author,
    about = "Seat inventory and ticket lifecycle for scheduled bus trips"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Clone, Debug)]
enum Commands {
    #[command(about = "Create the database and optionally import a seed directory")]
    Init(InitArgs),

    #[command(about = "Show the seat grid and occupancy of a trip")]
    Seats(SeatsArgs),

    #[command(about = "Sell one seat")]
    Sell(SellArgs),

    #[command(about = "Sell every available seat in a range")]
    SellRange(SellRangeArgs),

    #[command(about = "Mark a reserved ticket as paid")]
    Pay(PayArgs),

    #[command(about = "Transfer a ticket to another trip")]
    Transfer(TransferArgs),

    #[command(about = "List the transfer audit trail of a trip")]
    Transfers(TransfersArgs),

    #[command(about = "Create a trip")]
    CreateTrip(CreateTripArgs),

    #[command(about = "Assign a vehicle to a trip")]
    AssignVehicle(AssignVehicleArgs),

    #[command(about = "Advance the status of a trip")]
    AdvanceTrip(AdvanceTripArgs),

    #[command(about = "Print a ticket")]
    Ticket(TicketArgs),

    #[command(about = "Run seeded random sales against a fresh database")]
    Simulate(SimulateArgs),
}

#[derive(Args, Clone, Debug)]
struct DbArgs {
    #[arg(short = 'd', long, default_value = "seatflow.sqlite3")]
    db: String,
}

fn open_db(args: &DbArgs) -> Connection {
    if !Path::new(&args.db).exists() {
        error!("Database does not exist: {} (run init first)", args.db);
        exit(1);
    }
    store::open(&args.db).unwrap_or_else(|it| {
        error!("Could not open database {}:\n{:#?}", args.db, it);
        exit(1);
    })
}

#[derive(Args, Clone, Debug)]
struct InitArgs {
    #[clap(flatten)]
    db: DbArgs,

    #[arg(short = 's', long, help = "Directory of seed CSV files to import.")]
    seed_dir: Option<String>,
}
fn main_init(args: &InitArgs) {
    let conn = store::open(&args.db.db).unwrap_or_else(|it| {
        error!("Could not open database {}:\n{:#?}", args.db.db, it);
        exit(1);
    });
    store::init_schema(&conn).unwrap_or_else(|it| {
        error!("Could not create schema:\n{:#?}", it);
        exit(1);
    });
    if let Some(dir) = &args.seed_dir {
        seed::import_dir(&conn, Path::new(dir)).unwrap_or_else(|it| {
            error!("Could not import seed directory {}:\n{:#?}", dir, it);
            exit(1);
        });
    }
    info!("Database ready: {}", args.db.db);
}

#[derive(Args, Clone, Debug)]
struct SeatsArgs {
    #[clap(flatten)]
    db: DbArgs,

    #[arg(short = 't', long)]
    trip: i64,
}
fn main_seats(args: &SeatsArgs) {
    let conn = open_db(&args.db);
    let inventory = Inventory::load(&conn, TripId(args.trip)).unwrap_or_else(|it| {
        error!("Could not load trip {}:\n{:#?}", args.trip, it);
        exit(1);
    });
    for row in inventory.seat_grid() {
        let line = row
            .iter()
            .map(|(cell, state)| match (cell.kind, state) {
                (CellKind::Aisle, _) => "    ".to_string(),
                (CellKind::NonSellable, _) => format!("{:>3}x", cell.number.unwrap_or(0)),
                (_, SeatState::Paid) => format!("{:>3}*", cell.number.unwrap_or(0)),
                (_, SeatState::Reserved) => format!("{:>3}r", cell.number.unwrap_or(0)),
                _ => format!("{:>3} ", cell.number.unwrap_or(0)),
            })
            .collect::<String>();
        println!("{line}");
    }
    let counts = inventory.occupancy_counts();
    let revenue = trips::revenue(&conn, TripId(args.trip)).unwrap_or_else(|it| {
        error!("Could not compute revenue:\n{:#?}", it);
        exit(1);
    });
    println!(
        "available: {}  reserved: {}  paid: {}  revenue: {}",
        counts.available, counts.reserved, counts.paid, revenue
    );
    println!(
        "free seats: {}",
        inventory
            .available_seats()
            .iter()
            .map(|seat| seat.to_string())
            .collect::<Vec<_>>()
            .join(" ")
    );
}

#[derive(Args, Clone, Debug)]
struct SellArgs {
    #[clap(flatten)]
    db: DbArgs,

    #[arg(short = 't', long)]
    trip: i64,

    #[arg(short = 'c', long, help = "Destination city on the trip's route.")]
    city: String,

    #[arg(short = 's', long)]
    seat: u32,

    #[arg(short = 'n', long)]
    name: String,

    #[arg(short = 'p', long, default_value = "")]
    phone: String,

    #[arg(short = 'o', long)]
    operator: String,

    #[arg(long, help = "Record the sale as paid immediately.")]
    pay: bool,

    #[arg(short = 'm', long, default_value = "cash")]
    method: PaymentMethod,
}
fn main_sell(args: &SellArgs) {
    let conn = open_db(&args.db);
    let request = sale_request(&conn, args);
    let now = Local::now().naive_local();
    let ticket = booking::sell_single(&conn, &request, args.seat, now).unwrap_or_else(|it| {
        error!("Could not sell seat {}:\n{:#?}", args.seat, it);
        exit(1);
    });
    println!(
        "{} seat {} {} ({})",
        ticket.number,
        ticket.seat,
        ticket.status.as_str(),
        ticket.amount
    );
}

fn sale_request<'a>(conn: &Connection, args: &'a SellArgs) -> SaleRequest<'a> {
    let trip = TripId(args.trip);
    let trip_row = trips::trip(conn, trip)
        .unwrap_or_else(|it| {
            error!("Could not load trip {}:\n{:#?}", args.trip, it);
            exit(1);
        })
        .unwrap_or_else(|| {
            error!("No such trip: {}", args.trip);
            exit(1);
        });
    let destination =
        registry::destinations_for(conn, trip_row.key.station, trip_row.key.route)
            .unwrap_or_else(|it| {
                error!("Could not load destinations:\n{:#?}", it);
                exit(1);
            })
            .into_iter()
            .find(|it| it.city == args.city)
            .unwrap_or_else(|| {
                error!("No destination {} on the route of trip {}", args.city, args.trip);
                exit(1);
            });
    SaleRequest {
        trip,
        destination: destination.id,
        customer_name: &args.name,
        customer_phone: &args.phone,
        operator: &args.operator,
        pay_immediately: args.pay,
        payment_method: args.method,
    }
}

#[derive(Args, Clone, Debug)]
struct SellRangeArgs {
    #[clap(flatten)]
    sell: SellArgs,

    #[arg(short = 'e', long, help = "Last seat of the range (inclusive).")]
    seat_end: u32,
}
fn main_sell_range(args: &SellRangeArgs) {
    let conn = open_db(&args.sell.db);
    let request = sale_request(&conn, &args.sell);
    let now = Local::now().naive_local();
    let sold = booking::sell_range(&conn, &request, args.sell.seat, args.seat_end, now)
        .unwrap_or_else(|it| {
            error!("Could not sell range:\n{:#?}", it);
            exit(1);
        });
    if sold.is_empty() {
        println!("No seat in {}..={} was available", args.sell.seat, args.seat_end);
        return;
    }
    for ticket in &sold {
        println!("{} seat {} ({})", ticket.number, ticket.seat, ticket.amount);
    }
    println!("{} of {} seats sold", sold.len(), args.seat_end.abs_diff(args.sell.seat) + 1);
}

#[derive(Args, Clone, Debug)]
struct PayArgs {
    #[clap(flatten)]
    db: DbArgs,

    #[arg(short = 't', long)]
    ticket: i64,

    #[arg(short = 'm', long, default_value = "cash")]
    method: PaymentMethod,
}
fn main_pay(args: &PayArgs) {
    let conn = open_db(&args.db);
    let now = Local::now().naive_local();
    let applied =
        booking::mark_paid(&conn, TicketId(args.ticket), args.method, now).unwrap_or_else(|it| {
            error!("Could not pay ticket {}:\n{:#?}", args.ticket, it);
            exit(1);
        });
    let ticket = booking::ticket(&conn, TicketId(args.ticket))
        .unwrap_or_else(|it| {
            error!("Could not load ticket {}:\n{:#?}", args.ticket, it);
            exit(1);
        })
        .unwrap_or_else(|| {
            error!("No such ticket: {}", args.ticket);
            exit(1);
        });
    if applied {
        println!("Ticket {} paid ({})", ticket.number, args.method.as_str());
    } else {
        println!(
            "Ticket {} is {}; nothing changed",
            ticket.number,
            ticket.status.as_str()
        );
    }
}

#[derive(Args, Clone, Debug)]
struct TransferArgs {
    #[clap(flatten)]
    db: DbArgs,

    #[arg(short = 't', long)]
    ticket: i64,

    #[arg(long, help = "The trip to move the ticket to.")]
    to_trip: i64,

    #[arg(short = 's', long)]
    seat: u32,

    #[arg(short = 'r', long)]
    reason: String,

    #[arg(short = 'o', long)]
    operator: String,
}
fn main_transfer(args: &TransferArgs) {
    let conn = open_db(&args.db);
    let now = Local::now().naive_local();
    let ticket = booking::transfer(
        &conn,
        TicketId(args.ticket),
        TripId(args.to_trip),
        args.seat,
        &args.reason,
        &args.operator,
        now,
    )
    .unwrap_or_else(|it| {
        error!("Could not transfer ticket {}:\n{:#?}", args.ticket, it);
        exit(1);
    });
    println!(
        "Ticket {} moved to trip {} seat {} as {}",
        args.ticket, args.to_trip, ticket.seat, ticket.number
    );
}

#[derive(Args, Clone, Debug)]
struct TransfersArgs {
    #[clap(flatten)]
    db: DbArgs,

    #[arg(short = 't', long)]
    trip: i64,
}
fn main_transfers(args: &TransfersArgs) {
    let conn = open_db(&args.db);
    let records = booking::transfer_records(&conn, TripId(args.trip)).unwrap_or_else(|it| {
        error!("Could not read transfers of trip {}:\n{:#?}", args.trip, it);
        exit(1);
    });
    for record in records {
        println!(
            "{} {:?} seat {} -> {:?} seat {} by {} ({})",
            record.transferred_at,
            record.origin_trip,
            record.origin_seat,
            record.destination_trip,
            record.destination_seat,
            record.operator,
            record.reason
        );
    }
}

#[derive(Args, Clone, Debug)]
struct CreateTripArgs {
    #[clap(flatten)]
    db: DbArgs,

    #[arg(short = 's', long, help = "Station code, e.g. CKY.")]
    station: String,

    #[arg(short = 'r', long, help = "Route name at the station.")]
    route: String,

    #[arg(long, help = "Departure date, YYYY-MM-DD.")]
    date: String,

    #[arg(long, help = "Departure time, HH:MM.")]
    time: String,

    #[arg(short = 'p', long)]
    period: Period,

    #[arg(short = 'i', long, default_value_t = 1)]
    departure_index: u32,
}
fn main_create_trip(args: &CreateTripArgs) {
    let conn = open_db(&args.db);
    let station = registry::station_by_code(&conn, &args.station)
        .unwrap_or_else(|it| {
            error!("Could not look up station:\n{:#?}", it);
            exit(1);
        })
        .unwrap_or_else(|| {
            error!("No such station: {}", args.station);
            exit(1);
        });
    let route = registry::route_by_name(&conn, station.id, &args.route)
        .unwrap_or_else(|it| {
            error!("Could not look up route:\n{:#?}", it);
            exit(1);
        })
        .unwrap_or_else(|| {
            error!("No route {} at station {}", args.route, args.station);
            exit(1);
        });
    let date = chrono::NaiveDate::parse_from_str(&args.date, "%Y-%m-%d").unwrap_or_else(|_| {
        error!("Invalid date: {}", args.date);
        exit(1);
    });
    let time = chrono::NaiveTime::parse_from_str(&args.time, "%H:%M").unwrap_or_else(|_| {
        error!("Invalid time: {}", args.time);
        exit(1);
    });
    let trip = trips::create_trip(
        &conn,
        &TripKey {
            station: station.id,
            route,
            date,
            time,
            period: args.period,
            departure_index: args.departure_index,
        },
    )
    .unwrap_or_else(|it| {
        error!("Could not create trip:\n{:#?}", it);
        exit(1);
    });
    println!("Created trip {}", trip.0);
}

#[derive(Args, Clone, Debug)]
struct AssignVehicleArgs {
    #[clap(flatten)]
    db: DbArgs,

    #[arg(short = 't', long)]
    trip: i64,

    #[arg(short = 'v', long, help = "Vehicle registration plate.")]
    vehicle: String,
}
fn main_assign_vehicle(args: &AssignVehicleArgs) {
    let conn = open_db(&args.db);
    let vehicle = registry::vehicle_by_registration(&conn, &args.vehicle)
        .unwrap_or_else(|it| {
            error!("Could not look up vehicle:\n{:#?}", it);
            exit(1);
        })
        .unwrap_or_else(|| {
            error!("No such vehicle: {}", args.vehicle);
            exit(1);
        });
    trips::assign_vehicle(&conn, TripId(args.trip), vehicle.id).unwrap_or_else(|it| {
        error!("Could not assign {} to trip {}:\n{:#?}", args.vehicle, args.trip, it);
        exit(1);
    });
    println!("Assigned {} to trip {}", vehicle.registration, args.trip);
}

#[derive(Args, Clone, Debug)]
struct AdvanceTripArgs {
    #[clap(flatten)]
    db: DbArgs,

    #[arg(short = 't', long)]
    trip: i64,

    #[arg(short = 's', long, help = "scheduled, in_progress, completed or cancelled.")]
    status: TripStatus,
}
fn main_advance_trip(args: &AdvanceTripArgs) {
    let conn = open_db(&args.db);
    trips::advance_status(&conn, TripId(args.trip), args.status).unwrap_or_else(|it| {
        error!("Could not advance trip {}:\n{:#?}", args.trip, it);
        exit(1);
    });
    println!("Trip {} is now {}", args.trip, args.status.as_str());
}

#[derive(Args, Clone, Debug)]
struct TicketArgs {
    #[clap(flatten)]
    db: DbArgs,

    #[arg(short = 't', long)]
    ticket: i64,
}
fn main_ticket(args: &TicketArgs) {
    let conn = open_db(&args.db);
    let company = registry::company(&conn).unwrap_or_else(|it| {
        error!("Could not read company configuration:\n{:#?}", it);
        exit(1);
    });
    let summary = booking::ticket_summary(&conn, TicketId(args.ticket), company.as_ref())
        .unwrap_or_else(|it| {
            error!("Could not load ticket {}:\n{:#?}", args.ticket, it);
            exit(1);
        });
    if let Some(name) = &summary.company_name {
        println!("{name}");
    }
    println!("{} - {}", summary.station_name, summary.station_city);
    println!("Ticket {}", summary.number);
    println!("{} ({})", summary.customer_name, summary.customer_phone);
    println!("{} -> {}", summary.route, summary.destination_city);
    println!(
        "{} {} ({}, departure {})",
        summary.departure_date,
        summary.departure_time.format("%H:%M"),
        summary.period.as_str(),
        summary.departure_index
    );
    println!(
        "Seat {}  {}  {} ({})",
        summary.seat,
        summary.amount,
        summary.status.as_str(),
        summary.payment_method.as_str()
    );
    if let Some(phone) = &summary.company_phone {
        println!("{phone}");
    }
}

#[derive(Args, Clone, Debug)]
struct SimulateArgs {
    #[arg(short = 's', long, help = "Run a single seed instead of the default batch.")]
    seed: Option<u64>,

    #[arg(short = 'r', long, default_value_t = 1000)]
    rounds: usize,
}
fn main_simulate(args: &SimulateArgs) {
    match args.seed {
        Some(seed) => simulate::run(seed, args.rounds),
        None => simulate::run_samples(args.rounds),
    }
}

fn main() {
    env_logger::builder().parse_env("LOG").init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Init(args) => main_init(&args),
        Commands::Seats(args) => main_seats(&args),
        Commands::Sell(args) => main_sell(&args),
        Commands::SellRange(args) => main_sell_range(&args),
        Commands::Pay(args) => main_pay(&args),
        Commands::Transfer(args) => main_transfer(&args),
        Commands::Transfers(args) => main_transfers(&args),
        Commands::CreateTrip(args) => main_create_trip(&args),
        Commands::AssignVehicle(args) => main_assign_vehicle(&args),
        Commands::AdvanceTrip(args) => main_advance_trip(&args),
        Commands::Ticket(args) => main_ticket(&args),
        Commands::Simulate(args) => main_simulate(&args),
    }
}
