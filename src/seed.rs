//! Seed import: the station network, vehicle fleet, and departure plan
//! are described by a directory of CSV files and loaded into an empty
//! database. Rows reference each other by code or name, never by row id,
//! so seed files survive re-imports and reordering.

use std::fs::File;
use std::path::Path;

use chrono::{NaiveDate, NaiveTime};
use log::info;
use serde::Deserialize;
use sqlite::Connection;

use crate::layout::{LayoutConfig, LayoutError};
use crate::primitives::Amount;
use crate::store::registry::{self, CompanyInfo, RegistryError};
use crate::store::trips::{self, TripError};
use crate::trip::{Period, TripKey};
use crate::vehicle::VehicleState;

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct StationRecord {
    pub code: String,
    pub name: String,
    pub city: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RouteRecord {
    pub station: String,
    pub name: String,
    pub origin_city: String,
    pub destination_city: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct DestinationRecord {
    pub station: String,
    pub route: String,
    pub city: String,
    pub price: Amount,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct VehicleModelRecord {
    pub name: String,
    pub brand: String,
    pub capacity: u32,
    /// Path to a layout JSON file, relative to the seed directory. Models
    /// without one fall back to the dense default grid.
    pub layout: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct VehicleRecord {
    pub registration: String,
    pub model: String,
    pub state: VehicleState,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct TripRecord {
    pub station: String,
    pub route: String,
    pub date: String,
    pub time: String,
    pub period: Period,
    pub departure_index: u32,
    pub vehicle: Option<String>,
}

#[derive(Debug)]
pub enum SeedError {
    Io(std::io::Error),
    Csv { file: Box<str>, error: csv::Error },
    Layout { file: Box<str>, error: LayoutError },
    UnknownStation(String),
    UnknownRoute { station: String, route: String },
    UnknownModel(String),
    UnknownVehicle(String),
    MissingCompanyKey(Box<str>),
    Trip(TripError),
    Registry(RegistryError),
    Storage(sqlite::Error),
}

impl From<std::io::Error> for SeedError {
    fn from(err: std::io::Error) -> Self {
        SeedError::Io(err)
    }
}

impl From<sqlite::Error> for SeedError {
    fn from(err: sqlite::Error) -> Self {
        SeedError::Storage(err)
    }
}

impl From<TripError> for SeedError {
    fn from(err: TripError) -> Self {
        match err {
            TripError::Storage(err) => SeedError::Storage(err),
            other => SeedError::Trip(other),
        }
    }
}

impl From<RegistryError> for SeedError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::Storage(err) => SeedError::Storage(err),
            other => SeedError::Registry(other),
        }
    }
}

fn reader() -> csv::ReaderBuilder {
    let mut builder = csv::ReaderBuilder::new();
    builder.trim(csv::Trim::All);

    builder
}

pub fn parse_stations(stream: impl std::io::Read) -> Result<Box<[StationRecord]>, csv::Error> {
    reader().from_reader(stream).deserialize().collect()
}
pub fn parse_routes(stream: impl std::io::Read) -> Result<Box<[RouteRecord]>, csv::Error> {
    reader().from_reader(stream).deserialize().collect()
}
pub fn parse_destinations(
    stream: impl std::io::Read,
) -> Result<Box<[DestinationRecord]>, csv::Error> {
    reader().from_reader(stream).deserialize().collect()
}
pub fn parse_models(stream: impl std::io::Read) -> Result<Box<[VehicleModelRecord]>, csv::Error> {
    reader().from_reader(stream).deserialize().collect()
}
pub fn parse_vehicles(stream: impl std::io::Read) -> Result<Box<[VehicleRecord]>, csv::Error> {
    reader().from_reader(stream).deserialize().collect()
}
pub fn parse_trips(stream: impl std::io::Read) -> Result<Box<[TripRecord]>, csv::Error> {
    reader().from_reader(stream).deserialize().collect()
}

/// `company.csv` is a key/value file: `key,value` rows for `name`,
/// `address` and `phone`.
pub fn parse_company(stream: impl std::io::Read) -> Result<CompanyInfo, SeedError> {
    let pairs = reader()
        .from_reader(stream)
        .deserialize()
        .collect::<Result<Box<[(String, String)]>, csv::Error>>()
        .map_err(|error| SeedError::Csv {
            file: "company.csv".into(),
            error,
        })?;
    let mut map = pairs
        .iter()
        .cloned()
        .collect::<std::collections::HashMap<_, _>>();
    Ok(CompanyInfo {
        name: map
            .remove("name")
            .ok_or(SeedError::MissingCompanyKey("name".into()))?,
        address: map.remove("address").unwrap_or_default(),
        phone: map.remove("phone").unwrap_or_default(),
    })
}

/// Imports every seed file present in `dir`. Missing files are skipped so
/// a seed directory can carry only the parts it needs.
pub fn import_dir(conn: &Connection, dir: &Path) -> Result<(), SeedError> {
    if let Some(stream) = open_if_present(dir, "company.csv")? {
        let company = parse_company(stream)?;
        registry::set_company(conn, &company)?;
        info!("Imported company configuration");
    }
    if let Some(stream) = open_if_present(dir, "stations.csv")? {
        let records = parse_file("stations.csv", parse_stations(stream))?;
        for record in &records {
            registry::insert_station(conn, &record.code, &record.name, &record.city)?;
        }
        info!("Imported {} stations", records.len());
    }
    if let Some(stream) = open_if_present(dir, "routes.csv")? {
        let records = parse_file("routes.csv", parse_routes(stream))?;
        for record in &records {
            let station = lookup_station(conn, &record.station)?;
            registry::insert_route(
                conn,
                station,
                &record.name,
                &record.origin_city,
                &record.destination_city,
            )?;
        }
        info!("Imported {} routes", records.len());
    }
    if let Some(stream) = open_if_present(dir, "destinations.csv")? {
        let records = parse_file("destinations.csv", parse_destinations(stream))?;
        for record in &records {
            let station = lookup_station(conn, &record.station)?;
            let route = lookup_route(conn, station, &record.station, &record.route)?;
            registry::insert_destination(conn, station, route, &record.city, record.price)?;
        }
        info!("Imported {} destinations", records.len());
    }
    if let Some(stream) = open_if_present(dir, "vehicle_models.csv")? {
        let records = parse_file("vehicle_models.csv", parse_models(stream))?;
        for record in &records {
            let layout = record
                .layout
                .as_deref()
                .map(|file| load_layout(dir, file))
                .transpose()?;
            registry::insert_model(
                conn,
                &record.name,
                &record.brand,
                record.capacity,
                layout.as_ref(),
            )?;
        }
        info!("Imported {} vehicle models", records.len());
    }
    if let Some(stream) = open_if_present(dir, "vehicles.csv")? {
        let records = parse_file("vehicles.csv", parse_vehicles(stream))?;
        for record in &records {
            let model = registry::model_by_name(conn, &record.model)?
                .ok_or_else(|| SeedError::UnknownModel(record.model.clone()))?;
            registry::insert_vehicle(conn, &record.registration, model, record.state)?;
        }
        info!("Imported {} vehicles", records.len());
    }
    if let Some(stream) = open_if_present(dir, "trips.csv")? {
        let records = parse_file("trips.csv", parse_trips(stream))?;
        for record in &records {
            let station = lookup_station(conn, &record.station)?;
            let route = lookup_route(conn, station, &record.station, &record.route)?;
            let key = TripKey {
                station,
                route,
                date: NaiveDate::parse_from_str(&record.date, "%Y-%m-%d")
                    .map_err(|_| TripError::BadDate(record.date.clone()))
                    .map_err(SeedError::Trip)?,
                time: NaiveTime::parse_from_str(&record.time, "%H:%M")
                    .map_err(|_| TripError::BadTime(record.time.clone()))
                    .map_err(SeedError::Trip)?,
                period: record.period,
                departure_index: record.departure_index,
            };
            let trip = trips::create_trip(conn, &key)?;
            if let Some(registration) = record.vehicle.as_deref() {
                let vehicle = registry::vehicle_by_registration(conn, registration)?
                    .ok_or_else(|| SeedError::UnknownVehicle(registration.to_owned()))?;
                trips::assign_vehicle(conn, trip, vehicle.id)?;
            }
        }
        info!("Imported {} trips", records.len());
    }
    Ok(())
}

fn open_if_present(dir: &Path, name: &str) -> Result<Option<File>, std::io::Error> {
    let path = dir.join(name);
    if path.exists() {
        Ok(Some(File::open(path)?))
    } else {
        Ok(None)
    }
}

fn parse_file<T>(file: &str, parsed: Result<Box<[T]>, csv::Error>) -> Result<Box<[T]>, SeedError> {
    parsed.map_err(|error| SeedError::Csv {
        file: file.into(),
        error,
    })
}

fn load_layout(dir: &Path, file: &str) -> Result<LayoutConfig, SeedError> {
    let text = std::fs::read_to_string(dir.join(file))?;
    LayoutConfig::from_json(&text).map_err(|error| SeedError::Layout {
        file: file.into(),
        error,
    })
}

fn lookup_station(
    conn: &Connection,
    code: &str,
) -> Result<crate::store::registry::StationId, SeedError> {
    registry::station_by_code(conn, code)?
        .map(|it| it.id)
        .ok_or_else(|| SeedError::UnknownStation(code.to_owned()))
}

fn lookup_route(
    conn: &Connection,
    station: crate::store::registry::StationId,
    station_code: &str,
    route: &str,
) -> Result<crate::store::registry::RouteId, SeedError> {
    registry::route_by_name(conn, station, route)?.ok_or_else(|| SeedError::UnknownRoute {
        station: station_code.to_owned(),
        route: route.to_owned(),
    })
}
