//! Row access for the reference data: company, stations, routes,
//! destinations, vehicle models and vehicles. Trip and ticket rows live in
//! [`crate::store::trips`] and [`crate::booking`].

use std::fmt::Debug;

use sqlite::{Connection, State};

use crate::layout::{LayoutConfig, LayoutError};
use crate::primitives::Amount;
use crate::store::last_insert_id;
use crate::vehicle::{ModelId, Vehicle, VehicleModel, VehicleState};

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct StationId(pub i64);
impl Debug for StationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("s#{}", self.0))
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RouteId(pub i64);
impl Debug for RouteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("r#{}", self.0))
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct DestinationId(pub i64);
impl Debug for DestinationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("d#{}", self.0))
    }
}

#[derive(Debug)]
pub enum RegistryError {
    Storage(sqlite::Error),
    /// A stored layout no longer parses. Can only happen after the column
    /// was edited outside the application; layouts are validated on save.
    CorruptLayout { model: ModelId, error: LayoutError },
    InvalidEnum { table: &'static str, value: i64 },
}

impl From<sqlite::Error> for RegistryError {
    fn from(err: sqlite::Error) -> Self {
        RegistryError::Storage(err)
    }
}

/// The one-row company configuration. Read once and injected where
/// needed; there is no global mutable company state.
#[derive(Debug, Clone)]
pub struct CompanyInfo {
    pub name: String,
    pub address: String,
    pub phone: String,
}

#[derive(Debug, Clone)]
pub struct StationRow {
    pub id: StationId,
    pub code: String,
    pub name: String,
    pub city: String,
}

#[derive(Debug, Clone)]
pub struct RouteRow {
    pub id: RouteId,
    pub station: StationId,
    pub name: String,
    pub origin_city: String,
    pub destination_city: String,
}

#[derive(Debug, Clone)]
pub struct DestinationRow {
    pub id: DestinationId,
    pub station: StationId,
    pub route: RouteId,
    pub city: String,
    pub price: Amount,
    pub active: bool,
}

pub fn set_company(conn: &Connection, info: &CompanyInfo) -> Result<(), sqlite::Error> {
    let mut stmt = conn.prepare(
        "INSERT INTO company (id, name, address, phone) VALUES (1, ?, ?, ?)
         ON CONFLICT (id) DO UPDATE SET name = excluded.name,
             address = excluded.address, phone = excluded.phone;",
    )?;
    stmt.bind((1, info.name.as_str()))?;
    stmt.bind((2, info.address.as_str()))?;
    stmt.bind((3, info.phone.as_str()))?;
    stmt.next()?;
    Ok(())
}

pub fn company(conn: &Connection) -> Result<Option<CompanyInfo>, sqlite::Error> {
    let mut stmt = conn.prepare("SELECT name, address, phone FROM company WHERE id = 1;")?;
    match stmt.next()? {
        State::Row => Ok(Some(CompanyInfo {
            name: stmt.read(0)?,
            address: stmt.read(1)?,
            phone: stmt.read(2)?,
        })),
        State::Done => Ok(None),
    }
}

pub fn insert_station(
    conn: &Connection,
    code: &str,
    name: &str,
    city: &str,
) -> Result<StationId, sqlite::Error> {
    let mut stmt = conn.prepare("INSERT INTO station (code, name, city) VALUES (?, ?, ?);")?;
    stmt.bind((1, code))?;
    stmt.bind((2, name))?;
    stmt.bind((3, city))?;
    stmt.next()?;
    Ok(StationId(last_insert_id(conn)?))
}

pub fn station(conn: &Connection, id: StationId) -> Result<Option<StationRow>, sqlite::Error> {
    let mut stmt = conn.prepare("SELECT id, code, name, city FROM station WHERE id = ?;")?;
    stmt.bind((1, id.0))?;
    read_station(&mut stmt)
}

pub fn station_by_code(
    conn: &Connection,
    code: &str,
) -> Result<Option<StationRow>, sqlite::Error> {
    let mut stmt = conn.prepare("SELECT id, code, name, city FROM station WHERE code = ?;")?;
    stmt.bind((1, code))?;
    read_station(&mut stmt)
}

fn read_station(stmt: &mut sqlite::Statement) -> Result<Option<StationRow>, sqlite::Error> {
    match stmt.next()? {
        State::Row => Ok(Some(StationRow {
            id: StationId(stmt.read(0)?),
            code: stmt.read(1)?,
            name: stmt.read(2)?,
            city: stmt.read(3)?,
        })),
        State::Done => Ok(None),
    }
}

pub fn insert_route(
    conn: &Connection,
    station: StationId,
    name: &str,
    origin_city: &str,
    destination_city: &str,
) -> Result<RouteId, sqlite::Error> {
    let mut stmt = conn.prepare(
        "INSERT INTO route (station_id, name, origin_city, destination_city) VALUES (?, ?, ?, ?);",
    )?;
    stmt.bind((1, station.0))?;
    stmt.bind((2, name))?;
    stmt.bind((3, origin_city))?;
    stmt.bind((4, destination_city))?;
    stmt.next()?;
    Ok(RouteId(last_insert_id(conn)?))
}

pub fn route(conn: &Connection, id: RouteId) -> Result<Option<RouteRow>, sqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT id, station_id, name, origin_city, destination_city FROM route WHERE id = ?;",
    )?;
    stmt.bind((1, id.0))?;
    match stmt.next()? {
        State::Row => Ok(Some(RouteRow {
            id: RouteId(stmt.read(0)?),
            station: StationId(stmt.read(1)?),
            name: stmt.read(2)?,
            origin_city: stmt.read(3)?,
            destination_city: stmt.read(4)?,
        })),
        State::Done => Ok(None),
    }
}

pub fn route_by_name(
    conn: &Connection,
    station: StationId,
    name: &str,
) -> Result<Option<RouteId>, sqlite::Error> {
    let mut stmt = conn.prepare("SELECT id FROM route WHERE station_id = ? AND name = ?;")?;
    stmt.bind((1, station.0))?;
    stmt.bind((2, name))?;
    match stmt.next()? {
        State::Row => Ok(Some(RouteId(stmt.read(0)?))),
        State::Done => Ok(None),
    }
}

pub fn insert_destination(
    conn: &Connection,
    station: StationId,
    route: RouteId,
    city: &str,
    price: Amount,
) -> Result<DestinationId, sqlite::Error> {
    let mut stmt = conn.prepare(
        "INSERT INTO destination (station_id, route_id, city, price) VALUES (?, ?, ?, ?);",
    )?;
    stmt.bind((1, station.0))?;
    stmt.bind((2, route.0))?;
    stmt.bind((3, city))?;
    stmt.bind((4, price))?;
    stmt.next()?;
    Ok(DestinationId(last_insert_id(conn)?))
}

pub fn destination(
    conn: &Connection,
    id: DestinationId,
) -> Result<Option<DestinationRow>, sqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT id, station_id, route_id, city, price, active FROM destination WHERE id = ?;",
    )?;
    stmt.bind((1, id.0))?;
    match stmt.next()? {
        State::Row => Ok(Some(DestinationRow {
            id: DestinationId(stmt.read(0)?),
            station: StationId(stmt.read(1)?),
            route: RouteId(stmt.read(2)?),
            city: stmt.read(3)?,
            price: stmt.read(4)?,
            active: stmt.read::<i64, _>(5)? != 0,
        })),
        State::Done => Ok(None),
    }
}

/// Active destinations a trip on (station, route) may be sold towards,
/// cheapest first.
pub fn destinations_for(
    conn: &Connection,
    station: StationId,
    route: RouteId,
) -> Result<Vec<DestinationRow>, sqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT id, station_id, route_id, city, price, active FROM destination
         WHERE station_id = ? AND route_id = ? AND active = 1 ORDER BY price ASC;",
    )?;
    stmt.bind((1, station.0))?;
    stmt.bind((2, route.0))?;
    let mut rows = Vec::new();
    while let State::Row = stmt.next()? {
        rows.push(DestinationRow {
            id: DestinationId(stmt.read(0)?),
            station: StationId(stmt.read(1)?),
            route: RouteId(stmt.read(2)?),
            city: stmt.read(3)?,
            price: stmt.read(4)?,
            active: stmt.read::<i64, _>(5)? != 0,
        });
    }
    Ok(rows)
}

pub fn insert_model(
    conn: &Connection,
    name: &str,
    brand: &str,
    capacity: u32,
    layout: Option<&LayoutConfig>,
) -> Result<ModelId, RegistryError> {
    if let Some(layout) = layout {
        layout
            .validate()
            .map_err(|error| RegistryError::CorruptLayout {
                model: ModelId(0),
                error,
            })?;
    }
    let mut stmt = conn
        .prepare("INSERT INTO vehicle_model (name, brand, capacity, layout) VALUES (?, ?, ?, ?);")
        .map_err(RegistryError::Storage)?;
    stmt.bind((1, name)).map_err(RegistryError::Storage)?;
    stmt.bind((2, brand)).map_err(RegistryError::Storage)?;
    stmt.bind((3, capacity as i64))
        .map_err(RegistryError::Storage)?;
    stmt.bind((4, layout.map(|it| it.to_json()).as_deref()))
        .map_err(RegistryError::Storage)?;
    stmt.next().map_err(RegistryError::Storage)?;
    Ok(ModelId(last_insert_id(conn).map_err(RegistryError::Storage)?))
}

pub fn model(conn: &Connection, id: ModelId) -> Result<Option<VehicleModel>, RegistryError> {
    let mut stmt =
        conn.prepare("SELECT id, name, brand, capacity, layout FROM vehicle_model WHERE id = ?;")?;
    stmt.bind((1, id.0))?;
    match stmt.next()? {
        State::Row => {
            let model_id = ModelId(stmt.read(0)?);
            let layout_json: Option<String> = stmt.read(4)?;
            let layout = layout_json
                .map(|text| LayoutConfig::from_json(&text))
                .transpose()
                .map_err(|error| RegistryError::CorruptLayout {
                    model: model_id,
                    error,
                })?;
            Ok(Some(VehicleModel {
                id: model_id,
                name: stmt.read(1)?,
                brand: stmt.read(2)?,
                capacity: stmt.read::<i64, _>(3)? as u32,
                layout,
            }))
        }
        State::Done => Ok(None),
    }
}

pub fn model_by_name(conn: &Connection, name: &str) -> Result<Option<ModelId>, sqlite::Error> {
    let mut stmt = conn.prepare("SELECT id FROM vehicle_model WHERE name = ?;")?;
    stmt.bind((1, name))?;
    match stmt.next()? {
        State::Row => Ok(Some(ModelId(stmt.read(0)?))),
        State::Done => Ok(None),
    }
}

pub fn insert_vehicle(
    conn: &Connection,
    registration: &str,
    model: ModelId,
    state: VehicleState,
) -> Result<crate::vehicle::VehicleId, sqlite::Error> {
    let mut stmt =
        conn.prepare("INSERT INTO vehicle (registration, model_id, state) VALUES (?, ?, ?);")?;
    stmt.bind((1, registration))?;
    stmt.bind((2, model.0))?;
    stmt.bind((3, state as i64))?;
    stmt.next()?;
    Ok(crate::vehicle::VehicleId(last_insert_id(conn)?))
}

pub fn vehicle(
    conn: &Connection,
    id: crate::vehicle::VehicleId,
) -> Result<Option<Vehicle>, RegistryError> {
    let mut stmt =
        conn.prepare("SELECT id, registration, model_id, state FROM vehicle WHERE id = ?;")?;
    stmt.bind((1, id.0))?;
    read_vehicle(&mut stmt)
}

pub fn vehicle_by_registration(
    conn: &Connection,
    registration: &str,
) -> Result<Option<Vehicle>, RegistryError> {
    let mut stmt =
        conn.prepare("SELECT id, registration, model_id, state FROM vehicle WHERE registration = ?;")?;
    stmt.bind((1, registration))?;
    read_vehicle(&mut stmt)
}

fn read_vehicle(stmt: &mut sqlite::Statement) -> Result<Option<Vehicle>, RegistryError> {
    match stmt.next()? {
        State::Row => {
            let state_code: i64 = stmt.read(3)?;
            let state: VehicleState = num_traits::FromPrimitive::from_i64(state_code).ok_or(
                RegistryError::InvalidEnum {
                    table: "vehicle.state",
                    value: state_code,
                },
            )?;
            Ok(Some(Vehicle {
                id: crate::vehicle::VehicleId(stmt.read(0)?),
                registration: stmt.read(1)?,
                model: ModelId(stmt.read(2)?),
                state,
            }))
        }
        State::Done => Ok(None),
    }
}
