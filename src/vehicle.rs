use std::fmt::Debug;
use std::str::FromStr;

use num_derive::FromPrimitive;
use serde::Deserialize;

use crate::layout::LayoutConfig;

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct VehicleId(pub i64);
impl Debug for VehicleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("v#{}", self.0))
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModelId(pub i64);
impl Debug for ModelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("m#{}", self.0))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleState {
    Active = 0,
    UnderRepair = 1,
    Retired = 2,
}

impl FromStr for VehicleState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(VehicleState::Active),
            "under_repair" => Ok(VehicleState::UnderRepair),
            "retired" => Ok(VehicleState::Retired),
            other => Err(format!("unknown vehicle state: {other}")),
        }
    }
}

/// A vehicle model: nominal seat count plus the optional seat grid. The
/// grid decides which seats are actually sellable.
#[derive(Debug, Clone)]
pub struct VehicleModel {
    pub id: ModelId,
    pub name: String,
    pub brand: String,
    pub capacity: u32,
    pub layout: Option<LayoutConfig>,
}

#[derive(Debug, Clone)]
pub struct Vehicle {
    pub id: VehicleId,
    pub registration: String,
    pub model: ModelId,
    pub state: VehicleState,
}
