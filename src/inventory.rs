//! Seat occupancy of one trip: the disjoint partition of the sellable
//! seats into available, reserved and paid. Always derived from the
//! ticket rows on demand; occupancy is never cached or persisted, since
//! any number of operators may be selling on the trip concurrently.

use sqlite::Connection;

use crate::col::{set_new, HashSet};
use crate::layout::{self, CellKind, LayoutConfig, SeatCell};
use crate::primitives::SeatNumber;
use crate::store::trips::{self, TripError};
use crate::ticket::TicketStatus;
use crate::trip::{TripId, TripRow};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeatState {
    Available,
    Reserved,
    Paid,
    NonSellable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Occupancy {
    pub available: usize,
    pub reserved: usize,
    pub paid: usize,
}

/// Occupancy snapshot of a trip. Stale the moment it is returned; every
/// write path re-validates against the store inside its own transaction.
#[derive(Debug)]
pub struct Inventory {
    sellable: Vec<SeatNumber>,
    reserved: HashSet<SeatNumber>,
    paid: HashSet<SeatNumber>,
    layout: Option<LayoutConfig>,
    capacity: u32,
}

impl Inventory {
    /// Pure resolution from the vehicle profile and the non-transferred
    /// tickets of the trip. A trip without a vehicle has no seats.
    pub fn resolve(
        profile: Option<(u32, Option<LayoutConfig>)>,
        usage: &[(SeatNumber, TicketStatus)],
    ) -> Inventory {
        let (capacity, layout) = match profile {
            Some((capacity, layout)) => (capacity, layout),
            None => (0, None),
        };
        let sellable = layout::sellable_seats(layout.as_ref(), capacity);
        let mut reserved = set_new();
        let mut paid = set_new();
        for &(seat, status) in usage {
            match status {
                TicketStatus::Reserved => reserved.insert(seat),
                TicketStatus::Paid => paid.insert(seat),
                // Transferred tickets are filtered out at the store, but
                // tolerate them here as well.
                TicketStatus::Transferred => false,
            };
        }
        Inventory {
            sellable,
            reserved,
            paid,
            layout,
            capacity,
        }
    }

    /// Loads and resolves the current occupancy of a trip.
    pub fn for_trip(conn: &Connection, row: &TripRow) -> Result<Inventory, TripError> {
        let profile = trips::vehicle_profile(conn, row)?;
        let usage = trips::seat_usage(conn, row.id)?;
        Ok(Inventory::resolve(profile, &usage))
    }

    pub fn load(conn: &Connection, id: TripId) -> Result<Inventory, TripError> {
        let row = trips::trip(conn, id)?.ok_or(TripError::NotFound(id))?;
        Inventory::for_trip(conn, &row)
    }

    pub fn sellable_seats(&self) -> &[SeatNumber] {
        &self.sellable
    }

    /// Sellable seats no non-transferred ticket occupies, ascending.
    pub fn available_seats(&self) -> Vec<SeatNumber> {
        self.sellable
            .iter()
            .copied()
            .filter(|seat| !self.reserved.contains(seat) && !self.paid.contains(seat))
            .collect()
    }

    pub fn seat_is_available(&self, seat: SeatNumber) -> bool {
        self.sellable.contains(&seat)
            && !self.reserved.contains(&seat)
            && !self.paid.contains(&seat)
    }

    pub fn occupancy_counts(&self) -> Occupancy {
        let mut counts = Occupancy::default();
        for seat in &self.sellable {
            if self.paid.contains(seat) {
                counts.paid += 1;
            } else if self.reserved.contains(seat) {
                counts.reserved += 1;
            } else {
                counts.available += 1;
            }
        }
        counts
    }

    /// The full display grid with occupancy overlaid on the static
    /// layout. Cell classification comes from the layout module; only the
    /// occupancy states are decided here.
    pub fn seat_grid(&self) -> Vec<Vec<(SeatCell, SeatState)>> {
        layout::display_grid(self.layout.as_ref(), self.capacity)
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|cell| {
                        let state = match (cell.kind, cell.number) {
                            (CellKind::Aisle, _) | (_, None) => SeatState::NonSellable,
                            (CellKind::NonSellable, _) => SeatState::NonSellable,
                            (CellKind::Sellable, Some(seat)) => {
                                if self.paid.contains(&seat) {
                                    SeatState::Paid
                                } else if self.reserved.contains(&seat) {
                                    SeatState::Reserved
                                } else {
                                    SeatState::Available
                                }
                            }
                        };
                        (cell, state)
                    })
                    .collect()
            })
            .collect()
    }
}
