use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::col::{set_new, HashSet};
use crate::primitives::SeatNumber;

/// Static seat grid of a vehicle model. `None` cells are the aisle.
/// Seats listed in `excluded_seats` exist on the grid but are never sold
/// (e.g. a seat kept for the attendant).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutConfig {
    #[serde(default)]
    pub columns: u32,
    #[serde(default)]
    pub rows: Vec<LayoutRow>,
    #[serde(default)]
    pub excluded_seats: Vec<SeatNumber>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutRow {
    pub row: u32,
    pub cells: Vec<Option<SeatNumber>>,
}

#[derive(Debug)]
pub enum LayoutError {
    Json(serde_json::Error),
    NoColumns,
    NoRows,
    DuplicateSeat { seat: SeatNumber },
    UnknownExcludedSeat { seat: SeatNumber },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellKind {
    Aisle,
    Sellable,
    NonSellable,
}

/// One cell of the display grid handed to the UI layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeatCell {
    pub number: Option<SeatNumber>,
    pub kind: CellKind,
}

impl LayoutConfig {
    /// Parses and validates a layout from its JSON column representation.
    /// All structural problems are reported here, at save time; the sale
    /// path only ever sees validated layouts.
    pub fn from_json(text: &str) -> Result<LayoutConfig, LayoutError> {
        let layout: LayoutConfig = serde_json::from_str(text).map_err(LayoutError::Json)?;
        layout.validate()?;
        Ok(layout)
    }

    pub fn to_json(&self) -> String {
        // Serializing a struct of plain fields cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn validate(&self) -> Result<(), LayoutError> {
        if self.columns == 0 {
            return Err(LayoutError::NoColumns);
        }
        if self.rows.is_empty() {
            return Err(LayoutError::NoRows);
        }
        let mut seen: HashSet<SeatNumber> = set_new();
        for row in &self.rows {
            for &seat in row.cells.iter().flatten() {
                if !seen.insert(seat) {
                    return Err(LayoutError::DuplicateSeat { seat });
                }
            }
        }
        for &seat in &self.excluded_seats {
            if !seen.contains(&seat) {
                return Err(LayoutError::UnknownExcludedSeat { seat });
            }
        }
        Ok(())
    }

    /// All seat numbers that may be sold, ascending.
    pub fn sellable_seats(&self) -> Vec<SeatNumber> {
        let excluded: HashSet<SeatNumber> = self.excluded_seats.iter().copied().collect();
        self.rows
            .iter()
            .flat_map(|row| row.cells.iter().flatten())
            .copied()
            .filter(|seat| !excluded.contains(seat))
            .sorted_unstable()
            .dedup()
            .collect()
    }

    /// The grid with every cell classified, for occupancy overlays.
    pub fn display_grid(&self) -> Vec<Vec<SeatCell>> {
        let excluded: HashSet<SeatNumber> = self.excluded_seats.iter().copied().collect();
        self.rows
            .iter()
            .map(|row| {
                row.cells
                    .iter()
                    .map(|cell| match cell {
                        None => SeatCell {
                            number: None,
                            kind: CellKind::Aisle,
                        },
                        Some(seat) if excluded.contains(seat) => SeatCell {
                            number: Some(*seat),
                            kind: CellKind::NonSellable,
                        },
                        Some(seat) => SeatCell {
                            number: Some(*seat),
                            kind: CellKind::Sellable,
                        },
                    })
                    .collect()
            })
            .collect()
    }

    /// Construction helper: one aisle column (middle column unless given),
    /// every other cell numbered sequentially row-major starting at 1.
    pub fn generate(
        columns: u32,
        num_rows: u32,
        aisle_column: Option<u32>,
        excluded_seats: Vec<SeatNumber>,
    ) -> LayoutConfig {
        let aisle = aisle_column.unwrap_or(columns / 2);
        let mut next_seat: SeatNumber = 1;
        let rows = (0..num_rows)
            .map(|r| {
                let cells = (0..columns)
                    .map(|c| {
                        if c == aisle {
                            None
                        } else {
                            let seat = next_seat;
                            next_seat += 1;
                            Some(seat)
                        }
                    })
                    .collect();
                LayoutRow { row: r + 1, cells }
            })
            .collect();
        LayoutConfig {
            columns,
            rows,
            excluded_seats,
        }
    }
}

/// Sellable seats of a vehicle, falling back to a dense `1..=capacity`
/// sequence when the model has no layout configured.
pub fn sellable_seats(layout: Option<&LayoutConfig>, capacity: u32) -> Vec<SeatNumber> {
    match layout {
        Some(layout) => layout.sellable_seats(),
        None => (1..=capacity).collect(),
    }
}

/// Display grid of a vehicle. Without a layout, a default grid is built:
/// five columns with the aisle in the middle, seats numbered row-major.
pub fn display_grid(layout: Option<&LayoutConfig>, capacity: u32) -> Vec<Vec<SeatCell>> {
    match layout {
        Some(layout) => layout.display_grid(),
        None => default_grid(capacity),
    }
}

fn default_grid(capacity: u32) -> Vec<Vec<SeatCell>> {
    const COLUMNS: u32 = 5;
    const AISLE: u32 = 2;
    let seats_per_row = COLUMNS - 1;
    let num_rows = capacity.div_ceil(seats_per_row);
    let mut next_seat: SeatNumber = 1;
    let mut rows = Vec::with_capacity(num_rows as usize);
    for _ in 0..num_rows {
        let mut cells = Vec::with_capacity(COLUMNS as usize);
        for c in 0..COLUMNS {
            if c == AISLE || next_seat > capacity {
                cells.push(SeatCell {
                    number: None,
                    kind: CellKind::Aisle,
                });
            } else {
                cells.push(SeatCell {
                    number: Some(next_seat),
                    kind: CellKind::Sellable,
                });
                next_seat += 1;
            }
        }
        rows.push(cells);
    }
    rows
}
