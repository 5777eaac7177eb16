/// A seat number as printed on the vehicle. Numbering starts at 1.
pub type SeatNumber = u32;

/// A ticket price in the smallest currency unit (no decimals are used).
pub type Amount = i64;
