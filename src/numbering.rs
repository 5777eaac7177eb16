//! Per-station ticket numbers: `{CODE}-{YYYYMM}-{five-digit sequence}`,
//! counter reset at each month change. The station row carries the
//! counter; before every increment the counter is raised to the highest
//! sequence already present among the month's tickets, so a desynced
//! counter (after a migration or manual edit) heals itself. Uniqueness
//! under concurrent writers is guaranteed by the unique index on the
//! ticket-number column, not by the counter; callers must run this inside
//! the same transaction as the ticket insert that consumes the number.

use chrono::NaiveDateTime;
use log::warn;
use sqlite::{Connection, State};

use crate::store::registry::StationId;

#[derive(Debug)]
pub enum NumberingError {
    StationNotFound(StationId),
    Storage(sqlite::Error),
}

impl From<sqlite::Error> for NumberingError {
    fn from(err: sqlite::Error) -> Self {
        NumberingError::Storage(err)
    }
}

pub fn next_ticket_number(
    conn: &Connection,
    station: StationId,
    now: NaiveDateTime,
) -> Result<String, NumberingError> {
    let mut stmt = conn.prepare("SELECT code, seq_month, last_seq FROM station WHERE id = ?;")?;
    stmt.bind((1, station.0))?;
    if !matches!(stmt.next()?, State::Row) {
        return Err(NumberingError::StationNotFound(station));
    }
    let code: String = stmt.read(0)?;
    let stored_month: String = stmt.read(1)?;
    let stored_seq: i64 = stmt.read(2)?;

    let month = now.format("%Y%m").to_string();
    let mut seq = if stored_month == month { stored_seq } else { 0 };

    let highest = highest_used_sequence(conn, &code, &month)?;
    if highest > seq {
        warn!(
            "Ticket counter of {} is behind its tickets ({} < {}), resyncing",
            code, seq, highest
        );
        seq = highest;
    }
    seq += 1;

    let mut stmt =
        conn.prepare("UPDATE station SET seq_month = ?, last_seq = ? WHERE id = ?;")?;
    stmt.bind((1, month.as_str()))?;
    stmt.bind((2, seq))?;
    stmt.bind((3, station.0))?;
    stmt.next()?;

    Ok(format!("{code}-{month}-{seq:05}"))
}

/// Highest sequence among the tickets already numbered for this station
/// and month. Numbers that do not parse are ignored.
fn highest_used_sequence(
    conn: &Connection,
    code: &str,
    month: &str,
) -> Result<i64, sqlite::Error> {
    let prefix = format!("{code}-{month}-");
    // `_` and `%` are LIKE wildcards; a station code containing one must
    // not match other stations' numbers.
    let pattern = prefix
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    let mut stmt = conn.prepare("SELECT number FROM ticket WHERE number LIKE ? ESCAPE '\\';")?;
    stmt.bind((1, format!("{pattern}%").as_str()))?;
    let mut highest = 0;
    while let State::Row = stmt.next()? {
        let number: String = stmt.read(0)?;
        if let Some(seq) = number.strip_prefix(&prefix).and_then(|it| it.parse::<i64>().ok()) {
            highest = highest.max(seq);
        }
    }
    Ok(highest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    use crate::sample;
    use crate::store::registry;

    fn at(date: &str) -> NaiveDateTime {
        NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
    }

    #[test]
    fn numbers_are_distinct_and_formatted() {
        let fixture = sample::sample_db();
        let now = at("2026-08-29");
        let mut seen = std::collections::HashSet::new();
        for i in 1..=1000 {
            let number = next_ticket_number(&fixture.conn, fixture.station, now).unwrap();
            assert_eq!(number, format!("CKY-202608-{i:05}"));
            assert!(seen.insert(number));
        }
    }

    #[test]
    fn month_change_resets_the_sequence() {
        let fixture = sample::sample_db();
        let august = at("2026-08-29");
        assert_eq!(
            next_ticket_number(&fixture.conn, fixture.station, august).unwrap(),
            "CKY-202608-00001"
        );
        assert_eq!(
            next_ticket_number(&fixture.conn, fixture.station, august).unwrap(),
            "CKY-202608-00002"
        );
        let september = at("2026-09-01");
        assert_eq!(
            next_ticket_number(&fixture.conn, fixture.station, september).unwrap(),
            "CKY-202609-00001"
        );
    }

    #[test]
    fn desynced_counter_skips_past_existing_tickets() {
        let fixture = sample::sample_db();
        let sold = fixture.sell_paid(1);
        assert_eq!(sold.number, "CKY-202608-00001");

        // Simulate a counter lost to a migration.
        fixture
            .conn
            .execute("UPDATE station SET last_seq = 0;")
            .unwrap();
        assert_eq!(
            next_ticket_number(&fixture.conn, fixture.station, fixture.now).unwrap(),
            "CKY-202608-00002"
        );
    }

    #[test]
    fn a_wildcard_in_a_station_code_does_not_see_other_counters() {
        let fixture = sample::sample_db();
        fixture.sell_paid(1);
        fixture.sell_paid(3);
        fixture.sell_paid(4);

        // `_` matches any single character in LIKE; the CKY numbers above
        // must not feed the resync of this station's counter.
        let station =
            registry::insert_station(&fixture.conn, "CK_", "Gare annexe", "Conakry").unwrap();
        assert_eq!(
            next_ticket_number(&fixture.conn, station, fixture.now).unwrap(),
            "CK_-202608-00001"
        );
    }

    #[test]
    fn unknown_station_is_reported() {
        let fixture = sample::sample_db();
        assert!(matches!(
            next_ticket_number(&fixture.conn, StationId(999), fixture.now),
            Err(NumberingError::StationNotFound(StationId(999)))
        ));
    }
}
