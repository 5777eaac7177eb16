pub mod registry;
pub mod trips;

use log::debug;
use sqlite::{Connection, OpenFlags, State};

/// Opens (and creates if necessary) a database file. Foreign keys are
/// enforced so that deleting a trip cascades to its tickets, and a busy
/// timeout is set so concurrent operator connections queue instead of
/// failing immediately.
pub fn open(path: &str) -> Result<Connection, sqlite::Error> {
    let mut connection = Connection::open_with_flags(
        path,
        OpenFlags::default()
            .with_create()
            .with_no_mutex()
            .with_read_write(),
    )?;
    connection.execute("PRAGMA foreign_keys = ON;")?;
    connection.set_busy_timeout(5_000)?;
    Ok(connection)
}

/// Creates the schema. The two unique indexes on `ticket` are the final
/// authority for seat and number uniqueness under concurrent writers; the
/// application-level checks before an insert are only a fast path.
pub fn init_schema(connection: &Connection) -> Result<(), sqlite::Error> {
    debug!("Creating schema");
    connection.execute(
        "
        CREATE TABLE IF NOT EXISTS company (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            name TEXT NOT NULL,
            address TEXT NOT NULL DEFAULT '',
            phone TEXT NOT NULL DEFAULT ''
        );
        CREATE TABLE IF NOT EXISTS station (
            id INTEGER PRIMARY KEY NOT NULL,
            code TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            city TEXT NOT NULL,
            seq_month TEXT NOT NULL DEFAULT '',
            last_seq INTEGER NOT NULL DEFAULT 0
        );
        CREATE TABLE IF NOT EXISTS route (
            id INTEGER PRIMARY KEY NOT NULL,
            station_id INTEGER NOT NULL REFERENCES station(id),
            name TEXT NOT NULL,
            origin_city TEXT NOT NULL,
            destination_city TEXT NOT NULL,
            UNIQUE (station_id, name)
        );
        CREATE TABLE IF NOT EXISTS destination (
            id INTEGER PRIMARY KEY NOT NULL,
            station_id INTEGER NOT NULL REFERENCES station(id),
            route_id INTEGER NOT NULL REFERENCES route(id),
            city TEXT NOT NULL,
            price INTEGER NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            UNIQUE (station_id, route_id, city)
        );
        CREATE TABLE IF NOT EXISTS vehicle_model (
            id INTEGER PRIMARY KEY NOT NULL,
            name TEXT NOT NULL UNIQUE,
            brand TEXT NOT NULL,
            capacity INTEGER NOT NULL,
            layout TEXT
        );
        CREATE TABLE IF NOT EXISTS vehicle (
            id INTEGER PRIMARY KEY NOT NULL,
            registration TEXT NOT NULL UNIQUE,
            model_id INTEGER NOT NULL REFERENCES vehicle_model(id),
            state INTEGER NOT NULL DEFAULT 0
        );
        CREATE TABLE IF NOT EXISTS trip (
            id INTEGER PRIMARY KEY NOT NULL,
            station_id INTEGER NOT NULL REFERENCES station(id),
            route_id INTEGER NOT NULL REFERENCES route(id),
            date TEXT NOT NULL,
            time TEXT NOT NULL,
            period INTEGER NOT NULL,
            departure_index INTEGER NOT NULL,
            vehicle_id INTEGER REFERENCES vehicle(id),
            status INTEGER NOT NULL DEFAULT 0,
            UNIQUE (station_id, route_id, date, time, period, departure_index)
        );
        CREATE TABLE IF NOT EXISTS ticket (
            id INTEGER PRIMARY KEY NOT NULL,
            number TEXT NOT NULL UNIQUE,
            trip_id INTEGER NOT NULL REFERENCES trip(id) ON DELETE CASCADE,
            destination_id INTEGER NOT NULL REFERENCES destination(id),
            customer_name TEXT NOT NULL,
            customer_phone TEXT NOT NULL,
            seat INTEGER NOT NULL,
            amount INTEGER NOT NULL,
            status INTEGER NOT NULL DEFAULT 0,
            payment_method INTEGER NOT NULL DEFAULT 0,
            operator TEXT NOT NULL,
            created_at TEXT NOT NULL,
            paid_at TEXT,
            successor_id INTEGER REFERENCES ticket(id)
        );
        CREATE UNIQUE INDEX IF NOT EXISTS ticket_seat_in_use
            ON ticket (trip_id, seat) WHERE status != 2;
        CREATE TABLE IF NOT EXISTS transfer_log (
            id INTEGER PRIMARY KEY NOT NULL,
            origin_ticket_id INTEGER NOT NULL,
            new_ticket_id INTEGER NOT NULL,
            origin_trip_id INTEGER NOT NULL,
            destination_trip_id INTEGER NOT NULL,
            origin_seat INTEGER NOT NULL,
            destination_seat INTEGER NOT NULL,
            operator TEXT NOT NULL,
            reason TEXT NOT NULL,
            transferred_at TEXT NOT NULL
        );
        ",
    )
}

/// Runs `f` inside an immediate transaction, rolling back on error.
pub fn with_tx<T, E>(
    connection: &Connection,
    f: impl FnOnce(&Connection) -> Result<T, E>,
) -> Result<T, E>
where
    E: From<sqlite::Error>,
{
    connection.execute("BEGIN IMMEDIATE;")?;
    match f(connection) {
        Ok(value) => {
            connection.execute("COMMIT;")?;
            Ok(value)
        }
        Err(err) => {
            // The rollback result is deliberately dropped: the original
            // error is the one the caller needs to see.
            let _ = connection.execute("ROLLBACK;");
            Err(err)
        }
    }
}

/// SQLITE_CONSTRAINT, in the primary (low byte) result code.
pub fn is_constraint_violation(err: &sqlite::Error) -> bool {
    err.code.is_some_and(|code| code & 0xff == 19)
}

pub fn last_insert_id(connection: &Connection) -> Result<i64, sqlite::Error> {
    let mut stmt = connection.prepare("SELECT last_insert_rowid();")?;
    match stmt.next()? {
        State::Row => stmt.read::<i64, _>(0),
        State::Done => Ok(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_index_rejects_second_active_seat_but_not_transferred() {
        let conn = Connection::open(":memory:").unwrap();
        init_schema(&conn).unwrap();
        conn.execute(
            "INSERT INTO station (code, name, city) VALUES ('CKY', 'Gare de Conakry', 'Conakry');
             INSERT INTO route (station_id, name, origin_city, destination_city)
                 VALUES (1, 'Conakry - Kindia', 'Conakry', 'Kindia');
             INSERT INTO destination (station_id, route_id, city, price)
                 VALUES (1, 1, 'Kindia', 50000);
             INSERT INTO trip (station_id, route_id, date, time, period, departure_index)
                 VALUES (1, 1, '2026-08-29', '08:00', 0, 1);",
        )
        .unwrap();

        let insert = |number: &str, status: i64| {
            conn.execute(format!(
                "INSERT INTO ticket (number, trip_id, destination_id, customer_name, \
                 customer_phone, seat, amount, status, operator, created_at) \
                 VALUES ('{number}', 1, 1, 'a', 'b', 7, 50000, {status}, 'op', '2026-08-29 08:00:00');"
            ))
        };

        // A transferred ticket frees its seat for resale.
        insert("CKY-202608-00001", 2).unwrap();
        insert("CKY-202608-00002", 0).unwrap();
        let err = insert("CKY-202608-00003", 1).unwrap_err();
        assert!(is_constraint_violation(&err));
    }

    #[test]
    fn deleting_a_trip_cascades_to_tickets_but_not_audit_rows() {
        let conn = Connection::open(":memory:").unwrap();
        conn.execute("PRAGMA foreign_keys = ON;").unwrap();
        init_schema(&conn).unwrap();
        conn.execute(
            "INSERT INTO station (code, name, city) VALUES ('CKY', 'Gare de Conakry', 'Conakry');
             INSERT INTO route (station_id, name, origin_city, destination_city)
                 VALUES (1, 'Conakry - Kindia', 'Conakry', 'Kindia');
             INSERT INTO destination (station_id, route_id, city, price)
                 VALUES (1, 1, 'Kindia', 50000);
             INSERT INTO trip (station_id, route_id, date, time, period, departure_index)
                 VALUES (1, 1, '2026-08-29', '08:00', 0, 1);
             INSERT INTO ticket (number, trip_id, destination_id, customer_name, customer_phone,
                 seat, amount, status, operator, created_at)
                 VALUES ('CKY-202608-00001', 1, 1, 'a', 'b', 1, 50000, 1, 'op', '2026-08-29 08:00:00');
             INSERT INTO transfer_log (origin_ticket_id, new_ticket_id, origin_trip_id,
                 destination_trip_id, origin_seat, destination_seat, operator, reason, transferred_at)
                 VALUES (1, 1, 1, 1, 1, 1, 'op', 'r', '2026-08-29 08:00:00');
             DELETE FROM trip WHERE id = 1;",
        )
        .unwrap();

        let mut stmt = conn.prepare("SELECT COUNT(*) FROM ticket;").unwrap();
        stmt.next().unwrap();
        assert_eq!(stmt.read::<i64, _>(0).unwrap(), 0);
        let mut stmt = conn.prepare("SELECT COUNT(*) FROM transfer_log;").unwrap();
        stmt.next().unwrap();
        assert_eq!(stmt.read::<i64, _>(0).unwrap(), 1);
    }
}
