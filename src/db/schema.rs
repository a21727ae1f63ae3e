use rusqlite::Connection;

pub fn migrate(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS detection_rules (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            name        TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            priority    INTEGER NOT NULL DEFAULT 0,
            condition   TEXT NOT NULL,
            weight      REAL NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_detection_rules_condition ON detection_rules(condition);
        ",
    )?;
    Ok(())
}
