use anyhow::Context;
use rusqlite::Connection;

/// Schema migrations, applied in order and recorded in _migrations so each
/// runs once. Embedded so the binary has no working-directory dependency.
const MIGRATIONS: &[(&str, &str)] = &[(
    "0001_init",
    "CREATE TABLE businesses (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        phone_number TEXT NOT NULL UNIQUE
    );

    CREATE TABLE call_sessions (
        call_sid TEXT PRIMARY KEY,
        business_id INTEGER NOT NULL REFERENCES businesses(id),
        state TEXT NOT NULL DEFAULT '{}',
        stage TEXT NOT NULL DEFAULT 'ask_name',
        created_at TEXT NOT NULL DEFAULT (datetime('now'))
    );

    CREATE TABLE appointments (
        id TEXT PRIMARY KEY,
        business_id INTEGER NOT NULL REFERENCES businesses(id),
        customer_name TEXT NOT NULL,
        service_type TEXT NOT NULL,
        date_time_str TEXT NOT NULL,
        phone_number TEXT NOT NULL,
        notes TEXT,
        created_at TEXT NOT NULL
    );",
)];

pub fn run_migrations(conn: &Connection) -> anyhow::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            name TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )
    .context("failed to create migrations table")?;

    for (name, sql) in MIGRATIONS {
        let already_applied: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM _migrations WHERE name = ?1",
                [name],
                |row| row.get(0),
            )
            .context("failed to check migration status")?;

        if already_applied {
            continue;
        }

        conn.execute_batch(sql)
            .with_context(|| format!("failed to apply migration: {name}"))?;

        conn.execute("INSERT INTO _migrations (name) VALUES (?1)", [name])
            .with_context(|| format!("failed to record migration: {name}"))?;

        tracing::info!("applied migration: {name}");
    }

    Ok(())
}
