use crate::db::Database;
use crate::error::Result;

const MIGRATIONS: &[&str] = &[
    // Migration 1: Pasture registry
    r#"
    CREATE TABLE IF NOT EXISTS pastures (
        id TEXT PRIMARY KEY,
        area_ha REAL NOT NULL CHECK (area_ha > 0),
        biomass_density_t_ha REAL NOT NULL CHECK (biomass_density_t_ha >= 0),
        recovery_rate_t_ha_day REAL NOT NULL CHECK (recovery_rate_t_ha_day >= 0),
        soil_sensitivity REAL NOT NULL DEFAULT 0,
        updated_at TEXT NOT NULL DEFAULT (datetime('now'))
    );

    CREATE TABLE IF NOT EXISTS operational_requirements (
        pasture_id TEXT PRIMARY KEY REFERENCES pastures(id) ON DELETE CASCADE,
        water_l_per_day REAL NOT NULL DEFAULT 0,
        labor_hours_per_move REAL NOT NULL DEFAULT 0,
        fence_units_required INTEGER NOT NULL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS biomass_measurements (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        pasture_id TEXT NOT NULL REFERENCES pastures(id) ON DELETE CASCADE,
        biomass_t_ha REAL NOT NULL,
        source TEXT NOT NULL,
        measured_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS schema_migrations (
        version INTEGER PRIMARY KEY,
        applied_at TEXT NOT NULL DEFAULT (datetime('now'))
    );
    "#,
    // Migration 2: Append-only audit log
    r#"
    CREATE TABLE IF NOT EXISTS audit_log (
        event_id TEXT PRIMARY KEY,
        timestamp TEXT NOT NULL,
        farm_id TEXT NOT NULL,
        pasture_id TEXT NOT NULL,
        decision_type TEXT NOT NULL,
        model_versions TEXT NOT NULL,
        inputs TEXT NOT NULL,
        outputs TEXT NOT NULL,
        constraints_applied TEXT NOT NULL,
        user_id TEXT NOT NULL
    );

    CREATE TRIGGER IF NOT EXISTS audit_log_no_update
        BEFORE UPDATE ON audit_log
        BEGIN SELECT RAISE(ABORT, 'audit_log is append-only'); END;

    CREATE TRIGGER IF NOT EXISTS audit_log_no_delete
        BEFORE DELETE ON audit_log
        BEGIN SELECT RAISE(ABORT, 'audit_log is append-only'); END;
    "#,
    // Migration 3: Indexes
    r#"
    CREATE INDEX IF NOT EXISTS idx_biomass_measurements_pasture
        ON biomass_measurements(pasture_id, measured_at);
    CREATE INDEX IF NOT EXISTS idx_audit_log_timestamp
        ON audit_log(timestamp);
    "#,
];

pub fn run(db: &Database) -> Result<()> {
    db.with_conn_mut(|conn| {
        // Ensure schema_migrations table exists
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
            "#,
        )?;

        let current_version: i32 = conn
            .query_row(
                "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        for (i, migration) in MIGRATIONS.iter().enumerate() {
            let version = (i + 1) as i32;
            if version > current_version {
                tracing::info!("Applying migration {}", version);
                let tx = conn.transaction()?;
                tx.execute_batch(migration)?;
                tx.execute(
                    "INSERT INTO schema_migrations (version) VALUES (?1)",
                    [version],
                )?;
                tx.commit()?;
            }
        }

        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let db = Database::open_in_memory().unwrap();
        run(&db).unwrap();
        let version: i32 = db
            .with_conn(|conn| {
                Ok(conn.query_row("SELECT MAX(version) FROM schema_migrations", [], |r| {
                    r.get(0)
                })?)
            })
            .unwrap();
        assert_eq!(version, MIGRATIONS.len() as i32);
    }
}
