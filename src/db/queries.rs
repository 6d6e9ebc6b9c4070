use crate::db::Database;
use crate::error::{PastureOpsError, Result};
use crate::models::{
    AuditRecord, DecisionType, OperationalRequirement, PastureRegistry, PastureUnit,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Row};
use tracing::warn;
use uuid::Uuid;

// Pasture Queries

impl Database {
    pub fn upsert_pasture(&self, pasture: &PastureUnit) -> Result<()> {
        pasture.validate()?;
        self.with_conn(|conn| {
            conn.execute(
                r#"
                INSERT INTO pastures
                    (id, area_ha, biomass_density_t_ha, recovery_rate_t_ha_day, soil_sensitivity, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT(id) DO UPDATE SET
                    area_ha = excluded.area_ha,
                    biomass_density_t_ha = excluded.biomass_density_t_ha,
                    recovery_rate_t_ha_day = excluded.recovery_rate_t_ha_day,
                    soil_sensitivity = excluded.soil_sensitivity,
                    updated_at = excluded.updated_at
                "#,
                params![
                    pasture.id,
                    pasture.area_ha,
                    pasture.biomass_density_t_ha,
                    pasture.recovery_rate_t_ha_day,
                    pasture.soil_sensitivity,
                    Utc::now().to_rfc3339(),
                ],
            )?;
            Ok(())
        })
    }

    pub fn list_pastures(&self) -> Result<Vec<PastureUnit>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT * FROM pastures ORDER BY id")?;
            let pastures = stmt
                .query_map([], row_to_pasture)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(pastures)
        })
    }

    pub fn get_pasture(&self, id: &str) -> Result<Option<PastureUnit>> {
        self.with_conn(|conn| {
            conn.query_row("SELECT * FROM pastures WHERE id = ?1", [id], row_to_pasture)
                .optional()
                .map_err(Into::into)
        })
    }

    pub fn delete_pasture(&self, id: &str) -> Result<()> {
        self.with_conn(|conn| {
            let removed = conn.execute("DELETE FROM pastures WHERE id = ?1", [id])?;
            if removed == 0 {
                return Err(PastureOpsError::NotFound(format!("pasture {}", id)));
            }
            Ok(())
        })
    }

    /// Build an immutable registry snapshot from the stored records.
    pub fn load_registry(&self) -> Result<PastureRegistry> {
        Ok(PastureRegistry::new(
            self.list_pastures()?,
            self.list_operational_requirements()?,
        ))
    }
}

fn row_to_pasture(row: &Row) -> rusqlite::Result<PastureUnit> {
    Ok(PastureUnit {
        id: row.get("id")?,
        area_ha: row.get("area_ha")?,
        biomass_density_t_ha: row.get("biomass_density_t_ha")?,
        recovery_rate_t_ha_day: row.get("recovery_rate_t_ha_day")?,
        soil_sensitivity: row.get("soil_sensitivity")?,
    })
}

// Operational Requirement Queries

impl Database {
    pub fn upsert_operational_requirement(&self, req: &OperationalRequirement) -> Result<()> {
        req.validate()?;
        self.with_conn(|conn| {
            conn.execute(
                r#"
                INSERT INTO operational_requirements
                    (pasture_id, water_l_per_day, labor_hours_per_move, fence_units_required)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(pasture_id) DO UPDATE SET
                    water_l_per_day = excluded.water_l_per_day,
                    labor_hours_per_move = excluded.labor_hours_per_move,
                    fence_units_required = excluded.fence_units_required
                "#,
                params![
                    req.pasture_id,
                    req.water_l_per_day,
                    req.labor_hours_per_move,
                    req.fence_units_required,
                ],
            )?;
            Ok(())
        })
    }

    pub fn list_operational_requirements(&self) -> Result<Vec<OperationalRequirement>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT * FROM operational_requirements ORDER BY pasture_id")?;
            let ops = stmt
                .query_map([], |row| {
                    Ok(OperationalRequirement {
                        pasture_id: row.get("pasture_id")?,
                        water_l_per_day: row.get("water_l_per_day")?,
                        labor_hours_per_move: row.get("labor_hours_per_move")?,
                        fence_units_required: row.get("fence_units_required")?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(ops)
        })
    }
}

// Biomass Measurement Queries

impl Database {
    /// Store a measurement and make it the pasture's current density.
    pub fn record_biomass(
        &self,
        pasture_id: &str,
        biomass_t_ha: f64,
        source: &str,
        measured_at: DateTime<Utc>,
    ) -> Result<()> {
        if !(biomass_t_ha.is_finite() && biomass_t_ha >= 0.0) {
            return Err(PastureOpsError::InvalidData(format!(
                "pasture {}: biomass must be >= 0 (got {})",
                pasture_id, biomass_t_ha
            )));
        }
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let updated = tx.execute(
                "UPDATE pastures SET biomass_density_t_ha = ?1, updated_at = ?2 WHERE id = ?3",
                params![biomass_t_ha, Utc::now().to_rfc3339(), pasture_id],
            )?;
            if updated == 0 {
                return Err(PastureOpsError::NotFound(format!("pasture {}", pasture_id)));
            }
            tx.execute(
                r#"
                INSERT INTO biomass_measurements (pasture_id, biomass_t_ha, source, measured_at)
                VALUES (?1, ?2, ?3, ?4)
                "#,
                params![pasture_id, biomass_t_ha, source, measured_at.to_rfc3339()],
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    pub fn biomass_history(&self, pasture_id: &str, limit: u32) -> Result<Vec<(DateTime<Utc>, f64)>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                r#"
                SELECT measured_at, biomass_t_ha FROM biomass_measurements
                WHERE pasture_id = ?1 ORDER BY measured_at DESC, id DESC LIMIT ?2
                "#,
            )?;
            let rows = stmt
                .query_map(params![pasture_id, limit], |row| {
                    let at: String = row.get(0)?;
                    let value: f64 = row.get(1)?;
                    Ok((at, value))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows
                .into_iter()
                .filter_map(|(at, value)| match DateTime::parse_from_rfc3339(&at) {
                    Ok(dt) => Some((dt.with_timezone(&Utc), value)),
                    Err(_) => {
                        warn!(measured_at = %at, "Unparseable measurement timestamp, skipping");
                        None
                    }
                })
                .collect())
        })
    }
}

// Audit Log Queries

impl Database {
    pub fn insert_audit_record(&self, record: &AuditRecord) -> Result<()> {
        let model_versions = serde_json::to_string(&record.model_versions)?;
        let inputs = serde_json::to_string(&record.inputs)?;
        let outputs = serde_json::to_string(&record.outputs)?;
        let constraints = serde_json::to_string(&record.constraints_applied)?;
        self.with_conn(|conn| {
            conn.execute(
                r#"
                INSERT INTO audit_log
                    (event_id, timestamp, farm_id, pasture_id, decision_type, model_versions,
                     inputs, outputs, constraints_applied, user_id)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                "#,
                params![
                    record.event_id.to_string(),
                    record.timestamp.to_rfc3339(),
                    record.farm_id,
                    record.pasture_id,
                    record.decision_type.as_str(),
                    model_versions,
                    inputs,
                    outputs,
                    constraints,
                    record.user_id,
                ],
            )?;
            Ok(())
        })
    }

    pub fn recent_audit_records(&self, limit: u32) -> Result<Vec<AuditRecord>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM audit_log ORDER BY timestamp DESC, rowid DESC LIMIT ?1",
            )?;
            let records = stmt
                .query_map([limit], row_to_audit_record)?
                .filter_map(|r| match r {
                    Ok(record) => Some(record),
                    Err(e) => {
                        warn!("Skipping unreadable audit row: {}", e);
                        None
                    }
                })
                .collect();
            Ok(records)
        })
    }
}

fn row_to_audit_record(row: &Row) -> rusqlite::Result<AuditRecord> {
    let event_id_str: String = row.get("event_id")?;
    let timestamp_str: String = row.get("timestamp")?;
    let decision_type_str: String = row.get("decision_type")?;
    let model_versions_str: String = row.get("model_versions")?;
    let inputs_str: String = row.get("inputs")?;
    let outputs_str: String = row.get("outputs")?;
    let constraints_str: String = row.get("constraints_applied")?;

    let decision_type = DecisionType::from_str(&decision_type_str).unwrap_or_else(|| {
        warn!(
            decision_type = %decision_type_str,
            "Unknown decision_type in database, defaulting to Grazing"
        );
        DecisionType::Grazing
    });

    Ok(AuditRecord {
        event_id: Uuid::parse_str(&event_id_str).unwrap_or_else(|_| Uuid::nil()),
        timestamp: DateTime::parse_from_rfc3339(&timestamp_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        farm_id: row.get("farm_id")?,
        pasture_id: row.get("pasture_id")?,
        decision_type,
        model_versions: serde_json::from_str(&model_versions_str).unwrap_or_default(),
        inputs: serde_json::from_str(&inputs_str).unwrap_or(serde_json::Value::Null),
        outputs: serde_json::from_str(&outputs_str).unwrap_or(serde_json::Value::Null),
        constraints_applied: serde_json::from_str(&constraints_str)
            .unwrap_or(serde_json::Value::Null),
        user_id: row.get("user_id")?,
    })
}

trait OptionalExt<T> {
    fn optional(self) -> rusqlite::Result<Option<T>>;
}

impl<T> OptionalExt<T> for rusqlite::Result<T> {
    fn optional(self) -> rusqlite::Result<Option<T>> {
        match self {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
