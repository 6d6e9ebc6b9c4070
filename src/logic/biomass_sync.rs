use crate::datasources::{BiomassEstimate, BiomassSource};
use crate::db::Database;
use crate::error::Result;
use chrono::{NaiveTime, TimeZone, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub source: String,
    pub applied: Vec<BiomassEstimate>,
    pub failed: Vec<String>,
}

/// Pulls biomass estimates from a source and records them against the
/// registry store.
pub struct BiomassSync {
    db: Database,
    source: Box<dyn BiomassSource>,
}

impl BiomassSync {
    pub fn new(db: Database, source: Box<dyn BiomassSource>) -> Self {
        Self { db, source }
    }

    /// Apply one round of estimates. A pasture that cannot be updated is
    /// reported in `failed` and does not stop the others.
    pub fn sync(&self) -> Result<SyncReport> {
        let pastures = self.db.list_pastures()?;
        let estimates = self.source.estimate(&pastures)?;

        let mut report = SyncReport {
            source: self.source.name().to_string(),
            ..Default::default()
        };

        for estimate in estimates {
            let measured_at = Utc.from_utc_datetime(&estimate.measured_on.and_time(NaiveTime::MIN));
            match self.db.record_biomass(
                &estimate.pasture_id,
                estimate.biomass_t_ha,
                self.source.name(),
                measured_at,
            ) {
                Ok(()) => {
                    tracing::debug!(
                        pasture = %estimate.pasture_id,
                        biomass = estimate.biomass_t_ha,
                        "Biomass updated"
                    );
                    report.applied.push(estimate);
                }
                Err(e) => {
                    tracing::warn!(pasture = %estimate.pasture_id, "Biomass update failed: {}", e);
                    report.failed.push(estimate.pasture_id);
                }
            }
        }

        tracing::info!(
            source = %report.source,
            applied = report.applied.len(),
            failed = report.failed.len(),
            "Biomass sync complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasources::SyntheticBiomass;
    use crate::models::{reference_pastures, PastureUnit};
    use chrono::NaiveDate;

    struct FixedSource(Vec<BiomassEstimate>);

    impl BiomassSource for FixedSource {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn estimate(&self, _pastures: &[PastureUnit]) -> Result<Vec<BiomassEstimate>> {
            Ok(self.0.clone())
        }
    }

    fn seeded_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        for p in reference_pastures() {
            db.upsert_pasture(&p).unwrap();
        }
        db
    }

    #[test]
    fn synthetic_sync_updates_every_pasture() {
        let db = seeded_db();
        let source = SyntheticBiomass::new(42)
            .with_end_date(NaiveDate::from_ymd_opt(2026, 2, 11).unwrap());
        let expected = source.estimate(&reference_pastures()).unwrap();

        let report = BiomassSync::new(db.clone(), Box::new(source)).sync().unwrap();
        assert_eq!(report.source, "synthetic");
        assert_eq!(report.applied, expected);
        assert!(report.failed.is_empty());

        for estimate in &expected {
            let stored = db.get_pasture(&estimate.pasture_id).unwrap().unwrap();
            assert_eq!(stored.biomass_density_t_ha, estimate.biomass_t_ha);
            assert_eq!(db.biomass_history(&estimate.pasture_id, 10).unwrap().len(), 1);
        }
    }

    #[test]
    fn unknown_pasture_is_reported_not_fatal() {
        let db = seeded_db();
        let on = NaiveDate::from_ymd_opt(2026, 2, 10).unwrap();
        let source = FixedSource(vec![
            BiomassEstimate {
                pasture_id: "GHOST".into(),
                biomass_t_ha: 2.0,
                measured_on: on,
            },
            BiomassEstimate {
                pasture_id: "P1".into(),
                biomass_t_ha: 3.1,
                measured_on: on,
            },
        ]);

        let report = BiomassSync::new(db.clone(), Box::new(source)).sync().unwrap();
        assert_eq!(report.failed, vec!["GHOST".to_string()]);
        assert_eq!(report.applied.len(), 1);
        assert_eq!(db.get_pasture("P1").unwrap().unwrap().biomass_density_t_ha, 3.1);
    }
}
