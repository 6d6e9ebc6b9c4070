use crate::db::Database;
use crate::error::Result;
use crate::models::{AuditRecord, DecisionType, FarmConstraints, GrazingPlan, Timeline};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;

/// Append-only destination for audit records.
pub trait AuditSink: Send + Sync {
    fn append(&self, record: &AuditRecord) -> Result<()>;
}

/// Stores records in the `audit_log` table.
pub struct SqliteAuditSink {
    db: Database,
}

impl SqliteAuditSink {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

impl AuditSink for SqliteAuditSink {
    fn append(&self, record: &AuditRecord) -> Result<()> {
        self.db.insert_audit_record(record)
    }
}

/// One JSON object per line, appended to a file.
pub struct JsonlAuditSink {
    path: PathBuf,
}

impl JsonlAuditSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl AuditSink for JsonlAuditSink {
    fn append(&self, record: &AuditRecord) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }
}

pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn append(&self, _record: &AuditRecord) -> Result<()> {
        Ok(())
    }
}

/// Writes one audit record per plan decision.
///
/// Logging is fire-and-forget: a failing sink is reported through
/// `tracing` and never fails the caller.
pub struct AuditLogger {
    sink: Box<dyn AuditSink>,
    farm_id: String,
    user_id: String,
    model_versions: BTreeMap<String, String>,
}

impl AuditLogger {
    pub fn new(sink: Box<dyn AuditSink>, farm_id: impl Into<String>) -> Self {
        Self {
            sink,
            farm_id: farm_id.into(),
            user_id: "system".into(),
            model_versions: BTreeMap::new(),
        }
    }

    pub fn disabled() -> Self {
        Self::new(Box::new(NoopAuditSink), "default")
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    pub fn with_model_versions(mut self, versions: BTreeMap<String, String>) -> Self {
        self.model_versions = versions;
        self
    }

    fn record(&self, pasture_id: &str, decision_type: DecisionType) -> AuditRecord {
        AuditRecord::new(self.farm_id.clone(), pasture_id, decision_type)
            .with_model_versions(self.model_versions.clone())
            .with_user(self.user_id.clone())
    }

    fn write(&self, record: &AuditRecord) -> bool {
        match self.sink.append(record) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    event_id = %record.event_id,
                    pasture = %record.pasture_id,
                    "Audit write failed: {}",
                    e
                );
                false
            }
        }
    }

    /// Log every decision of a plan. Returns how many records were written.
    pub fn log_plan(&self, plan: &GrazingPlan, constraints: Option<&FarmConstraints>) -> usize {
        let decision_type = if constraints.is_some() {
            DecisionType::Optimization
        } else {
            DecisionType::Grazing
        };
        let constraints_json = constraints
            .and_then(|c| serde_json::to_value(c).ok())
            .unwrap_or_else(|| serde_json::json!({}));
        let inputs = serde_json::json!({
            "herd_demand_tonnes": plan.herd_demand_tonnes,
            "horizon_days": plan.horizon_days,
            "variant": plan.variant,
        });

        let mut written = 0;
        for decision in &plan.decisions {
            let outputs = serde_json::to_value(decision).unwrap_or(serde_json::Value::Null);
            let record = self
                .record(&decision.pasture_id, decision_type)
                .with_inputs(inputs.clone())
                .with_outputs(outputs)
                .with_constraints(constraints_json.clone());
            if self.write(&record) {
                written += 1;
            }
        }
        tracing::debug!(written, total = plan.decisions.len(), "Plan audit logged");
        written
    }

    /// Log a single summary record for a simulation run.
    pub fn log_timeline(&self, timeline: &Timeline) -> bool {
        let record = self
            .record("*", DecisionType::Simulation)
            .with_inputs(serde_json::json!({
                "start_date": timeline.start_date,
                "horizon_days": timeline.horizon_days,
                "herd_demand_tonnes": timeline.herd_demand_tonnes,
            }))
            .with_outputs(serde_json::json!({
                "grazing_events": timeline.event_count(),
                "total_grazed_tonnes": timeline.total_grazed(),
                "final_mean_biomass_t_ha": timeline.final_mean_biomass(),
            }));
        self.write(&record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PastureOpsError;
    use crate::logic::allocator::GrazingAllocator;
    use crate::logic::carbon::LinearCarbonModel;
    use crate::models::{reference_operations, reference_pastures};
    use std::sync::{Arc, Mutex};

    struct FailingSink;

    impl AuditSink for FailingSink {
        fn append(&self, _record: &AuditRecord) -> Result<()> {
            Err(PastureOpsError::DataSourceUnavailable("audit store down".into()))
        }
    }

    #[derive(Clone, Default)]
    struct MemorySink(Arc<Mutex<Vec<AuditRecord>>>);

    impl AuditSink for MemorySink {
        fn append(&self, record: &AuditRecord) -> Result<()> {
            self.0.lock().unwrap().push(record.clone());
            Ok(())
        }
    }

    fn plan() -> GrazingPlan {
        GrazingAllocator::new(&LinearCarbonModel).allocate(&reference_pastures(), 80.0, 90)
    }

    #[test]
    fn logs_one_record_per_decision() {
        let sink = MemorySink::default();
        let logger = AuditLogger::new(Box::new(sink.clone()), "farm-1").with_user("tester");
        let plan = plan();

        assert_eq!(logger.log_plan(&plan, None), plan.decisions.len());

        let records = sink.0.lock().unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].pasture_id, "P4");
        assert_eq!(records[0].decision_type, DecisionType::Grazing);
        assert_eq!(records[0].farm_id, "farm-1");
        assert_eq!(records[0].user_id, "tester");
        assert_eq!(records[0].outputs["graze_tonnes"], 42.0);
        assert_eq!(records[0].inputs["herd_demand_tonnes"], 80.0);
    }

    #[test]
    fn constrained_plans_log_as_optimization() {
        let sink = MemorySink::default();
        let logger = AuditLogger::new(Box::new(sink.clone()), "farm-1");
        let constraints = FarmConstraints::default();
        let plan = GrazingAllocator::new(&LinearCarbonModel).allocate_constrained(
            &reference_pastures(),
            &reference_operations(),
            &constraints,
            35.0,
        );
        logger.log_plan(&plan, Some(&constraints));

        let records = sink.0.lock().unwrap();
        assert_eq!(records[0].decision_type, DecisionType::Optimization);
        assert_eq!(records[0].constraints_applied["movable_fence_units"], 15);
    }

    #[test]
    fn sink_failure_is_swallowed() {
        let logger = AuditLogger::new(Box::new(FailingSink), "farm-1");
        assert_eq!(logger.log_plan(&plan(), None), 0);
    }

    #[test]
    fn jsonl_sink_appends_lines() {
        let path = std::env::temp_dir().join(format!(
            "pastureops-audit-{}.jsonl",
            uuid::Uuid::new_v4()
        ));
        let logger = AuditLogger::new(Box::new(JsonlAuditSink::new(&path)), "farm-1");
        logger.log_plan(&plan(), None);
        logger.log_plan(&plan(), None);

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 6);
        let first: AuditRecord = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.pasture_id, "P4");

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn sqlite_sink_round_trips() {
        let db = Database::open_in_memory().unwrap();
        let logger = AuditLogger::new(Box::new(SqliteAuditSink::new(db.clone())), "farm-1");
        assert_eq!(logger.log_plan(&plan(), None), 3);

        let records = db.recent_audit_records(10).unwrap();
        assert_eq!(records.len(), 3);
        assert!(records.iter().any(|r| r.pasture_id == "P2"));
    }
}
