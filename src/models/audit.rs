use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionType {
    Grazing,
    Optimization,
    Simulation,
}

impl DecisionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionType::Grazing => "grazing",
            DecisionType::Optimization => "optimization",
            DecisionType::Simulation => "simulation",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "grazing" => Some(DecisionType::Grazing),
            "optimization" | "optimisation" => Some(DecisionType::Optimization),
            "simulation" => Some(DecisionType::Simulation),
            _ => None,
        }
    }
}

impl std::fmt::Display for DecisionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Immutable record of one planning decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub event_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub farm_id: String,
    pub pasture_id: String,
    pub decision_type: DecisionType,
    pub model_versions: BTreeMap<String, String>,
    pub inputs: serde_json::Value,
    pub outputs: serde_json::Value,
    pub constraints_applied: serde_json::Value,
    pub user_id: String,
}

impl AuditRecord {
    pub fn new(
        farm_id: impl Into<String>,
        pasture_id: impl Into<String>,
        decision_type: DecisionType,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            farm_id: farm_id.into(),
            pasture_id: pasture_id.into(),
            decision_type,
            model_versions: BTreeMap::new(),
            inputs: serde_json::Value::Null,
            outputs: serde_json::Value::Null,
            constraints_applied: serde_json::Value::Null,
            user_id: "system".into(),
        }
    }

    pub fn with_model_versions(mut self, versions: BTreeMap<String, String>) -> Self {
        self.model_versions = versions;
        self
    }

    pub fn with_inputs(mut self, inputs: serde_json::Value) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn with_outputs(mut self, outputs: serde_json::Value) -> Self {
        self.outputs = outputs;
        self
    }

    pub fn with_constraints(mut self, constraints: serde_json::Value) -> Self {
        self.constraints_applied = constraints;
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_type_from_str() {
        assert_eq!(DecisionType::from_str("grazing"), Some(DecisionType::Grazing));
        assert_eq!(
            DecisionType::from_str("Optimization"),
            Some(DecisionType::Optimization)
        );
        assert_eq!(DecisionType::from_str("carbon"), None);
    }

    #[test]
    fn decision_type_round_trip() {
        for t in [
            DecisionType::Grazing,
            DecisionType::Optimization,
            DecisionType::Simulation,
        ] {
            assert_eq!(DecisionType::from_str(t.as_str()), Some(t));
        }
    }

    #[test]
    fn records_get_distinct_event_ids() {
        let a = AuditRecord::new("farm", "P1", DecisionType::Grazing);
        let b = AuditRecord::new("farm", "P1", DecisionType::Grazing);
        assert_ne!(a.event_id, b.event_id);
        assert_eq!(a.user_id, "system");
    }

    #[test]
    fn builder_sets_payloads() {
        let record = AuditRecord::new("farm", "P4", DecisionType::Optimization)
            .with_inputs(serde_json::json!({"herd_demand_tonnes": 35.0}))
            .with_outputs(serde_json::json!({"graze_tonnes": 35.0}))
            .with_user("cli");
        assert_eq!(record.inputs["herd_demand_tonnes"], 35.0);
        assert_eq!(record.outputs["graze_tonnes"], 35.0);
        assert_eq!(record.user_id, "cli");
    }
}
