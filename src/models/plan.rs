use super::constraints::ResourcesRemaining;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanVariant {
    Unconstrained,
    Constrained,
}

impl PlanVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanVariant::Unconstrained => "Unconstrained",
            PlanVariant::Constrained => "Constrained",
        }
    }
}

impl std::fmt::Display for PlanVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One accepted pasture in a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrazingDecision {
    pub pasture_id: String,
    pub graze_tonnes: f64,
    pub recovery_days: u32,
    pub carbon_impact: Option<f64>,
    pub constraints_ok: bool,
}

/// Output of a single allocation pass, in scheduling priority order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrazingPlan {
    pub variant: PlanVariant,
    pub herd_demand_tonnes: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub horizon_days: Option<u32>,
    pub decisions: Vec<GrazingDecision>,
    pub unmet_demand: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources_remaining: Option<ResourcesRemaining>,
}

impl GrazingPlan {
    /// A plan that grazes nothing and leaves the whole demand unmet.
    pub fn empty(variant: PlanVariant, herd_demand_tonnes: f64) -> Self {
        Self {
            variant,
            herd_demand_tonnes,
            horizon_days: None,
            decisions: Vec::new(),
            unmet_demand: herd_demand_tonnes,
            resources_remaining: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.decisions.is_empty()
    }

    pub fn total_grazed(&self) -> f64 {
        self.decisions.iter().map(|d| d.graze_tonnes).sum()
    }

    pub fn decision_for(&self, pasture_id: &str) -> Option<&GrazingDecision> {
        self.decisions.iter().find(|d| d.pasture_id == pasture_id)
    }

    /// Net carbon across decisions that have an estimate.
    pub fn total_carbon_impact(&self) -> Option<f64> {
        let impacts: Vec<f64> = self
            .decisions
            .iter()
            .filter_map(|d| d.carbon_impact)
            .collect();
        if impacts.is_empty() {
            None
        } else {
            Some(impacts.iter().sum())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decision(id: &str, tonnes: f64, carbon: Option<f64>) -> GrazingDecision {
        GrazingDecision {
            pasture_id: id.into(),
            graze_tonnes: tonnes,
            recovery_days: 21,
            carbon_impact: carbon,
            constraints_ok: true,
        }
    }

    #[test]
    fn empty_plan_leaves_demand_unmet() {
        let plan = GrazingPlan::empty(PlanVariant::Unconstrained, 35.0);
        assert!(plan.is_empty());
        assert_eq!(plan.unmet_demand, 35.0);
        assert_eq!(plan.total_grazed(), 0.0);
        assert_eq!(plan.total_carbon_impact(), None);
    }

    #[test]
    fn totals_skip_missing_carbon() {
        let mut plan = GrazingPlan::empty(PlanVariant::Constrained, 40.0);
        plan.decisions.push(decision("P4", 30.0, Some(0.5)));
        plan.decisions.push(decision("P2", 10.0, None));
        assert_eq!(plan.total_grazed(), 40.0);
        assert_eq!(plan.total_carbon_impact(), Some(0.5));
        assert_eq!(plan.decision_for("P2").map(|d| d.graze_tonnes), Some(10.0));
        assert!(plan.decision_for("P1").is_none());
    }

    #[test]
    fn variant_serializes_lowercase() {
        let json = serde_json::to_string(&PlanVariant::Constrained).unwrap();
        assert_eq!(json, "\"constrained\"");
    }
}
