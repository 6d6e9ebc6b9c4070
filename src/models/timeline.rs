use super::plan::GrazingDecision;
use crate::error::Result;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PastureStatus {
    Available,
    Resting,
}

impl PastureStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PastureStatus::Available => "Available",
            PastureStatus::Resting => "Resting",
        }
    }
}

impl std::fmt::Display for PastureStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Day index until which each pasture rests (inclusive).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestLedger {
    rest_until: BTreeMap<String, u32>,
}

impl RestLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rest(&mut self, pasture_id: impl Into<String>, until_day: u32) {
        self.rest_until.insert(pasture_id.into(), until_day);
    }

    pub fn rest_until(&self, pasture_id: &str) -> Option<u32> {
        self.rest_until.get(pasture_id).copied()
    }

    pub fn is_resting(&self, pasture_id: &str, day: u32) -> bool {
        self.rest_until(pasture_id).is_some_and(|until| until >= day)
    }

    pub fn status(&self, pasture_id: &str, day: u32) -> PastureStatus {
        if self.is_resting(pasture_id, day) {
            PastureStatus::Resting
        } else {
            PastureStatus::Available
        }
    }

    pub fn len(&self) -> usize {
        self.rest_until.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rest_until.is_empty()
    }

    /// Rest days remaining after `day`, zero when available.
    pub fn days_left(&self, pasture_id: &str, day: u32) -> u32 {
        self.rest_until(pasture_id)
            .map_or(0, |until| until.saturating_sub(day))
    }

    /// Re-index the ledger so that `day` becomes day zero.
    ///
    /// Rests that end before `day` are dropped.
    pub fn shifted_to(&self, day: u32) -> Self {
        Self {
            rest_until: self
                .rest_until
                .iter()
                .filter(|(_, until)| **until >= day)
                .map(|(id, until)| (id.clone(), until - day))
                .collect(),
        }
    }
}

/// Snapshot of one pasture on one simulated day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PastureState {
    pub biomass_t_ha: f64,
    pub area_ha: f64,
    pub status: PastureStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rest_until_day: Option<u32>,
    pub recovery_days_left: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Grazing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrazingEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub pasture_id: String,
    pub graze_tonnes: f64,
    pub recovery_days: u32,
}

/// Smooth soil-carbon projection attached to every frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarbonState {
    pub soil_carbon_t_ha: f64,
    pub annual_change_t_ha: f64,
    pub ground_cover: f64,
}

/// One simulated day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub day: u32,
    pub date: NaiveDate,
    pub pastures: BTreeMap<String, PastureState>,
    pub events: Vec<GrazingEvent>,
    pub carbon_state: CarbonState,
}

/// Full playback output of a rotation simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    pub start_date: NaiveDate,
    pub horizon_days: u32,
    pub herd_demand_tonnes: f64,
    pub frames: Vec<Frame>,
    pub plan_summary: Vec<GrazingDecision>,
}

impl Timeline {
    /// Parse a timeline previously written as JSON.
    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn events(&self) -> impl Iterator<Item = (&Frame, &GrazingEvent)> {
        self.frames
            .iter()
            .flat_map(|f| f.events.iter().map(move |e| (f, e)))
    }

    pub fn event_count(&self) -> usize {
        self.frames.iter().map(|f| f.events.len()).sum()
    }

    pub fn total_grazed(&self) -> f64 {
        self.events().map(|(_, e)| e.graze_tonnes).sum()
    }

    pub fn last_frame(&self) -> Option<&Frame> {
        self.frames.last()
    }

    /// Mean biomass across pastures on the final day.
    pub fn final_mean_biomass(&self) -> Option<f64> {
        let frame = self.last_frame()?;
        if frame.pastures.is_empty() {
            return None;
        }
        let total: f64 = frame.pastures.values().map(|s| s.biomass_t_ha).sum();
        Some(total / frame.pastures.len() as f64)
    }

    /// Rest periods still open after the final frame, re-indexed so the
    /// day after the horizon is day zero.
    pub fn closing_rest_ledger(&self) -> RestLedger {
        let mut ledger = RestLedger::new();
        if let Some(frame) = self.last_frame() {
            for (id, state) in &frame.pastures {
                if let Some(until) = state.rest_until_day {
                    ledger.rest(id.clone(), until);
                }
            }
            return ledger.shifted_to(frame.day + 1);
        }
        ledger
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_rest_is_inclusive() {
        let mut ledger = RestLedger::new();
        ledger.rest("P1", 10);
        assert!(ledger.is_resting("P1", 10));
        assert!(!ledger.is_resting("P1", 11));
        assert!(!ledger.is_resting("P2", 0));
        assert_eq!(ledger.status("P1", 3), PastureStatus::Resting);
        assert_eq!(ledger.days_left("P1", 3), 7);
        assert_eq!(ledger.days_left("P1", 12), 0);
        assert_eq!(ledger.days_left("P2", 3), 0);
    }

    #[test]
    fn ledger_shift_drops_finished_rests() {
        let mut ledger = RestLedger::new();
        ledger.rest("P1", 10);
        ledger.rest("P2", 40);
        let shifted = ledger.shifted_to(20);
        assert_eq!(shifted.rest_until("P1"), None);
        assert_eq!(shifted.rest_until("P2"), Some(20));
    }

    #[test]
    fn event_serializes_type_field() {
        let event = GrazingEvent {
            kind: EventKind::Grazing,
            pasture_id: "P4".into(),
            graze_tonnes: 35.0,
            recovery_days: 42,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "grazing");
        assert_eq!(json["pasture_id"], "P4");
    }

    #[test]
    fn available_state_omits_rest_until() {
        let state = PastureState {
            biomass_t_ha: 2.5,
            area_ha: 10.0,
            status: PastureStatus::Available,
            rest_until_day: None,
            recovery_days_left: 0,
        };
        let json = serde_json::to_value(&state).unwrap();
        assert!(json.get("rest_until_day").is_none());
        assert_eq!(json["status"], "available");
    }
}
