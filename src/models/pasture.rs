use crate::error::{PastureOpsError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A fenced grazing unit with its own biomass and regrowth dynamics.
///
/// Field aliases accept the short keys used by older import files
/// (`area`, `biomass`, `recovery_rate`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PastureUnit {
    pub id: String,
    #[serde(alias = "area")]
    pub area_ha: f64,
    #[serde(alias = "biomass", alias = "biomass_t_ha")]
    pub biomass_density_t_ha: f64,
    #[serde(alias = "recovery_rate")]
    pub recovery_rate_t_ha_day: f64,
    #[serde(default)]
    pub soil_sensitivity: f64,
}

impl PastureUnit {
    pub fn new(
        id: impl Into<String>,
        area_ha: f64,
        biomass_density_t_ha: f64,
        recovery_rate_t_ha_day: f64,
        soil_sensitivity: f64,
    ) -> Self {
        Self {
            id: id.into(),
            area_ha,
            biomass_density_t_ha,
            recovery_rate_t_ha_day,
            soil_sensitivity,
        }
    }

    /// Standing dry matter across the whole unit, in tonnes.
    pub fn standing_tonnes(&self) -> f64 {
        self.biomass_density_t_ha * self.area_ha
    }

    /// Tonnes regrown per day across the whole unit.
    pub fn daily_regrowth_tonnes(&self) -> f64 {
        self.recovery_rate_t_ha_day * self.area_ha
    }

    /// Whether the unit can take part in planning at all.
    pub fn is_plannable(&self) -> bool {
        !self.id.is_empty()
            && self.area_ha.is_finite()
            && self.area_ha > 0.0
            && self.biomass_density_t_ha.is_finite()
            && self.biomass_density_t_ha >= 0.0
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(PastureOpsError::InvalidData("pasture id is empty".into()));
        }
        if !(self.area_ha.is_finite() && self.area_ha > 0.0) {
            return Err(PastureOpsError::InvalidData(format!(
                "pasture {}: area_ha must be > 0 (got {})",
                self.id, self.area_ha
            )));
        }
        if !(self.biomass_density_t_ha.is_finite() && self.biomass_density_t_ha >= 0.0) {
            return Err(PastureOpsError::InvalidData(format!(
                "pasture {}: biomass_density_t_ha must be >= 0 (got {})",
                self.id, self.biomass_density_t_ha
            )));
        }
        if !(self.recovery_rate_t_ha_day.is_finite() && self.recovery_rate_t_ha_day >= 0.0) {
            return Err(PastureOpsError::InvalidData(format!(
                "pasture {}: recovery_rate_t_ha_day must be >= 0 (got {})",
                self.id, self.recovery_rate_t_ha_day
            )));
        }
        if !(0.0..=1.0).contains(&self.soil_sensitivity) {
            return Err(PastureOpsError::InvalidData(format!(
                "pasture {}: soil_sensitivity must be within 0..1 (got {})",
                self.id, self.soil_sensitivity
            )));
        }
        Ok(())
    }
}

/// Fixed per-move operating cost of grazing a pasture.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationalRequirement {
    #[serde(alias = "id")]
    pub pasture_id: String,
    #[serde(default, alias = "water_requirement_l_per_day", alias = "water_requirement")]
    pub water_l_per_day: f64,
    #[serde(default, alias = "labor_hours")]
    pub labor_hours_per_move: f64,
    #[serde(default, alias = "fence_units")]
    pub fence_units_required: u32,
}

impl OperationalRequirement {
    pub fn new(
        pasture_id: impl Into<String>,
        water_l_per_day: f64,
        labor_hours_per_move: f64,
        fence_units_required: u32,
    ) -> Self {
        Self {
            pasture_id: pasture_id.into(),
            water_l_per_day,
            labor_hours_per_move,
            fence_units_required,
        }
    }

    /// Zero-cost requirement used when a pasture has no operational record.
    pub fn free(pasture_id: impl Into<String>) -> Self {
        Self {
            pasture_id: pasture_id.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.pasture_id.trim().is_empty() {
            return Err(PastureOpsError::InvalidData(
                "operational requirement has no pasture_id".into(),
            ));
        }
        if !(self.water_l_per_day.is_finite() && self.water_l_per_day >= 0.0) {
            return Err(PastureOpsError::InvalidData(format!(
                "pasture {}: water_l_per_day must be >= 0",
                self.pasture_id
            )));
        }
        if !(self.labor_hours_per_move.is_finite() && self.labor_hours_per_move >= 0.0) {
            return Err(PastureOpsError::InvalidData(format!(
                "pasture {}: labor_hours_per_move must be >= 0",
                self.pasture_id
            )));
        }
        Ok(())
    }
}

/// Read-only set of land units and their operational costs.
///
/// Planning and simulation runs take cloned snapshots; nothing in the
/// scheduling core writes back into the registry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PastureRegistry {
    pastures: BTreeMap<String, PastureUnit>,
    operations: BTreeMap<String, OperationalRequirement>,
}

impl PastureRegistry {
    pub fn new(pastures: Vec<PastureUnit>, operations: Vec<OperationalRequirement>) -> Self {
        Self {
            pastures: pastures.into_iter().map(|p| (p.id.clone(), p)).collect(),
            operations: operations
                .into_iter()
                .map(|o| (o.pasture_id.clone(), o))
                .collect(),
        }
    }

    pub fn get(&self, id: &str) -> Option<&PastureUnit> {
        self.pastures.get(id)
    }

    pub fn requirement(&self, id: &str) -> Option<&OperationalRequirement> {
        self.operations.get(id)
    }

    pub fn len(&self) -> usize {
        self.pastures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pastures.is_empty()
    }

    /// Pastures ordered by id.
    pub fn pastures(&self) -> Vec<PastureUnit> {
        self.pastures.values().cloned().collect()
    }

    pub fn operations(&self) -> Vec<OperationalRequirement> {
        self.operations.values().cloned().collect()
    }

    /// Restrict the snapshot to the given ids. An empty filter keeps everything.
    pub fn filtered(&self, ids: &[String]) -> Self {
        if ids.is_empty() {
            return self.clone();
        }
        Self {
            pastures: self
                .pastures
                .iter()
                .filter(|(id, _)| ids.contains(id))
                .map(|(id, p)| (id.clone(), p.clone()))
                .collect(),
            operations: self
                .operations
                .iter()
                .filter(|(id, _)| ids.contains(id))
                .map(|(id, o)| (id.clone(), o.clone()))
                .collect(),
        }
    }
}

/// The four reference pastures used in demos and tests.
pub fn reference_pastures() -> Vec<PastureUnit> {
    vec![
        PastureUnit::new("P1", 12.0, 2.9, 0.07, 0.2),
        PastureUnit::new("P2", 18.0, 3.6, 0.05, 0.35),
        PastureUnit::new("P3", 10.0, 1.8, 0.09, 0.15),
        PastureUnit::new("P4", 25.0, 4.2, 0.04, 0.45),
    ]
}

pub fn reference_operations() -> Vec<OperationalRequirement> {
    vec![
        OperationalRequirement::new("P1", 800.0, 2.0, 4),
        OperationalRequirement::new("P2", 600.0, 1.5, 3),
        OperationalRequirement::new("P3", 400.0, 1.0, 2),
        OperationalRequirement::new("P4", 1200.0, 2.5, 6),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pasture_validate_rejects_bad_area() {
        let p = PastureUnit::new("P9", 0.0, 2.0, 0.05, 0.1);
        assert!(p.validate().is_err());
        assert!(!p.is_plannable());

        let p = PastureUnit::new("P9", -3.0, 2.0, 0.05, 0.1);
        assert!(p.validate().is_err());
    }

    #[test]
    fn pasture_validate_rejects_out_of_range_sensitivity() {
        let p = PastureUnit::new("P9", 4.0, 2.0, 0.05, 1.4);
        assert!(p.validate().is_err());
    }

    #[test]
    fn reference_pastures_are_valid() {
        for p in reference_pastures() {
            assert!(p.validate().is_ok(), "{} should be valid", p.id);
        }
        for o in reference_operations() {
            assert!(o.validate().is_ok(), "{} should be valid", o.pasture_id);
        }
    }

    #[test]
    fn pasture_accepts_short_keys() {
        let yaml = "id: P1\narea: 12\nbiomass: 2.9\nrecovery_rate: 0.07\nsoil_sensitivity: 0.2\n";
        let p: PastureUnit = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(p, PastureUnit::new("P1", 12.0, 2.9, 0.07, 0.2));
    }

    #[test]
    fn requirement_accepts_legacy_keys() {
        let yaml = "pasture_id: P4\nwater_requirement_l_per_day: 1200\nlabor_hours: 2.5\nfence_units: 6\n";
        let o: OperationalRequirement = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(o, OperationalRequirement::new("P4", 1200.0, 2.5, 6));
    }

    #[test]
    fn registry_orders_by_id_and_filters() {
        let mut pastures = reference_pastures();
        pastures.reverse();
        let registry = PastureRegistry::new(pastures, reference_operations());

        let ids: Vec<_> = registry.pastures().into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["P1", "P2", "P3", "P4"]);

        let subset = registry.filtered(&["P2".to_string(), "P4".to_string()]);
        assert_eq!(subset.len(), 2);
        assert!(subset.get("P1").is_none());
        assert!(subset.requirement("P4").is_some());
        assert_eq!(registry.filtered(&[]).len(), 4);
    }
}
