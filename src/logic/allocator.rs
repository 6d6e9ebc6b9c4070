use super::calculations::{grazing_pressure, recovery_days, round2, round2_within};
use super::carbon::CarbonModel;
use crate::models::{
    FarmConstraints, GrazingDecision, GrazingPlan, OperationalRequirement, PastureUnit,
    PlanVariant, ResourcePool, RestLedger,
};
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Share of standing biomass the unconstrained planner may remove.
pub const UNCONSTRAINED_UTILIZATION: f64 = 0.40;

/// Share of standing biomass the constrained planner may remove.
pub const CONSTRAINED_UTILIZATION: f64 = 0.35;

/// Safety factor on the unconstrained recovery estimate. The constrained
/// planner uses the bare estimate.
pub const UNCONSTRAINED_RECOVERY_MULTIPLIER: f64 = 1.2;

pub const DEFAULT_MIN_RECOVERY_DAYS: u32 = 21;

/// Greedy forage allocator
///
/// Walks pastures from highest to lowest biomass density (ties: lower soil
/// sensitivity, then id) and takes as much of each as the utilization
/// factor allows until the herd demand is covered.
///
/// The allocator never mutates the pastures it is given. Resting pastures
/// can be excluded by attaching a [`RestLedger`].
pub struct GrazingAllocator<'a> {
    carbon: &'a dyn CarbonModel,
    min_recovery_days: u32,
    rest: Option<(&'a RestLedger, u32)>,
}

impl<'a> GrazingAllocator<'a> {
    pub fn new(carbon: &'a dyn CarbonModel) -> Self {
        Self {
            carbon,
            min_recovery_days: DEFAULT_MIN_RECOVERY_DAYS,
            rest: None,
        }
    }

    /// Floor for unconstrained recovery periods. The constrained variant
    /// takes its floor from [`FarmConstraints::min_recovery_days`].
    pub fn with_min_recovery_days(mut self, days: u32) -> Self {
        self.min_recovery_days = days;
        self
    }

    /// Skip pastures that are still resting on `day`.
    pub fn with_rest_ledger(mut self, ledger: &'a RestLedger, day: u32) -> Self {
        self.rest = Some((ledger, day));
        self
    }

    /// Biomass/sensitivity ranking with no resource caps.
    pub fn allocate(
        &self,
        pastures: &[PastureUnit],
        herd_demand_tonnes: f64,
        horizon_days: u32,
    ) -> GrazingPlan {
        let mut plan = GrazingPlan::empty(PlanVariant::Unconstrained, herd_demand_tonnes);
        plan.horizon_days = Some(horizon_days);

        if !valid_demand(herd_demand_tonnes) {
            warn!(herd_demand_tonnes, "Herd demand must be positive, returning empty plan");
            return plan;
        }

        let mut remaining = herd_demand_tonnes;

        for pasture in self.candidates(pastures) {
            if remaining <= 0.0 {
                break;
            }

            let available = pasture.standing_tonnes() * UNCONSTRAINED_UTILIZATION;
            let cap = available.min(remaining);
            let graze = round2_within(cap, cap);
            if graze <= 0.0 {
                debug!(pasture = %pasture.id, "Nothing grazeable, skipping");
                continue;
            }

            // Recovery and pressure use the exact volume; only the output is rounded.
            let recovery = self.recovery_for(
                pasture,
                cap,
                UNCONSTRAINED_RECOVERY_MULTIPLIER,
                self.min_recovery_days,
            );
            let pressure = grazing_pressure(cap, available);

            debug!(
                pasture = %pasture.id,
                graze,
                available,
                recovery_days = recovery,
                "Accepted pasture"
            );

            plan.decisions.push(GrazingDecision {
                pasture_id: pasture.id.clone(),
                graze_tonnes: graze,
                recovery_days: recovery,
                carbon_impact: self.carbon_impact(pasture, recovery, pressure),
                constraints_ok: true,
            });

            remaining -= graze;
        }

        plan.unmet_demand = round2(remaining.max(0.0));
        info!(
            decisions = plan.decisions.len(),
            unmet_demand = plan.unmet_demand,
            "Unconstrained allocation complete"
        );
        plan
    }

    /// Ranking plus water, labor and fence caps.
    ///
    /// A pasture whose fixed per-move cost does not fit the remaining pool is
    /// skipped without touching the pool. Pastures with no operational record
    /// cost nothing.
    pub fn allocate_constrained(
        &self,
        pastures: &[PastureUnit],
        operations: &[OperationalRequirement],
        constraints: &FarmConstraints,
        herd_demand_tonnes: f64,
    ) -> GrazingPlan {
        let mut pool = ResourcePool::from_constraints(constraints);
        let mut plan = GrazingPlan::empty(PlanVariant::Constrained, herd_demand_tonnes);
        plan.resources_remaining = Some(pool.remaining());

        if !valid_demand(herd_demand_tonnes) {
            warn!(herd_demand_tonnes, "Herd demand must be positive, returning empty plan");
            return plan;
        }

        let ops_by_id: HashMap<&str, &OperationalRequirement> = operations
            .iter()
            .map(|o| (o.pasture_id.as_str(), o))
            .collect();

        let mut remaining = herd_demand_tonnes;

        for pasture in self.candidates(pastures) {
            if remaining <= 0.0 {
                break;
            }

            let free = OperationalRequirement::free(pasture.id.clone());
            let req = ops_by_id.get(pasture.id.as_str()).copied().unwrap_or(&free);

            if let Some(resource) = pool.shortfall(req) {
                debug!(pasture = %pasture.id, resource, "Insufficient capacity, skipping");
                continue;
            }

            let available = pasture.standing_tonnes() * CONSTRAINED_UTILIZATION;
            let cap = available.min(remaining);
            let graze = round2_within(cap, cap);
            if graze <= 0.0 {
                debug!(pasture = %pasture.id, "Nothing grazeable, skipping");
                continue;
            }

            if !pool.try_consume(req) {
                continue;
            }

            let recovery = self.recovery_for(pasture, cap, 1.0, constraints.min_recovery_days);
            let pressure = grazing_pressure(cap, available);

            debug!(
                pasture = %pasture.id,
                graze,
                recovery_days = recovery,
                water_left = pool.water_left(),
                labor_left = pool.labor_left(),
                fence_left = pool.fence_left(),
                "Accepted pasture"
            );

            plan.decisions.push(GrazingDecision {
                pasture_id: pasture.id.clone(),
                graze_tonnes: graze,
                recovery_days: recovery,
                carbon_impact: self.carbon_impact(pasture, recovery, pressure),
                constraints_ok: true,
            });

            remaining -= graze;
        }

        plan.unmet_demand = round2(remaining.max(0.0));
        plan.resources_remaining = Some(pool.remaining());
        info!(
            decisions = plan.decisions.len(),
            unmet_demand = plan.unmet_demand,
            "Constrained allocation complete"
        );
        plan
    }

    /// Plannable, non-resting pastures in priority order.
    fn candidates<'p>(&self, pastures: &'p [PastureUnit]) -> Vec<&'p PastureUnit> {
        let mut candidates: Vec<&PastureUnit> = pastures
            .iter()
            .filter(|p| {
                if !p.is_plannable() {
                    warn!(pasture = %p.id, area_ha = p.area_ha, "Invalid pasture, excluded from planning");
                    return false;
                }
                if let Some((ledger, day)) = self.rest {
                    if ledger.is_resting(&p.id, day) {
                        debug!(pasture = %p.id, day, "Pasture resting, excluded from planning");
                        return false;
                    }
                }
                true
            })
            .collect();
        candidates.sort_by(|a, b| priority(a, b));
        candidates
    }

    fn recovery_for(
        &self,
        pasture: &PastureUnit,
        graze: f64,
        multiplier: f64,
        min_days: u32,
    ) -> u32 {
        recovery_days(graze, pasture.daily_regrowth_tonnes(), multiplier, min_days)
            .unwrap_or_else(|| {
                warn!(
                    pasture = %pasture.id,
                    recovery_rate = pasture.recovery_rate_t_ha_day,
                    "Zero regrowth rate, using minimum recovery period"
                );
                min_days
            })
    }

    fn carbon_impact(&self, pasture: &PastureUnit, recovery: u32, pressure: f64) -> Option<f64> {
        let delta = pasture.recovery_rate_t_ha_day * recovery as f64;
        match self
            .carbon
            .estimate(delta, pressure, pasture.soil_sensitivity)
        {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(pasture = %pasture.id, "Carbon estimate failed: {}", e);
                None
            }
        }
    }
}

fn valid_demand(herd_demand_tonnes: f64) -> bool {
    herd_demand_tonnes.is_finite() && herd_demand_tonnes > 0.0
}

fn priority(a: &PastureUnit, b: &PastureUnit) -> Ordering {
    b.biomass_density_t_ha
        .total_cmp(&a.biomass_density_t_ha)
        .then_with(|| a.soil_sensitivity.total_cmp(&b.soil_sensitivity))
        .then_with(|| a.id.cmp(&b.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::carbon::{LinearCarbonModel, UnavailableCarbonModel};
    use crate::models::{reference_operations, reference_pastures};

    fn scenario_b_constraints() -> FarmConstraints {
        FarmConstraints {
            max_daily_labor_hours: 8.0,
            available_water_l_per_day: 3000.0,
            movable_fence_units: 15,
            min_recovery_days: 21,
        }
    }

    #[test]
    fn unconstrained_reference_herd_takes_p4_only() {
        let plan =
            GrazingAllocator::new(&LinearCarbonModel).allocate(&reference_pastures(), 35.0, 90);

        assert_eq!(plan.decisions.len(), 1);
        let d = &plan.decisions[0];
        assert_eq!(d.pasture_id, "P4");
        assert_eq!(d.graze_tonnes, 35.0);
        // 35 t / (0.04 * 25) * 1.2
        assert_eq!(d.recovery_days, 42);
        assert!(d.carbon_impact.is_some());
        assert_eq!(plan.unmet_demand, 0.0);
        assert_eq!(plan.horizon_days, Some(90));
        assert!(plan.resources_remaining.is_none());
    }

    #[test]
    fn unconstrained_spills_over_in_biomass_order() {
        let plan =
            GrazingAllocator::new(&LinearCarbonModel).allocate(&reference_pastures(), 80.0, 90);
        let ids: Vec<_> = plan.decisions.iter().map(|d| d.pasture_id.as_str()).collect();
        // P4: 42, P2: 25.92, P1: 12.08 of 13.92
        assert_eq!(ids, vec!["P4", "P2", "P1"]);
        assert_eq!(plan.decisions[0].graze_tonnes, 42.0);
        assert_eq!(plan.decisions[1].graze_tonnes, 25.92);
        assert_eq!(plan.decisions[2].graze_tonnes, 12.08);
        assert_eq!(plan.unmet_demand, 0.0);
    }

    #[test]
    fn unconstrained_reports_unmet_demand() {
        let plan =
            GrazingAllocator::new(&LinearCarbonModel).allocate(&reference_pastures(), 200.0, 90);
        assert_eq!(plan.decisions.len(), 4);
        // 42 + 25.92 + 13.92 + 7.2 = 89.04
        assert_eq!(plan.unmet_demand, 110.96);
    }

    #[test]
    fn graze_never_exceeds_demand_or_cap() {
        let pastures = reference_pastures();
        for demand in [0.5, 3.333, 17.777, 35.0, 61.005, 89.04, 150.0] {
            for plan in [
                GrazingAllocator::new(&LinearCarbonModel).allocate(&pastures, demand, 90),
                GrazingAllocator::new(&LinearCarbonModel).allocate_constrained(
                    &pastures,
                    &[],
                    &scenario_b_constraints(),
                    demand,
                ),
            ] {
                assert!(plan.total_grazed() <= demand + 1e-9, "demand {}", demand);
                let factor = match plan.variant {
                    PlanVariant::Unconstrained => UNCONSTRAINED_UTILIZATION,
                    PlanVariant::Constrained => CONSTRAINED_UTILIZATION,
                };
                for d in &plan.decisions {
                    let p = pastures.iter().find(|p| p.id == d.pasture_id).unwrap();
                    assert!(d.graze_tonnes <= p.standing_tonnes() * factor + 1e-9);
                }
            }
        }
    }

    #[test]
    fn ties_break_on_sensitivity_then_id() {
        let pastures = vec![
            PastureUnit::new("B", 10.0, 3.0, 0.05, 0.3),
            PastureUnit::new("C", 10.0, 3.0, 0.05, 0.1),
            PastureUnit::new("A", 10.0, 3.0, 0.05, 0.3),
        ];
        let plan = GrazingAllocator::new(&LinearCarbonModel).allocate(&pastures, 100.0, 30);
        let ids: Vec<_> = plan.decisions.iter().map(|d| d.pasture_id.as_str()).collect();
        assert_eq!(ids, vec!["C", "A", "B"]);
    }

    #[test]
    fn empty_inputs_return_empty_plan() {
        let allocator = GrazingAllocator::new(&LinearCarbonModel);

        let plan = allocator.allocate(&[], 35.0, 90);
        assert!(plan.is_empty());
        assert_eq!(plan.unmet_demand, 35.0);

        let plan = allocator.allocate_constrained(&[], &[], &scenario_b_constraints(), 35.0);
        assert!(plan.is_empty());
        assert_eq!(plan.unmet_demand, 35.0);
    }

    #[test]
    fn non_positive_demand_returns_empty_plan() {
        let allocator = GrazingAllocator::new(&LinearCarbonModel);
        for demand in [0.0, -5.0, f64::NAN] {
            let plan = allocator.allocate(&reference_pastures(), demand, 90);
            assert!(plan.is_empty());
        }
        let plan = allocator.allocate(&reference_pastures(), -5.0, 90);
        assert_eq!(plan.unmet_demand, -5.0);
    }

    #[test]
    fn invalid_area_is_skipped() {
        let mut pastures = reference_pastures();
        pastures.push(PastureUnit::new("BAD", 0.0, 5.5, 0.05, 0.1));
        let plan = GrazingAllocator::new(&LinearCarbonModel).allocate(&pastures, 35.0, 90);
        assert_eq!(plan.decisions[0].pasture_id, "P4");
        assert!(plan.decision_for("BAD").is_none());
    }

    #[test]
    fn zero_regrowth_falls_back_to_minimum() {
        let pastures = vec![PastureUnit::new("Z", 10.0, 4.0, 0.0, 0.2)];
        let plan = GrazingAllocator::new(&LinearCarbonModel)
            .with_min_recovery_days(28)
            .allocate(&pastures, 5.0, 90);
        assert_eq!(plan.decisions[0].recovery_days, 28);

        let plan = GrazingAllocator::new(&LinearCarbonModel).allocate_constrained(
            &pastures,
            &[],
            &scenario_b_constraints(),
            5.0,
        );
        assert_eq!(plan.decisions[0].recovery_days, 21);
    }

    #[test]
    fn recovery_uses_unrounded_graze() {
        // 1.004 t rounds to 1.00 t, but the rest period covers the full 1.004 t.
        let pastures = vec![PastureUnit::new("A", 1.0, 10.0, 0.2, 0.1)];

        let plan = GrazingAllocator::new(&LinearCarbonModel)
            .with_min_recovery_days(1)
            .allocate(&pastures, 1.004, 90);
        let d = &plan.decisions[0];
        assert_eq!(d.graze_tonnes, 1.0);
        // ceil(1.004 / 0.2 * 1.2) = ceil(6.024)
        assert_eq!(d.recovery_days, 7);

        let constraints = FarmConstraints {
            min_recovery_days: 1,
            ..FarmConstraints::default()
        };
        let plan = GrazingAllocator::new(&LinearCarbonModel).allocate_constrained(
            &pastures,
            &[],
            &constraints,
            1.004,
        );
        let d = &plan.decisions[0];
        assert_eq!(d.graze_tonnes, 1.0);
        // ceil(1.004 / 0.2) = ceil(5.02)
        assert_eq!(d.recovery_days, 6);
    }

    #[test]
    fn carbon_failure_keeps_decision() {
        let plan = GrazingAllocator::new(&UnavailableCarbonModel).allocate(
            &reference_pastures(),
            35.0,
            90,
        );
        assert_eq!(plan.decisions.len(), 1);
        assert_eq!(plan.decisions[0].carbon_impact, None);
        assert_eq!(plan.decisions[0].graze_tonnes, 35.0);
    }

    #[test]
    fn resting_pastures_are_not_targets() {
        let mut ledger = RestLedger::new();
        ledger.rest("P4", 30);
        let plan = GrazingAllocator::new(&LinearCarbonModel)
            .with_rest_ledger(&ledger, 10)
            .allocate(&reference_pastures(), 35.0, 90);
        assert!(plan.decision_for("P4").is_none());
        assert_eq!(plan.decisions[0].pasture_id, "P2");

        let plan = GrazingAllocator::new(&LinearCarbonModel)
            .with_rest_ledger(&ledger, 31)
            .allocate(&reference_pastures(), 35.0, 90);
        assert_eq!(plan.decisions[0].pasture_id, "P4");
    }

    #[test]
    fn constrained_reference_accepts_p4_and_charges_pool() {
        let plan = GrazingAllocator::new(&LinearCarbonModel).allocate_constrained(
            &reference_pastures(),
            &[OperationalRequirement::new("P4", 1200.0, 2.5, 6)],
            &scenario_b_constraints(),
            35.0,
        );

        assert_eq!(plan.decisions.len(), 1);
        let d = &plan.decisions[0];
        assert_eq!(d.pasture_id, "P4");
        // 4.2 * 25 * 0.35
        assert_eq!(d.graze_tonnes, 35.0);
        assert_eq!(d.recovery_days, 35);
        assert!(d.constraints_ok);

        let left = plan.resources_remaining.unwrap();
        assert_eq!(left.water_l, 1800.0);
        assert_eq!(left.labor_hours, 5.5);
        assert_eq!(left.fence_units, 9);
        assert_eq!(plan.unmet_demand, 0.0);
    }

    #[test]
    fn constrained_skips_unaffordable_without_consuming() {
        let constraints = FarmConstraints {
            max_daily_labor_hours: 8.0,
            available_water_l_per_day: 1000.0,
            movable_fence_units: 15,
            min_recovery_days: 21,
        };
        let plan = GrazingAllocator::new(&LinearCarbonModel).allocate_constrained(
            &reference_pastures(),
            &reference_operations(),
            &constraints,
            60.0,
        );

        // P4 needs 1200 L and is skipped; P2 (600 L) then P3 (400 L) fit, P1 (800 L) does not.
        let ids: Vec<_> = plan.decisions.iter().map(|d| d.pasture_id.as_str()).collect();
        assert_eq!(ids, vec!["P2", "P3"]);
        let left = plan.resources_remaining.unwrap();
        assert_eq!(left.water_l, 0.0);
        assert_eq!(left.labor_hours, 5.5);
        assert_eq!(left.fence_units, 10);
        // 22.68 + 6.3 grazed
        assert_eq!(plan.unmet_demand, 31.02);
    }

    #[test]
    fn constrained_consumption_bounded_by_pool() {
        let constraints = scenario_b_constraints();
        let ops = reference_operations();
        let plan = GrazingAllocator::new(&LinearCarbonModel).allocate_constrained(
            &reference_pastures(),
            &ops,
            &constraints,
            500.0,
        );

        let (mut water, mut labor, mut fence) = (0.0, 0.0, 0);
        for d in &plan.decisions {
            let o = ops.iter().find(|o| o.pasture_id == d.pasture_id).unwrap();
            water += o.water_l_per_day;
            labor += o.labor_hours_per_move;
            fence += o.fence_units_required;
            assert!(d.recovery_days >= constraints.min_recovery_days);
        }
        assert!(water <= constraints.available_water_l_per_day);
        assert!(labor <= constraints.max_daily_labor_hours);
        assert!(fence <= constraints.movable_fence_units);
    }

    #[test]
    fn allocation_is_repeatable() {
        let allocator = GrazingAllocator::new(&LinearCarbonModel);
        let pastures = reference_pastures();
        let ops = reference_operations();

        let a = serde_json::to_string(&allocator.allocate(&pastures, 61.0, 90)).unwrap();
        let b = serde_json::to_string(&allocator.allocate(&pastures, 61.0, 90)).unwrap();
        assert_eq!(a, b);

        let constraints = scenario_b_constraints();
        let a = allocator.allocate_constrained(&pastures, &ops, &constraints, 61.0);
        let b = allocator.allocate_constrained(&pastures, &ops, &constraints, 61.0);
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
        assert_eq!(pastures, reference_pastures());
    }
}
