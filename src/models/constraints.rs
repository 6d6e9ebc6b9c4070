use super::pasture::OperationalRequirement;
use crate::logic::calculations::round_to;
use serde::{Deserialize, Serialize};

/// Farm-level daily operating limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FarmConstraints {
    pub max_daily_labor_hours: f64,
    pub available_water_l_per_day: f64,
    pub movable_fence_units: u32,
    pub min_recovery_days: u32,
}

impl Default for FarmConstraints {
    fn default() -> Self {
        Self {
            max_daily_labor_hours: 8.0,
            available_water_l_per_day: 3000.0,
            movable_fence_units: 15,
            min_recovery_days: 21,
        }
    }
}

/// Remaining daily capacity, reported after a constrained pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourcesRemaining {
    pub water_l: f64,
    pub labor_hours: f64,
    pub fence_units: u32,
}

/// Consumable capacity for one planning run.
///
/// Counters only move down, and only through [`ResourcePool::try_consume`],
/// which either takes the whole requirement or nothing.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourcePool {
    water_left: f64,
    labor_left: f64,
    fence_left: u32,
}

impl ResourcePool {
    pub fn from_constraints(constraints: &FarmConstraints) -> Self {
        Self {
            water_left: constraints.available_water_l_per_day.max(0.0),
            labor_left: constraints.max_daily_labor_hours.max(0.0),
            fence_left: constraints.movable_fence_units,
        }
    }

    pub fn water_left(&self) -> f64 {
        self.water_left
    }

    pub fn labor_left(&self) -> f64 {
        self.labor_left
    }

    pub fn fence_left(&self) -> u32 {
        self.fence_left
    }

    /// First resource the requirement would overdraw, if any.
    pub fn shortfall(&self, req: &OperationalRequirement) -> Option<&'static str> {
        if req.water_l_per_day > self.water_left {
            Some("water")
        } else if req.labor_hours_per_move > self.labor_left {
            Some("labor")
        } else if req.fence_units_required > self.fence_left {
            Some("fence")
        } else {
            None
        }
    }

    pub fn can_afford(&self, req: &OperationalRequirement) -> bool {
        self.shortfall(req).is_none()
    }

    /// Deduct the full requirement. Returns false, leaving the pool
    /// untouched, if any counter would go negative.
    pub fn try_consume(&mut self, req: &OperationalRequirement) -> bool {
        if !self.can_afford(req) {
            return false;
        }
        self.water_left = (self.water_left - req.water_l_per_day.max(0.0)).max(0.0);
        self.labor_left = (self.labor_left - req.labor_hours_per_move.max(0.0)).max(0.0);
        self.fence_left -= req.fence_units_required;
        true
    }

    pub fn remaining(&self) -> ResourcesRemaining {
        ResourcesRemaining {
            water_l: round_to(self.water_left, 1),
            labor_hours: round_to(self.labor_left, 1),
            fence_units: self.fence_left,
        }
    }
}
