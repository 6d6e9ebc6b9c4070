use super::calculations::round2;
use crate::error::{PastureOpsError, Result};
use crate::models::{
    CarbonState, EventKind, Frame, GrazingDecision, GrazingEvent, GrazingPlan, PastureState,
    PastureUnit, RestLedger, Timeline,
};
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, trace, warn};

/// Share of standing biomass a simulated grazing event may remove.
pub const SIMULATION_UTILIZATION: f64 = 0.35;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CarbonProjection {
    pub soil_carbon_t_ha: f64,
    pub daily_soil_carbon_gain: f64,
    pub annual_change_t_ha: f64,
    pub ground_cover: f64,
    /// Ground-cover fraction lost over the full horizon.
    pub ground_cover_decay: f64,
}

impl Default for CarbonProjection {
    fn default() -> Self {
        Self {
            soil_carbon_t_ha: 85.0,
            daily_soil_carbon_gain: 0.01,
            annual_change_t_ha: 0.12,
            ground_cover: 0.9,
            ground_cover_decay: 0.05,
        }
    }
}

impl CarbonProjection {
    fn at(&self, day: u32, horizon_days: u32) -> CarbonState {
        let elapsed = if horizon_days > 0 {
            day as f64 / horizon_days as f64
        } else {
            0.0
        };
        CarbonState {
            soil_carbon_t_ha: round2(self.soil_carbon_t_ha + day as f64 * self.daily_soil_carbon_gain),
            annual_change_t_ha: self.annual_change_t_ha,
            ground_cover: round2(self.ground_cover - elapsed * self.ground_cover_decay),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSettings {
    pub daily_growth_t_ha: f64,
    pub floor_biomass_t_ha: f64,
    pub max_biomass_t_ha: f64,
    /// Minimum days between two grazing events on the same pasture.
    pub regraze_interval_days: u32,
    pub carbon: CarbonProjection,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            daily_growth_t_ha: 0.06,
            floor_biomass_t_ha: 0.4,
            max_biomass_t_ha: 6.0,
            regraze_interval_days: 21,
            carbon: CarbonProjection::default(),
        }
    }
}

impl SimulationSettings {
    pub fn with_daily_growth(mut self, growth: f64) -> Self {
        self.daily_growth_t_ha = growth;
        self
    }

    /// Copy with bounds and growth made safe to step with.
    pub(crate) fn sanitized(&self) -> Self {
        let mut s = self.clone();
        if !s.daily_growth_t_ha.is_finite() {
            warn!(growth = s.daily_growth_t_ha, "Non-finite daily growth, using 0");
            s.daily_growth_t_ha = 0.0;
        }
        if !(s.floor_biomass_t_ha.is_finite() && s.floor_biomass_t_ha >= 0.0) {
            warn!(floor = s.floor_biomass_t_ha, "Invalid biomass floor, using 0");
            s.floor_biomass_t_ha = 0.0;
        }
        if !(s.max_biomass_t_ha.is_finite() && s.max_biomass_t_ha >= s.floor_biomass_t_ha) {
            warn!(
                max = s.max_biomass_t_ha,
                floor = s.floor_biomass_t_ha,
                "Biomass ceiling below floor, collapsing to floor"
            );
            s.max_biomass_t_ha = s.floor_biomass_t_ha;
        }
        s
    }

    pub(crate) fn bound(&self, biomass: f64) -> f64 {
        if biomass.is_nan() {
            return self.floor_biomass_t_ha;
        }
        biomass.max(self.floor_biomass_t_ha).min(self.max_biomass_t_ha)
    }
}

/// Shared flag for stopping a running simulation between days.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Digital-twin rotation scheduler.
///
/// Replays a [`GrazingPlan`] over a day-indexed horizon. Each pasture is
/// either available or resting until a given day; resting pastures neither
/// regrow nor get grazed. The run is deterministic for identical inputs.
#[derive(Debug, Clone, Default)]
pub struct RotationScheduler {
    settings: SimulationSettings,
    cancel: Option<CancellationToken>,
    deadline: Option<Instant>,
}

impl RotationScheduler {
    pub fn new(settings: SimulationSettings) -> Self {
        Self {
            settings,
            cancel: None,
            deadline: None,
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn settings(&self) -> &SimulationSettings {
        &self.settings
    }

    /// Start a simulation that yields one frame per day.
    ///
    /// The pastures are copied; the caller's snapshot is never modified.
    pub fn start(
        &self,
        pastures: &[PastureUnit],
        plan: &GrazingPlan,
        start_date: NaiveDate,
        horizon_days: u32,
    ) -> Simulation {
        let settings = self.settings.sanitized();

        let mut units: Vec<PastureUnit> = pastures
            .iter()
            .filter(|p| {
                if !p.is_plannable() {
                    warn!(pasture = %p.id, "Invalid pasture, excluded from simulation");
                }
                p.is_plannable()
            })
            .cloned()
            .collect();
        units.sort_by(|a, b| a.id.cmp(&b.id));
        units.dedup_by(|a, b| a.id == b.id);

        let plan_by_pasture: HashMap<String, GrazingDecision> = plan
            .decisions
            .iter()
            .map(|d| (d.pasture_id.clone(), d.clone()))
            .collect();

        let biomass = units
            .iter()
            .map(|p| (p.id.clone(), settings.bound(p.biomass_density_t_ha)))
            .collect();

        info!(
            pastures = units.len(),
            horizon_days,
            %start_date,
            "Starting rotation simulation"
        );

        Simulation {
            settings,
            pastures: units,
            plan_by_pasture,
            biomass,
            ledger: RestLedger::new(),
            last_graze: HashMap::new(),
            start_date,
            horizon_days,
            day: 0,
            cancel: self.cancel.clone(),
            deadline: self.deadline,
            finished: false,
        }
    }

    /// Run the whole horizon and collect the timeline.
    pub fn simulate(
        &self,
        pastures: &[PastureUnit],
        plan: &GrazingPlan,
        start_date: NaiveDate,
        horizon_days: u32,
    ) -> Result<Timeline> {
        let frames = self
            .start(pastures, plan, start_date, horizon_days)
            .collect::<Result<Vec<_>>>()?;

        let timeline = Timeline {
            start_date,
            horizon_days,
            herd_demand_tonnes: plan.herd_demand_tonnes,
            frames,
            plan_summary: plan.decisions.clone(),
        };
        info!(
            frames = timeline.frames.len(),
            events = timeline.event_count(),
            "Rotation simulation complete"
        );
        Ok(timeline)
    }
}

/// A running simulation. Yields each day's [`Frame`] exactly once and
/// cannot be rewound.
pub struct Simulation {
    settings: SimulationSettings,
    pastures: Vec<PastureUnit>,
    plan_by_pasture: HashMap<String, GrazingDecision>,
    biomass: BTreeMap<String, f64>,
    ledger: RestLedger,
    last_graze: HashMap<String, u32>,
    start_date: NaiveDate,
    horizon_days: u32,
    day: u32,
    cancel: Option<CancellationToken>,
    deadline: Option<Instant>,
    finished: bool,
}

impl Simulation {
    pub fn current_day(&self) -> u32 {
        self.day
    }

    /// Rest state as of the last produced frame.
    pub fn rest_ledger(&self) -> &RestLedger {
        &self.ledger
    }

    fn interrupted(&self) -> bool {
        self.cancel.as_ref().is_some_and(|c| c.is_cancelled())
            || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    fn step(&mut self) -> Frame {
        let day = self.day;
        let settings = &self.settings;
        let mut events = Vec::new();
        let mut states = BTreeMap::new();

        for pasture in &self.pastures {
            let id = pasture.id.as_str();
            let mut bio = settings.bound(
                self.biomass
                    .get(id)
                    .copied()
                    .unwrap_or(pasture.biomass_density_t_ha),
            );
            let resting = self.ledger.is_resting(id, day);

            if !resting {
                bio = settings.bound(bio + settings.daily_growth_t_ha);
            }

            if let Some(decision) = self.plan_by_pasture.get(id) {
                let rested_long_enough = self
                    .last_graze
                    .get(id)
                    .map_or(true, |last| day - last >= settings.regraze_interval_days);

                if decision.graze_tonnes > 0.0 && !resting && rested_long_enough {
                    let consumed = decision
                        .graze_tonnes
                        .min(bio * pasture.area_ha * SIMULATION_UTILIZATION);
                    bio = settings.bound(bio - consumed / pasture.area_ha);
                    self.ledger
                        .rest(id, day.saturating_add(decision.recovery_days));
                    self.last_graze.insert(id.to_string(), day);

                    debug!(pasture = id, day, consumed, "Grazing event");
                    events.push(GrazingEvent {
                        kind: EventKind::Grazing,
                        pasture_id: id.to_string(),
                        graze_tonnes: round2(consumed),
                        recovery_days: decision.recovery_days,
                    });
                }
            }

            self.biomass.insert(id.to_string(), bio);

            let status = self.ledger.status(id, day);
            states.insert(
                id.to_string(),
                PastureState {
                    biomass_t_ha: round2(bio),
                    area_ha: pasture.area_ha,
                    status,
                    rest_until_day: if self.ledger.is_resting(id, day) {
                        self.ledger.rest_until(id)
                    } else {
                        None
                    },
                    recovery_days_left: self.ledger.days_left(id, day),
                },
            );
        }

        trace!(day, events = events.len(), "Frame produced");

        Frame {
            day,
            date: self.start_date + Duration::days(day as i64),
            pastures: states,
            events,
            carbon_state: settings.carbon.at(day, self.horizon_days),
        }
    }
}

impl Iterator for Simulation {
    type Item = Result<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished || self.day >= self.horizon_days {
            self.finished = true;
            return None;
        }
        if self.interrupted() {
            self.finished = true;
            warn!(day = self.day, "Simulation cancelled");
            return Some(Err(PastureOpsError::Cancelled { day: self.day }));
        }

        let frame = self.step();
        self.day += 1;
        Some(Ok(frame))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = if self.finished {
            0
        } else {
            self.horizon_days.saturating_sub(self.day) as usize
        };
        (0, Some(left))
    }
}

impl std::iter::FusedIterator for Simulation {}
