use super::allocator::GrazingAllocator;
use super::carbon::CarbonModel;
use super::scheduler::{CancellationToken, RotationScheduler, SimulationSettings};
use crate::error::{PastureOpsError, Result};
use crate::models::{GrazingPlan, PastureUnit};
use chrono::{Duration, NaiveDate};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

/// Shared, read-only inputs for a batch of what-if runs.
#[derive(Clone)]
pub struct ScenarioRequest {
    pub pastures: Arc<Vec<PastureUnit>>,
    pub herd_demand_tonnes: f64,
    pub horizon_days: u32,
    pub start_date: NaiveDate,
    pub min_recovery_days: u32,
    pub settings: SimulationSettings,
    pub carbon: Arc<dyn CarbonModel>,
    /// Shared by every run in the batch; cancelling stops all of them.
    pub cancel: Option<CancellationToken>,
    pub deadline: Option<Instant>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioOutcome {
    pub delay_days: u32,
    pub start_date: NaiveDate,
    pub plan: GrazingPlan,
    pub unmet_demand: f64,
    pub total_grazed_tonnes: f64,
    pub grazing_events: usize,
    pub final_mean_biomass_t_ha: Option<f64>,
}

/// Pasture snapshot as it would stand after `delay_days` more days of
/// ungrazed regrowth.
///
/// Only the added growth is limited: it stops at the biomass ceiling and a
/// decline stops at zero. Stored densities outside the simulation bounds are
/// never pulled into them, so a zero delay returns the snapshot unchanged.
pub fn advance_biomass(
    pastures: &[PastureUnit],
    delay_days: u32,
    settings: &SimulationSettings,
) -> Vec<PastureUnit> {
    let settings = settings.sanitized();
    let growth = delay_days as f64 * settings.daily_growth_t_ha;
    pastures
        .iter()
        .map(|p| {
            let current = p.biomass_density_t_ha;
            let advanced = if !current.is_finite() || growth == 0.0 {
                current
            } else if growth > 0.0 {
                current.max((current + growth).min(settings.max_biomass_t_ha))
            } else {
                (current + growth).max(0.0).min(current)
            };
            PastureUnit {
                biomass_density_t_ha: advanced,
                ..p.clone()
            }
        })
        .collect()
}

/// Plan and simulate one delay value on a private copy of the snapshot.
pub fn run_scenario(request: &ScenarioRequest, delay_days: u32) -> Result<ScenarioOutcome> {
    let pastures = advance_biomass(&request.pastures, delay_days, &request.settings);
    let start_date = request.start_date + Duration::days(delay_days as i64);

    let plan = GrazingAllocator::new(request.carbon.as_ref())
        .with_min_recovery_days(request.min_recovery_days)
        .allocate(&pastures, request.herd_demand_tonnes, request.horizon_days);

    let mut scheduler = RotationScheduler::new(request.settings.clone());
    if let Some(ref token) = request.cancel {
        scheduler = scheduler.with_cancellation(token.clone());
    }
    if let Some(deadline) = request.deadline {
        scheduler = scheduler.with_deadline(deadline);
    }

    let timeline = scheduler.simulate(
        &pastures,
        &plan,
        start_date,
        request.horizon_days,
    )?;

    tracing::debug!(
        delay_days,
        events = timeline.event_count(),
        "Scenario complete"
    );

    Ok(ScenarioOutcome {
        delay_days,
        start_date,
        unmet_demand: plan.unmet_demand,
        total_grazed_tonnes: timeline.total_grazed(),
        grazing_events: timeline.event_count(),
        final_mean_biomass_t_ha: timeline.final_mean_biomass(),
        plan,
    })
}

/// Run each delay on its own blocking worker. Runs share only the
/// immutable request; outcomes come back ordered by delay.
pub async fn run_scenarios(
    request: ScenarioRequest,
    delays: &[u32],
) -> Result<Vec<ScenarioOutcome>> {
    let mut delays = delays.to_vec();
    delays.sort_unstable();
    delays.dedup();

    let handles: Vec<_> = delays
        .into_iter()
        .map(|delay| {
            let request = request.clone();
            tokio::task::spawn_blocking(move || run_scenario(&request, delay))
        })
        .collect();

    let mut outcomes = Vec::with_capacity(handles.len());
    for handle in handles {
        let outcome = handle
            .await
            .map_err(|e| PastureOpsError::Worker(e.to_string()))??;
        outcomes.push(outcome);
    }

    tracing::info!(scenarios = outcomes.len(), "What-if scenarios complete");
    Ok(outcomes)
}
