pub mod allocator;
pub mod audit;
pub mod biomass_sync;
pub mod calculations;
pub mod carbon;
pub mod scenarios;
pub mod scheduler;

pub use allocator::GrazingAllocator;
pub use audit::{AuditLogger, AuditSink, JsonlAuditSink, NoopAuditSink, SqliteAuditSink};
pub use biomass_sync::{BiomassSync, SyncReport};
pub use carbon::{CarbonModel, CarbonModelError, LinearCarbonModel};
pub use scenarios::{run_scenario, run_scenarios, ScenarioOutcome, ScenarioRequest};
pub use scheduler::{CancellationToken, RotationScheduler, Simulation, SimulationSettings};
