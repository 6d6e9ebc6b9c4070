mod cli;

use anyhow::{bail, Context};
use chrono::{NaiveDate, Utc};
use clap::Parser;
use cli::{Cli, Commands};
use pastureops::config::{AuditSinkKind, Config};
use pastureops::datasources::SyntheticBiomass;
use pastureops::db::Database;
use pastureops::logic::{
    run_scenarios, AuditLogger, BiomassSync, CancellationToken, GrazingAllocator,
    JsonlAuditSink, LinearCarbonModel, NoopAuditSink, RotationScheduler, ScenarioOutcome,
    ScenarioRequest, SqliteAuditSink,
};
use pastureops::models::{
    AuditRecord, GrazingPlan, OperationalRequirement, PastureRegistry, PastureUnit, RestLedger,
    Timeline,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

/// Registry records accepted by `import`.
#[derive(Debug, Default, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    pastures: Vec<PastureUnit>,
    #[serde(default)]
    operations: Vec<OperationalRequirement>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_logging(cli.verbose);

    match &cli.command {
        Commands::Init { force } => cmd_init(cli.config.as_ref(), cli.data_dir.as_ref(), *force),
        Commands::Pastures { json } => {
            let (config, db) = open(&cli)?;
            cmd_pastures(&config, &db, *json)
        }
        Commands::Import { file } => {
            let (_, db) = open(&cli)?;
            cmd_import(&db, file)
        }
        Commands::SyncBiomass { seed } => {
            let (config, db) = open(&cli)?;
            let source = SyntheticBiomass::new(seed.unwrap_or(config.biomass.synthetic_seed));
            let report = BiomassSync::new(db, Box::new(source)).sync()?;
            for estimate in &report.applied {
                println!(
                    "{:<10} {:>6.2} t/ha  ({})",
                    estimate.pasture_id, estimate.biomass_t_ha, estimate.measured_on
                );
            }
            for id in &report.failed {
                println!("{:<10} FAILED", id);
            }
            Ok(())
        }
        Commands::Plan {
            constrained,
            demand,
            horizon,
            after_timeline,
            json,
        } => {
            let (config, db) = open(&cli)?;
            let rest = match after_timeline {
                Some(path) => Some(closing_rest_ledger(path)?),
                None => None,
            };
            cmd_plan(&config, &db, *constrained, *demand, *horizon, rest.as_ref(), *json)
        }
        Commands::Simulate {
            start,
            horizon,
            demand,
            growth,
            json,
        } => {
            let (config, db) = open(&cli)?;
            cmd_simulate(&config, &db, *start, *horizon, *demand, *growth, *json).await
        }
        Commands::Scenarios {
            delays,
            start,
            json,
        } => {
            let (config, db) = open(&cli)?;
            cmd_scenarios(&config, &db, delays, *start, *json).await
        }
        Commands::Audit { limit, json } => {
            let (_, db) = open(&cli)?;
            cmd_audit(&db, *limit, *json)
        }
    }
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn open(cli: &Cli) -> anyhow::Result<(Config, Database)> {
    let config = Config::load_or_default(cli.config.as_ref()).context("loading configuration")?;
    let db = Database::open(cli.data_dir.as_ref()).context("opening database")?;
    Ok((config, db))
}

/// Registry snapshot from the database, or the config's inline records when
/// nothing has been stored yet.
fn registry(config: &Config, db: &Database) -> anyhow::Result<PastureRegistry> {
    let registry = db.load_registry()?;
    if registry.is_empty() {
        tracing::warn!("Pasture registry is empty, using records from config. Run `pastureops init` to persist them.");
        return Ok(config.farm.registry());
    }
    Ok(registry)
}

fn audit_logger(config: &Config, db: &Database) -> AuditLogger {
    if !config.audit.enabled {
        return AuditLogger::disabled();
    }
    let sink: Box<dyn pastureops::logic::AuditSink> = match config.audit.sink {
        AuditSinkKind::Sqlite => Box::new(SqliteAuditSink::new(db.clone())),
        AuditSinkKind::Jsonl => match config.audit.jsonl_path {
            Some(ref path) => Box::new(JsonlAuditSink::new(path.clone())),
            None => Box::new(NoopAuditSink),
        },
        AuditSinkKind::None => Box::new(NoopAuditSink),
    };
    AuditLogger::new(sink, config.farm.farm_id.clone())
        .with_user(config.audit.user_id.clone())
        .with_model_versions(config.audit.model_versions.clone())
}

fn cmd_init(
    config_override: Option<&PathBuf>,
    data_dir: Option<&PathBuf>,
    force: bool,
) -> anyhow::Result<()> {
    let config_path = match config_override {
        Some(p) => p.clone(),
        None => Config::default_config_path()?,
    };

    let config = if config_path.exists() && !force {
        println!("Using existing configuration at {}", config_path.display());
        Config::load(Some(&config_path))?
    } else {
        let config = Config::default();
        config.save(&config_path)?;
        println!("Configuration saved to {}", config_path.display());
        config
    };

    let db = Database::open(data_dir)?;
    for pasture in &config.farm.pastures {
        db.upsert_pasture(pasture)?;
    }
    for op in &config.farm.operations {
        db.upsert_operational_requirement(op)?;
    }
    println!(
        "Seeded {} pastures into {}",
        config.farm.pastures.len(),
        db.path().display()
    );
    Ok(())
}

fn cmd_pastures(config: &Config, db: &Database, json: bool) -> anyhow::Result<()> {
    let registry = registry(config, db)?;
    if json {
        #[derive(serde::Serialize)]
        struct Listing {
            pastures: Vec<PastureUnit>,
            operations: Vec<OperationalRequirement>,
        }
        let listing = Listing {
            pastures: registry.pastures(),
            operations: registry.operations(),
        };
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }

    println!(
        "{:<10} {:>8} {:>10} {:>10} {:>6} {:>9} {:>7} {:>6}",
        "ID", "AREA ha", "BIO t/ha", "REGROWTH", "SENS", "WATER L", "LABOR", "FENCE"
    );
    for p in registry.pastures() {
        let op = registry.requirement(&p.id);
        println!(
            "{:<10} {:>8.1} {:>10.2} {:>10.3} {:>6.2} {:>9} {:>7} {:>6}",
            p.id,
            p.area_ha,
            p.biomass_density_t_ha,
            p.recovery_rate_t_ha_day,
            p.soil_sensitivity,
            op.map(|o| format!("{:.0}", o.water_l_per_day)).unwrap_or_else(|| "-".into()),
            op.map(|o| format!("{:.1}", o.labor_hours_per_move)).unwrap_or_else(|| "-".into()),
            op.map(|o| o.fence_units_required.to_string()).unwrap_or_else(|| "-".into()),
        );
    }
    Ok(())
}

fn cmd_import(db: &Database, file: &Path) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("reading {}", file.display()))?;
    let records: RegistryFile = serde_yaml::from_str(&content)
        .with_context(|| format!("parsing {}", file.display()))?;

    if records.pastures.is_empty() && records.operations.is_empty() {
        bail!("{} contains no pastures or operations", file.display());
    }

    // Validate everything before writing anything.
    for p in &records.pastures {
        p.validate()?;
    }
    for o in &records.operations {
        o.validate()?;
    }

    for p in &records.pastures {
        db.upsert_pasture(p)?;
    }
    for o in &records.operations {
        db.upsert_operational_requirement(o)
            .with_context(|| format!("operations for {} (is the pasture registered?)", o.pasture_id))?;
    }
    println!(
        "Imported {} pastures and {} operational requirements",
        records.pastures.len(),
        records.operations.len()
    );
    Ok(())
}

fn cmd_plan(
    config: &Config,
    db: &Database,
    constrained: bool,
    demand: Option<f64>,
    horizon: Option<u32>,
    rest: Option<&RestLedger>,
    json: bool,
) -> anyhow::Result<()> {
    let registry = registry(config, db)?;
    let demand = demand.unwrap_or(config.planner.herd_demand_tonnes);
    let horizon = horizon.unwrap_or(config.planner.horizon_days);
    let constraints = &config.farm.constraints;
    let carbon = LinearCarbonModel;
    let mut allocator =
        GrazingAllocator::new(&carbon).with_min_recovery_days(constraints.min_recovery_days);
    if let Some(ledger) = rest {
        allocator = allocator.with_rest_ledger(ledger, 0);
    }

    let plan = if constrained {
        allocator.allocate_constrained(
            &registry.pastures(),
            &registry.operations(),
            constraints,
            demand,
        )
    } else {
        allocator.allocate(&registry.pastures(), demand, horizon)
    };

    audit_logger(config, db).log_plan(&plan, constrained.then_some(constraints));

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        print_plan(&plan);
    }
    Ok(())
}

/// Rest periods still open at the end of a timeline written by `simulate --json`.
fn closing_rest_ledger(path: &Path) -> anyhow::Result<RestLedger> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let timeline = Timeline::from_json(&content)
        .with_context(|| format!("parsing timeline {}", path.display()))?;
    let ledger = timeline.closing_rest_ledger();
    tracing::info!(resting = ledger.len(), "Carrying rest periods from previous timeline");
    Ok(ledger)
}

fn print_plan(plan: &GrazingPlan) {
    println!(
        "{} plan for {:.2} t herd demand",
        plan.variant, plan.herd_demand_tonnes
    );
    println!(
        "{:<10} {:>10} {:>9} {:>8} {:>6}",
        "PASTURE", "GRAZE t", "RECOVERY", "CARBON", "OK"
    );
    for d in &plan.decisions {
        println!(
            "{:<10} {:>10.2} {:>9} {:>8} {:>6}",
            d.pasture_id,
            d.graze_tonnes,
            d.recovery_days,
            d.carbon_impact
                .map(|c| format!("{:.3}", c))
                .unwrap_or_else(|| "n/a".into()),
            if d.constraints_ok { "yes" } else { "no" },
        );
    }
    println!("Unmet demand: {:.2} t", plan.unmet_demand);
    if let Some(ref left) = plan.resources_remaining {
        println!(
            "Remaining: water {:.1} L, labour {:.1} h, fence {} units",
            left.water_l, left.labor_hours, left.fence_units
        );
    }
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let handle = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.cancel();
        }
    });
    token
}

async fn cmd_simulate(
    config: &Config,
    db: &Database,
    start: Option<NaiveDate>,
    horizon: Option<u32>,
    demand: Option<f64>,
    growth: Option<f64>,
    json: bool,
) -> anyhow::Result<()> {
    let registry = registry(config, db)?;
    let pastures = registry.pastures();
    let start = start.unwrap_or_else(|| Utc::now().date_naive());
    let horizon = horizon.unwrap_or(config.planner.horizon_days);
    let demand = demand.unwrap_or(config.planner.herd_demand_tonnes);

    let mut settings = config.simulation.settings.clone();
    if let Some(growth) = growth {
        settings = settings.with_daily_growth(growth);
    }

    let plan = GrazingAllocator::new(&LinearCarbonModel)
        .with_min_recovery_days(config.farm.constraints.min_recovery_days)
        .allocate(&pastures, demand, horizon);

    let mut scheduler = RotationScheduler::new(settings).with_cancellation(cancel_on_ctrl_c());
    if let Some(budget) = config.simulation.max_wall_time() {
        scheduler = scheduler.with_deadline(Instant::now() + budget);
    }

    let sim_plan = plan.clone();
    let timeline = tokio::task::spawn_blocking(move || {
        scheduler.simulate(&pastures, &sim_plan, start, horizon)
    })
    .await
    .context("simulation worker")??;

    audit_logger(config, db).log_timeline(&timeline);

    if json {
        println!("{}", serde_json::to_string_pretty(&timeline)?);
    } else {
        print_plan(&plan);
        println!();
        print_timeline(&timeline);
    }
    Ok(())
}

fn print_timeline(timeline: &Timeline) {
    println!(
        "Simulated {} days from {}",
        timeline.frames.len(),
        timeline.start_date
    );
    for (frame, event) in timeline.events() {
        println!(
            "  day {:>3} ({})  graze {:<8} {:>7.2} t, rest {} days",
            frame.day, frame.date, event.pasture_id, event.graze_tonnes, event.recovery_days
        );
    }
    if let Some(last) = timeline.last_frame() {
        println!("Final state ({}):", last.date);
        for (id, state) in &last.pastures {
            println!(
                "  {:<10} {:>6.2} t/ha  {:<9} {} days left",
                id,
                state.biomass_t_ha,
                state.status.as_str(),
                state.recovery_days_left
            );
        }
        println!(
            "Soil carbon {:.2} t/ha, ground cover {:.2}",
            last.carbon_state.soil_carbon_t_ha, last.carbon_state.ground_cover
        );
    }
}

async fn cmd_scenarios(
    config: &Config,
    db: &Database,
    delays: &[u32],
    start: Option<NaiveDate>,
    json: bool,
) -> anyhow::Result<()> {
    let registry = registry(config, db)?;
    let request = ScenarioRequest {
        pastures: Arc::new(registry.pastures()),
        herd_demand_tonnes: config.planner.herd_demand_tonnes,
        horizon_days: config.planner.horizon_days,
        start_date: start.unwrap_or_else(|| Utc::now().date_naive()),
        min_recovery_days: config.farm.constraints.min_recovery_days,
        settings: config.simulation.settings.clone(),
        carbon: Arc::new(LinearCarbonModel),
        cancel: Some(cancel_on_ctrl_c()),
        deadline: config
            .simulation
            .max_wall_time()
            .map(|budget| Instant::now() + budget),
    };

    let outcomes = run_scenarios(request, delays).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcomes)?);
    } else {
        print_scenarios(&outcomes);
    }
    Ok(())
}

fn print_scenarios(outcomes: &[ScenarioOutcome]) {
    println!(
        "{:>6} {:<11} {:>10} {:>7} {:>10} {:>10}",
        "DELAY", "START", "GRAZED t", "EVENTS", "UNMET t", "MEAN t/ha"
    );
    for o in outcomes {
        println!(
            "{:>6} {:<11} {:>10.2} {:>7} {:>10.2} {:>10}",
            o.delay_days,
            o.start_date,
            o.total_grazed_tonnes,
            o.grazing_events,
            o.unmet_demand,
            o.final_mean_biomass_t_ha
                .map(|b| format!("{:.2}", b))
                .unwrap_or_else(|| "-".into()),
        );
    }
}

fn cmd_audit(db: &Database, limit: u32, json: bool) -> anyhow::Result<()> {
    let records: Vec<AuditRecord> = db.recent_audit_records(limit)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }
    for r in &records {
        println!(
            "{}  {:<12} {:<10} {}  {}",
            r.timestamp.format("%Y-%m-%d %H:%M:%S"),
            r.decision_type.as_str(),
            r.pasture_id,
            r.event_id,
            r.outputs
        );
    }
    if records.is_empty() {
        println!("No audit records.");
    }
    Ok(())
}
