use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pastureops", version, about = "Grazing rotation planner")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to config.yaml
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Override SQLite data directory
    #[arg(short, long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Increase log verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a default config and seed the pasture registry
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
    /// List registered pastures and their operating costs
    Pastures {
        #[arg(long)]
        json: bool,
    },
    /// Import pasture and operations records from a YAML file
    Import { file: PathBuf },
    /// Refresh pasture biomass from the seeded synthetic estimator
    SyncBiomass {
        /// Seed override (defaults to biomass.synthetic_seed)
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Allocate herd demand across pastures
    Plan {
        /// Respect water, labour and fencing limits
        #[arg(long)]
        constrained: bool,
        /// Herd demand in tonnes
        #[arg(long)]
        demand: Option<f64>,
        /// Planning horizon in days
        #[arg(long)]
        horizon: Option<u32>,
        /// Skip pastures still resting at the end of this timeline
        /// (JSON written by `simulate --json`)
        #[arg(long, value_name = "FILE")]
        after_timeline: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// Plan, then simulate the rotation day by day
    Simulate {
        /// First simulated day (YYYY-MM-DD, defaults to today)
        #[arg(long)]
        start: Option<NaiveDate>,
        #[arg(long)]
        horizon: Option<u32>,
        #[arg(long)]
        demand: Option<f64>,
        /// Daily biomass growth in t/ha
        #[arg(long)]
        growth: Option<f64>,
        #[arg(long)]
        json: bool,
    },
    /// Compare outcomes for delayed grazing starts
    Scenarios {
        /// Delay values in days
        #[arg(long, value_delimiter = ',', default_values_t = vec![0u32, 7, 14])]
        delays: Vec<u32>,
        #[arg(long)]
        start: Option<NaiveDate>,
        #[arg(long)]
        json: bool,
    },
    /// Show recent audit records
    Audit {
        #[arg(long, default_value_t = 20)]
        limit: u32,
        #[arg(long)]
        json: bool,
    },
}
