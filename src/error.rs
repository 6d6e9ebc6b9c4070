use thiserror::Error;

#[derive(Error, Debug)]
pub enum PastureOpsError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Data source unavailable: {0}")]
    DataSourceUnavailable(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Scenario worker failed: {0}")]
    Worker(String),

    #[error("Simulation cancelled at day {day}")]
    Cancelled { day: u32 },
}

pub type Result<T> = std::result::Result<T, PastureOpsError>;
