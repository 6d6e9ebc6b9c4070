pub mod synthetic;

pub use synthetic::SyntheticBiomass;

use crate::error::Result;
use crate::models::PastureUnit;
use chrono::NaiveDate;
use serde::Serialize;

/// Current biomass density for one pasture, as reported upstream.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BiomassEstimate {
    pub pasture_id: String,
    pub biomass_t_ha: f64,
    pub measured_on: NaiveDate,
}

/// Supplier of biomass estimates for registered pastures.
pub trait BiomassSource: Send + Sync {
    fn name(&self) -> &'static str;

    fn estimate(&self, pastures: &[PastureUnit]) -> Result<Vec<BiomassEstimate>>;
}
