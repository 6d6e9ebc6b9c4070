use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CarbonModelError {
    #[error("carbon model unavailable: {0}")]
    Unavailable(String),

    #[error("carbon model rejected input: {0}")]
    InvalidInput(String),
}

/// Soil-carbon accounting collaborator.
///
/// Called once per accepted pasture. Implementations take `&self` and must
/// not rely on call order; a failure only drops that decision's estimate.
pub trait CarbonModel: Send + Sync {
    /// Annualised net soil carbon change (tC/ha/year).
    fn estimate(
        &self,
        biomass_delta_t_ha: f64,
        grazing_pressure: f64,
        soil_sensitivity: f64,
    ) -> Result<f64, CarbonModelError>;
}

/// Linear accounting model
///
/// - Sequestration proportional to regrown biomass (0.45)
/// - Grazing pressure penalty (0.3)
/// - Soil sensitivity penalty (0.2)
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearCarbonModel;

impl CarbonModel for LinearCarbonModel {
    fn estimate(
        &self,
        biomass_delta_t_ha: f64,
        grazing_pressure: f64,
        soil_sensitivity: f64,
    ) -> Result<f64, CarbonModelError> {
        if !(biomass_delta_t_ha.is_finite()
            && grazing_pressure.is_finite()
            && soil_sensitivity.is_finite())
        {
            return Err(CarbonModelError::InvalidInput(format!(
                "non-finite input (delta={}, pressure={}, sensitivity={})",
                biomass_delta_t_ha, grazing_pressure, soil_sensitivity
            )));
        }

        let sequestration = biomass_delta_t_ha * 0.45;
        let grazing_penalty = grazing_pressure * 0.3;
        let soil_penalty = soil_sensitivity * 0.2;

        let net = sequestration - grazing_penalty - soil_penalty;
        Ok((net * 1000.0).round() / 1000.0)
    }
}

/// Stand-in for an accounting service that is down.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableCarbonModel;

impl CarbonModel for UnavailableCarbonModel {
    fn estimate(&self, _: f64, _: f64, _: f64) -> Result<f64, CarbonModelError> {
        Err(CarbonModelError::Unavailable(
            "no carbon accounting backend configured".into(),
        ))
    }
}
