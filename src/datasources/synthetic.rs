use super::{BiomassEstimate, BiomassSource};
use crate::error::Result;
use crate::logic::calculations::round_to;
use crate::models::PastureUnit;
use chrono::{Duration, NaiveDate, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

const HISTORY_DAYS: u32 = 90;
const BASE_BIOMASS_T_HA: f64 = 2.2;
const DAILY_TREND_T_HA: f64 = 0.01;
const MAX_NOISE_T_HA: f64 = 0.15;
const GRAZING_CYCLE_DAYS: u32 = 21;
const GRAZED_DAYS_PER_CYCLE: u32 = 5;
const HEAVY_GRAZING_T_HA: f64 = 0.3;
const LIGHT_GRAZING_T_HA: f64 = 0.05;
const FLOOR_BIOMASS_T_HA: f64 = 0.4;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryPoint {
    pub date: NaiveDate,
    pub biomass_t_ha: f64,
    pub rainfall_mm: f64,
    pub temperature_c: f64,
    pub grazing_pressure: f64,
}

/// Seeded stand-in for an imagery-based biomass estimator.
///
/// Each pasture gets its own generator seeded with `seed + index`, where
/// the index is the pasture's position in id order, so output depends only
/// on the seed and the set of ids.
#[derive(Debug, Clone)]
pub struct SyntheticBiomass {
    seed: u64,
    days: u32,
    end_date: NaiveDate,
}

impl SyntheticBiomass {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            days: HISTORY_DAYS,
            end_date: Utc::now().date_naive(),
        }
    }

    pub fn with_days(mut self, days: u32) -> Self {
        self.days = days.max(1);
        self
    }

    /// Date of the day after the last history point.
    pub fn with_end_date(mut self, end_date: NaiveDate) -> Self {
        self.end_date = end_date;
        self
    }

    pub fn history(&self, pasture_seed: u64) -> Vec<HistoryPoint> {
        let mut rng = StdRng::seed_from_u64(pasture_seed);
        (0..self.days)
            .map(|i| {
                let biomass = BASE_BIOMASS_T_HA + DAILY_TREND_T_HA * i as f64
                    - rng.random_range(0.0..MAX_NOISE_T_HA);
                let rainfall = rng.random_range(0.0..12.0);
                let grazing = if i % GRAZING_CYCLE_DAYS < GRAZED_DAYS_PER_CYCLE {
                    HEAVY_GRAZING_T_HA
                } else {
                    LIGHT_GRAZING_T_HA
                };
                let temperature = rng.random_range(12.0..28.0);

                HistoryPoint {
                    date: self.end_date - Duration::days((self.days - i) as i64),
                    biomass_t_ha: round_to((biomass - grazing).max(FLOOR_BIOMASS_T_HA), 2),
                    rainfall_mm: round_to(rainfall, 1),
                    temperature_c: round_to(temperature, 1),
                    grazing_pressure: grazing,
                }
            })
            .collect()
    }

    fn seeds<'a>(&self, pastures: &'a [PastureUnit]) -> Vec<(&'a PastureUnit, u64)> {
        let mut sorted: Vec<&PastureUnit> = pastures.iter().collect();
        sorted.sort_by(|a, b| a.id.cmp(&b.id));
        sorted.dedup_by(|a, b| a.id == b.id);
        sorted
            .into_iter()
            .enumerate()
            .map(|(i, p)| (p, self.seed.wrapping_add(i as u64)))
            .collect()
    }
}

impl BiomassSource for SyntheticBiomass {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    fn estimate(&self, pastures: &[PastureUnit]) -> Result<Vec<BiomassEstimate>> {
        Ok(self
            .seeds(pastures)
            .into_iter()
            .filter_map(|(pasture, seed)| {
                let last = self.history(seed).pop()?;
                Some(BiomassEstimate {
                    pasture_id: pasture.id.clone(),
                    biomass_t_ha: last.biomass_t_ha,
                    measured_on: last.date,
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::reference_pastures;

    fn source() -> SyntheticBiomass {
        SyntheticBiomass::new(7).with_end_date(NaiveDate::from_ymd_opt(2026, 2, 11).unwrap())
    }

    #[test]
    fn history_shape() {
        let history = source().history(7);
        assert_eq!(history.len(), 90);
        assert_eq!(history[0].date, NaiveDate::from_ymd_opt(2025, 11, 13).unwrap());
        assert_eq!(history[89].date, NaiveDate::from_ymd_opt(2026, 2, 10).unwrap());

        for (i, point) in history.iter().enumerate() {
            assert!(point.biomass_t_ha >= 0.4);
            let expected_grazing = if i % 21 < 5 { 0.3 } else { 0.05 };
            assert_eq!(point.grazing_pressure, expected_grazing);
            // base + trend - grazing is the ceiling; noise only subtracts.
            let ceiling = 2.2 + 0.01 * i as f64 - expected_grazing;
            assert!(point.biomass_t_ha <= ceiling + 0.005);
            assert!(point.biomass_t_ha >= ceiling - 0.15 - 0.005);
            assert!((0.0..=12.0).contains(&point.rainfall_mm));
            assert!((12.0..=28.0).contains(&point.temperature_c));
        }
    }

    #[test]
    fn same_seed_same_history() {
        assert_eq!(source().history(11), source().history(11));
        assert_ne!(source().history(11), source().history(12));
    }

    #[test]
    fn estimates_use_last_point_per_pasture() {
        let src = source();
        let estimates = src.estimate(&reference_pastures()).unwrap();
        let ids: Vec<&str> = estimates.iter().map(|e| e.pasture_id.as_str()).collect();
        assert_eq!(ids, vec!["P1", "P2", "P3", "P4"]);

        // P3 is third in id order, so its seed is 7 + 2.
        let p3_last = src.history(9).pop().unwrap();
        assert_eq!(estimates[2].biomass_t_ha, p3_last.biomass_t_ha);
        assert_eq!(estimates[2].measured_on, p3_last.date);
    }

    #[test]
    fn estimates_ignore_input_order() {
        let mut reversed = reference_pastures();
        reversed.reverse();
        assert_eq!(
            source().estimate(&reversed).unwrap(),
            source().estimate(&reference_pastures()).unwrap()
        );
    }
}
