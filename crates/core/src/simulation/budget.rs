//! Global mass budget
//!
//! ```text
//! released = airborne + dry + wet + decayed + outflow + retired
//! ```
//!
//! per species, where `outflow` is mass carried out of the domain and
//! `retired` is mass held by particles terminated for age, negligible mass or
//! numeric failure.

use crate::deposition::RemovedMass;
use crate::error::{DispersionError, Result};

/// Running mass totals per species (kg).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MassBudget {
    pub released: Vec<f64>,
    pub dry: Vec<f64>,
    pub wet: Vec<f64>,
    pub decayed: Vec<f64>,
    pub outflow: Vec<f64>,
    pub retired: Vec<f64>,
}

fn add(total: &mut [f64], mass: &[f64]) {
    for (t, m) in total.iter_mut().zip(mass) {
        *t += m;
    }
}

impl MassBudget {
    pub fn new(species_count: usize) -> Self {
        let zeros = vec![0.0; species_count];
        Self {
            released: zeros.clone(),
            dry: zeros.clone(),
            wet: zeros.clone(),
            decayed: zeros.clone(),
            outflow: zeros.clone(),
            retired: zeros,
        }
    }

    pub fn species_count(&self) -> usize {
        self.released.len()
    }

    pub fn add_released(&mut self, mass: &[f64]) {
        add(&mut self.released, mass);
    }

    pub fn add_removed(&mut self, removed: &RemovedMass) {
        add(&mut self.dry, &removed.dry);
        add(&mut self.wet, &removed.wet);
        add(&mut self.decayed, &removed.decayed);
    }

    pub fn add_outflow(&mut self, mass: &[f64]) {
        add(&mut self.outflow, mass);
    }

    pub fn add_retired(&mut self, mass: &[f64]) {
        add(&mut self.retired, mass);
    }

    /// Mass of one species accounted for by the airborne mass and every sink.
    pub fn accounted(&self, species: usize, airborne: f64) -> f64 {
        airborne
            + self.dry[species]
            + self.wet[species]
            + self.decayed[species]
            + self.outflow[species]
            + self.retired[species]
    }

    pub fn total_released(&self) -> f64 {
        self.released.iter().sum()
    }

    /// Largest relative error over species given the airborne mass.
    pub fn relative_error(&self, airborne: &[f64]) -> f64 {
        (0..self.species_count())
            .map(|s| {
                let released = self.released[s];
                let accounted = self.accounted(s, airborne[s]);
                let scale = released.abs().max(accounted.abs());
                if scale == 0.0 {
                    0.0
                } else {
                    (released - accounted).abs() / scale
                }
            })
            .fold(0.0, f64::max)
    }

    /// `MassImbalance` when any species is off by more than `tolerance`.
    pub fn check(&self, airborne: &[f64], tolerance: f64) -> Result<()> {
        let relative = self.relative_error(airborne);
        if relative <= tolerance {
            return Ok(());
        }
        let accounted: f64 = (0..self.species_count())
            .map(|s| self.accounted(s, airborne[s]))
            .sum();
        Err(DispersionError::MassImbalance {
            released: self.total_released(),
            accounted,
            relative,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closes_when_every_sink_is_counted() {
        let mut budget = MassBudget::new(2);
        budget.add_released(&[10.0, 4.0]);
        budget.add_removed(&RemovedMass {
            dry: vec![1.0, 0.0],
            wet: vec![0.5, 1.0],
            decayed: vec![0.0, 1.0],
        });
        budget.add_outflow(&[2.0, 0.0]);
        budget.add_retired(&[0.5, 0.0]);
        assert!(budget.check(&[6.0, 2.0], 1e-12).is_ok());
    }

    #[test]
    fn reports_missing_mass() {
        let mut budget = MassBudget::new(1);
        budget.add_released(&[10.0]);
        let err = budget.check(&[9.0], 1e-6).unwrap_err();
        match err {
            DispersionError::MassImbalance { relative, .. } => assert!((relative - 0.1).abs() < 1e-12),
            other => panic!("unexpected {other:?}"),
        }
        assert!(MassBudget::new(1).check(&[0.0], 1e-6).is_ok());
    }
}
