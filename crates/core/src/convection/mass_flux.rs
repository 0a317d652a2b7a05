//! Bulk convective mass-flux diagnosis for one column
//!
//! ```text
//! w_b       = max(w*, 1 m/s)                         cloud-base updraft velocity
//! w_u²(z)   = w_b² + 2 ∫_LFC^z B dz                   undilute updraft kinetic energy
//! M_u(z)    = M_b                                     LCL ≤ z ≤ LFC
//! M_u(z)    = ρ(z) a_u w_u(z)                         LFC ≤ z ≤ cloud top
//! M_u(z)    = M_b z / z_LCL                           sub-cloud entrainment
//! M_d       = 0.2 M_b                                 from mid-cloud to the sub-cloud layer
//! ```
//!
//! Boundary-layer thermals force the updraft through any inhibition between
//! the LCL and the LFC, so negative buoyancy there does not drain w_u².
//! The environment carries the compensating subsidence M_u − M_d. A column
//! is convective only when CAPE, cloud depth and cloud-base flux all exceed
//! their thresholds; anything weaker is treated as no convection.
//!
//! # References
//!
//! - Emanuel, K.A. (1991). "A scheme for representing cumulus convection in
//!   large-scale models." J. Atmos. Sci., 48, 2313-2335.
//! - Forster, C., Stohl, A. & Seibert, P. (2007). "Parameterization of convective
//!   transport in a Lagrangian particle dispersion model." J. Appl. Meteor.
//!   Climatol., 46, 403-422.

use super::parcel::{lift_parcel, Sounding};
use serde::{Deserialize, Serialize};

/// Tunables of the convection scheme.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvectionOptions {
    pub enabled: bool,
    /// Seconds between redistribution events.
    pub interval: f64,
    /// Fractional area of the updraft core.
    pub updraft_area: f64,
    /// Downdraft mass flux as a fraction of the cloud-base updraft flux.
    pub downdraft_ratio: f64,
    /// Smallest cloud-base updraft velocity (m/s).
    pub min_base_velocity: f64,
    /// CAPE below which a column is not convective (J/kg).
    pub min_cape: f64,
    /// Cloud depth below which a column is not convective (m).
    pub min_cloud_depth: f64,
    /// Cloud-base mass flux below which a column is not convective (kg m⁻² s⁻¹).
    pub min_base_mass_flux: f64,
    /// Largest fraction of a layer's mass leaving it in one event.
    pub max_outflow: f64,
}

impl Default for ConvectionOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: 900.0,
            updraft_area: 0.02,
            downdraft_ratio: 0.2,
            min_base_velocity: 1.0,
            min_cape: 10.0,
            min_cloud_depth: 500.0,
            min_base_mass_flux: 1.0e-6,
            max_outflow: 0.9,
        }
    }
}

impl ConvectionOptions {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        if !(self.interval.is_finite() && self.interval > 0.0) {
            return Err(format!("convection interval must be positive, got {}", self.interval));
        }
        if !(self.updraft_area > 0.0 && self.updraft_area < 1.0) {
            return Err(format!("updraft area must lie in (0, 1), got {}", self.updraft_area));
        }
        if !(0.0..1.0).contains(&self.downdraft_ratio) {
            return Err(format!("downdraft ratio must lie in [0, 1), got {}", self.downdraft_ratio));
        }
        if !(self.max_outflow > 0.0 && self.max_outflow <= 1.0) {
            return Err(format!("maximum outflow must lie in (0, 1], got {}", self.max_outflow));
        }
        Ok(())
    }
}

/// Diagnosed updraft/downdraft mass-flux profile of a convective column.
#[derive(Debug, Clone, PartialEq)]
pub struct MassFluxProfile {
    /// Cloud base, the parcel's LCL (m AGL).
    pub cloud_base: f64,
    /// Cloud top: neutral buoyancy or updraft exhaustion (m AGL).
    pub cloud_top: f64,
    /// Updraft mass flux at cloud base M_b (kg m⁻² s⁻¹).
    pub base_mass_flux: f64,
    /// CAPE of the surface parcel (J/kg).
    pub cape: f64,
    /// (height, M_u) samples from cloud base to cloud top.
    updraft: Vec<(f64, f64)>,
    /// Downdraft mass flux magnitude (kg m⁻² s⁻¹).
    downdraft: f64,
    /// Height where the downdraft originates (m AGL).
    downdraft_top: f64,
}

impl MassFluxProfile {
    /// Diagnose the mass fluxes of a column. `None` means no convection.
    pub fn diagnose(sounding: &Sounding, convective_velocity: f64, options: &ConvectionOptions) -> Option<Self> {
        let ascent = lift_parcel(sounding)?;
        let lfc = ascent.lfc?;
        if ascent.cape < options.min_cape {
            return None;
        }
        let densities: Vec<f64> = (0..sounding.len()).map(|k| sounding.density(k)).collect();
        let density_at = |z: f64| sounding.interpolate(&densities, z).max(1.0e-4);

        let base = ascent.lcl;
        let w_base = convective_velocity.max(options.min_base_velocity);
        let base_mass_flux = density_at(base) * options.updraft_area * w_base;

        let mut updraft = vec![(base, base_mass_flux)];
        let free = lfc.max(base);
        if free > base {
            updraft.push((free, base_mass_flux));
        }
        let mut w2 = w_base * w_base;
        let mut z_prev = free;
        let mut b_prev = ascent.buoyancy_at(sounding, free).max(0.0);
        let mut top = ascent.lnb;
        for &z in sounding.heights.iter().filter(|&&z| z > free) {
            let z_end = z.min(ascent.lnb);
            let b = ascent.buoyancy_at(sounding, z_end);
            let next = w2 + (b + b_prev) * (z_end - z_prev);
            if next <= 0.0 {
                // updraft runs out of kinetic energy inside the layer
                let slope = (next - w2) / (z_end - z_prev);
                top = z_prev - w2 / slope;
                break;
            }
            w2 = next;
            updraft.push((z_end, density_at(z_end) * options.updraft_area * w2.sqrt()));
            z_prev = z_end;
            b_prev = b;
            if z_end >= ascent.lnb {
                break;
            }
        }
        if updraft.last().is_some_and(|&(z, _)| z < top) {
            let m = updraft.last().map_or(0.0, |&(_, m)| m);
            updraft.push((top, m));
        }

        let depth = top - base;
        if depth < options.min_cloud_depth || base_mass_flux < options.min_base_mass_flux {
            return None;
        }
        Some(Self {
            cloud_base: base,
            cloud_top: top,
            base_mass_flux,
            cape: ascent.cape,
            updraft,
            downdraft: options.downdraft_ratio * base_mass_flux,
            downdraft_top: 0.5 * (base + top),
        })
    }

    /// Upward updraft mass flux at height `z` (kg m⁻² s⁻¹).
    pub fn updraft(&self, z: f64) -> f64 {
        if z <= 0.0 || z > self.cloud_top {
            return 0.0;
        }
        if z < self.cloud_base {
            return self.base_mass_flux * z / self.cloud_base;
        }
        let k = self.updraft.partition_point(|&(h, _)| h <= z);
        if k == 0 {
            return self.base_mass_flux;
        }
        if k >= self.updraft.len() {
            return self.updraft[self.updraft.len() - 1].1;
        }
        let (z0, m0) = self.updraft[k - 1];
        let (z1, m1) = self.updraft[k];
        if z1 > z0 {
            m0 + (m1 - m0) * (z - z0) / (z1 - z0)
        } else {
            m0
        }
    }

    /// Downward downdraft mass flux at height `z` (kg m⁻² s⁻¹).
    pub fn downdraft(&self, z: f64) -> f64 {
        if z <= 0.0 || z >= self.downdraft_top {
            return 0.0;
        }
        if z < self.cloud_base {
            return self.downdraft * z / self.cloud_base;
        }
        self.downdraft
    }
}

#[cfg(test)]
mod tests {
    use super::super::parcel::tests::{stable_sounding, tropical_sounding};
    use super::*;

    #[test]
    fn tropical_column_is_convective() {
        let profile = MassFluxProfile::diagnose(&tropical_sounding(), 1.5, &ConvectionOptions::default()).unwrap();
        assert!(profile.cloud_top - profile.cloud_base >= 500.0);
        assert!(profile.base_mass_flux > 0.01, "M_b = {}", profile.base_mass_flux);
        // sub-cloud entrainment increases linearly from the ground
        let half = profile.updraft(0.5 * profile.cloud_base);
        assert!((half - 0.5 * profile.base_mass_flux).abs() < 1e-12);
        assert_eq!(profile.updraft(profile.cloud_top + 1.0), 0.0);
        assert_eq!(profile.downdraft(profile.cloud_top - 1.0), 0.0);
        assert!(profile.downdraft(profile.cloud_base + 1.0) > 0.0);
    }

    #[test]
    fn stable_column_is_not_convective() {
        assert!(MassFluxProfile::diagnose(&stable_sounding(), 0.0, &ConvectionOptions::default()).is_none());
    }

    #[test]
    fn thresholds_suppress_weak_convection() {
        let options = ConvectionOptions {
            min_cape: 1.0e6,
            ..ConvectionOptions::default()
        };
        assert!(MassFluxProfile::diagnose(&tropical_sounding(), 1.5, &options).is_none());
    }

    #[test]
    fn weak_thermals_cross_the_inhibition_layer() {
        let sounding = tropical_sounding();
        let ascent = lift_parcel(&sounding).unwrap();
        let lfc = ascent.lfc.unwrap();
        assert!(lfc > ascent.lcl, "lcl {} lfc {}", ascent.lcl, lfc);
        let options = ConvectionOptions::default();
        let profile = MassFluxProfile::diagnose(&sounding, 1.0, &options).unwrap();
        assert_eq!(profile.cloud_base, ascent.lcl);
        assert!((profile.cloud_top - ascent.lnb).abs() < 1e-9, "top {} lnb {}", profile.cloud_top, ascent.lnb);
        // flux is carried unchanged from the LCL to the LFC
        let mid = 0.5 * (ascent.lcl + lfc);
        assert_eq!(profile.updraft(mid), profile.base_mass_flux);
        assert!(profile.updraft(0.5 * (lfc + ascent.lnb)) > 0.0);
    }

    #[test]
    fn calm_boundary_layer_uses_the_velocity_floor() {
        let options = ConvectionOptions::default();
        let calm = MassFluxProfile::diagnose(&tropical_sounding(), 0.0, &options).unwrap();
        let floor = MassFluxProfile::diagnose(&tropical_sounding(), options.min_base_velocity, &options).unwrap();
        assert_eq!(calm, floor);
    }

    #[test]
    fn near_zero_base_flux_is_not_convective() {
        let sounding = tropical_sounding();
        let tiny_area = ConvectionOptions {
            updraft_area: 1.0e-9,
            ..ConvectionOptions::default()
        };
        assert!(MassFluxProfile::diagnose(&sounding, 1.5, &tiny_area).is_none());
        let strict_flux = ConvectionOptions {
            min_base_mass_flux: 1.0,
            ..ConvectionOptions::default()
        };
        assert!(MassFluxProfile::diagnose(&sounding, 1.5, &strict_flux).is_none());
        assert!(MassFluxProfile::diagnose(&sounding, 1.5, &ConvectionOptions::default()).is_some());
    }

    #[test]
    fn shallow_cloud_is_not_convective() {
        let sounding = tropical_sounding();
        let depth = lift_parcel(&sounding).unwrap().cloud_depth();
        let just_deeper = ConvectionOptions {
            min_cloud_depth: depth + 1.0,
            ..ConvectionOptions::default()
        };
        assert!(MassFluxProfile::diagnose(&sounding, 1.5, &just_deeper).is_none());
        let just_shallower = ConvectionOptions {
            min_cloud_depth: depth - 1.0,
            ..ConvectionOptions::default()
        };
        assert!(MassFluxProfile::diagnose(&sounding, 1.5, &just_shallower).is_some());
    }
}
