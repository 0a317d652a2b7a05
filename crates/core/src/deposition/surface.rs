//! Gas surface resistance by land-use class
//!
//! ```text
//! r_c  = [1/(r_s + r_m) + 1/r_lu + 1/(r_dc + r_cl) + 1/(r_ac + r_gs)]⁻¹
//! r_s  = r_i (1 + (200/(G + 0.1))²) (400 / (T_s (40 − T_s))) · D_H2O/D_x
//! r_m  = 1 / (H*/3000 + 100 f₀)
//! r_lu = r_lu,0 / (10⁻⁵ H* + f₀)
//! r_dc = 100 (1 + 1000/(G + 10))
//! r_cl = [10⁻⁵ H*/r_cl,S + f₀/r_cl,O]⁻¹
//! r_gs = [10⁻⁵ H*/r_gs,S + f₀/r_gs,O]⁻¹
//! ```
//!
//! H* is the effective Henry's law constant (M/atm), f₀ the reactivity
//! factor, G the global radiation (W/m²) and T_s the surface temperature
//! (°C). Stomata are closed outside 0 < T_s < 40 °C. Below −2 °C the
//! cuticle, lower canopy and ground resistances grow by 1000·exp(−T_s − 4).
//! Table values are the midsummer set; an infinite entry means no uptake
//! along that path.
//!
//! # References
//!
//! - Wesely, M.L. (1989). "Parameterization of surface resistances to gaseous
//!   dry deposition in regional-scale numerical models." Atmos. Environ., 23,
//!   1293-1304.

use crate::core_types::GasReactivity;
use crate::met::LandUseClass;

const INF: f64 = f64::INFINITY;

/// Floor of a tabulated uptake path (s/m); zero table entries mean near-free uptake.
const MIN_PATH_RESISTANCE: f64 = 1.0;

/// Midsummer resistances (s/m) of one land-use class.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassResistances {
    /// Minimum bulk stomatal resistance r_i.
    pub stomatal: f64,
    /// Upper-canopy cuticle resistance r_lu.
    pub cuticle: f64,
    /// In-canopy aerodynamic resistance r_ac.
    pub canopy: f64,
    /// Ground resistance for SO₂ and O₃.
    pub ground_so2: f64,
    pub ground_o3: f64,
    /// Lower-canopy resistance for SO₂ and O₃.
    pub lower_canopy_so2: f64,
    pub lower_canopy_o3: f64,
}

impl ClassResistances {
    pub fn of(class: LandUseClass) -> Self {
        let r = |stomatal, cuticle, canopy, ground_so2, ground_o3, lower_canopy_so2, lower_canopy_o3| Self {
            stomatal,
            cuticle,
            canopy,
            ground_so2,
            ground_o3,
            lower_canopy_so2,
            lower_canopy_o3,
        };
        match class {
            LandUseClass::Urban => r(INF, INF, 100.0, 400.0, 300.0, INF, INF),
            LandUseClass::Agricultural => r(60.0, 2000.0, 200.0, 150.0, 150.0, 2000.0, 1000.0),
            LandUseClass::Range => r(120.0, 2000.0, 100.0, 350.0, 200.0, 2000.0, 1000.0),
            LandUseClass::DeciduousForest => r(70.0, 2000.0, 2000.0, 500.0, 200.0, 2000.0, 1000.0),
            LandUseClass::ConiferousForest => r(130.0, 2000.0, 2000.0, 500.0, 200.0, 2000.0, 1000.0),
            LandUseClass::MixedForest => r(100.0, 2000.0, 2000.0, 100.0, 300.0, 2000.0, 1000.0),
            LandUseClass::Water => r(INF, INF, 0.0, 0.0, 2000.0, INF, INF),
            LandUseClass::Barren => r(INF, INF, 0.0, 1000.0, 400.0, INF, INF),
            LandUseClass::Wetland => r(80.0, 2500.0, 300.0, 0.0, 1000.0, 2500.0, 1000.0),
            LandUseClass::AgriculturalRange => r(100.0, 2000.0, 150.0, 220.0, 180.0, 2000.0, 1000.0),
            LandUseClass::RockyShrubland => r(150.0, 4000.0, 200.0, 400.0, 200.0, 4000.0, 1000.0),
        }
    }
}

/// `weight / resistance` with zero weight contributing nothing.
#[inline]
fn conductance(weight: f64, resistance: f64) -> f64 {
    if weight <= 0.0 {
        0.0
    } else {
        weight / resistance.max(MIN_PATH_RESISTANCE)
    }
}

/// Resistance of parallel paths given their conductances.
#[inline]
fn parallel(conductances: &[f64]) -> f64 {
    let total: f64 = conductances.iter().sum();
    if total > 0.0 {
        1.0 / total
    } else {
        INF
    }
}

/// Bulk surface resistance r_c (s/m) of a gas over one land-use class.
pub fn gas_surface_resistance(
    class: LandUseClass,
    gas: &GasReactivity,
    diffusivity_ratio: f64,
    surface_temperature: f64,
    radiation: f64,
) -> f64 {
    let table = ClassResistances::of(class);
    let t = surface_temperature - 273.15;
    let h = gas.henry;
    let f0 = gas.reactivity;
    let cold = if t < -2.0 { 1000.0 * (-t - 4.0).exp() } else { 0.0 };

    let stomatal = if t > 0.0 && t < 40.0 {
        let light = 1.0 + (200.0 / (radiation.max(0.0) + 0.1)).powi(2);
        table.stomatal * light * (400.0 / (t * (40.0 - t))) * diffusivity_ratio
    } else {
        INF
    };
    let mesophyll = parallel(&[h / 3000.0, 100.0 * f0]);
    let cuticle = table.cuticle / (1.0e-5 * h + f0) + cold;
    let convection = 100.0 * (1.0 + 1000.0 / (radiation.max(0.0) + 10.0));
    let lower_canopy = parallel(&[
        conductance(1.0e-5 * h, table.lower_canopy_so2),
        conductance(f0, table.lower_canopy_o3),
    ]) + cold;
    let ground = parallel(&[conductance(1.0e-5 * h, table.ground_so2), conductance(f0, table.ground_o3)]) + cold;

    parallel(&[
        1.0 / (stomatal + mesophyll),
        1.0 / cuticle,
        1.0 / (convection + lower_canopy),
        1.0 / (table.canopy + ground),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    const SO2: GasReactivity = GasReactivity {
        henry: 1.0e5,
        reactivity: 0.0,
    };
    const O3: GasReactivity = GasReactivity {
        henry: 0.01,
        reactivity: 1.0,
    };

    #[test]
    fn soluble_gas_deposits_freely_to_water() {
        let rc = gas_surface_resistance(LandUseClass::Water, &SO2, 1.9, 293.0, 400.0);
        assert!(rc < 5.0, "{rc}");
        // ozone is barely taken up by water
        let o3 = gas_surface_resistance(LandUseClass::Water, &O3, 1.6, 293.0, 400.0);
        assert!(o3 > 1000.0, "{o3}");
    }

    #[test]
    fn vegetation_uptake_follows_light_and_temperature() {
        let day = gas_surface_resistance(LandUseClass::DeciduousForest, &O3, 1.6, 293.0, 600.0);
        let night = gas_surface_resistance(LandUseClass::DeciduousForest, &O3, 1.6, 293.0, 0.0);
        let frost = gas_surface_resistance(LandUseClass::DeciduousForest, &O3, 1.6, 263.0, 600.0);
        assert!(day > 50.0 && day < 500.0, "{day}");
        assert!(night > day);
        assert!(frost > day);
    }

    #[test]
    fn inert_gas_never_deposits() {
        let inert = GasReactivity {
            henry: 0.0,
            reactivity: 0.0,
        };
        for class in LandUseClass::ALL {
            let rc = gas_surface_resistance(class, &inert, 1.0, 293.0, 400.0);
            assert!(rc > 1.0e3 || rc.is_infinite(), "{class:?}: {rc}");
        }
    }
}
