//! Boundary-layer turbulence statistics after Hanna (1982)
//!
//! Velocity standard deviations σ and Lagrangian timescales τ per component,
//! plus the vertical gradient of σ_w needed by the drift correction.
//!
//! # Formulas
//!
//! ```text
//! Neutral (|h/L| ≤ 1):
//!   σu = 2.0 u* exp(−3 f z/u*)     σv = σw = 1.3 u* exp(−2 f z/u*)
//!   τu = τv = τw = 0.5 z / (σw (1 + 15 f z/u*))
//!
//! Unstable (h/L < −1):
//!   σu = σv = u* (12 − 0.5 h/L)^(1/3)
//!   σw = 0.96 w* (3z/h − L/h)^(1/3)            z/h < 0.03
//!        min(0.96 w* (3z/h − L/h)^(1/3),
//!            0.763 w* (z/h)^0.175)             z/h < 0.4
//!        0.722 w* (1 − z/h)^0.207              z/h < 0.96
//!        0.37 w*                               otherwise
//!   τu = τv = 0.15 h/σu
//!   τw = 0.1 z / (σw (0.55 − 0.38 |z/L|))      z < |L|
//!        0.59 z/σw                             z/h < 0.1
//!        0.15 h/σw (1 − exp(−5 z/h))           otherwise
//!
//! Stable (h/L > 1):
//!   σu = 2.0 u* (1 − z/h)   σv = σw = 1.3 u* (1 − z/h)
//!   τu = 0.15 h/σu (z/h)^0.5   τv = 0.467 τu   τw = 0.1 h/σw (z/h)^0.8
//! ```
//!
//! All σ are raised by 0.01 m/s; τu, τv ≥ 10 s and τw ≥ 30 s.
//!
//! # References
//!
//! - Hanna, S.R. (1982). "Applications in air pollution modeling." In
//!   Atmospheric Turbulence and Air Pollution Modelling, Reidel, 275-310.
//! - Stohl, A. et al. (2005). "Technical note: The Lagrangian particle dispersion
//!   model FLEXPART version 6.2." Atmos. Chem. Phys., 5, 2461-2474.

use super::Regime;
use crate::core_types::Vec3;
use crate::interpolation::BoundaryLayerProfile;

/// Smallest velocity standard deviation (m/s).
pub const MIN_SIGMA: f64 = 0.01;
/// Smallest horizontal Lagrangian timescale (s).
pub const MIN_TAU_HORIZONTAL: f64 = 10.0;
/// Smallest vertical Lagrangian timescale (s).
pub const MIN_TAU_VERTICAL: f64 = 30.0;

/// Smallest friction velocity used in the similarity formulas (m/s).
const MIN_USTAR: f64 = 1.0e-4;
/// Smallest mixing height used in the similarity formulas (m).
const MIN_MIXING_HEIGHT: f64 = 10.0;
/// Smallest convective velocity scale used in the unstable formulas (m/s).
const MIN_WSTAR: f64 = 1.0e-2;

/// Turbulence statistics at one height.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TurbulenceStats {
    pub regime: Regime,
    /// (σu, σv, σw) in m/s.
    pub sigma: Vec3,
    /// (τu, τv, τw) in s.
    pub tau: Vec3,
    /// ∂σw/∂z (1/s).
    pub dsigw_dz: f64,
}

impl TurbulenceStats {
    /// ∂σw²/∂z (m/s²).
    #[inline]
    pub fn dsigw2_dz(&self) -> f64 {
        2.0 * self.sigma.z * self.dsigw_dz
    }

    fn floored(mut self) -> Self {
        self.sigma = self.sigma.map(|s| if s.is_finite() { s.max(MIN_SIGMA) } else { MIN_SIGMA });
        let floor = |t: f64, min: f64| if t.is_finite() { t.max(min) } else { min };
        self.tau = Vec3::new(
            floor(self.tau.x, MIN_TAU_HORIZONTAL),
            floor(self.tau.y, MIN_TAU_HORIZONTAL),
            floor(self.tau.z, MIN_TAU_VERTICAL),
        );
        if !self.dsigw_dz.is_finite() {
            self.dsigw_dz = 0.0;
        }
        self
    }
}

/// Hanna statistics at height `z` inside the boundary layer of `profile`.
///
/// `regime` must be a boundary-layer regime; the free troposphere has no
/// similarity profile and yields neutral statistics here.
pub fn boundary_layer_stats(z: f64, regime: Regime, profile: &BoundaryLayerProfile) -> TurbulenceStats {
    let h = profile.mixing_height.max(MIN_MIXING_HEIGHT);
    let z = z.clamp(0.0, h);
    let zeta = (z / h).clamp(0.0, 1.0);
    let ustar = profile.friction_velocity.max(MIN_USTAR);
    let stats = match regime {
        Regime::Unstable => unstable(z, zeta, h, ustar, profile),
        Regime::Stable => stable(zeta, h, ustar),
        Regime::Neutral | Regime::FreeTroposphere => neutral(z, ustar, profile.coriolis),
    };
    TurbulenceStats { regime, ..stats }.floored()
}

fn neutral(z: f64, ustar: f64, coriolis: f64) -> TurbulenceStats {
    let corr = coriolis * z / ustar;
    let sigu = MIN_SIGMA + 2.0 * ustar * (-3.0 * corr).exp();
    let sigw_raw = 1.3 * ustar * (-2.0 * corr).exp();
    let dsigw_dz = -2.0 * coriolis / ustar * sigw_raw;
    let sigw = sigw_raw + MIN_SIGMA;
    let tl = 0.5 * z / sigw / (1.0 + 15.0 * corr);
    TurbulenceStats {
        regime: Regime::Neutral,
        sigma: Vec3::new(sigu, sigw, sigw),
        tau: Vec3::new(tl, tl, tl),
        dsigw_dz,
    }
}

fn unstable(z: f64, zeta: f64, h: f64, ustar: f64, profile: &BoundaryLayerProfile) -> TurbulenceStats {
    let wstar = profile.convective_velocity.max(MIN_WSTAR);
    // h/L < −1 here, so L/h lies in (−1, 0) and 3ζ − L/h > 0
    let ol = 1.0 / profile.inverse_obukhov;
    let h_over_l = h * profile.inverse_obukhov;
    let sigu = MIN_SIGMA + ustar * (12.0 - 0.5 * h_over_l).cbrt();

    let surface_arg = 3.0 * zeta - ol / h;
    let surface_sigma = 0.96 * surface_arg.cbrt();
    let surface_gradient = 0.96 * wstar / h * surface_arg.powf(-2.0 / 3.0);
    let (sigw_raw, dsigw_dz) = if zeta < 0.03 {
        (wstar * surface_sigma, surface_gradient)
    } else if zeta < 0.4 {
        let mixed = 0.763 * zeta.powf(0.175);
        if surface_sigma < mixed {
            (wstar * surface_sigma, surface_gradient)
        } else {
            (wstar * mixed, 0.175 * 0.763 * zeta.powf(-0.825) * wstar / h)
        }
    } else if zeta < 0.96 {
        (
            0.722 * wstar * (1.0 - zeta).powf(0.207),
            -0.207 * 0.722 * wstar / h * (1.0 - zeta).powf(-0.793),
        )
    } else {
        (0.37 * wstar, 0.0)
    };
    let sigw = sigw_raw + MIN_SIGMA;

    let tlu = 0.15 * h / sigu;
    let abs_l = ol.abs();
    let tlw = if z < abs_l {
        0.1 * z / (sigw * (0.55 - 0.38 * (z / abs_l)))
    } else if zeta < 0.1 {
        0.59 * z / sigw
    } else {
        0.15 * h / sigw * (1.0 - (-5.0 * zeta).exp())
    };
    TurbulenceStats {
        regime: Regime::Unstable,
        sigma: Vec3::new(sigu, sigu, sigw),
        tau: Vec3::new(tlu, tlu, tlw),
        dsigw_dz,
    }
}

fn stable(zeta: f64, h: f64, ustar: f64) -> TurbulenceStats {
    let sigu = MIN_SIGMA + 2.0 * ustar * (1.0 - zeta);
    let sigv = MIN_SIGMA + 1.3 * ustar * (1.0 - zeta);
    let sigw = sigv;
    let tlu = 0.15 * h / sigu * zeta.sqrt();
    let tlv = 0.467 * tlu;
    let tlw = 0.1 * h / sigw * zeta.powf(0.8);
    TurbulenceStats {
        regime: Regime::Stable,
        sigma: Vec3::new(sigu, sigv, sigw),
        tau: Vec3::new(tlu, tlv, tlw),
        dsigw_dz: -1.3 * ustar / h,
    }
}
