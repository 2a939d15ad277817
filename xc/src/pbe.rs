//! PBE exchange for a closed-shell density.
//!
//! Enhancement factor F(s) = 1 + κ - κ / (1 + μ s² / κ) applied to Slater
//! exchange, with s² = γ / (4 (3π²)^(2/3) ρ^(8/3)).
//!
//! Exchange is spin-separable, so the polarized form evaluates each channel
//! at (2ρ_s, 4σ_ss) and carries no σ↑↓ dependence.

use crate::slater::slater_cx;
use crate::traits::{check_len, check_polarized_len};
use crate::{XcError, XcFamily, XcFunctional};

use itertools::multizip;
use xwconsts::*;

const KAPPA: f64 = 0.804;
const MU: f64 = 0.219_514_972_764_517_1;

const T13: f64 = 1.0 / 3.0;
const F43: f64 = 4.0 / 3.0;
const F83: f64 = 8.0 / 3.0;

#[derive(Debug, Clone, Copy)]
pub struct PbeExchange {
    kappa: f64,
    mu: f64,
}

impl Default for PbeExchange {
    fn default() -> Self {
        PbeExchange::new()
    }
}

impl PbeExchange {
    pub fn new() -> PbeExchange {
        PbeExchange { kappa: KAPPA, mu: MU }
    }

    pub fn get_kappa(&self) -> f64 {
        self.kappa
    }

    pub fn get_mu(&self) -> f64 {
        self.mu
    }

    /// Returns (F, dF/ds²).
    fn enhancement(&self, s2: f64) -> (f64, f64) {
        let denom = 1.0 + self.mu * s2 / self.kappa;

        let f = 1.0 + self.kappa - self.kappa / denom;
        let df = self.mu / (denom * denom);

        (f, df)
    }
}

impl XcFunctional for PbeExchange {
    fn family(&self) -> XcFamily {
        XcFamily::Gga
    }

    fn name(&self) -> &str {
        "pbe"
    }

    fn eval_exc_vxc_gga(
        &self,
        rho: &[f64],
        gamma: &[f64],
        eps: &mut [f64],
        vrho: &mut [f64],
        vgamma: &mut [f64],
    ) -> Result<(), XcError> {
        let n = rho.len();
        check_len(n, gamma.len())?;
        check_len(n, eps.len())?;
        check_len(n, vrho.len())?;
        check_len(n, vgamma.len())?;

        let cx = slater_cx();
        let s2_fac = 1.0 / (4.0 * (3.0 * PI * PI).powf(2.0 * T13));

        for (r, g, e, vr, vg) in multizip((
            rho.iter(),
            gamma.iter(),
            eps.iter_mut(),
            vrho.iter_mut(),
            vgamma.iter_mut(),
        )) {
            if *r <= RHO_THRESHOLD {
                *e = 0.0;
                *vr = 0.0;
                *vg = 0.0;
                continue;
            }

            let r13 = r.powf(T13);
            let r43 = r * r13;
            let r83 = r43 * r43;

            let s2_per_gamma = s2_fac / r83;
            let s2 = g.max(0.0) * s2_per_gamma;

            let (f, df) = self.enhancement(s2);

            *e = cx * r13 * f;
            *vr = F43 * cx * r13 * f - F83 * cx * r13 * s2 * df;
            *vg = cx * r43 * df * s2_per_gamma;
        }

        Ok(())
    }

    fn eval_exc_vxc_gga_polarized(
        &self,
        rho: &[f64],
        sigma: &[f64],
        eps: &mut [f64],
        vrho: &mut [f64],
        vsigma: &mut [f64],
    ) -> Result<(), XcError> {
        let n = eps.len();
        check_polarized_len(n, rho.len(), eps.len(), vrho.len())?;
        check_len(3 * n, sigma.len())?;
        check_len(3 * n, vsigma.len())?;

        let rho2: Vec<f64> = rho.iter().map(|r| 2.0 * r).collect();
        let mut gamma2 = vec![0.0; 2 * n];
        for i in 0..n {
            gamma2[2 * i] = 4.0 * sigma[3 * i];
            gamma2[2 * i + 1] = 4.0 * sigma[3 * i + 2];
        }

        let mut eps2 = vec![0.0; 2 * n];
        let mut vgamma2 = vec![0.0; 2 * n];
        self.eval_exc_vxc_gga(&rho2, &gamma2, &mut eps2, vrho, &mut vgamma2)?;

        for (i, e) in eps.iter_mut().enumerate() {
            let (ra, rb) = (rho[2 * i], rho[2 * i + 1]);
            let total = ra + rb;

            *e = if total > RHO_THRESHOLD {
                (ra * eps2[2 * i] + rb * eps2[2 * i + 1]) / total
            } else {
                0.0
            };

            // d/dσ_ss of ½ e(2ρ_s, 4σ_ss)
            vsigma[3 * i] = 2.0 * vgamma2[2 * i];
            vsigma[3 * i + 1] = 0.0;
            vsigma[3 * i + 2] = 2.0 * vgamma2[2 * i + 1];
        }

        Ok(())
    }
}
