//! Slater exchange, the uniform electron gas exchange for a closed-shell density.
//!
//!   eps = Cx ρ^(1/3),  vrho = 4/3 Cx ρ^(1/3),  Cx = -3/4 (3/π)^(1/3)
//!
//! The polarized form follows from spin scaling, E[ρ↑, ρ↓] = ½ E[2ρ↑] + ½ E[2ρ↓].

use crate::traits::{check_len, check_polarized_len};
use crate::{XcError, XcFamily, XcFunctional};

use itertools::multizip;
use xwconsts::*;

const T13: f64 = 1.0 / 3.0;
const F43: f64 = 4.0 / 3.0;

pub(crate) fn slater_cx() -> f64 {
    -0.75 * (3.0 / PI).powf(T13)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SlaterExchange;

impl SlaterExchange {
    pub fn new() -> SlaterExchange {
        SlaterExchange
    }
}

impl XcFunctional for SlaterExchange {
    fn family(&self) -> XcFamily {
        XcFamily::Lda
    }

    fn name(&self) -> &str {
        "slater"
    }

    fn eval_exc_vxc_lda(&self, rho: &[f64], eps: &mut [f64], vrho: &mut [f64]) -> Result<(), XcError> {
        check_len(rho.len(), eps.len())?;
        check_len(rho.len(), vrho.len())?;

        let cx = slater_cx();

        for (r, e, v) in multizip((rho.iter(), eps.iter_mut(), vrho.iter_mut())) {
            if *r <= RHO_THRESHOLD {
                *e = 0.0;
                *v = 0.0;
                continue;
            }

            let r13 = r.powf(T13);

            *e = cx * r13;
            *v = F43 * cx * r13;
        }

        Ok(())
    }

    fn eval_exc_vxc_lda_polarized(
        &self,
        rho: &[f64],
        eps: &mut [f64],
        vrho: &mut [f64],
    ) -> Result<(), XcError> {
        let n = eps.len();
        check_polarized_len(n, rho.len(), eps.len(), vrho.len())?;

        // unpolarized evaluation at 2ρ_s for each channel
        let rho2: Vec<f64> = rho.iter().map(|r| 2.0 * r).collect();
        let mut eps2 = vec![0.0; 2 * n];
        self.eval_exc_vxc_lda(&rho2, &mut eps2, vrho)?;

        for (i, e) in eps.iter_mut().enumerate() {
            let (ra, rb) = (rho[2 * i], rho[2 * i + 1]);
            let total = ra + rb;

            *e = if total > RHO_THRESHOLD {
                (ra * eps2[2 * i] + rb * eps2[2 * i + 1]) / total
            } else {
                0.0
            };
        }

        Ok(())
    }
}
