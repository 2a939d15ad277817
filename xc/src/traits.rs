use crate::XcError;

/// Family of an XC functional. Determines which evaluation entry point is valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XcFamily {
    Lda,
    Gga,
    MetaGga,
}

/// Point-batch functional evaluation.
///
/// `eps` is the energy per particle, `vrho` = dE/dρ and `vgamma` = dE/dγ with
/// γ = |∇ρ|². All outputs are overwritten.
///
/// The polarized entry points interleave spin channels per point:
/// `rho` and `vrho` hold `[ρ↑, ρ↓]`, `sigma` and `vsigma` hold
/// `[σ↑↑, σ↑↓, σ↓↓]` with σ_ab = ∇ρ_a·∇ρ_b. `eps` is per particle of ρ↑ + ρ↓.
pub trait XcFunctional: Send + Sync {
    fn family(&self) -> XcFamily;

    fn name(&self) -> &str;

    fn eval_exc_vxc_lda(
        &self,
        _rho: &[f64],
        _eps: &mut [f64],
        _vrho: &mut [f64],
    ) -> Result<(), XcError> {
        Err(XcError::FamilyMismatch {
            name: self.name().to_string(),
            family: self.family(),
            requested: XcFamily::Lda,
        })
    }

    fn eval_exc_vxc_gga(
        &self,
        _rho: &[f64],
        _gamma: &[f64],
        _eps: &mut [f64],
        _vrho: &mut [f64],
        _vgamma: &mut [f64],
    ) -> Result<(), XcError> {
        Err(XcError::FamilyMismatch {
            name: self.name().to_string(),
            family: self.family(),
            requested: XcFamily::Gga,
        })
    }

    fn eval_exc_vxc_lda_polarized(
        &self,
        _rho: &[f64],
        _eps: &mut [f64],
        _vrho: &mut [f64],
    ) -> Result<(), XcError> {
        Err(self.polarized_unavailable(XcFamily::Lda))
    }

    fn eval_exc_vxc_gga_polarized(
        &self,
        _rho: &[f64],
        _sigma: &[f64],
        _eps: &mut [f64],
        _vrho: &mut [f64],
        _vsigma: &mut [f64],
    ) -> Result<(), XcError> {
        Err(self.polarized_unavailable(XcFamily::Gga))
    }

    fn polarized_unavailable(&self, requested: XcFamily) -> XcError {
        if self.family() != requested {
            XcError::FamilyMismatch {
                name: self.name().to_string(),
                family: self.family(),
                requested,
            }
        } else {
            XcError::Unpolarized(self.name().to_string())
        }
    }

    fn is_lda(&self) -> bool {
        self.family() == XcFamily::Lda
    }

    fn is_gga(&self) -> bool {
        self.family() == XcFamily::Gga
    }
}

/// Checks the interleaved lengths of a polarized batch of `n` points.
pub(crate) fn check_polarized_len(n: usize, rho: usize, eps: usize, vrho: usize) -> Result<(), XcError> {
    check_len(2 * n, rho)?;
    check_len(n, eps)?;
    check_len(2 * n, vrho)
}

pub(crate) fn check_len(expected: usize, found: usize) -> Result<(), XcError> {
    if expected != found {
        return Err(XcError::LengthMismatch { expected, found });
    }

    Ok(())
}
