//! Exchange-correlation functional interface consumed by the integrator,
//! together with two reference exchange functionals (Slater LDA, PBE GGA).

mod error;
pub use error::XcError;

mod traits;
pub use traits::*;

mod slater;
pub use slater::SlaterExchange;

mod pbe;
pub use pbe::PbeExchange;

pub fn new(xc_scheme: &str) -> Result<Box<dyn XcFunctional>, XcError> {
    let xc: Box<dyn XcFunctional> = match xc_scheme.to_lowercase().as_str() {
        "slater" | "lda" => Box::new(SlaterExchange::new()),

        "pbe" | "pbe_x" => Box::new(PbeExchange::new()),

        _ => return Err(XcError::UnknownScheme(xc_scheme.to_string())),
    };

    Ok(xc)
}
