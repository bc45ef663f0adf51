// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Pure, side-effect-free indicator functions. Every public function returns
// `Option<f64>` so callers are forced to handle insufficient-data and
// numerical-edge-case scenarios.

pub mod ema;
pub mod rsi;
