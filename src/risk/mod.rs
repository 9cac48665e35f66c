pub mod governor;
pub mod kelly;

pub use governor::RiskGovernor;
pub use kelly::{compute_kelly, KellyDecision, KellyInputs};
