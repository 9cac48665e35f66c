pub mod devig;

pub use devig::{
    devig, expected_roi, expected_value, fair_odds, implied_probability, margin, DevigMethod,
    FairProbs,
};
