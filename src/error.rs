// ❌ Fatal errors of the quality engine
// Field-level problems are warnings, never errors: see cpe.rs / settlement.rs

use crate::entities::GrainType;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum QualityError {
    #[error("Unknown product: {0}")]
    UnknownProduct(String),

    #[error("No rule set configured for {0}")]
    MissingRuleSet(GrainType),

    #[error("No moisture loss table configured for {0}")]
    MissingMoistureTable(GrainType),

    #[error("Invalid quantity: {0} kg")]
    InvalidQuantity(f64),
}
