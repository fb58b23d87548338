// Grain Settlement - Core Library
// Document interpretation (CPE, settlements), quality pricing and
// cross-record validation. Exposed for the CLI and the integration tests.

pub mod text;       // Folding, Argentine numbers, dates, sections, fingerprints
pub mod entities;   // Grain catalogue, parties (CUIT)
pub mod error;      // Fatal quality-engine errors
pub mod rules;      // Per-grain rule sets - rules as data
pub mod moisture;   // Drying waste tables
pub mod quality;    // Quality calculation engine
pub mod cpe;        // Carta de Porte parser
pub mod settlement; // Settlement parser + price breakdown
pub mod validation; // Settlement validator

// Re-export commonly used types
pub use entities::{cuit_is_valid, GrainType, Party, PartyRole};
pub use error::QualityError;
pub use rules::{
    AnalysisField, Comparison, DiscountDefinition, DiscountShape, GrainRuleSet,
    RuleSetRegistry, SpecialBonus, Tier,
};
pub use moisture::{MoistureLossTable, MoistureRegistry};
pub use quality::{
    FactorComponent, MoistureLoss, QualityAnalysis, QualityCalculationEngine, QualityResult,
};
pub use cpe::{CpeParseResult, CpeParser, ParsedCpe, WeightSource, Weights};
pub use settlement::{
    AdjustmentSubtype, Ctg, Deduction, PriceBreakdown, Settlement, SettlementDocument,
    SettlementParser, SettlementType,
};
pub use validation::{
    Contract, PendingFinalStatus, SettlementValidator, Severity, ValidationContext,
    ValidationError, ValidationErrorType, ValidationResult, ValidatorConfig,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
