// 🏷️ Grain Rule Sets - Rules as Data
// One GrainRuleSet per product: grades, bonuses, discounts, out-of-standard.
// Grain-specific behaviour is configuration here, not code branches in the
// engine. Only the discount SHAPES are code (see DiscountShape).

use crate::entities::GrainType;
use anyhow::{anyhow, bail, ensure, Context as AnyhowContext, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

// ============================================================================
// VOCABULARY
// ============================================================================

/// Measured fields of a lab analysis that rules can refer to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisField {
    Humidity,
    ForeignMatter,
    DamagedGrains,
    BrokenGrains,
    GreenGrains,
    BlackGrains,
    HectoliterWeight,
    Protein,
    FatContent,
    Acidity,
    PanzaBlanca,
    LiveInsects,
}

impl AnalysisField {
    pub fn name(&self) -> &'static str {
        match self {
            AnalysisField::Humidity => "humidity",
            AnalysisField::ForeignMatter => "foreign_matter",
            AnalysisField::DamagedGrains => "damaged_grains",
            AnalysisField::BrokenGrains => "broken_grains",
            AnalysisField::GreenGrains => "green_grains",
            AnalysisField::BlackGrains => "black_grains",
            AnalysisField::HectoliterWeight => "hectoliter_weight",
            AnalysisField::Protein => "protein",
            AnalysisField::FatContent => "fat_content",
            AnalysisField::Acidity => "acidity",
            AnalysisField::PanzaBlanca => "panza_blanca",
            AnalysisField::LiveInsects => "live_insects",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparison {
    pub fn holds(&self, value: f64, threshold: f64) -> bool {
        match self {
            Comparison::Lt => value < threshold,
            Comparison::Le => value <= threshold,
            Comparison::Gt => value > threshold,
            Comparison::Ge => value >= threshold,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Comparison::Lt => "<",
            Comparison::Le => "<=",
            Comparison::Gt => ">",
            Comparison::Ge => ">=",
        }
    }
}

// ============================================================================
// GRADES
// ============================================================================

/// "value <comparison> limit → grade"
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeBand {
    pub grade: u8,
    pub comparison: Comparison,
    pub limit: f64,
}

/// Ordered bands for one field, best grade first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeThreshold {
    pub field: AnalysisField,
    pub bands: Vec<GradeBand>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeAdjustment {
    pub grade: u8,
    /// Signed: G1 positive, G2 zero, G3 negative
    pub percent: f64,
}

// ============================================================================
// SPECIAL BONUSES
// ============================================================================

/// [min, max) slice with its own factor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tier {
    pub min: f64,
    pub max: f64,
    pub factor: f64,
}

/// "value >= min → bonus"
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdBonus {
    pub min: f64,
    pub bonus: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SpecialBonus {
    /// Wheat: (protein − base) × factor when protein ≥ base AND hectoliter
    /// weight ≥ gate; progressive penalty tiers below base.
    Protein {
        base: f64,
        factor: f64,
        hectoliter_gate: f64,
        penalty_tiers: Vec<Tier>,
    },
    /// Sunflower: (fat − base) × factor, both directions, no gate
    FatContent { base: f64, factor: f64 },
    /// Maize/sorghum: first band the weight reaches, bands in descending order
    HectoliterWeight { bands: Vec<ThresholdBonus> },
}

impl SpecialBonus {
    pub fn field(&self) -> AnalysisField {
        match self {
            SpecialBonus::Protein { .. } => AnalysisField::Protein,
            SpecialBonus::FatContent { .. } => AnalysisField::FatContent,
            SpecialBonus::HectoliterWeight { .. } => AnalysisField::HectoliterWeight,
        }
    }
}

// ============================================================================
// DISCOUNTS
// ============================================================================

/// The closed set of discount shapes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DiscountShape {
    /// max(0, value − base) × factor
    Proportional { base: f64, factor: f64 },
    /// Same arithmetic as Proportional; `ceiling` is the declared tolerance
    /// limit of the scale and is not enforced.
    LinearScale { base: f64, factor: f64, ceiling: f64 },
    /// Σ max(0, min(value, tier.max) − tier.min) × tier.factor
    ProgressiveTiered { base: f64, tiers: Vec<Tier> },
    /// Sunflower acidity: base depends on the month of the analysis;
    /// above `rejection_threshold` the lot is rejected instead of discounted.
    SeasonalAcidity {
        early_season_base: f64,
        late_season_base: f64,
        early_season_last_month: u32,
        factor: f64,
        rejection_threshold: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscountDefinition {
    pub field: AnalysisField,
    /// Human-readable concept ("Materias extrañas")
    pub concept: String,
    pub shape: DiscountShape,
}

// ============================================================================
// OUT OF STANDARD
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutOfStandardCondition {
    pub field: AnalysisField,
    pub comparison: Comparison,
    pub threshold: f64,
    pub description: String,
}

// ============================================================================
// GRAIN RULE SET
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrainRuleSet {
    pub grain: GrainType,

    /// Soy and sunflower trade without grades
    pub has_grades: bool,

    #[serde(default)]
    pub grade_thresholds: Vec<GradeThreshold>,

    #[serde(default)]
    pub grade_adjustments: Vec<GradeAdjustment>,

    #[serde(default)]
    pub special_bonuses: Vec<SpecialBonus>,

    #[serde(default)]
    pub discounts: Vec<DiscountDefinition>,

    /// Receiving base humidity (%); above it the lot is dried
    pub base_humidity: f64,

    #[serde(default)]
    pub out_of_standard: Vec<OutOfStandardCondition>,
}

impl GrainRuleSet {
    /// Highest grade number any band can assign (the default when a value
    /// satisfies no band)
    pub fn worst_grade(&self) -> Option<u8> {
        self.grade_thresholds
            .iter()
            .flat_map(|t| t.bands.iter().map(|b| b.grade))
            .max()
    }

    /// Signed adjustment for a grade; grades without an entry adjust by 0
    pub fn grade_adjustment(&self, grade: u8) -> f64 {
        self.grade_adjustments
            .iter()
            .find(|a| a.grade == grade)
            .map(|a| a.percent)
            .unwrap_or(0.0)
    }

    /// Check internal consistency of the rule set
    pub fn validate(&self) -> Result<()> {
        let grain = self.grain.name();

        ensure!(
            self.base_humidity > 0.0 && self.base_humidity < 100.0,
            "{}: base humidity out of range: {}",
            grain,
            self.base_humidity
        );

        if self.has_grades {
            ensure!(
                !self.grade_thresholds.is_empty(),
                "{}: grades apply but no grade thresholds configured",
                grain
            );
        }

        for threshold in &self.grade_thresholds {
            ensure!(
                !threshold.bands.is_empty(),
                "{}: no bands for {}",
                grain,
                threshold.field.name()
            );
            let ordered = threshold.bands.windows(2).all(|w| w[0].grade < w[1].grade);
            ensure!(
                ordered,
                "{}: bands for {} must be ordered best grade first",
                grain,
                threshold.field.name()
            );
        }

        for discount in &self.discounts {
            validate_shape(grain, discount)?;
        }

        for bonus in &self.special_bonuses {
            if let SpecialBonus::Protein { penalty_tiers, .. } = bonus {
                validate_tiers(grain, "protein penalty", penalty_tiers)?;
            }
            if let SpecialBonus::HectoliterWeight { bands } = bonus {
                let descending = bands.windows(2).all(|w| w[0].min > w[1].min);
                ensure!(
                    descending,
                    "{}: hectoliter weight bonus bands must be in descending order",
                    grain
                );
            }
        }

        Ok(())
    }
}

fn validate_shape(grain: &str, discount: &DiscountDefinition) -> Result<()> {
    match &discount.shape {
        DiscountShape::Proportional { factor, .. } | DiscountShape::LinearScale { factor, .. } => {
            ensure!(
                *factor >= 0.0,
                "{}: negative factor for {}",
                grain,
                discount.concept
            );
        }
        DiscountShape::ProgressiveTiered { base, tiers } => {
            validate_tiers(grain, &discount.concept, tiers)?;
            ensure!(
                tiers.windows(2).all(|w| w[0].max <= w[1].min),
                "{}: tiers of {} must be in ascending order",
                grain,
                discount.concept
            );
            let first = tiers
                .first()
                .ok_or_else(|| anyhow!("{}: no tiers for {}", grain, discount.concept))?;
            ensure!(
                (first.min - base).abs() < f64::EPSILON,
                "{}: first tier of {} must start at base {}",
                grain,
                discount.concept,
                base
            );
        }
        DiscountShape::SeasonalAcidity {
            early_season_last_month,
            ..
        } => {
            ensure!(
                (1..=12).contains(early_season_last_month),
                "{}: invalid month {} for {}",
                grain,
                early_season_last_month,
                discount.concept
            );
        }
    }
    Ok(())
}

/// Tiers must be non-empty, ordered and contiguous
fn validate_tiers(grain: &str, concept: &str, tiers: &[Tier]) -> Result<()> {
    if tiers.is_empty() {
        bail!("{}: no tiers for {}", grain, concept);
    }
    for tier in tiers {
        ensure!(
            tier.min < tier.max,
            "{}: empty tier [{}, {}] in {}",
            grain,
            tier.min,
            tier.max,
            concept
        );
    }
    for pair in tiers.windows(2) {
        let (lower, upper) = (&pair[0], &pair[1]);
        let contiguous = (lower.max - upper.min).abs() < f64::EPSILON
            || (upper.max - lower.min).abs() < f64::EPSILON;
        ensure!(
            contiguous,
            "{}: tiers of {} are not contiguous ([{}, {}] then [{}, {}])",
            grain,
            concept,
            lower.min,
            lower.max,
            upper.min,
            upper.max
        );
    }
    let ascending = tiers.windows(2).all(|w| w[0].max <= w[1].min);
    let descending = tiers.windows(2).all(|w| w[0].min >= w[1].max);
    ensure!(
        ascending || descending,
        "{}: tiers of {} are not ordered",
        grain,
        concept
    );
    Ok(())
}

// ============================================================================
// RULE SET REGISTRY
// ============================================================================

/// Read-only catalogue of rule sets, built once at startup
#[derive(Debug, Clone, Default)]
pub struct RuleSetRegistry {
    rule_sets: HashMap<GrainType, GrainRuleSet>,
}

impl RuleSetRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        RuleSetRegistry {
            rule_sets: HashMap::new(),
        }
    }

    /// Registry with the built-in rule sets
    pub fn with_defaults() -> Self {
        let rule_sets = default_rule_sets()
            .into_iter()
            .map(|r| (r.grain, r))
            .collect();
        RuleSetRegistry { rule_sets }
    }

    /// Load rule sets from a JSON array file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read rule set file: {:?}", path.as_ref()))?;

        let rule_sets: Vec<GrainRuleSet> =
            serde_json::from_str(&content).context("Failed to parse rule set JSON")?;

        let registry = RuleSetRegistry::from_rule_sets(rule_sets)?;
        tracing::info!(
            count = registry.count(),
            path = %path.as_ref().display(),
            "loaded grain rule sets"
        );
        Ok(registry)
    }

    /// Build from explicit rule sets, validating each one
    pub fn from_rule_sets(rule_sets: Vec<GrainRuleSet>) -> Result<Self> {
        let mut registry = RuleSetRegistry::new();
        for rule_set in rule_sets {
            registry.insert(rule_set)?;
        }
        Ok(registry)
    }

    /// Add or replace the rule set of a grain
    pub fn insert(&mut self, rule_set: GrainRuleSet) -> Result<()> {
        rule_set.validate()?;
        self.rule_sets.insert(rule_set.grain, rule_set);
        Ok(())
    }

    pub fn get(&self, grain: GrainType) -> Option<&GrainRuleSet> {
        self.rule_sets.get(&grain)
    }

    pub fn count(&self) -> usize {
        self.rule_sets.len()
    }
}

// ============================================================================
// BUILT-IN RULE SETS
// ============================================================================

fn band(grade: u8, comparison: Comparison, limit: f64) -> GradeBand {
    GradeBand {
        grade,
        comparison,
        limit,
    }
}

/// Three-grade table with the same comparison for every band
fn grades(field: AnalysisField, comparison: Comparison, limits: [f64; 3]) -> GradeThreshold {
    GradeThreshold {
        field,
        bands: vec![
            band(1, comparison, limits[0]),
            band(2, comparison, limits[1]),
            band(3, comparison, limits[2]),
        ],
    }
}

fn adjustments(g1: f64, g2: f64, g3: f64) -> Vec<GradeAdjustment> {
    vec![
        GradeAdjustment { grade: 1, percent: g1 },
        GradeAdjustment { grade: 2, percent: g2 },
        GradeAdjustment { grade: 3, percent: g3 },
    ]
}

fn proportional(field: AnalysisField, concept: &str, base: f64, factor: f64) -> DiscountDefinition {
    DiscountDefinition {
        field,
        concept: concept.to_string(),
        shape: DiscountShape::Proportional { base, factor },
    }
}

fn out_of_standard(
    field: AnalysisField,
    comparison: Comparison,
    threshold: f64,
    description: &str,
) -> OutOfStandardCondition {
    OutOfStandardCondition {
        field,
        comparison,
        threshold,
        description: description.to_string(),
    }
}

fn live_insects() -> OutOfStandardCondition {
    out_of_standard(
        AnalysisField::LiveInsects,
        Comparison::Gt,
        0.0,
        "Insectos vivos",
    )
}

pub fn default_rule_sets() -> Vec<GrainRuleSet> {
    vec![trigo_pan(), maiz(), soja(), girasol(), sorgo()]
}

fn trigo_pan() -> GrainRuleSet {
    use AnalysisField::*;
    GrainRuleSet {
        grain: GrainType::TrigoPan,
        has_grades: true,
        grade_thresholds: vec![
            grades(HectoliterWeight, Comparison::Ge, [79.0, 76.0, 73.0]),
            grades(ForeignMatter, Comparison::Le, [0.20, 0.80, 1.50]),
            grades(DamagedGrains, Comparison::Le, [1.00, 2.00, 3.00]),
            grades(BrokenGrains, Comparison::Le, [0.50, 1.20, 2.00]),
            grades(PanzaBlanca, Comparison::Le, [15.0, 25.0, 40.0]),
        ],
        grade_adjustments: adjustments(1.5, 0.0, -1.0),
        special_bonuses: vec![SpecialBonus::Protein {
            base: 11.0,
            factor: 2.0,
            hectoliter_gate: 73.0,
            penalty_tiers: vec![
                Tier { min: 10.0, max: 11.0, factor: 2.0 },
                Tier { min: 9.0, max: 10.0, factor: 3.0 },
                Tier { min: 0.0, max: 9.0, factor: 4.0 },
            ],
        }],
        discounts: vec![
            proportional(ForeignMatter, "Materias extrañas", 1.5, 1.0),
            proportional(DamagedGrains, "Granos dañados", 3.0, 1.0),
            DiscountDefinition {
                field: BrokenGrains,
                concept: "Granos quebrados y/o chuzos".to_string(),
                shape: DiscountShape::LinearScale {
                    base: 2.0,
                    factor: 0.5,
                    ceiling: 5.0,
                },
            },
        ],
        base_humidity: 14.0,
        out_of_standard: vec![
            out_of_standard(HectoliterWeight, Comparison::Lt, 70.0, "Peso hectolítrico menor a 70"),
            out_of_standard(ForeignMatter, Comparison::Gt, 3.0, "Materias extrañas mayor a 3%"),
            live_insects(),
        ],
    }
}

fn maiz() -> GrainRuleSet {
    use AnalysisField::*;
    GrainRuleSet {
        grain: GrainType::Maiz,
        has_grades: true,
        grade_thresholds: vec![
            grades(HectoliterWeight, Comparison::Ge, [75.0, 72.0, 69.0]),
            grades(DamagedGrains, Comparison::Le, [3.0, 5.0, 8.0]),
            grades(BrokenGrains, Comparison::Le, [2.0, 3.0, 5.0]),
            grades(ForeignMatter, Comparison::Le, [1.0, 1.5, 2.0]),
        ],
        grade_adjustments: adjustments(1.0, 0.0, -1.0),
        special_bonuses: vec![SpecialBonus::HectoliterWeight {
            bands: vec![
                ThresholdBonus { min: 79.0, bonus: 1.0 },
                ThresholdBonus { min: 77.0, bonus: 0.5 },
            ],
        }],
        discounts: vec![
            proportional(DamagedGrains, "Granos dañados", 8.0, 1.0),
            DiscountDefinition {
                field: BrokenGrains,
                concept: "Granos quebrados".to_string(),
                shape: DiscountShape::LinearScale {
                    base: 5.0,
                    factor: 0.25,
                    ceiling: 10.0,
                },
            },
            proportional(ForeignMatter, "Materias extrañas", 2.0, 1.0),
        ],
        base_humidity: 14.5,
        out_of_standard: vec![
            out_of_standard(DamagedGrains, Comparison::Gt, 15.0, "Granos dañados mayor a 15%"),
            live_insects(),
        ],
    }
}

fn soja() -> GrainRuleSet {
    use AnalysisField::*;
    GrainRuleSet {
        grain: GrainType::Soja,
        has_grades: false,
        grade_thresholds: Vec::new(),
        grade_adjustments: Vec::new(),
        special_bonuses: Vec::new(),
        discounts: vec![
            proportional(ForeignMatter, "Materias extrañas", 1.0, 1.0),
            proportional(DamagedGrains, "Granos dañados", 5.0, 1.0),
            DiscountDefinition {
                field: BrokenGrains,
                concept: "Granos quebrados y/o partidos".to_string(),
                shape: DiscountShape::ProgressiveTiered {
                    base: 20.0,
                    tiers: vec![
                        Tier { min: 20.0, max: 25.0, factor: 0.25 },
                        Tier { min: 25.0, max: 30.0, factor: 0.5 },
                    ],
                },
            },
            DiscountDefinition {
                field: GreenGrains,
                concept: "Granos verdes".to_string(),
                shape: DiscountShape::LinearScale {
                    base: 5.0,
                    factor: 0.5,
                    ceiling: 10.0,
                },
            },
            proportional(BlackGrains, "Granos negros", 1.0, 1.0),
        ],
        base_humidity: 13.5,
        out_of_standard: vec![
            out_of_standard(BrokenGrains, Comparison::Gt, 30.0, "Granos quebrados mayor a 30%"),
            out_of_standard(ForeignMatter, Comparison::Gt, 3.0, "Materias extrañas mayor a 3%"),
            live_insects(),
        ],
    }
}

fn girasol() -> GrainRuleSet {
    use AnalysisField::*;
    GrainRuleSet {
        grain: GrainType::Girasol,
        has_grades: false,
        grade_thresholds: Vec::new(),
        grade_adjustments: Vec::new(),
        special_bonuses: vec![SpecialBonus::FatContent {
            base: 42.0,
            factor: 2.0,
        }],
        discounts: vec![
            proportional(ForeignMatter, "Materias extrañas", 2.0, 1.0),
            DiscountDefinition {
                field: Acidity,
                concept: "Acidez".to_string(),
                shape: DiscountShape::SeasonalAcidity {
                    early_season_base: 1.5,
                    late_season_base: 2.0,
                    early_season_last_month: 8,
                    factor: 2.5,
                    rejection_threshold: 2.0,
                },
            },
        ],
        base_humidity: 11.0,
        out_of_standard: vec![
            out_of_standard(ForeignMatter, Comparison::Gt, 6.0, "Materias extrañas mayor a 6%"),
            live_insects(),
        ],
    }
}

fn sorgo() -> GrainRuleSet {
    use AnalysisField::*;
    GrainRuleSet {
        grain: GrainType::Sorgo,
        has_grades: true,
        grade_thresholds: vec![
            grades(HectoliterWeight, Comparison::Ge, [72.0, 70.0, 68.0]),
            grades(DamagedGrains, Comparison::Le, [3.0, 5.0, 8.0]),
            grades(BrokenGrains, Comparison::Le, [3.0, 5.0, 8.0]),
            grades(ForeignMatter, Comparison::Le, [1.0, 1.5, 2.0]),
        ],
        grade_adjustments: adjustments(1.0, 0.0, -1.0),
        special_bonuses: vec![SpecialBonus::HectoliterWeight {
            bands: vec![
                ThresholdBonus { min: 76.0, bonus: 1.0 },
                ThresholdBonus { min: 74.0, bonus: 0.5 },
            ],
        }],
        discounts: vec![
            proportional(ForeignMatter, "Materias extrañas", 2.0, 1.0),
            proportional(DamagedGrains, "Granos dañados", 8.0, 1.0),
        ],
        base_humidity: 15.0,
        out_of_standard: vec![live_insects()],
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rule_sets_are_valid() {
        for rule_set in default_rule_sets() {
            assert!(
                rule_set.validate().is_ok(),
                "{} should be valid",
                rule_set.grain
            );
        }
    }

    #[test]
    fn test_registry_with_defaults() {
        let registry = RuleSetRegistry::with_defaults();
        assert_eq!(registry.count(), 5);
        assert!(registry.get(GrainType::Soja).is_some());
        assert!(registry.get(GrainType::CebadaCervecera).is_none());
    }

    #[test]
    fn test_gradeless_products() {
        let registry = RuleSetRegistry::with_defaults();
        assert!(!registry.get(GrainType::Soja).unwrap().has_grades);
        assert!(!registry.get(GrainType::Girasol).unwrap().has_grades);
        assert!(registry.get(GrainType::TrigoPan).unwrap().has_grades);
    }

    #[test]
    fn test_grade_adjustment_lookup() {
        let wheat = trigo_pan();
        assert_eq!(wheat.grade_adjustment(1), 1.5);
        assert_eq!(wheat.grade_adjustment(2), 0.0);
        assert_eq!(wheat.grade_adjustment(3), -1.0);
        assert_eq!(wheat.grade_adjustment(7), 0.0);
        assert_eq!(wheat.worst_grade(), Some(3));
    }

    #[test]
    fn test_non_contiguous_tiers_rejected() {
        let mut soy = soja();
        soy.discounts[2].shape = DiscountShape::ProgressiveTiered {
            base: 20.0,
            tiers: vec![
                Tier { min: 20.0, max: 25.0, factor: 0.25 },
                Tier { min: 26.0, max: 30.0, factor: 0.5 },
            ],
        };
        assert!(soy.validate().is_err());
    }

    #[test]
    fn test_unordered_tiers_rejected() {
        let mut soy = soja();
        soy.discounts[2].shape = DiscountShape::ProgressiveTiered {
            base: 20.0,
            tiers: vec![
                Tier { min: 20.0, max: 25.0, factor: 0.25 },
                Tier { min: 30.0, max: 35.0, factor: 0.5 },
                Tier { min: 25.0, max: 30.0, factor: 0.5 },
            ],
        };
        assert!(soy.validate().is_err());
    }

    #[test]
    fn test_descending_discount_tiers_rejected() {
        let mut soy = soja();
        soy.discounts[2].shape = DiscountShape::ProgressiveTiered {
            base: 25.0,
            tiers: vec![
                Tier { min: 25.0, max: 30.0, factor: 0.5 },
                Tier { min: 20.0, max: 25.0, factor: 0.25 },
            ],
        };
        assert!(soy.validate().is_err());
    }

    #[test]
    fn test_graded_product_needs_thresholds() {
        let mut wheat = trigo_pan();
        wheat.grade_thresholds.clear();
        assert!(wheat.validate().is_err());
    }

    #[test]
    fn test_rule_set_json_roundtrip_shape_tag() {
        let json = r#"{
            "grain": "soja",
            "has_grades": false,
            "base_humidity": 13.5,
            "discounts": [{
                "field": "broken_grains",
                "concept": "Quebrados",
                "shape": {
                    "type": "progressive_tiered",
                    "base": 20.0,
                    "tiers": [
                        {"min": 20.0, "max": 25.0, "factor": 0.25},
                        {"min": 25.0, "max": 30.0, "factor": 0.5}
                    ]
                }
            }]
        }"#;
        let rule_set: GrainRuleSet = serde_json::from_str(json).unwrap();
        assert_eq!(rule_set.grain, GrainType::Soja);
        assert!(rule_set.validate().is_ok());
        assert!(matches!(
            rule_set.discounts[0].shape,
            DiscountShape::ProgressiveTiered { .. }
        ));
    }

    #[test]
    fn test_from_rule_sets_rejects_invalid() {
        let mut bad = girasol();
        bad.base_humidity = 0.0;
        assert!(RuleSetRegistry::from_rule_sets(vec![bad]).is_err());
    }
}
