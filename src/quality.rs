// ⚖️ Quality Calculation Engine - grade, bonuses, discounts, moisture loss
//
// Fixed order per (analysis, rule set):
//   1. grade            (worst field wins)
//   2. grade adjustment (signed table by grade)
//   3. special bonuses  (protein / fat / hectoliter weight)
//   4. discounts        (proportional / linear / progressive / seasonal)
//   5. final factor  =  100 + grade adjustment + Σ bonuses − Σ discounts
//   6. moisture loss    (drying waste + handling waste)
//   7. out-of-standard  (critical warning, never an error)
//
// One engine for every grain: what differs per grain lives in GrainRuleSet.

use crate::entities::GrainType;
use crate::error::QualityError;
use crate::moisture::{MoistureLossTable, MoistureRegistry};
use crate::rules::{
    AnalysisField, DiscountDefinition, DiscountShape, GrainRuleSet, RuleSetRegistry, SpecialBonus,
    Tier,
};
use crate::text::round_to;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub const BASE_FACTOR: f64 = 100.0;

/// Sentinel discount for a lot that must be rejected rather than discounted
pub const REJECTION_DISCOUNT: f64 = 999.0;

// ============================================================================
// QUALITY ANALYSIS (input)
// ============================================================================

/// Lab measurements for one delivery lot (CTG)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityAnalysis {
    pub ctg_number: String,
    pub product: String,

    #[serde(default)]
    pub analysis_date: Option<NaiveDate>,

    #[serde(default)]
    pub humidity: Option<f64>,
    #[serde(default)]
    pub foreign_matter: Option<f64>,
    #[serde(default)]
    pub damaged_grains: Option<f64>,
    #[serde(default)]
    pub broken_grains: Option<f64>,
    #[serde(default)]
    pub green_grains: Option<f64>,
    #[serde(default)]
    pub black_grains: Option<f64>,
    #[serde(default)]
    pub hectoliter_weight: Option<f64>,
    #[serde(default)]
    pub protein: Option<f64>,
    #[serde(default)]
    pub fat_content: Option<f64>,
    #[serde(default)]
    pub acidity: Option<f64>,
    #[serde(default)]
    pub panza_blanca: Option<f64>,
    #[serde(default)]
    pub live_insects: Option<f64>,
}

impl QualityAnalysis {
    pub fn new(ctg_number: &str, product: &str) -> Self {
        QualityAnalysis {
            ctg_number: ctg_number.to_string(),
            product: product.to_string(),
            ..Default::default()
        }
    }

    /// Builder: set a measured field
    pub fn with(mut self, field: AnalysisField, value: f64) -> Self {
        *self.slot(field) = Some(value);
        self
    }

    /// Builder: set the analysis date
    pub fn on(mut self, date: NaiveDate) -> Self {
        self.analysis_date = Some(date);
        self
    }

    pub fn value(&self, field: AnalysisField) -> Option<f64> {
        match field {
            AnalysisField::Humidity => self.humidity,
            AnalysisField::ForeignMatter => self.foreign_matter,
            AnalysisField::DamagedGrains => self.damaged_grains,
            AnalysisField::BrokenGrains => self.broken_grains,
            AnalysisField::GreenGrains => self.green_grains,
            AnalysisField::BlackGrains => self.black_grains,
            AnalysisField::HectoliterWeight => self.hectoliter_weight,
            AnalysisField::Protein => self.protein,
            AnalysisField::FatContent => self.fat_content,
            AnalysisField::Acidity => self.acidity,
            AnalysisField::PanzaBlanca => self.panza_blanca,
            AnalysisField::LiveInsects => self.live_insects,
        }
    }

    fn slot(&mut self, field: AnalysisField) -> &mut Option<f64> {
        match field {
            AnalysisField::Humidity => &mut self.humidity,
            AnalysisField::ForeignMatter => &mut self.foreign_matter,
            AnalysisField::DamagedGrains => &mut self.damaged_grains,
            AnalysisField::BrokenGrains => &mut self.broken_grains,
            AnalysisField::GreenGrains => &mut self.green_grains,
            AnalysisField::BlackGrains => &mut self.black_grains,
            AnalysisField::HectoliterWeight => &mut self.hectoliter_weight,
            AnalysisField::Protein => &mut self.protein,
            AnalysisField::FatContent => &mut self.fat_content,
            AnalysisField::Acidity => &mut self.acidity,
            AnalysisField::PanzaBlanca => &mut self.panza_blanca,
            AnalysisField::LiveInsects => &mut self.live_insects,
        }
    }
}

// ============================================================================
// QUALITY RESULT (output)
// ============================================================================

/// One line of the bonus or discount breakdown
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorComponent {
    pub concept: String,
    pub field: AnalysisField,
    pub measured: f64,
    /// Always positive; the list it sits in gives the sign
    pub percent: f64,
    /// Human-readable arithmetic ("(27.00 - 25.00) × 0.50 = 1.00")
    pub calculation: String,
    /// Rejection sentinel (percent = 999), excluded from the factor sum
    #[serde(default)]
    pub rejection: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldGrade {
    pub field: AnalysisField,
    pub measured: f64,
    pub grade: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoistureLoss {
    pub base_humidity: f64,
    pub actual_humidity: Option<f64>,
    /// Humidity used for the table lookup (rounded up to 0.1)
    pub lookup_humidity: Option<f64>,
    pub drying_waste_percent: f64,
    pub handling_waste_percent: f64,
    pub total_waste_percent: f64,
    pub quantity_kg: f64,
    pub waste_kg: f64,
    pub net_quantity_kg: f64,
    pub requires_drying: bool,
}

impl MoistureLoss {
    fn none(base_humidity: f64, actual_humidity: Option<f64>, quantity_kg: f64) -> Self {
        MoistureLoss {
            base_humidity,
            actual_humidity,
            lookup_humidity: None,
            drying_waste_percent: 0.0,
            handling_waste_percent: 0.0,
            total_waste_percent: 0.0,
            quantity_kg,
            waste_kg: 0.0,
            net_quantity_kg: quantity_kg,
            requires_drying: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityResult {
    pub ctg_number: String,
    pub product: String,
    pub grain: GrainType,

    /// None for gradeless products or when no grading field was measured
    pub grade: Option<u8>,
    pub grade_by_field: Vec<FieldGrade>,

    pub base_factor: f64,
    pub grade_adjustment: f64,
    pub bonuses: Vec<FactorComponent>,
    pub discounts: Vec<FactorComponent>,
    pub total_bonus: f64,
    pub total_discount: f64,
    pub final_factor: f64,

    pub moisture: MoistureLoss,

    pub out_of_standard: bool,
    pub out_of_standard_reasons: Vec<String>,
    pub is_rejected: bool,

    pub warnings: Vec<String>,
    pub calculated_at: DateTime<Utc>,
}

impl QualityResult {
    pub fn summary(&self) -> String {
        format!(
            "CTG {} ({}): grade {}, factor {:.2}%, net {:.0} kg{}",
            self.ctg_number,
            self.grain,
            self.grade
                .map(|g| format!("G{}", g))
                .unwrap_or_else(|| "-".to_string()),
            self.final_factor,
            self.moisture.net_quantity_kg,
            if self.out_of_standard { " [FUERA DE ESTÁNDAR]" } else { "" }
        )
    }
}

// ============================================================================
// DISCOUNT SHAPES
// ============================================================================

/// Outcome of evaluating one discount shape against a measured value
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeOutcome {
    pub percent: f64,
    pub calculation: String,
    pub rejection: bool,
}

/// Σ max(0, min(value, tier.max) − tier.min) × tier.factor
pub fn progressive_discount(value: f64, tiers: &[Tier]) -> (f64, Vec<String>) {
    let mut total = 0.0;
    let mut steps = Vec::new();
    for tier in tiers {
        let span = (value.min(tier.max) - tier.min).max(0.0);
        if span > 0.0 {
            let part = span * tier.factor;
            steps.push(format!(
                "({:.2} - {:.2}) × {:.2} = {:.2}",
                value.min(tier.max),
                tier.min,
                tier.factor,
                part
            ));
            total += part;
        }
    }
    (total, steps)
}

/// Evaluate a discount shape. `month` is the analysis month (1-12), used
/// only by the seasonal acidity table.
pub fn apply_discount_shape(shape: &DiscountShape, value: f64, month: Option<u32>) -> ShapeOutcome {
    match shape {
        DiscountShape::Proportional { base, factor }
        | DiscountShape::LinearScale { base, factor, .. } => {
            let percent = (value - base).max(0.0) * factor;
            ShapeOutcome {
                percent,
                calculation: format!(
                    "({:.2} - {:.2}) × {:.2} = {:.2}",
                    value, base, factor, percent
                ),
                rejection: false,
            }
        }
        DiscountShape::ProgressiveTiered { tiers, .. } => {
            let (percent, steps) = progressive_discount(value, tiers);
            let calculation = if steps.is_empty() {
                "0.00".to_string()
            } else {
                format!("{} = {:.2}", steps.join(" + "), percent)
            };
            ShapeOutcome {
                percent,
                calculation,
                rejection: false,
            }
        }
        DiscountShape::SeasonalAcidity {
            early_season_base,
            late_season_base,
            early_season_last_month,
            factor,
            rejection_threshold,
        } => {
            if value > *rejection_threshold {
                return ShapeOutcome {
                    percent: REJECTION_DISCOUNT,
                    calculation: format!(
                        "{:.2} > {:.2}: rechazo",
                        value, rejection_threshold
                    ),
                    rejection: true,
                };
            }
            let base = match month {
                Some(m) if m > *early_season_last_month => *late_season_base,
                _ => *early_season_base,
            };
            let percent = (value - base).max(0.0) * factor;
            ShapeOutcome {
                percent,
                calculation: format!(
                    "({:.2} - {:.2}) × {:.2} = {:.2}",
                    value, base, factor, percent
                ),
                rejection: false,
            }
        }
    }
}

// ============================================================================
// QUALITY CALCULATION ENGINE
// ============================================================================

pub struct QualityCalculationEngine {
    rules: RuleSetRegistry,
    moisture: MoistureRegistry,
}

impl QualityCalculationEngine {
    pub fn new(rules: RuleSetRegistry, moisture: MoistureRegistry) -> Self {
        QualityCalculationEngine { rules, moisture }
    }

    /// Engine over the built-in rule sets and moisture tables
    pub fn with_defaults() -> Self {
        QualityCalculationEngine::new(
            RuleSetRegistry::with_defaults(),
            MoistureRegistry::with_defaults(),
        )
    }

    pub fn rules(&self) -> &RuleSetRegistry {
        &self.rules
    }

    /// Resolve the grain of an analysis and its configuration
    fn resolve(
        &self,
        product: &str,
    ) -> Result<(GrainType, &GrainRuleSet, &MoistureLossTable), QualityError> {
        let grain = GrainType::from_name(product)
            .ok_or_else(|| QualityError::UnknownProduct(product.to_string()))?;
        let rules = self
            .rules
            .get(grain)
            .ok_or(QualityError::MissingRuleSet(grain))?;
        let table = self
            .moisture
            .get(grain)
            .ok_or(QualityError::MissingMoistureTable(grain))?;
        Ok((grain, rules, table))
    }

    /// Compute the quality result of one lot.
    ///
    /// Fails only when the product has no configuration (or the quantity is
    /// not a usable number); everything else ends up in `warnings`.
    pub fn calculate(
        &self,
        analysis: &QualityAnalysis,
        quantity_kg: f64,
    ) -> Result<QualityResult, QualityError> {
        self.calculate_at(analysis, quantity_kg, Utc::now())
    }

    /// Same as `calculate`, stamped with the caller's time. Identical inputs
    /// give equal results.
    pub fn calculate_at(
        &self,
        analysis: &QualityAnalysis,
        quantity_kg: f64,
        calculated_at: DateTime<Utc>,
    ) -> Result<QualityResult, QualityError> {
        if !quantity_kg.is_finite() || quantity_kg < 0.0 {
            return Err(QualityError::InvalidQuantity(quantity_kg));
        }

        let (grain, rules, table) = self.resolve(&analysis.product)?;
        let mut warnings = Vec::new();

        // 1. Grade
        let (grade, grade_by_field) = determine_grade(rules, analysis, &mut warnings);

        // 2. Grade adjustment
        let grade_adjustment = grade.map(|g| rules.grade_adjustment(g)).unwrap_or(0.0);

        // 3. Special bonuses (negative outcomes go to the discount list)
        let mut bonuses = Vec::new();
        let mut discounts = Vec::new();
        for bonus in &rules.special_bonuses {
            if let Some(component) = special_bonus(bonus, analysis, &mut warnings) {
                if component.percent >= 0.0 {
                    bonuses.push(component);
                } else {
                    discounts.push(FactorComponent {
                        percent: -component.percent,
                        ..component
                    });
                }
            }
        }

        // 4. Discounts
        let month = analysis.analysis_date.map(|d| d.month());
        for definition in &rules.discounts {
            if let Some(component) = discount(definition, analysis, month, &mut warnings) {
                discounts.push(component);
            }
        }

        // 5. Final factor
        let total_bonus: f64 = bonuses.iter().map(|b| b.percent).sum();
        let total_discount: f64 = discounts
            .iter()
            .filter(|d| !d.rejection)
            .map(|d| d.percent)
            .sum();
        let final_factor =
            round_to(BASE_FACTOR + grade_adjustment + total_bonus - total_discount, 3);
        let is_rejected = discounts.iter().any(|d| d.rejection);

        // 6. Moisture loss
        let moisture = moisture_loss(rules, table, analysis.humidity, quantity_kg, &mut warnings);

        // 7. Out of standard
        let mut out_of_standard_reasons = out_of_standard(rules, analysis);
        if is_rejected {
            for d in discounts.iter().filter(|d| d.rejection) {
                out_of_standard_reasons.push(format!("{}: {}", d.concept, d.calculation));
            }
        }
        for reason in &out_of_standard_reasons {
            warnings.push(format!("CRITICAL: fuera de estándar - {}", reason));
        }
        let out_of_standard = !out_of_standard_reasons.is_empty();

        if out_of_standard {
            tracing::warn!(
                ctg = %analysis.ctg_number,
                grain = %grain,
                reasons = ?out_of_standard_reasons,
                "lot out of standard"
            );
        }

        tracing::debug!(
            ctg = %analysis.ctg_number,
            grain = %grain,
            grade = ?grade,
            final_factor,
            "quality calculated"
        );

        Ok(QualityResult {
            ctg_number: analysis.ctg_number.clone(),
            product: analysis.product.clone(),
            grain,
            grade,
            grade_by_field,
            base_factor: BASE_FACTOR,
            grade_adjustment,
            bonuses,
            discounts,
            total_bonus,
            total_discount,
            final_factor,
            moisture,
            out_of_standard,
            out_of_standard_reasons,
            is_rejected,
            warnings,
            calculated_at,
        })
    }

    /// One result per (analysis, quantity) lot; the first unknown product
    /// aborts the batch.
    pub fn calculate_batch(
        &self,
        lots: &[(QualityAnalysis, f64)],
    ) -> Result<Vec<QualityResult>, QualityError> {
        lots.iter()
            .map(|(analysis, quantity)| self.calculate(analysis, *quantity))
            .collect()
    }

    /// Final factor averaged by net kg (after moisture loss)
    pub fn weighted_factor(results: &[QualityResult]) -> Option<f64> {
        let total_kg: f64 = results.iter().map(|r| r.moisture.net_quantity_kg).sum();
        if total_kg <= 0.0 {
            return None;
        }
        let weighted: f64 = results
            .iter()
            .map(|r| r.final_factor * r.moisture.net_quantity_kg)
            .sum();
        Some(round_to(weighted / total_kg, 3))
    }
}

// ============================================================================
// STEPS
// ============================================================================

/// Rule of the worst parameter: each field maps to a grade through its
/// bands (first band satisfied wins, worst grade if none), the lot takes
/// the highest grade number across fields.
fn determine_grade(
    rules: &GrainRuleSet,
    analysis: &QualityAnalysis,
    warnings: &mut Vec<String>,
) -> (Option<u8>, Vec<FieldGrade>) {
    if !rules.has_grades {
        return (None, Vec::new());
    }

    let worst = rules.worst_grade().unwrap_or(3);
    let mut by_field = Vec::new();

    for threshold in &rules.grade_thresholds {
        let Some(measured) = analysis.value(threshold.field) else {
            warnings.push(format!(
                "{} not measured; ignored for grading",
                threshold.field.name()
            ));
            continue;
        };

        let grade = threshold
            .bands
            .iter()
            .find(|band| band.comparison.holds(measured, band.limit))
            .map(|band| band.grade)
            .unwrap_or(worst);

        by_field.push(FieldGrade {
            field: threshold.field,
            measured,
            grade,
        });
    }

    let grade = by_field.iter().map(|f| f.grade).max();
    if grade.is_none() {
        warnings.push("No grading field measured; grade not determined".to_string());
    }

    (grade, by_field)
}

/// Signed special bonus; None when it does not apply
fn special_bonus(
    bonus: &SpecialBonus,
    analysis: &QualityAnalysis,
    warnings: &mut Vec<String>,
) -> Option<FactorComponent> {
    let field = bonus.field();
    let measured = match analysis.value(field) {
        Some(v) => v,
        None => {
            warnings.push(format!("{} not measured; no bonus computed", field.name()));
            return None;
        }
    };

    match bonus {
        SpecialBonus::Protein {
            base,
            factor,
            hectoliter_gate,
            penalty_tiers,
        } => {
            if measured >= *base {
                match analysis.hectoliter_weight {
                    Some(ph) if ph >= *hectoliter_gate => {
                        let percent = (measured - base) * factor;
                        if percent == 0.0 {
                            return None;
                        }
                        Some(FactorComponent {
                            concept: "Bonificación por proteína".to_string(),
                            field,
                            measured,
                            percent,
                            calculation: format!(
                                "({:.2} - {:.2}) × {:.2} = {:.2}",
                                measured, base, factor, percent
                            ),
                            rejection: false,
                        })
                    }
                    ph => {
                        warnings.push(format!(
                            "Protein bonus withheld: hectoliter weight {} below {:.1}",
                            ph.map(|v| format!("{:.1}", v))
                                .unwrap_or_else(|| "not measured".to_string()),
                            hectoliter_gate
                        ));
                        None
                    }
                }
            } else {
                let penalty: f64 = penalty_tiers
                    .iter()
                    .map(|t| (t.max - measured.max(t.min)).max(0.0) * t.factor)
                    .sum();
                let steps: Vec<String> = penalty_tiers
                    .iter()
                    .filter(|t| measured < t.max)
                    .map(|t| {
                        format!(
                            "({:.2} - {:.2}) × {:.2}",
                            t.max,
                            measured.max(t.min),
                            t.factor
                        )
                    })
                    .collect();
                Some(FactorComponent {
                    concept: "Rebaja por proteína".to_string(),
                    field,
                    measured,
                    percent: -penalty,
                    calculation: format!("{} = {:.2}", steps.join(" + "), penalty),
                    rejection: false,
                })
            }
        }
        SpecialBonus::FatContent { base, factor } => {
            let percent = (measured - base) * factor;
            if percent == 0.0 {
                return None;
            }
            Some(FactorComponent {
                concept: "Materia grasa".to_string(),
                field,
                measured,
                percent,
                calculation: format!(
                    "({:.2} - {:.2}) × {:.2} = {:.2}",
                    measured, base, factor, percent
                ),
                rejection: false,
            })
        }
        SpecialBonus::HectoliterWeight { bands } => {
            let band = bands.iter().find(|b| measured >= b.min)?;
            Some(FactorComponent {
                concept: "Bonificación por peso hectolítrico".to_string(),
                field,
                measured,
                percent: band.bonus,
                calculation: format!("{:.2} >= {:.2} → {:.2}", measured, band.min, band.bonus),
                rejection: false,
            })
        }
    }
}

fn discount(
    definition: &DiscountDefinition,
    analysis: &QualityAnalysis,
    month: Option<u32>,
    warnings: &mut Vec<String>,
) -> Option<FactorComponent> {
    let measured = analysis.value(definition.field)?;

    if matches!(definition.shape, DiscountShape::SeasonalAcidity { .. }) && month.is_none() {
        warnings.push(format!(
            "{}: analysis date missing; early-season base applied",
            definition.concept
        ));
    }

    let outcome = apply_discount_shape(&definition.shape, measured, month);

    if outcome.rejection {
        tracing::warn!(
            ctg = %analysis.ctg_number,
            concept = %definition.concept,
            measured,
            "rejection condition"
        );
    } else if outcome.percent <= 0.0 {
        return None;
    }

    Some(FactorComponent {
        concept: definition.concept.clone(),
        field: definition.field,
        measured,
        percent: outcome.percent,
        calculation: outcome.calculation,
        rejection: outcome.rejection,
    })
}

fn moisture_loss(
    rules: &GrainRuleSet,
    table: &MoistureLossTable,
    humidity: Option<f64>,
    quantity_kg: f64,
    warnings: &mut Vec<String>,
) -> MoistureLoss {
    let base = rules.base_humidity;

    let Some(actual) = humidity else {
        warnings.push("Humidity not measured; no moisture loss applied".to_string());
        return MoistureLoss::none(base, None, quantity_kg);
    };

    if actual <= base {
        return MoistureLoss::none(base, Some(actual), quantity_kg);
    }

    let Some(lookup) = table.drying_waste(actual) else {
        warnings.push(format!(
            "Moisture table for {} is empty; no drying waste applied",
            table.grain
        ));
        return MoistureLoss::none(base, Some(actual), quantity_kg);
    };

    if lookup.beyond_table {
        warnings.push(format!(
            "Humidity {:.1}% above moisture table range; last entry used",
            actual
        ));
    }

    let drying = lookup.drying_waste_percent;
    let handling = table.handling_waste_percent;
    let total = drying + handling;
    let waste_kg = quantity_kg * total / 100.0;

    MoistureLoss {
        base_humidity: base,
        actual_humidity: Some(actual),
        lookup_humidity: Some(lookup.lookup_humidity),
        drying_waste_percent: drying,
        handling_waste_percent: handling,
        total_waste_percent: total,
        quantity_kg,
        waste_kg: round_to(waste_kg, 2),
        net_quantity_kg: round_to(quantity_kg - waste_kg, 2),
        requires_drying: true,
    }
}

fn out_of_standard(rules: &GrainRuleSet, analysis: &QualityAnalysis) -> Vec<String> {
    rules
        .out_of_standard
        .iter()
        .filter_map(|condition| {
            let value = analysis.value(condition.field)?;
            condition
                .comparison
                .holds(value, condition.threshold)
                .then(|| {
                    format!(
                        "{} ({} = {:.2} {} {:.2})",
                        condition.description,
                        condition.field.name(),
                        value,
                        condition.comparison.symbol(),
                        condition.threshold
                    )
                })
        })
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================
