// ✅ Settlement Validator - cross-checks with numeric tolerances
//
// Each check is independent and returns its own ValidationResult; validate_all
// merges them. Nothing here ever fails: `valid` is false only when at least
// one Error-severity finding exists. Warnings never block persistence.
//
//   CTG sum          |Σ ctg.kg − settlement.kg| > 0.1 kg        → error
//   Contract amount  |Σ subtotals − contract| ≥ $100,000         → error
//   Partial + final  |partial.net + final.net − partial.subtotal|
//                      > min(1% subtotal, $100,000)              → error

use crate::settlement::{Settlement, SettlementType};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

// ============================================================================
// CONFIG
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// kg
    pub ctg_sum_tolerance: f64,
    /// $
    pub contract_tolerance: f64,
    pub ctg_min_tons: f64,
    pub ctg_max_tons: f64,
    /// Days a partial may wait for its final settlement
    pub pending_final_days: i64,
    /// Days between repeated overdue notifications
    pub notification_cadence_days: i64,
    /// Fraction of the partial subtotal (0.01 = 1%)
    pub partial_final_rate: f64,
    /// $ cap on the partial+final tolerance
    pub partial_final_cap: f64,
    /// $/t between computed and stated net price
    pub price_tolerance: f64,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        ValidatorConfig {
            ctg_sum_tolerance: 0.1,
            contract_tolerance: 100_000.0,
            ctg_min_tons: 15.0,
            ctg_max_tons: 38.0,
            pending_final_days: 30,
            notification_cadence_days: 15,
            partial_final_rate: 0.01,
            partial_final_cap: 100_000.0,
            price_tolerance: 1.0,
        }
    }
}

// ============================================================================
// FINDINGS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,   // Blocks: the settlement does not add up
    Warning, // Questionable, needs a human look
    Info,    // Consistent, but worth knowing
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationErrorType {
    ContractAmount,
    CtgQuantityMismatch,
    DuplicateCtg,
    CtgOutOfRange,
    CtgFactorMismatch,
    PendingFinal,
    PartialFinalMismatch,
    PriceBreakdownMismatch,
    DuplicateCoe,
    MissingData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationError {
    pub error_type: ValidationErrorType,
    pub severity: Severity,
    pub message: String,
    pub expected: Option<f64>,
    pub actual: Option<f64>,
    pub difference: Option<f64>,
}

impl ValidationError {
    pub fn new(error_type: ValidationErrorType, severity: Severity, message: String) -> Self {
        ValidationError {
            error_type,
            severity,
            message,
            expected: None,
            actual: None,
            difference: None,
        }
    }

    /// Builder: attach expected / actual and their absolute difference
    pub fn with_values(mut self, expected: f64, actual: f64) -> Self {
        self.expected = Some(expected);
        self.actual = Some(actual);
        self.difference = Some((actual - expected).abs());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationError>,
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::new()
    }
}

impl ValidationResult {
    pub fn new() -> Self {
        ValidationResult {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Errors go to `errors` and invalidate; everything else is a warning
    pub fn push(&mut self, finding: ValidationError) {
        if finding.severity == Severity::Error {
            self.valid = false;
            self.errors.push(finding);
        } else {
            self.warnings.push(finding);
        }
    }

    pub fn merge(&mut self, other: ValidationResult) {
        self.valid &= other.valid;
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    pub fn has(&self, error_type: ValidationErrorType) -> bool {
        self.errors
            .iter()
            .chain(self.warnings.iter())
            .any(|f| f.error_type == error_type)
    }

    pub fn summary(&self) -> String {
        format!(
            "{}: {} errors, {} warnings",
            if self.valid { "VALID" } else { "INVALID" },
            self.errors.len(),
            self.warnings.len()
        )
    }
}

// ============================================================================
// CONTEXT
// ============================================================================

/// Linked contract as known by the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    pub number: String,
    pub expected_amount: f64,
}

/// Everything the cross-record checks need, supplied by the caller
#[derive(Debug, Clone, Default)]
pub struct ValidationContext<'a> {
    pub contract: Option<&'a Contract>,
    /// Settlements already recorded against the contract
    pub contract_settlements: &'a [Settlement],
    /// Partial settlement a final one closes
    pub linked_partial: Option<&'a Settlement>,
    /// Settlements already stored (duplicate COE check)
    pub existing_settlements: &'a [Settlement],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingFinalStatus {
    pub days_elapsed: i64,
    pub days_overdue: i64,
    pub overdue: bool,
    pub should_notify: bool,
    pub message: String,
}

// ============================================================================
// SETTLEMENT VALIDATOR
// ============================================================================

pub struct SettlementValidator {
    config: ValidatorConfig,
}

impl Default for SettlementValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl SettlementValidator {
    pub fn new() -> Self {
        SettlementValidator {
            config: ValidatorConfig::default(),
        }
    }

    pub fn with_config(config: ValidatorConfig) -> Self {
        SettlementValidator { config }
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Σ subtotals of non-adjustment settlements on the contract vs the
    /// contract amount. The settlement itself counts once.
    pub fn check_contract_amount(
        &self,
        settlement: &Settlement,
        contract: &Contract,
        contract_settlements: &[Settlement],
    ) -> ValidationResult {
        let mut result = ValidationResult::new();

        let mut counted: HashSet<&str> = HashSet::new();
        let total: f64 = contract_settlements
            .iter()
            .chain(std::iter::once(settlement))
            .filter(|s| s.settlement_type != SettlementType::Adjustment)
            .filter(|s| counted.insert(s.coe.as_str()))
            .map(|s| s.subtotal.unwrap_or(0.0))
            .sum();

        let difference = (total - contract.expected_amount).abs();

        if difference >= self.config.contract_tolerance {
            result.push(
                ValidationError::new(
                    ValidationErrorType::ContractAmount,
                    Severity::Error,
                    format!(
                        "Contract {}: settled ${:.2} vs expected ${:.2}",
                        contract.number, total, contract.expected_amount
                    ),
                )
                .with_values(contract.expected_amount, total),
            );
        } else if difference > 0.0 {
            result.push(
                ValidationError::new(
                    ValidationErrorType::ContractAmount,
                    Severity::Info,
                    format!(
                        "Contract {}: ${:.2} difference within tolerance",
                        contract.number, difference
                    ),
                )
                .with_values(contract.expected_amount, total),
            );
        }

        result
    }

    /// CTG sum vs settlement quantity, duplicates, weight range, factors
    pub fn check_ctg_consistency(&self, settlement: &Settlement) -> ValidationResult {
        let mut result = ValidationResult::new();
        if settlement.ctgs.is_empty() {
            return result;
        }

        let expected = settlement.quantity_kg.unwrap_or(0.0);
        let actual = settlement.total_ctg_kg();
        let difference = (actual - expected).abs();
        if difference > self.config.ctg_sum_tolerance {
            result.push(
                ValidationError::new(
                    ValidationErrorType::CtgQuantityMismatch,
                    Severity::Error,
                    format!(
                        "CTGs add up to {:.2} kg, settlement states {:.2} kg",
                        actual, expected
                    ),
                )
                .with_values(expected, actual),
            );
        }

        let mut seen: HashMap<&str, usize> = HashMap::new();
        for ctg in &settlement.ctgs {
            *seen.entry(ctg.number.as_str()).or_insert(0) += 1;
        }
        let mut duplicates: Vec<(&str, usize)> =
            seen.into_iter().filter(|(_, count)| *count > 1).collect();
        duplicates.sort();
        for (number, count) in duplicates {
            result.push(ValidationError::new(
                ValidationErrorType::DuplicateCtg,
                Severity::Error,
                format!("CTG {} appears {} times", number, count),
            ));
        }

        for ctg in &settlement.ctgs {
            let tons = ctg.quantity_kg / 1000.0;
            if tons < self.config.ctg_min_tons || tons > self.config.ctg_max_tons {
                result.push(ValidationError::new(
                    ValidationErrorType::CtgOutOfRange,
                    Severity::Warning,
                    format!(
                        "CTG {}: {:.2} t outside {:.0}-{:.0} t",
                        ctg.number, tons, self.config.ctg_min_tons, self.config.ctg_max_tons
                    ),
                ));
            }
        }

        let factors: Vec<f64> = settlement.ctgs.iter().filter_map(|c| c.factor).collect();
        if let (Some(min), Some(max)) = (
            factors.iter().copied().reduce(f64::min),
            factors.iter().copied().reduce(f64::max),
        ) {
            if max - min > 1e-9 {
                result.push(ValidationError::new(
                    ValidationErrorType::CtgFactorMismatch,
                    Severity::Info,
                    format!("CTG factors differ: {:.2} to {:.2}", min, max),
                ));
            }
        }

        result
    }

    /// Days since a partial settlement and whether an overdue notice is due.
    /// None for non-partial settlements or an unknown date.
    pub fn pending_final_status(
        &self,
        settlement: &Settlement,
        today: NaiveDate,
    ) -> Option<PendingFinalStatus> {
        if settlement.settlement_type != SettlementType::Partial {
            return None;
        }
        let date = settlement.date?;

        let days_elapsed = (today - date).num_days();
        let horizon = self.config.pending_final_days;
        let days_overdue = (days_elapsed - horizon).max(0);
        let overdue = days_overdue > 0;
        let cadence = self.config.notification_cadence_days.max(1);

        let message = if overdue {
            format!("Final settlement overdue by {} days", days_overdue)
        } else {
            format!(
                "Final settlement expected within {} days",
                horizon - days_elapsed.max(0)
            )
        };

        Some(PendingFinalStatus {
            days_elapsed,
            days_overdue,
            overdue,
            should_notify: overdue && days_overdue % cadence == 1,
            message,
        })
    }

    pub fn check_pending_final(&self, settlement: &Settlement, today: NaiveDate) -> ValidationResult {
        let mut result = ValidationResult::new();
        if let Some(status) = self.pending_final_status(settlement, today) {
            let severity = if status.overdue {
                Severity::Warning
            } else {
                Severity::Info
            };
            result.push(ValidationError::new(
                ValidationErrorType::PendingFinal,
                severity,
                format!("COE {}: {}", settlement.coe, status.message),
            ));
        }
        result
    }

    /// partial.net + final.net should give back the partial subtotal
    pub fn check_partial_final(&self, final_settlement: &Settlement, partial: &Settlement) -> ValidationResult {
        let mut result = ValidationResult::new();

        let (Some(partial_net), Some(final_net), Some(subtotal)) = (
            partial.net_amount,
            final_settlement.net_amount,
            partial.subtotal,
        ) else {
            result.push(ValidationError::new(
                ValidationErrorType::MissingData,
                Severity::Warning,
                format!(
                    "Cannot verify partial {} + final {}: net or subtotal missing",
                    partial.coe, final_settlement.coe
                ),
            ));
            return result;
        };

        let actual = partial_net + final_net;
        let difference = (actual - subtotal).abs();
        let tolerance = (subtotal.abs() * self.config.partial_final_rate)
            .min(self.config.partial_final_cap);

        if difference > tolerance {
            result.push(
                ValidationError::new(
                    ValidationErrorType::PartialFinalMismatch,
                    Severity::Error,
                    format!(
                        "Partial {} + final {} = ${:.2}, partial subtotal ${:.2} (tolerance ${:.2})",
                        partial.coe, final_settlement.coe, actual, subtotal, tolerance
                    ),
                )
                .with_values(subtotal, actual),
            );
        } else if difference > 0.0 {
            result.push(
                ValidationError::new(
                    ValidationErrorType::PartialFinalMismatch,
                    Severity::Info,
                    format!("Partial + final differ by ${:.2}, within tolerance", difference),
                )
                .with_values(subtotal, actual),
            );
        }

        result
    }

    pub fn check_price_breakdown(&self, settlement: &Settlement) -> ValidationResult {
        let mut result = ValidationResult::new();
        if let Some(breakdown) = &settlement.price_breakdown {
            if !breakdown.calculation_matches {
                let mut finding = ValidationError::new(
                    ValidationErrorType::PriceBreakdownMismatch,
                    Severity::Warning,
                    format!(
                        "Computed net price ${:.2}/t does not match the document",
                        breakdown.net_price
                    ),
                );
                if let Some(stated) = breakdown.stated_net_price {
                    finding = finding.with_values(stated, breakdown.net_price);
                }
                result.push(finding);
            }
        }
        result
    }

    /// COE already present among stored settlements
    pub fn check_duplicate_coe(&self, settlement: &Settlement, existing: &[Settlement]) -> ValidationResult {
        let mut result = ValidationResult::new();
        if existing.iter().any(|s| s.coe == settlement.coe) {
            result.push(ValidationError::new(
                ValidationErrorType::DuplicateCoe,
                Severity::Error,
                format!("COE {} already recorded", settlement.coe),
            ));
        }
        result
    }

    /// Duplicate COEs within one batch
    pub fn check_duplicate_coes(&self, settlements: &[Settlement]) -> ValidationResult {
        let mut result = ValidationResult::new();
        let mut seen = HashSet::new();
        let mut reported = HashSet::new();
        for s in settlements {
            if !seen.insert(s.coe.as_str()) && reported.insert(s.coe.as_str()) {
                result.push(ValidationError::new(
                    ValidationErrorType::DuplicateCoe,
                    Severity::Error,
                    format!("COE {} appears more than once", s.coe),
                ));
            }
        }
        result
    }

    /// Every check that applies to this settlement, merged
    pub fn validate_all(
        &self,
        settlement: &Settlement,
        context: &ValidationContext<'_>,
        today: NaiveDate,
    ) -> ValidationResult {
        let mut result = ValidationResult::new();

        result.merge(self.check_ctg_consistency(settlement));
        result.merge(self.check_price_breakdown(settlement));
        result.merge(self.check_pending_final(settlement, today));
        result.merge(self.check_duplicate_coe(settlement, context.existing_settlements));

        if settlement.settlement_type == SettlementType::Final {
            if let Some(partial) = context.linked_partial {
                result.merge(self.check_partial_final(settlement, partial));
            }
        }

        if let Some(contract) = context.contract {
            result.merge(self.check_contract_amount(
                settlement,
                contract,
                context.contract_settlements,
            ));
        }

        if !result.valid {
            tracing::warn!(
                coe = %settlement.coe,
                errors = result.errors.len(),
                "settlement failed validation"
            );
        }
        tracing::debug!(coe = %settlement.coe, summary = %result.summary(), "validated");

        result
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settlement::{Ctg, DocumentCtg, DocumentDeduction, SettlementDocument, SettlementParser};

    fn ctg(number: &str, kg: f64, factor: Option<f64>) -> DocumentCtg {
        DocumentCtg {
            number: number.to_string(),
            quantity_kg: kg,
            factor,
            ..Default::default()
        }
    }

    fn settlement(coe: &str, quantity: f64, ctgs: Vec<DocumentCtg>) -> Settlement {
        let doc = SettlementDocument {
            coe: coe.to_string(),
            date: Some("01/03/2024".to_string()),
            operation_type: "Compraventa".to_string(),
            product: "Soja".to_string(),
            quantity_kg: Some(quantity),
            price_per_ton: Some(300000.0),
            subtotal: Some(quantity / 1000.0 * 300000.0),
            ctgs,
            ..Default::default()
        };
        SettlementParser::new().parse(&doc).0
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_ctg_sum_over_tolerance_is_error() {
        let s = settlement(
            "1",
            30160.0,
            vec![ctg("10100000001", 15000.0, None), ctg("10100000002", 15161.5, None)],
        );
        let result = SettlementValidator::new().check_ctg_consistency(&s);
        assert!(!result.valid);
        let finding = &result.errors[0];
        assert_eq!(finding.error_type, ValidationErrorType::CtgQuantityMismatch);
        assert!((finding.difference.unwrap() - 1.5).abs() < 1e-6);
    }

    #[test]
    fn test_ctg_sum_within_tolerance() {
        let s = settlement(
            "1",
            30160.0,
            vec![ctg("10100000001", 15000.0, None), ctg("10100000002", 15160.05, None)],
        );
        let result = SettlementValidator::new().check_ctg_consistency(&s);
        assert!(result.valid);
        assert!(!result.has(ValidationErrorType::CtgQuantityMismatch));
    }

    #[test]
    fn test_duplicate_ctg_is_error() {
        let s = settlement(
            "1",
            60000.0,
            vec![ctg("10100000001", 30000.0, None), ctg("10100000001", 30000.0, None)],
        );
        let result = SettlementValidator::new().check_ctg_consistency(&s);
        assert!(!result.valid);
        assert!(result.has(ValidationErrorType::DuplicateCtg));
    }

    #[test]
    fn test_ctg_out_of_range_is_only_warning() {
        let s = settlement(
            "1",
            52000.0,
            vec![ctg("10100000001", 12000.0, None), ctg("10100000002", 40000.0, None)],
        );
        let result = SettlementValidator::new().check_ctg_consistency(&s);
        assert!(result.valid);
        let out_of_range = result
            .warnings
            .iter()
            .filter(|w| w.error_type == ValidationErrorType::CtgOutOfRange)
            .count();
        assert_eq!(out_of_range, 2);
    }

    #[test]
    fn test_differing_factors_is_info() {
        let s = settlement(
            "1",
            60000.0,
            vec![ctg("10100000001", 30000.0, Some(99.0)), ctg("10100000002", 30000.0, Some(100.5))],
        );
        let result = SettlementValidator::new().check_ctg_consistency(&s);
        assert!(result.valid);
        let info = result
            .warnings
            .iter()
            .find(|w| w.error_type == ValidationErrorType::CtgFactorMismatch)
            .unwrap();
        assert_eq!(info.severity, Severity::Info);
    }

    #[test]
    fn test_contract_amount() {
        let validator = SettlementValidator::new();
        let first = settlement("1", 30000.0, Vec::new()); // $9,000,000
        let second = settlement("2", 30000.0, Vec::new());

        let exact = Contract {
            number: "C-1".to_string(),
            expected_amount: 18_000_000.0,
        };
        let result = validator.check_contract_amount(&second, &exact, std::slice::from_ref(&first));
        assert!(result.valid);
        assert!(result.warnings.is_empty());

        let close = Contract {
            number: "C-1".to_string(),
            expected_amount: 18_050_000.0,
        };
        let result = validator.check_contract_amount(&second, &close, std::slice::from_ref(&first));
        assert!(result.valid);
        assert_eq!(result.warnings[0].severity, Severity::Info);

        let far = Contract {
            number: "C-1".to_string(),
            expected_amount: 18_100_000.0,
        };
        let result = validator.check_contract_amount(&second, &far, std::slice::from_ref(&first));
        assert!(!result.valid);
    }

    #[test]
    fn test_contract_counts_settlement_once() {
        let validator = SettlementValidator::new();
        let s = settlement("1", 30000.0, Vec::new());
        let contract = Contract {
            number: "C-1".to_string(),
            expected_amount: 9_000_000.0,
        };
        let result = validator.check_contract_amount(&s, &contract, std::slice::from_ref(&s));
        assert!(result.valid);
        assert!(result.warnings.is_empty());
    }

    fn partial() -> Settlement {
        let doc = SettlementDocument {
            coe: "330212345678".to_string(),
            date: Some("01/03/2024".to_string()),
            operation_type: "Compraventa".to_string(),
            product: "Soja".to_string(),
            quantity_kg: Some(30000.0),
            price_per_ton: Some(300000.0),
            subtotal: Some(9_000_000.0),
            net_amount: Some(8_100_000.0),
            deductions: vec![DocumentDeduction {
                concept: "Retención".to_string(),
                detail: "a cobrar en final".to_string(),
                amount: 900_000.0,
                ..Default::default()
            }],
            ..Default::default()
        };
        SettlementParser::new().parse(&doc).0
    }

    fn final_with_net(net: f64) -> Settlement {
        let doc = SettlementDocument {
            coe: "330287654321".to_string(),
            date: Some("20/04/2024".to_string()),
            operation_type: "Compraventa".to_string(),
            product: "Soja".to_string(),
            quantity_kg: Some(0.0),
            subtotal: Some(net),
            net_amount: Some(net),
            original_coe: Some("330212345678".to_string()),
            ..Default::default()
        };
        SettlementParser::new().parse(&doc).0
    }

    #[test]
    fn test_pending_final_messages_and_cadence() {
        let validator = SettlementValidator::new();
        let p = partial();
        assert_eq!(p.settlement_type, SettlementType::Partial);

        let early = validator.pending_final_status(&p, date(2024, 3, 11)).unwrap();
        assert_eq!(early.days_elapsed, 10);
        assert!(!early.overdue);
        assert_eq!(early.message, "Final settlement expected within 20 days");

        // 1 March + 31 days = 1 April: first overdue day
        let first = validator.pending_final_status(&p, date(2024, 4, 1)).unwrap();
        assert_eq!(first.days_overdue, 1);
        assert!(first.should_notify);
        assert_eq!(first.message, "Final settlement overdue by 1 days");

        let quiet = validator.pending_final_status(&p, date(2024, 4, 2)).unwrap();
        assert!(!quiet.should_notify);

        let again = validator.pending_final_status(&p, date(2024, 4, 16)).unwrap();
        assert_eq!(again.days_overdue, 16);
        assert!(again.should_notify);

        let result = validator.check_pending_final(&p, date(2024, 4, 16));
        assert!(result.valid);
        assert_eq!(result.warnings[0].severity, Severity::Warning);
    }

    #[test]
    fn test_pending_final_only_for_partial() {
        let validator = SettlementValidator::new();
        let unique = settlement("1", 30000.0, Vec::new());
        assert!(validator.pending_final_status(&unique, date(2025, 1, 1)).is_none());
    }

    #[test]
    fn test_partial_final_sum() {
        let validator = SettlementValidator::new();
        let p = partial();

        let exact = final_with_net(900_000.0);
        let result = validator.check_partial_final(&exact, &p);
        assert!(result.valid);
        assert!(result.warnings.is_empty());

        // Tolerance = min(1% of 9,000,000, 100,000) = 90,000
        let close = final_with_net(850_000.0);
        let result = validator.check_partial_final(&close, &p);
        assert!(result.valid);
        assert_eq!(result.warnings[0].severity, Severity::Info);

        let far = final_with_net(700_000.0);
        let result = validator.check_partial_final(&far, &p);
        assert!(!result.valid);
        assert!(result.has(ValidationErrorType::PartialFinalMismatch));
    }

    #[test]
    fn test_price_breakdown_mismatch_is_warning() {
        let mut s = settlement("1", 30000.0, Vec::new());
        if let Some(b) = s.price_breakdown.as_mut() {
            b.stated_net_price = Some(1.0);
            b.calculation_matches = false;
        }
        let result = SettlementValidator::new().check_price_breakdown(&s);
        assert!(result.valid);
        assert!(result.has(ValidationErrorType::PriceBreakdownMismatch));
    }

    #[test]
    fn test_duplicate_coes() {
        let validator = SettlementValidator::new();
        let a = settlement("1", 30000.0, Vec::new());
        let b = settlement("1", 20000.0, Vec::new());
        let c = settlement("2", 20000.0, Vec::new());

        let result = validator.check_duplicate_coes(&[a.clone(), b, c.clone()]);
        assert!(!result.valid);
        assert_eq!(result.errors.len(), 1);

        assert!(!validator.check_duplicate_coe(&a, std::slice::from_ref(&a)).valid);
        assert!(validator.check_duplicate_coe(&a, std::slice::from_ref(&c)).valid);
    }

    #[test]
    fn test_validate_all_composes() {
        let validator = SettlementValidator::new();
        let p = partial();
        let f = final_with_net(700_000.0);
        let context = ValidationContext {
            linked_partial: Some(&p),
            ..Default::default()
        };
        let result = validator.validate_all(&f, &context, date(2024, 4, 20));
        assert!(!result.valid);
        assert!(result.has(ValidationErrorType::PartialFinalMismatch));

        let ok = settlement("9", 30000.0, vec![ctg("10100000001", 30000.0, Some(100.0))]);
        let result = validator.validate_all(&ok, &ValidationContext::default(), date(2024, 3, 2));
        assert!(result.valid);
        assert!(result.errors.is_empty());
    }

    #[test]
    fn test_custom_config_from_json() {
        let config: ValidatorConfig =
            serde_json::from_str(r#"{"ctg_sum_tolerance": 5.0}"#).unwrap();
        assert_eq!(config.ctg_sum_tolerance, 5.0);
        assert_eq!(config.contract_tolerance, 100_000.0);

        let s = settlement(
            "1",
            30160.0,
            vec![ctg("10100000001", 15000.0, None), ctg("10100000002", 15161.5, None)],
        );
        let result = SettlementValidator::with_config(config).check_ctg_consistency(&s);
        assert!(result.valid);
    }

    #[test]
    fn test_ctg_struct_roundtrips_through_settlement() {
        let s = settlement("1", 30000.0, vec![ctg("10112345678", 30000.0, Some(99.5))]);
        let c: &Ctg = &s.ctgs[0];
        assert_eq!(c.quantity_tons, 30.0);
        assert!(c.is_within_range);
    }
}
