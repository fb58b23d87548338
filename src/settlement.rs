// 🧾 Settlement Parser - classify, link and price a grain settlement (LPG)
//
// Input is the intermediate document an upstream extractor already split
// into fields. Output is a Settlement with:
//   - settlement_type: unique | partial | final | adjustment (inferred)
//   - percentages (partial only), original COE + subtype (final/adjustment)
//   - price breakdown in fixed order:
//       base − commercial discount → × factor/100 → − freight
//
// Warnings come back next to the settlement, never inside the parser.

use crate::entities::{GrainType, Party};
use crate::text::{digits_only, document_hash, fold, parse_date, round_to};
use crate::validation::ValidatorConfig;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::LazyLock;

static ORIGINAL_COE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)COE\s+ORIGINAL\s*:?\s*(\d[\d-]*\d)").expect("valid regex")
});

/// "Parcial: 3302-12345678" → original COE "330212345678"
static PARTIAL_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)Parcial\s*:?\s*(\d+)\s*-\s*(\d+)").expect("valid regex")
});

const PARTIAL_MARKERS: [&str; 2] = ["cobrar en liquid", "a cobrar en final"];

/// Commission share of the commercial discount (1% of base price)
pub const COMMISSION_RATE: f64 = 0.01;

// ============================================================================
// UPSTREAM DOCUMENT
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentDeduction {
    pub concept: String,
    #[serde(default)]
    pub detail: String,
    #[serde(default)]
    pub base_amount: Option<f64>,
    #[serde(default)]
    pub rate: Option<f64>,
    #[serde(default)]
    pub vat_amount: Option<f64>,
    pub amount: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentCtg {
    pub number: String,
    pub quantity_kg: f64,
    #[serde(default)]
    pub grade: Option<String>,
    #[serde(default)]
    pub factor: Option<f64>,
    #[serde(default)]
    pub protein: Option<f64>,
    #[serde(default)]
    pub origin: Option<String>,
}

/// Field-extracted settlement as handed over by the extraction collaborator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettlementDocument {
    pub coe: String,
    pub date: Option<String>,
    pub operation_type: String,

    pub buyer: Option<Party>,
    pub seller: Option<Party>,
    pub broker: Option<Party>,

    pub product: String,
    pub contracted_grade: Option<String>,
    pub delivered_grade: Option<String>,

    /// Absent and zero are different: zero marks final/adjustment documents
    pub quantity_kg: Option<f64>,
    pub price_per_ton: Option<f64>,
    pub subtotal: Option<f64>,
    pub vat_rate: Option<f64>,
    pub vat_amount: Option<f64>,
    pub total_operation: Option<f64>,

    pub deductions: Vec<DocumentDeduction>,
    pub withholdings: Vec<DocumentDeduction>,
    pub ctgs: Vec<DocumentCtg>,

    pub additional_data: String,
    pub original_coe: Option<String>,
    pub contract_number: Option<String>,

    /// Per ton
    pub commercial_discount: Option<f64>,
    pub quality_factor: Option<f64>,
    /// Per ton
    pub freight: Option<f64>,
    pub stated_net_price: Option<f64>,
    pub net_amount: Option<f64>,

    /// Source text, when the extractor keeps it (used for the fingerprint)
    pub raw_text: Option<String>,
}

impl SettlementDocument {
    pub fn from_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settlement document: {}", path.display()))?;
        Self::from_json_str(&content)
            .with_context(|| format!("Failed to parse settlement document: {}", path.display()))
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let doc: SettlementDocument = serde_json::from_str(content)?;
        Ok(doc)
    }
}

// ============================================================================
// SETTLEMENT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementType {
    Unique,
    Partial,
    Final,
    Adjustment,
}

impl SettlementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettlementType::Unique => "unique",
            SettlementType::Partial => "partial",
            SettlementType::Final => "final",
            SettlementType::Adjustment => "adjustment",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentSubtype {
    FinalSettlement,
    QualityBonus,
    QualityDiscount,
    Correction,
    TechnicalAdjustment,
    Other,
}

/// Keyword table, scanned in order: first hit wins
const SUBTYPE_KEYWORDS: [(AdjustmentSubtype, &[&str]); 5] = [
    (
        AdjustmentSubtype::FinalSettlement,
        &["liquidacion final", "ajuste final", "saldo final"],
    ),
    (AdjustmentSubtype::QualityBonus, &["bonificacion", "bonif."]),
    (
        AdjustmentSubtype::QualityDiscount,
        &["rebaja", "descuento por calidad", "merma"],
    ),
    (AdjustmentSubtype::Correction, &["correccion", "rectific", "error"]),
    (
        AdjustmentSubtype::TechnicalAdjustment,
        &["ajuste tecnico", "diferencia de peso", "tecnico"],
    ),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deduction {
    pub concept: String,
    pub detail: String,
    pub base_amount: Option<f64>,
    pub rate: Option<f64>,
    pub vat_amount: Option<f64>,
    pub amount: f64,
}

impl Deduction {
    /// Amount plus its VAT
    pub fn total(&self) -> f64 {
        self.amount.abs() + self.vat_amount.unwrap_or(0.0).abs()
    }

    fn is_retention(&self) -> bool {
        let detail = fold(&self.detail);
        PARTIAL_MARKERS.iter().any(|m| detail.contains(m))
    }
}

impl From<&DocumentDeduction> for Deduction {
    fn from(d: &DocumentDeduction) -> Self {
        Deduction {
            concept: d.concept.trim().to_string(),
            detail: d.detail.trim().to_string(),
            base_amount: d.base_amount,
            rate: d.rate,
            vat_amount: d.vat_amount,
            amount: d.amount,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ctg {
    pub number: String,
    pub quantity_kg: f64,
    pub quantity_tons: f64,
    pub grade: Option<String>,
    pub factor: Option<f64>,
    pub protein: Option<f64>,
    pub origin: Option<String>,
    /// Advisory truck-load policy (15–38 t)
    pub is_within_range: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBreakdown {
    pub base_price: f64,

    pub commercial_discount: f64,
    /// 1% of base price; None when there is no commercial discount
    pub commission: Option<f64>,
    /// Discount beyond the commission; None when not positive
    pub paritarias: Option<f64>,
    pub price_after_commercial: f64,

    pub quality_factor: f64,
    pub price_after_factor: f64,

    pub freight: f64,
    pub net_price: f64,

    pub stated_net_price: Option<f64>,
    pub difference: Option<f64>,
    pub calculation_matches: bool,
}

impl PriceBreakdown {
    /// Three steps, always in this order:
    /// 1. commercial discount, 2. quality factor, 3. freight
    pub fn compute(
        base_price: f64,
        commercial_discount: f64,
        quality_factor: f64,
        freight: f64,
        stated_net_price: Option<f64>,
        tolerance: f64,
    ) -> Self {
        let (commission, paritarias) = if commercial_discount > 0.0 {
            let commission = round_to(base_price * COMMISSION_RATE, 2);
            let remainder = round_to(commercial_discount - commission, 2);
            (Some(commission), (remainder > 0.0).then_some(remainder))
        } else {
            (None, None)
        };

        let price_after_commercial = base_price - commercial_discount;
        let price_after_factor = price_after_commercial * (quality_factor / 100.0);
        let net_price = round_to(price_after_factor - freight, 2);

        let difference = stated_net_price.map(|stated| round_to(net_price - stated, 2));
        let calculation_matches = difference.map_or(true, |d| d.abs() < tolerance);

        PriceBreakdown {
            base_price,
            commercial_discount,
            commission,
            paritarias,
            price_after_commercial: round_to(price_after_commercial, 2),
            quality_factor,
            price_after_factor: round_to(price_after_factor, 2),
            freight,
            net_price,
            stated_net_price,
            difference,
            calculation_matches,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settlement {
    pub coe: String,
    pub settlement_type: SettlementType,
    pub date: Option<NaiveDate>,
    pub operation_type: String,

    pub buyer: Option<Party>,
    pub seller: Option<Party>,
    pub broker: Option<Party>,

    pub product: String,
    pub grain: Option<GrainType>,
    pub contracted_grade: Option<String>,
    pub delivered_grade: Option<String>,

    pub quantity_kg: Option<f64>,
    pub price_per_ton: Option<f64>,
    pub subtotal: Option<f64>,
    pub vat_rate: Option<f64>,
    pub vat_amount: Option<f64>,
    pub total_operation: Option<f64>,

    pub deductions: Vec<Deduction>,
    pub withholdings: Vec<Deduction>,
    pub total_deductions: f64,
    pub total_withholdings: f64,
    pub net_amount: Option<f64>,

    /// Partial only
    pub percentage_liquidated: Option<f64>,
    pub percentage_retained: Option<f64>,

    /// Final / adjustment only
    pub original_coe: Option<String>,
    pub adjustment_subtype: Option<AdjustmentSubtype>,

    pub contract_number: Option<String>,
    pub price_breakdown: Option<PriceBreakdown>,
    pub ctgs: Vec<Ctg>,

    pub is_canje: bool,
    pub is_out_of_grade: bool,

    pub additional_data: String,
    pub document_hash: String,
}

impl Settlement {
    pub fn total_ctg_kg(&self) -> f64 {
        self.ctgs.iter().map(|c| c.quantity_kg).sum()
    }

    pub fn summary(&self) -> String {
        format!(
            "COE {} [{}] {}: {:.0} kg, subtotal ${:.2}, net ${:.2}",
            self.coe,
            self.settlement_type.as_str(),
            self.product,
            self.quantity_kg.unwrap_or(0.0),
            self.subtotal.unwrap_or(0.0),
            self.net_amount.unwrap_or(0.0)
        )
    }
}

// ============================================================================
// CLASSIFICATION
// ============================================================================

/// Total and exclusive settlement-type rule.
///
/// quantity == 0 → adjustment if the operation says "ajuste", else final.
/// quantity > 0  → partial if a deduction is withheld for the final
///                 settlement, else unique.
/// An absent quantity counts as zero.
pub fn infer_settlement_type(
    quantity_kg: Option<f64>,
    operation_type: &str,
    deductions: &[Deduction],
) -> SettlementType {
    let quantity = quantity_kg.unwrap_or(0.0);
    if quantity == 0.0 {
        if fold(operation_type).contains("ajuste") {
            SettlementType::Adjustment
        } else {
            SettlementType::Final
        }
    } else if deductions.iter().any(Deduction::is_retention) {
        SettlementType::Partial
    } else {
        SettlementType::Unique
    }
}

/// First keyword category found in the free text, `Other` otherwise
pub fn classify_adjustment(additional_data: &str) -> AdjustmentSubtype {
    let text = fold(additional_data);
    SUBTYPE_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| text.contains(k)))
        .map(|(subtype, _)| *subtype)
        .unwrap_or(AdjustmentSubtype::Other)
}

/// Original COE from "COE ORIGINAL: N", else "Parcial: A-B" (A and B joined)
pub fn find_original_coe(additional_data: &str) -> Option<String> {
    if let Some(caps) = ORIGINAL_COE.captures(additional_data) {
        return Some(digits_only(&caps[1]));
    }
    PARTIAL_REFERENCE
        .captures(additional_data)
        .map(|caps| format!("{}{}", &caps[1], &caps[2]))
}

pub fn detect_canje(additional_data: &str, vat_amount: Option<f64>) -> bool {
    let text = fold(additional_data);
    text.contains("canje") || text.contains("pago en especie") || vat_amount == Some(0.0)
}

fn is_out_of_grade(delivered_grade: Option<&str>) -> bool {
    delivered_grade
        .map(fold)
        .is_some_and(|g| g.contains("f/e") || g.contains("fuera"))
}

// ============================================================================
// SETTLEMENT PARSER
// ============================================================================

pub struct SettlementParser {
    ctg_min_tons: f64,
    ctg_max_tons: f64,
    price_tolerance: f64,
}

impl Default for SettlementParser {
    fn default() -> Self {
        Self::new()
    }
}

impl SettlementParser {
    pub fn new() -> Self {
        Self::with_config(&ValidatorConfig::default())
    }

    /// CTG weight range and price tolerance come from the validator config,
    /// so the parser flags and the validator findings agree
    pub fn with_config(config: &ValidatorConfig) -> Self {
        SettlementParser {
            ctg_min_tons: config.ctg_min_tons,
            ctg_max_tons: config.ctg_max_tons,
            price_tolerance: config.price_tolerance,
        }
    }

    /// Build a Settlement from the upstream document. Never fails; every
    /// missing or odd field shows up in the returned warnings.
    pub fn parse(&self, doc: &SettlementDocument) -> (Settlement, Vec<String>) {
        let mut warnings = Vec::new();

        if doc.coe.trim().is_empty() {
            warnings.push("COE missing".to_string());
        }

        let date = match doc.date.as_deref() {
            Some(raw) => {
                let parsed = parse_date(raw);
                if parsed.is_none() {
                    warnings.push(format!("Settlement date unreadable: {}", raw));
                }
                parsed
            }
            None => {
                warnings.push("Settlement date missing".to_string());
                None
            }
        };

        let grain = GrainType::from_name(&doc.product);
        if grain.is_none() {
            warnings.push(format!("Product not recognised: {}", doc.product));
        }

        for (label, party) in [
            ("Buyer", &doc.buyer),
            ("Seller", &doc.seller),
            ("Broker", &doc.broker),
        ] {
            if let Some(party) = party {
                if !party.has_valid_cuit() {
                    warnings.push(format!("{}: invalid CUIT check digit ({})", label, party.cuit));
                }
            }
        }

        let deductions: Vec<Deduction> = doc.deductions.iter().map(Deduction::from).collect();
        let withholdings: Vec<Deduction> = doc.withholdings.iter().map(Deduction::from).collect();
        let total_deductions = round_to(deductions.iter().map(Deduction::total).sum(), 2);
        let total_withholdings = round_to(withholdings.iter().map(Deduction::total).sum(), 2);

        // Type
        if doc.quantity_kg.is_none() {
            warnings.push("Quantity missing; treated as zero for classification".to_string());
        }
        let settlement_type =
            infer_settlement_type(doc.quantity_kg, &doc.operation_type, &deductions);

        // Percentages (partial)
        let (percentage_liquidated, percentage_retained) = if settlement_type
            == SettlementType::Partial
        {
            self.percentages(doc.subtotal, &deductions, &mut warnings)
        } else {
            (None, None)
        };

        // Linking (final / adjustment)
        let (original_coe, adjustment_subtype) = match settlement_type {
            SettlementType::Final | SettlementType::Adjustment => {
                let original = doc
                    .original_coe
                    .as_deref()
                    .map(digits_only)
                    .filter(|c| !c.is_empty())
                    .or_else(|| find_original_coe(&doc.additional_data));
                if original.is_none() {
                    warnings.push(format!(
                        "{} settlement without original COE",
                        settlement_type.as_str()
                    ));
                }
                let subtype = (settlement_type == SettlementType::Adjustment)
                    .then(|| classify_adjustment(&doc.additional_data));
                (original, subtype)
            }
            _ => (None, None),
        };

        let ctgs: Vec<Ctg> = doc.ctgs.iter().map(|c| self.ctg(c)).collect();

        let price_breakdown = self.price_breakdown(doc, &ctgs, &mut warnings);

        let net_amount = match doc.net_amount {
            Some(net) => Some(net),
            None => doc.subtotal.map(|subtotal| {
                warnings.push("Net amount derived from subtotal − deductions − withholdings".to_string());
                round_to(subtotal - total_deductions - total_withholdings, 2)
            }),
        };

        let hash_source = match &doc.raw_text {
            Some(text) => text.clone(),
            None => serde_json::to_string(doc).unwrap_or_default(),
        };

        let settlement = Settlement {
            coe: digits_only(&doc.coe),
            settlement_type,
            date,
            operation_type: doc.operation_type.trim().to_string(),
            buyer: doc.buyer.clone(),
            seller: doc.seller.clone(),
            broker: doc.broker.clone(),
            product: doc.product.trim().to_string(),
            grain,
            contracted_grade: doc.contracted_grade.clone(),
            delivered_grade: doc.delivered_grade.clone(),
            quantity_kg: doc.quantity_kg,
            price_per_ton: doc.price_per_ton,
            subtotal: doc.subtotal,
            vat_rate: doc.vat_rate,
            vat_amount: doc.vat_amount,
            total_operation: doc.total_operation,
            deductions,
            withholdings,
            total_deductions,
            total_withholdings,
            net_amount,
            percentage_liquidated,
            percentage_retained,
            original_coe,
            adjustment_subtype,
            contract_number: doc.contract_number.clone(),
            price_breakdown,
            ctgs,
            is_canje: detect_canje(&doc.additional_data, doc.vat_amount),
            is_out_of_grade: is_out_of_grade(doc.delivered_grade.as_deref()),
            additional_data: doc.additional_data.clone(),
            document_hash: document_hash(&hash_source),
        };

        tracing::debug!(
            coe = %settlement.coe,
            settlement_type = settlement.settlement_type.as_str(),
            ctgs = settlement.ctgs.len(),
            warnings = warnings.len(),
            "settlement parsed"
        );

        (settlement, warnings)
    }

    fn percentages(
        &self,
        subtotal: Option<f64>,
        deductions: &[Deduction],
        warnings: &mut Vec<String>,
    ) -> (Option<f64>, Option<f64>) {
        let Some(retention) = deductions.iter().find(|d| d.is_retention()) else {
            return (None, None);
        };
        match subtotal {
            Some(subtotal) if subtotal > 0.0 => {
                let retained = round_to(retention.amount.abs() / subtotal * 100.0, 1);
                (Some(round_to(100.0 - retained, 1)), Some(retained))
            }
            _ => {
                warnings.push("Partial settlement without subtotal; percentages unknown".to_string());
                (None, None)
            }
        }
    }

    fn ctg(&self, c: &DocumentCtg) -> Ctg {
        let tons = c.quantity_kg / 1000.0;
        Ctg {
            number: digits_only(&c.number),
            quantity_kg: c.quantity_kg,
            quantity_tons: round_to(tons, 3),
            grade: c.grade.clone(),
            factor: c.factor,
            protein: c.protein,
            origin: c.origin.clone(),
            is_within_range: tons >= self.ctg_min_tons && tons <= self.ctg_max_tons,
        }
    }

    /// Factor for the breakdown: stated on the document, else the kg-weighted
    /// mean of CTG factors, else 100
    fn breakdown_factor(doc: &SettlementDocument, ctgs: &[Ctg]) -> f64 {
        if let Some(factor) = doc.quality_factor {
            return factor;
        }
        let (weighted, kg) = ctgs
            .iter()
            .filter_map(|c| c.factor.map(|f| (f * c.quantity_kg, c.quantity_kg)))
            .fold((0.0, 0.0), |(w, k), (fw, fk)| (w + fw, k + fk));
        if kg > 0.0 {
            round_to(weighted / kg, 3)
        } else {
            100.0
        }
    }

    fn price_breakdown(
        &self,
        doc: &SettlementDocument,
        ctgs: &[Ctg],
        warnings: &mut Vec<String>,
    ) -> Option<PriceBreakdown> {
        let Some(base_price) = doc.price_per_ton else {
            warnings.push("Price per ton missing; no price breakdown".to_string());
            return None;
        };

        let breakdown = PriceBreakdown::compute(
            base_price,
            doc.commercial_discount.unwrap_or(0.0),
            Self::breakdown_factor(doc, ctgs),
            doc.freight.unwrap_or(0.0),
            doc.stated_net_price,
            self.price_tolerance,
        );

        if !breakdown.calculation_matches {
            tracing::warn!(
                coe = %doc.coe,
                computed = breakdown.net_price,
                stated = ?breakdown.stated_net_price,
                "net price does not match document"
            );
        }

        Some(breakdown)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn deduction(concept: &str, detail: &str, amount: f64) -> DocumentDeduction {
        DocumentDeduction {
            concept: concept.to_string(),
            detail: detail.to_string(),
            amount,
            ..Default::default()
        }
    }

    fn partial_doc() -> SettlementDocument {
        SettlementDocument {
            coe: "330212345678".to_string(),
            date: Some("20/03/2024".to_string()),
            operation_type: "Compraventa".to_string(),
            buyer: Some(Party::new("30587654322", "EXPORTADORA PAMPA S.A.")),
            seller: Some(Party::new("30712345671", "AGROPECUARIA LOS ALAMOS S.A.")),
            product: "Soja".to_string(),
            quantity_kg: Some(30160.0),
            price_per_ton: Some(300000.0),
            subtotal: Some(9048000.0),
            vat_rate: Some(10.5),
            vat_amount: Some(950040.0),
            deductions: vec![
                deduction("Comisión", "", 90480.0),
                deduction("Retención", "10% a cobrar en final", 904800.0),
            ],
            ctgs: vec![DocumentCtg {
                number: "10112345678".to_string(),
                quantity_kg: 30160.0,
                factor: Some(99.0),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_type_inference_is_total() {
        let none: Vec<Deduction> = Vec::new();
        let retention = vec![Deduction::from(&deduction("Ret", "A cobrar en final", 1.0))];

        assert_eq!(
            infer_settlement_type(Some(0.0), "Ajuste Parcial", &none),
            SettlementType::Adjustment
        );
        assert_eq!(
            infer_settlement_type(Some(0.0), "Compraventa", &none),
            SettlementType::Final
        );
        assert_eq!(
            infer_settlement_type(Some(30160.0), "Compraventa", &retention),
            SettlementType::Partial
        );
        assert_eq!(
            infer_settlement_type(Some(30160.0), "Compraventa", &none),
            SettlementType::Unique
        );
        assert_eq!(
            infer_settlement_type(None, "AJUSTE", &none),
            SettlementType::Adjustment
        );
    }

    #[test]
    fn test_partial_marker_in_liquidation_wording() {
        let retention = vec![Deduction::from(&deduction(
            "Retención",
            "Monto a cobrar en liquidación final",
            1.0,
        ))];
        assert_eq!(
            infer_settlement_type(Some(1000.0), "", &retention),
            SettlementType::Partial
        );
    }

    #[test]
    fn test_partial_percentages() {
        let (settlement, _) = SettlementParser::new().parse(&partial_doc());
        assert_eq!(settlement.settlement_type, SettlementType::Partial);
        assert_eq!(settlement.percentage_retained, Some(10.0));
        assert_eq!(settlement.percentage_liquidated, Some(90.0));
        assert!(settlement.original_coe.is_none());
    }

    #[test]
    fn test_unique_has_no_percentages() {
        let mut doc = partial_doc();
        doc.deductions.truncate(1);
        let (settlement, _) = SettlementParser::new().parse(&doc);
        assert_eq!(settlement.settlement_type, SettlementType::Unique);
        assert!(settlement.percentage_retained.is_none());
    }

    #[test]
    fn test_original_coe_linking() {
        assert_eq!(
            find_original_coe("COE ORIGINAL: 3302-12345678"),
            Some("330212345678".to_string())
        );
        assert_eq!(
            find_original_coe("Liquida saldo. Parcial: 3302-12345678"),
            Some("330212345678".to_string())
        );
        assert_eq!(find_original_coe("sin referencia"), None);
    }

    #[test]
    fn test_final_settlement_links_original() {
        let doc = SettlementDocument {
            coe: "330287654321".to_string(),
            date: Some("15/05/2024".to_string()),
            operation_type: "Compraventa".to_string(),
            product: "Soja".to_string(),
            quantity_kg: Some(0.0),
            subtotal: Some(904800.0),
            additional_data: "COE ORIGINAL: 330212345678".to_string(),
            ..Default::default()
        };
        let (settlement, _) = SettlementParser::new().parse(&doc);
        assert_eq!(settlement.settlement_type, SettlementType::Final);
        assert_eq!(settlement.original_coe.as_deref(), Some("330212345678"));
        assert!(settlement.adjustment_subtype.is_none());
    }

    #[test]
    fn test_adjustment_subtype_first_keyword_wins() {
        assert_eq!(
            classify_adjustment("Bonificación por calidad, corrección de precio"),
            AdjustmentSubtype::QualityBonus
        );
        assert_eq!(
            classify_adjustment("Rebaja por humedad"),
            AdjustmentSubtype::QualityDiscount
        );
        assert_eq!(
            classify_adjustment("Diferencia de peso en destino"),
            AdjustmentSubtype::TechnicalAdjustment
        );
        assert_eq!(
            classify_adjustment("Corrección de precio"),
            AdjustmentSubtype::Correction
        );
        assert_eq!(
            classify_adjustment("Liquidación final del contrato"),
            AdjustmentSubtype::FinalSettlement
        );
        assert_eq!(classify_adjustment("varios"), AdjustmentSubtype::Other);
    }

    #[test]
    fn test_adjustment_subtype_table_order_beats_text_order() {
        // correction appears first in the text, final settlement ranks first
        assert_eq!(
            classify_adjustment("Rectificación de factura, saldo final del contrato"),
            AdjustmentSubtype::FinalSettlement
        );
        assert_eq!(
            classify_adjustment("Error de carga, ajuste técnico por diferencia de peso"),
            AdjustmentSubtype::Correction
        );
    }

    #[test]
    fn test_canje_detection() {
        assert!(detect_canje("Operación de CANJE por fertilizante", Some(100.0)));
        assert!(detect_canje("Pago en especie", None));
        assert!(detect_canje("", Some(0.0)));
        assert!(!detect_canje("", Some(10.5)));
        assert!(!detect_canje("", None));
    }

    #[test]
    fn test_out_of_grade() {
        assert!(is_out_of_grade(Some("F/E")));
        assert!(is_out_of_grade(Some("Fuera de estándar")));
        assert!(!is_out_of_grade(Some("G2")));
        assert!(!is_out_of_grade(None));
    }

    #[test]
    fn test_price_breakdown_fixed_order() {
        let b = PriceBreakdown::compute(300000.0, 6000.0, 98.0, 15000.0, None, 1.0);
        assert_eq!(b.commission, Some(3000.0));
        assert_eq!(b.paritarias, Some(3000.0));
        assert_eq!(b.price_after_commercial, 294000.0);
        assert_eq!(b.price_after_factor, 288120.0);
        assert_eq!(b.net_price, 273120.0);

        // Freight before factor gives a different number: order matters
        let swapped = (300000.0 - 6000.0 - 15000.0) * 0.98;
        assert!((b.net_price - swapped).abs() > 1.0);
    }

    #[test]
    fn test_paritarias_null_when_discount_is_only_commission() {
        let b = PriceBreakdown::compute(300000.0, 3000.0, 100.0, 0.0, None, 1.0);
        assert_eq!(b.commission, Some(3000.0));
        assert_eq!(b.paritarias, None);

        let none = PriceBreakdown::compute(300000.0, 0.0, 100.0, 0.0, None, 1.0);
        assert_eq!(none.commission, None);
        assert_eq!(none.paritarias, None);
    }

    #[test]
    fn test_calculation_matches_tolerance() {
        let ok = PriceBreakdown::compute(300000.0, 0.0, 100.0, 0.0, Some(299999.5), 1.0);
        assert!(ok.calculation_matches);
        let off = PriceBreakdown::compute(300000.0, 0.0, 100.0, 0.0, Some(299998.0), 1.0);
        assert!(!off.calculation_matches);
    }

    #[test]
    fn test_breakdown_factor_from_ctgs() {
        let mut doc = partial_doc();
        doc.ctgs = vec![
            DocumentCtg {
                number: "1".to_string(),
                quantity_kg: 10000.0,
                factor: Some(98.0),
                ..Default::default()
            },
            DocumentCtg {
                number: "2".to_string(),
                quantity_kg: 30000.0,
                factor: Some(100.0),
                ..Default::default()
            },
        ];
        let (settlement, _) = SettlementParser::new().parse(&doc);
        assert_eq!(settlement.price_breakdown.unwrap().quality_factor, 99.5);

        doc.quality_factor = Some(101.0);
        let (settlement, _) = SettlementParser::new().parse(&doc);
        assert_eq!(settlement.price_breakdown.unwrap().quality_factor, 101.0);
    }

    #[test]
    fn test_ctg_range_policy() {
        let mut doc = partial_doc();
        doc.ctgs = vec![
            DocumentCtg {
                number: "1".to_string(),
                quantity_kg: 12000.0,
                ..Default::default()
            },
            DocumentCtg {
                number: "2".to_string(),
                quantity_kg: 30000.0,
                ..Default::default()
            },
        ];
        let (settlement, _) = SettlementParser::new().parse(&doc);
        assert!(!settlement.ctgs[0].is_within_range);
        assert!(settlement.ctgs[1].is_within_range);
    }

    #[test]
    fn test_parser_follows_validator_config() {
        let config = ValidatorConfig {
            ctg_min_tons: 10.0,
            price_tolerance: 0.001,
            ..Default::default()
        };
        let mut doc = partial_doc();
        doc.ctgs = vec![DocumentCtg {
            number: "1".to_string(),
            quantity_kg: 12000.0,
            ..Default::default()
        }];
        let (settlement, _) = SettlementParser::with_config(&config).parse(&doc);
        assert!(settlement.ctgs[0].is_within_range);

        let strict = PriceBreakdown::compute(300000.0, 0.0, 100.0, 0.0, Some(299999.99), config.price_tolerance);
        assert!(!strict.calculation_matches);
    }

    #[test]
    fn test_net_amount_fallback() {
        let (settlement, warnings) = SettlementParser::new().parse(&partial_doc());
        // 9,048,000 − 90,480 − 904,800
        assert_eq!(settlement.net_amount, Some(8052720.0));
        assert!(warnings.iter().any(|w| w.contains("Net amount derived")));
    }

    #[test]
    fn test_missing_quantity_is_warning() {
        let doc = SettlementDocument {
            coe: "1".to_string(),
            operation_type: "Compraventa".to_string(),
            ..Default::default()
        };
        let (settlement, warnings) = SettlementParser::new().parse(&doc);
        assert_eq!(settlement.settlement_type, SettlementType::Final);
        assert!(settlement.quantity_kg.is_none());
        assert!(warnings.iter().any(|w| w.contains("Quantity missing")));
    }

    #[test]
    fn test_from_json_str() {
        let json = r#"{
            "coe": "330212345678",
            "date": "20/03/2024",
            "operation_type": "Compraventa",
            "product": "Soja",
            "quantity_kg": 30160,
            "price_per_ton": 300000,
            "subtotal": 9048000,
            "deductions": [{"concept": "Comisión", "amount": 90480}]
        }"#;
        let doc = SettlementDocument::from_json_str(json).unwrap();
        assert_eq!(doc.quantity_kg, Some(30160.0));
        let (settlement, _) = SettlementParser::new().parse(&doc);
        assert_eq!(settlement.settlement_type, SettlementType::Unique);
        assert_eq!(settlement.grain, Some(GrainType::Soja));
        assert_eq!(settlement.date, NaiveDate::from_ymd_opt(2024, 3, 20));
    }
}
