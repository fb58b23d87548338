// End-to-end: CPE text → quality → settlement → validation

use chrono::NaiveDate;
use grain_settlement::quality::QualityAnalysis;
use grain_settlement::settlement::{DocumentCtg, DocumentDeduction};
use grain_settlement::{
    AnalysisField, CpeParser, GrainType, Party, PartyRole, QualityCalculationEngine,
    SettlementDocument, SettlementParser, SettlementType, SettlementValidator,
    ValidationContext, ValidationErrorType, WeightSource,
};

const CPE_TEXT: &str = "\
CARTA DE PORTE ELECTRÓNICA - GRANOS
CPE N°: 10101-00012345
CTG: 10112345678
Fecha de emisión: 15/03/2024
Fecha de partida: 16/03/2024

Titular Carta de Porte
30712345671 - AGROPECUARIA LOS ALAMOS S.A.
Destinatario: 30587654322 - EXPORTADORA PAMPA S.A.

GRANO / ESPECIE: SOJA
Cosecha: 23/24

Peso Bruto - Tara    Peso Neto
4340013240 30160

PROCEDENCIA DE LA MERCADERÍA
Localidad: PERGAMINO
Provincia: BUENOS AIRES

DESTINO DE LA MERCADERÍA
Localidad: TIMBUES
Provincia: SANTA FE

DATOS DEL TRANSPORTE
Chofer: 20301112220 - PEREZ JUAN CARLOS
Dominio Camión: AB123CD
";

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[test]
fn test_cpe_to_validated_settlement() {
    // 1. CPE
    let parsed = CpeParser::new().parse(CPE_TEXT);
    assert!(parsed.success);
    let cpe = parsed.cpe.unwrap();
    let ctg_number = cpe.ctg_number.clone().unwrap();
    let weights = cpe.weights.clone().unwrap();
    assert_eq!(weights.source, WeightSource::Concatenated);
    assert_eq!(weights.net_kg, 30160.0);
    assert_eq!(cpe.grain, Some(GrainType::Soja));
    assert_eq!(
        cpe.party(PartyRole::Titular).map(|p| p.cuit.as_str()),
        Some("30712345671")
    );
    // the driver is labeled, so it never fills the unlabeled destination role
    assert_eq!(cpe.party(PartyRole::Destino), None);

    // 2. Quality for the lot carried by that CPE
    let analysis = QualityAnalysis::new(&ctg_number, cpe.grain.unwrap().name())
        .with(AnalysisField::Humidity, 13.0)
        .with(AnalysisField::BrokenGrains, 27.0)
        .with(AnalysisField::ForeignMatter, 0.8);
    let engine = QualityCalculationEngine::with_defaults();
    let quality = engine.calculate(&analysis, weights.net_kg).unwrap();
    assert!((quality.final_factor - 97.75).abs() < 1e-9);
    assert!(!quality.moisture.requires_drying);

    // 3. Partial settlement covering the CTG
    let subtotal = 30160.0 / 1000.0 * 300000.0;
    let doc = SettlementDocument {
        coe: "330212345678".to_string(),
        date: Some("20/03/2024".to_string()),
        operation_type: "Compraventa".to_string(),
        buyer: Some(Party::new("30587654322", "EXPORTADORA PAMPA S.A.")),
        seller: cpe.party(PartyRole::Titular).cloned(),
        product: "Soja".to_string(),
        quantity_kg: Some(weights.net_kg),
        price_per_ton: Some(300000.0),
        subtotal: Some(subtotal),
        vat_amount: Some(subtotal * 0.105),
        deductions: vec![DocumentDeduction {
            concept: "Retención".to_string(),
            detail: "10% a cobrar en final".to_string(),
            amount: subtotal * 0.10,
            ..Default::default()
        }],
        ctgs: vec![DocumentCtg {
            number: ctg_number.clone(),
            quantity_kg: weights.net_kg,
            factor: Some(quality.final_factor),
            ..Default::default()
        }],
        ..Default::default()
    };
    let (settlement, _) = SettlementParser::new().parse(&doc);
    assert_eq!(settlement.settlement_type, SettlementType::Partial);
    assert_eq!(settlement.percentage_retained, Some(10.0));

    let breakdown = settlement.price_breakdown.clone().unwrap();
    assert_eq!(breakdown.quality_factor, 97.75);
    assert_eq!(breakdown.net_price, 293250.0);

    // 4. Validation: consistent CTGs, final not yet overdue
    let validator = SettlementValidator::new();
    let result = validator.validate_all(&settlement, &ValidationContext::default(), date(2024, 3, 30));
    assert!(result.valid, "{:?}", result.errors);
    assert!(result.has(ValidationErrorType::PendingFinal));

    // ... and overdue two months later
    let status = validator
        .pending_final_status(&settlement, date(2024, 5, 20))
        .unwrap();
    assert!(status.overdue);
}

#[test]
fn test_ctg_mismatch_blocks_settlement() {
    let doc = SettlementDocument {
        coe: "330200000001".to_string(),
        date: Some("01/04/2024".to_string()),
        operation_type: "Compraventa".to_string(),
        product: "Maíz".to_string(),
        quantity_kg: Some(30160.0),
        price_per_ton: Some(200000.0),
        subtotal: Some(6032000.0),
        ctgs: vec![
            DocumentCtg {
                number: "10100000001".to_string(),
                quantity_kg: 15000.0,
                ..Default::default()
            },
            DocumentCtg {
                number: "10100000002".to_string(),
                quantity_kg: 15161.5,
                ..Default::default()
            },
        ],
        ..Default::default()
    };
    let (settlement, _) = SettlementParser::new().parse(&doc);
    assert_eq!(settlement.settlement_type, SettlementType::Unique);

    let result = SettlementValidator::new().validate_all(
        &settlement,
        &ValidationContext::default(),
        date(2024, 4, 2),
    );
    assert!(!result.valid);
    assert!(result.has(ValidationErrorType::CtgQuantityMismatch));
}

#[test]
fn test_unknown_product_surfaces_as_error() {
    let analysis = QualityAnalysis::new("10100000001", "Arroz");
    let engine = QualityCalculationEngine::with_defaults();
    let err = engine.calculate(&analysis, 30000.0).unwrap_err();
    assert!(err.to_string().contains("Arroz"));
}
