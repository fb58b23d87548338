// 🚚 CPE Parser - Carta de Porte Electrónica from extracted text
//
// Every extractor is best-effort: a missing field is a warning and an empty
// value, never a failure. Only an empty document fails the parse.
//
// Weights: the PDF text layer glues gross and tare into one digit run
// followed by the net weight:
//   "4340013240 30160"  →  gross 43400, tare 13240, net 30160
// The split is recovered by trying every cut until gross − tare == net.

use crate::entities::{GrainType, Party, PartyRole};
use crate::text::{document_hash, extract_section, fold, parse_date, parse_number};
use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;

// ============================================================================
// PATTERNS
// ============================================================================

static CPE_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bCPE\b\s*(?:n(?:ro|°|º)?\.?\s*)?:?\s*(\d{4,6}-\d{6,10}|\d{8,14})")
        .expect("valid regex")
});

static CTG_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bCTG\b\s*(?:n(?:ro|°|º)?\.?\s*)?:?\s*(\d{8,14})").expect("valid regex")
});

static ISSUE_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)fecha\s+de\s+emisi[oó]n[^\d\n]{0,10}(\d{1,2}[/-]\d{1,2}[/-]\d{2,4})")
        .expect("valid regex")
});

static DEPARTURE_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)fecha\s+de\s+partida[^\d\n]{0,10}(\d{1,2}[/-]\d{1,2}[/-]\d{2,4})")
        .expect("valid regex")
});

static HARVEST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)cosecha\s*:?\s*(\d{2,4}\s*[/-]\s*\d{2,4})").expect("valid regex")
});

static GRAIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:grano\s*/\s*especie|grano|especie)\s*:\s*([^\n]+)").expect("valid regex")
});

static SUBTYPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:sub)?tipo\s*:\s*([^\n]+)").expect("valid regex"));

/// Gross+tare digit run followed by the net weight
static CONCATENATED_WEIGHTS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{8,12})\s+(\d{4,6})\b").expect("valid regex"));

static GROSS_WEIGHT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)peso\s+bruto[^\d\n]{0,15}([\d.,]+)").expect("valid regex")
});

static TARE_WEIGHT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\btara\b[^\d\n]{0,15}([\d.,]+)").expect("valid regex"));

static NET_WEIGHT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)peso\s+neto[^\d\n]{0,15}([\d.,]+)").expect("valid regex")
});

/// "30712345671 - NOMBRE"
static CUIT_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{11})\s*-\s*([^\n]+)").expect("valid regex"));

static LOCALITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)localidad\s*:?\s*([^\n]+)").expect("valid regex"));

static PROVINCE_TAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s*provincia").expect("valid regex"));

static PROVINCE_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)provincia\s*:?\s*([^\n]+)").expect("valid regex"));

static PLANT_CODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)planta\s*(?:n(?:ro|°|º)?\.?\s*)?:?\s*(\d{2,8})").expect("valid regex")
});

static TRUCK_PLATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:dominio|patente)\s+(?:cami[oó]n|chasis)\s*:?\s*([a-z]{2}\s?\d{3}\s?[a-z]{2}|[a-z]{3}\s?\d{3})")
        .expect("valid regex")
});

static TRAILER_PLATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)acoplado\s*:?\s*([a-z]{2}\s?\d{3}\s?[a-z]{2}|[a-z]{3}\s?\d{3})")
        .expect("valid regex")
});

static KM_TO_TRAVEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)km\.?\s+a\s+recorrer\s*:?\s*([\d.,]+)").expect("valid regex")
});

static FREIGHT_RATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)tarifa[^\d\n]{0,30}([\d.,]+)").expect("valid regex"));

/// One label regex per role, accent-tolerant
static ROLE_LABELS: LazyLock<Vec<(PartyRole, Regex)>> = LazyLock::new(|| {
    PartyRole::ALL
        .iter()
        .map(|role| {
            let pattern = format!(r"(?i)\b{}\b", accent_tolerant(role.label()));
            (*role, Regex::new(&pattern).expect("valid regex"))
        })
        .collect()
});

/// Build a regex fragment that matches the label with or without accents
/// and with any run of whitespace between words
fn accent_tolerant(label: &str) -> String {
    fold(label)
        .chars()
        .map(|c| match c {
            'a' => "[aá]".to_string(),
            'e' => "[eé]".to_string(),
            'i' => "[ií]".to_string(),
            'o' => "[oó]".to_string(),
            'u' => "[uúü]".to_string(),
            'n' => "[nñ]".to_string(),
            ' ' => r"\s+".to_string(),
            other => regex::escape(&other.to_string()),
        })
        .collect()
}

pub const PROVINCES: [&str; 24] = [
    "Buenos Aires",
    "Ciudad Autónoma de Buenos Aires",
    "Catamarca",
    "Chaco",
    "Chubut",
    "Córdoba",
    "Corrientes",
    "Entre Ríos",
    "Formosa",
    "Jujuy",
    "La Pampa",
    "La Rioja",
    "Mendoza",
    "Misiones",
    "Neuquén",
    "Río Negro",
    "Salta",
    "San Juan",
    "San Luis",
    "Santa Cruz",
    "Santa Fe",
    "Santiago del Estero",
    "Tierra del Fuego",
    "Tucumán",
];

/// Parties recovered by the sequential extractor are assigned in this order.
/// Calibrated on the usual CPE layout, not on the labels themselves.
pub const DEFAULT_SEQUENTIAL_ORDER: [PartyRole; 5] = [
    PartyRole::Titular,
    PartyRole::Destinatario,
    PartyRole::Destino,
    PartyRole::EmpresaTransportista,
    PartyRole::Chofer,
];

// ============================================================================
// PARSED RECORD
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightSource {
    /// Recovered from the gross+tare digit run
    Concatenated,
    /// Read from "Peso Bruto / Tara / Peso Neto" labels
    Labeled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Weights {
    pub gross_kg: f64,
    pub tare_kg: f64,
    pub net_kg: f64,
    pub source: WeightSource,
}

impl Weights {
    pub fn is_consistent(&self) -> bool {
        (self.gross_kg - self.tare_kg - self.net_kg).abs() < 0.5
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub province: Option<String>,
    pub locality: Option<String>,
    pub plant_code: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transport {
    pub truck_plate: Option<String>,
    pub trailer_plate: Option<String>,
    pub km_to_travel: Option<f64>,
    pub freight_rate: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedCpe {
    pub cpe_number: Option<String>,
    pub ctg_number: Option<String>,
    pub issue_date: Option<NaiveDate>,
    pub departure_date: Option<NaiveDate>,

    pub parties: BTreeMap<PartyRole, Party>,

    pub grain: Option<GrainType>,
    pub grain_subtype: Option<String>,
    pub harvest: Option<String>,

    pub weights: Option<Weights>,

    pub origin: Location,
    pub destination: Location,
    pub transport: Transport,

    /// SHA-256 of the normalised source text
    pub document_hash: String,
    pub parse_warnings: Vec<String>,
}

impl ParsedCpe {
    pub fn party(&self, role: PartyRole) -> Option<&Party> {
        self.parties.get(&role)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CpeParseResult {
    pub success: bool,
    pub cpe: Option<ParsedCpe>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

// ============================================================================
// WEIGHT RECONSTRUCTION
// ============================================================================

/// Split a gross+tare digit run so that gross − tare == net.
///
/// Cuts are tried left to right from position 3 to len − 3; the first one
/// with gross > tare > 0 that reproduces the net weight wins.
pub fn split_concatenated_weights(digits: &str, net: u64) -> Option<(u64, u64)> {
    if digits.len() < 6 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    (3..=digits.len() - 3).find_map(|i| {
        let gross: u64 = digits[..i].parse().ok()?;
        let tare: u64 = digits[i..].parse().ok()?;
        (gross > tare && tare > 0 && gross - tare == net).then_some((gross, tare))
    })
}

// ============================================================================
// CPE PARSER
// ============================================================================

pub struct CpeParser {
    sequential_order: Vec<PartyRole>,
}

impl Default for CpeParser {
    fn default() -> Self {
        Self::new()
    }
}

impl CpeParser {
    pub fn new() -> Self {
        CpeParser {
            sequential_order: DEFAULT_SEQUENTIAL_ORDER.to_vec(),
        }
    }

    /// Override the positional role order used by the sequential extractor
    pub fn with_sequential_order(mut self, order: Vec<PartyRole>) -> Self {
        self.sequential_order = order;
        self
    }

    /// Parse one CPE. Warnings are local to the call.
    pub fn parse(&self, text: &str) -> CpeParseResult {
        if text.trim().is_empty() {
            return CpeParseResult {
                success: false,
                cpe: None,
                errors: vec!["Empty document text".to_string()],
                warnings: Vec::new(),
            };
        }

        let mut warnings = Vec::new();

        let cpe_number = capture(&CPE_NUMBER, text);
        if cpe_number.is_none() {
            warnings.push("CPE number not found".to_string());
        }

        let ctg_number = capture(&CTG_NUMBER, text);
        if ctg_number.is_none() {
            warnings.push("CTG number not found".to_string());
        }

        let issue_date = self.extract_date(&ISSUE_DATE, text, "Issue date", &mut warnings);
        let departure_date =
            self.extract_date(&DEPARTURE_DATE, text, "Departure date", &mut warnings);

        let parties = self.extract_parties(text, &mut warnings);
        let (grain, grain_subtype) = self.extract_grain(text, &mut warnings);

        let harvest = capture(&HARVEST, text).map(|h| h.split_whitespace().collect::<String>());
        if harvest.is_none() {
            warnings.push("Harvest not found".to_string());
        }

        let weights = self.extract_weights(text, &mut warnings);

        let origin = self.extract_location(
            text,
            "Procedencia",
            Some("Destino de la Mercader"),
            "origin",
            &mut warnings,
        );
        let destination = self.extract_location(
            text,
            "Destino de la Mercader",
            Some("Transporte"),
            "destination",
            &mut warnings,
        );

        let transport = self.extract_transport(text, &mut warnings);

        tracing::debug!(
            cpe = ?cpe_number,
            ctg = ?ctg_number,
            parties = parties.len(),
            warnings = warnings.len(),
            "CPE parsed"
        );

        let cpe = ParsedCpe {
            cpe_number,
            ctg_number,
            issue_date,
            departure_date,
            parties,
            grain,
            grain_subtype,
            harvest,
            weights,
            origin,
            destination,
            transport,
            document_hash: document_hash(text),
            parse_warnings: warnings.clone(),
        };

        CpeParseResult {
            success: true,
            cpe: Some(cpe),
            errors: Vec::new(),
            warnings,
        }
    }

    fn extract_date(
        &self,
        re: &Regex,
        text: &str,
        label: &str,
        warnings: &mut Vec<String>,
    ) -> Option<NaiveDate> {
        let Some(raw) = capture(re, text) else {
            warnings.push(format!("{} not found", label));
            return None;
        };
        let date = parse_date(&raw);
        if date.is_none() {
            warnings.push(format!("{} unreadable: {}", label, raw));
        }
        date
    }

    // ------------------------------------------------------------------------
    // Parties
    // ------------------------------------------------------------------------

    fn extract_parties(
        &self,
        text: &str,
        warnings: &mut Vec<String>,
    ) -> BTreeMap<PartyRole, Party> {
        let lines: Vec<&str> = text.lines().collect();
        let mut parties = BTreeMap::new();

        for (role, label) in ROLE_LABELS.iter() {
            if let Some(party) = find_labeled_party(&lines, label) {
                tracing::debug!(role = ?role, cuit = %party.cuit, "party found by label");
                parties.insert(*role, party);
            }
        }

        let missing: Vec<PartyRole> = self
            .sequential_order
            .iter()
            .copied()
            .filter(|role| !parties.contains_key(role))
            .collect();

        if !missing.is_empty() {
            let mut unlabeled: Vec<Party> = CUIT_NAME
                .captures_iter(text)
                .map(|caps| Party::new(&caps[1], &caps[2]))
                .collect();

            // Each labeled party consumes one occurrence of its CUIT
            for party in parties.values() {
                if let Some(idx) = unlabeled.iter().position(|p| p.cuit == party.cuit) {
                    unlabeled.remove(idx);
                }
            }

            for (position, (role, party)) in missing.iter().zip(unlabeled).enumerate() {
                tracing::warn!(
                    role = ?role,
                    position,
                    cuit = %party.cuit,
                    "party assigned by position"
                );
                warnings.push(format!(
                    "{} assigned by document position ({})",
                    role.label(),
                    party.cuit
                ));
                parties.insert(*role, party);
            }
        }

        if parties.is_empty() {
            warnings.push("No parties found".to_string());
        }

        for (role, party) in &parties {
            if !party.has_valid_cuit() {
                warnings.push(format!(
                    "{}: invalid CUIT check digit ({})",
                    role.label(),
                    party.cuit
                ));
            }
        }

        parties
    }

    // ------------------------------------------------------------------------
    // Grain
    // ------------------------------------------------------------------------

    fn extract_grain(
        &self,
        text: &str,
        warnings: &mut Vec<String>,
    ) -> (Option<GrainType>, Option<String>) {
        let Some(raw) = capture(&GRAIN, text) else {
            warnings.push("Grain not found".to_string());
            return (None, None);
        };

        let Some(grain) = GrainType::from_name(&raw) else {
            warnings.push(format!("Grain not recognised: {}", raw.trim()));
            return (None, None);
        };

        // Subtype either on its own "Tipo:" line or on the grain line itself
        let subtype = capture(&SUBTYPE, text)
            .and_then(|s| grain.match_subtype(&s))
            .or_else(|| grain.match_subtype(&raw))
            .map(str::to_string);

        tracing::debug!(grain = %grain, subtype = ?subtype, "grain found");
        (Some(grain), subtype)
    }

    // ------------------------------------------------------------------------
    // Weights
    // ------------------------------------------------------------------------

    fn extract_weights(&self, text: &str, warnings: &mut Vec<String>) -> Option<Weights> {
        for caps in CONCATENATED_WEIGHTS.captures_iter(text) {
            let Ok(net) = caps[2].parse::<u64>() else {
                continue;
            };
            if let Some((gross, tare)) = split_concatenated_weights(&caps[1], net) {
                tracing::debug!(gross, tare, net, "weights recovered from digit run");
                return Some(Weights {
                    gross_kg: gross as f64,
                    tare_kg: tare as f64,
                    net_kg: net as f64,
                    source: WeightSource::Concatenated,
                });
            }
        }

        tracing::warn!("no concatenated weight run, falling back to labeled weights");

        let gross = capture(&GROSS_WEIGHT, text).and_then(|v| parse_number(&v));
        let tare = capture(&TARE_WEIGHT, text).and_then(|v| parse_number(&v));
        let net = capture(&NET_WEIGHT, text).and_then(|v| parse_number(&v));

        let (gross_kg, tare_kg, net_kg) = match (gross, tare, net) {
            (Some(g), Some(t), Some(n)) => (g, t, n),
            (Some(g), Some(t), None) => {
                warnings.push("Net weight derived from gross − tare".to_string());
                (g, t, g - t)
            }
            (Some(g), None, Some(n)) => {
                warnings.push("Tare derived from gross − net".to_string());
                (g, g - n, n)
            }
            (None, Some(t), Some(n)) => {
                warnings.push("Gross weight derived from tare + net".to_string());
                (t + n, t, n)
            }
            _ => {
                warnings.push("Weights not found".to_string());
                return None;
            }
        };

        let weights = Weights {
            gross_kg,
            tare_kg,
            net_kg,
            source: WeightSource::Labeled,
        };

        if !weights.is_consistent() {
            warnings.push(format!(
                "Weights inconsistent: {} - {} != {}",
                gross_kg, tare_kg, net_kg
            ));
        }

        Some(weights)
    }

    // ------------------------------------------------------------------------
    // Locations and transport
    // ------------------------------------------------------------------------

    fn extract_location(
        &self,
        text: &str,
        start: &str,
        end: Option<&str>,
        which: &str,
        warnings: &mut Vec<String>,
    ) -> Location {
        let Some(section) = extract_section(text, start, end) else {
            warnings.push(format!("No {} section", which));
            return Location::default();
        };

        let province = capture(&PROVINCE_LINE, section)
            .and_then(|line| find_province(&line))
            .or_else(|| find_province(section))
            .map(str::to_string);
        if province.is_none() {
            warnings.push(format!("No known province in {} section", which));
        }

        let locality = capture(&LOCALITY, section).map(|l| clean_locality(&l));
        if locality.is_none() {
            warnings.push(format!("No locality in {} section", which));
        }

        Location {
            province,
            locality,
            plant_code: capture(&PLANT_CODE, section),
        }
    }

    fn extract_transport(&self, text: &str, warnings: &mut Vec<String>) -> Transport {
        let plate = |re: &Regex| {
            capture(re, text).map(|p| p.split_whitespace().collect::<String>().to_uppercase())
        };

        let transport = Transport {
            truck_plate: plate(&TRUCK_PLATE),
            trailer_plate: plate(&TRAILER_PLATE),
            km_to_travel: capture(&KM_TO_TRAVEL, text).and_then(|v| parse_number(&v)),
            freight_rate: capture(&FREIGHT_RATE, text).and_then(|v| parse_number(&v)),
        };

        if transport.truck_plate.is_none() {
            warnings.push("Truck plate not found".to_string());
        }

        transport
    }
}

// ============================================================================
// HELPERS
// ============================================================================

fn capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Label on a line, then "CUIT - Name" after the label or on the next line
fn find_labeled_party(lines: &[&str], label: &Regex) -> Option<Party> {
    lines.iter().enumerate().find_map(|(idx, line)| {
        let m = label.find(line)?;
        CUIT_NAME
            .captures(&line[m.end()..])
            .or_else(|| lines.get(idx + 1).and_then(|next| CUIT_NAME.captures(next)))
            .map(|caps| Party::new(&caps[1], &caps[2]))
    })
}

/// Province from the fixed list, longest name first so that
/// "Ciudad Autónoma de Buenos Aires" wins over "Buenos Aires"
pub fn find_province(text: &str) -> Option<&'static str> {
    let folded = fold(text);
    PROVINCES
        .iter()
        .filter(|p| folded.contains(&fold(p)))
        .max_by_key(|p| p.len())
        .copied()
}

/// Locality value without a trailing "Provincia: ..." on the same line
fn clean_locality(raw: &str) -> String {
    let cut = PROVINCE_TAIL.find(raw).map_or(raw.len(), |m| m.start());
    raw[..cut]
        .trim()
        .trim_end_matches(|c: char| c == '-' || c == ',' || c.is_whitespace())
        .to_string()
}

// ============================================================================
// TESTS
// ============================================================================
