// 🪪 Party Entity - CUIT + name
//
// CUIT is IDENTITY (11 digits, modulo-11 check digit), name is a VALUE
// that varies across documents ("ACA COOP LTDA" vs "A.C.A. Coop. Ltda.").

use crate::text::digits_only;
use serde::{Deserialize, Serialize};

// ============================================================================
// PARTY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Party {
    /// 11 digits, no dashes
    pub cuit: String,
    pub name: String,
}

impl Party {
    /// Create a party, normalising the CUIT to bare digits and trimming the name
    pub fn new(cuit: &str, name: &str) -> Self {
        Party {
            cuit: digits_only(cuit),
            name: name.trim().trim_end_matches(|c: char| c == '-' || c.is_whitespace()).to_string(),
        }
    }

    /// Check digit verification (AFIP modulo 11)
    pub fn has_valid_cuit(&self) -> bool {
        cuit_is_valid(&self.cuit)
    }

    /// "30-71234567-1" style for display
    pub fn formatted_cuit(&self) -> String {
        if self.cuit.len() == 11 && self.cuit.is_ascii() {
            format!("{}-{}-{}", &self.cuit[..2], &self.cuit[2..10], &self.cuit[10..])
        } else {
            self.cuit.clone()
        }
    }
}

const CUIT_WEIGHTS: [u32; 10] = [5, 4, 3, 2, 7, 6, 5, 4, 3, 2];

/// Validate an 11-digit CUIT/CUIL against its check digit
pub fn cuit_is_valid(cuit: &str) -> bool {
    let digits: Vec<u32> = cuit.chars().filter_map(|c| c.to_digit(10)).collect();
    if digits.len() != 11 || cuit.chars().any(|c| !c.is_ascii_digit() && c != '-') {
        return false;
    }

    let sum: u32 = digits[..10]
        .iter()
        .zip(CUIT_WEIGHTS.iter())
        .map(|(d, w)| d * w)
        .sum();

    let expected = match 11 - (sum % 11) {
        11 => 0,
        10 => return false,
        n => n,
    };

    digits[10] == expected
}

// ============================================================================
// PARTY ROLE
// ============================================================================

/// Roles a party can play on a carriage document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartyRole {
    Titular,
    Intermediario,
    RemitenteComercialProductor,
    RemitenteComercialVentaPrimaria,
    RemitenteComercialVentaSecundaria,
    CorredorVentaPrimaria,
    CorredorVentaSecundaria,
    MercadoATermino,
    RepresentanteEntregador,
    RepresentanteRecibidor,
    Destinatario,
    Destino,
    EmpresaTransportista,
    Chofer,
}

impl PartyRole {
    pub const ALL: [PartyRole; 14] = [
        PartyRole::Titular,
        PartyRole::Intermediario,
        PartyRole::RemitenteComercialProductor,
        PartyRole::RemitenteComercialVentaPrimaria,
        PartyRole::RemitenteComercialVentaSecundaria,
        PartyRole::CorredorVentaPrimaria,
        PartyRole::CorredorVentaSecundaria,
        PartyRole::MercadoATermino,
        PartyRole::RepresentanteEntregador,
        PartyRole::RepresentanteRecibidor,
        PartyRole::Destinatario,
        PartyRole::Destino,
        PartyRole::EmpresaTransportista,
        PartyRole::Chofer,
    ];

    /// Label printed next to the party on the CPE
    pub fn label(&self) -> &'static str {
        match self {
            PartyRole::Titular => "Titular Carta de Porte",
            PartyRole::Intermediario => "Intermediario",
            PartyRole::RemitenteComercialProductor => "Remitente Comercial Productor",
            PartyRole::RemitenteComercialVentaPrimaria => "Remitente Comercial Venta Primaria",
            PartyRole::RemitenteComercialVentaSecundaria => "Remitente Comercial Venta Secundaria",
            PartyRole::CorredorVentaPrimaria => "Corredor Venta Primaria",
            PartyRole::CorredorVentaSecundaria => "Corredor Venta Secundaria",
            PartyRole::MercadoATermino => "Mercado a Término",
            PartyRole::RepresentanteEntregador => "Representante Entregador",
            PartyRole::RepresentanteRecibidor => "Representante Recibidor",
            PartyRole::Destinatario => "Destinatario",
            PartyRole::Destino => "Destino",
            PartyRole::EmpresaTransportista => "Empresa Transportista",
            PartyRole::Chofer => "Chofer",
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_normalizes_cuit_and_name() {
        let p = Party::new("30-50012088-2", "  ACA COOP LTDA - ");
        assert_eq!(p.cuit, "30500120882");
        assert_eq!(p.name, "ACA COOP LTDA");
    }

    #[test]
    fn test_valid_cuit_check_digit() {
        // 20-12345678-6: weighted sum 148, 148 % 11 = 5, 11 - 5 = 6
        assert!(cuit_is_valid("20123456786"));
        assert!(cuit_is_valid("20-12345678-6"));
    }

    #[test]
    fn test_invalid_cuit_check_digit() {
        assert!(!cuit_is_valid("20123456781"));
        assert!(!cuit_is_valid("2012345678"));
        assert!(!cuit_is_valid("2012345678X"));
    }

    #[test]
    fn test_formatted_cuit() {
        let p = Party::new("20123456786", "PEREZ JUAN");
        assert_eq!(p.formatted_cuit(), "20-12345678-6");
        assert!(p.has_valid_cuit());
    }

    #[test]
    fn test_formatted_cuit_non_ascii_left_as_is() {
        // 11 bytes, but "é" straddles the 10th byte
        let p: Party =
            serde_json::from_str(r#"{"cuit": "201234567é", "name": "X"}"#).unwrap();
        assert_eq!(p.cuit.len(), 11);
        assert_eq!(p.formatted_cuit(), "201234567é");
        assert!(!p.has_valid_cuit());
    }
}
