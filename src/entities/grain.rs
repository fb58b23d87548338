// 🌾 Grain Entity - canonical grain catalogue
//
// "SOJA", "Soja", "Soybean" → all the same grain.
// The CPE parser only accepts grains and subtypes listed here; free-text
// grain names never make it into a ParsedCpe.

use crate::text::fold;
use serde::{Deserialize, Serialize};

// ============================================================================
// GRAIN TYPE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrainType {
    TrigoPan,
    TrigoCandeal,
    Maiz,
    Soja,
    Girasol,
    Sorgo,
    CebadaForrajera,
    CebadaCervecera,
}

impl GrainType {
    pub const ALL: [GrainType; 8] = [
        GrainType::TrigoPan,
        GrainType::TrigoCandeal,
        GrainType::Maiz,
        GrainType::Soja,
        GrainType::Girasol,
        GrainType::Sorgo,
        GrainType::CebadaForrajera,
        GrainType::CebadaCervecera,
    ];

    /// Canonical name as printed on CPEs and settlements
    pub fn name(&self) -> &'static str {
        match self {
            GrainType::TrigoPan => "Trigo Pan",
            GrainType::TrigoCandeal => "Trigo Candeal",
            GrainType::Maiz => "Maíz",
            GrainType::Soja => "Soja",
            GrainType::Girasol => "Girasol",
            GrainType::Sorgo => "Sorgo",
            GrainType::CebadaForrajera => "Cebada Forrajera",
            GrainType::CebadaCervecera => "Cebada Cervecera",
        }
    }

    /// Alternative spellings (already folded: lowercase, no accents)
    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            GrainType::TrigoPan => &["trigo pan", "trigo", "wheat"],
            GrainType::TrigoCandeal => &["trigo candeal", "candeal", "durum"],
            GrainType::Maiz => &["maiz", "maize", "corn"],
            GrainType::Soja => &["soja", "soybean", "soy", "poroto de soja"],
            GrainType::Girasol => &["girasol", "sunflower"],
            GrainType::Sorgo => &["sorgo", "sorgo granifero", "sorghum"],
            GrainType::CebadaForrajera => &["cebada forrajera", "cebada"],
            GrainType::CebadaCervecera => &["cebada cervecera", "malting barley"],
        }
    }

    /// Subtypes accepted by the CPE parser for this grain
    pub fn subtypes(&self) -> &'static [&'static str] {
        match self {
            GrainType::TrigoPan => &["Duro", "Semiduro", "Blando"],
            GrainType::TrigoCandeal => &["Candeal"],
            GrainType::Maiz => &["Dentado", "Flint", "Colorado", "Pisingallo", "Blanco"],
            GrainType::Soja => &["Convencional", "No GMO", "Alto Proteico"],
            GrainType::Girasol => &["Alto Oleico", "Confitero", "Tradicional"],
            GrainType::Sorgo => &["Alto Tanino", "Bajo Tanino"],
            GrainType::CebadaForrajera => &["Forrajera"],
            GrainType::CebadaCervecera => &["Cervecera"],
        }
    }

    /// Resolve a grain from free text.
    ///
    /// Exact alias match first; otherwise the longest alias contained in the
    /// text wins, so "TRIGO CANDEAL" is never read as plain "trigo".
    pub fn from_name(text: &str) -> Option<GrainType> {
        let folded = fold(text.trim());
        if folded.is_empty() {
            return None;
        }

        if let Some(grain) = GrainType::ALL
            .iter()
            .find(|g| g.aliases().iter().any(|a| *a == folded))
        {
            return Some(*grain);
        }

        GrainType::ALL
            .iter()
            .flat_map(|g| g.aliases().iter().map(move |a| (*g, *a)))
            .filter(|(_, alias)| contains_word(&folded, alias))
            .max_by_key(|(_, alias)| alias.len())
            .map(|(g, _)| g)
    }

    /// Find a known subtype of this grain mentioned in the text
    pub fn match_subtype(&self, text: &str) -> Option<&'static str> {
        let folded = fold(text);
        self.subtypes()
            .iter()
            .filter(|s| contains_word(&folded, &fold(s)))
            .max_by_key(|s| s.len())
            .copied()
    }
}

impl std::fmt::Display for GrainType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Substring match that respects word boundaries on both ends
fn contains_word(haystack: &str, needle: &str) -> bool {
    haystack.match_indices(needle).any(|(pos, _)| {
        let before_ok = haystack[..pos]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_alphanumeric());
        let after_ok = haystack[pos + needle.len()..]
            .chars()
            .next()
            .map_or(true, |c| !c.is_alphanumeric());
        before_ok && after_ok
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_name_exact_aliases() {
        assert_eq!(GrainType::from_name("SOJA"), Some(GrainType::Soja));
        assert_eq!(GrainType::from_name("Maíz"), Some(GrainType::Maiz));
        assert_eq!(GrainType::from_name("Trigo Pan"), Some(GrainType::TrigoPan));
        assert_eq!(GrainType::from_name("sunflower"), Some(GrainType::Girasol));
    }

    #[test]
    fn test_from_name_prefers_longest_alias() {
        assert_eq!(
            GrainType::from_name("TRIGO CANDEAL COSECHA 23/24"),
            Some(GrainType::TrigoCandeal)
        );
        assert_eq!(
            GrainType::from_name("Cebada Cervecera"),
            Some(GrainType::CebadaCervecera)
        );
    }

    #[test]
    fn test_from_name_rejects_unknown() {
        assert_eq!(GrainType::from_name("Arroz"), None);
        assert_eq!(GrainType::from_name(""), None);
        // "sojas" is not "soja"
        assert_eq!(GrainType::from_name("sojas"), None);
    }

    #[test]
    fn test_match_subtype() {
        assert_eq!(GrainType::Maiz.match_subtype("Tipo: FLINT"), Some("Flint"));
        assert_eq!(GrainType::Girasol.match_subtype("alto oleico"), Some("Alto Oleico"));
        assert_eq!(GrainType::Soja.match_subtype("Flint"), None);
    }

    #[test]
    fn test_display_uses_canonical_name() {
        assert_eq!(GrainType::Maiz.to_string(), "Maíz");
    }
}
