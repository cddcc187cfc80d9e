use serde::{Deserialize, Serialize};
use std::fmt;

/// Activity sector of an organization. The variants carry the French wire
/// labels the model is prompted with and answers in; anything the model
/// invents outside this list folds to `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sector {
    #[serde(rename = "Action Sociale")]
    Social,
    #[serde(rename = "Culture & Arts")]
    Culture,
    #[serde(rename = "Environnement & Durable")]
    Environment,
    #[serde(rename = "Sport & Loisirs")]
    Sport,
    #[serde(rename = "Éducation & Jeunesse")]
    Education,
    #[serde(rename = "Santé & Bien-être")]
    Health,
    #[serde(rename = "Technologie & Numérique")]
    Technology,
    #[serde(rename = "Aide Internationale (Humanitaire)")]
    International,
    #[serde(rename = "Bien-être Animal")]
    AnimalWelfare,
    #[serde(rename = "Citoyenneté & Démocratie")]
    Civic,
    #[serde(rename = "Économie Sociale & Emploi")]
    SocialEconomy,
    #[serde(rename = "Logement & Habitat")]
    Housing,
    #[serde(rename = "Patrimoine & Histoire")]
    Heritage,
    #[serde(rename = "Recherche & Science")]
    Science,
    #[serde(rename = "Justice & Droits")]
    Justice,
    #[serde(rename = "Autre")]
    Other,
}

impl Sector {
    pub fn label(&self) -> &'static str {
        match self {
            Sector::Social => "Action Sociale",
            Sector::Culture => "Culture & Arts",
            Sector::Environment => "Environnement & Durable",
            Sector::Sport => "Sport & Loisirs",
            Sector::Education => "Éducation & Jeunesse",
            Sector::Health => "Santé & Bien-être",
            Sector::Technology => "Technologie & Numérique",
            Sector::International => "Aide Internationale (Humanitaire)",
            Sector::AnimalWelfare => "Bien-être Animal",
            Sector::Civic => "Citoyenneté & Démocratie",
            Sector::SocialEconomy => "Économie Sociale & Emploi",
            Sector::Housing => "Logement & Habitat",
            Sector::Heritage => "Patrimoine & Histoire",
            Sector::Science => "Recherche & Science",
            Sector::Justice => "Justice & Droits",
            Sector::Other => "Autre",
        }
    }

    pub fn all() -> &'static [Sector] {
        &[
            Sector::Social,
            Sector::Culture,
            Sector::Environment,
            Sector::Sport,
            Sector::Education,
            Sector::Health,
            Sector::Technology,
            Sector::International,
            Sector::AnimalWelfare,
            Sector::Civic,
            Sector::SocialEconomy,
            Sector::Housing,
            Sector::Heritage,
            Sector::Science,
            Sector::Justice,
            Sector::Other,
        ]
    }

    /// Comma-separated label list, injected into enrichment prompts so the
    /// model picks from the closed set.
    pub fn label_list() -> String {
        Sector::all()
            .iter()
            .map(|s| s.label())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for Sector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl From<&str> for Sector {
    fn from(s: &str) -> Self {
        let trimmed = s.trim();
        for sector in Sector::all() {
            if sector.label() == trimmed {
                return *sector;
            }
        }
        Sector::Other
    }
}

/// Search strategy: `Fast` narrows to official portals, `Deep` widens to
/// press and foundations. Deep is the recommended default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Fast,
    #[default]
    Deep,
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchMode::Fast => write!(f, "fast"),
            SearchMode::Deep => write!(f, "deep"),
        }
    }
}

impl From<&str> for SearchMode {
    fn from(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "fast" => SearchMode::Fast,
            _ => SearchMode::Deep,
        }
    }
}

/// Whether a profile was auto-filled from a registry lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProfileStatus {
    #[default]
    Base,
    Enriched,
    Error,
}

/// Organization profile submitted for a grant search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrgProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enterprise_number: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    pub sector: Sector,
    #[serde(default = "default_region")]
    pub region: String,
    pub description: String,
    #[serde(default = "default_budget")]
    pub budget: String,
    #[serde(default)]
    pub search_mode: SearchMode,
}

fn default_region() -> String {
    "Belgique (Fédéral)".to_string()
}

fn default_budget() -> String {
    "< 50k€".to_string()
}

impl Default for OrgProfile {
    fn default() -> Self {
        OrgProfile {
            enterprise_number: None,
            name: String::new(),
            website: None,
            sector: Sector::Social,
            region: default_region(),
            budget: default_budget(),
            description: String::new(),
            search_mode: SearchMode::default(),
        }
    }
}

/// Partial profile returned by a registry enrichment lookup. Everything is
/// optional; callers merge what came back over the current draft.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileFragment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enterprise_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sector: Option<Sector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ProfileStatus>,
}

impl ProfileFragment {
    /// Fallback fragment when a registry lookup fails entirely.
    pub fn degraded(query: &str) -> Self {
        ProfileFragment {
            enterprise_number: Some(query.trim().to_string()),
            name: Some("ASBL NON ENRICHIE".to_string()),
            website: Some("Non disponible".to_string()),
            region: Some("Non défini".to_string()),
            description: Some("L'enrichissement IA a échoué.".to_string()),
            sector: Some(Sector::Other),
            status: Some(ProfileStatus::Base),
        }
    }
}

/// Strips dots, spaces and a leading BE prefix from a BCE/KBO enterprise
/// number, keeping digits only.
pub fn normalize_enterprise_number(raw: &str) -> String {
    let trimmed = raw.trim();
    let without_prefix = trimmed
        .strip_prefix("BE")
        .or_else(|| trimmed.strip_prefix("be"))
        .unwrap_or(trimmed);
    without_prefix.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Validates a BCE/KBO enterprise number: ten digits, leading 0 or 1, and the
/// last two digits equal 97 minus the first eight digits modulo 97.
pub fn is_valid_enterprise_number(raw: &str) -> bool {
    let digits = normalize_enterprise_number(raw);
    if digits.len() != 10 || !(digits.starts_with('0') || digits.starts_with('1')) {
        return false;
    }
    let number: u64 = match digits.parse() {
        Ok(n) => n,
        Err(_) => return false,
    };
    let body = number / 100;
    let check = number % 100;
    97 - (body % 97) == check
}

/// Formats a valid enterprise number in the registry's dotted notation
/// (0123.456.789). Returns `None` when the input does not validate.
pub fn format_enterprise_number(raw: &str) -> Option<String> {
    if !is_valid_enterprise_number(raw) {
        return None;
    }
    let digits = normalize_enterprise_number(raw);
    Some(format!(
        "{}.{}.{}",
        &digits[0..4],
        &digits[4..7],
        &digits[7..10]
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sector_from_label() {
        assert_eq!(Sector::from("Culture & Arts"), Sector::Culture);
        assert_eq!(Sector::from("  Action Sociale "), Sector::Social);
        assert_eq!(Sector::from("Éducation & Jeunesse"), Sector::Education);
    }

    #[test]
    fn test_sector_fallback_to_other() {
        assert_eq!(Sector::from("Pêche sportive"), Sector::Other);
        assert_eq!(Sector::from(""), Sector::Other);
        // Close but not exact: the wire contract is the closed label set
        assert_eq!(Sector::from("culture & arts"), Sector::Other);
    }

    #[test]
    fn test_sector_serde_roundtrip() {
        let json = serde_json::to_string(&Sector::SocialEconomy).unwrap();
        assert_eq!(json, "\"Économie Sociale & Emploi\"");
        let back: Sector = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Sector::SocialEconomy);
    }

    #[test]
    fn test_search_mode_defaults_to_deep() {
        assert_eq!(SearchMode::from("fast"), SearchMode::Fast);
        assert_eq!(SearchMode::from("FAST"), SearchMode::Fast);
        assert_eq!(SearchMode::from("unknown"), SearchMode::Deep);
        assert_eq!(SearchMode::default(), SearchMode::Deep);
    }

    #[test]
    fn test_normalize_enterprise_number() {
        assert_eq!(normalize_enterprise_number("0462.920.226"), "0462920226");
        assert_eq!(normalize_enterprise_number("BE 0462 920 226"), "0462920226");
        assert_eq!(normalize_enterprise_number("be0462.920.226"), "0462920226");
    }

    #[test]
    fn test_valid_enterprise_numbers() {
        // Real-format numbers whose mod-97 check digits hold
        assert!(is_valid_enterprise_number("0462.920.226"));
        assert!(is_valid_enterprise_number("0203.201.340"));
        assert!(is_valid_enterprise_number("BE 0462920226"));
    }

    #[test]
    fn test_invalid_enterprise_numbers() {
        assert!(!is_valid_enterprise_number("0123456789")); // bad check digits
        assert!(!is_valid_enterprise_number("9462920226")); // bad leading digit
        assert!(!is_valid_enterprise_number("046292022")); // too short
        assert!(!is_valid_enterprise_number("Les Amis du Parc")); // not a number
    }

    #[test]
    fn test_format_enterprise_number() {
        assert_eq!(
            format_enterprise_number("be0462920226").as_deref(),
            Some("0462.920.226")
        );
        assert_eq!(format_enterprise_number("not a number"), None);
    }

    #[test]
    fn test_profile_defaults() {
        let profile = OrgProfile::default();
        assert_eq!(profile.region, "Belgique (Fédéral)");
        assert_eq!(profile.budget, "< 50k€");
        assert_eq!(profile.search_mode, SearchMode::Deep);
    }

    #[test]
    fn test_profile_deserializes_with_defaults() {
        let json = r#"{
            "name": "Les Amis du Parc",
            "sector": "Environnement & Durable",
            "description": "Protection des espaces verts bruxellois."
        }"#;
        let profile: OrgProfile = serde_json::from_str(json).unwrap();
        assert_eq!(profile.sector, Sector::Environment);
        assert_eq!(profile.region, "Belgique (Fédéral)");
        assert_eq!(profile.search_mode, SearchMode::Deep);
    }
}
