use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};

use crate::llm::SourceRef;
use crate::profile::{OrgProfile, ProfileFragment, ProfileStatus, Sector};
use crate::report::types::{
    AuditVerdict, GrantOpportunity, GrantReport, OpportunityType, DEFAULT_ADVICE, DEFAULT_SUMMARY,
};

static JSON_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)```json").unwrap());
// The model regularly emits **key**: instead of "key": inside otherwise
// valid JSON. Repair it before handing the text to serde.
static BOLD_KEY: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*([a-zA-Z0-9_]+)\*\*:").unwrap());

/// Extracts a JSON object from model output that may be wrapped in markdown
/// fences, surrounded by narrative text, or shaped as a top-level array.
///
/// The ladder: strip fences, try the substring from the first `{` to the last
/// `}`, then fall back to the first `[`..last `]` (rejecting bare URL lists)
/// and wrap a recovered array as `{"opportunities": [...]}`. Anything else is
/// unusable.
pub fn clean_and_parse_json(text: &str) -> Option<Value> {
    let cleaned = JSON_FENCE.replace_all(text, "");
    let cleaned = cleaned.replace("```", "");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return None;
    }

    if let (Some(first), Some(last)) = (cleaned.find('{'), cleaned.rfind('}')) {
        if last > first {
            if let Some(value) = try_parse(&cleaned[first..=last]) {
                return Some(value);
            }
        }
    }

    if let (Some(first), Some(last)) = (cleaned.find('['), cleaned.rfind(']')) {
        if last > first {
            let potential = &cleaned[first..=last];
            let inside = potential[1..potential.len() - 1].trim();
            // A bracketed URL list is the model citing sources, not a report.
            if !inside.to_lowercase().starts_with("http") {
                if let Some(Value::Array(items)) = try_parse(potential) {
                    if let Some(first_item) = items.first() {
                        if first_item
                            .get("opportunities")
                            .map(|v| !v.is_null())
                            .unwrap_or(false)
                        {
                            return Some(first_item.clone());
                        }
                    }
                    return Some(json!({ "opportunities": items }));
                }
            }
        }
    }

    None
}

fn try_parse(candidate: &str) -> Option<Value> {
    let fixed = BOLD_KEY.replace_all(candidate, "\"$1\":");
    serde_json::from_str(fixed.as_ref()).ok()
}

/// Coerces a parsed response into a report, substituting the French defaults
/// for missing narrative fields. The camelCase keys are the ones the prompt
/// dictates.
pub fn parse_report(value: &Value, profile: &OrgProfile, sources: Vec<SourceRef>) -> GrantReport {
    let opportunities = value
        .get("opportunities")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(parse_opportunity).collect())
        .unwrap_or_default();

    GrantReport {
        executive_summary: value
            .get("executiveSummary")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_SUMMARY)
            .to_string(),
        opportunities,
        strategic_advice: value
            .get("strategicAdvice")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_ADVICE)
            .to_string(),
        sources,
        generated_at: Utc::now().to_rfc3339(),
        profile_name: value
            .get("profileName")
            .and_then(Value::as_str)
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&profile.name)
            .to_string(),
    }
}

/// Parse a single opportunity object. Non-object entries are dropped; every
/// field inside an object is individually defaulted.
fn parse_opportunity(item: &Value) -> Option<GrantOpportunity> {
    if !item.is_object() {
        return None;
    }

    let field = |key: &str| {
        item.get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
            .to_string()
    };

    Some(GrantOpportunity {
        title: field("title"),
        provider: field("provider"),
        deadline: field("deadline"),
        deadline_date: field("deadlineDate"),
        relevance_score: coerce_score(item.get("relevanceScore")),
        relevance_reason: field("relevanceReason"),
        opportunity_type: item
            .get("type")
            .and_then(Value::as_str)
            .map(OpportunityType::from)
            .unwrap_or(OpportunityType::Other),
        url: field("url"),
    })
}

/// Accepts integers, floats, or numeric strings; clamps to 0-100. Missing or
/// non-numeric scores land on 50, the neutral middle.
fn coerce_score(value: Option<&Value>) -> u8 {
    let score = match value {
        Some(v) => match v.as_f64() {
            Some(f) => f,
            None => match v.as_str().and_then(|s| s.trim().parse::<f64>().ok()) {
                Some(f) => f,
                None => return 50,
            },
        },
        None => return 50,
    };
    score.round().clamp(0.0, 100.0) as u8
}

/// Coerces an enrichment response into a profile fragment. Empty strings
/// count as absent so a failed lookup never clobbers user-entered fields;
/// unknown sector labels fold to `Autre`.
pub fn parse_profile_fragment(value: &Value) -> ProfileFragment {
    let field = |key: &str| {
        value
            .get(key)
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    };

    ProfileFragment {
        enterprise_number: None,
        name: field("name"),
        website: field("website"),
        region: field("region"),
        description: field("description"),
        sector: Some(
            value
                .get("sector")
                .and_then(Value::as_str)
                .map(Sector::from)
                .unwrap_or(Sector::Other),
        ),
        status: Some(ProfileStatus::Enriched),
    }
}

/// Reads the reviewer's answer. A leading APPROVED (any case) approves; the
/// refine JSON demands another pass. An answer that is neither must not block
/// the report, so it approves too.
pub fn parse_audit_verdict(text: &str) -> AuditVerdict {
    let trimmed = text.trim();
    if trimmed.to_uppercase().starts_with("APPROVED") {
        return AuditVerdict::Approved;
    }

    if let Some(value) = clean_and_parse_json(trimmed) {
        let is_refine = value
            .get("verdict")
            .and_then(Value::as_str)
            .map(|v| v.eq_ignore_ascii_case("refine"))
            .unwrap_or(false);
        if is_refine {
            let corrections = value
                .get("corrections")
                .and_then(Value::as_str)
                .filter(|c| !c.trim().is_empty())
                .unwrap_or("Vérifie chaque organisme, chaque URL et chaque date limite du rapport précédent.")
                .to_string();
            return AuditVerdict::Refine(corrections);
        }
    }

    AuditVerdict::Approved
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_fenced_json() {
        let text = "```json\n{\"executiveSummary\": \"Voilà !\"}\n```";
        let value = clean_and_parse_json(text).unwrap();
        assert_eq!(value["executiveSummary"], "Voilà !");
    }

    #[test]
    fn test_parses_object_inside_narrative() {
        let text = "Bien sûr ! Voici le rapport demandé : {\"opportunities\": []} J'espère que ça aide.";
        let value = clean_and_parse_json(text).unwrap();
        assert!(value["opportunities"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_repairs_bold_keys() {
        let text = r#"{**executiveSummary**: "ok", **opportunities**: []}"#;
        let value = clean_and_parse_json(text).unwrap();
        assert_eq!(value["executiveSummary"], "ok");
    }

    #[test]
    fn test_wraps_top_level_array() {
        let text = r#"[{"title": "Prime Impulsion", "provider": "SPW"}, {"title": "Prime Énergie", "provider": "SPW"}]"#;
        let value = clean_and_parse_json(text).unwrap();
        assert_eq!(value["opportunities"][0]["title"], "Prime Impulsion");
        assert_eq!(value["opportunities"][1]["title"], "Prime Énergie");
    }

    #[test]
    fn test_unwraps_array_of_reports() {
        let text = r#"[{"opportunities": [{"title": "A"}], "executiveSummary": "s"}, {"opportunities": [], "executiveSummary": "t"}]"#;
        let value = clean_and_parse_json(text).unwrap();
        assert_eq!(value["executiveSummary"], "s");
        assert_eq!(value["opportunities"][0]["title"], "A");
    }

    #[test]
    fn test_rejects_bare_url_list() {
        let text = "[https://example.be/aides, https://example.be/primes]";
        assert!(clean_and_parse_json(text).is_none());
    }

    #[test]
    fn test_rejects_plain_narrative() {
        assert!(clean_and_parse_json("Je n'ai rien trouvé, désolée !").is_none());
        assert!(clean_and_parse_json("").is_none());
    }

    fn test_profile() -> OrgProfile {
        OrgProfile {
            name: "Les Amis du Parc".to_string(),
            description: "Protection des espaces verts bruxellois.".to_string(),
            ..OrgProfile::default()
        }
    }

    #[test]
    fn test_parse_report_defaults() {
        let report = parse_report(&json!({}), &test_profile(), Vec::new());
        assert_eq!(report.executive_summary, DEFAULT_SUMMARY);
        assert_eq!(report.strategic_advice, DEFAULT_ADVICE);
        assert_eq!(report.profile_name, "Les Amis du Parc");
        assert!(report.opportunities.is_empty());
    }

    #[test]
    fn test_parse_report_coerces_opportunities() {
        let value = json!({
            "opportunities": [
                {
                    "title": "Appel à projets 2026",
                    "provider": "Fondation Roi Baudouin",
                    "relevanceScore": "87.6",
                    "type": "Appel à projets",
                    "url": "https://kbs-frb.be/fr/appel"
                },
                { "title": "Sans score", "relevanceScore": 140 },
                "pas un objet"
            ]
        });
        let report = parse_report(&value, &test_profile(), Vec::new());
        assert_eq!(report.opportunities.len(), 2);
        assert_eq!(report.opportunities[0].relevance_score, 88);
        assert_eq!(
            report.opportunities[0].opportunity_type,
            OpportunityType::CallForProjects
        );
        assert_eq!(report.opportunities[1].relevance_score, 100);
        assert_eq!(report.opportunities[1].opportunity_type, OpportunityType::Other);
    }

    #[test]
    fn test_coerce_score_fallbacks() {
        assert_eq!(coerce_score(None), 50);
        assert_eq!(coerce_score(Some(&json!("n/a"))), 50);
        assert_eq!(coerce_score(Some(&json!(-10))), 0);
        assert_eq!(coerce_score(Some(&json!(62))), 62);
    }

    #[test]
    fn test_parse_profile_fragment() {
        let value = json!({
            "name": "  Ligue Royale Belge pour la Protection des Oiseaux  ",
            "website": "",
            "region": "Bruxelles",
            "sector": "Bien-être Animal"
        });
        let fragment = parse_profile_fragment(&value);
        assert_eq!(
            fragment.name.as_deref(),
            Some("Ligue Royale Belge pour la Protection des Oiseaux")
        );
        assert_eq!(fragment.website, None);
        assert_eq!(fragment.sector, Some(Sector::AnimalWelfare));
        assert_eq!(fragment.status, Some(ProfileStatus::Enriched));
    }

    #[test]
    fn test_parse_profile_fragment_unknown_sector() {
        let fragment = parse_profile_fragment(&json!({ "sector": "Agriculture" }));
        assert_eq!(fragment.sector, Some(Sector::Other));
    }

    #[test]
    fn test_audit_verdict_approved() {
        assert_eq!(parse_audit_verdict("APPROVED"), AuditVerdict::Approved);
        assert_eq!(parse_audit_verdict("  approved."), AuditVerdict::Approved);
    }

    #[test]
    fn test_audit_verdict_refine() {
        let text = r#"{"verdict": "refine", "corrections": "L'URL du point 2 renvoie une 404."}"#;
        assert_eq!(
            parse_audit_verdict(text),
            AuditVerdict::Refine("L'URL du point 2 renvoie une 404.".to_string())
        );
    }

    #[test]
    fn test_audit_verdict_fenced_refine() {
        let text = "```json\n{\"verdict\": \"REFINE\", \"corrections\": \"Dates dépassées.\"}\n```";
        assert_eq!(
            parse_audit_verdict(text),
            AuditVerdict::Refine("Dates dépassées.".to_string())
        );
    }

    #[test]
    fn test_audit_verdict_garbage_approves() {
        assert_eq!(
            parse_audit_verdict("Je pense que le rapport est correct."),
            AuditVerdict::Approved
        );
        assert_eq!(parse_audit_verdict(""), AuditVerdict::Approved);
    }
}
