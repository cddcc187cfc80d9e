use chrono::NaiveDate;
use strsim::jaro_winkler;
use tracing::debug;
use unicode_normalization::UnicodeNormalization;
use url::Url;
use urlnorm::UrlNormalizer;

use crate::report::types::{GrantOpportunity, GrantReport, DEADLINE_SENTINEL};

const TITLE_SIMILARITY_THRESHOLD: f64 = 0.90;

/// Filters and orders a parsed report: drops untitled, expired, and
/// unverifiable entries, deduplicates near-identical ones, canonicalizes
/// deadline dates, and sorts by relevance.
pub fn normalize_report(mut report: GrantReport, today: NaiveDate) -> GrantReport {
    let normalizer = UrlNormalizer::default();
    let incoming = std::mem::take(&mut report.opportunities);
    let total = incoming.len();

    let mut kept: Vec<(String, GrantOpportunity)> = Vec::new();
    for mut opportunity in incoming {
        if opportunity.title.is_empty() {
            debug!("Dropping untitled opportunity");
            continue;
        }

        match parse_deadline(&opportunity.deadline_date) {
            Some(date) if date < today => {
                debug!(
                    "Dropping expired opportunity '{}' (deadline {})",
                    opportunity.title, date
                );
                continue;
            }
            Some(date) => {
                opportunity.deadline_date = date.format("%Y-%m-%d").to_string();
            }
            None => {
                opportunity.deadline_date = DEADLINE_SENTINEL.to_string();
            }
        }

        // An entry the model cannot tie to a real page is treated as
        // fabricated and dropped.
        let url_key = match normalize_url(&normalizer, &opportunity.url) {
            Some(key) => key,
            None => {
                debug!(
                    "Dropping opportunity '{}' without a usable URL",
                    opportunity.title
                );
                continue;
            }
        };

        let duplicate_of = kept.iter().position(|(existing_key, existing)| {
            existing_key == &url_key || is_near_duplicate(existing, &opportunity)
        });
        match duplicate_of {
            Some(index) => {
                if opportunity.relevance_score > kept[index].1.relevance_score {
                    kept[index] = (url_key, opportunity);
                }
            }
            None => kept.push((url_key, opportunity)),
        }
    }

    report.opportunities = kept.into_iter().map(|(_, opportunity)| opportunity).collect();
    report.opportunities.sort_by(|a, b| {
        b.relevance_score
            .cmp(&a.relevance_score)
            .then_with(|| a.deadline_date.cmp(&b.deadline_date))
    });

    debug!(
        "Normalized report: kept {} of {} opportunities",
        report.opportunities.len(),
        total
    );
    report
}

/// Earliest deadline across a report's opportunities, used for the "most
/// urgent first" ordering. Reports with only rolling deadlines sort last.
pub fn earliest_deadline(report: &GrantReport) -> &str {
    report
        .opportunities
        .iter()
        .map(|opportunity| opportunity.deadline_date.as_str())
        .min()
        .unwrap_or(DEADLINE_SENTINEL)
}

/// Accepts ISO dates, RFC 3339 timestamps (date prefix), and the day-first
/// forms the model slips into.
fn parse_deadline(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Some(date);
    }
    if let Some(prefix) = trimmed.get(..10) {
        if let Ok(date) = NaiveDate::parse_from_str(prefix, "%Y-%m-%d") {
            return Some(date);
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%d/%m/%Y") {
        return Some(date);
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%d-%m-%Y") {
        return Some(date);
    }
    None
}

/// Normalization string for duplicate detection. Only http(s) URLs qualify.
fn normalize_url(normalizer: &UrlNormalizer, raw: &str) -> Option<String> {
    let parsed = Url::parse(raw.trim()).ok()?;
    match parsed.scheme() {
        "http" | "https" => Some(normalizer.compute_normalization_string(&parsed)),
        _ => None,
    }
}

fn is_near_duplicate(a: &GrantOpportunity, b: &GrantOpportunity) -> bool {
    let provider_a = fold_for_match(&a.provider);
    if provider_a.is_empty() || provider_a != fold_for_match(&b.provider) {
        return false;
    }
    jaro_winkler(&fold_for_match(&a.title), &fold_for_match(&b.title))
        >= TITLE_SIMILARITY_THRESHOLD
}

/// Case, accent, and punctuation fold for fuzzy comparison.
fn fold_for_match(text: &str) -> String {
    text.nfkd()
        .collect::<String>()
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::types::OpportunityType;

    fn opportunity(title: &str, provider: &str, deadline_date: &str, score: u8, url: &str) -> GrantOpportunity {
        GrantOpportunity {
            title: title.to_string(),
            provider: provider.to_string(),
            deadline: String::new(),
            deadline_date: deadline_date.to_string(),
            relevance_score: score,
            relevance_reason: String::new(),
            opportunity_type: OpportunityType::Subsidy,
            url: url.to_string(),
        }
    }

    fn report_with(opportunities: Vec<GrantOpportunity>) -> GrantReport {
        GrantReport {
            executive_summary: String::new(),
            opportunities,
            strategic_advice: String::new(),
            sources: Vec::new(),
            generated_at: String::new(),
            profile_name: String::new(),
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, 15).unwrap()
    }

    #[test]
    fn test_drops_untitled_expired_and_unlinked() {
        let report = report_with(vec![
            opportunity("", "SPW", "2026-06-01", 90, "https://spw.be/a"),
            opportunity("Expirée", "SPW", "2025-12-31", 90, "https://spw.be/b"),
            opportunity("Sans lien", "SPW", "2026-06-01", 90, ""),
            opportunity("Lien ftp", "SPW", "2026-06-01", 90, "ftp://spw.be/c"),
            opportunity("Valide", "SPW", "2026-06-01", 90, "https://spw.be/d"),
        ]);
        let normalized = normalize_report(report, today());
        assert_eq!(normalized.opportunities.len(), 1);
        assert_eq!(normalized.opportunities[0].title, "Valide");
    }

    #[test]
    fn test_deadline_canonicalization() {
        let report = report_with(vec![
            opportunity("Iso", "A", "2026-03-15", 80, "https://a.be/1"),
            opportunity("Rfc", "B", "2026-03-16T00:00:00Z", 70, "https://b.be/2"),
            opportunity("Jour d'abord", "C", "17/03/2026", 60, "https://c.be/3"),
            opportunity("Inconnue", "D", "En continu", 50, "https://d.be/4"),
        ]);
        let normalized = normalize_report(report, today());
        let dates: Vec<&str> = normalized
            .opportunities
            .iter()
            .map(|o| o.deadline_date.as_str())
            .collect();
        assert_eq!(dates, vec!["2026-03-15", "2026-03-16", "2026-03-17", DEADLINE_SENTINEL]);
    }

    #[test]
    fn test_sentinel_deadline_is_never_expired() {
        let report = report_with(vec![opportunity(
            "En continu",
            "SPW",
            "",
            50,
            "https://spw.be/continu",
        )]);
        let normalized = normalize_report(report, today());
        assert_eq!(normalized.opportunities.len(), 1);
        assert_eq!(normalized.opportunities[0].deadline_date, DEADLINE_SENTINEL);
    }

    #[test]
    fn test_deduplicates_by_url_keeping_higher_score() {
        let report = report_with(vec![
            opportunity("Prime A", "SPW", "2026-06-01", 70, "https://SPW.be/prime"),
            opportunity("Prime A bis", "Autre", "2026-06-01", 85, "https://spw.be/prime"),
        ]);
        let normalized = normalize_report(report, today());
        assert_eq!(normalized.opportunities.len(), 1);
        assert_eq!(normalized.opportunities[0].relevance_score, 85);
    }

    #[test]
    fn test_deduplicates_by_provider_and_similar_title() {
        let report = report_with(vec![
            opportunity(
                "Appel à projets Quartiers Verts",
                "Fondation Roi Baudouin",
                "2026-06-01",
                80,
                "https://kbs-frb.be/fr/quartiers-verts",
            ),
            opportunity(
                "Appel à Projets Quartiers Verts 2026",
                "fondation roi baudouin",
                "2026-06-01",
                75,
                "https://kbs-frb.be/fr/appels/qv-2026",
            ),
        ]);
        let normalized = normalize_report(report, today());
        assert_eq!(normalized.opportunities.len(), 1);
        assert_eq!(normalized.opportunities[0].relevance_score, 80);
    }

    #[test]
    fn test_different_providers_are_kept_apart() {
        let report = report_with(vec![
            opportunity("Appel à projets", "COCOF", "2026-06-01", 80, "https://cocof.be/1"),
            opportunity("Appel à projets", "SPW", "2026-06-01", 75, "https://spw.be/2"),
        ]);
        let normalized = normalize_report(report, today());
        assert_eq!(normalized.opportunities.len(), 2);
    }

    #[test]
    fn test_sorts_by_score_then_deadline() {
        let report = report_with(vec![
            opportunity("Tard", "A", "2099-12-31", 80, "https://a.be/1"),
            opportunity("Tôt", "B", "2026-02-01", 80, "https://b.be/2"),
            opportunity("Fort", "C", "2026-06-01", 95, "https://c.be/3"),
        ]);
        let normalized = normalize_report(report, today());
        let titles: Vec<&str> = normalized
            .opportunities
            .iter()
            .map(|o| o.title.as_str())
            .collect();
        assert_eq!(titles, vec!["Fort", "Tôt", "Tard"]);
    }

    #[test]
    fn test_earliest_deadline() {
        let report = report_with(vec![
            opportunity("A", "A", "2026-06-01", 80, "https://a.be/1"),
            opportunity("B", "B", "2026-02-01", 70, "https://b.be/2"),
        ]);
        let normalized = normalize_report(report, today());
        assert_eq!(earliest_deadline(&normalized), "2026-02-01");
        assert_eq!(earliest_deadline(&report_with(Vec::new())), DEADLINE_SENTINEL);
    }

    #[test]
    fn test_fold_for_match() {
        assert_eq!(fold_for_match("Fondation  Roi-Baudouin"), "fondation roibaudouin");
        assert_eq!(fold_for_match("MÉCÉNAT"), "mecenat");
    }
}
