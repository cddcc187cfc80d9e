use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::llm::SourceRef;

/// Sorts-last date for rolling or unknown deadlines. Entries carrying it are
/// never treated as expired.
pub const DEADLINE_SENTINEL: &str = "2099-12-31";

// French fallback strings, used when the model omits the narrative fields.
pub const DEFAULT_SUMMARY: &str = "J'ai terminé mon analyse !";
pub const DEFAULT_ADVICE: &str = "Regarde les liens pour plus de détails.";
pub const DEGRADED_SUMMARY: &str = "Le service fonctionne en mode dégradé.";

/// Funding mechanism, as the model labels it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpportunityType {
    #[serde(rename = "Subvention")]
    Subsidy,
    #[serde(rename = "Appel à projets")]
    CallForProjects,
    #[serde(rename = "Mécénat")]
    Patronage,
    #[serde(rename = "Autre")]
    Other,
}

impl OpportunityType {
    pub fn label(&self) -> &'static str {
        match self {
            OpportunityType::Subsidy => "Subvention",
            OpportunityType::CallForProjects => "Appel à projets",
            OpportunityType::Patronage => "Mécénat",
            OpportunityType::Other => "Autre",
        }
    }
}

impl fmt::Display for OpportunityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl From<&str> for OpportunityType {
    fn from(s: &str) -> Self {
        match s.trim() {
            "Subvention" => OpportunityType::Subsidy,
            "Appel à projets" => OpportunityType::CallForProjects,
            "Mécénat" => OpportunityType::Patronage,
            _ => OpportunityType::Other,
        }
    }
}

/// A single funding opportunity in a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrantOpportunity {
    pub title: String,
    pub provider: String,
    /// Human-readable deadline text ("15 mars 2026", "En continu").
    pub deadline: String,
    /// ISO deadline used for sorting and staleness checks.
    pub deadline_date: String,
    pub relevance_score: u8,
    pub relevance_reason: String,
    #[serde(rename = "type")]
    pub opportunity_type: OpportunityType,
    pub url: String,
}

/// A completed funding report for one organization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrantReport {
    pub executive_summary: String,
    pub opportunities: Vec<GrantOpportunity>,
    pub strategic_advice: String,
    pub sources: Vec<SourceRef>,
    pub generated_at: String,
    pub profile_name: String,
}

impl GrantReport {
    /// Empty best-effort report, returned when every model pass failed. The
    /// request still completes so the caller is never left hanging.
    pub fn degraded(profile_name: &str) -> Self {
        GrantReport {
            executive_summary: DEGRADED_SUMMARY.to_string(),
            opportunities: Vec::new(),
            strategic_advice: DEFAULT_ADVICE.to_string(),
            sources: Vec::new(),
            generated_at: Utc::now().to_rfc3339(),
            profile_name: profile_name.to_string(),
        }
    }
}

/// Outcome of the second-pass review.
#[derive(Debug, Clone, PartialEq)]
pub enum AuditVerdict {
    Approved,
    /// The reviewer wants another pass; the payload is its correction text.
    Refine(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opportunity_type_from_label() {
        assert_eq!(
            OpportunityType::from("Appel à projets"),
            OpportunityType::CallForProjects
        );
        assert_eq!(OpportunityType::from(" Mécénat "), OpportunityType::Patronage);
        assert_eq!(OpportunityType::from("Prix"), OpportunityType::Other);
    }

    #[test]
    fn test_opportunity_serializes_type_label() {
        let opportunity = GrantOpportunity {
            title: "Appel à projets 2026".to_string(),
            provider: "Fondation Roi Baudouin".to_string(),
            deadline: "15 mars 2026".to_string(),
            deadline_date: "2026-03-15".to_string(),
            relevance_score: 85,
            relevance_reason: "Correspond à la mission".to_string(),
            opportunity_type: OpportunityType::CallForProjects,
            url: "https://kbs-frb.be/fr/appel".to_string(),
        };
        let json = serde_json::to_value(&opportunity).unwrap();
        assert_eq!(json["type"], "Appel à projets");
        assert_eq!(json["deadline_date"], "2026-03-15");
    }

    #[test]
    fn test_degraded_report_is_empty_but_complete() {
        let report = GrantReport::degraded("Les Amis du Parc");
        assert!(report.opportunities.is_empty());
        assert_eq!(report.executive_summary, DEGRADED_SUMMARY);
        assert_eq!(report.profile_name, "Les Amis du Parc");
        assert!(!report.generated_at.is_empty());
    }
}
