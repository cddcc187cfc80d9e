use crate::profile::Sector;
use crate::prompt::common::{current_date, JSON_ONLY};

/// Generate a prompt for looking up a Belgian non-profit in the public
/// registries, by enterprise number or by name.
pub fn enrichment_prompt(query: &str) -> String {
    format!(
        r#"
Tu es documentaliste spécialisée dans le secteur associatif belge.
Nous sommes le {date}.

ENTITÉ À IDENTIFIER:
----------
{query}
----------

TÂCHE: retrouve cette organisation dans les registres publics belges et décris-la.

SOURCES À CONSULTER:
1. La Banque-Carrefour des Entreprises (BCE / KBO).
2. Les annexes du Moniteur belge (Belgisch Staatsblad).
3. Le site officiel de l'organisation si tu le trouves.

FORMAT DE RÉPONSE (JSON):
{{
  "name": "Dénomination officielle complète",
  "website": "https://... ou chaîne vide",
  "region": "Région ou commune du siège social",
  "description": "Une ou deux phrases sur l'objet social",
  "sector": "Un secteur parmi: {sectors}"
}}

RÈGLES:
- "sector" vaut exactement l'une des valeurs listées, sinon "Autre".
- Laisse un champ vide plutôt que d'inventer une information.
{json_only}"#,
        date = current_date(),
        query = query,
        sectors = Sector::label_list(),
        json_only = JSON_ONLY
    )
}
