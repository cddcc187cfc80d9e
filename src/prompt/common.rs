use chrono::Local;

// Common text blocks for all prompts. The prompts are French: the audience is
// Belgian non-profit staff and the model must answer in their language.

pub const JSON_ONLY: &str = r#"
Instructions impératives pour ta réponse:

1. Réponds UNIQUEMENT avec du JSON valide, sans texte avant ni après.
2. N'utilise PAS de balises markdown (pas de ```json ni de ```).
3. Ne mets JAMAIS de clé en gras: écris "clé" et pas **clé**.
4. Ne raconte pas ce que tu fais et ne commente pas ces instructions.
"#;

pub const NO_FABRICATION: &str = r#"
Règles anti-fabrication:

1. N'invente JAMAIS un organisme, un dispositif, un montant ou une URL.
2. Si tu n'as pas vérifié une information, ne la mentionne pas.
3. Mieux vaut trois opportunités réelles que huit approximatives.
"#;

/// Utility function to get the current date in the Belgian day/month/year format
pub fn current_date() -> String {
    let today = Local::now();
    today.format("%d/%m/%Y").to_string()
}
