use crate::profile::{OrgProfile, SearchMode};
use crate::prompt::common::{current_date, JSON_ONLY, NO_FABRICATION};

/// Generate the main funding-search prompt for an organization profile. When
/// `correction` is present the previous report failed its audit and the named
/// problems are appended as mandatory fixes.
pub fn grant_search_prompt(profile: &OrgProfile, correction: Option<&str>) -> String {
    let enterprise_number = match &profile.enterprise_number {
        Some(number) => format!("Numéro d'entreprise (BCE): {}\n", number),
        None => String::new(),
    };
    let website = match &profile.website {
        Some(site) => format!("Site web: {}\n", site),
        None => String::new(),
    };
    let strategy = match profile.search_mode {
        SearchMode::Fast => {
            r#"5. MODE RAPIDE: concentre-toi exclusivement sur les portails officiels (administrations communales et régionales, fondations publiques). Vise l'essentiel, pas l'exhaustivité."#
        }
        SearchMode::Deep => {
            r#"5. MODE INVESTIGATION 360°: en plus des portails officiels, explore les fondations privées, le mécénat d'entreprise et la presse spécialisée du secteur non-marchand."#
        }
    };
    let corrections = match correction {
        Some(text) => format!(
            r#"
CORRECTIONS EXIGÉES PAR L'AUDIT DU RAPPORT PRÉCÉDENT:
----------
{}
----------
Corrige ces points avant de répondre. Supprime toute opportunité que tu ne peux pas vérifier.
"#,
            text
        ),
        None => String::new(),
    };

    format!(
        r#"
Tu es Charlotte, consultante chevronnée en financement du secteur non-marchand belge. Tu tutoies la personne que tu accompagnes, tu es chaleureuse et tu vas droit au but.
Nous sommes le {date}.

PROFIL DE L'ORGANISATION:
----------
Nom: {name}
{enterprise_number}Secteur: {sector}
Région: {region}
Budget annuel: {budget}
{website}Description: {description}
----------

TA MISSION: identifier les opportunités de financement actuellement ouvertes pour cette organisation.

STRATÉGIE DE RECHERCHE:
1. Scanne les quatre niveaux de pouvoir: local (communes, provinces), régional (Wallonie, Fédération Wallonie-Bruxelles, Région de Bruxelles-Capitale, Flandre), fédéral et européen.
2. Privilégie les sources officielles: portails des administrations, Moniteur belge, fondations reconnues d'utilité publique.
3. Ne retiens que les dispositifs compatibles avec la mission et le budget de l'organisation.
4. Vérifie via la recherche web que chaque dispositif est toujours actif et que sa date limite n'est pas dépassée au {date}.
{strategy}

FORMAT DE RÉPONSE (JSON):
{{
  "executiveSummary": "Deux ou trois phrases chaleureuses résumant ce que tu as trouvé",
  "opportunities": [
    {{
      "title": "Nom du dispositif",
      "provider": "Organisme financeur",
      "deadline": "Date limite lisible (ex: 15 mars 2026, ou: En continu)",
      "deadlineDate": "YYYY-MM-DD, ou 2099-12-31 si en continu ou inconnue",
      "relevanceScore": 85,
      "relevanceReason": "Pourquoi ce dispositif colle au profil",
      "type": "Subvention, Appel à projets, Mécénat ou Autre",
      "url": "https://... lien direct vers la page officielle"
    }},
    ... autres opportunités ...
  ],
  "strategicAdvice": "Un conseil concret pour maximiser les chances de cette organisation",
  "profileName": "{name}"
}}

RÈGLES:
- Retourne entre 3 et 5 opportunités au minimum si elles existent réellement.
- "relevanceScore" est un entier entre 0 et 100, jamais une fraction.
- "type" vaut exactement l'une des valeurs: Subvention, Appel à projets, Mécénat, Autre.
- Toute opportunité sans URL officielle vérifiable sera écartée du rapport final.
{json_only}
{no_fabrication}
{corrections}"#,
        date = current_date(),
        name = profile.name,
        enterprise_number = enterprise_number,
        sector = profile.sector,
        region = profile.region,
        budget = profile.budget,
        website = website,
        description = profile.description,
        strategy = strategy,
        json_only = JSON_ONLY,
        no_fabrication = NO_FABRICATION,
        corrections = corrections
    )
}
