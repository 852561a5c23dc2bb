//! Markdown rendering of a full analysis report.

use crate::domain::model::{AnalysisReport, Biomarker, MicrobiomeReport, Sex};
use crate::extract::text::title_case;
use crate::rules::engine::{ConsolidatedRecommendations, Finding};
use crate::rules::flexible::FlexibleRulesOutcome;
use crate::scoring::indices::CompositeIndices;
use crate::scoring::metrics::MetricsReport;
use crate::scoring::model::ModelResult;
use crate::scoring::stats::round_to;

const CORTISOL_CURVE: &[(&str, &str)] = &[
    ("cortisol_reveil", "Réveil"),
    ("cortisol_car_30", "+30"),
    ("cortisol_12h", "12h"),
    ("cortisol_18h", "18h"),
    ("cortisol_22h", "22h"),
];

const TOP_COEFFICIENTS: usize = 5;
const TOP_CORRELATIONS: usize = 5;

#[derive(Default)]
struct Markdown {
    out: String,
}

impl Markdown {
    fn heading(&mut self, level: usize, text: &str) {
        if !self.out.is_empty() {
            self.out.push('\n');
        }
        self.out.push_str(&"#".repeat(level));
        self.out.push(' ');
        self.out.push_str(text);
        self.out.push_str("\n\n");
    }

    fn line(&mut self, text: &str) {
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn paragraph(&mut self, text: &str) {
        self.line(text);
        self.out.push('\n');
    }

    fn bullet(&mut self, text: &str) {
        self.out.push_str("- ");
        self.line(text);
    }

    fn table(&mut self, headers: &[&str], rows: &[Vec<String>]) {
        self.line(&format!("| {} |", headers.join(" | ")));
        self.line(&format!(
            "|{}",
            headers.iter().map(|_| "---|").collect::<String>()
        ));
        for row in rows {
            let cells: Vec<String> = row.iter().map(|c| cell(c)).collect();
            self.line(&format!("| {} |", cells.join(" | ")));
        }
        self.out.push('\n');
    }
}

fn cell(text: &str) -> String {
    text.replace('|', "\\|").replace(['\n', '\r'], " ")
}

fn num(value: f64) -> String {
    format!("{}", round_to(value, 2))
}

fn opt_num(value: Option<f64>) -> String {
    value.map(num).unwrap_or_else(|| "–".to_string())
}

fn score_text(score: Option<f64>) -> String {
    score
        .map(|s| format!("{:.0}/100", s))
        .unwrap_or_else(|| "–".to_string())
}

pub fn render_markdown(report: &AnalysisReport) -> String {
    let mut md = Markdown::default();

    header(&mut md, report);
    executive_summary(&mut md, &report.indices, &report.model);
    composite_indices(&mut md, &report.indices);
    functional_metrics(&mut md, &report.metrics);
    statistical_model(&mut md, &report.model);
    biomarkers(&mut md, report);
    cortisol_curve(&mut md, report);
    if let Some(microbiome) = &report.microbiome {
        microbiome_section(&mut md, microbiome);
    }
    if let Some(recommendations) = &report.recommendations {
        findings_section(&mut md, recommendations);
        therapeutic_axes(&mut md, recommendations);
    }
    if let Some(flexible) = &report.flexible_rules {
        flexible_section(&mut md, flexible);
    }
    action_plan(&mut md, report);
    follow_up(&mut md);

    md.out
}

fn header(md: &mut Markdown, report: &AnalysisReport) {
    md.heading(1, "Rapport d'analyse ALGO-LIFE");
    md.paragraph("Analyse bio-fonctionnelle multi-dimensionnelle");

    let patient = &report.patient;
    let mut rows = vec![
        vec!["Patient".to_string(), patient.display_name().to_string()],
        vec!["Date d'analyse".to_string(), report.analysis_date.clone()],
    ];
    if let Some(age) = patient.age {
        rows.push(vec!["Âge".to_string(), format!("{} ans", age)]);
    }
    rows.push(vec![
        "Sexe".to_string(),
        match patient.sex {
            Sex::Male => "Homme".to_string(),
            Sex::Female => "Femme".to_string(),
        },
    ]);
    if let Some(bio_age) = patient.biological_age {
        rows.push(vec!["Âge biologique".to_string(), format!("{} ans", num(bio_age))]);
    }
    if report.model.success {
        rows.push(vec![
            "Score prédictif (R²)".to_string(),
            format!("{:.3}", report.model.r2_score),
        ]);
        rows.push(vec![
            "Variables analysées".to_string(),
            report.model.n_features.to_string(),
        ]);
    }
    md.table(&["Champ", "Valeur"], &rows);
}

fn executive_summary(md: &mut Markdown, indices: &CompositeIndices, model: &ModelResult) {
    md.heading(2, "Résumé exécutif");

    let mut any = false;
    let mut summary = |label: &str, score: Option<f64>, interpretation: &str| {
        if let Some(s) = score {
            md.bullet(&format!("**{}** : score {:.0}/100 ({})", label, s, interpretation));
            any = true;
        }
    };
    if let Some(s) = &indices.stress {
        summary("Stress", s.score, &s.interpretation);
    }
    if let Some(m) = &indices.metabolic {
        summary("Métabolisme", m.score, &m.interpretation);
    }
    if let Some(i) = &indices.inflammation {
        summary("Inflammation", i.score, &i.interpretation);
    }
    if let Some(n) = &indices.neurotransmitters {
        summary("Neurotransmetteurs", n.score, &n.interpretation);
    }

    if !any {
        md.line("Aucun indice composite calculable avec les données fournies.");
    }
    md.line("");

    if model.success {
        md.paragraph(&format!(
            "**Modèle prédictif** : R² = {:.3}, expliquant {:.1}% de la variance observée.",
            model.r2_score,
            model.r2_score * 100.0
        ));
    }
}

fn composite_indices(md: &mut Markdown, indices: &CompositeIndices) {
    md.heading(2, "Indices composites");

    let mut rows = Vec::new();
    if let Some(s) = &indices.stress {
        rows.push(vec!["Stress".to_string(), score_text(s.score), s.interpretation.clone(), s.phase.clone()]);
    }
    if let Some(m) = &indices.metabolic {
        rows.push(vec!["Santé métabolique".to_string(), score_text(m.score), m.interpretation.clone(), m.risk_level.clone()]);
    }
    if let Some(n) = &indices.neurotransmitters {
        rows.push(vec!["Neurotransmetteurs".to_string(), score_text(n.score), n.interpretation.clone(), n.recommendation.clone()]);
    }
    if let Some(i) = &indices.inflammation {
        rows.push(vec!["Inflammation".to_string(), score_text(i.score), i.interpretation.clone(), i.priority.clone()]);
    }
    if let Some(m) = &indices.microbiome {
        rows.push(vec!["Microbiome".to_string(), score_text(m.score), m.interpretation.clone(), m.issues.join("; ")]);
    }
    if let Some(m) = &indices.metabolism {
        rows.push(vec!["Métabolisme".to_string(), score_text(m.score), m.interpretation.clone(), m.risk_level.clone()]);
    }
    md.table(&["Indice", "Score", "Interprétation", "Statut"], &rows);

    let issues: Vec<&String> = indices
        .metabolic
        .iter()
        .flat_map(|m| &m.issues)
        .chain(indices.inflammation.iter().flat_map(|i| &i.sources))
        .collect();
    if !issues.is_empty() {
        md.line("**Points d'attention :**");
        for issue in issues {
            md.bullet(issue);
        }
        md.line("");
    }
}

fn functional_metrics(md: &mut Markdown, metrics: &MetricsReport) {
    md.heading(2, "Métriques fonctionnelles");

    let rows: Vec<Vec<String>> = metrics
        .blocks
        .iter()
        .map(|b| vec![b.label.clone(), opt_num(b.value), b.status.clone(), score_text(b.score)])
        .collect();
    md.table(&["Bloc", "Valeur", "Statut", "Score"], &rows);
    md.paragraph(&format!("**Score global** : {}", score_text(metrics.global_score)));
}

fn statistical_model(md: &mut Markdown, model: &ModelResult) {
    md.heading(2, "Analyse statistique");

    if !model.success {
        md.paragraph(&format!(
            "Analyse statistique non disponible : {}",
            model.message.as_deref().unwrap_or("données insuffisantes")
        ));
        return;
    }

    let strength = if model.r2_score > 0.7 {
        "excellente"
    } else if model.r2_score > 0.5 {
        "bonne"
    } else {
        "modérée"
    };
    md.paragraph(&format!(
        "R² = {:.3} : le modèle explique {:.1}% de la variance ({} capacité prédictive) sur {} variables.",
        model.r2_score,
        model.r2_score * 100.0,
        strength,
        model.n_features
    ));
    md.paragraph(&format!(
        "_Modèle de démonstration ajusté sur une population synthétique de {} individus générée autour des valeurs du patient (graine {}). Il ne provient pas d'une cohorte réelle._",
        model.population_size, model.seed
    ));

    md.heading(3, "Facteurs principaux");
    let rows: Vec<Vec<String>> = model
        .coefficients
        .iter()
        .take(TOP_COEFFICIENTS)
        .enumerate()
        .map(|(i, c)| {
            let (impact, action) = if c.coefficient > 0.0 {
                ("Protecteur", "À maintenir/améliorer")
            } else {
                ("Délétère", "À corriger prioritairement")
            };
            vec![
                (i + 1).to_string(),
                title_case(&c.feature),
                format!("{:+.3}", c.coefficient),
                impact.to_string(),
                action.to_string(),
            ]
        })
        .collect();
    md.table(&["Rang", "Facteur", "Coefficient", "Impact", "Interprétation"], &rows);

    md.heading(3, "Corrélations significatives");
    let significant: Vec<_> = model.significant_correlations().take(TOP_CORRELATIONS).collect();
    if significant.is_empty() {
        md.paragraph("Aucune corrélation significative identifiée (p > 0.05).");
    } else {
        for (feature, c) in significant {
            md.bullet(&format!(
                "**{}** : r = {:.3} (p = {:.4})",
                title_case(feature),
                c.correlation,
                c.p_value
            ));
        }
        md.line("");
    }
}

fn biomarker_row(b: &Biomarker) -> Vec<String> {
    vec![
        b.name.clone(),
        num(b.value),
        b.unit.clone(),
        b.reference.map(|r| r.to_string()).unwrap_or_default(),
        b.status().as_str().to_string(),
    ]
}

fn biomarkers(md: &mut Markdown, report: &AnalysisReport) {
    md.heading(2, "Biomarqueurs");
    if report.biology.is_empty() {
        md.paragraph("Aucun biomarqueur extrait.");
        return;
    }
    let rows: Vec<Vec<String>> = report.biology.iter().map(biomarker_row).collect();
    md.table(&["Biomarqueur", "Valeur", "Unité", "Référence", "Statut"], &rows);

    let out_of_range = report
        .biology
        .iter()
        .filter(|b| b.status().is_out_of_range())
        .count();
    md.paragraph(&format!(
        "{} biomarqueurs, dont {} hors norme.",
        report.biology.len(),
        out_of_range
    ));
}

fn cortisol_curve(md: &mut Markdown, report: &AnalysisReport) {
    let points: Vec<(&str, Option<f64>)> = CORTISOL_CURVE
        .iter()
        .map(|(key, label)| (*label, report.markers.get(key)))
        .collect();
    if points.iter().all(|(_, v)| v.is_none()) {
        return;
    }

    md.heading(2, "Profil cortisol");
    let headers: Vec<&str> = points.iter().map(|(label, _)| *label).collect();
    let row: Vec<String> = points.iter().map(|(_, v)| opt_num(*v)).collect();
    md.table(&headers, &[row]);
}

fn microbiome_section(md: &mut Markdown, microbiome: &MicrobiomeReport) {
    md.heading(2, "Microbiote");

    if let Some(di) = microbiome.dysbiosis_index {
        md.bullet(&format!(
            "Indice de dysbiose : {}/5 ({})",
            di,
            microbiome.dysbiosis_status.as_deref().unwrap_or("–")
        ));
    }
    if let Some(diversity) = &microbiome.diversity {
        md.bullet(&format!(
            "Diversité bactérienne : {} (score {}/3)",
            diversity,
            microbiome
                .diversity_score
                .map(|s| s.to_string())
                .unwrap_or_else(|| "–".to_string())
        ));
    }
    let present: Vec<String> = microbiome
        .presence
        .iter()
        .filter(|(_, p)| **p)
        .map(|(species, _)| title_case(species))
        .collect();
    if !present.is_empty() {
        md.bullet(&format!("Espèces clés mentionnées : {}", present.join(", ")));
    }
    md.line("");

    if !microbiome.groups.is_empty() {
        let rows: Vec<Vec<String>> = microbiome
            .groups
            .iter()
            .map(|g| vec![g.name.clone(), g.result.clone()])
            .collect();
        md.table(&["Groupe bactérien", "Résultat"], &rows);
    }
}

fn finding_block(md: &mut Markdown, finding: &Finding) {
    md.heading(4, &format!("{} ({})", finding.title, finding.category));
    md.bullet(&format!(
        "Valeur : {} ({}), norme : {}",
        finding.value,
        finding.direction.as_str(),
        if finding.norm.is_empty() { "–" } else { finding.norm.as_str() }
    ));
    let advice = &finding.advice;
    for (label, text) in [
        ("Interprétation", &advice.interpretation),
        ("Nutrition", &advice.nutrition),
        ("Micronutrition", &advice.supplementation),
        ("Hygiène de vie", &advice.lifestyle),
        ("Suivi", &advice.monitoring),
    ] {
        if !text.is_empty() {
            md.bullet(&format!("{} : {}", label, text));
        }
    }
    md.line("");
}

fn findings_section(md: &mut Markdown, recommendations: &ConsolidatedRecommendations) {
    md.heading(2, "Recommandations issues des règles");
    md.paragraph(&format!(
        "{} (score santé {}/100)",
        recommendations.base.summary, recommendations.health_score
    ));

    let groups = [
        ("Priorité haute", &recommendations.base.by_priority.high),
        ("Priorité moyenne", &recommendations.base.by_priority.medium),
        ("Priorité basse", &recommendations.base.by_priority.low),
    ];
    for (label, findings) in groups {
        if findings.is_empty() {
            continue;
        }
        md.heading(3, label);
        for finding in findings {
            finding_block(md, finding);
        }
    }

    for (label, items) in [
        ("Nutrition", &recommendations.nutrition),
        ("Micronutrition", &recommendations.supplementation),
        ("Hygiène de vie", &recommendations.lifestyle),
        ("Suivi biologique", &recommendations.monitoring),
    ] {
        if items.is_empty() {
            continue;
        }
        md.heading(3, label);
        for item in items {
            md.bullet(item);
        }
        md.line("");
    }
}

fn therapeutic_axes(md: &mut Markdown, recommendations: &ConsolidatedRecommendations) {
    if recommendations.axes.is_empty() {
        return;
    }
    md.heading(2, "Axes thérapeutiques");
    let rows: Vec<Vec<String>> = recommendations
        .axes
        .iter()
        .map(|(axis, findings)| {
            let markers: Vec<&str> = findings.iter().map(|f| f.biomarker.as_str()).collect();
            vec![title_case(axis), findings.len().to_string(), markers.join(", ")]
        })
        .collect();
    md.table(&["Axe", "Anomalies", "Biomarqueurs"], &rows);
}

fn flexible_section(md: &mut Markdown, flexible: &FlexibleRulesOutcome) {
    md.heading(2, "Règles complémentaires");
    if flexible.priorities.is_empty() {
        md.paragraph("Aucune règle complémentaire déclenchée.");
        return;
    }
    let rows: Vec<Vec<String>> = flexible
        .priorities
        .iter()
        .map(|p| {
            vec![
                p.biomarker.clone(),
                p.status.clone(),
                p.priority.clone(),
                p.category.clone(),
                p.rationale.clone(),
            ]
        })
        .collect();
    md.table(&["Biomarqueur", "Statut", "Priorité", "Catégorie", "Justification"], &rows);

    let recos = &flexible.recommendations;
    for (label, items) in [
        ("Compléments", &recos.supplements),
        ("Micronutrition", &recos.micronutrition),
        ("Alimentation", &recos.alimentation),
        ("Mode de vie", &recos.lifestyle),
    ] {
        if items.is_empty() {
            continue;
        }
        md.line(&format!("**{} :**", label));
        for item in items {
            md.bullet(item);
        }
        md.line("");
    }
}

fn action_plan(md: &mut Markdown, report: &AnalysisReport) {
    md.heading(2, "Plan d'action personnalisé");

    if report.metrics.action_plan.is_empty() {
        md.paragraph("Aucune action prioritaire issue des métriques fonctionnelles.");
    } else {
        for action in &report.metrics.action_plan {
            md.bullet(action);
        }
        md.line("");
    }

    if !report.index_recommendations.is_empty() {
        let rows: Vec<Vec<String>> = report
            .index_recommendations
            .iter()
            .map(|r| vec![r.area.clone(), r.priority.clone(), r.recommendation.clone()])
            .collect();
        md.table(&["Domaine", "Priorité", "Recommandation"], &rows);
    }
}

fn follow_up(md: &mut Markdown) {
    md.heading(2, "Suivi et réévaluation");
    md.bullet("**Court terme (1 mois)** : mise en place des interventions prioritaires, suivi des symptômes");
    md.bullet("**Moyen terme (3 mois)** : réévaluation des biomarqueurs clés, ajustement du protocole");
    md.bullet("**Long terme (6-12 mois)** : bilan complet avec nouvelle analyse statistique");
    md.line("");
    md.line("**Indicateurs de succès :**");
    md.bullet("Amélioration des indices composites (cible : >70)");
    md.bullet("Normalisation des biomarqueurs hors norme");
    md.bullet("Amélioration subjective de la qualité de vie");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_escapes_cells() {
        let mut md = Markdown::default();
        md.table(&["A", "B"], &[vec!["x|y".to_string(), "line\nbreak".to_string()]]);
        assert_eq!(md.out, "| A | B |\n|---|---|\n| x\\|y | line break |\n\n");
    }

    #[test]
    fn test_number_formatting() {
        assert_eq!(num(4.0), "4");
        assert_eq!(num(1.23456), "1.23");
        assert_eq!(opt_num(None), "–");
        assert_eq!(score_text(Some(57.4)), "57/100");
    }
}
