//! Attribute classifier: resolves a best-effort taxonomy profile for an
//! unmatched medicine.
//!
//! Four passes, each filling only fields still unset:
//! 1. the external classifier collaborator (absent/failed → skipped),
//! 2. a similar-named catalog reference record,
//! 3. rule-based inference from surface text cues,
//! 4. subcategory inference from group keywords or drug-name membership.

use regex::Regex;
use tracing::debug;

use super::{CatalogSource, ClassifierHandle, EngineConfig};
use crate::models::{ParsedMedicine, TargetProfile};

/// Known NSAID drug names, for subcategory membership.
const NSAID_MEMBERS: &[&str] = &[
    "ibuprofen",
    "diclofenac",
    "voltaren",
    "celecoxib",
    "etoricoxib",
    "meloxicam",
    "piroxicam",
    "naproxen",
    "ketoprofen",
    "aspirin",
];

/// Known corticosteroid drug names.
const CORTICOSTEROID_MEMBERS: &[&str] = &[
    "prednisolone",
    "prednisone",
    "dexamethasone",
    "methylprednisolone",
    "hydrocortisone",
    "betamethasone",
    "triamcinolone",
];

/// Paracetamol-group drug and brand names.
const PARACETAMOL_MEMBERS: &[&str] = &[
    "paracetamol",
    "acetaminophen",
    "panadol",
    "efferalgan",
    "hapacol",
    "tylenol",
];

/// Keyword → subcategory rules applied to category/group text.
const SUBCATEGORY_RULES: &[(&str, &str)] = &[
    ("kháng viêm không steroid", "NSAID"),
    ("nsaid", "NSAID"),
    ("corticosteroid", "Corticosteroid"),
    ("corticoid", "Corticosteroid"),
    ("giảm đau", "Giảm đau, hạ sốt"),
    ("hạ sốt", "Giảm đau, hạ sốt"),
    ("kháng sinh", "Kháng sinh"),
    ("kháng histamin", "Kháng histamin"),
];

/// Classifier for the four-attribute taxonomy profile.
pub struct AttributeClassifier {
    topical_re: Regex,
    percent_per_gram_re: Regex,
    cream_re: Regex,
    eye_drop_re: Regex,
    injection_re: Regex,
    syrup_re: Regex,
    capsule_re: Regex,
    tablet_re: Regex,
}

impl Default for AttributeClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl AttributeClassifier {
    pub fn new() -> Self {
        Self {
            topical_re: Regex::new(r"(?i)\b(gel|cream|kem|tuýp|tuyp|bôi|boi)\b")
                .expect("static regex"),
            percent_per_gram_re: Regex::new(r"(?i)%\s*/\s*\d+\s*g\b").expect("static regex"),
            cream_re: Regex::new(r"(?i)\b(kem|cream)\b").expect("static regex"),
            eye_drop_re: Regex::new(r"(?i)nhỏ\s+mắt").expect("static regex"),
            injection_re: Regex::new(r"(?i)\b(tiêm|tiem|inject)").expect("static regex"),
            syrup_re: Regex::new(r"(?i)\b(siro|sirô|syrup)\b").expect("static regex"),
            capsule_re: Regex::new(r"(?i)\b(nang|capsule)\b").expect("static regex"),
            tablet_re: Regex::new(r"(?i)\b(viên|vien|tablet|nén|nen)\b").expect("static regex"),
        }
    }

    /// Resolve the taxonomy profile. Always returns, even fully empty.
    pub fn classify(
        &self,
        catalog: &dyn CatalogSource,
        classifier: &ClassifierHandle,
        medicine: &ParsedMedicine,
        config: &EngineConfig,
    ) -> TargetProfile {
        let mut target = TargetProfile::default();

        // Pass 1: external classifier (best effort)
        let dosage_text = medicine.dosage.as_ref().map(|d| d.to_string());
        if let Some(reply) = classifier.classify(
            &medicine.base_name,
            dosage_text.as_deref(),
            config.classifier_timeout,
        ) {
            fill(&mut target.taxonomy.category, reply.category);
            fill(&mut target.taxonomy.subcategory, reply.subcategory);
            fill(&mut target.taxonomy.dosage_form, reply.dosage_form);
            fill(&mut target.taxonomy.route, reply.route);
            target.analysis = reply.analysis_text;
        }

        // Pass 2: similar-named catalog reference
        match catalog.find_reference(&medicine.base_name, config.catalog_timeout) {
            Ok(Some(reference)) => {
                fill(&mut target.taxonomy.category, reference.category.clone());
                fill(&mut target.taxonomy.subcategory, reference.subcategory.clone());
                fill(&mut target.taxonomy.dosage_form, reference.dosage_form.clone());
                fill(&mut target.taxonomy.route, reference.route.clone());
                fill(&mut target.active_ingredient, reference.active_ingredient.clone());
                fill(&mut target.therapeutic_group, reference.therapeutic_group.clone());
                target.reference_id = Some(reference.id);
            }
            Ok(None) => {}
            Err(e) => debug!(name = %medicine.base_name, error = %e, "reference lookup failed"),
        }

        // Pass 3: surface text cues
        self.apply_surface_rules(medicine, &mut target);

        // Pass 4: subcategory from group keywords or name membership
        self.infer_subcategory(medicine, &mut target);

        target
    }

    fn apply_surface_rules(&self, medicine: &ParsedMedicine, target: &mut TargetProfile) {
        let text = format!("{} {}", medicine.clean_text, medicine.original_text);

        if self.topical_re.is_match(&text) || self.percent_per_gram_re.is_match(&text) {
            fill(&mut target.taxonomy.route, Some("Dùng ngoài".into()));
            let form = if self.cream_re.is_match(&text) {
                "Kem bôi da"
            } else {
                "Gel"
            };
            fill(&mut target.taxonomy.dosage_form, Some(form.into()));
        } else if self.eye_drop_re.is_match(&text) {
            fill(&mut target.taxonomy.route, Some("Nhỏ mắt".into()));
            fill(&mut target.taxonomy.dosage_form, Some("Dung dịch nhỏ mắt".into()));
        } else if self.injection_re.is_match(&text) {
            fill(&mut target.taxonomy.route, Some("Tiêm".into()));
            fill(&mut target.taxonomy.dosage_form, Some("Dung dịch tiêm".into()));
        } else if self.syrup_re.is_match(&text) {
            fill(&mut target.taxonomy.route, Some("Uống".into()));
            fill(&mut target.taxonomy.dosage_form, Some("Siro".into()));
        } else if self.capsule_re.is_match(&text) {
            fill(&mut target.taxonomy.route, Some("Uống".into()));
            fill(&mut target.taxonomy.dosage_form, Some("Viên nang".into()));
        } else if self.tablet_re.is_match(&text) {
            fill(&mut target.taxonomy.route, Some("Uống".into()));
            fill(&mut target.taxonomy.dosage_form, Some("Viên nén".into()));
        }
    }

    fn infer_subcategory(&self, medicine: &ParsedMedicine, target: &mut TargetProfile) {
        if target.taxonomy.subcategory.is_none() {
            let context = format!(
                "{} {}",
                target.taxonomy.category.as_deref().unwrap_or(""),
                target.therapeutic_group.as_deref().unwrap_or("")
            )
            .to_lowercase();

            for (keyword, subcategory) in SUBCATEGORY_RULES {
                if context.contains(keyword) {
                    target.taxonomy.subcategory = Some((*subcategory).into());
                    break;
                }
            }
        }

        if target.taxonomy.subcategory.is_some() {
            return;
        }

        let name = medicine.base_name.to_lowercase();
        let membership: &[(&[&str], &str, &str)] = &[
            (NSAID_MEMBERS, "NSAID", "Kháng viêm không steroid (NSAID)"),
            (CORTICOSTEROID_MEMBERS, "Corticosteroid", "Corticosteroid"),
            (PARACETAMOL_MEMBERS, "Giảm đau, hạ sốt", "Giảm đau, hạ sốt"),
        ];
        for (members, subcategory, group) in membership {
            if members.iter().any(|m| name.contains(m)) {
                target.taxonomy.subcategory = Some((*subcategory).into());
                fill(&mut target.therapeutic_group, Some((*group).into()));
                return;
            }
        }
    }
}

/// Set `dst` only when still unset and the value is non-blank.
fn fill(dst: &mut Option<String>, src: Option<String>) {
    if dst.is_none() {
        if let Some(value) = src {
            if !value.trim().is_empty() {
                *dst = Some(value);
            }
        }
    }
}
