//! Candidate searcher: taxonomy-filtered catalog queries for unmatched
//! medicines, with a substitute-name probe as the last resort.

use tracing::{debug, warn};

use super::{CatalogSource, EngineConfig};
use crate::db::CandidateFilter;
use crate::models::{ParsedMedicine, Product, TargetProfile};

/// Hand-authored synonym expansions for therapeutic-group keywords.
const GROUP_SYNONYMS: &[(&str, &[&str])] = &[
    ("nsaid", &["kháng viêm", "anti-inflammatory", "chống viêm"]),
    ("kháng viêm", &["nsaid", "anti-inflammatory"]),
    ("giảm đau", &["analgesic", "hạ sốt"]),
    ("corticoid", &["corticosteroid"]),
    ("kháng sinh", &["antibiotic"]),
];

/// Common substitute drug names probed when the primary query comes back
/// empty, keyed by therapeutic-group marker.
const SUBSTITUTE_PROBES: &[(&str, &[&str])] = &[
    ("cox-2", &["Celecoxib", "Etoricoxib", "Meloxicam"]),
    ("nsaid", &["Ibuprofen", "Diclofenac", "Meloxicam", "Celecoxib"]),
    ("kháng viêm", &["Ibuprofen", "Diclofenac", "Meloxicam"]),
    ("giảm đau", &["Paracetamol", "Ibuprofen"]),
    ("corticoid", &["Prednisolone", "Methylprednisolone", "Dexamethasone"]),
];

/// Note attached to a line when suggestions came from the probe path.
const PROBE_NOTE: &str = "Một số gợi ý được chọn theo nhóm điều trị, cần dược sĩ xác nhận.";

/// Searcher over the catalog collaborator.
#[derive(Default)]
pub struct CandidateSearcher;

impl CandidateSearcher {
    pub fn new() -> Self {
        Self
    }

    /// Unranked candidates for one unmatched medicine, plus notes for the
    /// aggregator. The target's own catalog record is never returned.
    pub fn search(
        &self,
        catalog: &dyn CatalogSource,
        medicine: &ParsedMedicine,
        target: &TargetProfile,
        config: &EngineConfig,
    ) -> (Vec<Product>, Vec<String>) {
        let filter = self.build_filter(target, config);

        let mut products = match catalog.search_candidates(&filter, config.catalog_timeout) {
            Ok(products) => products,
            Err(e) => {
                warn!(name = %medicine.base_name, error = %e, "candidate search failed");
                Vec::new()
            }
        };

        let mut notes = Vec::new();
        if products.is_empty() {
            let probed = self.probe_substitutes(catalog, medicine, target, config);
            if !probed.is_empty() {
                debug!(name = %medicine.base_name, count = probed.len(), "using substitute-name probe");
                notes.push(PROBE_NOTE.to_string());
                products = probed;
            }
        }

        (dedup_by_id(products, target.reference_id.as_deref()), notes)
    }

    /// Strict AND query when the profile is complete; otherwise an OR over
    /// whatever is known, with group-keyword synonym expansion.
    fn build_filter(&self, target: &TargetProfile, config: &EngineConfig) -> CandidateFilter {
        let taxonomy = &target.taxonomy;
        let strict = taxonomy.is_complete();

        let group_keywords = if strict {
            Vec::new()
        } else {
            self.group_keywords(target)
        };

        CandidateFilter {
            strict,
            category: taxonomy.category.clone(),
            subcategory: taxonomy.subcategory.clone(),
            dosage_form: taxonomy.dosage_form.clone(),
            route: taxonomy.route.clone(),
            active_ingredient: target.active_ingredient.clone(),
            group_keywords,
            exclude_id: target.reference_id.clone(),
            limit: config.candidate_limit,
        }
    }

    /// Therapeutic-group keyword variants: the group itself plus synonyms
    /// triggered by any marker found in the group/subcategory text.
    fn group_keywords(&self, target: &TargetProfile) -> Vec<String> {
        let mut keywords: Vec<String> = Vec::new();
        if let Some(group) = &target.therapeutic_group {
            keywords.push(group.clone());
        }

        let context = format!(
            "{} {}",
            target.therapeutic_group.as_deref().unwrap_or(""),
            target.taxonomy.subcategory.as_deref().unwrap_or("")
        )
        .to_lowercase();

        for (marker, synonyms) in GROUP_SYNONYMS {
            if context.contains(marker) {
                for synonym in *synonyms {
                    keywords.push((*synonym).to_string());
                }
            }
        }

        keywords.sort();
        keywords.dedup();
        keywords
    }

    /// Probe a fixed list of common same-group substitutes by name.
    fn probe_substitutes(
        &self,
        catalog: &dyn CatalogSource,
        medicine: &ParsedMedicine,
        target: &TargetProfile,
        config: &EngineConfig,
    ) -> Vec<Product> {
        let context = format!(
            "{} {} {}",
            target.therapeutic_group.as_deref().unwrap_or(""),
            target.taxonomy.subcategory.as_deref().unwrap_or(""),
            medicine.base_name
        )
        .to_lowercase();

        let mut products = Vec::new();
        for (marker, names) in SUBSTITUTE_PROBES {
            let in_group = context.contains(marker)
                || names
                    .iter()
                    .any(|n| context.contains(&n.to_lowercase()));
            if !in_group {
                continue;
            }
            for name in *names {
                if medicine.base_name.to_lowercase().contains(&name.to_lowercase()) {
                    continue;
                }
                match catalog.find_best_by_name(name, config.catalog_timeout) {
                    Ok(Some(product)) => products.push(product),
                    Ok(None) => {}
                    Err(e) => debug!(probe = name, error = %e, "substitute probe failed"),
                }
            }
            break;
        }
        products
    }
}

fn dedup_by_id(products: Vec<Product>, exclude_id: Option<&str>) -> Vec<Product> {
    let mut seen = std::collections::HashSet::new();
    products
        .into_iter()
        .filter(|p| Some(p.id.as_str()) != exclude_id)
        .filter(|p| seen.insert(p.id.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TaxonomyProfile;
    use crate::Database;
    use std::sync::Mutex;

    fn medicine(base: &str) -> ParsedMedicine {
        ParsedMedicine {
            original_text: base.to_string(),
            clean_text: base.to_string(),
            base_name: base.to_string(),
            dosage: None,
            quantity: 1,
        }
    }

    fn complete_target() -> TargetProfile {
        TargetProfile {
            taxonomy: TaxonomyProfile {
                category: Some("Thuốc cơ xương khớp".into()),
                subcategory: Some("NSAID".into()),
                dosage_form: Some("Gel".into()),
                route: Some("Dùng ngoài".into()),
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_strict_filter_for_complete_profile() {
        let searcher = CandidateSearcher::new();
        let filter = searcher.build_filter(&complete_target(), &EngineConfig::default());
        assert!(filter.strict);
        assert!(filter.group_keywords.is_empty());
        assert_eq!(filter.category.as_deref(), Some("Thuốc cơ xương khớp"));
    }

    #[test]
    fn test_loose_filter_with_synonym_expansion() {
        let searcher = CandidateSearcher::new();
        let target = TargetProfile {
            taxonomy: TaxonomyProfile {
                subcategory: Some("NSAID".into()),
                ..Default::default()
            },
            therapeutic_group: Some("Kháng viêm không steroid (NSAID)".into()),
            ..Default::default()
        };

        let filter = searcher.build_filter(&target, &EngineConfig::default());
        assert!(!filter.strict);
        assert!(filter
            .group_keywords
            .iter()
            .any(|k| k == "anti-inflammatory"));
        assert!(filter.group_keywords.iter().any(|k| k == "kháng viêm"));
    }

    #[test]
    fn test_search_returns_taxonomy_matches() {
        let catalog = Mutex::new(Database::open_in_memory().unwrap());
        {
            let db = catalog.lock().unwrap();
            let mut gel = Product::with_id("G1".into(), "Diclofenac Gel 1%".into());
            gel.category = Some("Thuốc cơ xương khớp".into());
            gel.subcategory = Some("NSAID".into());
            gel.dosage_form = Some("Gel".into());
            gel.route = Some("Dùng ngoài".into());
            db.upsert_product(&gel).unwrap();
        }

        let searcher = CandidateSearcher::new();
        let (products, notes) = searcher.search(
            &catalog,
            &medicine("Voltaren Emulgel"),
            &complete_target(),
            &EngineConfig::default(),
        );

        assert_eq!(products.len(), 1);
        assert_eq!(products[0].id, "G1");
        assert!(notes.is_empty());
    }

    #[test]
    fn test_probe_when_primary_query_empty() {
        let catalog = Mutex::new(Database::open_in_memory().unwrap());
        {
            let db = catalog.lock().unwrap();
            let mut sub = Product::with_id("S1".into(), "Celecoxib 200mg".into());
            sub.subcategory = Some("NSAID".into());
            db.upsert_product(&sub).unwrap();
        }

        // Complete profile matching nothing in the catalog, but the target
        // is recognizably a COX-2 inhibitor
        let mut target = complete_target();
        target.taxonomy.dosage_form = Some("Miếng dán".into());
        target.therapeutic_group = Some("NSAID nhóm ức chế COX-2".into());

        let searcher = CandidateSearcher::new();
        let (products, notes) = searcher.search(
            &catalog,
            &medicine("Etoricoxib"),
            &target,
            &EngineConfig::default(),
        );

        assert_eq!(products.len(), 1);
        assert_eq!(products[0].id, "S1");
        assert_eq!(notes.len(), 1);
    }

    #[test]
    fn test_probe_skips_target_itself() {
        let catalog = Mutex::new(Database::open_in_memory().unwrap());
        {
            let db = catalog.lock().unwrap();
            let mut own = Product::with_id("C1".into(), "Celecoxib 200mg".into());
            own.subcategory = Some("Hết hàng".into());
            db.upsert_product(&own).unwrap();
        }

        let mut target = TargetProfile::default();
        target.therapeutic_group = Some("COX-2".into());

        let searcher = CandidateSearcher::new();
        let (products, _) = searcher.search(
            &catalog,
            &medicine("Celecoxib"),
            &target,
            &EngineConfig::default(),
        );

        // Its own name is never probed back
        assert!(products.iter().all(|p| p.id != "C1") || products.is_empty());
    }

    #[test]
    fn test_reference_id_excluded() {
        let products = vec![
            Product::with_id("A".into(), "One".into()),
            Product::with_id("B".into(), "Two".into()),
            Product::with_id("A".into(), "One dup".into()),
        ];
        let deduped = dedup_by_id(products, Some("B"));
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].id, "A");
    }
}
