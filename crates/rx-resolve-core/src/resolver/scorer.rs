//! Match scorer: assigns a tier and confidence to one candidate using an
//! ordered, data-driven precedence table.
//!
//! The table is scanned top to bottom; the first row whose required
//! predicates all hold decides the tier. Confidences never increase down
//! the table, so agreeing on more attributes can never score lower.

use super::parser::DosageParser;
use crate::models::{
    attr_eq, MatchCandidate, MatchReason, ParsedMedicine, Product, TargetProfile,
};

/// Confidence band for a candidate sharing only the therapeutic group.
const GROUP_FALLBACK_CONFIDENCE: f64 = 0.40;

/// Which predicates hold for one candidate.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct AgreementFlags {
    pub category: bool,
    pub subcategory: bool,
    pub ingredient: bool,
    pub form: bool,
    pub route: bool,
    pub dosage: bool,
}

/// One row of the precedence table: the predicates a candidate must
/// satisfy, and the tier it earns.
pub(crate) struct TierSpec {
    pub category: bool,
    pub subcategory: bool,
    pub ingredient: bool,
    pub form: bool,
    pub route: bool,
    pub dosage: bool,
    pub reason: MatchReason,
    pub confidence: f64,
}

impl TierSpec {
    fn matches(&self, flags: &AgreementFlags) -> bool {
        (!self.category || flags.category)
            && (!self.subcategory || flags.subcategory)
            && (!self.ingredient || flags.ingredient)
            && (!self.form || flags.form)
            && (!self.route || flags.route)
            && (!self.dosage || flags.dosage)
    }
}

macro_rules! tier {
    ($c:expr, $s:expr, $i:expr, $f:expr, $r:expr, $d:expr, $reason:ident, $confidence:expr) => {
        TierSpec {
            category: $c,
            subcategory: $s,
            ingredient: $i,
            form: $f,
            route: $r,
            dosage: $d,
            reason: MatchReason::$reason,
            confidence: $confidence,
        }
    };
}

/// Ordered precedence table, most specific combination first.
/// Columns: category, subcategory, ingredient, form, route, dosage.
pub(crate) const TIER_TABLE: &[TierSpec] = &[
    tier!(true, true, true, true, true, true, FullMatchSameDosage, 0.97),
    tier!(true, true, true, true, true, false, FullMatch, 0.94),
    tier!(true, true, false, true, true, true, FullTaxonomySameDosage, 0.90),
    tier!(true, true, false, true, true, false, FullTaxonomy, 0.86),
    tier!(false, true, true, false, false, false, SameIngredientSameSubcategory, 0.84),
    tier!(false, false, true, false, false, true, SameIngredientSameDosage, 0.80),
    tier!(false, false, true, false, false, false, SameIngredient, 0.75),
    tier!(false, true, false, true, false, false, SameSubcategorySameForm, 0.65),
    tier!(false, true, false, false, false, false, SameSubcategory, 0.58),
    tier!(true, false, false, true, false, false, SameCategorySameForm, 0.52),
    tier!(true, false, false, false, false, false, SameCategory, 0.45),
];

/// Scorer for substitute candidates.
pub struct MatchScorer {
    dosage: DosageParser,
}

impl Default for MatchScorer {
    fn default() -> Self {
        Self::new()
    }
}

impl MatchScorer {
    pub fn new() -> Self {
        Self {
            dosage: DosageParser::new(),
        }
    }

    /// Score one candidate. `None` means nothing holds and the caller
    /// discards the candidate; zero-confidence candidates are never
    /// emitted.
    pub fn score(
        &self,
        product: &Product,
        medicine: &ParsedMedicine,
        target: &TargetProfile,
    ) -> Option<MatchCandidate> {
        let flags = self.agreement_flags(product, medicine, target);

        for spec in TIER_TABLE {
            if spec.matches(&flags) {
                return Some(MatchCandidate {
                    product: product.clone(),
                    reason: spec.reason,
                    confidence: spec.confidence,
                    same_dosage: flags.dosage,
                });
            }
        }

        if group_overlaps(
            target.therapeutic_group.as_deref(),
            product.therapeutic_group.as_deref(),
        ) {
            return Some(MatchCandidate {
                product: product.clone(),
                reason: MatchReason::SameTherapeuticGroup,
                confidence: GROUP_FALLBACK_CONFIDENCE,
                same_dosage: flags.dosage,
            });
        }

        None
    }

    fn agreement_flags(
        &self,
        product: &Product,
        medicine: &ParsedMedicine,
        target: &TargetProfile,
    ) -> AgreementFlags {
        let taxonomy = &target.taxonomy;
        AgreementFlags {
            category: attr_eq(taxonomy.category.as_deref(), product.category.as_deref()),
            subcategory: attr_eq(
                taxonomy.subcategory.as_deref(),
                product.subcategory.as_deref(),
            ),
            ingredient: ingredient_overlaps(
                target.active_ingredient.as_deref(),
                product.active_ingredient.as_deref(),
            ),
            form: attr_eq(taxonomy.dosage_form.as_deref(), product.dosage_form.as_deref()),
            route: attr_eq(taxonomy.route.as_deref(), product.route.as_deref()),
            dosage: match (&medicine.dosage, self.dosage.parse(&product.name)) {
                (Some(target_dosage), Some(product_dosage)) => {
                    target_dosage.same_as(&product_dosage)
                }
                _ => false,
            },
        }
    }
}

/// Ingredients agree on case-insensitive containment in either direction
/// (salt forms extend the base name: "Diclofenac" / "Diclofenac natri").
fn ingredient_overlaps(a: Option<&str>, b: Option<&str>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => {
            let a = a.trim().to_lowercase();
            let b = b.trim().to_lowercase();
            !a.is_empty() && !b.is_empty() && (a.contains(&b) || b.contains(&a))
        }
        _ => false,
    }
}

fn group_overlaps(a: Option<&str>, b: Option<&str>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => {
            let a = a.trim().to_lowercase();
            let b = b.trim().to_lowercase();
            !a.is_empty() && !b.is_empty() && (a.contains(&b) || b.contains(&a))
        }
        _ => false,
    }
}
