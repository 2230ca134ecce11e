//! Resolution models: taxonomy profiles, match tiers, and the analysis
//! result returned for a whole prescription.

use serde::{Deserialize, Serialize};

use super::{Dosage, ParsedMedicine, Product};

/// Case-insensitive equality of two optional attribute values.
/// Both sides must be present and non-blank to count as agreement.
pub(crate) fn attr_eq(a: Option<&str>, b: Option<&str>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => {
            let a = a.trim().to_lowercase();
            let b = b.trim().to_lowercase();
            !a.is_empty() && a == b
        }
        _ => false,
    }
}

/// The four-attribute classification used as the primary matching key for
/// substitute medicines. Partial profiles are valid; completeness gates the
/// strict candidate-search mode.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TaxonomyProfile {
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub dosage_form: Option<String>,
    pub route: Option<String>,
}

impl TaxonomyProfile {
    /// A profile is complete only when all four fields are set.
    pub fn is_complete(&self) -> bool {
        self.category.is_some()
            && self.subcategory.is_some()
            && self.dosage_form.is_some()
            && self.route.is_some()
    }

    /// Count how many of the four attributes agree with a product (0..=4).
    pub fn agreement_with(&self, product: &Product) -> u8 {
        let mut count = 0;
        if attr_eq(self.category.as_deref(), product.category.as_deref()) {
            count += 1;
        }
        if attr_eq(self.subcategory.as_deref(), product.subcategory.as_deref()) {
            count += 1;
        }
        if attr_eq(self.dosage_form.as_deref(), product.dosage_form.as_deref()) {
            count += 1;
        }
        if attr_eq(self.route.as_deref(), product.route.as_deref()) {
            count += 1;
        }
        count
    }
}

/// Best-effort classification of one unmatched medicine: the taxonomy
/// profile plus whatever ingredient/group context was recovered along the
/// way. `reference_id` is the catalog record the profile was inferred from,
/// excluded from candidate search so a medicine never suggests itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TargetProfile {
    pub taxonomy: TaxonomyProfile,
    pub active_ingredient: Option<String>,
    pub therapeutic_group: Option<String>,
    pub reference_id: Option<String>,
    pub analysis: Option<String>,
}

/// Named match tier assigned to a candidate or exact match.
///
/// Variants are ordered most to least specific; `priority()` follows the
/// declaration order and is used as the ranking tie-break.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchReason {
    SameNameSameDosage,
    SameName,
    FullMatchSameDosage,
    FullMatch,
    FullTaxonomySameDosage,
    FullTaxonomy,
    SameIngredientSameSubcategory,
    SameIngredientSameDosage,
    SameIngredient,
    SameSubcategorySameForm,
    SameSubcategory,
    SameCategorySameForm,
    SameCategory,
    SameTherapeuticGroup,
}

impl MatchReason {
    /// Ranking priority; lower is more specific.
    pub fn priority(&self) -> u8 {
        match self {
            MatchReason::SameNameSameDosage => 0,
            MatchReason::SameName => 1,
            MatchReason::FullMatchSameDosage => 2,
            MatchReason::FullMatch => 3,
            MatchReason::FullTaxonomySameDosage => 4,
            MatchReason::FullTaxonomy => 5,
            MatchReason::SameIngredientSameSubcategory => 6,
            MatchReason::SameIngredientSameDosage => 7,
            MatchReason::SameIngredient => 8,
            MatchReason::SameSubcategorySameForm => 9,
            MatchReason::SameSubcategory => 10,
            MatchReason::SameCategorySameForm => 11,
            MatchReason::SameCategory => 12,
            MatchReason::SameTherapeuticGroup => 13,
        }
    }

    /// Stable snake_case tag, used at the FFI boundary.
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchReason::SameNameSameDosage => "same_name_same_dosage",
            MatchReason::SameName => "same_name",
            MatchReason::FullMatchSameDosage => "full_match_same_dosage",
            MatchReason::FullMatch => "full_match",
            MatchReason::FullTaxonomySameDosage => "full_taxonomy_same_dosage",
            MatchReason::FullTaxonomy => "full_taxonomy",
            MatchReason::SameIngredientSameSubcategory => "same_ingredient_same_subcategory",
            MatchReason::SameIngredientSameDosage => "same_ingredient_same_dosage",
            MatchReason::SameIngredient => "same_ingredient",
            MatchReason::SameSubcategorySameForm => "same_subcategory_same_form",
            MatchReason::SameSubcategory => "same_subcategory",
            MatchReason::SameCategorySameForm => "same_category_same_form",
            MatchReason::SameCategory => "same_category",
            MatchReason::SameTherapeuticGroup => "same_therapeutic_group",
        }
    }

    /// Human-facing explanation shown next to a suggestion.
    pub fn explanation(&self) -> &'static str {
        match self {
            MatchReason::SameNameSameDosage => "Đúng tên thuốc và hàm lượng",
            MatchReason::SameName => "Đúng tên thuốc",
            MatchReason::FullMatchSameDosage => {
                "Cùng hoạt chất, cùng phân loại và cùng hàm lượng"
            }
            MatchReason::FullMatch => "Cùng hoạt chất và cùng phân loại",
            MatchReason::FullTaxonomySameDosage => "Cùng phân loại và cùng hàm lượng",
            MatchReason::FullTaxonomy => "Cùng phân loại (nhóm, dạng bào chế, đường dùng)",
            MatchReason::SameIngredientSameSubcategory => "Cùng hoạt chất, cùng nhóm thuốc",
            MatchReason::SameIngredientSameDosage => "Cùng hoạt chất và cùng hàm lượng",
            MatchReason::SameIngredient => "Cùng hoạt chất",
            MatchReason::SameSubcategorySameForm => "Cùng nhóm thuốc, cùng dạng bào chế",
            MatchReason::SameSubcategory => "Cùng nhóm thuốc",
            MatchReason::SameCategorySameForm => "Cùng danh mục, cùng dạng bào chế",
            MatchReason::SameCategory => "Cùng danh mục thuốc",
            MatchReason::SameTherapeuticGroup => "Cùng nhóm điều trị",
        }
    }
}

/// A scored substitute candidate. Ephemeral: produced by the scorer,
/// consumed by the aggregator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatchCandidate {
    pub product: Product,
    pub reason: MatchReason,
    pub confidence: f64,
    /// True only when both sides carry a parseable, structurally equal
    /// normalized dosage.
    pub same_dosage: bool,
}

/// Terminal outcome for a line the catalog resolved deterministically.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExactMatch {
    pub product: Product,
    pub reason: MatchReason,
    pub confidence: f64,
}

/// Public-facing projection of a ranked candidate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Suggestion {
    pub product_id: String,
    pub name: String,
    pub price: f64,
    pub in_stock: bool,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub dosage_form: Option<String>,
    pub route: Option<String>,
    pub confidence: f64,
    pub match_explanation: String,
    pub indication: Option<String>,
    pub contraindication: Option<String>,
}

impl Suggestion {
    pub fn from_candidate(candidate: &MatchCandidate) -> Self {
        let p = &candidate.product;
        Self {
            product_id: p.id.clone(),
            name: p.name.clone(),
            price: p.price,
            in_stock: p.in_stock(),
            category: p.category.clone(),
            subcategory: p.subcategory.clone(),
            dosage_form: p.dosage_form.clone(),
            route: p.route.clone(),
            confidence: candidate.confidence,
            match_explanation: candidate.reason.explanation().to_string(),
            indication: p.indication.clone(),
            contraindication: p.contraindication.clone(),
        }
    }
}

/// Outcome for one prescription line: a deterministic catalog hit or a
/// ranked suggestion list (possibly empty, never absent).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum LineResolution {
    Found(ExactMatch),
    NotFound { suggestions: Vec<Suggestion> },
}

/// A matched medicine in the final result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FoundMedicine {
    pub product_id: String,
    pub name: String,
    pub price: f64,
    pub in_stock: bool,
    pub requires_prescription: bool,
    pub quantity: u32,
    pub confidence: f64,
    pub match_reason: MatchReason,
    /// Raw OCR fragment the match came from
    pub original_text: String,
}

/// An unmatched medicine with its substitute suggestions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UnmatchedMedicine {
    pub original_text: String,
    pub clean_text: String,
    pub base_name: String,
    pub dosage: Option<Dosage>,
    pub quantity: u32,
    pub suggestions: Vec<Suggestion>,
}

impl UnmatchedMedicine {
    pub fn from_parsed(medicine: &ParsedMedicine, suggestions: Vec<Suggestion>) -> Self {
        Self {
            original_text: medicine.original_text.clone(),
            clean_text: medicine.clean_text.clone(),
            base_name: medicine.base_name.clone(),
            dosage: medicine.dosage.clone(),
            quantity: medicine.quantity,
            suggestions,
        }
    }
}

/// Root output for one analyzed prescription. Built once, never mutated
/// after return.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PrescriptionAnalysis {
    pub found_medicines: Vec<FoundMedicine>,
    pub not_found_medicines: Vec<UnmatchedMedicine>,
    pub overall_confidence: f64,
    pub requires_consultation: bool,
    pub notes: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attr_eq() {
        assert!(attr_eq(Some("NSAID"), Some("nsaid")));
        assert!(attr_eq(Some(" Gel "), Some("gel")));
        assert!(!attr_eq(Some("Gel"), Some("Kem")));
        assert!(!attr_eq(Some("Gel"), None));
        assert!(!attr_eq(None, None));
        assert!(!attr_eq(Some(""), Some("")));
    }

    #[test]
    fn test_profile_completeness() {
        let mut profile = TaxonomyProfile::default();
        assert!(!profile.is_complete());

        profile.category = Some("Thuốc cơ xương khớp".into());
        profile.subcategory = Some("NSAID".into());
        profile.dosage_form = Some("Gel".into());
        assert!(!profile.is_complete());

        profile.route = Some("Dùng ngoài".into());
        assert!(profile.is_complete());
    }

    #[test]
    fn test_agreement_count() {
        let profile = TaxonomyProfile {
            category: Some("Thuốc cơ xương khớp".into()),
            subcategory: Some("NSAID".into()),
            dosage_form: Some("Gel".into()),
            route: Some("Dùng ngoài".into()),
        };

        let mut product = Product::with_id("P1".into(), "Diclofenac gel".into());
        product.category = Some("Thuốc cơ xương khớp".into());
        product.subcategory = Some("nsaid".into());
        product.dosage_form = Some("Gel".into());
        product.route = Some("Uống".into());

        assert_eq!(profile.agreement_with(&product), 3);
    }

    #[test]
    fn test_reason_priority_ordering() {
        assert!(
            MatchReason::FullMatchSameDosage.priority() < MatchReason::FullTaxonomy.priority()
        );
        assert!(MatchReason::FullTaxonomy.priority() < MatchReason::SameCategory.priority());
        assert!(
            MatchReason::SameCategory.priority() < MatchReason::SameTherapeuticGroup.priority()
        );
    }

    #[test]
    fn test_reason_tag_round_trip() {
        let tag = serde_json::to_string(&MatchReason::SameNameSameDosage).unwrap();
        assert_eq!(tag, "\"same_name_same_dosage\"");
        assert_eq!(
            MatchReason::SameNameSameDosage.as_str(),
            "same_name_same_dosage"
        );
    }

    #[test]
    fn test_suggestion_projection() {
        let mut product = Product::with_id("P9".into(), "Ibuprofen 400mg".into());
        product.price = 45000.0;
        product.stock_quantity = 12;
        product.subcategory = Some("NSAID".into());

        let candidate = MatchCandidate {
            product,
            reason: MatchReason::FullTaxonomy,
            confidence: 0.86,
            same_dosage: false,
        };

        let s = Suggestion::from_candidate(&candidate);
        assert_eq!(s.product_id, "P9");
        assert!(s.in_stock);
        assert_eq!(s.confidence, 0.86);
        assert_eq!(s.match_explanation, MatchReason::FullTaxonomy.explanation());
    }
}
