//! Exact-match resolver: ordered name-variant generation and
//! first-hit-wins catalog lookup.

use std::time::Duration;

use regex::Regex;
use tracing::warn;

use super::parser::DosageParser;
use super::CatalogSource;
use crate::models::{ExactMatch, MatchReason, ParsedMedicine};

/// Confidence for a name hit whose dosage also matches.
const EXACT_NAME_DOSAGE_CONFIDENCE: f64 = 0.98;
/// Confidence for a name hit without a confirmed dosage.
const EXACT_NAME_CONFIDENCE: f64 = 0.9;

/// Deterministic resolver for the "this product is in the catalog" path.
pub struct ExactMatchResolver {
    paren_re: Regex,
    dosage: DosageParser,
}

impl Default for ExactMatchResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl ExactMatchResolver {
    pub fn new() -> Self {
        Self {
            paren_re: Regex::new(r"\(([^)]*)\)").expect("static regex"),
            dosage: DosageParser::new(),
        }
    }

    /// Try each search variant in order and return the first catalog hit.
    /// Catalog failures degrade to "no match" for this line only.
    pub fn resolve(
        &self,
        catalog: &dyn CatalogSource,
        medicine: &ParsedMedicine,
        timeout: Duration,
    ) -> Option<ExactMatch> {
        for term in self.search_terms(medicine) {
            match catalog.find_best_by_name(&term, timeout) {
                Ok(Some(product)) => {
                    let same_dosage = match (&medicine.dosage, self.dosage.parse(&product.name))
                    {
                        (Some(target), Some(found)) => target.same_as(&found),
                        _ => false,
                    };
                    let (reason, confidence) = if same_dosage {
                        (MatchReason::SameNameSameDosage, EXACT_NAME_DOSAGE_CONFIDENCE)
                    } else {
                        (MatchReason::SameName, EXACT_NAME_CONFIDENCE)
                    };
                    return Some(ExactMatch {
                        product,
                        reason,
                        confidence,
                    });
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(term = %term, error = %e, "catalog lookup failed; treating as no match");
                }
            }
        }
        None
    }

    /// Ordered, deduplicated search variants, highest specificity first:
    /// brand+dosage, brand, base+dosage, base, clean text, original text.
    fn search_terms(&self, medicine: &ParsedMedicine) -> Vec<String> {
        let mut terms: Vec<String> = Vec::new();
        let dosage = medicine.dosage.as_ref().map(|d| d.to_string());

        if let Some(brand) = self.brand_of(&medicine.base_name) {
            if let Some(d) = &dosage {
                push_unique(&mut terms, format!("{} {}", brand, d));
            }
            push_unique(&mut terms, brand);
        }

        let plain_base = self
            .paren_re
            .replace_all(&medicine.base_name, " ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        if let Some(d) = &dosage {
            push_unique(&mut terms, format!("{} {}", plain_base, d));
        }
        push_unique(&mut terms, plain_base);
        push_unique(&mut terms, medicine.clean_text.clone());
        push_unique(&mut terms, medicine.original_text.clone());

        terms
    }

    /// Brand name from the last parenthetical group, when it looks like a
    /// proper name rather than a dosage or instruction fragment.
    fn brand_of(&self, base_name: &str) -> Option<String> {
        let content = self
            .paren_re
            .captures_iter(base_name)
            .last()
            .map(|caps| caps[1].trim().to_string())?;

        let proper = content.chars().count() >= 3
            && content
                .chars()
                .next()
                .map(|c| c.is_alphabetic() && c.is_uppercase())
                .unwrap_or(false)
            && self.dosage.parse(&content).is_none();

        proper.then_some(content)
    }
}

fn push_unique(terms: &mut Vec<String>, term: String) {
    let key = term.trim().to_lowercase();
    if key.is_empty() {
        return;
    }
    if !terms.iter().any(|t| t.trim().to_lowercase() == key) {
        terms.push(term.trim().to_string());
    }
}
