//! Result aggregator: the single join point of the pipeline. Filters and
//! ranks each line's candidates, enforces the cross-line and
//! whole-prescription dedup invariants, and computes overall confidence.

use std::collections::HashSet;

use super::parser::DosageParser;
use super::EngineConfig;
use crate::models::{
    Dosage, ExactMatch, FoundMedicine, LineResolution, MatchCandidate, ParsedMedicine,
    PrescriptionAnalysis, Suggestion, TargetProfile, UnmatchedMedicine,
};

/// Overall-confidence bands.
const CONFIDENCE_EMPTY: f64 = 0.05;
const CONFIDENCE_NONE_MATCHED: f64 = 0.2;
const CONFIDENCE_PARTIAL_FLOOR: f64 = 0.4;
const CONFIDENCE_PARTIAL_CEIL: f64 = 0.9;
const CONFIDENCE_ALL_MATCHED: f64 = 0.95;

/// Per-line outcome produced by the resolution stage.
pub(crate) enum LineOutcome {
    Matched(ExactMatch),
    Candidates {
        profile: TargetProfile,
        candidates: Vec<MatchCandidate>,
    },
}

/// One resolved line waiting for aggregation, with its note accumulator.
pub(crate) struct LineDraft {
    pub medicine: ParsedMedicine,
    pub outcome: LineOutcome,
    pub notes: Vec<String>,
}

/// Aggregator assembling the final [`PrescriptionAnalysis`].
pub struct ResultAggregator {
    dosage: DosageParser,
}

impl Default for ResultAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self {
            dosage: DosageParser::new(),
        }
    }

    pub(crate) fn assemble(
        &self,
        drafts: Vec<LineDraft>,
        engine_notes: Vec<String>,
        config: &EngineConfig,
    ) -> PrescriptionAnalysis {
        let total_lines = drafts.len();
        let matched_lines = drafts
            .iter()
            .filter(|d| matches!(d.outcome, LineOutcome::Matched(_)))
            .count();

        // Exact matches seen anywhere in the prescription, for the
        // cross-line suggestion dedup
        let exact_keys: Vec<(String, Option<Dosage>)> = drafts
            .iter()
            .filter_map(|d| match &d.outcome {
                LineOutcome::Matched(m) => Some(self.name_key(&m.product.name)),
                LineOutcome::Candidates { .. } => None,
            })
            .collect();

        // A catalog id may appear once across found ∪ suggestions
        let mut seen_ids: HashSet<String> = HashSet::new();

        let mut found: Vec<FoundMedicine> = Vec::new();
        let mut unmatched: Vec<UnmatchedMedicine> = Vec::new();
        let mut notes = engine_notes;
        let mut any_prescription_only = false;

        for draft in drafts {
            notes.extend(draft.notes);

            let resolution = match draft.outcome {
                LineOutcome::Matched(exact) => LineResolution::Found(exact),
                LineOutcome::Candidates { profile, candidates } => LineResolution::NotFound {
                    suggestions: self.rank_line(
                        candidates,
                        &profile,
                        &exact_keys,
                        &mut seen_ids,
                        config,
                    ),
                },
            };

            match resolution {
                LineResolution::Found(exact) => {
                    any_prescription_only |= exact.product.requires_prescription;
                    if !seen_ids.insert(exact.product.id.clone()) {
                        // Same product prescribed on two lines: merge counts
                        if let Some(existing) =
                            found.iter_mut().find(|f| f.product_id == exact.product.id)
                        {
                            existing.quantity += draft.medicine.quantity;
                        }
                        continue;
                    }
                    found.push(FoundMedicine {
                        product_id: exact.product.id.clone(),
                        name: exact.product.name.clone(),
                        price: exact.product.price,
                        in_stock: exact.product.in_stock(),
                        requires_prescription: exact.product.requires_prescription,
                        quantity: draft.medicine.quantity,
                        confidence: exact.confidence,
                        match_reason: exact.reason,
                        original_text: draft.medicine.original_text.clone(),
                    });
                }
                LineResolution::NotFound { suggestions } => {
                    if suggestions.is_empty() {
                        notes.push(format!(
                            "Không tìm thấy sản phẩm thay thế phù hợp cho \"{}\", cần dược sĩ tư vấn.",
                            draft.medicine.base_name
                        ));
                    }
                    unmatched.push(UnmatchedMedicine::from_parsed(&draft.medicine, suggestions));
                }
            }
        }

        let overall_confidence = overall_confidence(matched_lines, total_lines);
        let requires_consultation =
            !unmatched.is_empty() || any_prescription_only || total_lines == 0;

        PrescriptionAnalysis {
            found_medicines: found,
            not_found_medicines: unmatched,
            overall_confidence,
            requires_consultation,
            notes: dedup_notes(notes),
        }
    }

    /// Filter one line's candidates by taxonomy agreement (4-of-4, relaxed
    /// uniformly to 3-of-4 when empty), rank them, and apply both dedup
    /// invariants.
    fn rank_line(
        &self,
        candidates: Vec<MatchCandidate>,
        profile: &TargetProfile,
        exact_keys: &[(String, Option<Dosage>)],
        seen_ids: &mut HashSet<String>,
        config: &EngineConfig,
    ) -> Vec<Suggestion> {
        let with_counts: Vec<(MatchCandidate, u8)> = candidates
            .into_iter()
            .map(|c| {
                let count = profile.taxonomy.agreement_with(&c.product);
                (c, count)
            })
            .collect();

        let mut kept: Vec<MatchCandidate> = with_counts
            .iter()
            .filter(|(_, count)| *count == 4)
            .map(|(c, _)| c.clone())
            .collect();
        if kept.is_empty() {
            kept = with_counts
                .into_iter()
                .filter(|(_, count)| *count >= 3)
                .map(|(c, _)| c)
                .collect();
        }

        kept.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.reason.priority().cmp(&b.reason.priority()))
                .then_with(|| a.product.id.cmp(&b.product.id))
        });

        let mut suggestions = Vec::new();
        for candidate in kept {
            if suggestions.len() >= config.max_suggestions {
                break;
            }
            if self.shadowed_by_exact(&candidate, exact_keys) {
                continue;
            }
            // Only surfaced candidates claim their id
            if !seen_ids.insert(candidate.product.id.clone()) {
                continue;
            }
            suggestions.push(Suggestion::from_candidate(&candidate));
        }
        suggestions
    }

    /// Whether a candidate duplicates an exact match from another line:
    /// same normalized name, and equal dosage when both sides have one.
    fn shadowed_by_exact(
        &self,
        candidate: &MatchCandidate,
        exact_keys: &[(String, Option<Dosage>)],
    ) -> bool {
        let (name, dosage) = self.name_key(&candidate.product.name);
        exact_keys.iter().any(|(exact_name, exact_dosage)| {
            if *exact_name != name {
                return false;
            }
            match (&dosage, exact_dosage) {
                (Some(a), Some(b)) => a.same_as(b),
                _ => true,
            }
        })
    }

    fn name_key(&self, product_name: &str) -> (String, Option<Dosage>) {
        let dosage = self.dosage.parse(product_name);
        let name: String = product_name
            .to_lowercase()
            .split_whitespace()
            .filter(|w| self.dosage.parse(w).is_none())
            .collect::<Vec<_>>()
            .join(" ");
        (name, dosage)
    }
}

fn overall_confidence(matched: usize, total: usize) -> f64 {
    if total == 0 {
        CONFIDENCE_EMPTY
    } else if matched == 0 {
        CONFIDENCE_NONE_MATCHED
    } else if matched == total {
        CONFIDENCE_ALL_MATCHED
    } else {
        let fraction = matched as f64 / total as f64;
        CONFIDENCE_PARTIAL_FLOOR + (CONFIDENCE_PARTIAL_CEIL - CONFIDENCE_PARTIAL_FLOOR) * fraction
    }
}

fn dedup_notes(notes: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    notes
        .into_iter()
        .filter(|n| seen.insert(n.clone()))
        .collect()
}
