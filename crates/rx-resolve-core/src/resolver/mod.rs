//! Prescription medicine resolution engine.
//!
//! Pipeline: OCR normalization → line segmentation → validation → parsing
//! → exact match | (classification → candidate search → scoring) →
//! aggregation.
//!
//! Lines are independent and resolved with bounded worker concurrency;
//! aggregation is the single join point. The engine never fails on
//! malformed input: every degenerate case resolves to a (possibly
//! low-confidence, possibly empty) analysis result.

mod aggregate;
mod classify;
mod exact;
mod normalizer;
mod parser;
mod scorer;
mod search;
mod segmenter;
mod validator;

pub use aggregate::ResultAggregator;
pub use classify::AttributeClassifier;
pub use exact::ExactMatchResolver;
pub use normalizer::OcrNormalizer;
pub use parser::{DosageParser, MedicineNameParser};
pub use scorer::MatchScorer;
pub use search::CandidateSearcher;
pub use segmenter::LineSegmenter;
pub use validator::{LineValidator, RejectReason};

use std::sync::Mutex;
use std::time::Duration;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::db::{CandidateFilter, Database, DbError};
use crate::models::{ParsedMedicine, PrescriptionAnalysis, Product};

use aggregate::{LineDraft, LineOutcome};

/// Shown when the OCR text is empty or unreadable.
const NOTE_UNREADABLE: &str =
    "Không thể đọc được nội dung đơn thuốc. Vui lòng chụp lại ảnh rõ nét hơn.";

/// Shown when no line survived segmentation and validation.
const NOTE_NO_MEDICINES: &str =
    "Không nhận diện được dòng thuốc nào trong đơn. Vui lòng kiểm tra lại ảnh chụp.";

/// Catalog collaborator errors.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("catalog query timed out")]
    Timeout,

    #[error("catalog unavailable: {0}")]
    Unavailable(String),
}

pub type CatalogResult<T> = Result<T, CatalogError>;

impl From<DbError> for CatalogError {
    fn from(e: DbError) -> Self {
        CatalogError::Unavailable(e.to_string())
    }
}

/// Read-only query surface of the product catalog (spec'd collaborator).
/// Every call carries an explicit timeout; failure or expiry degrades to
/// "no result" for the affected line only.
pub trait CatalogSource {
    /// Zero-or-one best record for a name term (containment/equality).
    fn find_best_by_name(&self, term: &str, timeout: Duration) -> CatalogResult<Option<Product>>;

    /// Similar-named reference record for taxonomy inference.
    fn find_reference(&self, name: &str, timeout: Duration) -> CatalogResult<Option<Product>>;

    /// Multi-field filtered candidate search.
    fn search_candidates(
        &self,
        filter: &CandidateFilter,
        timeout: Duration,
    ) -> CatalogResult<Vec<Product>>;
}

impl CatalogSource for Mutex<Database> {
    fn find_best_by_name(&self, term: &str, timeout: Duration) -> CatalogResult<Option<Product>> {
        let db = self
            .lock()
            .map_err(|e| CatalogError::Unavailable(format!("lock poisoned: {e}")))?;
        db.set_busy_timeout(timeout)?;
        Ok(db.find_best_by_name(term)?)
    }

    fn find_reference(&self, name: &str, timeout: Duration) -> CatalogResult<Option<Product>> {
        let db = self
            .lock()
            .map_err(|e| CatalogError::Unavailable(format!("lock poisoned: {e}")))?;
        db.set_busy_timeout(timeout)?;
        Ok(db.find_reference(name)?)
    }

    fn search_candidates(
        &self,
        filter: &CandidateFilter,
        timeout: Duration,
    ) -> CatalogResult<Vec<Product>> {
        let db = self
            .lock()
            .map_err(|e| CatalogError::Unavailable(format!("lock poisoned: {e}")))?;
        db.set_busy_timeout(timeout)?;
        Ok(db.search_candidates(filter)?)
    }
}

/// Classifier collaborator errors.
#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("classifier call timed out")]
    Timeout,

    #[error("classifier unavailable: {0}")]
    Unavailable(String),

    #[error("invalid classifier response: {0}")]
    InvalidResponse(String),
}

/// Best-effort taxonomy guess from the external classifier. Any field may
/// be empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ClassifierReply {
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub dosage_form: Option<String>,
    pub route: Option<String>,
    pub analysis_text: Option<String>,
}

/// External AI classifier collaborator.
pub trait MedicineClassifier: Send + Sync {
    /// Classify a medicine name (and optional dosage text) into a taxonomy
    /// guess. Implementations enforce the timeout as a call deadline.
    fn classify(
        &self,
        name: &str,
        dosage: Option<&str>,
        timeout: Duration,
    ) -> Result<ClassifierReply, ClassifierError>;
}

/// The classifier as a capability: absence is a first-class state, not a
/// null checked at each call site. Errors and timeouts collapse into the
/// same "no reply" outcome.
pub enum ClassifierHandle {
    Absent,
    Available(Box<dyn MedicineClassifier>),
}

impl ClassifierHandle {
    pub fn classify(
        &self,
        name: &str,
        dosage: Option<&str>,
        timeout: Duration,
    ) -> Option<ClassifierReply> {
        match self {
            ClassifierHandle::Absent => None,
            ClassifierHandle::Available(classifier) => {
                match classifier.classify(name, dosage, timeout) {
                    Ok(reply) => Some(reply),
                    Err(e) => {
                        debug!(name, error = %e, "classifier unavailable for this line");
                        None
                    }
                }
            }
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, ClassifierHandle::Available(_))
    }
}

/// Engine tuning knobs.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Bounded worker concurrency for per-line resolution
    pub max_workers: usize,
    /// Deadline for each catalog query
    pub catalog_timeout: Duration,
    /// Deadline for each classifier call
    pub classifier_timeout: Duration,
    /// Cap on candidates retrieved per line
    pub candidate_limit: usize,
    /// Cap on suggestions surfaced per line
    pub max_suggestions: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            catalog_timeout: Duration::from_secs(2),
            classifier_timeout: Duration::from_secs(5),
            candidate_limit: 20,
            max_suggestions: 5,
        }
    }
}

/// Main engine coordinating the full pipeline.
pub struct Engine<'a> {
    catalog: &'a (dyn CatalogSource + Sync),
    classifier: ClassifierHandle,
    config: EngineConfig,
    normalizer: OcrNormalizer,
    segmenter: LineSegmenter,
    validator: LineValidator,
    parser: MedicineNameParser,
    exact: ExactMatchResolver,
    attributes: AttributeClassifier,
    searcher: CandidateSearcher,
    scorer: MatchScorer,
    aggregator: ResultAggregator,
}

impl<'a> Engine<'a> {
    /// Create an engine with the default configuration.
    pub fn new(catalog: &'a (dyn CatalogSource + Sync), classifier: ClassifierHandle) -> Self {
        Self::with_config(catalog, classifier, EngineConfig::default())
    }

    /// Create an engine with an explicit configuration.
    pub fn with_config(
        catalog: &'a (dyn CatalogSource + Sync),
        classifier: ClassifierHandle,
        config: EngineConfig,
    ) -> Self {
        Self {
            catalog,
            classifier,
            config,
            normalizer: OcrNormalizer::new(),
            segmenter: LineSegmenter::new(),
            validator: LineValidator::new(),
            parser: MedicineNameParser::new(),
            exact: ExactMatchResolver::new(),
            attributes: AttributeClassifier::new(),
            searcher: CandidateSearcher::new(),
            scorer: MatchScorer::new(),
            aggregator: ResultAggregator::new(),
        }
    }

    /// Analyze one prescription's OCR text. Total: never fails, all
    /// degenerate inputs resolve to a low-confidence result.
    pub fn analyze(&self, raw_text: &str) -> PrescriptionAnalysis {
        let mut engine_notes = Vec::new();

        if raw_text.trim().is_empty() {
            engine_notes.push(NOTE_UNREADABLE.to_string());
            return self
                .aggregator
                .assemble(Vec::new(), engine_notes, &self.config);
        }

        let normalized = self.normalizer.normalize(raw_text);
        let lines = self.segmenter.segment(&normalized);

        let mut medicines = Vec::new();
        for line in &lines {
            match self.validator.validate(&line.text) {
                Ok(()) => medicines.push(self.parser.parse(line)),
                Err(reason) => debug!(
                    line = %line.text,
                    source_line = line.source_line_index,
                    ?reason,
                    "rejected segmented line"
                ),
            }
        }

        if medicines.is_empty() {
            engine_notes.push(NOTE_NO_MEDICINES.to_string());
            return self
                .aggregator
                .assemble(Vec::new(), engine_notes, &self.config);
        }

        let drafts = self.resolve_all(&medicines);
        self.aggregator.assemble(drafts, engine_notes, &self.config)
    }

    /// Resolve every line, in parallel when configured. Order preserved.
    fn resolve_all(&self, medicines: &[ParsedMedicine]) -> Vec<LineDraft> {
        let workers = self.config.max_workers.min(medicines.len());
        if workers > 1 {
            match rayon::ThreadPoolBuilder::new().num_threads(workers).build() {
                Ok(pool) => {
                    return pool
                        .install(|| medicines.par_iter().map(|m| self.resolve_line(m)).collect())
                }
                Err(e) => warn!(error = %e, "worker pool unavailable; resolving sequentially"),
            }
        }
        medicines.iter().map(|m| self.resolve_line(m)).collect()
    }

    /// Resolve one line: exact match first, otherwise classify → search →
    /// score. Pure apart from read-only collaborator queries.
    fn resolve_line(&self, medicine: &ParsedMedicine) -> LineDraft {
        if let Some(exact) = self
            .exact
            .resolve(self.catalog, medicine, self.config.catalog_timeout)
        {
            return LineDraft {
                medicine: medicine.clone(),
                outcome: LineOutcome::Matched(exact),
                notes: Vec::new(),
            };
        }

        let target = self
            .attributes
            .classify(self.catalog, &self.classifier, medicine, &self.config);
        let (products, notes) = self
            .searcher
            .search(self.catalog, medicine, &target, &self.config);
        let candidates = products
            .iter()
            .filter_map(|p| self.scorer.score(p, medicine, &target))
            .collect::<Vec<_>>();

        if candidates.is_empty() {
            debug!(name = %medicine.base_name, "no substitute candidates for line");
        }

        LineDraft {
            medicine: medicine.clone(),
            outcome: LineOutcome::Candidates {
                profile: target,
                candidates,
            },
            notes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MatchReason;

    fn seeded_catalog() -> Mutex<Database> {
        let db = Database::open_in_memory().unwrap();

        let mut para = Product::with_id("PARA500".into(), "Paracetamol 500mg".into());
        para.price = 25000.0;
        para.stock_quantity = 100;
        para.active_ingredient = Some("Paracetamol".into());
        db.upsert_product(&para).unwrap();

        let mut gel = Product::with_id("DICLO-GEL".into(), "Diclofenac Gel 1%".into());
        gel.category = Some("Thuốc cơ xương khớp".into());
        gel.subcategory = Some("NSAID".into());
        gel.dosage_form = Some("Gel".into());
        gel.route = Some("Dùng ngoài".into());
        gel.active_ingredient = Some("Diclofenac".into());
        db.upsert_product(&gel).unwrap();

        Mutex::new(db)
    }

    #[test]
    fn test_analyze_exact_match() {
        let catalog = seeded_catalog();
        let engine = Engine::new(&catalog, ClassifierHandle::Absent);

        let result = engine.analyze("1. Paracetamol 500mg SL: 20 viên");

        assert_eq!(result.found_medicines.len(), 1);
        let found = &result.found_medicines[0];
        assert_eq!(found.product_id, "PARA500");
        assert_eq!(found.quantity, 20);
        assert_eq!(found.match_reason, MatchReason::SameNameSameDosage);
    }

    #[test]
    fn test_analyze_empty_text() {
        let catalog = seeded_catalog();
        let engine = Engine::new(&catalog, ClassifierHandle::Absent);

        let result = engine.analyze("   ");

        assert!(result.found_medicines.is_empty());
        assert!(result.not_found_medicines.is_empty());
        assert!(result.requires_consultation);
        assert!(!result.notes.is_empty());
    }

    #[test]
    fn test_analyze_sequential_matches_parallel() {
        let catalog = seeded_catalog();
        let text = "1. Paracetamol 500mg SL: 20 viên\n2. Voltaren Emulgel 1%/20g SL: 1 tuýp";

        let parallel = Engine::new(&catalog, ClassifierHandle::Absent).analyze(text);
        let sequential = Engine::with_config(
            &catalog,
            ClassifierHandle::Absent,
            EngineConfig {
                max_workers: 1,
                ..EngineConfig::default()
            },
        )
        .analyze(text);

        assert_eq!(parallel, sequential);
    }

    #[test]
    fn test_classifier_handle_absent() {
        let handle = ClassifierHandle::Absent;
        assert!(!handle.is_available());
        assert!(handle
            .classify("Paracetamol", None, Duration::from_secs(1))
            .is_none());
    }
}
