//! Rx-Resolve Core Library
//!
//! Prescription medicine resolution engine for the pharmacy storefront.
//!
//! # Architecture
//!
//! ```text
//! Photo → OCR text → Normalization → Segmentation → Validation → Parsing
//!                                                                    │
//!                                              ┌─────────────────────┤
//!                                              ▼                     ▼
//!                                        Exact match           Classification
//!                                      (catalog lookup)     (classifier + rules)
//!                                              │                     │
//!                                              │             Candidate search
//!                                              │                     │
//!                                              │               Match scoring
//!                                              │                     │
//!                                              └─────────┬───────────┘
//!                                                        ▼
//!                                                   Aggregation
//!                                          (dedup, ranking, confidence)
//! ```
//!
//! # Core Principle
//!
//! **The engine is a candidate generator.** Unmatched lines and low
//! confidence always defer to a human pharmacist; no suggestion is ever
//! auto-accepted into an order.
//!
//! # Modules
//!
//! - [`db`]: SQLite catalog store with FTS5 search
//! - [`models`]: Domain types (Product, ParsedMedicine, PrescriptionAnalysis, ...)
//! - [`resolver`]: The resolution pipeline (normalizer → ... → aggregator)

pub mod db;
pub mod models;
pub mod resolver;

// Re-export commonly used types
pub use db::{CandidateFilter, Database};
pub use models::{
    Dosage, DosePart, FoundMedicine, MatchCandidate, MatchReason, ParsedMedicine,
    PrescriptionAnalysis, PrescriptionLine, Product, Suggestion, TaxonomyProfile,
    UnmatchedMedicine,
};
pub use resolver::{
    CatalogSource, ClassifierHandle, ClassifierReply, Engine, EngineConfig, MedicineClassifier,
    OcrNormalizer,
};

// UniFFI setup - using proc macros
uniffi::setup_scaffolding!();

use std::sync::{Arc, Mutex};

// =========================================================================
// FFI Error Type
// =========================================================================

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum RxResolveError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<db::DbError> for RxResolveError {
    fn from(e: db::DbError) -> Self {
        RxResolveError::DatabaseError(e.to_string())
    }
}

impl From<serde_json::Error> for RxResolveError {
    fn from(e: serde_json::Error) -> Self {
        RxResolveError::SerializationError(e.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for RxResolveError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        RxResolveError::DatabaseError(format!("Lock poisoned: {}", e))
    }
}

// =========================================================================
// Factory Functions (exported to FFI)
// =========================================================================

/// Open or create a catalog database at the given path.
#[uniffi::export]
pub fn open_catalog(path: String) -> Result<Arc<RxResolveCore>, RxResolveError> {
    let db = Database::open(&path)?;
    Ok(Arc::new(RxResolveCore {
        db: Arc::new(Mutex::new(db)),
    }))
}

/// Create an in-memory catalog (for testing).
#[uniffi::export]
pub fn open_catalog_in_memory() -> Result<Arc<RxResolveCore>, RxResolveError> {
    let db = Database::open_in_memory()?;
    Ok(Arc::new(RxResolveCore {
        db: Arc::new(Mutex::new(db)),
    }))
}

// =========================================================================
// Main API Object
// =========================================================================

/// Thread-safe catalog + engine wrapper for FFI.
#[derive(uniffi::Object)]
pub struct RxResolveCore {
    db: Arc<Mutex<Database>>,
}

#[uniffi::export]
impl RxResolveCore {
    // =====================================================================
    // Catalog Operations
    // =====================================================================

    /// Add or update a product.
    pub fn upsert_product(&self, product: FfiProduct) -> Result<(), RxResolveError> {
        if product.id.trim().is_empty() || product.name.trim().is_empty() {
            return Err(RxResolveError::InvalidInput(
                "product id and name must be non-empty".into(),
            ));
        }
        let db = self.db.lock()?;
        db.upsert_product(&product.into())?;
        Ok(())
    }

    /// Get a product by id.
    pub fn get_product(&self, id: String) -> Result<Option<FfiProduct>, RxResolveError> {
        let db = self.db.lock()?;
        let product = db.get_product(&id)?;
        Ok(product.map(|p| p.into()))
    }

    /// Full-text product search over name, aliases, and ingredient.
    pub fn search_products(
        &self,
        query: String,
        limit: u32,
    ) -> Result<Vec<FfiProduct>, RxResolveError> {
        let db = self.db.lock()?;
        let products = db.search_products(&query, limit as usize)?;
        Ok(products.into_iter().map(|p| p.into()).collect())
    }

    /// All catalog products, optionally restricted to active ones.
    pub fn list_products(&self, active_only: bool) -> Result<Vec<FfiProduct>, RxResolveError> {
        let db = self.db.lock()?;
        let products = db.list_products(active_only)?;
        Ok(products.into_iter().map(|p| p.into()).collect())
    }

    /// Mark a product as no longer sellable.
    pub fn deactivate_product(&self, id: String) -> Result<(), RxResolveError> {
        let db = self.db.lock()?;
        if !db.deactivate_product(&id)? {
            return Err(RxResolveError::NotFound(id));
        }
        Ok(())
    }

    // =====================================================================
    // Prescription Analysis
    // =====================================================================

    /// Run the full resolution pipeline on one prescription's OCR text.
    pub fn analyze_prescription(
        &self,
        raw_text: String,
    ) -> Result<FfiPrescriptionAnalysis, RxResolveError> {
        let engine = Engine::new(&*self.db, ClassifierHandle::Absent);
        Ok(engine.analyze(&raw_text).into())
    }

    /// Same analysis, serialized to JSON for web/debug consumers.
    pub fn analyze_prescription_json(&self, raw_text: String) -> Result<String, RxResolveError> {
        let engine = Engine::new(&*self.db, ClassifierHandle::Absent);
        let analysis = engine.analyze(&raw_text);
        Ok(serde_json::to_string(&analysis)?)
    }
}

// =========================================================================
// FFI Types
// =========================================================================

/// FFI-safe product.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiProduct {
    pub id: String,
    pub name: String,
    pub aliases: Vec<String>,
    pub price: f64,
    pub stock_quantity: u32,
    pub requires_prescription: bool,
    pub active_ingredient: Option<String>,
    pub therapeutic_group: Option<String>,
    pub indication: Option<String>,
    pub contraindication: Option<String>,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub dosage_form: Option<String>,
    pub route: Option<String>,
    pub active: bool,
}

impl From<Product> for FfiProduct {
    fn from(p: Product) -> Self {
        Self {
            id: p.id,
            name: p.name,
            aliases: p.aliases,
            price: p.price,
            stock_quantity: p.stock_quantity,
            requires_prescription: p.requires_prescription,
            active_ingredient: p.active_ingredient,
            therapeutic_group: p.therapeutic_group,
            indication: p.indication,
            contraindication: p.contraindication,
            category: p.category,
            subcategory: p.subcategory,
            dosage_form: p.dosage_form,
            route: p.route,
            active: p.active,
        }
    }
}

impl From<FfiProduct> for Product {
    fn from(p: FfiProduct) -> Self {
        Product {
            id: p.id,
            name: p.name,
            aliases: p.aliases,
            price: p.price,
            stock_quantity: p.stock_quantity,
            requires_prescription: p.requires_prescription,
            active_ingredient: p.active_ingredient,
            therapeutic_group: p.therapeutic_group,
            indication: p.indication,
            contraindication: p.contraindication,
            category: p.category,
            subcategory: p.subcategory,
            dosage_form: p.dosage_form,
            route: p.route,
            active: p.active,
        }
    }
}

/// FFI-safe substitute suggestion.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiSuggestion {
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

impl From<Suggestion> for FfiSuggestion {
    fn from(s: Suggestion) -> Self {
        Self {
            product_id: s.product_id,
            name: s.name,
            price: s.price,
            in_stock: s.in_stock,
            category: s.category,
            subcategory: s.subcategory,
            dosage_form: s.dosage_form,
            route: s.route,
            confidence: s.confidence,
            match_explanation: s.match_explanation,
            indication: s.indication,
            contraindication: s.contraindication,
        }
    }
}

/// FFI-safe matched medicine.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiFoundMedicine {
    pub product_id: String,
    pub name: String,
    pub price: f64,
    pub in_stock: bool,
    pub requires_prescription: bool,
    pub quantity: u32,
    pub confidence: f64,
    pub match_reason: String,
    pub original_text: String,
}

impl From<FoundMedicine> for FfiFoundMedicine {
    fn from(f: FoundMedicine) -> Self {
        Self {
            product_id: f.product_id,
            name: f.name,
            price: f.price,
            in_stock: f.in_stock,
            requires_prescription: f.requires_prescription,
            quantity: f.quantity,
            confidence: f.confidence,
            match_reason: f.match_reason.as_str().to_string(),
            original_text: f.original_text,
        }
    }
}

/// FFI-safe unmatched medicine with its suggestions.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiUnmatchedMedicine {
    pub original_text: String,
    pub clean_text: String,
    pub base_name: String,
    pub dosage_text: Option<String>,
    pub quantity: u32,
    pub suggestions: Vec<FfiSuggestion>,
}

impl From<UnmatchedMedicine> for FfiUnmatchedMedicine {
    fn from(u: UnmatchedMedicine) -> Self {
        Self {
            original_text: u.original_text,
            clean_text: u.clean_text,
            base_name: u.base_name,
            dosage_text: u.dosage.map(|d| d.to_string()),
            quantity: u.quantity,
            suggestions: u.suggestions.into_iter().map(|s| s.into()).collect(),
        }
    }
}

/// FFI-safe analysis result.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPrescriptionAnalysis {
    pub found_medicines: Vec<FfiFoundMedicine>,
    pub not_found_medicines: Vec<FfiUnmatchedMedicine>,
    pub overall_confidence: f64,
    pub requires_consultation: bool,
    pub notes: Vec<String>,
    pub analyzed_at: String,
}

impl From<PrescriptionAnalysis> for FfiPrescriptionAnalysis {
    fn from(a: PrescriptionAnalysis) -> Self {
        Self {
            found_medicines: a.found_medicines.into_iter().map(|f| f.into()).collect(),
            not_found_medicines: a
                .not_found_medicines
                .into_iter()
                .map(|u| u.into())
                .collect(),
            overall_confidence: a.overall_confidence,
            requires_consultation: a.requires_consultation,
            notes: a.notes,
            analyzed_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}
