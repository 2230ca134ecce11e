//! Pharmacy catalog models.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single product in the pharmacy catalog.
///
/// The four taxonomy fields (`category`, `subcategory`, `dosage_form`,
/// `route`) are the primary matching key for substitute suggestions and may
/// be missing on sparsely tagged records.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Product {
    /// Unique catalog identifier
    pub id: String,
    /// Display name as shown in the store (e.g., "Paracetamol 500mg")
    pub name: String,
    /// Alternative names/spellings for lookup (brand names, old labels)
    pub aliases: Vec<String>,
    /// Retail price in VND
    pub price: f64,
    /// Units currently in stock
    pub stock_quantity: u32,
    /// Whether dispensing requires a pharmacist-verified prescription
    pub requires_prescription: bool,
    /// Active pharmaceutical ingredient (e.g., "Diclofenac diethylamine")
    pub active_ingredient: Option<String>,
    /// Therapeutic group (e.g., "Kháng viêm không steroid (NSAID)")
    pub therapeutic_group: Option<String>,
    /// Indication text shown to the pharmacist
    pub indication: Option<String>,
    /// Contraindication text shown to the pharmacist
    pub contraindication: Option<String>,
    /// Taxonomy: top-level category (e.g., "Thuốc cơ xương khớp")
    pub category: Option<String>,
    /// Taxonomy: subcategory (e.g., "NSAID")
    pub subcategory: Option<String>,
    /// Taxonomy: dosage form (e.g., "Gel", "Viên nén")
    pub dosage_form: Option<String>,
    /// Taxonomy: route of administration (e.g., "Uống", "Dùng ngoài")
    pub route: Option<String>,
    /// Whether this product is currently sellable
    pub active: bool,
}

impl Product {
    /// Create a new product with a freshly minted id.
    pub fn new(name: String) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), name)
    }

    /// Create a new product with an explicit id (catalog import path).
    pub fn with_id(id: String, name: String) -> Self {
        Self {
            id,
            name,
            aliases: Vec::new(),
            price: 0.0,
            stock_quantity: 0,
            requires_prescription: false,
            active_ingredient: None,
            therapeutic_group: None,
            indication: None,
            contraindication: None,
            category: None,
            subcategory: None,
            dosage_form: None,
            route: None,
            active: true,
        }
    }

    /// Whether at least one unit is available for sale.
    pub fn in_stock(&self) -> bool {
        self.stock_quantity > 0
    }

    /// Check whether a search term matches this product's name or aliases
    /// by case-insensitive containment in either direction.
    pub fn name_matches(&self, term: &str) -> bool {
        let term = term.trim().to_lowercase();
        if term.is_empty() {
            return false;
        }
        let name = self.name.to_lowercase();
        if name.contains(&term) || term.contains(&name) {
            return true;
        }
        self.aliases
            .iter()
            .any(|a| a.to_lowercase() == term || a.to_lowercase().contains(&term))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_mints_id() {
        let a = Product::new("Paracetamol 500mg".into());
        let b = Product::new("Paracetamol 500mg".into());
        assert!(!a.id.is_empty());
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_in_stock() {
        let mut p = Product::new("Test".into());
        assert!(!p.in_stock());
        p.stock_quantity = 3;
        assert!(p.in_stock());
    }

    #[test]
    fn test_name_matches_containment() {
        let mut p = Product::with_id("P1".into(), "Paracetamol 500mg".into());
        p.aliases = vec!["Panadol".into()];

        assert!(p.name_matches("paracetamol"));
        assert!(p.name_matches("Paracetamol 500mg"));
        // Term containing the full name also counts
        assert!(p.name_matches("Paracetamol 500mg SL 20"));
        assert!(p.name_matches("panadol"));
        assert!(!p.name_matches("ibuprofen"));
        assert!(!p.name_matches("   "));
    }
}
