//! Prescription text models: segmented lines, dosage expressions, and the
//! structured medicine reference extracted from one line.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Tolerance for comparing dosage values after unit normalization.
const DOSE_EPSILON: f64 = 1e-6;

/// One logical medicine entry after OCR line merging.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PrescriptionLine {
    /// Merged entry text, ordinal marker included
    pub text: String,
    /// Index of the first source line this entry came from (diagnostics)
    pub source_line_index: usize,
}

/// A single value/unit component of a dosage expression.
///
/// Values are stored normalized: mass in mg, volume in ml. Construction via
/// [`DosePart::new`] performs the conversion, so two parts written as
/// "0,5g" and "500mg" compare equal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DosePart {
    pub value: f64,
    pub unit: String,
}

impl DosePart {
    /// Build a part from a raw value and unit, normalizing to canonical
    /// units (mg for mass, ml for volume).
    pub fn new(value: f64, unit: &str) -> Self {
        let unit = unit.trim().to_lowercase();
        let (value, unit) = match unit.as_str() {
            "mcg" | "µg" | "ug" => (value * 0.001, "mg".to_string()),
            "g" | "gr" => (value * 1000.0, "mg".to_string()),
            "l" => (value * 1000.0, "ml".to_string()),
            "ui" => (value, "iu".to_string()),
            _ => (value, unit),
        };
        Self { value, unit }
    }

    fn same_as(&self, other: &DosePart) -> bool {
        self.unit == other.unit && (self.value - other.value).abs() < DOSE_EPSILON
    }
}

impl fmt::Display for DosePart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Integral values render without the ".0"; the magnitude guard
        // keeps the i64 cast lossless
        if self.value.fract().abs() < DOSE_EPSILON && self.value.abs() < 1e15 {
            write!(f, "{}{}", self.value as i64, self.unit)
        } else {
            write!(f, "{}{}", self.value, self.unit)
        }
    }
}

/// A canonical, order-independent dosage expression.
///
/// "500mg" is one part; "2,5g+0,3g+0,2g" is three. Parts are sorted at
/// construction so two expressions written in different orders compare
/// equal, and the [`fmt::Display`] rendering re-parses to the same value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Dosage {
    pub parts: Vec<DosePart>,
}

impl Dosage {
    /// Build a dosage from parts; returns `None` for an empty list.
    pub fn new(mut parts: Vec<DosePart>) -> Option<Self> {
        if parts.is_empty() {
            return None;
        }
        parts.sort_by(|a, b| {
            b.value
                .partial_cmp(&a.value)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.unit.cmp(&b.unit))
        });
        Some(Self { parts })
    }

    /// Structural equality of normalized dosage expressions.
    pub fn same_as(&self, other: &Dosage) -> bool {
        self.parts.len() == other.parts.len()
            && self
                .parts
                .iter()
                .zip(other.parts.iter())
                .all(|(a, b)| a.same_as(b))
    }
}

impl fmt::Display for Dosage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.parts.iter().map(|p| p.to_string()).collect();
        write!(f, "{}", rendered.join("+"))
    }
}

/// Structured medicine reference extracted from one prescription line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParsedMedicine {
    /// Raw line text as segmented, preserved for the reviewing pharmacist
    pub original_text: String,
    /// Name plus canonical dosage, schedule/quantity tokens removed
    pub clean_text: String,
    /// Medicine name with dosage expression stripped
    pub base_name: String,
    /// Canonical dosage expression, `None` when nothing parseable was found
    pub dosage: Option<Dosage>,
    /// Prescribed quantity; defaults to 1 when absent
    pub quantity: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dose_part_normalization() {
        let grams = DosePart::new(0.5, "g");
        let milligrams = DosePart::new(500.0, "mg");
        assert!(grams.same_as(&milligrams));

        let mcg = DosePart::new(500.0, "mcg");
        assert!(mcg.same_as(&DosePart::new(0.5, "mg")));

        let litre = DosePart::new(0.1, "L");
        assert!(litre.same_as(&DosePart::new(100.0, "ml")));
    }

    #[test]
    fn test_dosage_order_independent() {
        let a = Dosage::new(vec![DosePart::new(2.5, "g"), DosePart::new(0.3, "g")]).unwrap();
        let b = Dosage::new(vec![DosePart::new(0.3, "g"), DosePart::new(2.5, "g")]).unwrap();
        assert!(a.same_as(&b));
        assert_eq!(a.to_string(), b.to_string());
    }

    #[test]
    fn test_dosage_display_integral_values() {
        let d = Dosage::new(vec![DosePart::new(500.0, "mg")]).unwrap();
        assert_eq!(d.to_string(), "500mg");

        let multi = Dosage::new(vec![
            DosePart::new(2.5, "g"),
            DosePart::new(0.3, "g"),
            DosePart::new(0.2, "g"),
        ])
        .unwrap();
        assert_eq!(multi.to_string(), "2500mg+300mg+200mg");
    }

    #[test]
    fn test_dosage_display_fractional() {
        let d = Dosage::new(vec![DosePart::new(1.0, "%"), DosePart::new(2.5, "ml")]).unwrap();
        assert_eq!(d.to_string(), "2.5ml+1%");
    }

    #[test]
    fn test_empty_dosage_is_none() {
        assert!(Dosage::new(vec![]).is_none());
    }

    #[test]
    fn test_different_part_counts_not_equal() {
        let a = Dosage::new(vec![DosePart::new(500.0, "mg")]).unwrap();
        let b = Dosage::new(vec![DosePart::new(500.0, "mg"), DosePart::new(1.0, "%")]).unwrap();
        assert!(!a.same_as(&b));
    }
}
