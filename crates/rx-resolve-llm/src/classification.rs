//! Taxonomy classification parsed from LLM output.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification errors.
#[derive(Error, Debug)]
pub enum ClassificationError {
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Invalid response format: {0}")]
    InvalidFormat(String),

    #[error("LLM inference error: {0}")]
    Inference(String),
}

pub type ClassificationResult<T> = Result<T, ClassificationError>;

/// Best-effort taxonomy classification of one medicine. Matches the shape
/// the core resolver expects from its classifier collaborator; any field
/// may be empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ClassificationOutput {
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub dosage_form: Option<String>,
    pub route: Option<String>,
    pub analysis_text: Option<String>,
}

/// Parse LLM output JSON into a classification.
pub fn parse_classification_output(json: &str) -> ClassificationResult<ClassificationOutput> {
    // Try to find JSON in the response (in case LLM adds extra text)
    let json_start = json.find('{').ok_or_else(|| {
        ClassificationError::InvalidFormat("No JSON object found in response".into())
    })?;
    let json_end = json.rfind('}').ok_or_else(|| {
        ClassificationError::InvalidFormat("No closing brace found in response".into())
    })?;
    if json_end < json_start {
        return Err(ClassificationError::InvalidFormat(
            "Mismatched braces in response".into(),
        ));
    }

    let json_slice = &json[json_start..=json_end];
    let output: ClassificationOutput = serde_json::from_str(json_slice)?;

    Ok(output)
}

/// Mock classifier for testing without actual LLM inference.
pub struct MockClassifier;

impl MockClassifier {
    /// Classify using simple keyword rules (for testing).
    pub fn classify(name: &str, _dosage: Option<&str>) -> ClassificationOutput {
        let lower = name.to_lowercase();

        let rules: &[(&[&str], ClassificationOutput)] = &[
            (
                &["voltaren", "diclofenac gel", "profenid gel"],
                ClassificationOutput {
                    category: Some("Thuốc cơ xương khớp".into()),
                    subcategory: Some("NSAID".into()),
                    dosage_form: Some("Gel".into()),
                    route: Some("Dùng ngoài".into()),
                    analysis_text: Some("Gel kháng viêm bôi ngoài da.".into()),
                },
            ),
            (
                &["paracetamol", "panadol", "efferalgan", "hapacol"],
                ClassificationOutput {
                    category: Some("Thuốc giảm đau, hạ sốt".into()),
                    subcategory: Some("Giảm đau, hạ sốt".into()),
                    dosage_form: Some("Viên nén".into()),
                    route: Some("Uống".into()),
                    analysis_text: Some("Thuốc giảm đau hạ sốt dạng uống.".into()),
                },
            ),
            (
                &["amoxicillin", "augmentin", "azithromycin"],
                ClassificationOutput {
                    category: Some("Thuốc kháng sinh".into()),
                    subcategory: Some("Kháng sinh".into()),
                    dosage_form: Some("Viên nén".into()),
                    route: Some("Uống".into()),
                    analysis_text: Some("Kháng sinh đường uống, cần đơn bác sĩ.".into()),
                },
            ),
            (
                &["ibuprofen", "meloxicam", "celecoxib", "etoricoxib"],
                ClassificationOutput {
                    category: Some("Thuốc cơ xương khớp".into()),
                    subcategory: Some("NSAID".into()),
                    dosage_form: Some("Viên nén".into()),
                    route: Some("Uống".into()),
                    analysis_text: Some("Kháng viêm không steroid dạng uống.".into()),
                },
            ),
        ];

        for (patterns, output) in rules {
            if patterns.iter().any(|p| lower.contains(p)) {
                return output.clone();
            }
        }

        ClassificationOutput::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_classification_output() {
        let json = r#"{"category":"Thuốc cơ xương khớp","subcategory":"NSAID","dosage_form":"Gel","route":"Dùng ngoài","analysis_text":"gel bôi da"}"#;

        let output = parse_classification_output(json).unwrap();
        assert_eq!(output.subcategory.as_deref(), Some("NSAID"));
        assert_eq!(output.route.as_deref(), Some("Dùng ngoài"));
    }

    #[test]
    fn test_parse_with_surrounding_text() {
        let json = r#"Here is the classification:
{"category":null,"subcategory":"NSAID","dosage_form":null,"route":null,"analysis_text":null}
Hope this helps!"#;

        let output = parse_classification_output(json).unwrap();
        assert!(output.category.is_none());
        assert_eq!(output.subcategory.as_deref(), Some("NSAID"));
    }

    #[test]
    fn test_parse_missing_fields_default_to_none() {
        let output = parse_classification_output(r#"{"subcategory":"NSAID"}"#).unwrap();
        assert!(output.category.is_none());
        assert!(output.analysis_text.is_none());
    }

    #[test]
    fn test_parse_rejects_non_json() {
        assert!(parse_classification_output("no json here").is_err());
        assert!(parse_classification_output("} backwards {").is_err());
    }

    #[test]
    fn test_mock_classifier_gel() {
        let output = MockClassifier::classify("Voltaren Emulgel", Some("1%"));
        assert_eq!(output.dosage_form.as_deref(), Some("Gel"));
        assert_eq!(output.route.as_deref(), Some("Dùng ngoài"));
    }

    #[test]
    fn test_mock_classifier_unknown_is_empty() {
        let output = MockClassifier::classify("Biệt dược không rõ", None);
        assert_eq!(output, ClassificationOutput::default());
    }

    proptest::proptest! {
        /// Arbitrary LLM output never panics the parser.
        #[test]
        fn prop_parse_never_panics(response in "\\PC{0,200}") {
            let _ = parse_classification_output(&response);
        }
    }
}
