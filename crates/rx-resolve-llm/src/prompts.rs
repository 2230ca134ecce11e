//! Classification prompts for medicine taxonomy.
//!
//! These prompts are designed for Llama 3.2-1B with JSON grammar constraints.

/// System prompt for medicine taxonomy classification.
pub const SYSTEM_PROMPT: &str = r#"You are a pharmacy assistant that classifies medicines found on Vietnamese prescriptions.

Given a medicine name (and an optional dosage), classify it along four attributes:
- category: Top-level store category (e.g., "Thuốc cơ xương khớp", "Thuốc giảm đau, hạ sốt", "Thuốc kháng sinh")
- subcategory: Pharmacological group (e.g., "NSAID", "Corticosteroid", "Kháng sinh", "Giảm đau, hạ sốt")
- dosage_form: Form of the product (e.g., "Viên nén", "Viên nang", "Gel", "Kem bôi da", "Siro", "Dung dịch tiêm")
- route: Route of administration (e.g., "Uống", "Dùng ngoài", "Tiêm", "Nhỏ mắt")

Leave a field null when you are not reasonably sure. Do not guess a
prescription-only antibiotic as an over-the-counter category.

Output JSON with the four attributes and an "analysis_text" note explaining
your classification in one sentence."#;

/// User prompt template for one medicine.
pub fn make_classification_prompt(name: &str, dosage: Option<&str>) -> String {
    match dosage {
        Some(dosage) => format!(
            r#"Classify this medicine:

Name: "{}"
Dosage: "{}"

Return a JSON object with: category, subcategory, dosage_form, route, analysis_text.
Use null for any attribute you cannot determine."#,
            name, dosage
        ),
        None => format!(
            r#"Classify this medicine:

Name: "{}"

Return a JSON object with: category, subcategory, dosage_form, route, analysis_text.
Use null for any attribute you cannot determine."#,
            name
        ),
    }
}

/// JSON grammar constraint for llama.cpp to ensure valid output format.
pub const JSON_GRAMMAR: &str = r#"
root ::= object
object ::= "{" ws
    "\"category\"" ws ":" ws (string | "null") ws "," ws
    "\"subcategory\"" ws ":" ws (string | "null") ws "," ws
    "\"dosage_form\"" ws ":" ws (string | "null") ws "," ws
    "\"route\"" ws ":" ws (string | "null") ws "," ws
    "\"analysis_text\"" ws ":" ws (string | "null") ws
"}"
string ::= "\"" ([^"\\] | "\\" .)* "\""
ws ::= [ \t\n]*
"#;

/// Example few-shot prompts for better classification accuracy.
pub const FEW_SHOT_EXAMPLES: &[(&str, &str)] = &[
    (
        "Voltaren Emulgel",
        r#"{"category":"Thuốc cơ xương khớp","subcategory":"NSAID","dosage_form":"Gel","route":"Dùng ngoài","analysis_text":"Gel bôi ngoài da chứa diclofenac, nhóm kháng viêm không steroid."}"#,
    ),
    (
        "Paracetamol 500mg",
        r#"{"category":"Thuốc giảm đau, hạ sốt","subcategory":"Giảm đau, hạ sốt","dosage_form":"Viên nén","route":"Uống","analysis_text":"Thuốc giảm đau hạ sốt thông dụng dạng viên uống."}"#,
    ),
    (
        "Tobradex nhỏ mắt",
        r#"{"category":"Thuốc nhỏ mắt","subcategory":"Kháng sinh","dosage_form":"Dung dịch nhỏ mắt","route":"Nhỏ mắt","analysis_text":"Dung dịch nhỏ mắt phối hợp kháng sinh và corticoid."}"#,
    ),
];

/// Build a complete prompt with system context and few-shot examples.
pub fn build_full_prompt(name: &str, dosage: Option<&str>, include_examples: bool) -> String {
    let mut prompt = String::new();

    // System context
    prompt.push_str("<|system|>\n");
    prompt.push_str(SYSTEM_PROMPT);
    prompt.push_str("\n<|end|>\n");

    // Few-shot examples
    if include_examples {
        for (input, output) in FEW_SHOT_EXAMPLES {
            prompt.push_str("<|user|>\n");
            prompt.push_str(&make_classification_prompt(input, None));
            prompt.push_str("\n<|end|>\n");
            prompt.push_str("<|assistant|>\n");
            prompt.push_str(output);
            prompt.push_str("\n<|end|>\n");
        }
    }

    // Actual request
    prompt.push_str("<|user|>\n");
    prompt.push_str(&make_classification_prompt(name, dosage));
    prompt.push_str("\n<|end|>\n");
    prompt.push_str("<|assistant|>\n");

    prompt
}
