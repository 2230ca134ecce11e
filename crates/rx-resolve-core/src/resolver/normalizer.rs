//! OCR text normalizer.
//!
//! Handles:
//! - Character confusions (misread letters inside numbers: l→1, O→0, ...)
//! - Stray separators between a number and its unit word
//! - Known truncated drug names (OCR frequently drops a leading syllable)
//!
//! Pure: unmatched input passes through unchanged.

use std::collections::HashMap;

use regex::Regex;

/// Normalizer for raw OCR output.
pub struct OcrNormalizer {
    /// Lowercase letters misread in place of a digit (applied before a digit)
    lowercase_confusions: HashMap<char, char>,
    /// Letters misread in place of a digit (applied after a digit)
    digit_run_confusions: HashMap<char, char>,
    /// Truncated name → full name, matched against whole word tokens
    truncated_names: HashMap<String, String>,
    /// Word tokens, for the truncation dictionary
    word_re: Regex,
    /// "20.viên" / "20;mg" → "20 viên" / "20 mg"
    separator_re: Regex,
    /// "20viên" → "20 viên" (count units only; dosage units stay attached)
    glued_unit_re: Regex,
}

impl Default for OcrNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl OcrNormalizer {
    /// Create a normalizer with the default correction tables.
    pub fn new() -> Self {
        Self {
            lowercase_confusions: Self::default_lowercase_confusions(),
            digit_run_confusions: Self::default_digit_run_confusions(),
            truncated_names: Self::default_truncated_names(),
            word_re: Regex::new(r"\p{L}+").expect("static regex"),
            separator_re: Regex::new(
                r"(?i)(\d)\s*[;:.]\s*(viên|vien|gói|goi|tuýp|tuyp|chai|ống|ong|vỉ|hộp|hop|mg|ml|mcg)\b",
            )
            .expect("static regex"),
            glued_unit_re: Regex::new(r"(?i)(\d)(viên|gói|tuýp|chai|ống|vỉ|hộp)").expect("static regex"),
        }
    }

    /// Normalize a whole OCR text block.
    pub fn normalize(&self, raw: &str) -> String {
        let lines: Vec<String> = raw.lines().map(|l| self.normalize_line(l)).collect();
        lines.join("\n")
    }

    fn normalize_line(&self, line: &str) -> String {
        let fixed = self.fix_confusions(line);
        let fixed = self.separator_re.replace_all(&fixed, "$1 $2");
        let fixed = self.glued_unit_re.replace_all(&fixed, "$1 $2");
        self.fix_truncations(&fixed)
    }

    /// Repair letters misread inside numbers.
    ///
    /// Two rules, applied left to right over the already-repaired prefix:
    /// a lowercase confusable immediately before a digit ("l00" → "100"),
    /// and a confusable right after a digit when a digit, another
    /// confusable, or a unit word follows ("5OOmg" → "500mg").
    fn fix_confusions(&self, line: &str) -> String {
        let chars: Vec<char> = line.chars().collect();
        let mut out: Vec<char> = Vec::with_capacity(chars.len());

        for (i, &c) in chars.iter().enumerate() {
            let next = chars.get(i + 1).copied();

            if let Some(&digit) = self.lowercase_confusions.get(&c) {
                if c.is_lowercase() && next.map(|n| n.is_ascii_digit()).unwrap_or(false) {
                    out.push(digit);
                    continue;
                }
            }

            if let Some(&digit) = self.digit_run_confusions.get(&c) {
                let prev_is_digit = out.last().map(|p| p.is_ascii_digit()).unwrap_or(false);
                if prev_is_digit && self.digit_run_continues(&chars, i + 1) {
                    out.push(digit);
                    continue;
                }
            }

            out.push(c);
        }

        out.into_iter().collect()
    }

    /// Whether the text at `pos` continues a digit run: a digit, another
    /// confusable, a unit word, or a token boundary.
    fn digit_run_continues(&self, chars: &[char], pos: usize) -> bool {
        match chars.get(pos) {
            None => true,
            Some(c) if c.is_ascii_digit() => true,
            Some(c) if self.digit_run_confusions.contains_key(c) => true,
            Some(c) if !c.is_alphanumeric() => true,
            Some(_) => {
                let run: String = chars[pos..]
                    .iter()
                    .take_while(|c| c.is_alphabetic())
                    .collect::<String>()
                    .to_lowercase();
                matches!(run.as_str(), "mg" | "ml" | "mcg" | "g" | "l" | "iu" | "ui")
            }
        }
    }

    /// Replace whole-word tokens found in the truncation dictionary.
    fn fix_truncations(&self, line: &str) -> String {
        self.word_re
            .replace_all(line, |caps: &regex::Captures<'_>| {
                let token = &caps[0];
                self.truncated_names
                    .get(&token.to_lowercase())
                    .cloned()
                    .unwrap_or_else(|| token.to_string())
            })
            .into_owned()
    }

    /// Add a custom truncation mapping.
    pub fn add_truncation(&mut self, truncated: &str, full: &str) {
        self.truncated_names
            .insert(truncated.to_lowercase(), full.to_string());
    }

    /// Lowercase letters misread where a digit was printed.
    fn default_lowercase_confusions() -> HashMap<char, char> {
        let mut map = HashMap::new();
        map.insert('o', '0');
        map.insert('l', '1');
        map.insert('i', '1');
        map.insert('s', '5');
        map.insert('z', '2');
        map
    }

    /// Letters misread inside an already-started digit run.
    fn default_digit_run_confusions() -> HashMap<char, char> {
        let mut map = HashMap::new();
        map.insert('O', '0');
        map.insert('o', '0');
        map.insert('l', '1');
        map.insert('I', '1');
        map.insert('S', '5');
        map.insert('s', '5');
        map.insert('Z', '2');
        map.insert('z', '2');
        map
    }

    /// Drug names with the leading syllable dropped by the OCR.
    fn default_truncated_names() -> HashMap<String, String> {
        let mut map = HashMap::new();

        // Analgesics / antipyretics
        map.insert("racetamol".into(), "Paracetamol".into());
        map.insert("cetamol".into(), "Paracetamol".into());
        map.insert("ferralgan".into(), "Efferalgan".into());

        // NSAIDs
        map.insert("buprofen".into(), "Ibuprofen".into());
        map.insert("profen".into(), "Ibuprofen".into());
        map.insert("clofenac".into(), "Diclofenac".into());
        map.insert("oltaren".into(), "Voltaren".into());
        map.insert("loxicam".into(), "Meloxicam".into());
        map.insert("lecoxib".into(), "Celecoxib".into());
        map.insert("spirin".into(), "Aspirin".into());

        // Antibiotics
        map.insert("moxicillin".into(), "Amoxicillin".into());
        map.insert("gmentin".into(), "Augmentin".into());
        map.insert("thromycin".into(), "Azithromycin".into());
        map.insert("floxacin".into(), "Ciprofloxacin".into());

        // Cardio / metabolic
        map.insert("mlodipine".into(), "Amlodipine".into());
        map.insert("etformin".into(), "Metformin".into());
        map.insert("torvastatin".into(), "Atorvastatin".into());

        // GI
        map.insert("meprazole".into(), "Omeprazole".into());
        map.insert("soprazole".into(), "Esomeprazole".into());

        map
    }
}
