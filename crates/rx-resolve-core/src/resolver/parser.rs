//! Medicine name parser: quantity extraction, dosage splitting, and clean
//! text assembly for one validated prescription line.

use regex::Regex;

use crate::models::{DosePart, Dosage, ParsedMedicine, PrescriptionLine};

/// Parser for canonical dosage expressions ("500mg", "2,5g+0,3g+0,2g",
/// "1%/20g"). Shared by the name parser and the match scorer.
pub struct DosageParser {
    token_re: Regex,
}

impl Default for DosageParser {
    fn default() -> Self {
        Self::new()
    }
}

impl DosageParser {
    pub fn new() -> Self {
        Self {
            token_re: Regex::new(r"(?i)(\d+(?:[.,]\d+)?)\s*(mcg|µg|ug|mg|ml|iu|ui|g|l|%)")
                .expect("static regex"),
        }
    }

    /// Parse every dosage token in `text` into one canonical expression.
    /// Returns `None` when no recognizable token is present.
    pub fn parse(&self, text: &str) -> Option<Dosage> {
        Dosage::new(self.find_tokens(text).into_iter().map(|(_, p)| p).collect())
    }

    /// Dosage tokens with their byte ranges, in order of appearance.
    fn find_tokens(&self, text: &str) -> Vec<(std::ops::Range<usize>, DosePart)> {
        let mut tokens = Vec::new();
        for caps in self.token_re.captures_iter(text) {
            let m = caps.get(0).expect("whole match");
            // A letter right after the unit means this was a word, not a
            // unit ("5g" inside "5gói")
            if text[m.end()..]
                .chars()
                .next()
                .map(|c| c.is_alphabetic())
                .unwrap_or(false)
            {
                continue;
            }
            let value: f64 = match caps[1].replace(',', ".").parse() {
                Ok(v) => v,
                Err(_) => continue,
            };
            tokens.push((m.range(), DosePart::new(value, &caps[2])));
        }
        tokens
    }
}

/// Parser turning one validated line into a structured medicine reference.
pub struct MedicineNameParser {
    ordinal_re: Regex,
    schedule_sep_re: Regex,
    schedule_bare_re: Regex,
    sl_re: Regex,
    qty_re: Regex,
    dosage: DosageParser,
}

impl Default for MedicineNameParser {
    fn default() -> Self {
        Self::new()
    }
}

impl MedicineNameParser {
    pub fn new() -> Self {
        Self {
            ordinal_re: Regex::new(r"^\s*(\d{1,2})\s*([.)/:])\s*").expect("static regex"),
            schedule_sep_re: Regex::new(
                r"(?i)\s*[-–—,;(]\s*(sáng|trưa|chiều|tối|ngày|uống|mỗi)\b.*$",
            )
            .expect("static regex"),
            schedule_bare_re: Regex::new(
                r"(?i)\s+(ngày\s+uống|uống\s+(?:sáng|trưa|chiều|tối|ngày|mỗi|trước|sau|\d)|mỗi\s+lần|lần\s*/\s*ngày|sáng\s*/\s*tối)\b.*$",
            )
            .expect("static regex"),
            sl_re: Regex::new(
                r"(?i)\bsl\s*[:.]?\s*(\d{1,4})(?:\s*(?:viên|vien|gói|goi|tuýp|tuyp|chai|ống|ong|vỉ|hộp|hop|miếng|mieng|cái|cai))?",
            )
            .expect("static regex"),
            qty_re: Regex::new(
                r"(?i)\b(\d{1,4})\s*(?:viên|vien|gói|goi|tuýp|tuyp|chai|ống|ong|vỉ|hộp|hop|miếng|mieng|cái|cai)\b",
            )
            .expect("static regex"),
            dosage: DosageParser::new(),
        }
    }

    /// Access to the shared dosage-expression parser.
    pub fn dosage_parser(&self) -> &DosageParser {
        &self.dosage
    }

    /// Parse a segmented, validated line. Total: lines that cannot be
    /// decomposed still come back with their raw text preserved and a
    /// quantity of 1.
    pub fn parse(&self, line: &PrescriptionLine) -> ParsedMedicine {
        let original_text = line.text.clone();

        let mut text = self.strip_ordinal(&line.text);
        text = self.schedule_sep_re.replace(&text, "").into_owned();
        text = self.schedule_bare_re.replace(&text, "").into_owned();

        let (text, quantity) = self.extract_quantity(&text);

        let tokens = self.dosage.find_tokens(&text);
        let dosage = Dosage::new(tokens.iter().map(|(_, p)| p.clone()).collect());

        let base_name = self.base_name(&text, &tokens);
        let clean_text = match &dosage {
            Some(d) => format!("{} {}", base_name, d),
            None => base_name.clone(),
        };

        ParsedMedicine {
            original_text,
            clean_text,
            base_name,
            dosage,
            quantity,
        }
    }

    /// Remove a leading ordinal marker ("1.", "2)", "3/"), leaving decimal
    /// values ("2.5g ...") alone.
    fn strip_ordinal(&self, text: &str) -> String {
        if let Some(caps) = self.ordinal_re.captures(text) {
            let m = caps.get(0).expect("whole match");
            let rest = &text[m.end()..];
            let decimal = &caps[2] == "."
                && rest.chars().next().map(|c| c.is_ascii_digit()).unwrap_or(false)
                && m.as_str().trim_end().ends_with('.');
            if !decimal {
                return rest.to_string();
            }
        }
        text.to_string()
    }

    /// Pull the prescribed quantity out of an "SL: N" or "N <unit>" token,
    /// removing the token from the text. Defaults to 1.
    fn extract_quantity(&self, text: &str) -> (String, u32) {
        if let Some(caps) = self.sl_re.captures(text) {
            let quantity = caps[1].parse::<u32>().unwrap_or(1).max(1);
            let mut cleaned = text.to_string();
            cleaned.replace_range(caps.get(0).expect("whole match").range(), "");
            return (cleaned, quantity);
        }
        if let Some(caps) = self.qty_re.captures(text) {
            let quantity = caps[1].parse::<u32>().unwrap_or(1).max(1);
            let mut cleaned = text.to_string();
            cleaned.replace_range(caps.get(0).expect("whole match").range(), "");
            return (cleaned, quantity);
        }
        (text.to_string(), 1)
    }

    /// The name part: text before the first dosage token, or the text with
    /// every dosage token removed when the expression leads the line.
    fn base_name(&self, text: &str, tokens: &[(std::ops::Range<usize>, DosePart)]) -> String {
        let base = match tokens.first() {
            Some((range, _)) => trim_name(&text[..range.start]),
            None => trim_name(text),
        };
        if !base.is_empty() {
            return base;
        }

        let mut stripped = String::new();
        let mut cursor = 0;
        for (range, _) in tokens {
            stripped.push_str(&text[cursor..range.start]);
            cursor = range.end;
        }
        stripped.push_str(&text[cursor..]);

        let base = trim_name(&stripped);
        if base.is_empty() {
            text.trim().to_string()
        } else {
            base
        }
    }
}

/// Squeeze whitespace and trim stray separators left by token removal.
fn trim_name(text: &str) -> String {
    let squeezed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    squeezed
        .trim_matches(|c: char| {
            c.is_whitespace() || matches!(c, '-' | '–' | '—' | ',' | ';' | ':' | '/' | '+' | '.')
        })
        .trim_end_matches('(')
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> ParsedMedicine {
        let parser = MedicineNameParser::new();
        parser.parse(&PrescriptionLine {
            text: text.into(),
            source_line_index: 0,
        })
    }

    #[test]
    fn test_scenario_line() {
        let m = parse("1. Paracetamol 500mg SL: 20 viên");
        assert_eq!(m.base_name, "Paracetamol");
        assert_eq!(m.quantity, 20);
        assert_eq!(m.dosage.as_ref().unwrap().to_string(), "500mg");
        assert_eq!(m.clean_text, "Paracetamol 500mg");
        assert_eq!(m.original_text, "1. Paracetamol 500mg SL: 20 viên");
    }

    #[test]
    fn test_quantity_without_sl_token() {
        let m = parse("2. Efferalgan 500mg 10 viên");
        assert_eq!(m.quantity, 10);
        assert_eq!(m.base_name, "Efferalgan");
    }

    #[test]
    fn test_quantity_defaults_to_one() {
        let m = parse("3. Voltaren Emulgel 1%/20g");
        assert_eq!(m.quantity, 1);
        assert_eq!(m.base_name, "Voltaren Emulgel");
        let dosage = m.dosage.unwrap();
        assert_eq!(dosage.parts.len(), 2);
    }

    #[test]
    fn test_schedule_clause_stripped() {
        let m = parse("1. Paracetamol 500mg - Sáng/Tối: 1 viên");
        assert_eq!(m.base_name, "Paracetamol");
        assert_eq!(m.quantity, 1);
        assert_eq!(m.clean_text, "Paracetamol 500mg");

        let m = parse("2. Amoxicillin 500mg, ngày uống 2 lần");
        assert_eq!(m.base_name, "Amoxicillin");
    }

    #[test]
    fn test_oral_solution_form_not_treated_as_schedule() {
        let m = parse("4. Oresol dung dịch uống");
        assert_eq!(m.base_name, "Oresol dung dịch uống");
    }

    #[test]
    fn test_multi_part_dosage() {
        let m = parse("5. Beraflox 2,5g+0,3g+0,2g SL: 2 gói");
        assert_eq!(m.base_name, "Beraflox");
        assert_eq!(m.quantity, 2);
        assert_eq!(m.dosage.unwrap().to_string(), "2500mg+300mg+200mg");
    }

    #[test]
    fn test_no_dosage_is_not_an_error() {
        let m = parse("6. Thuốc ho Bảo Thanh");
        assert!(m.dosage.is_none());
        assert_eq!(m.base_name, "Thuốc ho Bảo Thanh");
        assert_eq!(m.clean_text, "Thuốc ho Bảo Thanh");
    }

    #[test]
    fn test_leading_dosage() {
        let m = parse("500mg Paracetamol");
        assert_eq!(m.base_name, "Paracetamol");
        assert_eq!(m.dosage.unwrap().to_string(), "500mg");
    }

    #[test]
    fn test_decimal_line_start_not_ordinal() {
        let m = parse("2.5g bột pha");
        assert_eq!(m.dosage.unwrap().to_string(), "2500mg");
        assert_eq!(m.base_name, "bột pha");
    }

    #[test]
    fn test_parenthetical_brand_kept_in_base() {
        let m = parse("1. Augmentin (Amoxicillin + Clavulanate) 625mg");
        assert_eq!(m.base_name, "Augmentin (Amoxicillin + Clavulanate)");
        assert_eq!(m.dosage.unwrap().to_string(), "625mg");
    }

    #[test]
    fn test_glued_word_not_a_unit() {
        let parser = DosageParser::new();
        // "5gói" is a count word, not "5g"
        assert!(parser.parse("5gói").is_none());
        assert!(parser.parse("5 g").is_some());
    }

    #[test]
    fn test_idempotent_reparse() {
        let inputs = [
            "1. Paracetamol 500mg SL: 20 viên",
            "2. Voltaren Emulgel 1%/20g",
            "3. Beraflox 2,5g+0,3g+0,2g",
            "4. Thuốc ho Bảo Thanh",
        ];
        let parser = MedicineNameParser::new();
        for input in inputs {
            let first = parser.parse(&PrescriptionLine {
                text: input.into(),
                source_line_index: 0,
            });
            let second = parser.parse(&PrescriptionLine {
                text: first.clean_text.clone(),
                source_line_index: 0,
            });
            assert_eq!(first.base_name, second.base_name, "input: {input}");
            assert_eq!(first.dosage, second.dosage, "input: {input}");
            assert_eq!(first.clean_text, second.clean_text, "input: {input}");
        }
    }
}
