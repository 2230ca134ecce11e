//! Line validator: filters segmented lines that are clearly not medicine
//! names. Reject reasons are diagnostic only, never surfaced to the user.

use regex::Regex;

/// Why a segmented line was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    PureNumeric,
    PhoneNumber,
    DiagnosisCode,
    SectionKeyword,
    TooShort,
}

/// Section keywords that mark non-medicine content.
const SECTION_KEYWORDS: &[&str] = &[
    "họ tên",
    "họ và tên",
    "tên bệnh nhân",
    "địa chỉ",
    "bác sĩ",
    "bs.",
    "bảo hiểm",
    "bhyt",
    "số thẻ",
    "mã số",
    "ngày sinh",
    "giới tính",
    "điện thoại",
];

/// Validator for one segmented prescription line.
pub struct LineValidator {
    ordinal_re: Regex,
    diagnosis_re: Regex,
}

impl Default for LineValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl LineValidator {
    pub fn new() -> Self {
        Self {
            ordinal_re: Regex::new(r"^\s*\d{1,2}\s*[.)/]\s*").expect("static regex"),
            diagnosis_re: Regex::new(r"^[A-Z]\d{1,4}(\.\d+)?$").expect("static regex"),
        }
    }

    /// Accept (`Ok`) or reject the line with a reason.
    pub fn validate(&self, text: &str) -> Result<(), RejectReason> {
        // The ordinal marker carries no signal; judge the content
        let content = self.ordinal_re.replace(text, "").trim().to_string();

        let digits = content.chars().filter(|c| c.is_ascii_digit()).count();
        let letters = content.chars().filter(|c| c.is_alphabetic()).count();

        if letters == 0 && digits > 0 {
            let only_digits_and_separators = content
                .chars()
                .all(|c| c.is_ascii_digit() || c.is_whitespace() || "-.()+/".contains(c));
            if only_digits_and_separators {
                if (7..=15).contains(&digits) {
                    return Err(RejectReason::PhoneNumber);
                }
                return Err(RejectReason::PureNumeric);
            }
        }

        if self.diagnosis_re.is_match(content.trim()) {
            return Err(RejectReason::DiagnosisCode);
        }

        let lower = content.to_lowercase();
        for keyword in SECTION_KEYWORDS {
            if let Some(rest) = lower.strip_prefix(keyword) {
                if !is_letter_rich(rest) {
                    return Err(RejectReason::SectionKeyword);
                }
            }
        }

        if letters < 3 {
            return Err(RejectReason::TooShort);
        }

        Ok(())
    }
}

/// Letter-rich: plausibly contains a medicine name. Vietnamese syllables
/// run short (patient names, addresses); drug names are long single words,
/// so require one alphabetic run of at least 7 characters.
fn is_letter_rich(text: &str) -> bool {
    let mut run = 0usize;
    let mut longest = 0usize;
    for c in text.chars() {
        if c.is_alphabetic() {
            run += 1;
            longest = longest.max(run);
        } else {
            run = 0;
        }
    }
    longest >= 7
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validate(text: &str) -> Result<(), RejectReason> {
        LineValidator::new().validate(text)
    }

    #[test]
    fn test_accepts_medicine_lines() {
        assert!(validate("1. Paracetamol 500mg SL: 20 viên").is_ok());
        assert!(validate("2. Voltaren Emulgel 1%/20g").is_ok());
        assert!(validate("Thuốc ho Bảo Thanh").is_ok());
    }

    #[test]
    fn test_rejects_pure_numeric() {
        assert_eq!(validate("12345"), Err(RejectReason::PureNumeric));
        assert_eq!(validate("1. 123"), Err(RejectReason::PureNumeric));
    }

    #[test]
    fn test_rejects_phone_numbers() {
        assert_eq!(validate("0912 345 678"), Err(RejectReason::PhoneNumber));
        assert_eq!(validate("(028) 3822-1234"), Err(RejectReason::PhoneNumber));
        assert_eq!(validate("+84 912 345 678"), Err(RejectReason::PhoneNumber));
    }

    #[test]
    fn test_rejects_diagnosis_codes() {
        assert_eq!(validate("J06.9"), Err(RejectReason::DiagnosisCode));
        assert_eq!(validate("M54"), Err(RejectReason::DiagnosisCode));
        // Accompanying letters make it a name, not a code
        assert!(validate("J06 Paracetamol").is_ok());
    }

    #[test]
    fn test_rejects_section_keywords() {
        assert_eq!(
            validate("Họ tên: Nguyễn Văn A"),
            Err(RejectReason::SectionKeyword)
        );
        assert_eq!(
            validate("Địa chỉ: 12 Lý Thường Kiệt"),
            Err(RejectReason::SectionKeyword)
        );
    }

    #[test]
    fn test_keyword_with_letter_rich_remainder_passes_keyword_check() {
        // Enough trailing letters: not rejected as a section keyword
        let result = validate("Bác sĩ khuyên dùng Paracetamol");
        assert_ne!(result, Err(RejectReason::SectionKeyword));
    }

    #[test]
    fn test_rejects_too_short() {
        assert_eq!(validate("ab"), Err(RejectReason::TooShort));
        assert_eq!(validate("1. -"), Err(RejectReason::TooShort));
    }
}
