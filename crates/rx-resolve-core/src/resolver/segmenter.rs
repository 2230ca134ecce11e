//! Prescription line segmenter.
//!
//! Splits normalized OCR text into the medicine section, merges entries the
//! OCR broke across lines, and synthesizes missing ordinal markers. One
//! pass, left to right, no backtracking: each line is either merged into
//! the current entry or starts a new one, never both.

use regex::Regex;
use tracing::debug;

use crate::models::PrescriptionLine;

/// Section headers that open the medicine list.
const SECTION_START_KEYWORDS: &[&str] = &[
    "chỉ định thuốc",
    "đơn thuốc",
    "danh sách thuốc",
    "thuốc điều trị",
    "các thuốc",
    "kê đơn",
];

/// Footer markers that close the medicine list.
const STOP_KEYWORDS: &[&str] = &[
    "bác sĩ",
    "bs.",
    "ký tên",
    "chữ ký",
    "tái khám",
    "khám lại",
    "điện thoại",
    "đt:",
    "sđt",
    "lời dặn",
    "nơi cấp",
    "phòng khám",
];

/// Words marking a dosing-schedule line. A stop keyword inside one of
/// these lines does not end the section.
const SCHEDULE_KEYWORDS: &[&str] = &[
    "sáng", "trưa", "chiều", "tối", "uống", "ngày", "lần", "sau ăn", "trước ăn",
];

/// Dosage/unit/component vocabulary used by the continuation heuristic.
const COMPONENT_VOCAB: &[&str] = &[
    "mg", "ml", "mcg", "viên", "nang", "gói", "tuýp", "chai", "ống", "vỉ", "hộp", "gel", "kem",
    "siro", "acid", "natri", "vitamin", "extract", "sl:",
];

/// Vocabulary that makes a markerless line look like a medicine entry.
const MEDICINE_VOCAB: &[&str] = &[
    "viên", "nang", "gói", "tuýp", "gel", "kem", "siro", "thuốc", "cream", "sl:",
];

/// Merge/new-entry decision state.
enum SegmenterState {
    AwaitingEntry,
    AccumulatingEntry(Entry),
}

struct Entry {
    text: String,
    first_index: usize,
}

/// Segmenter for normalized OCR text.
pub struct LineSegmenter {
    ordinal_re: Regex,
    dosage_re: Regex,
}

impl Default for LineSegmenter {
    fn default() -> Self {
        Self::new()
    }
}

impl LineSegmenter {
    pub fn new() -> Self {
        Self {
            ordinal_re: Regex::new(r"^\s*(\d{1,2})\s*([.)/])\s*").expect("static regex"),
            dosage_re: Regex::new(r"(?i)\d+(?:[.,]\d+)?\s*(?:mcg|µg|mg|ml|iu|ui|g|l|%)")
                .expect("static regex"),
        }
    }

    /// Split text into ordered logical medicine entries.
    pub fn segment(&self, text: &str) -> Vec<PrescriptionLine> {
        let lines: Vec<&str> = text.lines().collect();
        let start = self.section_start(&lines);
        let end = self.section_end(&lines, start);

        let mut entries: Vec<PrescriptionLine> = Vec::new();
        let mut state = SegmenterState::AwaitingEntry;
        let mut next_ordinal: u32 = 1;

        for (index, raw) in lines.iter().enumerate().take(end).skip(start) {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }

            if let Some(ordinal) = self.ordinal_of(line) {
                // An ordinal marker always opens a new entry
                flush(&mut state, &mut entries);
                next_ordinal = ordinal + 1;
                state = SegmenterState::AccumulatingEntry(Entry {
                    text: line.to_string(),
                    first_index: index,
                });
                continue;
            }

            if let SegmenterState::AccumulatingEntry(entry) = &mut state {
                if self.is_continuation(&entry.text, line) {
                    entry.text.push(' ');
                    entry.text.push_str(line);
                    continue;
                }
            }

            if self.looks_like_medicine(line) {
                flush(&mut state, &mut entries);
                debug!(line, ordinal = next_ordinal, "synthesized ordinal for markerless entry");
                state = SegmenterState::AccumulatingEntry(Entry {
                    text: format!("{}. {}", next_ordinal, line),
                    first_index: index,
                });
                next_ordinal += 1;
                continue;
            }

            // Neither a marker, a continuation, nor a plausible medicine:
            // close any open entry and skip
            flush(&mut state, &mut entries);
        }

        flush(&mut state, &mut entries);
        entries
    }

    /// Locate where the medicine section starts: a section header, else the
    /// first ordinal-with-dosage line, else line 0.
    fn section_start(&self, lines: &[&str]) -> usize {
        for (i, line) in lines.iter().enumerate() {
            let lower = line.to_lowercase();
            if SECTION_START_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
                return i + 1;
            }
        }
        for (i, line) in lines.iter().enumerate() {
            if self.ordinal_of(line.trim()).is_some() && self.dosage_re.is_match(line) {
                return i;
            }
        }
        0
    }

    /// Locate where the medicine section ends: the first stop-keyword line
    /// after `start` that is not itself a dosing-schedule line.
    fn section_end(&self, lines: &[&str], start: usize) -> usize {
        for (i, line) in lines.iter().enumerate().skip(start) {
            let lower = line.to_lowercase();
            let stops = STOP_KEYWORDS.iter().any(|kw| lower.contains(kw));
            if stops && !is_schedule_line(&lower) {
                return i;
            }
        }
        lines.len()
    }

    /// Ordinal marker at the start of a line, if any. "2.5g ..." is a
    /// decimal value, not the marker "2.".
    fn ordinal_of(&self, line: &str) -> Option<u32> {
        let caps = self.ordinal_re.captures(line)?;
        let m = caps.get(0).expect("whole match");
        let rest = &line[m.end()..];
        if &caps[2] == "."
            && m.as_str().trim_end().ends_with('.')
            && rest.chars().next().map(|c| c.is_ascii_digit()).unwrap_or(false)
        {
            return None;
        }
        caps[1].parse().ok()
    }

    /// Whether `line` continues the entry accumulated so far. Lines shaped
    /// like a fresh entry (capitalized name with its own dosage) are not
    /// continuations even when they mention unit words.
    fn is_continuation(&self, current: &str, line: &str) -> bool {
        let open_parens =
            current.matches('(').count() as i64 - current.matches(')').count() as i64;
        if open_parens > 0 {
            return true;
        }
        let trimmed = current.trim_end();
        if trimmed.ends_with('+') || trimmed.ends_with('-') {
            return true;
        }
        if line.starts_with('+') || line.starts_with('-') {
            return true;
        }
        if line
            .chars()
            .next()
            .map(|c| c.is_alphabetic() && c.is_lowercase())
            .unwrap_or(false)
        {
            return true;
        }
        // Fragment opening with a dosage token ("500mg ...") or a
        // unit/component word
        if self.dosage_re.find(line).map(|m| m.start()) == Some(0) {
            return true;
        }
        let first_word = line.split_whitespace().next().unwrap_or("").to_lowercase();
        COMPONENT_VOCAB.iter().any(|w| first_word == *w)
    }

    /// Drug-name heuristic for lines without an ordinal marker.
    fn looks_like_medicine(&self, line: &str) -> bool {
        if self.dosage_re.is_match(line) {
            return true;
        }
        let lower = line.to_lowercase();
        MEDICINE_VOCAB.iter().any(|w| lower.contains(w))
    }
}

fn is_schedule_line(lower: &str) -> bool {
    SCHEDULE_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

fn flush(state: &mut SegmenterState, entries: &mut Vec<PrescriptionLine>) {
    if let SegmenterState::AccumulatingEntry(entry) =
        std::mem::replace(state, SegmenterState::AwaitingEntry)
    {
        entries.push(PrescriptionLine {
            text: entry.text,
            source_line_index: entry.first_index,
        });
    }
}
