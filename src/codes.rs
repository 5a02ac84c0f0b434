use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Canonical width of a normalized classification code (10-digit HTS).
pub const CANONICAL_CODE_WIDTH: usize = 10;

/// Normalize a classification code for comparison and map lookups.
///
/// Strips dots and whitespace, keeps digits only, and left-pads with zeros
/// to the canonical width so that chapter extraction (first two digits)
/// works for codes written without their leading zero. Idempotent.
pub fn normalize_code(raw: &str) -> String {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() >= CANONICAL_CODE_WIDTH {
        digits
    } else {
        format!("{:0>width$}", digits, width = CANONICAL_CODE_WIDTH)
    }
}

/// Extract the 2-digit chapter from a normalized code.
pub fn chapter_of(normalized: &str) -> &str {
    &normalized[..2.min(normalized.len())]
}

/// One entry of the read-only classification reference data.
///
/// Created at data-load time by the loader; never mutated at runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationCode {
    /// Normalized fixed-width code
    pub code: String,
    pub description: String,
    /// First two digits of the normalized code
    pub chapter: String,
    #[serde(default)]
    pub category: Option<String>,
}

/// Raw record shape accepted from the data file (pre-normalization).
#[derive(Debug, Clone, Deserialize)]
pub struct ClassificationRecord {
    pub code: String,
    pub description: String,
    #[serde(default)]
    pub category: Option<String>,
}

/// How a lexical index hit matched the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexicalMatch {
    /// Query equals the normalized code
    ExactCode,
    /// Query is a prefix of the normalized code
    CodePrefix,
    /// Query appears in the description (case-insensitive)
    Description,
}

impl LexicalMatch {
    /// Confidence assigned to this match kind. Exact code matches score 1.0;
    /// prefix and description hits rank below them but above typical
    /// semantic similarity scores.
    pub fn confidence(self) -> f64 {
        match self {
            LexicalMatch::ExactCode => 1.0,
            LexicalMatch::CodePrefix => 0.9,
            LexicalMatch::Description => 0.8,
        }
    }
}

/// In-memory index over the classification reference data.
///
/// Supports exact/prefix lookups on the normalized code and case-insensitive
/// substring search over descriptions. Fully loaded before the resolver is
/// invoked; read-only thereafter.
pub struct ClassificationIndex {
    by_code: HashMap<String, ClassificationCode>,
    /// Codes in ascending order for deterministic iteration
    ordered: Vec<String>,
}

impl ClassificationIndex {
    pub fn from_records(records: Vec<ClassificationRecord>) -> Self {
        let mut by_code = HashMap::with_capacity(records.len());
        for rec in records {
            let code = normalize_code(&rec.code);
            let chapter = chapter_of(&code).to_string();
            by_code.insert(
                code.clone(),
                ClassificationCode {
                    code,
                    description: rec.description,
                    chapter,
                    category: rec.category,
                },
            );
        }

        let mut ordered: Vec<String> = by_code.keys().cloned().collect();
        ordered.sort();

        Self { by_code, ordered }
    }

    /// Load the classification file (JSON array of records).
    pub fn load(path: &Path) -> Result<Self, AppError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AppError::ConfigError(format!(
                "cannot read classification file {}: {}",
                path.display(),
                e
            ))
        })?;
        let records: Vec<ClassificationRecord> = serde_json::from_str(&raw)?;
        tracing::info!(
            count = records.len(),
            file = %path.display(),
            "Loaded classification reference data"
        );
        Ok(Self::from_records(records))
    }

    pub fn len(&self) -> usize {
        self.by_code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_code.is_empty()
    }

    pub fn get(&self, code: &str) -> Option<&ClassificationCode> {
        self.by_code.get(&normalize_code(code))
    }

    /// Iterate entries in ascending code order.
    pub fn iter(&self) -> impl Iterator<Item = &ClassificationCode> {
        self.ordered.iter().filter_map(|c| self.by_code.get(c))
    }

    /// Lexical search: exact code, code prefix, then description substring.
    ///
    /// A code appears at most once in the result, with the strongest match
    /// kind it qualified for. Results follow the index's ascending code
    /// order; ranking happens in the resolver.
    pub fn search(&self, query: &str) -> Vec<(&ClassificationCode, LexicalMatch)> {
        let trimmed = query.trim();
        if trimmed.is_empty() {
            return Vec::new();
        }

        let mut hits: Vec<(&ClassificationCode, LexicalMatch)> = Vec::new();

        // Digit-bearing queries are tried against the code index first.
        let digits: String = trimmed.chars().filter(|c| c.is_ascii_digit()).collect();
        if !digits.is_empty() {
            let normalized = normalize_code(trimmed);
            if let Some(entry) = self.by_code.get(&normalized) {
                hits.push((entry, LexicalMatch::ExactCode));
            }

            // Prefix match uses the raw digit string: a padded full-width
            // code would shadow every shorter prefix otherwise.
            if digits.len() < CANONICAL_CODE_WIDTH {
                for code in &self.ordered {
                    if code.trim_start_matches('0').starts_with(&digits)
                        || code.starts_with(&digits)
                    {
                        let entry = &self.by_code[code];
                        if !hits.iter().any(|(c, _)| c.code == entry.code) {
                            hits.push((entry, LexicalMatch::CodePrefix));
                        }
                    }
                }
            }
        }

        // Description substring search, case-insensitive.
        let needle = trimmed.to_lowercase();
        for code in &self.ordered {
            let entry = &self.by_code[code];
            if entry.description.to_lowercase().contains(&needle)
                && !hits.iter().any(|(c, _)| c.code == entry.code)
            {
                hits.push((entry, LexicalMatch::Description));
            }
        }

        hits
    }
}
