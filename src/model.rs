use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorRecord {
    pub first: String,
    pub middle: String,
    pub last: String,
    pub affiliation: String,
}

impl AuthorRecord {
    pub fn full_name(&self) -> String {
        [&self.first, &self.middle, &self.last]
            .into_iter()
            .filter(|part| !part.is_empty())
            .map(String::as_str)
            .collect::<Vec<&str>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, Default)]
pub struct SubmissionRecord {
    pub submission_id: u64,
    /// 1-based row in the source spreadsheet; row 1 is the header.
    pub sheet_row: usize,
    pub title: String,
    pub authors: Vec<AuthorRecord>,
    pub copyright_signature: String,
    pub job_title: String,
    pub org_name: String,
    pub org_address: String,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FormatCategory {
    Size,
    Margin,
    PageLimit,
    Misspell,
    Font,
    Bib,
    Parsing,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarginIntrusion {
    pub text: String,
    pub left: f64,
    pub right_gap: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Finding {
    Message(String),
    MarginDetails(BTreeMap<usize, Vec<MarginIntrusion>>),
}

impl From<String> for Finding {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}

/// Findings for one PDF, keyed by category. Serializes to `{}` when clean.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FormatReport {
    pub findings: BTreeMap<FormatCategory, Vec<Finding>>,
}

impl FormatReport {
    pub fn push(&mut self, category: FormatCategory, finding: impl Into<Finding>) {
        self.findings.entry(category).or_default().push(finding.into());
    }

    /// Overwrites the category with a single finding.
    pub fn set(&mut self, category: FormatCategory, finding: impl Into<Finding>) {
        self.findings.insert(category, vec![finding.into()]);
    }

    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }

    #[cfg(test)]
    pub fn messages(&self, category: FormatCategory) -> Vec<&str> {
        self.findings
            .get(&category)
            .map(|findings| {
                findings
                    .iter()
                    .filter_map(|finding| match finding {
                        Finding::Message(message) => Some(message.as_str()),
                        Finding::MarginDetails(_) => None,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn finding_count(&self) -> usize {
        self.findings.values().map(Vec::len).sum()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolVersions {
    pub pdftotext: Option<String>,
    pub pdftohtml: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FormatRunEntry {
    pub pdf_path: String,
    pub report_path: Option<String>,
    pub sha256: Option<String>,
    pub finding_count: usize,
    pub categories: Vec<FormatCategory>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FormatRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub started_at: String,
    pub updated_at: String,
    pub paper_type: String,
    pub num_workers: usize,
    pub tool_versions: ToolVersions,
    pub pdf_count: usize,
    pub clean_count: usize,
    pub failed_count: usize,
    pub entries: Vec<FormatRunEntry>,
}
