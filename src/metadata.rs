use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use csv::StringRecord;
use regex::Regex;
use tracing::{info, warn};

use crate::model::{AuthorRecord, SubmissionRecord};
use crate::reconcile::clean_text;

const SUBMISSION_ID_COLUMN: &str = "Submission ID";
const TITLE_COLUMN: &str = "Title";
const SIGNATURE_COLUMN: &str = "copyrightSig";
const JOB_TITLE_COLUMN: &str = "jobTitle";
const ORG_NAME_COLUMN: &str = "orgName";
const ORG_ADDRESS_COLUMN: &str = "orgAddress";

#[derive(Debug, Default, Clone, Copy)]
struct AuthorColumns {
    first: Option<usize>,
    middle: Option<usize>,
    last: Option<usize>,
    affiliation: Option<usize>,
}

#[derive(Debug)]
struct ColumnIndex {
    submission_id: usize,
    title: Option<usize>,
    signature: Option<usize>,
    job_title: Option<usize>,
    org_name: Option<usize>,
    org_address: Option<usize>,
    authors: Vec<AuthorColumns>,
}

impl ColumnIndex {
    fn from_headers(headers: &StringRecord) -> Result<Self> {
        let position = |name: &str| headers.iter().position(|header| header.trim() == name);

        let submission_id = position(SUBMISSION_ID_COLUMN)
            .with_context(|| format!("missing required column '{SUBMISSION_ID_COLUMN}'"))?;

        let author_regex = Regex::new(r"^(\d+):\s*(First Name|Middle Name|Last Name|Affiliation)$")
            .context("failed to compile author column regex")?;
        let mut by_slot = BTreeMap::<u32, AuthorColumns>::new();
        for (index, header) in headers.iter().enumerate() {
            let Some(captures) = author_regex.captures(header.trim()) else {
                continue;
            };
            let Some(slot) = captures
                .get(1)
                .and_then(|value| value.as_str().parse::<u32>().ok())
            else {
                continue;
            };
            let columns = by_slot.entry(slot).or_default();
            match captures.get(2).map(|value| value.as_str()) {
                Some("First Name") => columns.first = Some(index),
                Some("Middle Name") => columns.middle = Some(index),
                Some("Last Name") => columns.last = Some(index),
                Some("Affiliation") => columns.affiliation = Some(index),
                _ => {}
            }
        }

        Ok(Self {
            submission_id,
            title: position(TITLE_COLUMN),
            signature: position(SIGNATURE_COLUMN),
            job_title: position(JOB_TITLE_COLUMN),
            org_name: position(ORG_NAME_COLUMN),
            org_address: position(ORG_ADDRESS_COLUMN),
            authors: by_slot.into_values().collect(),
        })
    }

    fn submission_from_record(
        &self,
        record: &StringRecord,
        sheet_row: usize,
    ) -> Result<SubmissionRecord> {
        let raw_id = cell(record, Some(self.submission_id));
        let submission_id = raw_id
            .parse::<u64>()
            .with_context(|| format!("invalid submission id '{raw_id}' on row {sheet_row}"))?;

        let authors = self
            .authors
            .iter()
            .map(|columns| AuthorRecord {
                first: cell(record, columns.first),
                middle: cell(record, columns.middle),
                last: cell(record, columns.last),
                affiliation: cell(record, columns.affiliation),
            })
            .filter(|author| !author.full_name().is_empty())
            .collect();

        Ok(SubmissionRecord {
            submission_id,
            sheet_row,
            title: cell(record, self.title),
            authors,
            copyright_signature: cell(record, self.signature),
            job_title: cell(record, self.job_title),
            org_name: cell(record, self.org_name),
            org_address: cell(record, self.org_address),
        })
    }
}

fn cell(record: &StringRecord, index: Option<usize>) -> String {
    index
        .and_then(|index| record.get(index))
        .map(clean_text)
        .unwrap_or_default()
}

/// Loads every submission row. Rows that cannot be read are logged and
/// skipped so one bad row does not hide the rest.
pub fn load_submissions(path: &Path) -> Result<Vec<SubmissionRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    let headers = reader
        .headers()
        .with_context(|| format!("failed to read CSV header in {}", path.display()))?
        .clone();
    let columns = ColumnIndex::from_headers(&headers)
        .with_context(|| format!("unexpected CSV layout in {}", path.display()))?;

    let mut submissions = Vec::new();
    for (index, result) in reader.records().enumerate() {
        let sheet_row = index + 2;
        let parsed = result
            .with_context(|| format!("CSV parse error on row {sheet_row}"))
            .and_then(|record| columns.submission_from_record(&record, sheet_row));

        match parsed {
            Ok(submission) => submissions.push(submission),
            Err(err) => warn!(path = %path.display(), error = %err, "skipping submission row"),
        }
    }

    info!(
        path = %path.display(),
        submissions = submissions.len(),
        author_slots = columns.authors.len(),
        "loaded submission metadata"
    );

    Ok(submissions)
}
