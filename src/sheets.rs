use std::collections::BTreeMap;

use anyhow::{Context, Result, bail};
use reqwest::Url;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

pub const SHEETS_API_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets/";

/// Read and write access to a spreadsheet's cell values.
pub trait SheetsClient {
    fn get_values(&self, spreadsheet_id: &str, range: &str) -> Result<Vec<Vec<String>>>;

    fn update_values(
        &self,
        spreadsheet_id: &str,
        range: &str,
        rows: Vec<Vec<String>>,
    ) -> Result<()>;
}

/// Google Sheets v4 values API, authenticated with an OAuth access token.
pub struct GoogleSheetsClient {
    http: Client,
    base_url: Url,
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ValueRangeUpdate<'a> {
    range: &'a str,
    major_dimension: &'a str,
    values: Vec<Vec<String>>,
}

impl GoogleSheetsClient {
    pub fn new(access_token: &str) -> Result<Self> {
        Self::with_base_url(SHEETS_API_BASE, access_token)
    }

    pub fn with_base_url(base_url: &str, access_token: &str) -> Result<Self> {
        let token = access_token.trim();
        if token.is_empty() {
            bail!("a spreadsheet access token is required to post results");
        }

        let http = Client::builder()
            .user_agent(concat!("aclpub-check/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build HTTP client")?;
        let base_url =
            Url::parse(base_url).with_context(|| format!("invalid sheets base url: {base_url}"))?;

        Ok(Self {
            http,
            base_url,
            access_token: token.to_string(),
        })
    }

    fn values_url(&self, spreadsheet_id: &str, range: &str) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("sheets base url cannot carry a path"))?
            .pop_if_empty()
            .push(spreadsheet_id)
            .push("values")
            .push(range);
        Ok(url)
    }
}

impl SheetsClient for GoogleSheetsClient {
    fn get_values(&self, spreadsheet_id: &str, range: &str) -> Result<Vec<Vec<String>>> {
        let url = self.values_url(spreadsheet_id, range)?;
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.access_token)
            .send()
            .with_context(|| format!("failed to read range {range}"))?
            .error_for_status()
            .with_context(|| format!("sheets API rejected read of {range}"))?;

        let body: ValueRange = response
            .json()
            .with_context(|| format!("failed to decode values of {range}"))?;

        Ok(body
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_to_string).collect())
            .collect())
    }

    fn update_values(
        &self,
        spreadsheet_id: &str,
        range: &str,
        rows: Vec<Vec<String>>,
    ) -> Result<()> {
        let mut url = self.values_url(spreadsheet_id, range)?;
        url.query_pairs_mut().append_pair("valueInputOption", "RAW");

        let row_count = rows.len();
        let body = ValueRangeUpdate {
            range,
            major_dimension: "ROWS",
            values: rows,
        };

        self.http
            .put(url)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .with_context(|| format!("failed to update range {range}"))?
            .error_for_status()
            .with_context(|| format!("sheets API rejected update of {range}"))?;

        info!(range = %range, rows = row_count, "updated spreadsheet range");
        Ok(())
    }
}

fn cell_to_string(value: Value) -> String {
    match value {
        Value::String(text) => text,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Where per-row problems are written back to.
#[derive(Debug, Clone)]
pub struct ProblemColumn {
    pub spreadsheet_id: String,
    pub sheet_id: String,
    pub id_column: String,
    pub problem_column: String,
}

/// Writes `row_to_problem` into the problem column, one cell per sheet row
/// from row 2 through the last populated row of the id column. Rows without
/// a problem are cleared.
pub fn post_problem_column(
    client: &dyn SheetsClient,
    target: &ProblemColumn,
    row_to_problem: &BTreeMap<usize, String>,
) -> Result<usize> {
    let id_range = format!("{}!{}1:{}", target.sheet_id, target.id_column, target.id_column);
    let row_count = client
        .get_values(&target.spreadsheet_id, &id_range)
        .with_context(|| format!("failed to count rows in {id_range}"))?
        .len();

    let values = (2..=row_count)
        .map(|row| vec![row_to_problem.get(&row).cloned().unwrap_or_default()])
        .collect::<Vec<Vec<String>>>();
    let written = values.len();

    let problem_range = format!(
        "{}!{}2:{}",
        target.sheet_id, target.problem_column, target.problem_column
    );
    client.update_values(&target.spreadsheet_id, &problem_range, values)?;

    Ok(written)
}

#[cfg(test)]
pub mod fake {
    use std::cell::RefCell;
    use std::collections::HashMap;

    use super::*;

    /// In-memory spreadsheet keyed by range string.
    #[derive(Default)]
    pub struct FakeSheets {
        pub ranges: HashMap<String, Vec<Vec<String>>>,
        pub updates: RefCell<Vec<(String, String, Vec<Vec<String>>)>>,
    }

    impl SheetsClient for FakeSheets {
        fn get_values(&self, _spreadsheet_id: &str, range: &str) -> Result<Vec<Vec<String>>> {
            self.ranges
                .get(range)
                .cloned()
                .with_context(|| format!("no such range {range}"))
        }

        fn update_values(
            &self,
            spreadsheet_id: &str,
            range: &str,
            rows: Vec<Vec<String>>,
        ) -> Result<()> {
            self.updates
                .borrow_mut()
                .push((spreadsheet_id.to_string(), range.to_string(), rows));
            Ok(())
        }
    }
}
