pub mod authors;
pub mod copyright;
pub mod format;
pub mod order;

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use tracing::info;

use crate::cli::PostArgs;
use crate::sheets::{GoogleSheetsClient, ProblemColumn, post_problem_column};

/// Writes per-row problems into `problem_column` of the submission sheet.
fn post_problems(
    post: &PostArgs,
    problem_column: &str,
    row_to_problem: &BTreeMap<usize, String>,
) -> Result<()> {
    let token = post
        .access_token
        .as_deref()
        .context("--post requires --access-token or GOOGLE_SHEETS_ACCESS_TOKEN")?;
    let client = GoogleSheetsClient::new(token)?;

    let target = ProblemColumn {
        spreadsheet_id: post.spreadsheet_id.clone(),
        sheet_id: post.sheet_id.clone(),
        id_column: post.id_column.clone(),
        problem_column: problem_column.to_string(),
    };
    let written = post_problem_column(&client, &target, row_to_problem)?;

    info!(
        spreadsheet_id = %target.spreadsheet_id,
        sheet = %target.sheet_id,
        column = %target.problem_column,
        rows = written,
        problems = row_to_problem.len(),
        "posted problems to spreadsheet"
    );
    Ok(())
}
