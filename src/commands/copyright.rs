use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::cli::CopyrightArgs;
use crate::metadata::load_submissions;
use crate::model::SubmissionRecord;

const INDENT: &str = "    ";
const SEPARATOR: &str = "=================================================================";

/// Organization names accepted despite being very short.
const SHORT_ORG_NAMES: [&str; 1] = ["IBM"];

pub fn run(args: CopyrightArgs) -> Result<()> {
    let submissions = load_submissions(&args.submissions_path)?;

    let file = File::create(&args.output)
        .with_context(|| format!("failed to create {}", args.output.display()))?;
    let mut out = BufWriter::new(file);
    for submission in &submissions {
        write_signature_block(&mut out, submission)
            .with_context(|| format!("failed to write {}", args.output.display()))?;
    }
    out.flush()
        .with_context(|| format!("failed to flush {}", args.output.display()))?;

    let row_to_problem = collect_problems(&submissions);
    info!(
        output = %args.output.display(),
        submissions = submissions.len(),
        with_problems = row_to_problem.len(),
        "wrote copyright signatures"
    );

    if args.post.post && !row_to_problem.is_empty() {
        super::post_problems(&args.post, &args.problem_column, &row_to_problem)?;
    }

    Ok(())
}

/// Problems per sheet row, each logged as it is found.
fn collect_problems(submissions: &[SubmissionRecord]) -> BTreeMap<usize, String> {
    let mut row_to_problem = BTreeMap::new();

    for submission in submissions {
        let problems = signature_problems(
            &submission.copyright_signature,
            &submission.org_name,
            &submission.org_address,
        );
        if problems.is_empty() {
            continue;
        }

        let text = problems.join("\n");
        warn!(
            submission_id = submission.submission_id,
            problems = %text,
            "copyright signature problems"
        );
        row_to_problem.insert(submission.sheet_row, text);
    }

    row_to_problem
}

fn signature_problems(signature: &str, org_name: &str, org_address: &str) -> Vec<String> {
    let mut problems = Vec::new();

    if signature.is_empty() {
        problems.push("The signature is missing.".to_string());
    } else if signature == "NA" {
        problems.push(format!(
            "The signature \"{signature}\" must be accompanied by a \"License to Publish\" \
             or equivalent."
        ));
    } else if signature.chars().count() < 3 || signature.split_whitespace().count() < 2 {
        problems.push(format!(
            "The signature \"{signature}\" does not appear to be a full name."
        ));
    }

    if org_name.is_empty() {
        problems.push("The organization name is missing.".to_string());
    } else if org_name.chars().count() < 5 && !SHORT_ORG_NAMES.contains(&org_name) {
        problems.push(format!(
            "The organization name \"{org_name}\" does not appear to be a full name."
        ));
    }

    if org_address.is_empty() {
        problems.push("The organization address is missing.".to_string());
    } else if org_address.chars().count() < 3 || org_address.split_whitespace().count() < 2 {
        problems.push(format!(
            "The organization address \"{}\" does not appear to be a complete physical address.",
            org_address.replace('\n', " ")
        ));
    }

    problems
}

fn write_signature_block(out: &mut impl Write, submission: &SubmissionRecord) -> io::Result<()> {
    writeln!(out)?;
    writeln!(out, "Submission # {}", submission.submission_id)?;
    writeln!(out, "Title: {}", submission.title)?;
    writeln!(out, "Authors:")?;
    for author in &submission.authors {
        let name = author.full_name();
        if name.is_empty() {
            continue;
        }
        writeln!(out, "{INDENT}{name} ({})", author.affiliation)?;
    }
    writeln!(out, "Signature: {}", submission.copyright_signature)?;
    writeln!(
        out,
        "Your job title (if not one of the authors): {}",
        submission.job_title
    )?;
    writeln!(out, "Name and address of your organization:")?;
    writeln!(out, "{}", indent(&submission.org_name))?;
    writeln!(out, "{}", indent(&submission.org_address))?;
    writeln!(out)?;
    writeln!(out, "{SEPARATOR}")?;
    Ok(())
}

/// Indents every non-blank line.
fn indent(text: &str) -> String {
    text.split('\n')
        .map(|line| {
            if line.trim().is_empty() {
                line.to_string()
            } else {
                format!("{INDENT}{line}")
            }
        })
        .collect::<Vec<String>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AuthorRecord;

    fn submission() -> SubmissionRecord {
        SubmissionRecord {
            submission_id: 17,
            sheet_row: 5,
            title: "Parsing Everything".to_string(),
            authors: vec![
                AuthorRecord {
                    first: "Ada".to_string(),
                    middle: "K.".to_string(),
                    last: "Lovelace".to_string(),
                    affiliation: "Analytical Engines".to_string(),
                },
                AuthorRecord {
                    first: "Alan".to_string(),
                    last: "Turing".to_string(),
                    ..AuthorRecord::default()
                },
            ],
            copyright_signature: "Ada Lovelace".to_string(),
            job_title: String::new(),
            org_name: "Analytical Engines Ltd".to_string(),
            org_address: "1 Engine Row\nLondon".to_string(),
        }
    }

    #[test]
    fn complete_signature_has_no_problems() {
        assert!(
            signature_problems("Ada Lovelace", "University of London", "Gower St, London")
                .is_empty()
        );
        assert!(signature_problems("Ada Lovelace", "IBM", "Armonk, NY").is_empty());
    }

    #[test]
    fn missing_fields_are_reported_together() {
        assert_eq!(
            signature_problems("", "", ""),
            vec![
                "The signature is missing.",
                "The organization name is missing.",
                "The organization address is missing.",
            ]
        );
    }

    #[test]
    fn na_signature_needs_a_license() {
        let problems = signature_problems("NA", "University of London", "Gower St, London");
        assert_eq!(
            problems,
            vec![
                "The signature \"NA\" must be accompanied by a \"License to Publish\" or \
                 equivalent."
            ]
        );
    }

    #[test]
    fn partial_values_are_flagged() {
        let problems = signature_problems("Ada", "UCL", "London");
        assert_eq!(
            problems,
            vec![
                "The signature \"Ada\" does not appear to be a full name.",
                "The organization name \"UCL\" does not appear to be a full name.",
                "The organization address \"London\" does not appear to be a complete physical \
                 address.",
            ]
        );
    }

    #[test]
    fn multiline_address_is_flattened_in_message() {
        let problems = signature_problems("Ada Lovelace", "University", "Gower St\nLondon");
        assert!(problems.is_empty());

        let problems = signature_problems("Ada Lovelace", "University", "A\n");
        assert_eq!(
            problems,
            vec![
                "The organization address \"A \" does not appear to be a complete physical \
                 address."
            ]
        );
    }

    #[test]
    fn problems_are_keyed_by_sheet_row() {
        let mut broken = submission();
        broken.sheet_row = 9;
        broken.copyright_signature = String::new();

        let rows = collect_problems(&[submission(), broken]);
        assert_eq!(
            rows,
            BTreeMap::from([(9, "The signature is missing.".to_string())])
        );
    }

    #[test]
    fn signature_block_matches_digest_layout() {
        let mut buffer = Vec::new();
        write_signature_block(&mut buffer, &submission()).expect("write block");

        assert_eq!(
            String::from_utf8(buffer).expect("utf8"),
            "\n\
             Submission # 17\n\
             Title: Parsing Everything\n\
             Authors:\n\
             \x20   Ada K. Lovelace (Analytical Engines)\n\
             \x20   Alan Turing ()\n\
             Signature: Ada Lovelace\n\
             Your job title (if not one of the authors): \n\
             Name and address of your organization:\n\
             \x20   Analytical Engines Ltd\n\
             \x20   1 Engine Row\n\
             \x20   London\n\
             \n\
             =================================================================\n"
        );
    }

    #[test]
    fn run_writes_digest_for_every_row() {
        let dir = tempfile::tempdir().expect("tempdir");
        let csv_path = dir.path().join("submissions.csv");
        std::fs::write(
            &csv_path,
            "Submission ID,Title,1: First Name,1: Middle Name,1: Last Name,1: Affiliation,\
             copyrightSig,jobTitle,orgName,orgAddress\n\
             3,First,Ada,,Lovelace,UCL,Ada Lovelace,,University College,\"Gower St, London\"\n\
             4,Second,Alan,,Turing,,NA,,,\n",
        )
        .expect("write csv");
        let output = dir.path().join("signatures.txt");

        let args = CopyrightArgs {
            submissions_path: csv_path,
            output: output.clone(),
            problem_column: "E".to_string(),
            post: crate::cli::PostArgs {
                post: false,
                spreadsheet_id: "sheet".to_string(),
                sheet_id: "Sheet1".to_string(),
                id_column: "A".to_string(),
                access_token: None,
            },
        };
        run(args).expect("run copyright check");

        let digest = std::fs::read_to_string(output).expect("digest");
        assert_eq!(digest.matches(SEPARATOR).count(), 2);
        assert!(digest.contains("Submission # 3\nTitle: First\n"));
        assert!(digest.contains("Signature: NA\n"));
    }
}
