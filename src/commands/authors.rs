use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::cli::AuthorsArgs;
use crate::metadata::load_submissions;
use crate::model::SubmissionRecord;
use crate::pdf::{PdfBackend, PopplerBackend};
use crate::reconcile::{
    FIRST_PAGE_PREFIX_CHARS, MatchResult, clean_text, first_page_prefix, name_tokens, reconcile,
};
use crate::util::walk_files;

const PAPER_SUFFIX: &str = "_Paper.pdf";

pub fn run(args: AuthorsArgs) -> Result<()> {
    let submissions = load_submissions(&args.submissions_path)?;
    let papers = find_papers(&args.pdfs_dir)?;
    info!(
        submissions = submissions.len(),
        pdfs = papers.len(),
        pdfs_dir = %args.pdfs_dir.display(),
        "checking author names"
    );

    let backend = PopplerBackend;
    let outcome = check_submissions(&backend, &submissions, &papers);

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    write_summary(&mut out, &outcome).context("failed to write author report")?;
    out.flush().context("failed to flush author report")?;

    info!(
        checked = outcome.checked,
        failed = outcome.failed_count(),
        skipped = outcome.skipped,
        "author check completed"
    );

    if args.post.post {
        super::post_problems(&args.post, &args.problem_column, &outcome.row_to_problem())?;
    }

    Ok(())
}

/// A submission whose PDF does not list the metadata authors verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
struct AuthorProblem {
    submission_id: u64,
    sheet_row: usize,
    expected: String,
    found: String,
}

impl AuthorProblem {
    fn comparison(&self) -> String {
        format!("meta=\"{}\"\npdf =\"{}\"", self.expected, self.found)
    }
}

#[derive(Debug, Default)]
struct AuthorCheckOutcome {
    checked: usize,
    skipped: usize,
    /// Problems keyed by category label, in submission order within each.
    problems: BTreeMap<&'static str, Vec<AuthorProblem>>,
}

impl AuthorCheckOutcome {
    fn failed_count(&self) -> usize {
        self.problems.values().map(Vec::len).sum()
    }

    fn row_to_problem(&self) -> BTreeMap<usize, String> {
        self.problems
            .iter()
            .flat_map(|(category, problems)| {
                problems.iter().map(move |problem| {
                    (
                        problem.sheet_row,
                        format!("{category}:\n{}", problem.comparison()),
                    )
                })
            })
            .collect()
    }
}

/// Maps submission ids to `{id}_Paper.pdf` files anywhere under `root`.
fn find_papers(root: &Path) -> Result<BTreeMap<u64, PathBuf>> {
    let mut papers = BTreeMap::<u64, PathBuf>::new();

    for path in walk_files(root)? {
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        let Some(id) = name.strip_suffix(PAPER_SUFFIX) else {
            continue;
        };
        let Ok(submission_id) = id.parse::<u64>() else {
            warn!(path = %path.display(), "ignoring paper with a non-numeric submission id");
            continue;
        };

        if let Some(existing) = papers.get(&submission_id) {
            warn!(
                submission_id,
                kept = %existing.display(),
                ignored = %path.display(),
                "duplicate paper for submission"
            );
            continue;
        }
        papers.insert(submission_id, path);
    }

    Ok(papers)
}

fn check_submissions(
    backend: &dyn PdfBackend,
    submissions: &[SubmissionRecord],
    papers: &BTreeMap<u64, PathBuf>,
) -> AuthorCheckOutcome {
    let mut outcome = AuthorCheckOutcome::default();

    for submission in submissions {
        let Some(path) = papers.get(&submission.submission_id) else {
            warn!(
                submission_id = submission.submission_id,
                "no PDF found for submission"
            );
            outcome.skipped += 1;
            continue;
        };

        let first_page = match first_page_text(backend, path) {
            Ok(text) => text,
            Err(err) => {
                warn!(
                    submission_id = submission.submission_id,
                    path = %path.display(),
                    error = %err,
                    "could not read first page"
                );
                outcome.skipped += 1;
                continue;
            }
        };

        outcome.checked += 1;
        let tokens = name_tokens(&submission.authors);
        let result = reconcile(&tokens, &first_page);
        let Some(category) = result.problem_label() else {
            if let MatchResult::Exact { span } = &result {
                debug!(
                    submission_id = submission.submission_id,
                    span = %span,
                    "author names matched"
                );
            }
            continue;
        };

        let found = match result {
            MatchResult::Fuzzy { span, .. } => span,
            _ => first_page,
        };
        outcome
            .problems
            .entry(category)
            .or_default()
            .push(AuthorProblem {
                submission_id: submission.submission_id,
                sheet_row: submission.sheet_row,
                expected: tokens.join(" "),
                found,
            });
    }

    let known = submissions
        .iter()
        .map(|submission| submission.submission_id)
        .collect::<BTreeSet<u64>>();
    for (submission_id, path) in papers {
        if !known.contains(submission_id) {
            warn!(submission_id, path = %path.display(), "paper has no submission metadata");
        }
    }

    outcome
}

/// Cleaned leading characters of page 1, where author names live.
fn first_page_text(backend: &dyn PdfBackend, path: &Path) -> Result<String> {
    let pages = backend.page_texts(path, Some(1))?;
    let page = pages.first().map(String::as_str).unwrap_or_default();
    Ok(clean_text(&first_page_prefix(page, FIRST_PAGE_PREFIX_CHARS)))
}

fn write_summary(out: &mut impl Write, outcome: &AuthorCheckOutcome) -> io::Result<()> {
    for (category, problems) in &outcome.problems {
        writeln!(out, "{category}")?;
        for problem in problems {
            writeln!(out, "{}:\n{}\n", problem.submission_id, problem.comparison())?;
        }
    }

    writeln!(out, "{} submissions failed:", outcome.failed_count())?;
    for (category, problems) in &outcome.problems {
        writeln!(out, "  {} {category}", problems.len())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::fs;

    use anyhow::bail;

    use super::*;
    use crate::model::AuthorRecord;

    /// First-page text keyed by file name.
    struct FakeBackend {
        pages: HashMap<String, String>,
    }

    impl PdfBackend for FakeBackend {
        fn page_texts(&self, path: &Path, last_page: Option<usize>) -> Result<Vec<String>> {
            assert_eq!(last_page, Some(1));
            let name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            match self.pages.get(&name) {
                Some(text) => Ok(vec![text.clone()]),
                None => bail!("pdftotext failed for {name}"),
            }
        }

        fn page_layouts(&self, _path: &Path) -> Result<Vec<crate::pdf::PageLayout>> {
            bail!("layouts are not used by the author check")
        }
    }

    fn submission(id: u64, names: &[(&str, &str)]) -> SubmissionRecord {
        SubmissionRecord {
            submission_id: id,
            sheet_row: id as usize + 1,
            authors: names
                .iter()
                .map(|(first, last)| AuthorRecord {
                    first: first.to_string(),
                    last: last.to_string(),
                    ..AuthorRecord::default()
                })
                .collect(),
            ..SubmissionRecord::default()
        }
    }

    fn fixture() -> (FakeBackend, Vec<SubmissionRecord>, BTreeMap<u64, PathBuf>) {
        let backend = FakeBackend {
            pages: HashMap::from([
                (
                    "1_Paper.pdf".to_string(),
                    "Great Title\nAda Lovelace and Charles Babbage\nAbstract".to_string(),
                ),
                (
                    "2_Paper.pdf".to_string(),
                    "Another Title\nJOSE GARCIA\nUniversidad".to_string(),
                ),
                (
                    "3_Paper.pdf".to_string(),
                    "Third Title\nSomeone Else\nAbstract".to_string(),
                ),
            ]),
        };
        let submissions = vec![
            submission(1, &[("Ada", "Lovelace"), ("Charles", "Babbage")]),
            submission(2, &[("José", "García")]),
            submission(3, &[("Grace", "Hopper")]),
            submission(4, &[("Alan", "Turing")]),
            submission(5, &[("Kurt", "Gödel")]),
        ];
        let papers = (1..=3)
            .chain([5])
            .map(|id| (id, PathBuf::from(format!("final/{id}_Paper.pdf"))))
            .collect();
        (backend, submissions, papers)
    }

    #[test]
    fn mismatches_are_grouped_by_category() {
        let (backend, submissions, papers) = fixture();
        let outcome = check_submissions(&backend, &submissions, &papers);

        assert_eq!(outcome.checked, 3);
        // Submission 4 has no PDF and 5 cannot be read.
        assert_eq!(outcome.skipped, 2);
        assert_eq!(outcome.failed_count(), 2);

        let fuzzy = &outcome.problems["CASE-PUNCT-ACCENT"];
        assert_eq!(fuzzy.len(), 1);
        assert_eq!(fuzzy[0].submission_id, 2);
        assert_eq!(fuzzy[0].expected, "José García");
        assert_eq!(fuzzy[0].found, "JOSE GARCIA");

        let unknown = &outcome.problems["UNKNOWN"];
        assert_eq!(unknown[0].submission_id, 3);
        assert_eq!(unknown[0].found, "Third Title\nSomeone Else\nAbstract");
    }

    #[test]
    fn summary_lists_categories_then_totals() {
        let (backend, submissions, papers) = fixture();
        let outcome = check_submissions(&backend, &submissions, &papers);

        let mut buffer = Vec::new();
        write_summary(&mut buffer, &outcome).expect("write summary");
        let printed = String::from_utf8(buffer).expect("utf8");

        assert_eq!(
            printed,
            "CASE-PUNCT-ACCENT\n\
             2:\nmeta=\"José García\"\npdf =\"JOSE GARCIA\"\n\n\
             UNKNOWN\n\
             3:\nmeta=\"Grace Hopper\"\npdf =\"Third Title\nSomeone Else\nAbstract\"\n\n\
             2 submissions failed:\n  1 CASE-PUNCT-ACCENT\n  1 UNKNOWN\n"
        );
    }

    #[test]
    fn clean_run_prints_zero_failures() {
        let outcome = AuthorCheckOutcome::default();
        let mut buffer = Vec::new();
        write_summary(&mut buffer, &outcome).expect("write summary");
        assert_eq!(
            String::from_utf8(buffer).expect("utf8"),
            "0 submissions failed:\n"
        );
    }

    #[test]
    fn problems_are_keyed_by_sheet_row() {
        let (backend, submissions, papers) = fixture();
        let outcome = check_submissions(&backend, &submissions, &papers);

        let rows = outcome.row_to_problem();
        assert_eq!(rows.len(), 2);
        assert_eq!(
            rows[&3],
            "CASE-PUNCT-ACCENT:\nmeta=\"José García\"\npdf =\"JOSE GARCIA\""
        );
        assert!(rows[&4].starts_with("UNKNOWN:\nmeta=\"Grace Hopper\""));
    }

    #[test]
    fn first_page_is_truncated_and_cleaned() {
        let long_tail = "x".repeat(FIRST_PAGE_PREFIX_CHARS);
        let backend = FakeBackend {
            pages: HashMap::from([(
                "9_Paper.pdf".to_string(),
                format!("Jose\u{301} {long_tail}"),
            )]),
        };
        let text = first_page_text(&backend, Path::new("9_Paper.pdf")).expect("text");
        assert!(text.starts_with("José "));
        assert_eq!(text.chars().count(), FIRST_PAGE_PREFIX_CHARS - 1);
    }

    #[test]
    fn find_papers_walks_nested_directories() {
        let dir = tempfile::tempdir().expect("tempdir");
        let nested = dir.path().join("long");
        fs::create_dir_all(&nested).expect("mkdir");
        fs::write(dir.path().join("12_Paper.pdf"), b"%PDF").expect("write");
        fs::write(nested.join("7_Paper.pdf"), b"%PDF").expect("write");
        fs::write(nested.join("7_Supplementary.pdf"), b"%PDF").expect("write");
        fs::write(nested.join("draft_Paper.pdf"), b"%PDF").expect("write");

        let papers = find_papers(dir.path()).expect("find papers");
        assert_eq!(papers.keys().copied().collect::<Vec<u64>>(), vec![7, 12]);
        assert_eq!(papers[&7], nested.join("7_Paper.pdf"));
    }

    #[test]
    fn find_papers_keeps_the_first_copy_of_a_submission() {
        let dir = tempfile::tempdir().expect("tempdir");
        let long = dir.path().join("long");
        let short = dir.path().join("short");
        fs::create_dir_all(&long).expect("mkdir");
        fs::create_dir_all(&short).expect("mkdir");
        fs::write(long.join("5_Paper.pdf"), b"%PDF").expect("write");
        fs::write(short.join("5_Paper.pdf"), b"%PDF").expect("write");

        let papers = find_papers(dir.path()).expect("find papers");
        assert_eq!(papers.len(), 1);
        assert_eq!(papers[&5], long.join("5_Paper.pdf"));
    }
}
