use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use chrono::Utc;

use super::*;
use crate::model::{FormatRunManifest, ToolVersions};
use crate::pdf::{PopplerBackend, command_version_optional};
use crate::util::{
    is_pdf, now_utc_string, sha256_file, utc_compact_string, walk_files, write_json_pretty,
};

pub fn run(args: FormatArgs) -> Result<()> {
    let started_ts = Utc::now();
    let started_at = now_utc_string();
    let run_id = format!("format-{}", utc_compact_string(started_ts));
    let rules = FormatRules::from_args(&args);

    let pdfs = collect_pdfs(&args.paths)?;
    if pdfs.is_empty() {
        warn!(paths = ?args.paths, "no PDF files found");
        return Ok(());
    }

    info!(
        run_id = %run_id,
        pdf_count = pdfs.len(),
        paper_type = %rules.paper_type,
        num_workers = args.num_workers,
        "starting format check"
    );

    let backend = PopplerBackend;
    let entries = check_all(&backend, &rules, &pdfs, args.num_workers);

    let clean_count = entries
        .iter()
        .filter(|entry| entry.error.is_none() && entry.finding_count == 0)
        .count();
    let failed_count = entries.iter().filter(|entry| entry.error.is_some()).count();

    if let Some(summary_path) = &args.summary_path {
        let manifest = FormatRunManifest {
            manifest_version: 1,
            run_id: run_id.clone(),
            started_at,
            updated_at: now_utc_string(),
            paper_type: rules.paper_type.clone(),
            num_workers: args.num_workers.max(1),
            tool_versions: ToolVersions {
                pdftotext: command_version_optional("pdftotext", &["-v"]),
                pdftohtml: command_version_optional("pdftohtml", &["-v"]),
            },
            pdf_count: pdfs.len(),
            clean_count,
            failed_count,
            entries,
        };
        write_json_pretty(summary_path, &manifest)?;
        info!(path = %summary_path.display(), "wrote format run summary");
    }

    info!(
        run_id = %run_id,
        pdf_count = pdfs.len(),
        clean = clean_count,
        failed = failed_count,
        "format check completed"
    );

    Ok(())
}

pub(super) fn collect_pdfs(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut pdfs = BTreeSet::new();

    for path in paths {
        if path.is_dir() {
            pdfs.extend(walk_files(path)?.into_iter().filter(|file| is_pdf(file)));
        } else if path.is_file() && is_pdf(path) {
            pdfs.insert(path.clone());
        } else {
            warn!(path = %path.display(), "skipping path that is not a PDF or directory");
        }
    }

    Ok(pdfs.into_iter().collect())
}

/// Checks every PDF, fanning out over `num_workers` scoped threads that pull
/// the next index from a shared counter. Entries come back in input order.
pub(super) fn check_all(
    backend: &dyn PdfBackend,
    rules: &FormatRules,
    pdfs: &[PathBuf],
    num_workers: usize,
) -> Vec<FormatRunEntry> {
    let total = pdfs.len();
    let workers = num_workers.clamp(1, total.max(1));
    let next = AtomicUsize::new(0);
    let finished = AtomicUsize::new(0);

    let mut results = thread::scope(|scope| {
        let mut handles = Vec::with_capacity(workers);
        for _ in 0..workers {
            handles.push(scope.spawn(|| {
                let mut local = Vec::new();
                loop {
                    let index = next.fetch_add(1, Ordering::Relaxed);
                    let Some(path) = pdfs.get(index) else {
                        break;
                    };
                    local.push((index, check_one(backend, rules, path)));

                    let done = finished.fetch_add(1, Ordering::Relaxed) + 1;
                    info!(done, total, "format check progress");
                }
                local
            }));
        }

        handles
            .into_iter()
            .flat_map(|handle| match handle.join() {
                Ok(local) => local,
                Err(_) => {
                    error!("format check worker panicked");
                    Vec::new()
                }
            })
            .collect::<Vec<(usize, FormatRunEntry)>>()
    });

    results.sort_by_key(|(index, _)| *index);
    results.into_iter().map(|(_, entry)| entry).collect()
}

pub(super) fn check_one(
    backend: &dyn PdfBackend,
    rules: &FormatRules,
    path: &Path,
) -> FormatRunEntry {
    info!(path = %path.display(), "checking submission");

    let report = match load_document(backend, path) {
        Ok(document) => check_document(&document, rules),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "could not open PDF");
            let mut report = FormatReport::default();
            report.set(
                FormatCategory::Parsing,
                format!("Error occurs when parsing the document: {err:#}"),
            );
            report
        }
    };

    let report_path = report_path_for(path);
    let sha256 = sha256_file(path).ok();
    let mut entry = FormatRunEntry {
        pdf_path: path.display().to_string(),
        report_path: Some(report_path.display().to_string()),
        sha256,
        finding_count: report.finding_count(),
        categories: report.findings.keys().copied().collect(),
        error: None,
    };

    // Written even when clean so every PDF has a matching report.
    match write_json_pretty(&report_path, &report) {
        Ok(()) if !report.is_clean() => {
            info!(report = %report_path.display(), "format problems found");
        }
        Ok(()) => {}
        Err(err) => {
            error!(path = %path.display(), error = %err, "failed to write format report");
            entry.report_path = None;
            entry.error = Some(format!("{err:#}"));
        }
    }

    entry
}

/// `paper.pdf` -> `paper_format.json` in the same directory.
pub(super) fn report_path_for(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "submission".to_string());
    path.with_file_name(format!("{stem}_format.json"))
}
