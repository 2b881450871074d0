use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "aclpub-check",
    version,
    about = "Author, copyright and formatting checks for conference paper submissions"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check that metadata author names appear in order on each PDF's first page.
    CheckAuthors(AuthorsArgs),
    /// Check page size, margins, page limit, fonts and bibliography of PDFs.
    CheckFormat(FormatArgs),
    /// Validate copyright signatures and write the signature digest.
    CheckCopyright(CopyrightArgs),
    /// Build the program order file from the schedule spreadsheet.
    SheetToOrder(OrderArgs),
}

/// Spreadsheet target for posting per-row problems.
#[derive(Args, Debug, Clone)]
pub struct PostArgs {
    #[arg(long, default_value_t = false)]
    pub post: bool,

    #[arg(long, default_value = "1lQyGZNBEBwukf8-mgPzIH57xUX9y4o2OUCzpEvNpW9A")]
    pub spreadsheet_id: String,

    #[arg(long, default_value = "Sheet1")]
    pub sheet_id: String,

    #[arg(long, default_value = "A")]
    pub id_column: String,

    #[arg(long, env = "GOOGLE_SHEETS_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct AuthorsArgs {
    #[arg(long = "submissions", default_value = "Submission_Information.csv")]
    pub submissions_path: PathBuf,

    #[arg(long = "pdfs", default_value = "final")]
    pub pdfs_dir: PathBuf,

    #[arg(long, default_value = "F")]
    pub problem_column: String,

    #[command(flatten)]
    pub post: PostArgs,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum PaperType {
    Short,
    Long,
    Other,
}

impl PaperType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Short => "short",
            Self::Long => "long",
            Self::Other => "other",
        }
    }

    /// Pages allowed before references and back matter.
    pub fn page_limit(self) -> Option<usize> {
        match self {
            Self::Short => Some(5),
            Self::Long => Some(9),
            Self::Other => None,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct FormatArgs {
    /// PDF files or directories searched recursively for PDFs.
    #[arg(value_name = "FILE_OR_DIR", required = true, num_args = 1..)]
    pub paths: Vec<PathBuf>,

    #[arg(long, value_enum, default_value_t = PaperType::Long)]
    pub paper_type: PaperType,

    #[arg(long, default_value_t = 1)]
    pub num_workers: usize,

    #[arg(long, default_value = "NimbusRomNo9L-Regu")]
    pub main_font: String,

    #[arg(long, default_value_t = 0.35)]
    pub min_main_font_ratio: f64,

    #[arg(long)]
    pub summary_path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct CopyrightArgs {
    #[arg(long = "submissions", default_value = "Submission_Information.csv")]
    pub submissions_path: PathBuf,

    #[arg(long, default_value = "copyright-signatures.txt")]
    pub output: PathBuf,

    #[arg(long, default_value = "E")]
    pub problem_column: String,

    #[command(flatten)]
    pub post: PostArgs,
}

#[derive(Args, Debug, Clone)]
pub struct OrderArgs {
    #[arg(long, default_value = "14ebEFK6egReR2Y_6BxdMO6V_LZoOMhqk1OGYNUYpLI0")]
    pub spreadsheet_id: String,

    #[arg(long, default_value = "Final-AllPaperTimes!A:L")]
    pub papers_range: String,

    #[arg(long, default_value = "Detailed Schedule!A:E")]
    pub sessions_range: String,

    #[arg(long, default_value = "2021-06-07")]
    pub start_date: NaiveDate,

    #[arg(long, default_value = "order.txt")]
    pub output: PathBuf,

    #[arg(long, env = "GOOGLE_SHEETS_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,
}
