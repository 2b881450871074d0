use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::{error, info, warn};

use crate::cli::FormatArgs;
use crate::model::{Finding, FormatCategory, FormatReport, FormatRunEntry, MarginIntrusion};
use crate::pdf::{PageLayout, PdfBackend};

mod checks;
mod document;
mod rules;
mod run;

pub use run::run;

use checks::*;
use document::*;
use rules::*;
