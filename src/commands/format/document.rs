use super::*;

/// Layout and text of one submission PDF, aligned by page index.
#[derive(Debug, Clone, Default)]
pub(super) struct SubmissionPdf {
    pub(super) layouts: Vec<PageLayout>,
    /// `None` where text extraction failed.
    pub(super) texts: Vec<Option<String>>,
}

impl SubmissionPdf {
    pub(super) fn page_count(&self) -> usize {
        self.layouts.len()
    }

    /// Pages with their 1-based page numbers.
    pub(super) fn numbered_pages(&self) -> impl Iterator<Item = (usize, &PageLayout)> {
        self.layouts
            .iter()
            .enumerate()
            .map(|(index, page)| (index + 1, page))
    }

    pub(super) fn text(&self, index: usize) -> Option<&str> {
        self.texts.get(index).and_then(|text| text.as_deref())
    }
}

pub(super) fn load_document(backend: &dyn PdfBackend, path: &Path) -> Result<SubmissionPdf> {
    let layouts = backend.page_layouts(path)?;

    let texts = match backend.page_texts(path, None) {
        Ok(pages) => (0..layouts.len())
            .map(|index| pages.get(index).cloned())
            .collect(),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "page text extraction failed");
            vec![None; layouts.len()]
        }
    };

    Ok(SubmissionPdf { layouts, texts })
}
