use super::*;

// A4 at 72 points per inch: 21cm x 29.7cm.
pub(super) const A4_WIDTH: f64 = 595.0;
pub(super) const A4_HEIGHT: f64 = 842.0;

// 2cm top margin, 2.5cm side margins, each with a little slack for
// rendering differences between PDF producers.
const TOP_MARGIN: f64 = 57.0 - 1.0;
const LEFT_MARGIN: f64 = 71.0 - 2.0;
const RIGHT_MARGIN: f64 = 71.0 - 4.5;

pub(super) const SECTION_MARKERS: [&str; 4] = ["References", "Acknowl", "Ethic", "Broader Impact"];
pub(super) const ACKNOWLEDGMENT_SPELLINGS: [&str; 2] = ["Acknowledgment", "Acknowledgement"];

#[derive(Debug, Clone)]
pub(super) struct FormatRules {
    pub(super) paper_type: String,
    pub(super) page_limit: Option<usize>,
    pub(super) main_font: String,
    pub(super) min_main_font_ratio: f64,
    pub(super) top_margin: f64,
    pub(super) left_margin: f64,
    pub(super) right_margin: f64,
    pub(super) min_doi_links: usize,
    pub(super) max_arxiv_link_share: f64,
    pub(super) min_links: usize,
    pub(super) max_arxiv_mentions: usize,
}

impl Default for FormatRules {
    fn default() -> Self {
        Self {
            paper_type: "long".to_string(),
            page_limit: Some(9),
            main_font: "NimbusRomNo9L-Regu".to_string(),
            min_main_font_ratio: 0.35,
            top_margin: TOP_MARGIN,
            left_margin: LEFT_MARGIN,
            right_margin: RIGHT_MARGIN,
            min_doi_links: 3,
            max_arxiv_link_share: 0.2,
            min_links: 5,
            max_arxiv_mentions: 10,
        }
    }
}

impl FormatRules {
    pub(super) fn from_args(args: &FormatArgs) -> Self {
        Self {
            paper_type: args.paper_type.as_str().to_string(),
            page_limit: args.paper_type.page_limit(),
            main_font: args.main_font.clone(),
            min_main_font_ratio: args.min_main_font_ratio,
            ..Self::default()
        }
    }

    pub(super) fn is_a4(&self, page: &PageLayout) -> bool {
        page.width.round() == A4_WIDTH && page.height.round() == A4_HEIGHT
    }

    pub(super) fn intrudes_margin(&self, page_width: f64, top: f64, left: f64, right: f64) -> bool {
        top < self.top_margin || left < self.left_margin || page_width - right < self.right_margin
    }
}
