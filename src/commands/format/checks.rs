use super::*;

pub(super) fn check_document(document: &SubmissionPdf, rules: &FormatRules) -> FormatReport {
    let mut checker = FormatChecker {
        document,
        rules,
        report: FormatReport::default(),
        page_errors: BTreeSet::new(),
    };

    checker.check_page_size();
    checker.check_page_margin();
    checker.check_page_limit();
    checker.check_font();
    checker.check_references();

    checker.report
}

struct FormatChecker<'a> {
    document: &'a SubmissionPdf,
    rules: &'a FormatRules,
    report: FormatReport,
    /// Pages excluded from the layout checks that follow.
    page_errors: BTreeSet<usize>,
}

impl FormatChecker<'_> {
    fn check_page_size(&mut self) {
        let pages = self
            .document
            .numbered_pages()
            .filter(|(_, page)| !page.parse_failed && !self.rules.is_a4(page))
            .map(|(number, _)| number)
            .collect::<Vec<usize>>();

        if !pages.is_empty() {
            self.report.push(
                FormatCategory::Size,
                format!("Size of page {} is not A4.", format_page_list(&pages)),
            );
        }
        self.page_errors.extend(pages);
    }

    fn check_page_margin(&mut self) {
        let mut parse_errors = Vec::new();
        let mut pages_image = BTreeSet::new();
        let mut pages_text = BTreeMap::<usize, Vec<MarginIntrusion>>::new();

        for (number, page) in self.document.numbered_pages() {
            if self.page_errors.contains(&number) {
                continue;
            }
            if page.parse_failed {
                parse_errors.push(number);
                continue;
            }

            if page.images.iter().any(|image| {
                self.rules
                    .intrudes_margin(page.width, image.top, image.left, image.right)
            }) {
                pages_image.insert(number);
            }

            for word in &page.text_boxes {
                if self
                    .rules
                    .intrudes_margin(page.width, word.top, word.left, word.right)
                {
                    pages_text.entry(number).or_default().push(MarginIntrusion {
                        text: word.text.clone(),
                        left: word.left,
                        right_gap: page.width - word.right,
                    });
                }
            }
        }

        if !parse_errors.is_empty() {
            self.report.set(
                FormatCategory::Parsing,
                format!(
                    "Error occurs when parsing page {}.",
                    format_page_list(&parse_errors)
                ),
            );
            self.page_errors.extend(parse_errors);
        }
        if !pages_image.is_empty() {
            let pages = pages_image.into_iter().collect::<Vec<usize>>();
            self.report.push(
                FormatCategory::Margin,
                format!(
                    "Images on page {} <may> fall in the margin.",
                    format_page_list(&pages)
                ),
            );
        }
        if !pages_text.is_empty() {
            let pages = pages_text.keys().copied().collect::<Vec<usize>>();
            self.report.push(
                FormatCategory::Margin,
                format!(
                    "Texts on page {} <may> fall in the margin.",
                    format_page_list(&pages)
                ),
            );
            self.report
                .push(FormatCategory::Margin, "Details are as follows:".to_string());
            self.report.push(
                FormatCategory::Margin,
                Finding::MarginDetails(pages_text),
            );
        }
    }

    /// Looks for the first back-matter heading; if it starts after the first
    /// line of the page following the limit, the paper likely runs long.
    fn check_page_limit(&mut self) {
        let mut marker: Option<(usize, usize)> = None;
        let mut misspelled = false;

        for index in 0..self.document.page_count() {
            let number = index + 1;
            if self.page_errors.contains(&number) {
                continue;
            }
            let Some(text) = self.document.text(index) else {
                continue;
            };

            for (line_index, line) in text.lines().enumerate() {
                if marker.is_none() && SECTION_MARKERS.iter().any(|name| line.contains(name)) {
                    marker = Some((number, line_index + 1));
                }
                if line.contains("Acknowl")
                    && !ACKNOWLEDGMENT_SPELLINGS
                        .iter()
                        .any(|spelling| line.contains(spelling))
                {
                    misspelled = true;
                }
            }
        }

        if misspelled {
            self.report.set(
                FormatCategory::Misspell,
                "'Acknowledgments' was misspelled.".to_string(),
            );
        }

        let Some(limit) = self.rules.page_limit else {
            return;
        };
        if self.document.page_count() <= limit {
            return;
        }

        match marker {
            Some((page, line)) if (page, line) > (limit + 1, 1) => self.report.set(
                FormatCategory::PageLimit,
                format!(
                    "Paper <may> exceed the page limit because first (References, \
                     Acknowledgments, Ethics) was found on page {page}, line {line}."
                ),
            ),
            Some(_) => {}
            None => self.report.set(
                FormatCategory::PageLimit,
                format!(
                    "Paper <may> exceed the page limit: it has {} pages and no (References, \
                     Acknowledgments, Ethics) section was found.",
                    self.document.page_count()
                ),
            ),
        }
    }

    fn check_font(&mut self) {
        let document = self.document;
        let mut fonts = BTreeMap::<&str, usize>::new();
        for (number, page) in document.numbered_pages() {
            if page.parse_failed {
                self.report
                    .push(FormatCategory::Font, format!("Can't parse page #{number}"));
                continue;
            }
            for (family, count) in &page.font_chars {
                *fonts.entry(family.as_str()).or_insert(0) += count;
            }
        }

        let total = fonts.values().sum::<usize>();
        // Ties go to the greater font name.
        let main_font = fonts
            .iter()
            .max_by(|left, right| left.1.cmp(right.1).then(left.0.cmp(right.0)));
        let Some((name, count)) = main_font.filter(|_| total > 0) else {
            self.report
                .push(FormatCategory::Font, "Can't find the main font".to_string());
            return;
        };

        if (*count as f64) / (total as f64) < self.rules.min_main_font_ratio {
            self.report
                .push(FormatCategory::Font, "Can't find the main font".to_string());
        }

        if !name.ends_with(self.rules.main_font.as_str()) {
            self.report.push(
                FormatCategory::Font,
                format!(
                    "Wrong font. The main font used is {name} when it should be {}.",
                    self.rules.main_font
                ),
            );
        }
    }

    /// Citations should carry links, preferably DOIs rather than arXiv.
    fn check_references(&mut self) {
        let mut found_references = false;
        let mut arxiv_mentions = 0usize;
        let mut doi_links = 0usize;
        let mut arxiv_links = 0usize;
        let mut all_links = 0usize;

        for (index, page) in self.document.layouts.iter().enumerate() {
            let text = match self.document.text(index) {
                Some(text) => text,
                None => {
                    self.report
                        .push(FormatCategory::Bib, format!("Can't parse page #{}", index + 1));
                    ""
                }
            };

            if !found_references && text.lines().any(|line| line.contains("References")) {
                found_references = true;
            }
            if !found_references {
                continue;
            }

            arxiv_mentions += text.to_lowercase().matches("arxiv").count();
            // A link spanning several lines shows up once per line.
            let links = page
                .links
                .iter()
                .map(String::as_str)
                .collect::<BTreeSet<&str>>();
            for link in links {
                if link.contains("doi.org") {
                    doi_links += 1;
                } else if link.contains("arxiv.org") {
                    arxiv_links += 1;
                }
                all_links += 1;
            }
        }

        if doi_links < self.rules.min_doi_links {
            self.report.push(
                FormatCategory::Bib,
                format!(
                    "Bibliography should use ACL Anthology DOIs whenever possible. \
                     Only {doi_links} references do."
                ),
            );
        }
        if (arxiv_links as f64) > self.rules.max_arxiv_link_share * (all_links as f64) {
            self.report.push(
                FormatCategory::Bib,
                format!(
                    "It appears you are using arXiv links more than you should \
                     ({arxiv_links}/{all_links}). Consider using ACL Anthology DOIs instead."
                ),
            );
        }
        if all_links < self.rules.min_links {
            self.report.push(
                FormatCategory::Bib,
                format!(
                    "It appears most of the references are not using paper links. \
                     Only {all_links} links found."
                ),
            );
        }
        if arxiv_mentions > self.rules.max_arxiv_mentions {
            self.report.push(
                FormatCategory::Bib,
                format!(
                    "It appears you are using arXiv references more than you should \
                     ({arxiv_mentions} found). Consider using ACL Anthology references instead."
                ),
            );
        }
        if !found_references {
            self.report
                .push(FormatCategory::Bib, "Couldn't find references".to_string());
        }
    }
}

pub(super) fn format_page_list(pages: &[usize]) -> String {
    let joined = pages
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<String>>()
        .join(", ");
    format!("[{joined}]")
}
