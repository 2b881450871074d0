use std::ops::Range;
use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};
use tracing::warn;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

use crate::model::AuthorRecord;

pub const FIRST_PAGE_PREFIX_CHARS: usize = 500;

/// Compiled size allowed for a name pattern. Long author lists produce long
/// patterns; the default limit is sized for hand-written expressions.
const NAME_PATTERN_SIZE_LIMIT: usize = 64 << 20;

/// Characters tolerated inside a name token during the lenient retry:
/// space separators, punctuation and combining marks.
static TOLERATED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\p{Zs}\p{P}\p{Mn}]").expect("valid regex"));

/// A run of space separators followed by a combining mark, as PDF text
/// extraction tends to emit accents.
static DETACHED_MARK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\p{Zs}+(\p{Mn})").expect("valid regex"));

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MismatchKind {
    CasePunctAccent,
}

impl MismatchKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CasePunctAccent => "CASE-PUNCT-ACCENT",
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum MatchResult {
    Exact { span: String },
    Fuzzy { kind: MismatchKind, span: String },
    NoMatch,
}

impl MatchResult {
    /// Report category for a non-exact result.
    pub fn problem_label(&self) -> Option<&'static str> {
        match self {
            Self::Exact { .. } => None,
            Self::Fuzzy { kind, .. } => Some(kind.as_str()),
            Self::NoMatch => Some("UNKNOWN"),
        }
    }
}

/// Checks that `expected` appears in `text` in order, allowing anything
/// between consecutive tokens. Falls back to a case, punctuation and accent
/// insensitive search before giving up.
///
/// The lenient search runs on a folded copy of `text` that remembers where
/// every folded character came from, so the fuzzy span is cut from `text`
/// exactly even when folding changes the length (`ß` becomes `ss`).
pub fn reconcile<S: AsRef<str>>(expected: &[S], text: &str) -> MatchResult {
    let tokens = expected
        .iter()
        .map(|token| token.as_ref().trim())
        .filter(|token| !token.is_empty())
        .collect::<Vec<&str>>();

    if let Some(range) = ordered_match(&tokens, text, false) {
        return MatchResult::Exact {
            span: text[range].to_string(),
        };
    }

    match folded_span(&tokens, text) {
        Some(span) => MatchResult::Fuzzy {
            kind: MismatchKind::CasePunctAccent,
            span,
        },
        None => MatchResult::NoMatch,
    }
}

/// Leftmost match of `pieces` in order, shortest gaps first.
fn ordered_match<S: AsRef<str>>(
    pieces: &[S],
    haystack: &str,
    case_insensitive: bool,
) -> Option<Range<usize>> {
    let pattern = pieces
        .iter()
        .map(|piece| regex::escape(piece.as_ref()))
        .collect::<Vec<String>>()
        .join(".*?");

    let regex = match RegexBuilder::new(&pattern)
        .dot_matches_new_line(true)
        .case_insensitive(case_insensitive)
        .size_limit(NAME_PATTERN_SIZE_LIMIT)
        .build()
    {
        Ok(regex) => regex,
        Err(err) => {
            warn!(
                tokens = pieces.len(),
                pattern_len = pattern.len(),
                error = %err,
                "author name pattern did not compile"
            );
            return None;
        }
    };

    regex.find(haystack).map(|found| found.range())
}

fn folded_span(tokens: &[&str], text: &str) -> Option<String> {
    let pieces = tokens
        .iter()
        .flat_map(|token| folded_token_pieces(token))
        .collect::<Vec<String>>();

    let folded = FoldedText::new(text);
    let range = ordered_match(&pieces, &folded.text, true)?;
    Some(text[folded.source_range(range)].to_string())
}

fn folded_token_pieces(token: &str) -> Vec<String> {
    let folded = fold_ascii(token);
    TOLERATED
        .split(&folded)
        .filter(|piece| !piece.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

/// `text` folded to ASCII with tolerated characters removed. Each folded
/// character keeps the byte range of the source character it came from.
struct FoldedText {
    text: String,
    /// Byte offset in `text` of each folded character.
    starts: Vec<usize>,
    /// Source byte range of each folded character.
    sources: Vec<Range<usize>>,
}

impl FoldedText {
    fn new(source: &str) -> Self {
        let mut folded = Self {
            text: String::with_capacity(source.len()),
            starts: Vec::new(),
            sources: Vec::new(),
        };
        let mut piece = String::new();
        let mut buffer = [0_u8; 4];

        for (offset, character) in source.char_indices() {
            piece.clear();
            fold_char(character, &mut piece);
            let source_range = offset..offset + character.len_utf8();

            for folded_char in piece.chars() {
                if TOLERATED.is_match(folded_char.encode_utf8(&mut buffer)) {
                    continue;
                }
                folded.starts.push(folded.text.len());
                folded.sources.push(source_range.clone());
                folded.text.push(folded_char);
            }
        }

        folded
    }

    /// Maps a byte range of the folded text back onto the source text.
    fn source_range(&self, range: Range<usize>) -> Range<usize> {
        let first = self.starts.partition_point(|start| *start < range.start);
        let end = self.starts.partition_point(|start| *start < range.end);
        if end <= first {
            return 0..0;
        }
        match (self.sources.get(first), self.sources.get(end - 1)) {
            (Some(first), Some(last)) => first.start..last.end,
            _ => 0..0,
        }
    }
}

/// Cleans text pulled out of a PDF or a metadata cell: trims, removes space
/// separators that precede a combining mark, and applies NFKC, until the
/// value stops changing.
pub fn clean_text(value: &str) -> String {
    let mut current = value.trim().to_string();
    loop {
        let next = DETACHED_MARK
            .replace_all(&current, "$1")
            .nfkc()
            .collect::<String>();
        if next == current {
            return current;
        }
        current = next;
    }
}

pub fn first_page_prefix(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

/// Maps every character to its closest unaccented equivalent.
pub fn fold_ascii(text: &str) -> String {
    let mut folded = String::with_capacity(text.len());
    for character in text.chars() {
        fold_char(character, &mut folded);
    }
    folded
}

fn fold_char(character: char, out: &mut String) {
    if let Some(replacement) = fold_special(character) {
        out.push_str(replacement);
        return;
    }

    // Special letters can also hide under an accent (`Ǿ` is `Ø` plus acute).
    for decomposed in std::iter::once(character).nfkd() {
        if is_combining_mark(decomposed) {
            continue;
        }
        match fold_special(decomposed) {
            Some(replacement) => out.push_str(replacement),
            None => out.push(decomposed),
        }
    }
}

// Letters that are distinct code points rather than accented forms, so NFKD
// leaves them alone.
fn fold_special(character: char) -> Option<&'static str> {
    let replacement = match character {
        'Ł' => "L",
        'ł' => "l",
        'Ø' => "O",
        'ø' => "o",
        'Æ' => "AE",
        'æ' => "ae",
        'Œ' => "OE",
        'œ' => "oe",
        'ß' => "ss",
        'Ð' => "D",
        'ð' => "d",
        'Þ' => "Th",
        'þ' => "th",
        'Đ' => "D",
        'đ' => "d",
        'ı' => "i",
        'Ħ' => "H",
        'ħ' => "h",
        '‘' | '’' | '‚' | '′' => "'",
        '“' | '”' | '„' | '″' => "\"",
        '–' | '—' | '‐' | '‑' => "-",
        _ => return None,
    };
    Some(replacement)
}

/// Builds the expected name sequence: every whitespace-separated fragment of
/// every first, middle and last name, in author order.
pub fn name_tokens(authors: &[AuthorRecord]) -> Vec<String> {
    authors
        .iter()
        .flat_map(|author| [&author.first, &author.middle, &author.last])
        .flat_map(|part| part.split_whitespace())
        .map(ToOwned::to_owned)
        .collect()
}
