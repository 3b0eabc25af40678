//! Turns raw backend reply text into display content.
//!
//! The backend smuggles tabular data inside natural-language replies, either
//! as a fenced block of pipe-delimited rows or as a fixed emoji header line
//! followed by pipe-delimited rows. [`ResponseFormatter::format`] detects
//! which form a reply uses and produces a [`FormattedOutput`]; anything else
//! becomes escaped plain text.

use tracing::debug;

pub mod escape;
pub mod html;

pub use escape::{escape_text, html_to_text, text_to_html};

const FENCE: &str = "```";

/// Header line the action server emits for train search results.
pub const EMOJI_HEADER_LINE: &str = "🚆 Train | 📍 From | 🎯 To | ⏰ Timings | 📢 Status";

pub const EMOJI_COLUMNS: [&str; 5] = ["🚆 Train", "📍 From", "🎯 To", "⏰ Time", "📢 Status"];

const TRAIN_EMOJI: &str = "🚆";

pub const DEFAULT_FENCE_KEYWORDS: [&str; 2] = ["train", "pnr"];

pub const FENCED_CAPTION: &str = "Information";
pub const EMOJI_CAPTION: &str = "Train Information";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormattedOutput {
    /// HTML-escaped text with `<br>` line breaks.
    PlainText(String),
    Table(TableView),
}

impl FormattedOutput {
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::PlainText(text) if text.is_empty())
    }

    pub fn as_table(&self) -> Option<&TableView> {
        match self {
            Self::Table(table) => Some(table),
            Self::PlainText(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableView {
    pub caption: String,
    pub header: Vec<String>,
    pub rows: Vec<TableRow>,
    /// Escaped free text shown above the table.
    pub leading: Option<String>,
    /// Escaped free text shown below the table.
    pub trailing: Option<String>,
}

impl TableView {
    pub fn width(&self) -> usize {
        self.header.len().max(1)
    }

    pub fn cell_rows(&self) -> impl Iterator<Item = &[String]> {
        self.rows.iter().filter_map(|row| match row {
            TableRow::Cells(cells) => Some(cells.as_slice()),
            TableRow::Note(_) => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableRow {
    /// One unescaped value per header column.
    Cells(Vec<String>),
    /// Unescaped text spanning every column.
    Note(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detection {
    NoMatch,
    FencedTable,
    EmojiTable,
}

type Matcher = fn(&ResponseFormatter, &str) -> Detection;

/// Evaluated in order; the first non-`NoMatch` result wins.
const MATCHERS: [Matcher; 2] = [ResponseFormatter::match_fenced, ResponseFormatter::match_emoji];

#[derive(Debug, Clone)]
pub struct ResponseFormatter {
    fence_keywords: Vec<String>,
}

impl Default for ResponseFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseFormatter {
    pub fn new() -> Self {
        Self::with_keywords(DEFAULT_FENCE_KEYWORDS)
    }

    /// A fenced block only counts as a table when the reply mentions one of
    /// `keywords` (case-insensitive). An empty list accepts every fenced block.
    pub fn with_keywords<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            fence_keywords: keywords
                .into_iter()
                .map(|keyword| keyword.as_ref().trim().to_lowercase())
                .filter(|keyword| !keyword.is_empty())
                .collect(),
        }
    }

    pub fn detect(&self, raw: &str) -> Detection {
        MATCHERS
            .iter()
            .map(|matcher| matcher(self, raw))
            .find(|detection| *detection != Detection::NoMatch)
            .unwrap_or(Detection::NoMatch)
    }

    pub fn format(&self, raw: &str) -> FormattedOutput {
        if raw.is_empty() {
            return FormattedOutput::PlainText(String::new());
        }

        let detection = self.detect(raw);
        debug!(?detection, len = raw.len(), "formatting reply");
        match detection {
            Detection::FencedTable => match FencedBlock::split(raw) {
                Some(block) => FormattedOutput::Table(fenced_table(&block)),
                None => plain_text(raw),
            },
            Detection::EmojiTable => FormattedOutput::Table(emoji_table(raw)),
            Detection::NoMatch => plain_text(raw),
        }
    }

    fn match_fenced(&self, raw: &str) -> Detection {
        if !raw.contains(FENCE) || !self.mentions_keyword(raw) {
            return Detection::NoMatch;
        }
        match FencedBlock::split(raw) {
            Some(_) => Detection::FencedTable,
            None => Detection::NoMatch,
        }
    }

    fn match_emoji(&self, raw: &str) -> Detection {
        if raw.contains(EMOJI_HEADER_LINE) {
            Detection::EmojiTable
        } else {
            Detection::NoMatch
        }
    }

    fn mentions_keyword(&self, raw: &str) -> bool {
        if self.fence_keywords.is_empty() {
            return true;
        }
        let lowered = raw.to_lowercase();
        self.fence_keywords
            .iter()
            .any(|keyword| lowered.contains(keyword.as_str()))
    }
}

/// Formats with the default keyword set.
pub fn format(raw: &str) -> FormattedOutput {
    ResponseFormatter::new().format(raw)
}

fn plain_text(raw: &str) -> FormattedOutput {
    FormattedOutput::PlainText(text_to_html(raw))
}

struct FencedBlock<'a> {
    before: &'a str,
    inner: &'a str,
    after: &'a str,
}

impl<'a> FencedBlock<'a> {
    /// First complete fenced block. `after` keeps any further fences.
    fn split(raw: &'a str) -> Option<Self> {
        let open = raw.find(FENCE)?;
        let body_start = open + FENCE.len();
        let close = body_start + raw[body_start..].find(FENCE)?;
        let inner = &raw[body_start..close];
        if inner.is_empty() {
            return None;
        }
        Some(Self {
            before: &raw[..open],
            inner,
            after: &raw[close + FENCE.len()..],
        })
    }
}

fn fenced_table(block: &FencedBlock<'_>) -> TableView {
    let lines: Vec<&str> = block.inner.trim().split('\n').collect();

    let header: Vec<String> = lines
        .first()
        .map(|line| {
            line.split('|')
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let has_separator = lines.get(1).is_some_and(|line| is_separator_line(line));
    let data_start = if !header.is_empty() && has_separator { 2 } else { 1 };

    let mut rows = Vec::new();
    for line in lines.iter().skip(data_start) {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let parts: Vec<&str> = line.split('|').map(str::trim).collect();
        if !header.is_empty()
            && parts.len() == header.len()
            && parts.iter().any(|part| !part.is_empty())
        {
            rows.push(TableRow::Cells(parts.into_iter().map(str::to_string).collect()));
        } else if parts.len() == 1 {
            rows.push(TableRow::Note(parts[0].to_string()));
        } else {
            debug!(columns = header.len(), cells = parts.len(), "dropping mismatched row");
        }
    }

    TableView {
        caption: FENCED_CAPTION.to_string(),
        header,
        rows,
        leading: free_text(block.before),
        trailing: free_text(block.after),
    }
}

fn is_separator_line(line: &str) -> bool {
    !line.is_empty()
        && line
            .chars()
            .all(|ch| ch.is_whitespace() || matches!(ch, '|' | ':' | '-'))
}

fn emoji_table(raw: &str) -> TableView {
    let lines: Vec<&str> = raw.split('\n').collect();
    let header_idx = lines
        .iter()
        .position(|line| line.contains(EMOJI_HEADER_LINE))
        .unwrap_or(0);

    let mut rows = Vec::new();
    let mut notes = Vec::new();
    for (idx, line) in lines.iter().enumerate() {
        if idx == header_idx {
            continue;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if is_commentary_line(line) {
            notes.push(text_to_html(line));
            continue;
        }
        if idx < header_idx {
            continue;
        }
        let parts: Vec<&str> = line.split('|').map(str::trim).collect();
        if parts.len() >= EMOJI_COLUMNS.len() {
            rows.push(TableRow::Cells(
                parts[..EMOJI_COLUMNS.len()]
                    .iter()
                    .map(|part| part.to_string())
                    .collect(),
            ));
        }
    }

    TableView {
        caption: EMOJI_CAPTION.to_string(),
        header: EMOJI_COLUMNS.iter().map(|column| column.to_string()).collect(),
        rows,
        leading: None,
        trailing: (!notes.is_empty()).then(|| notes.join("<br>")),
    }
}

/// Lines the action server writes around the rows rather than as rows.
fn is_commentary_line(line: &str) -> bool {
    let lowered = line.to_lowercase();
    lowered.starts_with("here")
        || lowered.starts_with("these")
        || (line.contains("train") && !line.contains(TRAIN_EMOJI))
}

fn free_text(text: &str) -> Option<String> {
    let text = text.trim();
    (!text.is_empty()).then(|| text_to_html(text))
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
