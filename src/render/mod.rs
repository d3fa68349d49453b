//! Article body (a small markdown subset) to styled, width-wrapped lines.
//!
//! Rendering is a pure function of `(body, width, theme)`: no shared state, safe to run on
//! any number of blocking workers at once.

mod inline;
mod wrap;

use crate::ui::Theme;
use ratatui::text::{Line, Span};
use std::sync::Arc;
use unicode_width::UnicodeWidthStr;

pub use inline::inline_spans;
pub use wrap::{hard_wrap, spans_width, wrap_spans};

const TAB_SPACES: &str = "    ";
const MAX_LIST_INDENT: usize = 8;

#[derive(Debug, thiserror::Error, Clone, Eq, PartialEq)]
pub enum RenderError {
    #[error("render width must be positive")]
    ZeroWidth,

    #[error("code block opened on line {line} is never closed")]
    UnterminatedCodeBlock { line: usize },

    #[error("render did not finish within {after_ms} ms")]
    Timeout { after_ms: u64 },

    #[error("render worker failed: {0}")]
    Internal(String),
}

/// Rendered article lines; cheap to clone into every frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RenderedContent(Arc<Vec<Line<'static>>>);

impl RenderedContent {
    pub fn from_lines(lines: Vec<Line<'static>>) -> Self {
        Self(Arc::new(lines))
    }

    pub fn lines(&self) -> &[Line<'static>] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn plain_text(&self) -> String {
        self.0
            .iter()
            .map(|line| {
                line.spans
                    .iter()
                    .map(|span| span.content.as_ref())
                    .collect::<String>()
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
enum Block {
    Blank,
    Heading { level: usize, text: String },
    Paragraph(String),
    Quote(String),
    ListItem {
        indent: usize,
        marker: String,
        text: String,
    },
    Code(Vec<String>),
    Rule,
}

impl Block {
    /// Soft-wrapped source lines continue the open paragraph, quote or list item.
    fn continue_with(&mut self, text: &str) -> bool {
        match self {
            Block::Paragraph(body) | Block::Quote(body) | Block::ListItem { text: body, .. } => {
                if !body.is_empty() {
                    body.push(' ');
                }
                body.push_str(text.trim());
                true
            }
            _ => false,
        }
    }
}

struct OpenFence {
    marker: &'static str,
    line: usize,
    lines: Vec<String>,
}

pub fn render_article(body: &str, width: u16, theme: &Theme) -> Result<RenderedContent, RenderError> {
    if width == 0 {
        return Err(RenderError::ZeroWidth);
    }
    let blocks = normalize_blank_blocks(parse_blocks(body)?);
    let width = usize::from(width);

    let mut lines = Vec::new();
    for block in &blocks {
        lines.extend(render_block(block, width, theme));
    }
    Ok(RenderedContent::from_lines(lines))
}

fn parse_blocks(body: &str) -> Result<Vec<Block>, RenderError> {
    let mut blocks = Vec::new();
    let mut open: Option<Block> = None;
    let mut fence: Option<OpenFence> = None;

    for (index, raw_line) in body.lines().enumerate() {
        let trimmed = raw_line.trim_start();

        if let Some(current) = fence.as_mut() {
            if closes_fence(trimmed, current.marker) {
                if let Some(done) = fence.take() {
                    blocks.push(Block::Code(done.lines));
                }
            } else {
                current.lines.push(raw_line.replace('\t', TAB_SPACES));
            }
            continue;
        }

        if let Some(marker) = fence_marker(trimmed) {
            blocks.extend(open.take());
            fence = Some(OpenFence {
                marker,
                line: index + 1,
                lines: Vec::new(),
            });
            continue;
        }

        if trimmed.is_empty() {
            blocks.extend(open.take());
            blocks.push(Block::Blank);
            continue;
        }

        if let Some((level, text)) = parse_heading(trimmed) {
            blocks.extend(open.take());
            blocks.push(Block::Heading {
                level,
                text: text.to_string(),
            });
            continue;
        }

        if is_rule(trimmed) {
            blocks.extend(open.take());
            blocks.push(Block::Rule);
            continue;
        }

        if let Some(quoted) = trimmed.strip_prefix('>') {
            let quoted = quoted.strip_prefix(' ').unwrap_or(quoted);
            match open.as_mut() {
                Some(block @ Block::Quote(_)) => {
                    block.continue_with(quoted);
                }
                _ => {
                    blocks.extend(open.take());
                    open = Some(Block::Quote(quoted.trim().to_string()));
                }
            }
            continue;
        }

        if let Some((marker, text)) = parse_list_marker(trimmed) {
            blocks.extend(open.take());
            let indent = (raw_line.len() - trimmed.len()).min(MAX_LIST_INDENT);
            open = Some(Block::ListItem {
                indent,
                marker,
                text: text.trim().to_string(),
            });
            continue;
        }

        let continued = open
            .as_mut()
            .is_some_and(|block| block.continue_with(trimmed));
        if !continued {
            blocks.extend(open.take());
            open = Some(Block::Paragraph(trimmed.trim_end().to_string()));
        }
    }

    if let Some(unclosed) = fence {
        return Err(RenderError::UnterminatedCodeBlock {
            line: unclosed.line,
        });
    }
    blocks.extend(open.take());
    Ok(blocks)
}

/// Drops leading and trailing blank blocks and collapses runs of blanks into one.
fn normalize_blank_blocks(blocks: Vec<Block>) -> Vec<Block> {
    let mut out: Vec<Block> = Vec::with_capacity(blocks.len());
    for block in blocks {
        if block == Block::Blank && out.last().is_none_or(|last| *last == Block::Blank) {
            continue;
        }
        out.push(block);
    }
    while out.last() == Some(&Block::Blank) {
        out.pop();
    }
    out
}

fn render_block(block: &Block, width: usize, theme: &Theme) -> Vec<Line<'static>> {
    match block {
        Block::Blank => vec![Line::default()],
        Block::Heading { level, text } => {
            let spans = inline_spans(text, theme.heading_style(*level), theme);
            wrap_spans(&spans, width, &[], &[])
        }
        Block::Paragraph(text) => {
            let spans = inline_spans(text, theme.text(), theme);
            wrap_spans(&spans, width, &[], &[])
        }
        Block::Quote(text) => {
            let spans = inline_spans(text, theme.quote_style(), theme);
            let bar = vec![Span::styled("│ ", theme.quote_style())];
            let bar = fitting_prefix(bar, width);
            wrap_spans(&spans, width, &bar, &bar)
        }
        Block::ListItem {
            indent,
            marker,
            text,
        } => {
            let spans = inline_spans(text, theme.text(), theme);
            let lead = " ".repeat(*indent);
            let first = vec![
                Span::raw(lead.clone()),
                Span::styled(marker.clone(), theme.bullet_style()),
            ];
            let hang = " ".repeat(indent + UnicodeWidthStr::width(marker.as_str()));
            let rest = vec![Span::raw(hang)];
            wrap_spans(
                &spans,
                width,
                &fitting_prefix(first, width),
                &fitting_prefix(rest, width),
            )
        }
        Block::Code(code_lines) => {
            if code_lines.is_empty() {
                return vec![Line::default()];
            }
            code_lines
                .iter()
                .flat_map(|line| hard_wrap(line, width, theme.code_style()))
                .collect()
        }
        Block::Rule => vec![Line::from(Span::styled(
            "─".repeat(width),
            theme.muted_text(),
        ))],
    }
}

/// A prefix is kept only when at least as many columns remain for the text itself.
fn fitting_prefix(prefix: Vec<Span<'static>>, width: usize) -> Vec<Span<'static>> {
    if spans_width(&prefix) * 2 <= width {
        prefix
    } else {
        Vec::new()
    }
}

fn fence_marker(trimmed: &str) -> Option<&'static str> {
    if trimmed.starts_with("```") {
        Some("```")
    } else if trimmed.starts_with("~~~") {
        Some("~~~")
    } else {
        None
    }
}

/// A closing fence is the marker character alone (three or more), optionally followed by
/// whitespace; an info string means the line is content.
fn closes_fence(trimmed: &str, marker: &str) -> bool {
    let Some(fence_char) = marker.chars().next() else {
        return false;
    };
    let line = trimmed.trim_end();
    line.chars().count() >= 3 && line.chars().all(|ch| ch == fence_char)
}

fn parse_heading(line: &str) -> Option<(usize, &str)> {
    if !line.starts_with('#') {
        return None;
    }
    let level = line.chars().take_while(|ch| *ch == '#').count();
    if level > 6 {
        return None;
    }
    let rest = line.get(level..).unwrap_or("");
    if !rest.is_empty() && !rest.starts_with(' ') {
        return None;
    }
    Some((level, rest.trim()))
}

fn is_rule(line: &str) -> bool {
    let mut marks = line.chars().filter(|ch| !ch.is_whitespace());
    let Some(first) = marks.next() else {
        return false;
    };
    if !matches!(first, '-' | '*' | '_') {
        return false;
    }
    let mut count = 1usize;
    for ch in marks {
        if ch != first {
            return false;
        }
        count += 1;
    }
    count >= 3
}

fn parse_list_marker(line: &str) -> Option<(String, &str)> {
    for bullet in ["- ", "* ", "+ "] {
        if let Some(text) = line.strip_prefix(bullet) {
            return Some(("• ".to_string(), text));
        }
    }

    let digits = line.chars().take_while(|ch| ch.is_ascii_digit()).count();
    if digits == 0 || digits > 9 {
        return None;
    }
    let rest = line.get(digits..)?;
    let text = rest
        .strip_prefix(". ")
        .or_else(|| rest.strip_prefix(") "))?;
    let number = line.get(..digits)?;
    Some((format!("{number}. "), text))
}
