use ratatui::style::Style;
use ratatui::text::{Line, Span};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

#[derive(Debug, Default)]
struct Word {
    pieces: Vec<(String, Style)>,
    width: usize,
    space_before: bool,
}

impl Word {
    fn push(&mut self, ch: char, style: Style) {
        self.width += ch.width().unwrap_or(0);
        match self.pieces.last_mut() {
            Some((text, last_style)) if *last_style == style => text.push(ch),
            _ => self.pieces.push((ch.to_string(), style)),
        }
    }

    fn is_empty(&self) -> bool {
        self.pieces.is_empty()
    }
}

struct LineBuilder<'a> {
    width: usize,
    rest_prefix: &'a [Span<'static>],
    lines: Vec<Line<'static>>,
    current: Vec<Span<'static>>,
    current_width: usize,
    prefix_width: usize,
}

impl<'a> LineBuilder<'a> {
    fn new(width: usize, first_prefix: &[Span<'static>], rest_prefix: &'a [Span<'static>]) -> Self {
        let prefix_width = spans_width(first_prefix);
        Self {
            width,
            rest_prefix,
            lines: Vec::new(),
            current: first_prefix.to_vec(),
            current_width: prefix_width,
            prefix_width,
        }
    }

    fn has_content(&self) -> bool {
        self.current_width > self.prefix_width
    }

    fn remaining(&self) -> usize {
        self.width.saturating_sub(self.current_width)
    }

    fn push_text(&mut self, text: &str, style: Style) {
        self.current_width += UnicodeWidthStr::width(text);
        if let Some(last) = self.current.last_mut() {
            if last.style == style {
                let mut merged = last.content.to_string();
                merged.push_str(text);
                last.content = merged.into();
                return;
            }
        }
        self.current.push(Span::styled(text.to_string(), style));
    }

    fn break_line(&mut self) {
        let finished = std::mem::replace(&mut self.current, self.rest_prefix.to_vec());
        self.lines.push(Line::from(finished));
        self.prefix_width = spans_width(self.rest_prefix);
        self.current_width = self.prefix_width;
    }

    fn push_word(&mut self, word: &Word, space_style: Style) {
        let space = usize::from(self.has_content() && word.space_before);
        if word.width + space <= self.remaining() {
            if space == 1 {
                self.push_text(" ", space_style);
            }
            for (text, style) in &word.pieces {
                self.push_text(text, *style);
            }
            return;
        }

        if self.has_content() {
            self.break_line();
        }
        if word.width <= self.remaining() {
            for (text, style) in &word.pieces {
                self.push_text(text, *style);
            }
            return;
        }

        // Over-long word: hard break by display width.
        for (text, style) in &word.pieces {
            for ch in text.chars() {
                let ch_width = ch.width().unwrap_or(0);
                if self.has_content() && ch_width > self.remaining() {
                    self.break_line();
                }
                let mut buf = [0u8; 4];
                self.push_text(ch.encode_utf8(&mut buf), *style);
            }
        }
    }

    fn finish(mut self) -> Vec<Line<'static>> {
        if self.has_content() || self.lines.is_empty() {
            let finished = std::mem::take(&mut self.current);
            self.lines.push(Line::from(finished));
        }
        self.lines
    }
}

/// Greedy word wrap of styled spans to `width` display columns.
///
/// Whitespace runs collapse to a single space; words spanning several styles stay glued.
pub fn wrap_spans(
    spans: &[Span<'static>],
    width: usize,
    first_prefix: &[Span<'static>],
    rest_prefix: &[Span<'static>],
) -> Vec<Line<'static>> {
    let width = width.max(1);
    let mut builder = LineBuilder::new(width, first_prefix, rest_prefix);
    let mut word = Word::default();
    let mut pending_space = false;
    let mut space_style = Style::default();

    for span in spans {
        for ch in span.content.chars() {
            if ch.is_whitespace() {
                if !word.is_empty() {
                    builder.push_word(&word, space_style);
                    word = Word::default();
                }
                pending_space = true;
                space_style = span.style;
                continue;
            }
            if word.is_empty() {
                word.space_before = pending_space;
                pending_space = false;
            }
            word.push(ch, span.style);
        }
    }
    if !word.is_empty() {
        builder.push_word(&word, space_style);
    }

    builder.finish()
}

/// Breaks a preformatted line at exactly `width` columns without touching spaces.
pub fn hard_wrap(text: &str, width: usize, style: Style) -> Vec<Line<'static>> {
    let width = width.max(1);
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_width = 0usize;

    for ch in text.chars() {
        let ch_width = ch.width().unwrap_or(0);
        if current_width + ch_width > width && !current.is_empty() {
            lines.push(Line::from(Span::styled(std::mem::take(&mut current), style)));
            current_width = 0;
        }
        current.push(ch);
        current_width += ch_width;
    }
    if !current.is_empty() || lines.is_empty() {
        lines.push(Line::from(Span::styled(current, style)));
    }
    lines
}

pub fn spans_width(spans: &[Span<'_>]) -> usize {
    spans
        .iter()
        .map(|span| UnicodeWidthStr::width(span.content.as_ref()))
        .sum()
}
