use crate::ui::Theme;
use ratatui::style::{Modifier, Style};
use ratatui::text::Span;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum InlineToken {
    Code,
    Bold,
    Emphasis,
    Link,
}

/// Styles `code`, **bold**, *emphasis* and [links](url) on top of `base_style`.
///
/// Unbalanced markers are kept as literal text.
pub fn inline_spans(text: &str, base_style: Style, theme: &Theme) -> Vec<Span<'static>> {
    let mut spans = Vec::new();
    let mut remaining = text;

    loop {
        let Some((pos, token)) = next_token(remaining) else {
            if !remaining.is_empty() {
                spans.push(Span::styled(remaining.to_string(), base_style));
            }
            break;
        };

        if let Some(prefix) = remaining.get(0..pos) {
            if !prefix.is_empty() {
                spans.push(Span::styled(prefix.to_string(), base_style));
            }
        }

        match token {
            InlineToken::Code => {
                let after = remaining.get(pos + 1..).unwrap_or("");
                if let Some(end_rel) = after.find('`') {
                    let code = after.get(0..end_rel).unwrap_or("");
                    spans.push(Span::styled(
                        code.to_string(),
                        base_style.patch(theme.code_style()),
                    ));
                    remaining = after.get(end_rel + 1..).unwrap_or("");
                } else {
                    spans.push(Span::styled("`".to_string(), base_style));
                    remaining = after;
                }
            }
            InlineToken::Bold => {
                let after = remaining.get(pos + 2..).unwrap_or("");
                if let Some(end_rel) = after.find("**") {
                    let content = after.get(0..end_rel).unwrap_or("");
                    spans.extend(inline_spans(
                        content,
                        base_style.add_modifier(Modifier::BOLD),
                        theme,
                    ));
                    remaining = after.get(end_rel + 2..).unwrap_or("");
                } else {
                    spans.push(Span::styled("**".to_string(), base_style));
                    remaining = after;
                }
            }
            InlineToken::Emphasis => {
                let marker = remaining.get(pos..pos + 1).unwrap_or("*");
                let after = remaining.get(pos + 1..).unwrap_or("");
                match find_closing_emphasis(after, marker) {
                    Some(end_rel) => {
                        let content = after.get(0..end_rel).unwrap_or("");
                        spans.extend(inline_spans(
                            content,
                            base_style.add_modifier(Modifier::ITALIC),
                            theme,
                        ));
                        remaining = after.get(end_rel + 1..).unwrap_or("");
                    }
                    None => {
                        spans.push(Span::styled(marker.to_string(), base_style));
                        remaining = after;
                    }
                }
            }
            InlineToken::Link => {
                let after = remaining.get(pos + 1..).unwrap_or("");
                let Some(end_bracket_rel) = after.find(']') else {
                    spans.push(Span::styled("[".to_string(), base_style));
                    remaining = after;
                    continue;
                };
                let link_text = after.get(0..end_bracket_rel).unwrap_or("");
                let rest_after = after.get(end_bracket_rel + 1..).unwrap_or("");
                spans.extend(inline_spans(
                    link_text,
                    base_style.patch(theme.link_style()),
                    theme,
                ));
                if let Some(rest_after_paren) = rest_after.strip_prefix('(') {
                    if let Some(close_paren) = rest_after_paren.find(')') {
                        remaining = rest_after_paren.get(close_paren + 1..).unwrap_or("");
                        continue;
                    }
                }
                remaining = rest_after;
            }
        }
    }

    spans
}

fn next_token(text: &str) -> Option<(usize, InlineToken)> {
    let mut best: Option<(usize, InlineToken)> = None;
    let mut consider = |pos: Option<usize>, token: InlineToken| {
        if let Some(pos) = pos {
            if best.is_none_or(|(current, _)| pos < current) {
                best = Some((pos, token));
            }
        }
    };

    consider(text.find('`'), InlineToken::Code);
    consider(text.find("**"), InlineToken::Bold);
    consider(text.find('['), InlineToken::Link);
    consider(find_emphasis_open(text), InlineToken::Emphasis);
    best
}

/// A single `*` or `_` that opens emphasis: not doubled, followed by a non-space.
fn find_emphasis_open(text: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    bytes.iter().enumerate().find_map(|(index, byte)| {
        if *byte != b'*' && *byte != b'_' {
            return None;
        }
        let prev = index.checked_sub(1).map(|i| bytes[i]);
        let next = bytes.get(index + 1).copied();
        if prev == Some(*byte) || next == Some(*byte) {
            return None;
        }
        // intra-word underscores (snake_case) stay literal
        if *byte == b'_' && prev.is_some_and(|b| b.is_ascii_alphanumeric()) {
            return None;
        }
        match next {
            Some(next) if !next.is_ascii_whitespace() => Some(index),
            _ => None,
        }
    })
}

fn find_closing_emphasis(text: &str, marker: &str) -> Option<usize> {
    let end = text.find(marker)?;
    if end == 0 {
        return None;
    }
    Some(end)
}
