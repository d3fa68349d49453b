mod theme;

use crate::app::{AppModel, ArticleView, HOME_ITEM_HEIGHT, HomeView, LoadingView, View};
use crate::domain::DocumentSummary;
use humansize::{DECIMAL, format_size};
use ratatui::prelude::*;
use ratatui::widgets::*;
use std::cmp::Ordering;
use std::time::{Duration, SystemTime};
use time::format_description::well_known::Rfc2822;
use unicode_width::UnicodeWidthStr;

pub use theme::Theme;

pub const MIN_WIDTH: u16 = 20;
pub const MIN_HEIGHT: u16 = 6;

const FILL_GLYPHS: &str = "猫咪";
const HOME_KEYS: &str = "Keys: ↑↓/jk=move  PgUp/PgDn=page  Enter=read  q=quit";
const ARTICLE_KEYS: &str = "Keys: ↑↓/jk=scroll  b/Space=page  g/G=ends  q=back";

pub fn render(frame: &mut Frame, model: &AppModel, theme: &Theme, bio: &str) {
    let area = frame.area();
    if area.width == 0 || area.height == 0 {
        return;
    }
    if area.width < MIN_WIDTH || area.height < MIN_HEIGHT {
        render_too_small(frame, area, theme);
        return;
    }

    match &model.view {
        View::Loading(loading) => render_loading(frame, area, theme, loading),
        View::Home(home) => render_home(frame, area, model, theme, bio, home),
        View::Article(article) => render_article(frame, area, model, theme, article),
    }
}

fn render_too_small(frame: &mut Frame, area: Rect, theme: &Theme) {
    let message = Paragraph::new("Terminal too small")
        .style(theme.muted_text())
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true });
    let y = area.y + area.height.saturating_sub(1) / 2;
    let line = Rect {
        x: area.x,
        y,
        width: area.width,
        height: area.height.saturating_sub(y - area.y).min(2),
    };
    frame.render_widget(message, line);
}

fn render_loading(frame: &mut Frame, area: Rect, theme: &Theme, loading: &LoadingView) {
    let fill = fill_line(area.width as usize);
    let background: Vec<Line> = (0..area.height)
        .map(|_| Line::from(Span::styled(fill.clone(), Style::default().fg(theme.dim))))
        .collect();
    frame.render_widget(Paragraph::new(background), area);

    let gauge_width = (area.width / 4).max(12).min(area.width);
    let gauge_area = Rect {
        x: area.x + (area.width - gauge_width) / 2,
        y: area.y + area.height.saturating_sub(3) / 2,
        width: gauge_width,
        height: 3.min(area.height),
    };
    let ratio = loading.progress.clamp(0.0, 1.0);
    let percent = (ratio * 100.0).round() as u16;
    let gauge = Gauge::default()
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded)
                .border_style(Style::default().fg(theme.border)),
        )
        .gauge_style(Style::default().fg(theme.gauge_start).bg(theme.bg))
        .use_unicode(true)
        .ratio(ratio)
        .label(format!("{percent}%"));
    frame.render_widget(Clear, gauge_area);
    frame.render_widget(gauge, gauge_area);
}

fn fill_line(width: usize) -> String {
    let glyph_width = UnicodeWidthStr::width(FILL_GLYPHS);
    let mut line = FILL_GLYPHS.repeat(width / glyph_width);
    let mut used = UnicodeWidthStr::width(line.as_str());
    for ch in FILL_GLYPHS.chars() {
        let ch_width = UnicodeWidthStr::width(ch.to_string().as_str());
        if used + ch_width > width {
            break;
        }
        line.push(ch);
        used += ch_width;
    }
    line.push_str(&" ".repeat(width.saturating_sub(used)));
    line
}

fn render_home(
    frame: &mut Frame,
    area: Rect,
    model: &AppModel,
    theme: &Theme,
    bio: &str,
    home: &HomeView,
) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(0),
            Constraint::Length(1),
        ])
        .split(area);

    let clock = format_clock(model);
    frame.render_widget(status_bar(&clock, "HOME 🪺", chunks[0].width, theme), chunks[0]);

    let body = inner_area(chunks[1]);
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(body);

    render_document_list(frame, columns[0], model, theme, home);

    let bio_panel = Paragraph::new(bio.to_string())
        .style(theme.text())
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true })
        .block(Block::default().padding(Padding::new(2, 2, 1, 0)));
    frame.render_widget(bio_panel, columns[1]);

    frame.render_widget(
        footer_paragraph(HOME_KEYS, model.notice.as_deref(), theme),
        chunks[2],
    );
}

fn render_document_list(
    frame: &mut Frame,
    area: Rect,
    model: &AppModel,
    theme: &Theme,
    home: &HomeView,
) {
    let block = Block::default()
        .title(Span::styled(
            " Writing ",
            Style::default()
                .fg(theme.status_key_fg)
                .bg(theme.status_key_bg)
                .add_modifier(Modifier::BOLD),
        ))
        .padding(Padding::new(1, 1, 1, 0));

    if model.documents.is_empty() {
        let empty = Paragraph::new("No articles yet.")
            .style(theme.muted_text())
            .block(block);
        frame.render_widget(empty, area);
        return;
    }

    let now = SystemTime::from(model.now);
    let max_width = (area.width as usize).saturating_sub(4);
    let items: Vec<ListItem> = model
        .documents
        .iter()
        .map(|document| document_list_item(document, max_width, now, theme))
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .fg(theme.selection)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("▸ ");

    let mut state = ListState::default();
    state.select(Some(home.selected.min(model.documents.len() - 1)));
    frame.render_stateful_widget(list, area, &mut state);
}

fn document_list_item(
    document: &DocumentSummary,
    max_width: usize,
    now: SystemTime,
    theme: &Theme,
) -> ListItem<'static> {
    let description = format!(
        "{}  ·  {}",
        format_size(document.size_bytes, DECIMAL),
        relative_time_ago(document.modified, now)
    );
    let mut lines = vec![
        Line::from(truncate_end(&document.title, max_width)),
        Line::from(Span::styled(
            truncate_end(&description, max_width),
            theme.muted_text(),
        )),
    ];
    lines.resize(usize::from(HOME_ITEM_HEIGHT), Line::default());
    ListItem::new(Text::from(lines))
}

fn render_article(
    frame: &mut Frame,
    area: Rect,
    model: &AppModel,
    theme: &Theme,
    view: &ArticleView,
) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(0),
            Constraint::Length(1),
        ])
        .split(area);

    let clock = format_clock(model);
    frame.render_widget(
        status_bar(&clock, &view.article.title, chunks[0].width, theme),
        chunks[0],
    );

    let viewport = chunks[1];
    let visible_rows = usize::from(viewport.height.saturating_sub(2)).max(1);
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(theme.border))
        .padding(Padding::horizontal(1));

    let paragraph = match (&view.content, &view.failure) {
        (Some(content), _) if content.is_empty() => {
            Paragraph::new(Span::styled("This article is empty.", theme.muted_text())).block(block)
        }
        (Some(content), _) => {
            let start = view.scroll.min(content.len());
            let end = (start + visible_rows).min(content.len());
            let percent = scroll_percent(view.scroll, view.max_scroll(visible_rows));
            let lines = content.lines()[start..end].to_vec();
            Paragraph::new(lines).block(
                block.title_bottom(Line::from(format!(" {percent}% ")).right_aligned()),
            )
        }
        (None, Some(failure)) => Paragraph::new(vec![
            Line::from(Span::styled(
                "This article could not be rendered.",
                Style::default().fg(theme.error),
            )),
            Line::default(),
            Line::from(Span::styled(failure.clone(), theme.muted_text())),
        ])
        .wrap(Wrap { trim: true })
        .block(block),
        (None, None) => Paragraph::new(Span::styled("Rendering…", theme.muted_text())).block(block),
    };
    frame.render_widget(paragraph, viewport);

    frame.render_widget(
        footer_paragraph(ARTICLE_KEYS, model.notice.as_deref(), theme),
        chunks[2],
    );
}

fn scroll_percent(scroll: usize, max_scroll: usize) -> usize {
    if max_scroll == 0 {
        return 100;
    }
    scroll.min(max_scroll) * 100 / max_scroll
}

fn format_clock(model: &AppModel) -> String {
    model.now.format(&Rfc2822).unwrap_or_default()
}

fn status_bar(key: &str, value: &str, width: u16, theme: &Theme) -> Paragraph<'static> {
    let key = format!(" {key} ");
    let key_width = UnicodeWidthStr::width(key.as_str());
    let value_width = (width as usize).saturating_sub(key_width + 1);
    let value = truncate_end(value, value_width);

    Paragraph::new(Line::from(vec![
        Span::styled(key, theme.status_key_style()),
        Span::styled(format!(" {value}"), theme.status_bar_style()),
    ]))
    .style(theme.status_bar_style())
}

fn footer_paragraph(keys: &str, notice: Option<&str>, theme: &Theme) -> Paragraph<'static> {
    let mut spans = Vec::new();
    if let Some(message) = notice.filter(|message| !message.trim().is_empty()) {
        spans.push(Span::styled(
            message.to_string(),
            Style::default()
                .fg(theme.accent)
                .add_modifier(Modifier::BOLD),
        ));
        spans.push(Span::raw("  ·  "));
    }
    spans.push(Span::raw(keys.to_string()));
    Paragraph::new(Line::from(spans)).style(theme.muted_text())
}

fn inner_area(area: Rect) -> Rect {
    if area.width < 40 || area.height < 12 {
        return area;
    }
    area.inner(Margin {
        vertical: 1,
        horizontal: 2,
    })
}

fn truncate_end(text: &str, max_width: usize) -> String {
    if max_width == 0 {
        return String::new();
    }
    if UnicodeWidthStr::width(text) <= max_width {
        return text.to_string();
    }
    let ellipsis = "…";
    let available = max_width.saturating_sub(UnicodeWidthStr::width(ellipsis));
    let mut out = String::new();
    let mut used = 0usize;
    for ch in text.chars() {
        let ch_width = UnicodeWidthStr::width(ch.to_string().as_str());
        if used + ch_width > available {
            break;
        }
        out.push(ch);
        used += ch_width;
    }
    out.push_str(ellipsis);
    out
}

fn relative_time_ago(time: Option<SystemTime>, now: SystemTime) -> String {
    let Some(moment) = time else {
        return "unknown".to_string();
    };
    let diff = now.duration_since(moment).unwrap_or(Duration::ZERO);
    match diff.cmp(&Duration::from_secs(60)) {
        Ordering::Less => "just now".to_string(),
        Ordering::Equal | Ordering::Greater => humanize_duration(diff),
    }
}

fn humanize_duration(duration: Duration) -> String {
    let minutes = duration.as_secs() / 60;
    if minutes < 60 {
        return format!("{minutes}m ago");
    }
    let hours = minutes / 60;
    if hours < 24 {
        return format!("{hours}h ago");
    }
    let days = hours / 24;
    format!("{days}d ago")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::{AppEvent, update};
    use crate::domain::DocumentId;
    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
    use ratatui::backend::TestBackend;
    use std::sync::Arc;
    use time::OffsetDateTime;

    const BIO: &str = "Writes about terminals.";

    fn model_at(width: u16, height: u16) -> AppModel {
        let mut alpha = DocumentSummary::new(DocumentId::new("alpha.md"), "Alpha");
        alpha.size_bytes = 1_500;
        alpha.modified = Some(SystemTime::UNIX_EPOCH);
        let beta = DocumentSummary::new(DocumentId::new("beta.md"), "Beta");
        AppModel::new(
            vec![alpha, beta].into(),
            (width, height),
            OffsetDateTime::UNIX_EPOCH + time::Duration::hours(3),
        )
    }

    fn draw(model: &AppModel) -> String {
        let (width, height) = model.terminal_size;
        let mut terminal = Terminal::new(TestBackend::new(width, height)).expect("terminal");
        terminal
            .draw(|frame| render(frame, model, &Theme::dark(), BIO))
            .expect("draw");
        let buffer = terminal.backend().buffer();
        let mut out = String::new();
        for y in 0..buffer.area.height {
            for x in 0..buffer.area.width {
                out.push_str(buffer[(x, y)].symbol());
            }
            out.push('\n');
        }
        out
    }

    fn press(model: AppModel, code: KeyCode) -> AppModel {
        update(model, AppEvent::Key(KeyEvent::new(code, KeyModifiers::NONE))).0
    }

    fn article_model(content: Option<&str>) -> AppModel {
        let mut model = model_at(60, 16);
        model.view = View::Home(HomeView::default());
        let model = press(model, KeyCode::Enter);
        let View::Article(view) = &model.view else {
            panic!("expected Article view");
        };
        let Some(body) = content else {
            return model;
        };
        let request_id = view.pending.expect("pending request");
        let rendered = crate::render::render_article(body, view.render_width, &Theme::dark())
            .expect("render");
        update(
            model,
            AppEvent::ContentRendered {
                request_id,
                body: Arc::from(body),
                content: rendered,
            },
        )
        .0
    }

    #[test]
    fn loading_screen_shows_progress_over_fill() {
        let mut model = model_at(80, 24);
        model = update(model, AppEvent::Tick).0;
        let screen = draw(&model);
        assert!(screen.contains("34%"));
        assert!(screen.contains('猫'));
        assert!(screen.contains('╭'));
    }

    #[test]
    fn home_lists_documents_with_bio_and_status() {
        let mut model = model_at(80, 24);
        model.view = View::Home(HomeView::default());
        let screen = draw(&model);
        assert!(screen.contains("Thu, 01 Jan 1970 03:00:00 +0000"));
        assert!(screen.contains("HOME"));
        assert!(screen.contains("Writing"));
        assert!(screen.contains("▸ Alpha"));
        assert!(screen.contains("Beta"));
        assert!(screen.contains("kB  ·  3h ago"));
        assert!(screen.contains("Writes about terminals."));
        assert!(screen.contains("Enter=read"));
    }

    #[test]
    fn home_moves_the_highlight() {
        let mut model = model_at(80, 24);
        model.view = View::Home(HomeView::default());
        let model = press(model, KeyCode::Down);
        let screen = draw(&model);
        assert!(screen.contains("▸ Beta"));
        assert!(!screen.contains("▸ Alpha"));
    }

    #[test]
    fn article_shows_placeholder_until_rendered() {
        let screen = draw(&article_model(None));
        assert!(screen.contains("Rendering…"));
        assert!(screen.contains("Alpha"));
    }

    #[test]
    fn article_shows_content_and_scroll_position() {
        let body = (1..=30)
            .map(|index| format!("paragraph {index}"))
            .collect::<Vec<_>>()
            .join("\n\n");
        let model = article_model(Some(&body));
        let screen = draw(&model);
        assert!(screen.contains("paragraph 1 "));
        assert!(screen.contains(" 0% "));

        let model = press(model, KeyCode::End);
        let screen = draw(&model);
        assert!(screen.contains("paragraph 30"));
        assert!(screen.contains(" 100% "));
    }

    #[test]
    fn article_failure_shows_fallback() {
        let model = article_model(None);
        let View::Article(view) = &model.view else {
            panic!("expected Article view");
        };
        let request_id = view.pending.expect("pending request");
        let (model, _) = update(
            model,
            AppEvent::RenderFailed {
                request_id,
                error: crate::render::RenderError::Timeout { after_ms: 5000 },
            },
        );
        let screen = draw(&model);
        assert!(screen.contains("This article could not be rendered."));
        assert!(screen.contains("Could not render"));
    }

    #[test]
    fn empty_articles_say_so() {
        let screen = draw(&article_model(Some("\n\n")));
        assert!(screen.contains("This article is empty."));
    }

    #[test]
    fn tiny_terminals_get_a_message() {
        let model = model_at(18, 5);
        let screen = draw(&model);
        assert!(screen.contains("Terminal too"));
    }

    #[test]
    fn fill_line_covers_the_width() {
        assert_eq!(UnicodeWidthStr::width(fill_line(7).as_str()), 7);
        assert_eq!(fill_line(5), "猫咪 ");
        assert_eq!(fill_line(6), "猫咪猫");
    }

    #[test]
    fn truncate_end_respects_display_width() {
        assert_eq!(truncate_end("hello world", 6), "hello…");
        assert_eq!(truncate_end("猫咪猫咪", 5), "猫咪…");
        assert_eq!(truncate_end("short", 10), "short");
    }
}
