use crate::domain::{Article, DocumentId, DocumentSummary};
use crate::render::{RenderError, RenderedContent};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use std::fmt;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::debug;

/// Rows taken by one entry of the home list (title, description, spacer).
pub const HOME_ITEM_HEIGHT: u16 = 3;

/// Correlates a render job with its result so superseded results can be dropped.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct RequestId(u64);

impl RequestId {
    pub fn get(self) -> u64 {
        self.0
    }

    #[cfg(test)]
    pub fn from_raw(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug)]
pub struct AppModel {
    pub documents: Arc<[DocumentSummary]>,
    pub view: View,
    pub terminal_size: (u16, u16),
    pub now: OffsetDateTime,
    pub notice: Option<String>,
    pub load_increment: f64,
    last_request_id: u64,
}

impl AppModel {
    pub fn new(documents: Arc<[DocumentSummary]>, terminal_size: (u16, u16), now: OffsetDateTime) -> Self {
        Self {
            documents,
            view: View::Loading(LoadingView::default()),
            terminal_size,
            now,
            notice: None,
            load_increment: 0.34,
            last_request_id: 0,
        }
    }

    pub fn with_load_increment(mut self, increment: f64) -> Self {
        self.load_increment = increment;
        self
    }

    fn next_request_id(&mut self) -> RequestId {
        self.last_request_id += 1;
        RequestId(self.last_request_id)
    }

    fn render_job(&mut self, article: &Article, width: u16) -> RenderJob {
        RenderJob {
            request_id: self.next_request_id(),
            document_id: article.id.clone(),
            body: article.body.clone(),
            width,
        }
    }
}

#[derive(Clone, Debug)]
pub enum View {
    Loading(LoadingView),
    Home(HomeView),
    Article(ArticleView),
}

impl View {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Loading(_) => "loading",
            Self::Home(_) => "home",
            Self::Article(_) => "article",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct LoadingView {
    pub progress: f64,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct HomeView {
    pub selected: usize,
}

#[derive(Clone, Debug)]
pub struct ArticleView {
    pub from_home: HomeView,
    pub article: Article,
    pub content: Option<RenderedContent>,
    pub failure: Option<String>,
    pub scroll: usize,
    pub pending: Option<RequestId>,
    pub render_width: u16,
}

impl ArticleView {
    pub fn max_scroll(&self, viewport_height: usize) -> usize {
        self.content
            .as_ref()
            .map(|content| content.len().saturating_sub(viewport_height))
            .unwrap_or(0)
    }
}

/// Fetch (when `body` is unknown) and render one document at `width` columns.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RenderJob {
    pub request_id: RequestId,
    pub document_id: DocumentId,
    pub body: Option<Arc<str>>,
    pub width: u16,
}

#[derive(Clone, Debug)]
pub enum AppEvent {
    Tick,
    ClockUpdate(OffsetDateTime),
    Resize {
        width: u16,
        height: u16,
    },
    Key(KeyEvent),
    ContentRendered {
        request_id: RequestId,
        body: Arc<str>,
        content: RenderedContent,
    },
    RenderFailed {
        request_id: RequestId,
        error: RenderError,
    },
    ContentNotFound {
        request_id: RequestId,
        id: DocumentId,
    },
    Notice(String),
}

impl AppEvent {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Tick => "tick",
            Self::ClockUpdate(_) => "clock_update",
            Self::Resize { .. } => "resize",
            Self::Key(_) => "key",
            Self::ContentRendered { .. } => "content_rendered",
            Self::RenderFailed { .. } => "render_failed",
            Self::ContentNotFound { .. } => "content_not_found",
            Self::Notice(_) => "notice",
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AppCommand {
    None,
    Quit,
    ScheduleTick,
    Render(RenderJob),
}

/// Article viewport for a terminal: `(render_width, viewport_height)`.
///
/// One row each for the status bar and footer, the border on all sides, and one column of
/// padding left and right.
pub fn article_viewport(width: u16, height: u16) -> (u16, usize) {
    let render_width = width.saturating_sub(4).max(1);
    let viewport_height = usize::from(height.saturating_sub(4).max(1));
    (render_width, viewport_height)
}

pub fn home_page_size(height: u16) -> usize {
    usize::from((height.saturating_sub(6) / HOME_ITEM_HEIGHT).max(1))
}

/// First command of a fresh session: start the loading timer.
pub fn init(model: AppModel) -> (AppModel, AppCommand) {
    (model, AppCommand::ScheduleTick)
}

pub fn update(model: AppModel, event: AppEvent) -> (AppModel, AppCommand) {
    match event {
        AppEvent::Tick => update_on_tick(model),
        AppEvent::ClockUpdate(now) => {
            let mut model = model;
            model.now = now;
            (model, AppCommand::None)
        }
        AppEvent::Resize { width, height } => update_on_resize(model, width, height),
        AppEvent::Key(key) => update_on_key(model, key),
        AppEvent::ContentRendered {
            request_id,
            body,
            content,
        } => update_on_rendered(model, request_id, body, content),
        AppEvent::RenderFailed { request_id, error } => {
            update_on_render_failed(model, request_id, error)
        }
        AppEvent::ContentNotFound { request_id, id } => {
            update_on_not_found(model, request_id, id)
        }
        AppEvent::Notice(text) => {
            let mut model = model;
            model.notice = Some(text);
            (model, AppCommand::None)
        }
    }
}

fn update_on_tick(model: AppModel) -> (AppModel, AppCommand) {
    let mut model = model;
    let View::Loading(loading) = &mut model.view else {
        return ignored(model, "tick");
    };

    loading.progress = (loading.progress + model.load_increment).min(1.0);
    if loading.progress >= 1.0 {
        model.view = View::Home(HomeView::default());
        return (model, AppCommand::None);
    }
    (model, AppCommand::ScheduleTick)
}

fn update_on_resize(model: AppModel, width: u16, height: u16) -> (AppModel, AppCommand) {
    let mut model = model;
    model.terminal_size = (width, height);
    let (render_width, viewport_height) = article_viewport(width, height);

    let View::Article(view) = &mut model.view else {
        return (model, AppCommand::None);
    };
    if view.render_width == render_width {
        view.scroll = view.scroll.min(view.max_scroll(viewport_height));
        return (model, AppCommand::None);
    }

    let article = view.article.clone();
    let job = model.render_job(&article, render_width);
    if let View::Article(view) = &mut model.view {
        view.render_width = render_width;
        view.pending = Some(job.request_id);
    }
    (model, AppCommand::Render(job))
}

fn update_on_key(model: AppModel, key: KeyEvent) -> (AppModel, AppCommand) {
    let mut model = model;
    model.notice = None;

    if key.modifiers.contains(KeyModifiers::CONTROL)
        && matches!(key.code, KeyCode::Char('c') | KeyCode::Char('d'))
    {
        return (model, AppCommand::Quit);
    }
    if key
        .modifiers
        .intersects(KeyModifiers::ALT | KeyModifiers::CONTROL)
    {
        return ignored(model, "key");
    }

    match model.view {
        View::Loading(_) => match key.code {
            KeyCode::Char('q') => (model, AppCommand::Quit),
            _ => ignored(model, "key"),
        },
        View::Home(_) => update_home(model, key),
        View::Article(_) => update_article(model, key),
    }
}

fn update_home(model: AppModel, key: KeyEvent) -> (AppModel, AppCommand) {
    let mut model = model;
    let count = model.documents.len();
    let page = home_page_size(model.terminal_size.1);
    let View::Home(view) = &mut model.view else {
        return (model, AppCommand::None);
    };
    let last = count.saturating_sub(1);

    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => return (model, AppCommand::Quit),
        KeyCode::Up | KeyCode::Char('k') => view.selected = view.selected.saturating_sub(1),
        KeyCode::Down | KeyCode::Char('j') => view.selected = (view.selected + 1).min(last),
        KeyCode::Home | KeyCode::Char('g') => view.selected = 0,
        KeyCode::End | KeyCode::Char('G') => view.selected = last,
        KeyCode::PageUp => view.selected = view.selected.saturating_sub(page),
        KeyCode::PageDown => view.selected = (view.selected + page).min(last),
        KeyCode::Enter => return open_selected(model),
        _ => {}
    }
    (model, AppCommand::None)
}

fn open_selected(model: AppModel) -> (AppModel, AppCommand) {
    let mut model = model;
    let View::Home(home) = &model.view else {
        return (model, AppCommand::None);
    };
    let home = home.clone();
    let Some(summary) = model.documents.get(home.selected) else {
        return (model, AppCommand::None);
    };

    let article = Article::from_summary(summary);
    let (render_width, _) = article_viewport(model.terminal_size.0, model.terminal_size.1);
    let job = model.render_job(&article, render_width);
    model.view = View::Article(ArticleView {
        from_home: home,
        article,
        content: None,
        failure: None,
        scroll: 0,
        pending: Some(job.request_id),
        render_width,
    });
    (model, AppCommand::Render(job))
}

fn update_article(model: AppModel, key: KeyEvent) -> (AppModel, AppCommand) {
    let mut model = model;
    let (_, viewport_height) = article_viewport(model.terminal_size.0, model.terminal_size.1);
    let View::Article(view) = &mut model.view else {
        return (model, AppCommand::None);
    };
    let max_scroll = view.max_scroll(viewport_height);

    match key.code {
        KeyCode::Char('q')
        | KeyCode::Esc
        | KeyCode::Backspace
        | KeyCode::Left
        | KeyCode::Char('h') => {
            let home = view.from_home.clone();
            model.view = View::Home(home);
            return (model, AppCommand::None);
        }
        KeyCode::Up | KeyCode::Char('k') => view.scroll = view.scroll.saturating_sub(1),
        KeyCode::Down | KeyCode::Char('j') => view.scroll = (view.scroll + 1).min(max_scroll),
        KeyCode::PageUp | KeyCode::Char('b') => {
            view.scroll = view.scroll.saturating_sub(viewport_height);
        }
        KeyCode::PageDown | KeyCode::Char(' ') => {
            view.scroll = (view.scroll + viewport_height).min(max_scroll);
        }
        KeyCode::Home | KeyCode::Char('g') => view.scroll = 0,
        KeyCode::End | KeyCode::Char('G') => view.scroll = max_scroll,
        _ => {}
    }
    (model, AppCommand::None)
}

/// The article view waiting for `request_id`, if that request is still current.
fn pending_article(model: &mut AppModel, request_id: RequestId) -> Option<&mut ArticleView> {
    match &mut model.view {
        View::Article(view) if view.pending == Some(request_id) => Some(view),
        _ => None,
    }
}

fn update_on_rendered(
    model: AppModel,
    request_id: RequestId,
    body: Arc<str>,
    content: RenderedContent,
) -> (AppModel, AppCommand) {
    let mut model = model;
    let Some(view) = pending_article(&mut model, request_id) else {
        debug!(request_id = request_id.get(), "dropping stale render result");
        return (model, AppCommand::None);
    };

    view.article.body = Some(body);
    view.content = Some(content);
    view.failure = None;
    view.scroll = 0;
    view.pending = None;
    (model, AppCommand::None)
}

fn update_on_render_failed(
    model: AppModel,
    request_id: RequestId,
    error: RenderError,
) -> (AppModel, AppCommand) {
    let mut model = model;
    let Some(view) = pending_article(&mut model, request_id) else {
        debug!(request_id = request_id.get(), "dropping stale render failure");
        return (model, AppCommand::None);
    };

    view.content = None;
    view.failure = Some(error.to_string());
    view.scroll = 0;
    view.pending = None;
    let title = view.article.title.clone();
    model.notice = Some(format!("Could not render \"{title}\": {error}"));
    (model, AppCommand::None)
}

fn update_on_not_found(
    model: AppModel,
    request_id: RequestId,
    id: DocumentId,
) -> (AppModel, AppCommand) {
    let mut model = model;
    let Some(view) = pending_article(&mut model, request_id) else {
        debug!(request_id = request_id.get(), %id, "dropping stale not-found result");
        return (model, AppCommand::None);
    };

    let home = view.from_home.clone();
    model.view = View::Home(home);
    model.notice = Some(format!("{id} is no longer available"));
    (model, AppCommand::None)
}

fn ignored(model: AppModel, event: &'static str) -> (AppModel, AppCommand) {
    debug!(screen = model.view.label(), event, "ignoring message");
    (model, AppCommand::None)
}
