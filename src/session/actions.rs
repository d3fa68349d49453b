use crate::app::{AppCommand, AppEvent, RenderJob};
use crate::infra::{ContentError, ContentRepository};
use crate::render::{RenderError, RenderedContent, render_article};
use crate::session::{SessionContext, SessionSignal};
use crate::ui::Theme;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::Sender;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::{AbortHandle, JoinSet};
use tracing::{debug, warn};

/// Runs the async work a transition asks for; every result comes back as a queued event.
///
/// Dropping the runner (or calling [`ActionRunner::abort_all`]) cancels whatever is still
/// pending, so nothing lands after the session ends. A new render supersedes the previous
/// one, and at most one render per session occupies the blocking pool at a time.
pub struct ActionRunner {
    events: Sender<SessionSignal>,
    context: Arc<SessionContext>,
    tasks: JoinSet<()>,
    render: Option<AbortHandle>,
    render_slot: Arc<Semaphore>,
}

impl ActionRunner {
    pub fn new(events: Sender<SessionSignal>, context: Arc<SessionContext>) -> Self {
        Self {
            events,
            context,
            tasks: JoinSet::new(),
            render: None,
            render_slot: Arc::new(Semaphore::new(1)),
        }
    }

    pub fn dispatch(&mut self, command: AppCommand) {
        while self.tasks.try_join_next().is_some() {}

        match command {
            AppCommand::None | AppCommand::Quit => {}
            AppCommand::ScheduleTick => {
                let events = self.events.clone();
                let delay = self.context.timing.tick_interval;
                self.tasks.spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = events.send(SessionSignal::Event(AppEvent::Tick)).await;
                });
            }
            AppCommand::Render(job) => {
                if let Some(previous) = self.render.take() {
                    debug!(request_id = job.request_id.get(), "superseding previous render");
                    previous.abort();
                }
                let events = self.events.clone();
                let repository = Arc::clone(&self.context.repository);
                let theme = Arc::clone(&self.context.theme);
                let timeout = self.context.timing.render_timeout;
                let slot = Arc::clone(&self.render_slot);
                self.render = Some(self.tasks.spawn(async move {
                    let Ok(permit) = slot.acquire_owned().await else {
                        return;
                    };
                    let event = execute_render_job(repository, theme, job, timeout, Some(permit)).await;
                    let _ = events.send(SessionSignal::Event(event)).await;
                }));
            }
        }
    }

    #[cfg(test)]
    pub fn pending(&self) -> usize {
        self.tasks.len()
    }

    pub fn abort_all(&mut self) {
        self.render = None;
        self.tasks.abort_all();
    }
}

#[derive(Debug)]
enum JobError {
    Content(ContentError),
    Render(RenderError),
}

/// Fetches (if needed) and renders on the blocking pool, bounded by `timeout`.
///
/// `slot` is held by the blocking work itself, so it stays taken until the render really
/// finishes even when the caller has given up on it.
pub async fn execute_render_job(
    repository: Arc<dyn ContentRepository>,
    theme: Arc<Theme>,
    job: RenderJob,
    timeout: Duration,
    slot: Option<OwnedSemaphorePermit>,
) -> AppEvent {
    let request_id = job.request_id;
    let document_id = job.document_id.clone();
    let work = tokio::task::spawn_blocking(move || {
        let _slot = slot;
        fetch_and_render(repository.as_ref(), &theme, job)
    });

    let error = match tokio::time::timeout(timeout, work).await {
        Ok(Ok(Ok((body, content)))) => {
            debug!(
                request_id = request_id.get(),
                id = %document_id,
                lines = content.len(),
                "article rendered"
            );
            return AppEvent::ContentRendered {
                request_id,
                body,
                content,
            };
        }
        Ok(Ok(Err(JobError::Content(ContentError::NotFound(id))))) => {
            warn!(request_id = request_id.get(), %id, "article not found");
            return AppEvent::ContentNotFound { request_id, id };
        }
        Ok(Ok(Err(JobError::Content(error)))) => RenderError::Internal(error.to_string()),
        Ok(Ok(Err(JobError::Render(error)))) => error,
        Ok(Err(join_error)) => RenderError::Internal(join_error.to_string()),
        Err(_elapsed) => RenderError::Timeout {
            after_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        },
    };

    warn!(request_id = request_id.get(), id = %document_id, %error, "article render failed");
    AppEvent::RenderFailed { request_id, error }
}

fn fetch_and_render(
    repository: &dyn ContentRepository,
    theme: &Theme,
    job: RenderJob,
) -> Result<(Arc<str>, RenderedContent), JobError> {
    let body = match job.body {
        Some(body) => body,
        None => Arc::from(
            repository
                .fetch(&job.document_id)
                .map_err(JobError::Content)?,
        ),
    };
    let content = render_article(&body, job.width, theme).map_err(JobError::Render)?;
    Ok((body, content))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::RequestId;
    use crate::domain::{DocumentId, DocumentSummary};
    use crate::infra::MemoryRepository;
    use crate::session::SessionTiming;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    /// Slow repository that remembers how many fetches ever ran at once.
    #[derive(Default)]
    struct CountingRepository {
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    impl ContentRepository for CountingRepository {
        fn list(&self) -> Result<Vec<DocumentSummary>, ContentError> {
            Ok(Vec::new())
        }

        fn fetch(&self, id: &DocumentId) -> Result<String, ContentError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(60));
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(format!("body of {id}"))
        }
    }

    fn counting_runner() -> (
        Arc<CountingRepository>,
        ActionRunner,
        mpsc::Receiver<SessionSignal>,
    ) {
        let repository = Arc::new(CountingRepository::default());
        let context = Arc::new(SessionContext::new(
            repository.clone(),
            Theme::dark(),
            "",
            SessionTiming::default(),
        ));
        let (tx, rx) = mpsc::channel(16);
        (repository, ActionRunner::new(tx, context), rx)
    }

    async fn rendered_ids(rx: &mut mpsc::Receiver<SessionSignal>) -> Vec<u64> {
        let mut ids = Vec::new();
        while let Ok(Some(signal)) = tokio::time::timeout(Duration::from_millis(300), rx.recv()).await {
            match signal {
                SessionSignal::Event(AppEvent::ContentRendered { request_id, .. }) => {
                    ids.push(request_id.get());
                }
                other => panic!("unexpected signal {other:?}"),
            }
        }
        ids
    }

    fn repository() -> MemoryRepository {
        MemoryRepository::default()
            .with_document("hello.md", "Hello", "# Hello\n\nSome *text*.\n")
            .with_document("broken.md", "Broken", "```\nnever closed\n")
    }

    fn job(request_id: u64, id: &str, width: u16) -> RenderJob {
        RenderJob {
            request_id: RequestId::from_raw(request_id),
            document_id: DocumentId::new(id),
            body: None,
            width,
        }
    }

    async fn run(repository: MemoryRepository, job: RenderJob, timeout: Duration) -> AppEvent {
        execute_render_job(Arc::new(repository), Arc::new(Theme::dark()), job, timeout, None).await
    }

    #[tokio::test]
    async fn renders_fetched_documents() {
        let event = run(repository(), job(1, "hello.md", 40), Duration::from_secs(5)).await;
        let AppEvent::ContentRendered {
            request_id,
            body,
            content,
        } = event
        else {
            panic!("expected ContentRendered, got {event:?}");
        };
        assert_eq!(request_id.get(), 1);
        assert!(body.starts_with("# Hello"));
        assert_eq!(content.plain_text(), "Hello\n\nSome text.");
    }

    #[tokio::test]
    async fn known_bodies_skip_the_fetch() {
        let mut job = job(2, "gone.md", 40);
        job.body = Some(Arc::from("cached text"));
        let event = run(MemoryRepository::default(), job, Duration::from_secs(5)).await;
        assert!(matches!(event, AppEvent::ContentRendered { ref content, .. } if content.plain_text() == "cached text"));
    }

    #[tokio::test]
    async fn missing_documents_report_not_found() {
        let event = run(repository(), job(3, "missing.md", 40), Duration::from_secs(5)).await;
        assert!(matches!(
            event,
            AppEvent::ContentNotFound { ref id, .. } if id.as_str() == "missing.md"
        ));
    }

    #[tokio::test]
    async fn malformed_documents_fail_to_render() {
        let event = run(repository(), job(4, "broken.md", 40), Duration::from_secs(5)).await;
        assert!(matches!(
            event,
            AppEvent::RenderFailed {
                error: RenderError::UnterminatedCodeBlock { line: 1 },
                ..
            }
        ));
    }

    #[tokio::test]
    async fn slow_fetches_time_out() {
        let mut slow = repository();
        slow.fetch_delay = Some(Duration::from_millis(500));
        let event = run(slow, job(5, "hello.md", 40), Duration::from_millis(20)).await;
        assert!(matches!(
            event,
            AppEvent::RenderFailed {
                error: RenderError::Timeout { after_ms: 20 },
                ..
            }
        ));
    }

    #[tokio::test]
    async fn dispatched_ticks_and_renders_come_back_as_events() {
        let context = Arc::new(SessionContext::new(
            Arc::new(repository()),
            Theme::dark(),
            "",
            SessionTiming {
                tick_interval: Duration::from_millis(5),
                ..SessionTiming::default()
            },
        ));
        let (tx, mut rx) = mpsc::channel(16);
        let mut runner = ActionRunner::new(tx, context);

        runner.dispatch(AppCommand::ScheduleTick);
        runner.dispatch(AppCommand::Render(job(6, "hello.md", 30)));
        assert_eq!(runner.pending(), 2);

        let mut saw_tick = false;
        let mut saw_render = false;
        for _ in 0..2 {
            match rx.recv().await {
                Some(SessionSignal::Event(AppEvent::Tick)) => saw_tick = true,
                Some(SessionSignal::Event(AppEvent::ContentRendered { .. })) => saw_render = true,
                other => panic!("unexpected signal {other:?}"),
            }
        }
        assert!(saw_tick && saw_render);
    }

    #[tokio::test]
    async fn aborted_actions_never_report() {
        let context = Arc::new(SessionContext::new(
            Arc::new(repository()),
            Theme::dark(),
            "",
            SessionTiming {
                tick_interval: Duration::from_millis(50),
                ..SessionTiming::default()
            },
        ));
        let (tx, mut rx) = mpsc::channel(16);
        let mut runner = ActionRunner::new(tx, context);
        runner.dispatch(AppCommand::ScheduleTick);
        runner.abort_all();
        drop(runner);

        let received = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await;
        assert!(matches!(received, Ok(None)));
    }

    #[tokio::test]
    async fn a_new_render_supersedes_the_previous_one() {
        let (repository, mut runner, mut rx) = counting_runner();
        runner.dispatch(AppCommand::Render(job(1, "a.md", 40)));
        runner.dispatch(AppCommand::Render(job(2, "b.md", 40)));

        assert_eq!(rendered_ids(&mut rx).await, vec![2]);
        assert_eq!(repository.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn renders_never_overlap_within_a_session() {
        let (repository, mut runner, mut rx) = counting_runner();
        runner.dispatch(AppCommand::Render(job(1, "a.md", 40)));
        tokio::time::sleep(Duration::from_millis(20)).await;
        runner.dispatch(AppCommand::Render(job(2, "a.md", 50)));
        tokio::time::sleep(Duration::from_millis(20)).await;
        runner.dispatch(AppCommand::Render(job(3, "a.md", 60)));

        assert_eq!(rendered_ids(&mut rx).await, vec![3]);
        assert_eq!(repository.peak.load(Ordering::SeqCst), 1);
    }
}
