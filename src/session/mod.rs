mod actions;
mod frame;
mod supervisor;

use crate::app::{self, AppCommand, AppEvent, AppModel};
use crate::domain::DocumentSummary;
use crate::infra::{ContentRepository, NEGOTIATION_PREAMBLE, TelnetDecoder, TransportEvent};
use crate::ui::Theme;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, WriteHalf};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub use actions::{ActionRunner, execute_render_job};
pub use frame::ScreenWriter;
pub use supervisor::{ServerError, ServerLimits, run_server, serve};

const READ_BUFFER_SIZE: usize = 1024;
/// Queued messages per session; a full inbox stops reading from the socket.
const INBOX_CAPACITY: usize = 64;
const SHUTDOWN_NOTICE: &str = "Server is shutting down. Please finish up.";
const UNAVAILABLE_NOTICE: &str = "Articles are unavailable right now.";

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SessionTiming {
    pub tick_interval: Duration,
    pub clock_interval: Duration,
    pub render_timeout: Duration,
    pub load_increment: f64,
    pub default_size: (u16, u16),
}

impl Default for SessionTiming {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            clock_interval: Duration::from_secs(1),
            render_timeout: Duration::from_secs(5),
            load_increment: 0.34,
            default_size: (80, 24),
        }
    }
}

/// Read-only state every session shares.
pub struct SessionContext {
    pub repository: Arc<dyn ContentRepository>,
    pub theme: Arc<Theme>,
    pub bio: Arc<str>,
    pub timing: SessionTiming,
}

impl SessionContext {
    pub fn new(
        repository: Arc<dyn ContentRepository>,
        theme: Theme,
        bio: impl Into<Arc<str>>,
        timing: SessionTiming,
    ) -> Self {
        Self {
            repository,
            theme: Arc::new(theme),
            bio: bio.into(),
            timing,
        }
    }
}

/// Everything the session loop consumes, in arrival order.
#[derive(Debug)]
pub enum SessionSignal {
    Event(AppEvent),
    Disconnected,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SessionEnd {
    Quit,
    Disconnected,
}

impl SessionEnd {
    pub fn label(self) -> &'static str {
        match self {
            Self::Quit => "quit",
            Self::Disconnected => "disconnected",
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Drives one connected terminal until the user quits or the peer goes away.
///
/// Shutdown requests on `shutdown` only post a notice; the supervisor decides when to cut
/// the session off.
pub async fn run_session<S>(
    stream: S,
    context: Arc<SessionContext>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<SessionEnd, SessionError>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (reader, mut writer) = tokio::io::split(stream);
    writer.write_all(&NEGOTIATION_PREAMBLE).await?;

    let (width, height) = context.timing.default_size;
    let mut screen = ScreenWriter::new(width, height)?;
    let enter = screen.enter()?;
    writer.write_all(&enter).await?;

    let (documents, notice) = list_documents(&context).await;
    let mut model = AppModel::new(documents, (width, height), OffsetDateTime::now_utc())
        .with_load_increment(context.timing.load_increment);
    model.notice = notice;

    let (events_tx, mut events_rx) = mpsc::channel::<SessionSignal>(INBOX_CAPACITY);
    let mut background = JoinSet::new();
    background.spawn(read_input(reader, events_tx.clone()));
    background.spawn(run_clock(context.timing.clock_interval, events_tx.clone()));
    let mut actions = ActionRunner::new(events_tx, Arc::clone(&context));

    let (initial, command) = app::init(model);
    model = initial;
    actions.dispatch(command);

    let result = drive(
        &mut writer,
        &mut screen,
        model,
        &mut events_rx,
        &mut actions,
        &mut shutdown,
        &context,
    )
    .await;

    actions.abort_all();
    background.abort_all();
    if let Ok(leave) = screen.leave() {
        let _ = writer.write_all(&leave).await;
    }
    let _ = writer.shutdown().await;

    match result {
        Err(SessionError::Io(error)) if is_disconnect(&error) => {
            debug!(%error, "peer went away while writing");
            Ok(SessionEnd::Disconnected)
        }
        other => other,
    }
}

async fn drive<S>(
    writer: &mut WriteHalf<S>,
    screen: &mut ScreenWriter,
    mut model: AppModel,
    events_rx: &mut mpsc::Receiver<SessionSignal>,
    actions: &mut ActionRunner,
    shutdown: &mut watch::Receiver<bool>,
    context: &SessionContext,
) -> Result<SessionEnd, SessionError>
where
    S: AsyncWrite,
{
    let mut shutdown_seen = *shutdown.borrow();
    if shutdown_seen {
        model.notice = Some(SHUTDOWN_NOTICE.to_string());
    }
    flush_frame(writer, screen, &model, context).await?;
    loop {
        let signal = tokio::select! {
            biased;
            changed = shutdown.changed(), if !shutdown_seen => {
                match changed {
                    Ok(()) if *shutdown.borrow() => {
                        shutdown_seen = true;
                        SessionSignal::Event(AppEvent::Notice(SHUTDOWN_NOTICE.to_string()))
                    }
                    Ok(()) => continue,
                    Err(_) => {
                        shutdown_seen = true;
                        continue;
                    }
                }
            }
            signal = events_rx.recv() => signal.unwrap_or(SessionSignal::Disconnected),
        };

        let event = match signal {
            SessionSignal::Disconnected => return Ok(SessionEnd::Disconnected),
            SessionSignal::Event(event) => event,
        };

        if let AppEvent::Resize { width, height } = &event {
            screen.resize(*width, *height)?;
        }
        let label = event.label();
        let (next, command) = app::update(model, event);
        model = next;
        debug!(event = label, screen = model.view.label(), "applied event");

        if command == AppCommand::Quit {
            return Ok(SessionEnd::Quit);
        }
        actions.dispatch(command);
        flush_frame(writer, screen, &model, context).await?;
    }
}

async fn list_documents(context: &SessionContext) -> (Arc<[DocumentSummary]>, Option<String>) {
    let repository = Arc::clone(&context.repository);
    let listed = tokio::task::spawn_blocking(move || repository.list()).await;
    match listed {
        Ok(Ok(documents)) => {
            info!(documents = documents.len(), "listed content");
            (documents.into(), None)
        }
        Ok(Err(error)) => {
            warn!(%error, "content listing failed");
            (Arc::from(Vec::new()), Some(UNAVAILABLE_NOTICE.to_string()))
        }
        Err(error) => {
            warn!(%error, "content listing task failed");
            (Arc::from(Vec::new()), Some(UNAVAILABLE_NOTICE.to_string()))
        }
    }
}

async fn flush_frame<S>(
    writer: &mut WriteHalf<S>,
    screen: &mut ScreenWriter,
    model: &AppModel,
    context: &SessionContext,
) -> Result<(), SessionError>
where
    S: AsyncWrite,
{
    let bytes = screen.draw(model, &context.theme, &context.bio)?;
    if !bytes.is_empty() {
        writer.write_all(&bytes).await?;
        writer.flush().await?;
    }
    Ok(())
}

async fn read_input<R>(mut reader: R, events: mpsc::Sender<SessionSignal>)
where
    R: AsyncRead + Unpin,
{
    let mut decoder = TelnetDecoder::new();
    let mut buf = [0u8; READ_BUFFER_SIZE];
    loop {
        let read = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(read) => read,
            Err(error) => {
                debug!(%error, "read failed");
                break;
            }
        };
        let decoded = decoder.feed(&buf[..read]);
        // Only the newest window size in a read matters.
        let last_resize = decoded
            .iter()
            .rposition(|event| matches!(event, TransportEvent::Resize { .. }));
        for (index, event) in decoded.into_iter().enumerate() {
            let event = match event {
                TransportEvent::Key(key) => AppEvent::Key(key),
                TransportEvent::Resize { .. } if Some(index) != last_resize => continue,
                TransportEvent::Resize { width, height } => AppEvent::Resize { width, height },
            };
            if events.send(SessionSignal::Event(event)).await.is_err() {
                return;
            }
        }
    }
    let _ = events.send(SessionSignal::Disconnected).await;
}

async fn run_clock(period: Duration, events: mpsc::Sender<SessionSignal>) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // interval fires immediately; the model already holds the current time
    interval.tick().await;
    loop {
        interval.tick().await;
        let now = OffsetDateTime::now_utc();
        if events
            .send(SessionSignal::Event(AppEvent::ClockUpdate(now)))
            .await
            .is_err()
        {
            return;
        }
    }
}

fn is_disconnect(error: &std::io::Error) -> bool {
    use std::io::ErrorKind;
    matches!(
        error.kind(),
        ErrorKind::BrokenPipe
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::UnexpectedEof
    )
}
