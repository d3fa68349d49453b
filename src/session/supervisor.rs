use crate::infra::{Settings, SettingsError};
use crate::session::{SessionContext, SessionEnd, SessionError, SessionId, run_session};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::{AbortHandle, JoinSet};
use tracing::{Instrument, debug, error, info, info_span, warn};

const BUSY_MESSAGE: &[u8] = b"Server busy, please try again later.\r\n";
const BUSY_WRITE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error("listener I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ServerLimits {
    pub max_sessions: usize,
    pub shutdown_grace: Duration,
}

impl Default for ServerLimits {
    fn default() -> Self {
        Self {
            max_sessions: 64,
            shutdown_grace: Duration::from_secs(30),
        }
    }
}

impl ServerLimits {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            max_sessions: settings.max_sessions,
            shutdown_grace: settings.shutdown_grace(),
        }
    }
}

struct SessionEntry {
    peer: SocketAddr,
    started: Instant,
    abort: AbortHandle,
}

type SessionOutcome = (SessionId, Result<SessionEnd, SessionError>);

/// Live sessions, keyed by id. Only the accept loop touches it.
#[derive(Default)]
struct Registry {
    entries: HashMap<SessionId, SessionEntry>,
    tasks: JoinSet<SessionOutcome>,
}

impl Registry {
    fn len(&self) -> usize {
        self.entries.len()
    }

    fn start(
        &mut self,
        stream: TcpStream,
        peer: SocketAddr,
        context: Arc<SessionContext>,
        shutdown: watch::Receiver<bool>,
    ) {
        let id = SessionId::new();
        let span = info_span!("session", id = %id, %peer);
        let abort = self.tasks.spawn(
            async move {
                info!("session opened");
                (id, run_session(stream, context, shutdown).await)
            }
            .instrument(span),
        );
        self.entries.insert(
            id,
            SessionEntry {
                peer,
                started: Instant::now(),
                abort,
            },
        );
    }

    fn finish(&mut self, joined: Result<SessionOutcome, tokio::task::JoinError>) {
        match joined {
            Ok((id, outcome)) => {
                let Some(entry) = self.entries.remove(&id) else {
                    return;
                };
                let elapsed_ms = u64::try_from(entry.started.elapsed().as_millis()).unwrap_or(u64::MAX);
                match outcome {
                    Ok(end) => info!(
                        session_id = %id,
                        peer = %entry.peer,
                        reason = end.label(),
                        elapsed_ms,
                        "session closed"
                    ),
                    Err(error) => warn!(
                        session_id = %id,
                        peer = %entry.peer,
                        %error,
                        elapsed_ms,
                        "session ended with an error"
                    ),
                }
            }
            Err(join_error) => {
                if join_error.is_panic() {
                    error!(error = %join_error, "session task panicked");
                } else {
                    debug!(error = %join_error, "session task cancelled");
                }
                self.entries.retain(|_, entry| !entry.abort.is_finished());
            }
        }
    }

    async fn drain(&mut self, grace: Duration) {
        if self.tasks.is_empty() {
            return;
        }
        info!(sessions = self.len(), grace_secs = grace.as_secs(), "waiting for sessions to finish");
        let deadline = tokio::time::Instant::now() + grace;
        while !self.tasks.is_empty() {
            match tokio::time::timeout_at(deadline, self.tasks.join_next()).await {
                Ok(Some(joined)) => self.finish(joined),
                Ok(None) => break,
                Err(_) => {
                    warn!(sessions = self.len(), "grace period over, closing remaining sessions");
                    self.tasks.abort_all();
                    while let Some(joined) = self.tasks.join_next().await {
                        self.finish(joined);
                    }
                    self.entries.clear();
                    break;
                }
            }
        }
    }
}

/// Binds `settings.bind` and serves until `shutdown` flips to true.
pub async fn run_server(
    settings: &Settings,
    context: Arc<SessionContext>,
    shutdown: watch::Receiver<bool>,
) -> Result<(), ServerError> {
    let addr = settings.bind_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;
    serve(listener, context, ServerLimits::from_settings(settings), shutdown).await
}

/// Accepts connections and runs one independent session task per connection.
///
/// Once `shutdown` is raised the listener closes, sessions get `limits.shutdown_grace` to
/// finish on their own and are then aborted.
pub async fn serve(
    listener: TcpListener,
    context: Arc<SessionContext>,
    limits: ServerLimits,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), ServerError> {
    let local = listener.local_addr()?;
    info!(addr = %local, max_sessions = limits.max_sessions, "listening");

    let mut registry = Registry::default();
    loop {
        if *shutdown.borrow() {
            break;
        }
        tokio::select! {
            biased;
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            Some(joined) = registry.tasks.join_next(), if !registry.tasks.is_empty() => {
                registry.finish(joined);
            }
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(accepted) => accepted,
                    Err(error) => {
                        warn!(%error, "accept failed");
                        continue;
                    }
                };
                if registry.len() >= limits.max_sessions {
                    warn!(%peer, sessions = registry.len(), "at capacity, rejecting connection");
                    tokio::spawn(reject_busy(stream));
                    continue;
                }
                registry.start(stream, peer, Arc::clone(&context), shutdown.clone());
            }
        }
    }

    drop(listener);
    info!(sessions = registry.len(), "shutting down");
    registry.drain(limits.shutdown_grace).await;
    info!("server stopped");
    Ok(())
}

async fn reject_busy(mut stream: TcpStream) {
    let write = async {
        stream.write_all(BUSY_MESSAGE).await?;
        stream.shutdown().await
    };
    match tokio::time::timeout(BUSY_WRITE_TIMEOUT, write).await {
        Ok(Ok(())) => {}
        Ok(Err(error)) => debug!(%error, "busy notice not delivered"),
        Err(_) => debug!("busy notice timed out"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::{MemoryRepository, NEGOTIATION_PREAMBLE};
    use crate::session::SessionTiming;
    use crate::ui::Theme;
    use tokio::io::AsyncReadExt;

    fn context() -> Arc<SessionContext> {
        let repository =
            MemoryRepository::default().with_document("hello.md", "Hello", "# Hello\n\nWorld.\n");
        Arc::new(SessionContext::new(
            Arc::new(repository),
            Theme::dark(),
            "bio",
            SessionTiming {
                tick_interval: Duration::from_millis(5),
                clock_interval: Duration::from_secs(60),
                ..SessionTiming::default()
            },
        ))
    }

    async fn start(
        limits: ServerLimits,
    ) -> (
        SocketAddr,
        watch::Sender<bool>,
        tokio::task::JoinHandle<Result<(), ServerError>>,
    ) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let server = tokio::spawn(serve(listener, context(), limits, shutdown_rx));
        (addr, shutdown_tx, server)
    }

    async fn read_until(stream: &mut TcpStream, needle: &str) -> String {
        let mut seen = Vec::new();
        let mut buf = [0u8; 4096];
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let read = tokio::time::timeout_at(deadline, stream.read(&mut buf))
                .await
                .expect("timed out waiting for output")
                .expect("read");
            assert!(read > 0, "connection closed before {needle:?} appeared");
            seen.extend_from_slice(&buf[..read]);
            let text = String::from_utf8_lossy(&seen).to_string();
            if text.contains(needle) {
                return text;
            }
        }
    }

    async fn read_to_close(stream: &mut TcpStream) -> Vec<u8> {
        let mut rest = Vec::new();
        tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut rest))
            .await
            .expect("timed out waiting for close")
            .expect("read");
        rest
    }

    #[tokio::test]
    async fn serves_a_session_over_tcp_until_quit() {
        let (addr, shutdown_tx, server) = start(ServerLimits::default()).await;
        let mut client = TcpStream::connect(addr).await.expect("connect");

        let output = read_until(&mut client, "Hello").await;
        assert!(output.as_bytes().starts_with(&NEGOTIATION_PREAMBLE));

        client.write_all(b"q").await.expect("write");
        let rest = read_to_close(&mut client).await;
        assert!(String::from_utf8_lossy(&rest).contains("\x1b[?1049l"));

        shutdown_tx.send(true).expect("shutdown");
        server.await.expect("join").expect("serve");
    }

    #[tokio::test]
    async fn sessions_run_independently() {
        let (addr, shutdown_tx, server) = start(ServerLimits::default()).await;
        let mut first = TcpStream::connect(addr).await.expect("connect");
        let mut second = TcpStream::connect(addr).await.expect("connect");
        let mut third = TcpStream::connect(addr).await.expect("connect");
        read_until(&mut first, "Hello").await;
        read_until(&mut second, "Hello").await;
        read_until(&mut third, "Hello").await;

        first.write_all(b"q").await.expect("write");
        read_to_close(&mut first).await;
        drop(third);

        second.write_all(b"\r").await.expect("write");
        read_until(&mut second, "World.").await;
        second.write_all(b"qq").await.expect("write");
        read_to_close(&mut second).await;

        shutdown_tx.send(true).expect("shutdown");
        server.await.expect("join").expect("serve");
    }

    #[tokio::test]
    async fn rejects_connections_past_capacity() {
        let limits = ServerLimits {
            max_sessions: 1,
            ..ServerLimits::default()
        };
        let (addr, shutdown_tx, server) = start(limits).await;

        let mut first = TcpStream::connect(addr).await.expect("connect");
        read_until(&mut first, "Hello").await;

        let mut second = TcpStream::connect(addr).await.expect("connect");
        let rejected = read_to_close(&mut second).await;
        assert_eq!(rejected, BUSY_MESSAGE);

        first.write_all(b"q").await.expect("write");
        read_to_close(&mut first).await;
        shutdown_tx.send(true).expect("shutdown");
        server.await.expect("join").expect("serve");
    }

    #[tokio::test]
    async fn shutdown_notifies_then_aborts_after_grace() {
        let limits = ServerLimits {
            max_sessions: 4,
            shutdown_grace: Duration::from_millis(200),
        };
        let (addr, shutdown_tx, server) = start(limits).await;
        let mut client = TcpStream::connect(addr).await.expect("connect");
        read_until(&mut client, "Hello").await;

        shutdown_tx.send(true).expect("shutdown");
        read_until(&mut client, "shutting down").await;

        tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .expect("server should stop after the grace period")
            .expect("join")
            .expect("serve");
        read_to_close(&mut client).await;
    }

    #[tokio::test]
    async fn reports_bind_failures() {
        let taken = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let settings = Settings {
            bind: taken.local_addr().expect("addr").to_string(),
            ..Settings::default()
        };
        let (_tx, rx) = watch::channel(false);
        let result = run_server(&settings, context(), rx).await;
        assert!(matches!(result, Err(ServerError::Bind { .. })));
    }
}
