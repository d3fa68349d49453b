mod app;
mod cli;
mod domain;
mod infra;
mod render;
mod session;
mod ui;

use crate::cli::{CliInvocation, ServeOverrides};
use crate::infra::{DirectoryRepository, Settings, load_settings};
use crate::session::{SessionContext, SessionTiming, run_server};
use crate::ui::Theme;
use std::io::{self, Write};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_BIO: &str = "Notes, essays and the occasional rant.\n\nPick an article on the left and press Enter to read it.";

#[derive(Debug, Error)]
enum MainError {
    #[error(transparent)]
    Settings(#[from] crate::infra::SettingsError),

    #[error(transparent)]
    Server(#[from] crate::session::ServerError),

    #[error(transparent)]
    Cli(#[from] crate::cli::CliRunError),

    #[error("failed to start runtime: {0}")]
    Runtime(#[source] io::Error),
}

fn main() {
    if let Err(error) = run_main() {
        let mut err = io::stderr().lock();
        let _ = writeln!(err, "{error}");
        std::process::exit(1);
    }
}

fn run_main() -> Result<(), MainError> {
    let args = std::env::args().collect::<Vec<_>>();
    let invocation = match crate::cli::parse_invocation(&args) {
        Ok(invocation) => invocation,
        Err(error) => {
            let mut err = io::stderr().lock();
            let _ = writeln!(err, "{error}");
            let _ = writeln!(err);
            print_help();
            std::process::exit(2);
        }
    };

    match invocation {
        CliInvocation::PrintHelp => {
            print_help();
            Ok(())
        }
        CliInvocation::PrintVersion => {
            let mut out = io::stdout().lock();
            let _ = writeln!(out, "{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        CliInvocation::List(overrides) => {
            let settings = resolve_settings(&overrides)?;
            let repository = DirectoryRepository::new(&settings.content_dir);
            let mut out = io::stdout().lock();
            crate::cli::run_list(&repository, &mut out)?;
            Ok(())
        }
        CliInvocation::Serve(overrides) => {
            let settings = resolve_settings(&overrides)?;
            init_tracing(&settings.log_level);
            serve(settings)
        }
    }
}

fn resolve_settings(overrides: &ServeOverrides) -> Result<Settings, MainError> {
    let mut settings = load_settings(overrides.config_path.as_deref())?;
    overrides.apply(&mut settings);
    settings.validate()?;
    Ok(settings)
}

fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn serve(settings: Settings) -> Result<(), MainError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(MainError::Runtime)?;

    let context = Arc::new(SessionContext::new(
        Arc::new(DirectoryRepository::new(&settings.content_dir)),
        Theme::for_profile(settings.theme),
        load_bio(&settings),
        SessionTiming {
            tick_interval: settings.tick_interval(),
            clock_interval: settings.clock_interval(),
            render_timeout: settings.render_timeout(),
            load_increment: settings.load_increment,
            default_size: (settings.default_width, settings.default_height),
        },
    ));

    runtime.block_on(async move {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(async move {
            shutdown_signal().await;
            info!("shutdown requested");
            let _ = shutdown_tx.send(true);
        });
        info!(
            content_dir = %settings.content_dir.display(),
            theme = settings.theme.label(),
            "starting server"
        );
        run_server(&settings, context, shutdown_rx).await
    })?;
    Ok(())
}

fn load_bio(settings: &Settings) -> String {
    let Some(path) = &settings.bio_path else {
        return DEFAULT_BIO.to_string();
    };
    match std::fs::read_to_string(path) {
        Ok(text) => text.trim_end().to_string(),
        Err(error) => {
            warn!(path = %path.display(), %error, "bio unreadable, using the default");
            DEFAULT_BIO.to_string()
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            warn!(%error, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(error) => {
                warn!(%error, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

fn print_help() {
    let text = format!(
        "{name} - serve a blog as an interactive terminal over telnet\n\nUSAGE:\n  {name} [serve] [FLAGS]          Start the server (default)\n  {name} list [--config PATH] [--content-dir DIR]\n                                 Print documents as id<TAB>title\n  {name} --help | --version\n\nFLAGS:\n  -c, --config PATH      Config file (default: ./termpress.toml, then the user config dir)\n  -b, --bind ADDR        Listen address (default: 127.0.0.1:23234)\n  -d, --content-dir DIR  Markdown directory (default: articles)\n      --theme NAME       dark|light (default: dark)\n      --max-sessions N   Concurrent sessions before new ones are turned away (default: 64)\n\nENV:\n  TERMPRESS_BIND, TERMPRESS_CONTENT_DIR, TERMPRESS_BIO, TERMPRESS_THEME,\n  TERMPRESS_MAX_SESSIONS, TERMPRESS_LOG   Override the config file\n  RUST_LOG                                Log filter (wins over log_level)\n\nCONNECT:\n  telnet 127.0.0.1 23234\n",
        name = env!("CARGO_PKG_NAME")
    );
    let mut out = io::stdout().lock();
    let _ = write!(out, "{text}");
}
