//! Full-screen frames for one remote terminal, drawn into memory and flushed by the session.

use crate::app::AppModel;
use crate::infra::{MAX_TERMINAL_HEIGHT, MAX_TERMINAL_WIDTH};
use crate::ui::{self, Theme};
use crossterm::cursor::{Hide, Show};
use crossterm::execute;
use crossterm::terminal::{Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::Rect;
use ratatui::{Terminal, TerminalOptions, Viewport};
use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};

/// Byte sink shared between the ratatui backend and the session writer.
#[derive(Clone, Debug, Default)]
struct FrameBuffer(Arc<Mutex<Vec<u8>>>);

impl FrameBuffer {
    fn take(&self) -> Vec<u8> {
        let mut bytes = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut *bytes)
    }
}

impl Write for FrameBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut bytes = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        bytes.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub struct ScreenWriter {
    terminal: Terminal<CrosstermBackend<FrameBuffer>>,
    buffer: FrameBuffer,
}

impl ScreenWriter {
    /// The remote size is whatever the client last reported; nothing is queried.
    pub fn new(width: u16, height: u16) -> io::Result<Self> {
        let (width, height) = clamp_size(width, height);
        let buffer = FrameBuffer::default();
        let backend = CrosstermBackend::new(buffer.clone());
        let terminal = Terminal::with_options(
            backend,
            TerminalOptions {
                viewport: Viewport::Fixed(Rect::new(0, 0, width, height)),
            },
        )?;
        Ok(Self { terminal, buffer })
    }

    pub fn enter(&mut self) -> io::Result<Vec<u8>> {
        execute!(
            self.terminal.backend_mut(),
            EnterAlternateScreen,
            Hide,
            Clear(ClearType::All)
        )?;
        Ok(self.buffer.take())
    }

    pub fn leave(&mut self) -> io::Result<Vec<u8>> {
        execute!(self.terminal.backend_mut(), Show, LeaveAlternateScreen)?;
        Ok(self.buffer.take())
    }

    pub fn resize(&mut self, width: u16, height: u16) -> io::Result<()> {
        let (width, height) = clamp_size(width, height);
        self.terminal.resize(Rect::new(0, 0, width, height))?;
        // The client's screen is in an unknown state after a size change.
        execute!(self.terminal.backend_mut(), Clear(ClearType::All))?;
        Ok(())
    }

    /// Draws `model` and returns the bytes that bring the remote screen up to date.
    pub fn draw(&mut self, model: &AppModel, theme: &Theme, bio: &str) -> io::Result<Vec<u8>> {
        self.terminal
            .draw(|frame| ui::render(frame, model, theme, bio))?;
        Ok(self.buffer.take())
    }
}

fn clamp_size(width: u16, height: u16) -> (u16, u16) {
    (width.min(MAX_TERMINAL_WIDTH), height.min(MAX_TERMINAL_HEIGHT))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DocumentId, DocumentSummary};
    use time::OffsetDateTime;

    fn model(width: u16, height: u16) -> AppModel {
        let documents: Arc<[DocumentSummary]> =
            vec![DocumentSummary::new(DocumentId::new("a.md"), "Alpha")].into();
        AppModel::new(documents, (width, height), OffsetDateTime::UNIX_EPOCH)
    }

    #[test]
    fn enter_and_leave_switch_the_alternate_screen() {
        let mut screen = ScreenWriter::new(40, 10).expect("screen");
        let enter = String::from_utf8(screen.enter().expect("enter")).expect("utf8");
        assert!(enter.contains("\x1b[?1049h"));
        assert!(enter.contains("\x1b[?25l"));
        let leave = String::from_utf8(screen.leave().expect("leave")).expect("utf8");
        assert!(leave.contains("\x1b[?1049l"));
        assert!(leave.contains("\x1b[?25h"));
    }

    #[test]
    fn first_draw_emits_the_whole_frame_and_repeats_emit_little() {
        let mut screen = ScreenWriter::new(40, 10).expect("screen");
        let model = model(40, 10);
        let theme = Theme::dark();
        let first = screen.draw(&model, &theme, "bio").expect("draw");
        assert!(String::from_utf8_lossy(&first).contains('%'));
        let second = screen.draw(&model, &theme, "bio").expect("draw");
        assert!(second.len() < first.len());
    }

    #[test]
    fn resize_redraws_at_the_new_size() {
        let mut screen = ScreenWriter::new(40, 10).expect("screen");
        let theme = Theme::dark();
        screen.draw(&model(40, 10), &theme, "").expect("draw");
        screen.resize(60, 20).expect("resize");
        let bytes = screen.draw(&model(60, 20), &theme, "").expect("draw");
        assert!(String::from_utf8_lossy(&bytes).contains("\x1b[2J"));
    }

    #[test]
    fn huge_sizes_are_clamped() {
        let mut screen = ScreenWriter::new(u16::MAX, u16::MAX).expect("screen");
        screen.resize(u16::MAX, u16::MAX).expect("resize");
        let model = model(MAX_TERMINAL_WIDTH, MAX_TERMINAL_HEIGHT);
        let bytes = screen.draw(&model, &Theme::dark(), "").expect("draw");
        let cells = usize::from(MAX_TERMINAL_WIDTH) * usize::from(MAX_TERMINAL_HEIGHT);
        assert!(bytes.len() < cells * 64);
    }
}
