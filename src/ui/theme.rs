use crate::domain::StyleProfile;
use ratatui::style::{Color, Modifier, Style};

/// Immutable palette built once at startup and shared by reference.
///
/// Keep this palette cohesive. Prefer adding new roles here instead of sprinkling colors
/// through the UI or the article renderer.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Theme {
    pub profile: StyleProfile,
    pub bg: Color,
    pub fg: Color,
    pub muted: Color,
    pub dim: Color,
    pub border: Color,
    pub accent: Color,
    pub selection: Color,
    pub error: Color,
    pub status_key_fg: Color,
    pub status_key_bg: Color,
    pub status_bar_fg: Color,
    pub status_bar_bg: Color,
    pub gauge_start: Color,
    pub code: Color,
    pub link: Color,
    pub quote: Color,
    pub heading: Color,
    pub heading_minor: Color,
}

impl Theme {
    pub fn for_profile(profile: StyleProfile) -> Self {
        match profile {
            StyleProfile::Dark => Self::dark(),
            StyleProfile::Light => Self::light(),
        }
    }

    pub fn dark() -> Self {
        Self {
            profile: StyleProfile::Dark,
            bg: Color::Rgb(11, 13, 16),
            fg: Color::Rgb(229, 231, 235),
            muted: Color::Rgb(156, 163, 175),
            dim: Color::Rgb(56, 56, 56),
            border: Color::Rgb(135, 75, 253),
            accent: Color::Rgb(255, 124, 203),
            selection: Color::Indexed(170),
            error: Color::Rgb(248, 113, 113),
            status_key_fg: Color::Rgb(255, 253, 245),
            status_key_bg: Color::Rgb(141, 104, 136),
            status_bar_fg: Color::Rgb(52, 52, 51),
            status_bar_bg: Color::Rgb(175, 156, 162),
            gauge_start: Color::Rgb(253, 255, 140),
            code: Color::LightBlue,
            link: Color::LightBlue,
            quote: Color::DarkGray,
            heading: Color::Yellow,
            heading_minor: Color::LightYellow,
        }
    }

    pub fn light() -> Self {
        Self {
            profile: StyleProfile::Light,
            bg: Color::Rgb(250, 250, 250),
            fg: Color::Rgb(30, 30, 30),
            muted: Color::Rgb(90, 90, 90),
            dim: Color::Rgb(217, 220, 207),
            border: Color::Rgb(125, 86, 244),
            accent: Color::Rgb(200, 60, 140),
            selection: Color::Indexed(127),
            error: Color::Rgb(190, 30, 30),
            status_key_fg: Color::Rgb(255, 253, 245),
            status_key_bg: Color::Rgb(141, 104, 136),
            status_bar_fg: Color::Rgb(52, 52, 51),
            status_bar_bg: Color::Rgb(215, 204, 208),
            gauge_start: Color::Rgb(67, 191, 109),
            code: Color::Blue,
            link: Color::Blue,
            quote: Color::Gray,
            heading: Color::Magenta,
            heading_minor: Color::Rgb(120, 60, 160),
        }
    }

    pub fn text(&self) -> Style {
        Style::default().fg(self.fg)
    }

    pub fn muted_text(&self) -> Style {
        Style::default().fg(self.muted)
    }

    pub fn heading_style(&self, level: usize) -> Style {
        match level {
            1 => Style::default()
                .fg(self.heading)
                .add_modifier(Modifier::BOLD)
                .add_modifier(Modifier::UNDERLINED),
            2 => Style::default()
                .fg(self.heading)
                .add_modifier(Modifier::BOLD),
            _ => Style::default()
                .fg(self.heading_minor)
                .add_modifier(Modifier::BOLD),
        }
    }

    pub fn code_style(&self) -> Style {
        Style::default().fg(self.code)
    }

    pub fn link_style(&self) -> Style {
        Style::default()
            .fg(self.link)
            .add_modifier(Modifier::UNDERLINED)
    }

    pub fn quote_style(&self) -> Style {
        Style::default().fg(self.quote)
    }

    pub fn bullet_style(&self) -> Style {
        Style::default().fg(self.heading)
    }

    pub fn status_key_style(&self) -> Style {
        Style::default()
            .fg(self.status_key_fg)
            .bg(self.status_key_bg)
    }

    pub fn status_bar_style(&self) -> Style {
        Style::default()
            .fg(self.status_bar_fg)
            .bg(self.status_bar_bg)
    }
}

impl Default for Theme {
    fn default() -> Self {
        Self::dark()
    }
}
