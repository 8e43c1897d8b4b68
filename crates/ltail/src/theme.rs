use ltail_core::ConnectionState;
use ratatui::style::{Color, Modifier, Style};

pub const HEADER_STYLE: Style = Style::new()
    .fg(Color::Rgb(142, 192, 124))
    .add_modifier(Modifier::BOLD);
pub const SELECTED_STYLE: Style = Style::new()
    .bg(Color::Rgb(131, 165, 152))
    .fg(Color::Black)
    .add_modifier(Modifier::BOLD);
pub const MUTED_STYLE: Style = Style::new().fg(Color::Rgb(146, 131, 116));
pub const DIR_STYLE: Style = Style::new().fg(Color::Rgb(69, 133, 136));
pub const HIGHLIGHT_LINE_STYLE: Style = Style::new().bg(Color::Rgb(60, 56, 54));
pub const MATCH_STYLE: Style = Style::new()
    .fg(Color::Black)
    .bg(Color::Rgb(250, 189, 47))
    .add_modifier(Modifier::BOLD);
pub const ERROR_STYLE: Style = Style::new()
    .fg(Color::Rgb(254, 128, 25))
    .add_modifier(Modifier::BOLD);

pub fn zebra_row_style(index: usize) -> Style {
    let bg = if index % 2 == 0 {
        Color::Rgb(18, 20, 26)
    } else {
        Color::Rgb(24, 27, 34)
    };
    Style::new().bg(bg)
}

/// Rows for empty files are shown but cannot be opened.
pub fn row_style(index: usize, navigable: bool) -> Style {
    let style = zebra_row_style(index);
    if navigable {
        style
    } else {
        style.fg(Color::Rgb(102, 92, 84))
    }
}

pub fn connection_color(state: ConnectionState) -> Color {
    match state {
        ConnectionState::Open => Color::Rgb(184, 187, 38),
        ConnectionState::Connecting => Color::Rgb(250, 189, 47),
        ConnectionState::Closing => Color::Rgb(215, 153, 33),
        ConnectionState::Closed => Color::Rgb(214, 93, 14),
    }
}
