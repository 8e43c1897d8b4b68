use crate::app::{App, HeaderInfo, InputMode, TerminalView};
use crate::theme;
use chrono::Local;
use ltail_core::{FileEntry, LogLine, Mask, Timestamp};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState},
    Frame,
};

const SIZE_UNITS: [&str; 5] = ["B", "kB", "MB", "GB", "TB"];

pub fn render(f: &mut Frame, header: &HeaderInfo, app: &App, view: &mut TerminalView) {
    let area = f.size();
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(0),
            Constraint::Length(1),
        ])
        .split(area);

    f.render_widget(Paragraph::new(header_line(header)), layout[0]);
    if view.channel().is_index() {
        render_index(f, view, layout[1]);
    } else {
        render_log(f, view, layout[1]);
    }
    f.render_widget(Paragraph::new(footer_line(app, view)), layout[2]);
}

fn header_line(header: &HeaderInfo) -> Line<'static> {
    let mut spans = vec![
        Span::styled("ltail ", theme::HEADER_STYLE),
        Span::styled(
            format!("[{}]", header.state),
            Style::new().fg(theme::connection_color(header.state)),
        ),
        Span::raw(format!(
            " {} {}",
            header.host.as_deref().unwrap_or("?"),
            header.location
        )),
    ];
    let nav = match (header.can_go_back, header.can_go_forward) {
        (true, true) => " <>",
        (true, false) => " <",
        (false, true) => " >",
        (false, false) => "",
    };
    spans.push(Span::styled(nav, theme::MUTED_STYLE));
    if !header.follow {
        spans.push(Span::styled(" paused", theme::MUTED_STYLE));
    }
    if header.unread > 0 {
        spans.push(Span::styled(format!(" +{}", header.unread), theme::MUTED_STYLE));
    }
    if header.trace {
        spans.push(Span::styled(" trace", theme::MUTED_STYLE));
    }
    if header.dropped > 0 || header.decode_failures > 0 {
        spans.push(Span::styled(
            format!(" dropped:{} bad:{}", header.dropped, header.decode_failures),
            theme::MUTED_STYLE,
        ));
    }
    Line::from(spans)
}

fn footer_line(app: &App, view: &TerminalView) -> Line<'static> {
    if let InputMode::EditMask(buffer) = &app.mode {
        return Line::from(vec![
            Span::styled("mask: ", theme::HEADER_STYLE),
            Span::raw(format!("{buffer}_")),
        ]);
    }
    match view.status() {
        Some(status) if status.is_error() => {
            Line::from(Span::styled(status.text(), theme::ERROR_STYLE))
        }
        Some(status) => Line::from(Span::styled(status.text(), theme::MUTED_STYLE)),
        None => Line::from(Span::styled(
            "enter open  esc index  [ ] history  / mask  R reconnect  s stats  t trace  q quit",
            theme::MUTED_STYLE,
        )),
    }
}

fn render_index(f: &mut Frame, view: &TerminalView, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!("index ({} files)", view.rows().len()));
    let rows = index_rows(view.rows());
    let widths = [
        Constraint::Percentage(30),
        Constraint::Percentage(40),
        Constraint::Length(10),
        Constraint::Length(19),
    ];
    let table = Table::new(rows, widths)
        .header(Row::new(vec!["dir", "file", "size", "modified"]).style(theme::HEADER_STYLE))
        .block(block)
        .highlight_style(theme::SELECTED_STYLE);
    let mut state = TableState::default();
    if !view.rows().is_empty() {
        state.select(Some(view.selected()));
    }
    f.render_stateful_widget(table, area, &mut state);
}

fn index_rows(entries: &[FileEntry]) -> Vec<Row<'static>> {
    let mut prev_dir = "";
    entries
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let (dir, file) = split_dir(&entry.name);
            // a directory is named once, on its first row
            let dir_cell = match dir {
                Some(dir) if dir != prev_dir => {
                    prev_dir = dir;
                    dir.to_string()
                }
                _ => String::new(),
            };
            Row::new(vec![
                Cell::from(dir_cell).style(theme::DIR_STYLE),
                Cell::from(file.to_string()),
                Cell::from(format_size(entry.size)),
                Cell::from(format_mtime(&entry.modified)),
            ])
            .style(theme::row_style(i, entry.is_navigable()))
        })
        .collect()
}

fn render_log(f: &mut Frame, view: &mut TerminalView, area: Rect) {
    let mut title = view.channel().to_string();
    if !view.mask().is_empty() {
        title.push_str(&format!(" mask:{}", view.mask().pattern()));
    }
    let block = Block::default().borders(Borders::ALL).title(title);
    let inner = block.inner(area);
    f.render_widget(block, area);

    view.set_viewport(inner.height as usize);
    let lines: Vec<Line> = view
        .visible_lines()
        .map(|line| render_line(line, view.mask()))
        .collect();
    f.render_widget(Paragraph::new(lines), inner);
}

fn render_line(line: &LogLine, mask: &Mask) -> Line<'static> {
    if !line.highlighted {
        return Line::from(line.text.clone());
    }
    let mut spans = Vec::new();
    let mut cursor = 0;
    for (start, end) in mask.ranges(&line.text) {
        if start > cursor {
            spans.push(Span::raw(line.text[cursor..start].to_string()));
        }
        spans.push(Span::styled(line.text[start..end].to_string(), theme::MATCH_STYLE));
        cursor = end;
    }
    if cursor < line.text.len() {
        spans.push(Span::raw(line.text[cursor..].to_string()));
    }
    let mut rendered = Line::from(spans);
    rendered.style = theme::HIGHLIGHT_LINE_STYLE;
    rendered
}

fn split_dir(name: &str) -> (Option<&str>, &str) {
    match name.rsplit_once('/') {
        Some((dir, file)) if !dir.is_empty() && !file.is_empty() => (Some(dir), file),
        _ => (None, name),
    }
}

fn format_size(size: u64) -> String {
    if size == 0 {
        return "0 B".to_string();
    }
    let mut unit = 0;
    let mut value = size as f64;
    while value >= 1024.0 && unit < SIZE_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let rounded = format!("{value:.2}");
    let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');
    format!("{trimmed} {}", SIZE_UNITS[unit])
}

fn format_mtime(stamp: &Timestamp) -> String {
    match stamp {
        Timestamp::At(at) => at
            .with_timezone(&Local)
            .format("%d.%m.%Y %H:%M:%S")
            .to_string(),
        Timestamp::Raw(raw) => raw.clone(),
    }
}
