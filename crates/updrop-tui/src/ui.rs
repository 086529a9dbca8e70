//! UI rendering module

use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Cell, Clear, List, ListItem, Paragraph, Row, Table, TableState},
};

use crate::app::{App, CommandView, DigestState, Mode};
use updrop_core::LogLevel;
use updrop_core::format::{human_size, local_time};

pub fn draw(frame: &mut Frame, app: &App) {
    let command_lines = app.command_set().map_or(1, |set| set.commands.len() + 3);
    let command_height = u16::try_from(command_lines + 2).unwrap_or(u16::MAX);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),              // Header
            Constraint::Min(6),                 // File list
            Constraint::Length(command_height), // Commands
            Constraint::Length(7),              // Activity log
            Constraint::Length(3),              // Status bar
        ])
        .split(frame.area());

    draw_header(frame, app, chunks[0]);
    draw_files(frame, app, chunks[1]);
    draw_commands(frame, app, chunks[2]);
    draw_log(frame, app, chunks[3]);
    draw_status_bar(frame, app, chunks[4]);

    if let Mode::TypingUploadName(buffer) = &app.mode {
        draw_upload_prompt(frame, buffer);
    }
}

fn draw_header(frame: &mut Frame, app: &App, area: Rect) {
    let mut spans = vec![
        Span::styled(
            format!("http://{}:{}", app.advertise_ip, app.port),
            Style::default().fg(Color::Cyan).bold(),
        ),
        Span::raw("  serving "),
        Span::styled(
            app.base_dir.display().to_string(),
            Style::default().fg(Color::White),
        ),
    ];
    if !app.hostname.is_empty() {
        spans.push(Span::styled(
            format!("  @{}", app.hostname),
            Style::default().fg(Color::DarkGray),
        ));
    }

    let header = Paragraph::new(Line::from(spans))
        .block(Block::default().borders(Borders::ALL).title(" updrop "));
    frame.render_widget(header, area);
}

fn draw_files(frame: &mut Frame, app: &App, area: Rect) {
    let title = if app.mode == Mode::Loading {
        " Files (loading...) ".to_string()
    } else {
        format!(
            " Files ({}, {}) ",
            app.snapshot.len(),
            human_size(app.snapshot.total_bytes())
        )
    };
    let block = Block::default().borders(Borders::ALL).title(title);

    if app.snapshot.is_empty() {
        let empty = Paragraph::new("(No files found)")
            .style(Style::default().fg(Color::DarkGray))
            .block(block);
        frame.render_widget(empty, area);
        return;
    }

    let rows: Vec<Row> = app
        .snapshot
        .iter()
        .map(|entry| {
            Row::new(vec![
                Cell::from(entry.display_name.clone()),
                Cell::from(human_size(entry.size_bytes)),
                Cell::from(local_time(entry.modified_at)),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Min(20),
            Constraint::Length(10),
            Constraint::Length(16),
        ],
    )
    .header(Row::new(vec!["Filename", "Size", "Modified"]).style(Style::default().bold()))
    .block(block)
    .row_highlight_style(Style::default().bg(Color::DarkGray).fg(Color::White))
    .highlight_symbol("▶ ");

    let mut state = TableState::default().with_selected(app.selection);
    frame.render_stateful_widget(table, area, &mut state);
}

fn draw_commands(frame: &mut Frame, app: &App, area: Rect) {
    let title = match &app.view {
        CommandView::Download => " Download ".to_string(),
        CommandView::Upload(_) => " Upload (Esc to return) ".to_string(),
    };
    let block = Block::default().borders(Borders::ALL).title(title);

    let Some(set) = app.command_set() else {
        frame.render_widget(Paragraph::new("No file selected").block(block), area);
        return;
    };

    let label_width = set
        .commands
        .iter()
        .map(|c| c.label.chars().count())
        .max()
        .unwrap_or(0);

    let mut lines = vec![
        Line::from(Span::styled(
            set.url.clone(),
            Style::default().fg(Color::Cyan).bold(),
        )),
        Line::default(),
    ];
    for command in &set.commands {
        lines.push(Line::from(vec![
            Span::styled(
                format!("{:<width$} ", format!("{}:", command.label), width = label_width + 1),
                Style::default().fg(Color::Yellow),
            ),
            Span::raw(command.text.clone()),
        ]));
    }

    if app.view == CommandView::Download {
        let digest = match app.current_digest() {
            Some(DigestState::Ready(_, hex)) => hex.clone(),
            Some(DigestState::Failed(_, e)) => format!("unavailable ({e})"),
            Some(DigestState::Pending(_)) | None => "computing...".to_string(),
        };
        lines.push(Line::from(Span::styled(
            format!("sha256  {digest}"),
            Style::default().fg(Color::DarkGray),
        )));
    }

    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn draw_log(frame: &mut Frame, app: &App, area: Rect) {
    let visible = usize::from(area.height.saturating_sub(2));
    let items: Vec<ListItem> = app
        .logs
        .newest()
        .take(visible)
        .map(|entry| {
            let color = match entry.level {
                LogLevel::Error => Color::Red,
                LogLevel::Warn => Color::Yellow,
                LogLevel::Info => Color::White,
                LogLevel::Debug | LogLevel::Trace => Color::DarkGray,
            };
            ListItem::new(Line::from(vec![
                Span::styled(
                    format!("{} ", entry.time_label()),
                    Style::default().fg(Color::DarkGray),
                ),
                Span::styled(entry.message.clone(), Style::default().fg(color)),
            ]))
        })
        .collect();

    let list = List::new(items).block(Block::default().borders(Borders::ALL).title(" Activity "));
    frame.render_widget(list, area);
}

fn draw_status_bar(frame: &mut Frame, app: &App, area: Rect) {
    let status = if let Some(banner) = &app.banner {
        Paragraph::new(format!(" ⚠ refresh failed: {banner} (showing last listing)"))
            .style(Style::default().fg(Color::White).bg(Color::Red))
    } else {
        let hints = match app.mode {
            Mode::TypingUploadName(_) => " [Enter] confirm  [Esc] cancel",
            _ => " [↑/↓] select  [u] upload  [r] refresh  [Esc] download view  [q] quit",
        };
        Paragraph::new(hints)
    };

    frame.render_widget(status.block(Block::default().borders(Borders::ALL)), area);
}

fn draw_upload_prompt(frame: &mut Frame, buffer: &str) {
    let area = centered_rect(50, 5, frame.area());
    frame.render_widget(Clear, area);

    let prompt = Paragraph::new(vec![
        Line::from("Enter filename to upload:"),
        Line::from(vec![
            Span::styled(buffer.to_string(), Style::default().fg(Color::White).bold()),
            Span::styled("█", Style::default().fg(Color::Gray)),
        ]),
    ])
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title(" Upload ")
            .border_style(Style::default().fg(Color::Yellow)),
    );
    frame.render_widget(prompt, area);
}

fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::backend::TestBackend;
    use std::path::PathBuf;
    use std::time::SystemTime;
    use updrop_core::{CommandFormatter, DirectorySnapshot, FileEntry, Origin, SnapshotError};

    fn render(app: &App) -> String {
        let backend = TestBackend::new(120, 40);
        let mut terminal = Terminal::new(backend).expect("failed to create terminal");
        terminal.draw(|f| draw(f, app)).expect("failed to draw");
        terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect()
    }

    fn app_with_report() -> App {
        let mut app = App::new(
            "10.10.14.5",
            8000,
            PathBuf::from("/srv/share"),
            CommandFormatter::default(),
        );
        app.apply_snapshot(Ok(DirectorySnapshot::new(vec![FileEntry {
            display_name: "uploads/report.pdf".to_string(),
            absolute_path: PathBuf::from("/srv/share/uploads/report.pdf"),
            size_bytes: 2048,
            modified_at: SystemTime::now(),
            origin: Origin::Uploaded,
        }])));
        app
    }

    #[test]
    fn test_renders_files_and_download_commands() {
        let screen = render(&app_with_report());
        assert!(screen.contains("uploads/report.pdf"));
        assert!(screen.contains("2.0KB"));
        assert!(screen.contains("wget http://10.10.14.5:8000/uploads/report.pdf -O report.pdf"));
        assert!(screen.contains("sha256"));
    }

    #[test]
    fn test_renders_empty_listing() {
        let mut app = App::new("1.2.3.4", 80, PathBuf::from("/srv"), CommandFormatter::default());
        app.apply_snapshot(Ok(DirectorySnapshot::default()));
        let screen = render(&app);
        assert!(screen.contains("(No files found)"));
        assert!(screen.contains("No file selected"));
    }

    #[test]
    fn test_renders_error_banner_with_stale_listing() {
        let mut app = app_with_report();
        app.apply_snapshot(Err(SnapshotError::Timeout(2000)));
        let screen = render(&app);
        assert!(screen.contains("refresh failed"));
        assert!(screen.contains("uploads/report.pdf"));
    }

    #[test]
    fn test_renders_upload_prompt_and_commands() {
        let mut app = app_with_report();
        app.mode = Mode::TypingUploadName("loot.zip".to_string());
        let screen = render(&app);
        assert!(screen.contains("Enter filename to upload:"));
        assert!(screen.contains("loot.zip"));

        app.mode = Mode::Browsing;
        app.view = CommandView::Upload("loot.zip".to_string());
        let screen = render(&app);
        assert!(screen.contains("Upload (Esc to return)"));
        assert!(screen.contains("curl.exe -X PUT --upload-file loot.zip http://10.10.14.5:8000/loot.zip"));
    }
}
