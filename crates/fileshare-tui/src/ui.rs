//! UI rendering module

use fileshare_core::{LogLevel, TunnelState};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Tabs, Wrap},
};

use crate::app::{App, InputMode, Tab};

pub fn draw(frame: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Length(4), // Connection
            Constraint::Min(8),    // Main content
            Constraint::Length(3), // Status bar
        ])
        .split(frame.area());

    draw_header(frame, app, chunks[0]);
    draw_connection(frame, app, chunks[1]);
    draw_main(frame, app, chunks[2]);
    draw_status_bar(frame, app, chunks[3]);

    if app.input_mode != InputMode::Normal {
        draw_input_popup(frame, app);
    }
}

fn draw_header(frame: &mut Frame, app: &App, area: Rect) {
    let titles = vec!["文件 [1]", "日志 [2]"];
    let selected = match app.tab {
        Tab::Files => 0,
        Tab::Log => 1,
    };

    let tabs = Tabs::new(titles)
        .block(Block::default().borders(Borders::ALL).title(" Fileshare "))
        .select(selected)
        .style(Style::default().fg(Color::White))
        .highlight_style(Style::default().fg(Color::Yellow).bold());

    frame.render_widget(tabs, area);
}

fn draw_connection(frame: &mut Frame, app: &App, area: Rect) {
    let (indicator, color) = match app.connected {
        Some(true) => ("● 在线", Color::Green),
        Some(false) => ("● 离线", Color::Red),
        None => ("○ 未测试", Color::DarkGray),
    };

    let tunnel = match app.tunnel.state() {
        TunnelState::Stopped => "未启动".to_string(),
        TunnelState::Starting => "启动中...".to_string(),
        TunnelState::Running { public_url } => public_url,
        TunnelState::Stopping => "停止中...".to_string(),
    };

    let lines = vec![
        Line::from(vec![
            Span::raw(" 服务器: "),
            Span::styled(app.client.server_url(), Style::default().bold()),
            Span::raw("  "),
            Span::styled(indicator, Style::default().fg(color)),
        ]),
        Line::from(vec![Span::raw(" 隧道:   "), Span::raw(tunnel)]),
    ];

    let widget =
        Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(" 🔗 连接 "));
    frame.render_widget(widget, area);
}

fn draw_main(frame: &mut Frame, app: &App, area: Rect) {
    match app.tab {
        Tab::Files => draw_files_tab(frame, app, area),
        Tab::Log => draw_log_tab(frame, app, area),
    }
}

fn draw_files_tab(frame: &mut Frame, app: &App, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(65), Constraint::Percentage(35)])
        .split(area);

    let items: Vec<ListItem> = app
        .files
        .iter()
        .map(|name| ListItem::new(format!("📄 {}", name)))
        .collect();

    let title = format!(" 📁 服务器文件 ({}) ", app.files.len());
    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(title))
        .highlight_style(Style::default().bg(Color::DarkGray).fg(Color::White).bold())
        .highlight_symbol("▶ ");

    let mut state = ListState::default();
    if !app.files.is_empty() {
        state.select(Some(app.selected_file));
    }
    frame.render_stateful_widget(list, chunks[0], &mut state);

    let help_text = "c 修改地址并连接\nl 使用本地服务器\nr 刷新列表\nu 上传文件\n\
                     d/Enter 下载选中文件\nt 启动/停止隧道\n↑/↓ 选择\nq 退出";
    let help = Paragraph::new(help_text)
        .block(Block::default().borders(Borders::ALL).title(" 帮助 "))
        .wrap(Wrap { trim: true });

    frame.render_widget(help, chunks[1]);
}

fn draw_log_tab(frame: &mut Frame, app: &App, area: Rect) {
    let height = area.height.saturating_sub(2) as usize;
    let mut items: Vec<ListItem> = app
        .visible_logs()
        .rev()
        .take(height)
        .map(|entry| {
            let style = match entry.level {
                LogLevel::Error => Style::default().fg(Color::Red),
                LogLevel::Warn => Style::default().fg(Color::Yellow),
                LogLevel::Info => Style::default(),
                LogLevel::Debug | LogLevel::Trace => Style::default().fg(Color::DarkGray),
            };
            ListItem::new(entry.to_string()).style(style)
        })
        .collect();
    items.reverse();

    let title = format!(
        " 📋 日志 (≤ {}) [v]级别 [x]清空 ",
        app.min_log_level.name()
    );
    let list = List::new(items).block(Block::default().borders(Borders::ALL).title(title));

    frame.render_widget(list, area);
}

fn draw_status_bar(frame: &mut Frame, app: &App, area: Rect) {
    let busy = if app.busy > 0 {
        format!(" ⏳ {} ", app.busy)
    } else {
        " ⏸️  空闲 ".to_string()
    };

    let status = Paragraph::new(format!(
        "{}│ {} │ [Tab]切换 [q]退出",
        busy, app.status_message
    ))
    .block(Block::default().borders(Borders::ALL));

    frame.render_widget(status, area);
}

fn draw_input_popup(frame: &mut Frame, app: &App) {
    let title = match &app.input_mode {
        InputMode::EditUrl => " 服务器地址 ".to_string(),
        InputMode::UploadPath => " 上传文件路径 ".to_string(),
        InputMode::DownloadPath { name } => format!(" 保存 {} 到 ", name),
        InputMode::Normal => return,
    };

    let area = centered_rect(70, 3, frame.area());
    let input = Paragraph::new(format!("{}▏", app.input_buffer)).block(
        Block::default()
            .borders(Borders::ALL)
            .title(title)
            .title_bottom(" Enter 确认 · Esc 取消 ")
            .border_style(Style::default().fg(Color::Yellow)),
    );

    frame.render_widget(Clear, area);
    frame.render_widget(input, area);
}

/// 水平居中、垂直居中的固定高度区域
fn centered_rect(percent_x: u16, height: u16, r: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Fill(1),
            Constraint::Length(height),
            Constraint::Fill(1),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_centered_rect() {
        let area = centered_rect(50, 3, Rect::new(0, 0, 100, 21));
        assert_eq!(area.height, 3);
        assert_eq!(area.width, 50);
        assert_eq!(area.y, 9);
    }
}
