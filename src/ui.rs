use chrono::Local;
use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
};
use crate::app::{App, FocusPane, NARROW_WIDTH};
use crate::controller::{NoticeLevel, Phase};
use crate::input::InputTab;
use crate::model::{ContentType, Message, Role};

const SIDEBAR_WIDTH: u16 = 32;
const MAX_INPUT_LINES: u16 = 4;

/// Parse a line of text and convert **bold** markdown to styled spans
fn parse_markdown_line(text: &str) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut chars = text.chars().peekable();
    let mut current_text = String::new();

    while let Some(c) = chars.next() {
        if c == '*' && chars.peek() == Some(&'*') {
            chars.next();

            // Find closing **
            let mut bold_text = String::new();
            let mut found_close = false;
            while let Some(c) = chars.next() {
                if c == '*' && chars.peek() == Some(&'*') {
                    chars.next();
                    found_close = true;
                    break;
                }
                bold_text.push(c);
            }

            if found_close && !bold_text.is_empty() {
                if !current_text.is_empty() {
                    spans.push(Span::raw(std::mem::take(&mut current_text)));
                }
                spans.push(Span::styled(bold_text, Style::default().add_modifier(Modifier::BOLD)));
            } else {
                // No closing **, treat as literal
                current_text.push_str("**");
                current_text.push_str(&bold_text);
            }
        } else {
            current_text.push(c);
        }
    }

    if !current_text.is_empty() {
        spans.push(Span::raw(current_text));
    }

    if spans.is_empty() {
        Line::default()
    } else {
        Line::from(spans)
    }
}

/// Rows one line of text takes when word-wrapped to `width`.
///
/// Words move to the next row when they do not fit; words longer than a
/// row are broken across rows.
fn word_wrapped_rows(text: &str, width: usize) -> u16 {
    let mut rows: u16 = 1;
    let mut col = 0;

    for word in text.split(' ') {
        let mut len = word.chars().count();
        if col > 0 && col + 1 + len <= width {
            col += 1 + len;
            continue;
        }
        if col > 0 {
            rows += 1;
        }
        while len > width {
            rows += 1;
            len -= width;
        }
        col = len;
    }
    rows
}

/// Rows a set of lines occupies once wrapped to `width`
fn wrapped_height(lines: &[Line], width: u16) -> u16 {
    let width = width.max(1) as usize;
    lines
        .iter()
        .map(|line| {
            let text: String = line.spans.iter().map(|span| span.content.as_ref()).collect();
            word_wrapped_rows(&text, width)
        })
        .sum()
}

/// Row and column of a char cursor inside multi-line text
fn cursor_row_col(text: &str, cursor: usize) -> (u16, u16) {
    let before: String = text.chars().take(cursor).collect();
    let row = before.matches('\n').count();
    let col = before.rsplit('\n').next().map(|l| l.chars().count()).unwrap_or(0);
    (row as u16, col as u16)
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();
    app.narrow = area.width < NARROW_WIDTH;

    if app.view.phase == Phase::LoadingSessions {
        render_loading(app, frame, area);
        return;
    }

    // Main layout: header, body, footer
    let [header_area, body_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);

    let chat_area = if app.narrow {
        body_area
    } else {
        let [sidebar_area, chat_area] = Layout::horizontal([
            Constraint::Length(SIDEBAR_WIDTH),
            Constraint::Min(0),
        ])
        .areas(body_area);
        render_sidebar(app, frame, sidebar_area);
        chat_area
    };

    let input_lines = (app.input.draft().text.matches('\n').count() as u16 + 1).min(MAX_INPUT_LINES);
    let [messages_area, input_area] = Layout::vertical([
        Constraint::Min(0),
        Constraint::Length(input_lines + 3),
    ])
    .areas(chat_area);

    render_messages(app, frame, messages_area);
    render_input(app, frame, input_area);
    render_footer(app, frame, footer_area);

    // Overlay sidebar on narrow terminals
    if app.narrow {
        if app.view.sidebar_open {
            let overlay = Rect::new(
                body_area.x,
                body_area.y,
                SIDEBAR_WIDTH.min(body_area.width),
                body_area.height,
            );
            frame.render_widget(Clear, overlay);
            render_sidebar(app, frame, overlay);
        } else {
            app.sidebar_area = None;
        }
    }

    render_toasts(app, frame, body_area);
}

fn render_loading(app: &App, frame: &mut Frame, area: Rect) {
    let dots = ".".repeat((app.animation_frame as usize) + 1);
    let text = Text::from(vec![
        Line::from(Span::styled(" AI Chatbot ", Style::default().fg(Color::Cyan).bold())),
        Line::default(),
        Line::from(Span::styled(
            format!("Loading conversations{}", dots),
            Style::default().fg(Color::DarkGray),
        )),
    ]);
    let y = area.y + area.height.saturating_sub(3) / 2;
    let loading = Paragraph::new(text).centered();
    frame.render_widget(loading, Rect::new(area.x, y, area.width, area.height.min(3)));
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let subtitle = app
        .view
        .active_session()
        .map(|s| s.title.clone())
        .unwrap_or_else(|| "Select a conversation to begin".to_string());

    let title = Line::from(vec![
        Span::styled(" AI Chatbot ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(format!(" {} ", subtitle), Style::default().fg(Color::White)),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::DarkGray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let pairs: Vec<(&str, &str)> = match app.focus {
        FocusPane::Input => vec![
            ("Enter", "send"),
            ("S-Enter", "newline"),
            ("C-t", "text/image"),
            ("Esc", "messages"),
        ],
        FocusPane::Sidebar => vec![
            ("j/k", "nav"),
            ("Enter", "open"),
            ("n", "new"),
            ("d", "delete"),
            ("q", "quit"),
        ],
        FocusPane::Messages => vec![
            ("j/k", "message"),
            ("c", "copy"),
            ("d", "download"),
            ("Esc", "dismiss"),
            ("q", "quit"),
        ],
    };

    let mut hints: Vec<Span> = pairs
        .into_iter()
        .flat_map(|(k, label)| {
            [
                Span::styled(format!(" {} ", k), key_style),
                Span::styled(format!(" {} ", label), label_style),
            ]
        })
        .collect();
    hints.extend([
        Span::styled(" Tab ", key_style),
        Span::styled(" focus ", label_style),
        Span::styled(" C-n ", key_style),
        Span::styled(" new chat ", label_style),
    ]);
    if app.narrow {
        hints.extend([
            Span::styled(" C-b ", key_style),
            Span::styled(" chats ", label_style),
        ]);
    }

    frame.render_widget(Paragraph::new(Line::from(hints)), area);
}

fn render_sidebar(app: &mut App, frame: &mut Frame, area: Rect) {
    app.sidebar_area = Some(area);
    let focused = app.focus == FocusPane::Sidebar;
    let border_color = if focused { Color::Cyan } else { Color::DarkGray };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(format!(" Conversations ({}) ", app.view.sessions.len()));

    if app.view.sessions.is_empty() {
        let placeholder = Paragraph::new("No conversations yet.\nPress 'n' to start a new one.")
            .style(Style::default().fg(Color::DarkGray))
            .wrap(Wrap { trim: true })
            .block(block);
        frame.render_widget(placeholder, area);
        return;
    }

    let inner_width = area.width.saturating_sub(4) as usize;
    let items: Vec<ListItem> = app
        .view
        .sessions
        .iter()
        .map(|session| {
            let active = app.view.is_active(&session.id);
            let marker = if active { "● " } else { "  " };
            let title: String = session.title.chars().take(inner_width.saturating_sub(2)).collect();
            let title_style = if active {
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            let created = session.created_at.with_timezone(&Local).format("%d %b %H:%M");
            ListItem::new(vec![
                Line::from(Span::styled(format!("{}{}", marker, title), title_style)),
                Line::from(Span::styled(
                    format!("  {}", created),
                    Style::default().fg(Color::DarkGray),
                )),
            ])
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(Color::Blue)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, area, &mut app.sidebar_state);
}

/// Lines for a single message: role/time header, then text or image summary
fn message_lines(message: &Message, selected: bool, copied: bool) -> Vec<Line<'static>> {
    let (label, color) = match message.role {
        Role::User => ("You", Color::Cyan),
        Role::Assistant => ("AI Assistant", Color::Yellow),
    };
    let time = message.timestamp.with_timezone(&Local).format("%H:%M").to_string();

    let mut header = vec![
        Span::styled(if selected { "> " } else { "" }, Style::default().fg(Color::Blue).bold()),
        Span::styled(label, Style::default().fg(color).add_modifier(Modifier::BOLD)),
        Span::styled(format!("  {}", time), Style::default().fg(Color::DarkGray)),
    ];
    if copied {
        header.push(Span::styled("  Copied", Style::default().fg(Color::Green)));
    }

    let mut lines = vec![Line::from(header)];
    match message.content_type {
        ContentType::Text => {
            for line in message.content.lines() {
                lines.push(parse_markdown_line(line));
            }
        }
        ContentType::Image => {
            if let Some(prompt) = &message.prompt {
                lines.push(Line::from(Span::styled(
                    format!("\"{}\"", prompt),
                    Style::default().fg(Color::Gray).add_modifier(Modifier::ITALIC),
                )));
            }
            lines.push(Line::from(vec![
                Span::styled("[image] ", Style::default().fg(Color::Magenta).bold()),
                Span::raw(message.image_summary()),
            ]));
        }
    }
    lines.push(Line::default());
    lines
}

fn render_messages(app: &mut App, frame: &mut Frame, area: Rect) {
    app.messages_area = Some(area);
    let focused = app.focus == FocusPane::Messages;
    let border_color = if focused { Color::Cyan } else { Color::DarkGray };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(" Messages ");

    if app.view.messages.is_empty() && !app.view.sending {
        let welcome = Text::from(vec![
            Line::from(Span::styled("Welcome to AI Chatbot", Style::default().bold())),
            Line::default(),
            Line::from(Span::styled(
                "Start a conversation by typing a message or asking the AI to create an image",
                Style::default().fg(Color::DarkGray),
            )),
        ]);
        let paragraph = Paragraph::new(welcome)
            .centered()
            .wrap(Wrap { trim: true })
            .block(block);
        frame.render_widget(paragraph, area);
        return;
    }

    let mut lines: Vec<Line> = Vec::new();
    for (i, message) in app.view.messages.iter().enumerate() {
        let selected = focused && app.selected_message == Some(i);
        lines.extend(message_lines(message, selected, app.is_copied(&message.id)));
    }

    if app.view.sending {
        lines.push(Line::from(vec![
            Span::styled("AI Assistant", Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)),
            Span::styled("  processing", Style::default().fg(Color::DarkGray)),
        ]));
        // Animated ellipsis: cycles through ".", "..", "..."
        let dots = ".".repeat((app.animation_frame as usize) + 1);
        lines.push(Line::from(Span::styled(
            format!("Thinking{}", dots),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )));
    }

    let inner_height = area.height.saturating_sub(2);
    let inner_width = area.width.saturating_sub(2);
    app.messages_height = inner_height;

    let total = wrapped_height(&lines, inner_width);
    let max_scroll = total.saturating_sub(inner_height);
    if app.follow_bottom {
        app.message_scroll = max_scroll;
    } else {
        app.message_scroll = app.message_scroll.min(max_scroll);
    }

    let paragraph = Paragraph::new(Text::from(lines))
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((app.message_scroll, 0));
    frame.render_widget(paragraph, area);
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let focused = app.focus == FocusPane::Input;
    let sending = app.view.sending;
    let border_color = if sending {
        Color::DarkGray
    } else if focused {
        Color::Yellow
    } else {
        Color::Gray
    };

    let tab_span = |tab: InputTab| {
        let style = if app.input.tab == tab {
            Style::default().bg(Color::Yellow).fg(Color::Black).bold()
        } else {
            Style::default().fg(Color::DarkGray)
        };
        Span::styled(format!(" {} ", tab.label()), style)
    };

    let status = if sending {
        Span::styled(" Processing... ", Style::default().fg(Color::DarkGray).italic())
    } else if app.input.can_submit(false) {
        Span::styled(" Send ", Style::default().fg(Color::Green))
    } else {
        Span::raw("")
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(Line::from(vec![Span::raw(" "), tab_span(InputTab::Text), tab_span(InputTab::Image), Span::raw(" ")]))
        .title_bottom(Line::from(vec![
            Span::styled(format!(" {} ", app.input.hint()), Style::default().fg(Color::DarkGray)),
            status,
        ]));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let draft = app.input.draft();
    if draft.text.is_empty() {
        let placeholder = Paragraph::new(app.input.placeholder())
            .style(Style::default().fg(Color::DarkGray));
        frame.render_widget(placeholder, inner);
    } else {
        let (row, col) = cursor_row_col(&draft.text, draft.cursor);
        // Keep the cursor inside the visible window
        let row_offset = row.saturating_sub(inner.height.saturating_sub(1));
        let col_offset = col.saturating_sub(inner.width.saturating_sub(1));

        let text = Paragraph::new(draft.text.as_str())
            .style(Style::default().fg(if sending { Color::DarkGray } else { Color::Cyan }))
            .scroll((row_offset, col_offset));
        frame.render_widget(text, inner);
    }

    if focused && !sending {
        let (row, col) = cursor_row_col(&draft.text, draft.cursor);
        let x = col.min(inner.width.saturating_sub(1));
        let y = row.min(inner.height.saturating_sub(1));
        frame.set_cursor_position((inner.x + x, inner.y + y));
    }
}

fn render_toasts(app: &App, frame: &mut Frame, area: Rect) {
    let width = area.width.saturating_sub(2).min(44);
    let mut y = area.y + 1;

    for notification in app.view.notifications.iter().rev() {
        let height = 4;
        if y + height > area.y + area.height {
            break;
        }
        let x = area.x + area.width.saturating_sub(width + 1);
        let toast_area = Rect::new(x, y, width, height);

        let color = match notification.level {
            NoticeLevel::Info => Color::Green,
            NoticeLevel::Error => Color::Red,
        };
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(color))
            .title(Span::styled(format!(" {} ", notification.title), Style::default().fg(color).bold()));
        let body = Paragraph::new(notification.description.as_str())
            .wrap(Wrap { trim: true })
            .block(block);

        frame.render_widget(Clear, toast_area);
        frame.render_widget(body, toast_area);
        y += height;
    }
}
