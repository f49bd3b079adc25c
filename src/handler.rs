use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};
use ratatui::layout::Rect;
use crate::app::{App, FocusPane};
use crate::controller::Intent;
use crate::model::ContentType;
use crate::tui::AppEvent;

pub fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key)?,
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Resize(_, _) => {}
        AppEvent::Tick => app.tick()?,
    }
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) -> Result<()> {
    // Global keys that work in any pane
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        match key.code {
            KeyCode::Char('c') => {
                app.should_quit = true;
                return Ok(());
            }
            KeyCode::Char('b') => return app.toggle_sidebar(),
            KeyCode::Char('n') => return app.dispatch(Intent::NewSession),
            _ => {}
        }
    }

    if key.code == KeyCode::Tab {
        app.cycle_focus();
        return Ok(());
    }

    match app.focus {
        FocusPane::Input => handle_input_key(app, key)?,
        FocusPane::Sidebar => handle_sidebar_key(app, key)?,
        FocusPane::Messages => handle_messages_key(app, key)?,
    }
    Ok(())
}

fn handle_input_key(app: &mut App, key: KeyEvent) -> Result<()> {
    let newline_modifier = key.modifiers.intersects(KeyModifiers::SHIFT | KeyModifiers::ALT);

    match key.code {
        KeyCode::Esc => {
            app.focus = FocusPane::Messages;
        }
        KeyCode::Enter if newline_modifier => {
            if !app.view.sending {
                app.input.insert_newline();
            }
        }
        KeyCode::Enter => {
            app.submit_input()?;
        }
        KeyCode::BackTab => {
            app.input.toggle_tab();
        }
        KeyCode::Char('t') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.input.toggle_tab();
        }
        // Input is disabled while a send is outstanding
        _ if app.view.sending => {}
        KeyCode::Backspace => app.input.draft_mut().backspace(),
        KeyCode::Delete => app.input.draft_mut().delete(),
        KeyCode::Left => app.input.draft_mut().move_left(),
        KeyCode::Right => app.input.draft_mut().move_right(),
        KeyCode::Home => app.input.draft_mut().move_home(),
        KeyCode::End => app.input.draft_mut().move_end(),
        KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.input.draft_mut().insert(c);
        }
        _ => {}
    }
    Ok(())
}

fn handle_sidebar_key(app: &mut App, key: KeyEvent) -> Result<()> {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,
        KeyCode::Char('j') | KeyCode::Down => app.sidebar_nav_down(),
        KeyCode::Char('k') | KeyCode::Up => app.sidebar_nav_up(),
        KeyCode::Enter | KeyCode::Char('l') | KeyCode::Right => {
            if let Some(session) = app.highlighted_session() {
                let id = session.id.clone();
                app.dispatch(Intent::SelectSession(id))?;
            }
        }
        KeyCode::Char('n') => app.dispatch(Intent::NewSession)?,
        KeyCode::Char('d') => {
            if let Some(session) = app.highlighted_session() {
                let id = session.id.clone();
                app.dispatch(Intent::DeleteSession(id))?;
            }
        }
        KeyCode::Char('i') => app.focus = FocusPane::Input,
        KeyCode::Esc => {
            if app.narrow && app.view.sidebar_open {
                app.toggle_sidebar()?;
            } else {
                app.dismiss_latest()?;
            }
        }
        _ => {}
    }
    Ok(())
}

fn handle_messages_key(app: &mut App, key: KeyEvent) -> Result<()> {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,
        KeyCode::Char('j') | KeyCode::Down => app.message_nav_down(),
        KeyCode::Char('k') | KeyCode::Up => app.message_nav_up(),
        KeyCode::PageDown => app.scroll_down(app.messages_height / 2),
        KeyCode::PageUp => app.scroll_up(app.messages_height / 2),
        KeyCode::Char('g') => {
            app.selected_message = (!app.view.messages.is_empty()).then_some(0);
            app.message_scroll = 0;
            app.follow_bottom = false;
        }
        KeyCode::Char('G') => {
            app.selected_message = app.view.messages.len().checked_sub(1);
            app.follow_bottom = true;
        }
        KeyCode::Char('c') => {
            if let Some(message) = app.selected_message().cloned() {
                // Images have nothing to copy as text
                if message.content_type == ContentType::Text && copy_to_clipboard(&message.content) {
                    app.mark_copied(&message.id);
                }
            }
        }
        KeyCode::Char('d') => {
            if let Some(message) = app.selected_message() {
                let id = message.id.clone();
                app.dispatch(Intent::Download(id))?;
            }
        }
        KeyCode::Char('i') => app.focus = FocusPane::Input,
        KeyCode::Esc => app.dismiss_latest()?,
        _ => {}
    }
    Ok(())
}

/// Check if a point is within a rectangle
fn point_in_rect(x: u16, y: u16, rect: Rect) -> bool {
    x >= rect.x && x < rect.x + rect.width && y >= rect.y && y < rect.y + rect.height
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    let x = mouse.column;
    let y = mouse.row;

    let in_sidebar = app.sidebar_area.map(|r| point_in_rect(x, y, r)).unwrap_or(false);
    let in_messages = app.messages_area.map(|r| point_in_rect(x, y, r)).unwrap_or(false);

    match mouse.kind {
        MouseEventKind::ScrollDown => {
            if in_messages {
                app.scroll_down(3);
            } else if in_sidebar {
                app.sidebar_nav_down();
            }
        }
        MouseEventKind::ScrollUp => {
            if in_messages {
                app.scroll_up(3);
            } else if in_sidebar {
                app.sidebar_nav_up();
            }
        }
        _ => {}
    }
}

/// Pipe text into the first clipboard tool that accepts it
fn copy_to_clipboard(text: &str) -> bool {
    use std::io::Write;
    use std::process::{Command, Stdio};

    const TOOLS: &[(&str, &[&str])] = &[
        ("pbcopy", &[]),
        ("wl-copy", &[]),
        ("xclip", &["-selection", "clipboard"]),
    ];

    for (program, args) in TOOLS {
        let Ok(mut child) = Command::new(program).args(*args).stdin(Stdio::piped()).spawn() else {
            continue;
        };
        if let Some(mut stdin) = child.stdin.take() {
            if stdin.write_all(text.as_bytes()).is_err() {
                continue;
            }
        }
        return child.wait().map(|status| status.success()).unwrap_or(false);
    }
    tracing::warn!("no clipboard tool available");
    false
}
