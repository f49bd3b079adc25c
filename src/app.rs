use std::collections::HashMap;

use anyhow::{anyhow, Result};
use ratatui::layout::Rect;
use ratatui::widgets::ListState;
use tokio::sync::mpsc;

use crate::controller::{ChatView, Intent};
use crate::input::ChatInput;
use crate::model::{Message, Session};

/// Terminals narrower than this show the sidebar as an overlay
pub const NARROW_WIDTH: u16 = 80;

/// Ticks a toast stays on screen before it is dismissed
pub const TOAST_TICKS: u16 = 14;

/// Ticks the "Copied" marker stays next to a message
const COPIED_TICKS: u8 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusPane {
    Sidebar,
    Messages,
    Input,
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub focus: FocusPane,

    // Latest controller snapshot
    pub view: ChatView,

    // Composer
    pub input: ChatInput,

    // Sidebar cursor (view state only, the controller owns the selection)
    pub sidebar_state: ListState,

    // Message pane
    pub selected_message: Option<usize>,
    pub message_scroll: u16,
    pub messages_height: u16,
    pub follow_bottom: bool,
    pub copied: Option<(String, u8)>,

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation
    toast_ages: HashMap<u64, u16>,

    // Layout facts from the last render (mouse hit-testing, overlay mode)
    pub narrow: bool,
    pub sidebar_area: Option<Rect>,
    pub messages_area: Option<Rect>,

    intents: mpsc::UnboundedSender<Intent>,
}

impl App {
    pub fn new(intents: mpsc::UnboundedSender<Intent>) -> Self {
        Self {
            should_quit: false,
            focus: FocusPane::Input,
            view: ChatView::default(),
            input: ChatInput::new(),
            sidebar_state: ListState::default(),
            selected_message: None,
            message_scroll: 0,
            messages_height: 0,
            follow_bottom: true,
            copied: None,
            animation_frame: 0,
            toast_ages: HashMap::new(),
            narrow: false,
            sidebar_area: None,
            messages_area: None,
            intents,
        }
    }

    pub fn dispatch(&self, intent: Intent) -> Result<()> {
        self.intents
            .send(intent)
            .map_err(|_| anyhow!("chat controller stopped"))
    }

    /// Take a fresh snapshot from the controller
    pub fn apply_view(&mut self, view: ChatView) {
        let active_changed = view.active_session_id != self.view.active_session_id;
        let messages_grew = view.messages.len() != self.view.messages.len();
        let sidebar_closed = self.view.sidebar_open && !view.sidebar_open;
        self.view = view;

        if active_changed {
            let idx = self
                .view
                .active_session_id
                .as_deref()
                .and_then(|id| self.view.sessions.iter().position(|s| s.id == id));
            self.sidebar_state.select(idx);
            self.selected_message = None;
            self.follow_bottom = true;
        } else if let Some(i) = self.sidebar_state.selected() {
            if self.view.sessions.is_empty() {
                self.sidebar_state.select(None);
            } else if i >= self.view.sessions.len() {
                self.sidebar_state.select(Some(self.view.sessions.len() - 1));
            }
        }

        if messages_grew || self.view.sending {
            self.follow_bottom = true;
        }
        if let Some(i) = self.selected_message {
            if i >= self.view.messages.len() {
                self.selected_message = self.view.messages.len().checked_sub(1);
            }
        }

        if sidebar_closed && self.narrow && self.focus == FocusPane::Sidebar {
            self.focus = FocusPane::Input;
        }

        self.toast_ages
            .retain(|id, _| self.view.notifications.iter().any(|n| n.id == *id));
    }

    pub fn sidebar_visible(&self) -> bool {
        !self.narrow || self.view.sidebar_open
    }

    pub fn toggle_sidebar(&mut self) -> Result<()> {
        let open = !self.view.sidebar_open;
        if open {
            self.focus = FocusPane::Sidebar;
        } else if self.focus == FocusPane::Sidebar && self.narrow {
            self.focus = FocusPane::Input;
        }
        self.dispatch(Intent::SetSidebarOpen(open))
    }

    pub fn cycle_focus(&mut self) {
        self.focus = match self.focus {
            FocusPane::Sidebar => FocusPane::Messages,
            FocusPane::Messages => FocusPane::Input,
            FocusPane::Input if self.sidebar_visible() => FocusPane::Sidebar,
            FocusPane::Input => FocusPane::Messages,
        };
    }

    // Sidebar navigation
    pub fn sidebar_nav_down(&mut self) {
        let len = self.view.sessions.len();
        if len > 0 {
            let i = self.sidebar_state.selected().unwrap_or(0);
            self.sidebar_state.select(Some((i + 1).min(len - 1)));
        }
    }

    pub fn sidebar_nav_up(&mut self) {
        let i = self.sidebar_state.selected().unwrap_or(0);
        self.sidebar_state.select(Some(i.saturating_sub(1)));
    }

    pub fn highlighted_session(&self) -> Option<&Session> {
        self.sidebar_state
            .selected()
            .and_then(|i| self.view.sessions.get(i))
    }

    // Message navigation
    pub fn message_nav_down(&mut self) {
        let len = self.view.messages.len();
        if len > 0 {
            let next = self.selected_message.map(|i| (i + 1).min(len - 1)).unwrap_or(len - 1);
            self.selected_message = Some(next);
            self.follow_bottom = next == len - 1;
        }
    }

    pub fn message_nav_up(&mut self) {
        let len = self.view.messages.len();
        if len > 0 {
            let prev = self.selected_message.map(|i| i.saturating_sub(1)).unwrap_or(len - 1);
            self.selected_message = Some(prev);
            self.follow_bottom = false;
        }
    }

    pub fn selected_message(&self) -> Option<&Message> {
        self.selected_message.and_then(|i| self.view.messages.get(i))
    }

    pub fn scroll_down(&mut self, lines: u16) {
        self.message_scroll = self.message_scroll.saturating_add(lines);
        self.follow_bottom = false;
    }

    pub fn scroll_up(&mut self, lines: u16) {
        self.message_scroll = self.message_scroll.saturating_sub(lines);
        self.follow_bottom = false;
    }

    /// Hand the active draft to the controller if it may be sent
    pub fn submit_input(&mut self) -> Result<bool> {
        match self.input.submit(self.view.sending) {
            Some(outbound) => {
                self.follow_bottom = true;
                self.dispatch(Intent::Send(outbound))?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn mark_copied(&mut self, message_id: &str) {
        self.copied = Some((message_id.to_string(), COPIED_TICKS));
    }

    pub fn is_copied(&self, message_id: &str) -> bool {
        self.copied.as_ref().map(|(id, _)| id == message_id).unwrap_or(false)
    }

    /// Dismiss the most recent toast
    pub fn dismiss_latest(&mut self) -> Result<()> {
        match self.view.notifications.last() {
            Some(n) => self.dispatch(Intent::Dismiss(n.id)),
            None => Ok(()),
        }
    }

    /// Tick animation frame and age toasts (called by Tick event)
    pub fn tick(&mut self) -> Result<()> {
        if self.view.sending {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }

        if let Some((_, ticks)) = self.copied.as_mut() {
            *ticks = ticks.saturating_sub(1);
            if *ticks == 0 {
                self.copied = None;
            }
        }

        let mut expired = Vec::new();
        for n in &self.view.notifications {
            let age = self.toast_ages.entry(n.id).or_insert(0);
            *age += 1;
            if *age == TOAST_TICKS {
                expired.push(n.id);
            }
        }
        for id in expired {
            self.dispatch(Intent::Dismiss(id))?;
        }
        Ok(())
    }
}
