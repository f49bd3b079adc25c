//! Session/message state machine behind the chat screen.
//!
//! The controller is the single owner of chat state. Every backend failure
//! is caught here and turned into a notification; nothing propagates past
//! it. After each mutation the authoritative state is fetched again instead
//! of patching local copies.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use crate::api::{ApiError, ApiResult, ChatBackend};
use crate::input::Outbound;
use crate::model::{ContentType, Message, Session};

/// Notifications kept on screen at once; older ones are dropped
const MAX_NOTIFICATIONS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    LoadingSessions,
    Ready,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub id: u64,
    pub level: NoticeLevel,
    pub title: String,
    pub description: String,
}

/// Snapshot of everything the chat screen renders
#[derive(Debug, Clone, Default)]
pub struct ChatView {
    pub phase: Phase,
    pub sessions: Vec<Session>,
    pub active_session_id: Option<String>,
    pub messages: Vec<Message>,
    pub sending: bool,
    pub sidebar_open: bool,
    pub notifications: Vec<Notification>,
}

impl ChatView {
    pub fn active_session(&self) -> Option<&Session> {
        let id = self.active_session_id.as_deref()?;
        self.sessions.iter().find(|s| s.id == id)
    }

    pub fn is_active(&self, session_id: &str) -> bool {
        self.active_session_id.as_deref() == Some(session_id)
    }
}

/// User actions forwarded from the UI
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Load,
    SelectSession(String),
    NewSession,
    DeleteSession(String),
    Send(Outbound),
    Download(String),
    SetSidebarOpen(bool),
    Dismiss(u64),
}

pub struct ChatController {
    backend: Arc<dyn ChatBackend>,
    default_title: String,
    download_dir: PathBuf,
    view: ChatView,
    next_notice_id: u64,
    publisher: Option<mpsc::UnboundedSender<ChatView>>,
}

impl ChatController {
    pub fn new(backend: Arc<dyn ChatBackend>, default_title: &str, download_dir: PathBuf) -> Self {
        Self {
            backend,
            default_title: default_title.to_string(),
            download_dir,
            view: ChatView::default(),
            next_notice_id: 1,
            publisher: None,
        }
    }

    pub fn view(&self) -> &ChatView {
        &self.view
    }

    fn publish(&self) {
        if let Some(tx) = &self.publisher {
            if tx.send(self.view.clone()).is_err() {
                tracing::debug!("view channel closed");
            }
        }
    }

    pub async fn handle(&mut self, intent: Intent) {
        tracing::debug!(?intent, "handling intent");
        match intent {
            Intent::Load => self.load().await,
            Intent::SelectSession(id) => self.select_session(&id).await,
            Intent::NewSession => {
                self.new_session().await;
            }
            Intent::DeleteSession(id) => {
                self.delete_session(&id).await;
            }
            Intent::Send(outbound) => {
                self.send_message(&outbound.content, outbound.content_type).await;
            }
            Intent::Download(id) => {
                self.download(&id).await;
            }
            Intent::SetSidebarOpen(open) => self.set_sidebar_open(open),
            Intent::Dismiss(id) => self.dismiss(id),
        }
    }

    /// Initial load: fetch sessions, pick the first if none is active
    pub async fn load(&mut self) {
        self.view.phase = Phase::LoadingSessions;
        self.publish();

        match self.backend.list_sessions().await {
            Ok(sessions) => {
                self.view.sessions = sessions;
                self.reconcile_active();
                self.load_active_messages().await;
            }
            Err(e) => {
                self.view.sessions = Vec::new();
                self.view.active_session_id = None;
                self.view.messages = Vec::new();
                self.notify_error(
                    "Could not load conversations",
                    "Something went wrong while loading the conversation list",
                    &e,
                );
            }
        }

        self.view.phase = Phase::Ready;
        self.publish();
    }

    pub async fn select_session(&mut self, session_id: &str) {
        if !self.view.sessions.iter().any(|s| s.id == session_id) {
            tracing::warn!(session_id, "ignoring selection of unknown session");
            return;
        }

        if !self.view.is_active(session_id) {
            self.view.active_session_id = Some(session_id.to_string());
            self.view.messages = Vec::new();
        }
        self.view.sidebar_open = false;
        self.publish();

        self.load_active_messages().await;
    }

    /// Send one message and wait for the assistant's reply.
    ///
    /// Without an active session a new one is created first and the same
    /// content is sent to it. Returns false when the send was rejected or
    /// failed.
    pub async fn send_message(&mut self, content: &str, content_type: ContentType) -> bool {
        if self.view.sending {
            tracing::debug!("send rejected: another send is in flight");
            return false;
        }
        let content = content.trim();
        if content.is_empty() {
            return false;
        }

        self.view.sending = true;
        self.publish();

        let result = self.send_inner(content, content_type).await;
        self.view.sending = false;

        let ok = match result {
            Ok(()) => {
                let (title, description) = match content_type {
                    ContentType::Image => ("Image created", "The AI generated an image for your prompt"),
                    ContentType::Text => ("Message sent", "The AI has replied to your message"),
                };
                self.notify_info(title, description);
                true
            }
            Err(e) => {
                self.notify_error(
                    "Could not send message",
                    "Something went wrong while sending. Please try again.",
                    &e,
                );
                false
            }
        };
        self.publish();
        ok
    }

    async fn send_inner(&mut self, content: &str, content_type: ContentType) -> ApiResult<()> {
        let session_id = match self.view.active_session_id.clone() {
            Some(id) => id,
            None => {
                let session = self.backend.create_session(&self.default_title).await?;
                tracing::info!(session_id = %session.id, "created session for first message");
                self.view.sessions = self.backend.list_sessions().await?;
                self.activate(&session.id);
                self.publish();
                session.id
            }
        };

        self.backend
            .send_message(&session_id, content, content_type)
            .await?;

        // Pick up both turns plus any title/timestamp the server derived
        let messages = self.backend.list_messages(&session_id).await?;
        if self.view.is_active(&session_id) {
            self.view.messages = messages;
        }
        self.view.sessions = self.backend.list_sessions().await?;
        if self.reconcile_active() {
            self.load_active_messages().await;
        }
        Ok(())
    }

    pub async fn new_session(&mut self) -> bool {
        let result = async {
            let session = self.backend.create_session(&self.default_title).await?;
            let sessions = self.backend.list_sessions().await?;
            Ok::<_, ApiError>((session, sessions))
        }
        .await;

        match result {
            Ok((session, sessions)) => {
                self.view.sessions = sessions;
                self.activate(&session.id);
                self.view.messages = Vec::new();
                self.view.sidebar_open = false;
                self.notify_info(
                    "New conversation started",
                    "You can start chatting with the AI assistant",
                );
                self.publish();
                true
            }
            Err(e) => {
                self.notify_error(
                    "Could not create conversation",
                    "Something went wrong while creating a new conversation",
                    &e,
                );
                self.publish();
                false
            }
        }
    }

    /// Delete a session; the last remaining one can never be deleted
    pub async fn delete_session(&mut self, session_id: &str) -> bool {
        if self.view.sessions.len() <= 1 {
            self.notify(
                NoticeLevel::Error,
                "Cannot delete",
                "At least one conversation must remain",
            );
            self.publish();
            return false;
        }

        if let Err(e) = self.backend.delete_session(session_id).await {
            self.notify_error(
                "Could not delete",
                "Something went wrong while deleting the conversation",
                &e,
            );
            self.publish();
            return false;
        }

        match self.backend.list_sessions().await {
            Ok(sessions) => self.view.sessions = sessions,
            Err(e) => {
                tracing::warn!(error = %e, "session reload after delete failed");
                self.view.sessions = self
                    .view
                    .sessions
                    .iter()
                    .filter(|s| s.id != session_id)
                    .cloned()
                    .collect();
            }
        }

        if self.reconcile_active() {
            self.load_active_messages().await;
        }
        self.notify_info("Conversation deleted", "The conversation was deleted");
        self.publish();
        true
    }

    /// Save a displayed message through the backend's download path
    pub async fn download(&mut self, message_id: &str) -> Option<PathBuf> {
        let Some(message) = self.view.messages.iter().find(|m| m.id == message_id).cloned() else {
            self.notify(
                NoticeLevel::Error,
                "Download failed",
                "That message is no longer on screen",
            );
            self.publish();
            return None;
        };

        let result = async {
            let bytes = self.backend.download(&message.id).await?;
            let path = self.download_dir.join(message.download_filename());
            tokio::fs::create_dir_all(&self.download_dir).await?;
            tokio::fs::write(&path, bytes).await?;
            Ok::<_, anyhow::Error>(path)
        }
        .await;

        let saved = match result {
            Ok(path) => {
                let kind = if message.is_image() { "Image" } else { "Text" };
                self.notify_info(
                    "Download complete",
                    &format!("{} file saved to {}", kind, path.display()),
                );
                Some(path)
            }
            Err(e) => {
                tracing::warn!(error = %e, message_id, "download failed");
                self.notify(NoticeLevel::Error, "Download failed", &e.to_string());
                None
            }
        };
        self.publish();
        saved
    }

    pub fn set_sidebar_open(&mut self, open: bool) {
        self.view.sidebar_open = open;
    }

    pub fn dismiss(&mut self, notification_id: u64) {
        self.view.notifications = self
            .view
            .notifications
            .iter()
            .filter(|n| n.id != notification_id)
            .cloned()
            .collect();
    }

    fn activate(&mut self, session_id: &str) {
        if self.view.sessions.iter().any(|s| s.id == session_id) {
            self.view.active_session_id = Some(session_id.to_string());
        } else {
            tracing::warn!(session_id, "session missing from reloaded list");
            self.reconcile_active();
        }
    }

    /// Keep the active id pointing into the session list.
    ///
    /// Falls back to the first session (or none). Returns true when the
    /// active session changed, in which case the message list was cleared.
    fn reconcile_active(&mut self) -> bool {
        let present = self
            .view
            .active_session_id
            .as_deref()
            .map(|id| self.view.sessions.iter().any(|s| s.id == id))
            .unwrap_or(false);
        if present {
            return false;
        }

        let next = self.view.sessions.first().map(|s| s.id.clone());
        let changed = next != self.view.active_session_id;
        self.view.active_session_id = next;
        self.view.messages = Vec::new();
        changed
    }

    async fn load_active_messages(&mut self) {
        let Some(session_id) = self.view.active_session_id.clone() else {
            return;
        };
        match self.backend.list_messages(&session_id).await {
            Ok(messages) => {
                // The active session may have moved on while we waited
                if self.view.is_active(&session_id) {
                    self.view.messages = messages;
                }
            }
            Err(e) => self.notify_error(
                "Could not load messages",
                "Something went wrong while loading the conversation",
                &e,
            ),
        }
    }

    fn notify_info(&mut self, title: &str, description: &str) {
        self.notify(NoticeLevel::Info, title, description);
    }

    fn notify_error(&mut self, title: &str, description: &str, error: &ApiError) {
        tracing::warn!(%error, "{}", title);
        self.notify(NoticeLevel::Error, title, description);
    }

    fn notify(&mut self, level: NoticeLevel, title: &str, description: &str) {
        let notification = Notification {
            id: self.next_notice_id,
            level,
            title: title.to_string(),
            description: description.to_string(),
        };
        self.next_notice_id += 1;

        let skip = (self.view.notifications.len() + 1).saturating_sub(MAX_NOTIFICATIONS);
        self.view.notifications = self
            .view
            .notifications
            .iter()
            .skip(skip)
            .cloned()
            .chain(std::iter::once(notification))
            .collect();
    }
}

impl Intent {
    /// Intents that touch only on-screen state and never wait on the backend
    pub fn is_local(&self) -> bool {
        matches!(self, Intent::SetSidebarOpen(_) | Intent::Dismiss(_))
    }
}

/// Local intents that arrived while a backend call held the controller.
///
/// They are laid over every snapshot published in the meantime and
/// replayed on the controller once the call finishes.
#[derive(Debug, Default)]
struct Deferred {
    sidebar_open: Option<bool>,
    dismissed: Vec<u64>,
}

impl Deferred {
    fn absorb(&mut self, intent: Intent) {
        match intent {
            Intent::SetSidebarOpen(open) => self.sidebar_open = Some(open),
            Intent::Dismiss(id) => self.dismissed.push(id),
            other => tracing::warn!(intent = ?other, "not a local intent"),
        }
    }

    fn overlay(&self, view: &mut ChatView) {
        if let Some(open) = self.sidebar_open {
            view.sidebar_open = open;
        }
        view.notifications.retain(|n| !self.dismissed.contains(&n.id));
    }

    fn replay(self, controller: &mut ChatController) {
        if let Some(open) = self.sidebar_open {
            controller.set_sidebar_open(open);
        }
        for id in self.dismissed {
            controller.dismiss(id);
        }
    }
}

/// Channels connecting the UI to a running controller
pub struct ControllerHandle {
    pub intents: mpsc::UnboundedSender<Intent>,
    pub view: watch::Receiver<ChatView>,
}

/// Run the controller on its own task.
///
/// Backend intents are handled one at a time in arrival order. Local
/// intents (sidebar, dismiss) show up in the view immediately, even while
/// a send or another backend call is in flight.
pub fn spawn(mut controller: ChatController) -> ControllerHandle {
    let (view_tx, view_rx) = watch::channel(controller.view.clone());
    let (snapshot_tx, mut snapshot_rx) = mpsc::unbounded_channel();
    controller.publisher = Some(snapshot_tx);

    let (intent_tx, mut intent_rx) = mpsc::unbounded_channel::<Intent>();
    tokio::spawn(async move {
        let mut queued: VecDeque<Intent> = VecDeque::new();

        loop {
            let intent = match queued.pop_front() {
                Some(intent) => intent,
                None => match intent_rx.recv().await {
                    Some(intent) => intent,
                    None => break,
                },
            };

            if intent.is_local() {
                controller.handle(intent).await;
                view_tx.send_replace(controller.view.clone());
                continue;
            }

            let mut deferred = Deferred::default();
            {
                let call = controller.handle(intent);
                tokio::pin!(call);
                loop {
                    tokio::select! {
                        _ = &mut call => break,
                        Some(mut view) = snapshot_rx.recv() => {
                            deferred.overlay(&mut view);
                            view_tx.send_replace(view);
                        }
                        Some(next) = intent_rx.recv() => {
                            if next.is_local() {
                                deferred.absorb(next);
                                view_tx.send_modify(|view| deferred.overlay(view));
                            } else {
                                queued.push_back(next);
                            }
                        }
                    }
                }
            }

            // The final state is published below
            while snapshot_rx.try_recv().is_ok() {}
            deferred.replay(&mut controller);
            view_tx.send_replace(controller.view.clone());
        }
        tracing::debug!("intent channel closed, controller stopping");
    });

    ControllerHandle {
        intents: intent_tx,
        view: view_rx,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockBackend;
    use crate::model::Role;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::Notify;

    const DEFAULT: &str = "New conversation";

    /// Wraps the mock backend and records every call made through it
    struct Recording {
        inner: MockBackend,
        calls: Mutex<Vec<&'static str>>,
        fail_lists: AtomicBool,
        fail_sends: AtomicBool,
        send_gate: Option<Arc<Notify>>,
    }

    impl Recording {
        fn build(inner: MockBackend, send_gate: Option<Arc<Notify>>) -> Arc<Self> {
            Arc::new(Self {
                inner,
                calls: Mutex::new(Vec::new()),
                fail_lists: AtomicBool::new(false),
                fail_sends: AtomicBool::new(false),
                send_gate,
            })
        }

        fn new(inner: MockBackend) -> Arc<Self> {
            Self::build(inner, None)
        }

        fn failing() -> Arc<Self> {
            let backend = Self::new(MockBackend::new(DEFAULT));
            backend.fail_lists.store(true, Ordering::SeqCst);
            backend
        }

        /// Sends block until the returned gate is notified
        fn gated(inner: MockBackend) -> (Arc<Self>, Arc<Notify>) {
            let gate = Arc::new(Notify::new());
            (Self::build(inner, Some(gate.clone())), gate)
        }

        fn record(&self, call: &'static str) {
            self.calls.lock().unwrap().push(call);
        }

        fn count(&self, call: &str) -> usize {
            self.calls.lock().unwrap().iter().filter(|c| **c == call).count()
        }

        fn total(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    fn server_error() -> ApiError {
        ApiError::Status { status: 500, body: "boom".to_string() }
    }

    #[async_trait]
    impl ChatBackend for Recording {
        async fn list_sessions(&self) -> ApiResult<Vec<Session>> {
            self.record("list_sessions");
            if self.fail_lists.load(Ordering::SeqCst) {
                return Err(server_error());
            }
            self.inner.list_sessions().await
        }
        async fn create_session(&self, title: &str) -> ApiResult<Session> {
            self.record("create_session");
            self.inner.create_session(title).await
        }
        async fn delete_session(&self, session_id: &str) -> ApiResult<()> {
            self.record("delete_session");
            self.inner.delete_session(session_id).await
        }
        async fn list_messages(&self, session_id: &str) -> ApiResult<Vec<Message>> {
            self.record("list_messages");
            self.inner.list_messages(session_id).await
        }
        async fn send_message(
            &self,
            session_id: &str,
            content: &str,
            content_type: ContentType,
        ) -> ApiResult<Message> {
            self.record("send_message");
            if let Some(gate) = &self.send_gate {
                gate.notified().await;
            }
            if self.fail_sends.load(Ordering::SeqCst) {
                return Err(server_error());
            }
            self.inner.send_message(session_id, content, content_type).await
        }
        async fn download(&self, message_id: &str) -> ApiResult<Vec<u8>> {
            self.record("download");
            self.inner.download(message_id).await
        }
        async fn ping(&self) -> ApiResult<String> {
            self.inner.ping().await
        }
    }

    fn controller(backend: Arc<Recording>) -> ChatController {
        ChatController::new(backend, DEFAULT, std::env::temp_dir())
    }

    fn assert_single_active(view: &ChatView) {
        let active: Vec<&Session> = view.sessions.iter().filter(|s| view.is_active(&s.id)).collect();
        assert!(active.len() <= 1);
        if !view.sessions.is_empty() {
            assert_eq!(active.len(), 1);
        }
    }

    #[tokio::test]
    async fn test_load_selects_first_session() {
        let backend = Recording::new(MockBackend::seeded(DEFAULT));
        let mut ctl = controller(backend);
        ctl.load().await;

        let view = ctl.view();
        assert_eq!(view.phase, Phase::Ready);
        assert_eq!(view.active_session_id.as_deref(), Some("2"));
        assert_eq!(view.messages.len(), 2);
        assert!(view.messages.iter().all(|m| m.session_id == "2"));
        assert_single_active(view);
    }

    #[tokio::test]
    async fn test_load_failure_notifies_and_is_ready() {
        let backend = Recording::failing();
        let mut ctl = controller(backend);
        ctl.load().await;

        let view = ctl.view();
        assert_eq!(view.phase, Phase::Ready);
        assert!(view.sessions.is_empty());
        assert_eq!(view.active_session_id, None);
        assert_eq!(view.notifications.len(), 1);
        assert_eq!(view.notifications[0].level, NoticeLevel::Error);
    }

    #[tokio::test]
    async fn test_select_replaces_messages() {
        let backend = Recording::new(MockBackend::seeded(DEFAULT));
        let mut ctl = controller(backend);
        ctl.load().await;
        ctl.set_sidebar_open(true);

        ctl.select_session("1").await;
        let view = ctl.view();
        assert_eq!(view.active_session_id.as_deref(), Some("1"));
        assert!(view.messages.iter().all(|m| m.session_id == "1"));
        assert!(!view.sidebar_open);
        assert_single_active(view);
    }

    #[tokio::test]
    async fn test_select_unknown_session_is_ignored() {
        let backend = Recording::new(MockBackend::seeded(DEFAULT));
        let mut ctl = controller(backend.clone());
        ctl.load().await;
        let calls = backend.total();

        ctl.select_session("nope").await;
        assert_eq!(ctl.view().active_session_id.as_deref(), Some("2"));
        assert_eq!(backend.total(), calls);
    }

    #[tokio::test]
    async fn test_delete_active_then_last_is_rejected() {
        let backend = Recording::new(MockBackend::seeded(DEFAULT));
        let mut ctl = controller(backend.clone());
        ctl.load().await;
        ctl.select_session("1").await;

        assert!(ctl.delete_session("1").await);
        assert_eq!(ctl.view().active_session_id.as_deref(), Some("2"));
        assert!(ctl.view().messages.iter().all(|m| m.session_id == "2"));
        assert!(!ctl.view().messages.is_empty());

        let calls = backend.total();
        let sessions_before = ctl.view().sessions.clone();
        assert!(!ctl.delete_session("2").await);
        assert_eq!(backend.total(), calls);
        assert_eq!(ctl.view().sessions, sessions_before);
        assert_eq!(ctl.view().active_session_id.as_deref(), Some("2"));
        let last = ctl.view().notifications.last().unwrap();
        assert_eq!(last.level, NoticeLevel::Error);
        assert_eq!(last.title, "Cannot delete");
    }

    #[tokio::test]
    async fn test_delete_inactive_keeps_active() {
        let backend = Recording::new(MockBackend::seeded(DEFAULT));
        let mut ctl = controller(backend);
        ctl.load().await;
        let messages = ctl.view().messages.clone();

        assert!(ctl.delete_session("1").await);
        assert_eq!(ctl.view().active_session_id.as_deref(), Some("2"));
        assert_eq!(ctl.view().messages, messages);
        assert_eq!(ctl.view().sessions.len(), 1);
    }

    #[tokio::test]
    async fn test_send_without_session_creates_one() {
        let backend = Recording::new(MockBackend::new(DEFAULT));
        let mut ctl = controller(backend.clone());
        ctl.load().await;
        assert_eq!(ctl.view().active_session_id, None);

        assert!(ctl.send_message("hello", ContentType::Text).await);

        assert_eq!(backend.count("create_session"), 1);
        assert_eq!(backend.count("send_message"), 1);
        let view = ctl.view();
        assert_eq!(view.sessions.len(), 1);
        assert_eq!(view.active_session_id.as_deref(), Some(view.sessions[0].id.as_str()));
        assert_eq!(view.sessions[0].title, "hello");
        let roles: Vec<Role> = view.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant]);
        assert!(view.messages.iter().all(|m| m.session_id == view.sessions[0].id));
        assert!(!view.sending);
    }

    #[tokio::test]
    async fn test_send_refetches_messages_and_sessions() {
        let backend = Recording::new(MockBackend::seeded(DEFAULT));
        let mut ctl = controller(backend.clone());
        ctl.load().await;
        let lists_before = backend.count("list_sessions");

        assert!(ctl.send_message("  draw a cat  ", ContentType::Image).await);
        assert_eq!(backend.count("list_sessions"), lists_before + 1);
        let view = ctl.view();
        assert_eq!(view.messages.len(), 4);
        assert_eq!(view.messages[2].content, "draw a cat");
        assert!(view.messages[3].is_image());
        assert_eq!(view.notifications.last().unwrap().title, "Image created");
    }

    #[tokio::test]
    async fn test_blank_send_is_noop() {
        let backend = Recording::new(MockBackend::seeded(DEFAULT));
        let mut ctl = controller(backend.clone());
        ctl.load().await;
        let calls = backend.total();

        assert!(!ctl.send_message("   ", ContentType::Text).await);
        assert_eq!(backend.total(), calls);
    }

    #[tokio::test]
    async fn test_send_rejected_while_sending() {
        let backend = Recording::new(MockBackend::seeded(DEFAULT));
        let mut ctl = controller(backend.clone());
        ctl.load().await;
        ctl.view.sending = true;

        assert!(!ctl.send_message("hi", ContentType::Text).await);
        assert_eq!(backend.count("send_message"), 0);
    }

    #[tokio::test]
    async fn test_new_session_becomes_active() {
        let backend = Recording::new(MockBackend::seeded(DEFAULT));
        let mut ctl = controller(backend);
        ctl.load().await;
        ctl.set_sidebar_open(true);

        assert!(ctl.new_session().await);
        let view = ctl.view();
        assert_eq!(view.sessions.len(), 3);
        assert_eq!(view.active_session().unwrap().title, DEFAULT);
        assert!(view.messages.is_empty());
        assert!(!view.sidebar_open);
        assert_single_active(view);
    }

    #[tokio::test]
    async fn test_download_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Recording::new(MockBackend::seeded(DEFAULT));
        let mut ctl = ChatController::new(backend.clone(), DEFAULT, dir.path().to_path_buf());
        ctl.load().await;
        ctl.select_session("1").await;

        let path = ctl.download("1").await.unwrap();
        assert_eq!(path, dir.path().join("message-1.txt"));
        assert_eq!(std::fs::read_to_string(path).unwrap(), "Explain artificial intelligence");
        assert_eq!(backend.count("download"), 1);

        assert!(ctl.download("missing").await.is_none());
        assert_eq!(backend.count("download"), 1);
    }

    #[tokio::test]
    async fn test_notifications_are_capped_and_dismissable() {
        let backend = Recording::new(MockBackend::new(DEFAULT));
        let mut ctl = controller(backend);
        for _ in 0..(MAX_NOTIFICATIONS + 2) {
            ctl.delete_session("x").await;
        }
        assert_eq!(ctl.view().notifications.len(), MAX_NOTIFICATIONS);
        let first = ctl.view().notifications[0].id;
        assert_eq!(first, 3);

        ctl.dismiss(first);
        assert!(ctl.view().notifications.iter().all(|n| n.id != first));
    }

    #[tokio::test]
    async fn test_spawned_controller_publishes_views() {
        let backend = Recording::new(MockBackend::seeded(DEFAULT));
        let mut handle = spawn(controller(backend));
        handle.intents.send(Intent::Load).unwrap();

        loop {
            handle.view.changed().await.unwrap();
            let view = handle.view.borrow_and_update().clone();
            if view.phase == Phase::Ready {
                assert_eq!(view.active_session_id.as_deref(), Some("2"));
                break;
            }
        }
    }
    #[tokio::test]
    async fn test_failed_send_notifies_and_keeps_created_session() {
        let backend = Recording::new(MockBackend::new(DEFAULT));
        backend.fail_sends.store(true, Ordering::SeqCst);
        let mut ctl = controller(backend.clone());
        ctl.load().await;

        assert!(!ctl.send_message("hello", ContentType::Text).await);

        let view = ctl.view();
        assert!(!view.sending);
        assert_eq!(backend.count("create_session"), 1);
        assert_eq!(view.sessions.len(), 1);
        assert_eq!(view.active_session_id.as_deref(), Some(view.sessions[0].id.as_str()));
        let last = view.notifications.last().unwrap();
        assert_eq!(last.level, NoticeLevel::Error);
        assert_eq!(last.title, "Could not send message");

        // The composer may send again once the error is shown
        backend.fail_sends.store(false, Ordering::SeqCst);
        assert!(ctl.send_message("hello", ContentType::Text).await);
        assert_eq!(ctl.view().messages.len(), 2);
    }

    #[tokio::test]
    async fn test_delete_falls_back_when_reload_fails() {
        let backend = Recording::new(MockBackend::seeded(DEFAULT));
        let mut ctl = controller(backend.clone());
        ctl.load().await;
        ctl.select_session("1").await;
        backend.fail_lists.store(true, Ordering::SeqCst);

        assert!(ctl.delete_session("1").await);

        let view = ctl.view();
        let ids: Vec<&str> = view.sessions.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["2"]);
        assert_eq!(view.active_session_id.as_deref(), Some("2"));
        assert!(view.messages.iter().all(|m| m.session_id == "2"));
        assert_eq!(view.notifications.last().unwrap().title, "Conversation deleted");
        assert_single_active(view);
    }

    async fn wait_for(
        views: &mut watch::Receiver<ChatView>,
        ready: impl Fn(&ChatView) -> bool,
    ) -> ChatView {
        let wait = async {
            loop {
                {
                    let view = views.borrow_and_update();
                    if ready(&view) {
                        return view.clone();
                    }
                }
                views.changed().await.unwrap();
            }
        };
        tokio::time::timeout(Duration::from_secs(2), wait)
            .await
            .expect("view never reached the expected state")
    }

    #[tokio::test]
    async fn test_local_intents_apply_while_send_is_in_flight() {
        let (backend, gate) = Recording::gated(MockBackend::seeded(DEFAULT));
        let mut handle = spawn(controller(backend.clone()));
        handle.intents.send(Intent::Load).unwrap();
        handle
            .intents
            .send(Intent::Send(Outbound {
                content: "a fox".to_string(),
                content_type: ContentType::Image,
            }))
            .unwrap();
        wait_for(&mut handle.view, |v| v.sending).await;

        handle.intents.send(Intent::SetSidebarOpen(true)).unwrap();
        handle.intents.send(Intent::SelectSession("1".to_string())).unwrap();

        let view = wait_for(&mut handle.view, |v| v.sidebar_open).await;
        assert!(view.sending);
        assert_eq!(view.active_session_id.as_deref(), Some("2"));

        gate.notify_one();
        let view = wait_for(&mut handle.view, |v| {
            !v.sending && v.active_session_id.as_deref() == Some("1")
        })
        .await;
        assert_eq!(backend.count("send_message"), 1);
        assert!(view.messages.iter().all(|m| m.session_id == "1"));
        assert!(!view.sidebar_open);
        assert_eq!(
            view.notifications.iter().map(|n| n.title.as_str()).collect::<Vec<_>>(),
            vec!["Image created"]
        );
    }

    #[tokio::test]
    async fn test_dismiss_during_send_is_not_undone() {
        let (backend, gate) = Recording::gated(MockBackend::seeded(DEFAULT));
        let mut handle = spawn(controller(backend));
        handle.intents.send(Intent::Load).unwrap();
        // Deleting a missing id leaves an error toast without touching the list
        handle.intents.send(Intent::DeleteSession("x".to_string())).unwrap();
        let view = wait_for(&mut handle.view, |v| !v.notifications.is_empty()).await;
        let toast = view.notifications[0].id;

        handle.intents.send(Intent::Send(Outbound {
            content: "hi".to_string(),
            content_type: ContentType::Text,
        })).unwrap();
        wait_for(&mut handle.view, |v| v.sending).await;

        handle.intents.send(Intent::Dismiss(toast)).unwrap();
        wait_for(&mut handle.view, |v| v.sending && v.notifications.is_empty()).await;

        gate.notify_one();
        let view = wait_for(&mut handle.view, |v| !v.sending).await;
        assert!(view.notifications.iter().all(|n| n.id != toast));
    }
}
