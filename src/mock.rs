//! In-memory chat backend
//!
//! Stands in for the chat service when running offline. It keeps the same
//! contract as the HTTP service: a send stores both the user turn and the
//! reply, retitles a fresh session from its first message, and deleting a
//! session drops its messages.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand::seq::SliceRandom;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::api::{ApiError, ApiResult, ChatBackend};
use crate::model::{decode_png_data_url, derive_title, ContentType, Message, Role, Session};

const TEXT_REPLIES: &[&str] = &[
    "That's an interesting question! Based on my analysis...",
    "Let me explain that in detail...",
    "As I understand it, this can be seen as...",
    "Allow me to offer a broader perspective...",
];

const IMAGE_REPLIES: &[&str] = &[
    "https://images.unsplash.com/photo-1518837695005-2083093ee35b?w=800&h=600&fit=crop",
    "https://images.unsplash.com/photo-1441974231531-c6227db76b6e?w=800&h=600&fit=crop",
    "https://images.unsplash.com/photo-1506905925346-21bda4d32df4?w=800&h=600&fit=crop",
    "https://images.unsplash.com/photo-1470071459604-3b5ec3a7fe05?w=800&h=600&fit=crop",
];

/// Pick a canned reply for the requested content type
pub fn generate_reply(content_type: ContentType) -> String {
    let pool = match content_type {
        ContentType::Text => TEXT_REPLIES,
        ContentType::Image => IMAGE_REPLIES,
    };
    pool.choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or_default()
        .to_string()
}

#[derive(Default)]
struct MockStore {
    // Newest first, like the service's listing
    sessions: Vec<Session>,
    messages: Vec<Message>,
}

pub struct MockBackend {
    store: Mutex<MockStore>,
    default_title: String,
}

impl MockBackend {
    pub fn new(default_title: &str) -> Self {
        Self {
            store: Mutex::new(MockStore::default()),
            default_title: default_title.to_string(),
        }
    }

    /// A backend preloaded with two example conversations
    pub fn seeded(default_title: &str) -> Self {
        let base = Utc::now() - Duration::hours(2);
        let mut store = MockStore::default();

        let ai = seed_session(&mut store, "1", "Talking about AI", base);
        seed_message(&mut store, &ai, "1", Role::User, "Explain artificial intelligence", None, base);
        seed_message(
            &mut store,
            &ai,
            "2",
            Role::Assistant,
            "Artificial intelligence (AI) is a branch of computer science that builds systems able to \
             perform tasks that normally require human intelligence. It spans machine learning, \
             natural language processing, computer vision and robotics.",
            None,
            base + Duration::seconds(30),
        );

        let later = base + Duration::hours(1);
        let art = seed_session(&mut store, "2", "Making digital pictures", later);
        seed_message(
            &mut store,
            &art,
            "3",
            Role::User,
            "Draw a mountain landscape at sunset",
            None,
            later,
        );
        seed_message(
            &mut store,
            &art,
            "4",
            Role::Assistant,
            IMAGE_REPLIES[2],
            Some("mountain landscape at sunset"),
            later + Duration::seconds(30),
        );

        Self {
            store: Mutex::new(store),
            default_title: default_title.to_string(),
        }
    }

    fn new_id() -> String {
        Uuid::new_v4().to_string()
    }
}

fn seed_session(store: &mut MockStore, id: &str, title: &str, at: DateTime<Utc>) -> String {
    store.sessions.insert(
        0,
        Session {
            id: id.to_string(),
            title: title.to_string(),
            created_at: at,
            updated_at: Some(at),
        },
    );
    id.to_string()
}

fn seed_message(
    store: &mut MockStore,
    session_id: &str,
    id: &str,
    role: Role,
    content: &str,
    prompt: Option<&str>,
    at: DateTime<Utc>,
) {
    store.messages.push(Message {
        id: id.to_string(),
        session_id: session_id.to_string(),
        role,
        content: content.to_string(),
        content_type: if prompt.is_some() { ContentType::Image } else { ContentType::Text },
        prompt: prompt.map(str::to_string),
        timestamp: at,
    });
}

#[async_trait]
impl ChatBackend for MockBackend {
    async fn list_sessions(&self) -> ApiResult<Vec<Session>> {
        Ok(self.store.lock().await.sessions.clone())
    }

    async fn create_session(&self, title: &str) -> ApiResult<Session> {
        let now = Utc::now();
        let session = Session {
            id: Self::new_id(),
            title: title.to_string(),
            created_at: now,
            updated_at: Some(now),
        };
        self.store.lock().await.sessions.insert(0, session.clone());
        tracing::debug!(session_id = %session.id, "mock session created");
        Ok(session)
    }

    async fn delete_session(&self, session_id: &str) -> ApiResult<()> {
        let mut store = self.store.lock().await;
        let before = store.sessions.len();
        store.sessions.retain(|s| s.id != session_id);
        if store.sessions.len() == before {
            return Err(ApiError::NotFound(format!("session {} not found", session_id)));
        }
        store.messages.retain(|m| m.session_id != session_id);
        Ok(())
    }

    async fn list_messages(&self, session_id: &str) -> ApiResult<Vec<Message>> {
        let store = self.store.lock().await;
        Ok(store
            .messages
            .iter()
            .filter(|m| m.session_id == session_id)
            .cloned()
            .collect())
    }

    async fn send_message(
        &self,
        session_id: &str,
        content: &str,
        content_type: ContentType,
    ) -> ApiResult<Message> {
        let mut store = self.store.lock().await;
        let now = Utc::now();

        let position = store
            .sessions
            .iter()
            .position(|s| s.id == session_id)
            .ok_or_else(|| ApiError::NotFound(format!("session {} not found", session_id)))?;

        store.messages.push(Message {
            id: Self::new_id(),
            session_id: session_id.to_string(),
            role: Role::User,
            content: content.to_string(),
            content_type: ContentType::Text,
            prompt: None,
            timestamp: now,
        });

        let reply = Message {
            id: Self::new_id(),
            session_id: session_id.to_string(),
            role: Role::Assistant,
            content: generate_reply(content_type),
            content_type,
            prompt: (content_type == ContentType::Image).then(|| content.to_string()),
            timestamp: now,
        };
        store.messages.push(reply.clone());

        let mut session = store.sessions.remove(position);
        session.updated_at = Some(now);
        if session.title == self.default_title {
            session.title = derive_title(content);
        }
        store.sessions.insert(0, session);

        Ok(reply)
    }

    async fn download(&self, message_id: &str) -> ApiResult<Vec<u8>> {
        let store = self.store.lock().await;
        let message = store
            .messages
            .iter()
            .find(|m| m.id == message_id)
            .ok_or_else(|| ApiError::NotFound(format!("message {} not found", message_id)))?;

        Ok(decode_png_data_url(&message.content).unwrap_or_else(|| message.content.clone().into_bytes()))
    }

    async fn ping(&self) -> ApiResult<String> {
        Ok("Mock chat backend is running".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFAULT: &str = "New conversation";

    #[tokio::test]
    async fn test_seeded_sessions_newest_first() {
        let backend = MockBackend::seeded(DEFAULT);
        let sessions = backend.list_sessions().await.unwrap();
        let ids: Vec<&str> = sessions.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["2", "1"]);

        let messages = backend.list_messages("2").await.unwrap();
        assert_eq!(messages.len(), 2);
        assert!(messages[1].is_image());
    }

    #[tokio::test]
    async fn test_send_stores_both_turns_and_retitles() {
        let backend = MockBackend::new(DEFAULT);
        let session = backend.create_session(DEFAULT).await.unwrap();

        let reply = backend
            .send_message(&session.id, "hello there", ContentType::Text)
            .await
            .unwrap();
        assert_eq!(reply.role, Role::Assistant);
        assert!(TEXT_REPLIES.contains(&reply.content.as_str()));

        let messages = backend.list_messages(&session.id).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[0].content, "hello there");

        let sessions = backend.list_sessions().await.unwrap();
        assert_eq!(sessions[0].title, "hello there");
    }

    #[tokio::test]
    async fn test_custom_title_is_kept() {
        let backend = MockBackend::new(DEFAULT);
        let session = backend.create_session("Recipes").await.unwrap();
        backend
            .send_message(&session.id, "soup ideas", ContentType::Text)
            .await
            .unwrap();
        assert_eq!(backend.list_sessions().await.unwrap()[0].title, "Recipes");
    }

    #[tokio::test]
    async fn test_image_reply_carries_prompt() {
        let backend = MockBackend::new(DEFAULT);
        let session = backend.create_session(DEFAULT).await.unwrap();
        let reply = backend
            .send_message(&session.id, "a lighthouse", ContentType::Image)
            .await
            .unwrap();
        assert!(reply.is_image());
        assert_eq!(reply.prompt.as_deref(), Some("a lighthouse"));
    }

    #[tokio::test]
    async fn test_delete_cascades_messages() {
        let backend = MockBackend::seeded(DEFAULT);
        backend.delete_session("1").await.unwrap();
        assert!(backend.list_messages("1").await.unwrap().is_empty());
        assert!(matches!(
            backend.delete_session("1").await,
            Err(ApiError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_send_to_unknown_session_fails() {
        let backend = MockBackend::new(DEFAULT);
        let result = backend.send_message("nope", "hi", ContentType::Text).await;
        assert!(matches!(result, Err(ApiError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_download_text_bytes() {
        let backend = MockBackend::seeded(DEFAULT);
        let bytes = backend.download("1").await.unwrap();
        assert_eq!(bytes, b"Explain artificial intelligence".to_vec());
        assert!(backend.download("missing").await.is_err());
    }
}
