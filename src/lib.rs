pub mod api;
pub mod app;
pub mod config;
pub mod controller;
pub mod handler;
pub mod input;
pub mod logging;
pub mod mock;
pub mod model;
pub mod tui;
pub mod ui;

// Re-export main types for convenience
pub use api::{ApiClient, ApiError, ChatBackend};
pub use config::Config;
pub use controller::{ChatController, ChatView, Intent, NoticeLevel, Notification};
pub use mock::MockBackend;
pub use model::{ContentType, Message, Role, Session};
