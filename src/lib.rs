//! Embeddable chat widget core.
//!
//! Owns the conversation identity, the single backend channel and the
//! transcript. Hosts (the Leptos browser shell, the native terminal runner)
//! translate their socket and UI events into calls on [`ChatWidget`].

pub mod config;
pub mod connection;
pub mod errors;
pub mod models;
#[cfg(not(target_arch = "wasm32"))]
pub mod native;
pub mod session;
pub mod transcript;
pub mod widget;

pub use config::WidgetConfig;
pub use connection::{ChannelEvent, CloseKind, ConnectionState};
pub use errors::WidgetError;
pub use models::{Approval, ClientFrame, Message, Sender, ServerEvent};
pub use session::{ConversationId, KeyValueStore, MemoryStore};
pub use widget::{ApprovalPrompt, Channel, ChatWidget, ConnectRequest, Effect};
