use crate::models::{Message, Sender};

/// Ordered, append-only list of displayed messages plus the typing flag.
#[derive(Debug, Default, Clone)]
pub struct Transcript {
    messages: Vec<Message>,
    typing: bool,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the user's text and raises the typing flag.
    pub fn push_user(&mut self, text: impl Into<String>) -> &Message {
        self.typing = true;
        self.push(Sender::User, text.into())
    }

    pub fn push_bot(&mut self, text: impl Into<String>) -> &Message {
        self.typing = false;
        self.push(Sender::Bot, text.into())
    }

    /// Backend errors are shown as bot entries; they also end the wait.
    pub fn push_error(&mut self, content: &str) -> &Message {
        self.typing = false;
        self.push(Sender::Bot, format!("Error: {content}"))
    }

    fn push(&mut self, sender: Sender, text: String) -> &Message {
        let id = self.messages.len() as u64 + 1;
        self.messages.push(Message::new(id, sender, text));
        &self.messages[self.messages.len() - 1]
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn is_typing(&self) -> bool {
        self.typing
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
