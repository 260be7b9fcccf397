use tracing::{debug, error, info, warn};

use crate::config::WidgetConfig;
use crate::connection::{
    ABNORMAL_CLOSURE, ChannelEvent, CloseAction, ConnectionState, Lifecycle,
};
use crate::errors::WidgetError;
use crate::models::{Approval, ClientFrame, Message, ServerEvent};
use crate::session::{self, ConversationId, KeyValueStore};
use crate::transcript::Transcript;

/// An open bidirectional text channel to the backend, owned by one widget.
pub trait Channel {
    fn send_text(&self, frame: &str) -> Result<(), WidgetError>;
    /// Requests a normal (1000) close.
    fn close(&self);
}

/// Asks the human operator to approve a server-initiated action.
#[allow(async_fn_in_trait)]
pub trait ApprovalPrompt {
    async fn decide(&mut self, description: &str) -> Approval;
}

/// Instruction to the host: open a channel to `url`, tagging its events with `generation`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    pub url: String,
    pub generation: u64,
}

/// Observable result of feeding an event to the widget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Idle,
    TranscriptChanged,
    ApprovalRequested(String),
    ApprovalSent(Approval),
    ScheduleReconnect { delay: std::time::Duration, generation: u64 },
}

/// The chat widget: session identity, one channel, the transcript.
pub struct ChatWidget<C: Channel, S: KeyValueStore> {
    config: WidgetConfig,
    store: S,
    conversation_id: Option<ConversationId>,
    panel_open: bool,
    transcript: Transcript,
    lifecycle: Lifecycle,
    channel: Option<C>,
    pending_approval: Option<String>,
}

impl<C: Channel, S: KeyValueStore> ChatWidget<C, S> {
    pub fn new(config: WidgetConfig, store: S) -> Self {
        let lifecycle = Lifecycle::new(config.reconnect_delay);
        Self {
            config,
            store,
            conversation_id: None,
            panel_open: false,
            transcript: Transcript::new(),
            lifecycle,
            channel: None,
            pending_approval: None,
        }
    }

    // ── Session identity ─────────────────────────────────────────────────────

    /// Loads or creates the conversation identifier. Idempotent.
    pub fn activate(&mut self) -> Result<&ConversationId, WidgetError> {
        if self.conversation_id.is_none() {
            let id = session::load_or_create(&mut self.store, &self.config.storage_key)?;
            self.conversation_id = Some(id);
        }
        match &self.conversation_id {
            Some(id) => Ok(id),
            None => Err(WidgetError::storage("conversation id missing after activation")),
        }
    }

    // ── Panel visibility / lifecycle ─────────────────────────────────────────

    pub fn toggle(&mut self) -> Option<ConnectRequest> {
        if self.panel_open {
            self.close_panel();
            None
        } else {
            self.open_panel()
        }
    }

    /// Shows the panel. Returns a connect request when no channel is active.
    pub fn open_panel(&mut self) -> Option<ConnectRequest> {
        self.panel_open = true;
        if let Err(e) = self.activate() {
            error!("Cannot start chat session: {e}");
            return None;
        }
        match self.lifecycle.state() {
            ConnectionState::Closed => self.connect(),
            _ => None,
        }
    }

    /// Hides the panel: closes the channel and cancels any pending reconnect.
    pub fn close_panel(&mut self) {
        self.panel_open = false;
        self.teardown();
    }

    fn connect(&mut self) -> Option<ConnectRequest> {
        let url = self.config.endpoint(self.conversation_id.as_ref()?);
        let generation = self.lifecycle.begin_connect();
        debug!("Connecting to {url} (generation {generation})");
        Some(ConnectRequest { url, generation })
    }

    fn teardown(&mut self) {
        if let Some(channel) = self.channel.take() {
            channel.close();
        }
        self.lifecycle.teardown();
    }

    /// Hands the widget the channel opened for `generation`.
    /// A channel for a superseded attempt is closed immediately.
    pub fn attach(&mut self, generation: u64, channel: C) -> bool {
        if !self.lifecycle.is_current(generation) || !self.panel_open {
            debug!("Discarding channel for stale generation {generation}");
            channel.close();
            return false;
        }
        if let Some(previous) = self.channel.replace(channel) {
            previous.close();
        }
        true
    }

    /// The host could not even create the channel; handled as an abnormal closure.
    pub fn connect_failed(&mut self, generation: u64, err: &WidgetError) -> Effect {
        warn!("{err}");
        self.handle_event(generation, ChannelEvent::Closed {
            code: ABNORMAL_CLOSURE,
            reason: err.to_string(),
        })
    }

    /// The reconnect timer for `generation` fired.
    pub fn reconnect_due(&mut self, generation: u64) -> Option<ConnectRequest> {
        if !self.panel_open || !self.lifecycle.reconnect_due(generation) {
            return None;
        }
        self.connect()
    }

    // ── Channel events ───────────────────────────────────────────────────────

    pub fn handle_event(&mut self, generation: u64, event: ChannelEvent) -> Effect {
        if !self.lifecycle.is_current(generation) {
            debug!("Ignoring event from stale generation {generation}: {event:?}");
            return Effect::Idle;
        }
        match event {
            ChannelEvent::Opened => {
                self.lifecycle.opened(generation);
                Effect::Idle
            }
            ChannelEvent::Text(frame) => self.receive(&frame),
            ChannelEvent::Closed { code, reason } => {
                self.channel = None;
                match self.lifecycle.closed(generation, code, &reason) {
                    CloseAction::Nothing => Effect::Idle,
                    CloseAction::Reconnect { delay, generation } => {
                        Effect::ScheduleReconnect { delay, generation }
                    }
                }
            }
            ChannelEvent::Error(detail) => {
                error!("WebSocket Error: {detail}");
                Effect::Idle
            }
        }
    }

    /// Interprets one inbound frame.
    pub fn receive(&mut self, frame: &str) -> Effect {
        debug!("Message from server: {frame}");
        let event = match ServerEvent::parse(frame) {
            Ok(event) => event,
            Err(e) => {
                warn!("Dropping inbound frame: {e}");
                return Effect::Idle;
            }
        };

        match event {
            ServerEvent::BotResponse { content } => {
                self.transcript.push_bot(content);
                Effect::TranscriptChanged
            }
            ServerEvent::ToolCall { content } => {
                self.pending_approval = Some(content.clone());
                Effect::ApprovalRequested(content)
            }
            ServerEvent::Error { content } => {
                error!("Error from server: {content}");
                self.transcript.push_error(&content);
                Effect::TranscriptChanged
            }
            ServerEvent::Unknown => {
                debug!("Ignoring frame with unrecognized type");
                Effect::Idle
            }
        }
    }

    /// Handles an event and, for tool calls, awaits the operator's decision
    /// and replies before returning.
    pub async fn dispatch<P: ApprovalPrompt>(
        &mut self,
        generation: u64,
        event: ChannelEvent,
        prompt: &mut P,
    ) -> Effect {
        match self.handle_event(generation, event) {
            Effect::ApprovalRequested(description) => {
                let decision = prompt.decide(&description).await;
                if self.resolve_approval(decision) {
                    Effect::ApprovalSent(decision)
                } else {
                    Effect::Idle
                }
            }
            other => other,
        }
    }

    /// Sends the operator's decision for the pending tool call.
    pub fn resolve_approval(&mut self, decision: Approval) -> bool {
        if self.pending_approval.take().is_none() {
            warn!("No tool call is awaiting approval");
            return false;
        }
        match self.transmit(&ClientFrame::Approval { approval: decision }) {
            Ok(()) => {
                info!("Sent approval: {decision:?}");
                true
            }
            Err(e) => {
                warn!("Failed to send approval: {e}");
                false
            }
        }
    }

    // ── Outbound ─────────────────────────────────────────────────────────────

    /// Appends and transmits user input. Returns false if nothing was sent.
    pub fn submit(&mut self, input: &str) -> bool {
        if input.trim().is_empty() {
            return false;
        }
        if self.pending_approval.is_some() {
            debug!("Input held back while a tool call awaits approval");
            return false;
        }
        if self.channel.is_none() || self.lifecycle.state() != ConnectionState::Open {
            debug!("No open channel; dropping message");
            return false;
        }

        if let Err(e) = self.transmit(&ClientFrame::chat(input)) {
            warn!("Failed to send message: {e}");
            return false;
        }
        self.transcript.push_user(input);
        true
    }

    fn transmit(&self, frame: &ClientFrame) -> Result<(), WidgetError> {
        let channel = self
            .channel
            .as_ref()
            .ok_or_else(|| WidgetError::send("no channel"))?;
        channel.send_text(&frame.to_json()?)
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    pub fn conversation_id(&self) -> Option<&ConversationId> {
        self.conversation_id.as_ref()
    }

    pub fn is_panel_open(&self) -> bool {
        self.panel_open
    }

    pub fn messages(&self) -> &[Message] {
        self.transcript.messages()
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn is_typing(&self) -> bool {
        self.transcript.is_typing()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.lifecycle.state()
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.lifecycle.reconnect_attempts()
    }

    pub fn pending_approval(&self) -> Option<&str> {
        self.pending_approval.as_deref()
    }

    pub fn has_channel(&self) -> bool {
        self.channel.is_some()
    }
}

impl<C: Channel, S: KeyValueStore> Drop for ChatWidget<C, S> {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;

    use super::*;
    use crate::models::Sender;
    use crate::session::MemoryStore;

    /// Records outbound frames and close calls.
    #[derive(Clone, Default)]
    struct FakeChannel {
        sent: Rc<RefCell<Vec<String>>>,
        closed: Rc<RefCell<bool>>,
    }

    impl Channel for FakeChannel {
        fn send_text(&self, frame: &str) -> Result<(), WidgetError> {
            self.sent.borrow_mut().push(frame.to_string());
            Ok(())
        }

        fn close(&self) {
            *self.closed.borrow_mut() = true;
        }
    }

    struct FixedPrompt {
        decision: Approval,
        asked: Vec<String>,
    }

    impl ApprovalPrompt for FixedPrompt {
        async fn decide(&mut self, description: &str) -> Approval {
            self.asked.push(description.to_string());
            self.decision
        }
    }

    fn open_widget() -> (ChatWidget<FakeChannel, MemoryStore>, FakeChannel, u64) {
        let mut store = MemoryStore::new();
        store.set("threadId", "abc-123").unwrap();
        let mut widget = ChatWidget::new(WidgetConfig::new("website1"), store);
        let req = widget.open_panel().unwrap();
        assert_eq!(req.url, "ws://127.0.0.1:8000/ws/website1/abc-123");

        let channel = FakeChannel::default();
        assert!(widget.attach(req.generation, channel.clone()));
        widget.handle_event(req.generation, ChannelEvent::Opened);
        (widget, channel, req.generation)
    }

    fn frame(kind: &str, content: &str) -> ChannelEvent {
        ChannelEvent::Text(format!(r#"{{"type":"{kind}","content":"{content}"}}"#))
    }

    #[test]
    fn test_hello_round_trip() {
        let (mut widget, channel, generation) = open_widget();

        assert!(widget.submit("hello"));
        assert_eq!(widget.messages(), &[Message::new(1, Sender::User, "hello")]);
        assert!(widget.is_typing());
        assert_eq!(channel.sent.borrow().as_slice(), [r#"{"content":"hello"}"#]);

        let effect = widget.handle_event(generation, frame("bot_response", "hi there"));
        assert_eq!(effect, Effect::TranscriptChanged);
        assert_eq!(
            widget.messages(),
            &[Message::new(1, Sender::User, "hello"), Message::new(2, Sender::Bot, "hi there")]
        );
        assert!(!widget.is_typing());
    }

    #[test]
    fn test_blank_input_or_no_channel_is_dropped() {
        let (mut widget, channel, _) = open_widget();
        assert!(!widget.submit("   \n\t"));
        assert!(widget.transcript().is_empty());
        assert!(channel.sent.borrow().is_empty());

        let mut closed = ChatWidget::<FakeChannel, _>::new(WidgetConfig::new("w"), MemoryStore::new());
        assert!(!closed.submit("hello"));
        assert!(closed.transcript().is_empty());
        assert!(!closed.is_typing());
    }

    #[test]
    fn test_input_refused_while_connecting() {
        let mut widget = ChatWidget::new(WidgetConfig::new("w"), MemoryStore::new());
        let req = widget.open_panel().unwrap();
        let channel = FakeChannel::default();
        assert!(widget.attach(req.generation, channel.clone()));
        assert_eq!(widget.connection_state(), ConnectionState::Connecting);

        assert!(!widget.submit("hello"));
        assert!(channel.sent.borrow().is_empty());
        assert!(widget.transcript().is_empty());
    }

    #[test]
    fn test_input_refused_after_abnormal_close() {
        let (mut widget, channel, generation) = open_widget();
        widget.handle_event(generation, ChannelEvent::Closed {
            code: 1006,
            reason: String::new(),
        });
        assert!(!widget.has_channel());

        assert!(!widget.submit("hello"));
        assert!(channel.sent.borrow().is_empty());
        assert!(widget.transcript().is_empty());
    }

    #[test]
    fn test_error_payload_is_shown_and_clears_typing() {
        let (mut widget, _, generation) = open_widget();
        widget.submit("hello");
        widget.handle_event(generation, frame("error", "model offline"));
        assert_eq!(widget.messages()[1].text, "Error: model offline");
        assert_eq!(widget.messages()[1].sender, Sender::Bot);
        assert!(!widget.is_typing());
    }

    #[test]
    fn test_malformed_and_unknown_frames_are_ignored() {
        let (mut widget, _, generation) = open_widget();
        let effect = widget.handle_event(generation, ChannelEvent::Text("{oops".into()));
        assert_eq!(effect, Effect::Idle);
        let effect = widget.handle_event(generation, frame("presence", "online"));
        assert_eq!(effect, Effect::Idle);
        assert!(widget.transcript().is_empty());
        assert_eq!(widget.connection_state(), ConnectionState::Open);
    }

    #[tokio::test]
    async fn test_tool_call_replies_before_further_input() {
        let (mut widget, channel, generation) = open_widget();
        let mut prompt = FixedPrompt { decision: Approval::Yes, asked: Vec::new() };

        let effect = widget
            .dispatch(generation, frame("tool_call", "delete file X?"), &mut prompt)
            .await;
        assert_eq!(effect, Effect::ApprovalSent(Approval::Yes));
        assert_eq!(prompt.asked, vec!["delete file X?".to_string()]);
        assert!(widget.submit("next"));

        let sent = channel.sent.borrow();
        assert_eq!(sent[0], r#"{"approval":"yes"}"#);
        assert_eq!(sent[1], r#"{"content":"next"}"#);
    }

    #[test]
    fn test_pending_approval_blocks_input() {
        let (mut widget, channel, generation) = open_widget();
        let effect = widget.handle_event(generation, frame("tool_call", "run query?"));
        assert_eq!(effect, Effect::ApprovalRequested("run query?".into()));
        assert!(!widget.submit("hello"));
        assert!(widget.resolve_approval(Approval::No));
        assert!(!widget.resolve_approval(Approval::No));
        assert_eq!(channel.sent.borrow().as_slice(), [r#"{"approval":"no"}"#]);
        assert!(widget.transcript().is_empty());
    }

    #[test]
    fn test_fatal_close_does_not_reconnect() {
        for code in [4001, 4002] {
            let (mut widget, _, generation) = open_widget();
            let effect = widget.handle_event(generation, ChannelEvent::Closed {
                code,
                reason: String::new(),
            });
            assert_eq!(effect, Effect::Idle);
            assert!(widget.reconnect_due(generation).is_none());
            assert!(widget.transcript().is_empty());
            assert_eq!(widget.connection_state(), ConnectionState::Closed);
        }
    }

    #[test]
    fn test_abnormal_close_reconnects_once_after_delay() {
        let (mut widget, _, generation) = open_widget();
        let effect = widget.handle_event(generation, ChannelEvent::Closed {
            code: 1006,
            reason: String::new(),
        });
        assert_eq!(
            effect,
            Effect::ScheduleReconnect { delay: Duration::from_millis(3000), generation }
        );
        assert!(!widget.has_channel());

        let retry = widget.reconnect_due(generation).unwrap();
        assert_eq!(retry.generation, generation + 1);
        assert!(widget.reconnect_due(generation).is_none());
        assert_eq!(widget.reconnect_attempts(), 1);
    }

    #[test]
    fn test_close_panel_cancels_reconnect_and_closes_channel() {
        let (mut widget, channel, generation) = open_widget();
        widget.close_panel();
        assert!(*channel.closed.borrow());
        assert!(!widget.has_channel());

        // Close event and timer from the torn-down channel arrive late.
        widget.handle_event(generation, ChannelEvent::Closed { code: 1006, reason: String::new() });
        assert!(widget.reconnect_due(generation).is_none());
        assert_eq!(widget.connection_state(), ConnectionState::Closed);
    }

    #[test]
    fn test_late_channel_for_closed_panel_is_released() {
        let mut widget = ChatWidget::new(WidgetConfig::new("w"), MemoryStore::new());
        let req = widget.open_panel().unwrap();
        widget.close_panel();

        let late = FakeChannel::default();
        assert!(!widget.attach(req.generation, late.clone()));
        assert!(*late.closed.borrow());
        assert!(!widget.has_channel());
    }

    #[test]
    fn test_identifier_survives_reopen() {
        let mut widget = ChatWidget::<FakeChannel, _>::new(WidgetConfig::new("w"), MemoryStore::new());
        let first = widget.open_panel().unwrap();
        widget.close_panel();
        let second = widget.open_panel().unwrap();
        assert_eq!(first.url, second.url);
        assert!(second.generation > first.generation);
    }

    #[test]
    fn test_drop_closes_channel() {
        let (widget, channel, _) = open_widget();
        drop(widget);
        assert!(*channel.closed.borrow());
    }
}
