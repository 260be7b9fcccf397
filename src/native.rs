//! Native host: drives a [`ChatWidget`] over `tokio-tungstenite`.
//!
//! Each connect attempt runs in its own task that turns socket traffic into
//! [`ChannelEvent`]s tagged with the attempt's generation and pushes them onto
//! the runner's queue. The reconnect timer is a sleeping task that is aborted
//! whenever the panel closes or the runner is dropped.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tracing::debug;

use crate::connection::{ABNORMAL_CLOSURE, ChannelEvent};
use crate::errors::WidgetError;
use crate::session::KeyValueStore;
use crate::widget::{ApprovalPrompt, Channel, ChatWidget, ConnectRequest, Effect};

/// Close status reported when the peer closes without one.
const NO_STATUS_RECEIVED: u16 = 1005;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    Channel { generation: u64, event: ChannelEvent },
    ReconnectDue { generation: u64 },
}

/// Write half of a native connection; frames are queued to the socket task.
pub struct NativeChannel {
    outgoing: mpsc::UnboundedSender<WsMessage>,
}

impl Channel for NativeChannel {
    fn send_text(&self, frame: &str) -> Result<(), WidgetError> {
        self.outgoing
            .send(WsMessage::Text(frame.to_owned().into()))
            .map_err(|_| WidgetError::send("connection task has exited"))
    }

    fn close(&self) {
        let frame = CloseFrame { code: CloseCode::Normal, reason: String::new().into() };
        let _ = self.outgoing.send(WsMessage::Close(Some(frame)));
    }
}

/// Starts a connect attempt and returns its write half immediately.
pub fn open_channel(
    request: ConnectRequest,
    events: mpsc::UnboundedSender<HostEvent>,
) -> NativeChannel {
    let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
    tokio::spawn(run_connection(request, outgoing_rx, events));
    NativeChannel { outgoing }
}

async fn run_connection(
    request: ConnectRequest,
    mut outgoing_rx: mpsc::UnboundedReceiver<WsMessage>,
    events: mpsc::UnboundedSender<HostEvent>,
) {
    let generation = request.generation;
    let emit = |event: ChannelEvent| {
        let _ = events.send(HostEvent::Channel { generation, event });
    };

    let (stream, _response) = match connect_async(request.url.as_str()).await {
        Ok(ok) => ok,
        Err(e) => {
            let err = WidgetError::ConnectFailed { url: request.url.clone(), message: e.to_string() };
            emit(ChannelEvent::Error(err.to_string()));
            emit(ChannelEvent::Closed { code: ABNORMAL_CLOSURE, reason: err.to_string() });
            return;
        }
    };
    emit(ChannelEvent::Opened);

    let (mut write, mut read) = stream.split();
    loop {
        tokio::select! {
            outgoing = outgoing_rx.recv() => {
                // The widget dropped its handle; nobody is listening any more.
                let Some(msg) = outgoing else { return };
                if let Err(e) = write.send(msg).await {
                    emit(ChannelEvent::Error(e.to_string()));
                    emit(ChannelEvent::Closed { code: ABNORMAL_CLOSURE, reason: e.to_string() });
                    return;
                }
            }
            incoming = read.next() => {
                match incoming {
                    Some(Ok(WsMessage::Text(text))) => emit(ChannelEvent::Text(text.as_str().to_owned())),
                    Some(Ok(WsMessage::Close(frame))) => {
                        let (code, reason) = frame
                            .map(|f| (u16::from(f.code), f.reason.as_str().to_owned()))
                            .unwrap_or((NO_STATUS_RECEIVED, String::new()));
                        emit(ChannelEvent::Closed { code, reason });
                        return;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        emit(ChannelEvent::Error(e.to_string()));
                        emit(ChannelEvent::Closed { code: ABNORMAL_CLOSURE, reason: e.to_string() });
                        return;
                    }
                    None => {
                        emit(ChannelEvent::Closed { code: ABNORMAL_CLOSURE, reason: "stream ended".into() });
                        return;
                    }
                }
            }
        }
    }
}

/// Owns one widget and everything needed to keep its channel alive.
pub struct Runner<S: KeyValueStore> {
    widget: ChatWidget<NativeChannel, S>,
    events_tx: mpsc::UnboundedSender<HostEvent>,
    events_rx: mpsc::UnboundedReceiver<HostEvent>,
    reconnect_timer: Option<JoinHandle<()>>,
}

impl<S: KeyValueStore> Runner<S> {
    pub fn new(widget: ChatWidget<NativeChannel, S>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self { widget, events_tx, events_rx, reconnect_timer: None }
    }

    pub fn widget(&self) -> &ChatWidget<NativeChannel, S> {
        &self.widget
    }

    pub fn open(&mut self) {
        if let Some(request) = self.widget.open_panel() {
            self.connect(request);
        }
    }

    pub fn close(&mut self) {
        self.cancel_reconnect();
        self.widget.close_panel();
    }

    pub fn submit(&mut self, text: &str) -> bool {
        self.widget.submit(text)
    }

    /// Waits for the next host event. Cancel-safe.
    pub async fn recv(&mut self) -> Option<HostEvent> {
        self.events_rx.recv().await
    }

    /// Applies one host event, prompting the operator for tool calls.
    pub async fn handle<P: ApprovalPrompt>(&mut self, event: HostEvent, prompt: &mut P) -> Effect {
        match event {
            HostEvent::Channel { generation, event } => {
                let effect = self.widget.dispatch(generation, event, prompt).await;
                if let Effect::ScheduleReconnect { delay, generation } = effect {
                    self.schedule_reconnect(delay, generation);
                }
                effect
            }
            HostEvent::ReconnectDue { generation } => {
                self.reconnect_timer = None;
                if let Some(request) = self.widget.reconnect_due(generation) {
                    self.connect(request);
                }
                Effect::Idle
            }
        }
    }

    /// `recv` followed by `handle`.
    pub async fn step<P: ApprovalPrompt>(&mut self, prompt: &mut P) -> Option<Effect> {
        let event = self.recv().await?;
        Some(self.handle(event, prompt).await)
    }

    fn connect(&mut self, request: ConnectRequest) {
        let generation = request.generation;
        let channel = open_channel(request, self.events_tx.clone());
        self.widget.attach(generation, channel);
    }

    fn schedule_reconnect(&mut self, delay: Duration, generation: u64) {
        self.cancel_reconnect();
        debug!("Reconnecting in {delay:?}");
        let events = self.events_tx.clone();
        self.reconnect_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(HostEvent::ReconnectDue { generation });
        }));
    }

    fn cancel_reconnect(&mut self) {
        if let Some(timer) = self.reconnect_timer.take() {
            debug!("Cancelling pending reconnect");
            timer.abort();
        }
    }
}

impl<S: KeyValueStore> Drop for Runner<S> {
    fn drop(&mut self) {
        self.cancel_reconnect();
    }
}
