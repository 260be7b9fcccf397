use chat_widget::{
    Approval, ChannelEvent, ChatWidget, ConnectRequest, Effect, Message, WidgetConfig,
};
use gloo_timers::callback::Timeout;
use leptos::prelude::*;

use crate::storage::BrowserStore;
use crate::ws::{self, BrowserChannel};

type Core = ChatWidget<BrowserChannel, BrowserStore>;

/// Widget state, provided via Leptos context.
///
/// The core lives in a local `StoredValue`; the signals mirror what the
/// view needs and are refreshed after every core mutation.
#[derive(Clone, Copy)]
pub struct WidgetState {
    // --- Read signals (for components to subscribe to) ---
    pub is_open: ReadSignal<bool>,
    pub messages: ReadSignal<Vec<Message>>,
    pub is_typing: ReadSignal<bool>,

    // --- Write signals (refreshed from the core) ---
    set_is_open: WriteSignal<bool>,
    set_messages: WriteSignal<Vec<Message>>,
    set_is_typing: WriteSignal<bool>,

    core: StoredValue<Core, LocalStorage>,
    /// Pending reconnect; dropping the `Timeout` cancels it.
    reconnect_timer: StoredValue<Option<Timeout>, LocalStorage>,
}

impl WidgetState {
    /// Create a new `WidgetState` and provide it in the current Leptos context.
    pub fn provide(config: WidgetConfig) -> Self {
        let (is_open, set_is_open) = signal(false);
        let (messages, set_messages) = signal(Vec::<Message>::new());
        let (is_typing, set_is_typing) = signal(false);

        let state = Self {
            is_open,
            messages,
            is_typing,
            set_is_open,
            set_messages,
            set_is_typing,
            core: StoredValue::new_local(ChatWidget::new(config, BrowserStore)),
            reconnect_timer: StoredValue::new_local(None),
        };

        provide_context(state);
        state
    }

    /// Resolve the conversation id up front, as soon as the widget mounts.
    pub fn activate(&self) {
        self.core.update_value(|core| {
            if let Err(e) = core.activate() {
                log::error!("Failed to load conversation id: {e}");
            }
        });
    }

    pub fn toggle(&self) {
        let request = self.core.try_update_value(|core| core.toggle()).flatten();
        if !self.core.with_value(|core| core.is_panel_open()) {
            self.reconnect_timer.set_value(None);
        }
        if let Some(request) = request {
            self.connect(request);
        }
        self.sync();
    }

    /// Returns true if the message went out.
    pub fn submit(&self, text: &str) -> bool {
        let sent = self.core.try_update_value(|core| core.submit(text)).unwrap_or(false);
        self.sync();
        sent
    }

    /// Component teardown: close the channel, cancel the timer.
    pub fn teardown(&self) {
        self.reconnect_timer.set_value(None);
        self.core.update_value(|core| core.close_panel());
    }

    fn connect(&self, request: ConnectRequest) {
        let state = *self;
        let generation = request.generation;
        match ws::open_channel(&request.url, generation, move |generation, event| {
            state.on_event(generation, event)
        }) {
            Ok(channel) => self.core.update_value(|core| {
                core.attach(generation, channel);
            }),
            Err(e) => {
                let effect = self.core.try_update_value(|core| core.connect_failed(generation, &e));
                self.apply(effect);
            }
        }
    }

    fn on_event(&self, generation: u64, event: ChannelEvent) {
        let effect = self.core.try_update_value(|core| core.handle_event(generation, event));
        self.apply(effect);
        self.sync();
    }

    fn apply(&self, effect: Option<Effect>) {
        match effect {
            Some(Effect::ApprovalRequested(description)) => {
                // Blocks the event loop until the operator answers.
                let approved = web_sys::window()
                    .and_then(|w| {
                        w.confirm_with_message(&format!("Approve this action?\n{description}"))
                            .ok()
                    })
                    .unwrap_or(false);
                self.core.update_value(|core| {
                    core.resolve_approval(Approval::from_bool(approved));
                });
            }
            Some(Effect::ScheduleReconnect { delay, generation }) => {
                let state = *self;
                let timer = Timeout::new(delay.as_millis() as u32, move || {
                    state.reconnect_due(generation);
                });
                self.reconnect_timer.set_value(Some(timer));
            }
            _ => {}
        }
    }

    fn reconnect_due(&self, generation: u64) {
        let request = self.core.try_update_value(|core| core.reconnect_due(generation)).flatten();
        if let Some(request) = request {
            self.connect(request);
        }
    }

    fn sync(&self) {
        let (open, messages, typing) = self
            .core
            .with_value(|core| (core.is_panel_open(), core.messages().to_vec(), core.is_typing()));
        self.set_is_open.set(open);
        self.set_messages.set(messages);
        self.set_is_typing.set(typing);
    }
}
