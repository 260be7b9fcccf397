use chat_widget::Sender;
use leptos::ev;
use leptos::html;
use leptos::prelude::*;
use web_sys::{ScrollBehavior, ScrollIntoViewOptions};

use crate::state::WidgetState;

/// Floating launcher button that expands into the chat panel.
#[component]
pub fn FloatingChat() -> impl IntoView {
    let state = expect_context::<WidgetState>();

    view! {
        <div class="chat-widget">
            {move || {
                if state.is_open.get() {
                    view! { <ChatPanel /> }.into_any()
                } else {
                    view! {
                        <button class="chat-launcher" on:click=move |_| state.toggle()>
                            "💬"
                        </button>
                    }.into_any()
                }
            }}
        </div>
    }
}

/// Header, transcript and input form.
#[component]
fn ChatPanel() -> impl IntoView {
    let state = expect_context::<WidgetState>();
    let end_ref = NodeRef::<html::Div>::new();

    // Keep the newest message in view
    Effect::new(move |_| {
        state.messages.track();
        state.is_typing.track();
        if let Some(end) = end_ref.get() {
            let options = ScrollIntoViewOptions::new();
            options.set_behavior(ScrollBehavior::Smooth);
            end.scroll_into_view_with_scroll_into_view_options(&options);
        }
    });

    view! {
        <div class="chat-panel">
            <div class="chat-header">
                <h2>"Realtor Chat"</h2>
                <div class="chat-header-buttons">
                    <button class="header-btn" title="Minimize" on:click=move |_| state.toggle()>
                        "–"
                    </button>
                    <button class="header-btn" title="Close" on:click=move |_| state.toggle()>
                        "✕"
                    </button>
                </div>
            </div>

            <div class="messages-container">
                <For
                    each=move || state.messages.get()
                    key=|m| m.id
                    let:msg
                >
                    <MessageBubble sender=msg.sender text=msg.text />
                </For>
                // Typing indicator
                <Show when=move || state.is_typing.get()>
                    <div class="message bot">
                        <span class="typing-dots">"..."</span>
                    </div>
                </Show>
                <div node_ref=end_ref></div>
            </div>

            <ChatInput />
        </div>
    }
}

/// A single chat message bubble.
#[component]
fn MessageBubble(sender: Sender, text: String) -> impl IntoView {
    let css_class = match sender {
        Sender::User => "message user",
        Sender::Bot => "message bot",
    };

    view! {
        <div class=css_class>
            <div class="bubble">{text}</div>
        </div>
    }
}

/// Chat input form with text field and send button.
#[component]
fn ChatInput() -> impl IntoView {
    let state = expect_context::<WidgetState>();
    let (input, set_input) = signal(String::new());

    let on_submit = move |ev: ev::SubmitEvent| {
        ev.prevent_default();
        if state.submit(&input.get_untracked()) {
            set_input.set(String::new());
        }
    };

    view! {
        <form class="input-area" on:submit=on_submit>
            <div class="input-row">
                <input
                    type="text"
                    placeholder="Type your message..."
                    prop:value=input
                    on:input=move |ev| {
                        set_input.set(event_target_value(&ev));
                    }
                />
                <button type="submit" class="send-btn">
                    "Send"
                </button>
            </div>
        </form>
    }
}
