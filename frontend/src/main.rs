mod components;
mod state;
mod storage;
mod ws;

use chat_widget::WidgetConfig;
use leptos::mount::mount_to_body;
use leptos::prelude::*;

use components::chat::FloatingChat;
use state::WidgetState;

/// Site this bundle is embedded on, fixed at build time.
const SITE_ID: &str = match option_env!("CHAT_WIDGET_SITE_ID") {
    Some(id) => id,
    None => "website1",
};

fn widget_config() -> WidgetConfig {
    let config = WidgetConfig::new(SITE_ID);
    match option_env!("CHAT_WIDGET_SERVER_URL") {
        Some(url) => config.with_server_url(url),
        None => config,
    }
}

/// Root application component.
#[component]
fn App() -> impl IntoView {
    let config = widget_config();
    if let Err(e) = config.validate() {
        log::error!("{e}");
    }
    let state = WidgetState::provide(config);

    // Resolve the conversation id on mount
    state.activate();
    on_cleanup(move || state.teardown());

    view! {
        <FloatingChat />
    }
}

fn main() {
    console_log::init_with_level(log::Level::Debug).expect("Failed to init logger");
    mount_to_body(App);
}
