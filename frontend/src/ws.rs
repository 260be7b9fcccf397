use std::rc::Rc;

use chat_widget::{Channel, ChannelEvent, WidgetError};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{CloseEvent, Event, MessageEvent, WebSocket};

const NORMAL_CLOSURE: u16 = 1000;

type Handlers = (
    Closure<dyn Fn()>,
    Closure<dyn Fn(MessageEvent)>,
    Closure<dyn Fn(CloseEvent)>,
    Closure<dyn Fn(Event)>,
);

/// A browser WebSocket plus the JS callbacks wired to it.
/// Dropping it detaches and frees the callbacks; nothing is leaked across reconnects.
pub struct BrowserChannel {
    ws: WebSocket,
    _handlers: Handlers,
}

/// Opens a WebSocket and reports its events, tagged with `generation`.
pub fn open_channel(
    url: &str,
    generation: u64,
    on_event: impl Fn(u64, ChannelEvent) + 'static,
) -> Result<BrowserChannel, WidgetError> {
    let ws = WebSocket::new(url).map_err(|e| WidgetError::ConnectFailed {
        url: url.to_string(),
        message: format!("{e:?}"),
    })?;
    ws.set_binary_type(web_sys::BinaryType::Arraybuffer);

    let on_event = Rc::new(on_event);

    // --- onopen ---
    let emit = on_event.clone();
    let onopen = Closure::<dyn Fn()>::new(move || emit(generation, ChannelEvent::Opened));
    ws.set_onopen(Some(onopen.as_ref().unchecked_ref()));

    // --- onmessage: only text frames carry the protocol ---
    let emit = on_event.clone();
    let onmessage = Closure::<dyn Fn(MessageEvent)>::new(move |ev: MessageEvent| {
        if let Some(text) = ev.data().as_string() {
            emit(generation, ChannelEvent::Text(text));
        }
    });
    ws.set_onmessage(Some(onmessage.as_ref().unchecked_ref()));

    // --- onclose ---
    let emit = on_event.clone();
    let onclose = Closure::<dyn Fn(CloseEvent)>::new(move |ev: CloseEvent| {
        emit(generation, ChannelEvent::Closed { code: ev.code(), reason: ev.reason() });
    });
    ws.set_onclose(Some(onclose.as_ref().unchecked_ref()));

    // --- onerror: the browser gives no detail beyond the event type ---
    let emit = on_event;
    let onerror = Closure::<dyn Fn(Event)>::new(move |ev: Event| {
        emit(generation, ChannelEvent::Error(ev.type_()));
    });
    ws.set_onerror(Some(onerror.as_ref().unchecked_ref()));

    Ok(BrowserChannel {
        ws,
        _handlers: (onopen, onmessage, onclose, onerror),
    })
}

impl Channel for BrowserChannel {
    fn send_text(&self, frame: &str) -> Result<(), WidgetError> {
        self.ws
            .send_with_str(frame)
            .map_err(|e| WidgetError::send(format!("{e:?}")))
    }

    fn close(&self) {
        let _ = self.ws.close_with_code(NORMAL_CLOSURE);
    }
}

impl Drop for BrowserChannel {
    fn drop(&mut self) {
        self.ws.set_onopen(None);
        self.ws.set_onmessage(None);
        self.ws.set_onclose(None);
        self.ws.set_onerror(None);
    }
}
