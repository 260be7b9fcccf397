use std::time::Duration;

use tracing::{error, info, warn};

pub const NORMAL_CLOSURE: u16 = 1000;
pub const ABNORMAL_CLOSURE: u16 = 1006;
pub const INVALID_SITE: u16 = 4001;
pub const UNAUTHORIZED_ORIGIN: u16 = 4002;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Closed,
    Connecting,
    Open,
    /// Abnormally closed, waiting for the reconnect delay to elapse.
    Reconnecting,
}

/// Meaning of a channel close code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseKind {
    Normal,
    InvalidSite,
    UnauthorizedOrigin,
    Abnormal(u16),
}

impl CloseKind {
    pub fn from_code(code: u16) -> Self {
        match code {
            NORMAL_CLOSURE => CloseKind::Normal,
            INVALID_SITE => CloseKind::InvalidSite,
            UNAUTHORIZED_ORIGIN => CloseKind::UnauthorizedOrigin,
            other => CloseKind::Abnormal(other),
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, CloseKind::InvalidSite | CloseKind::UnauthorizedOrigin)
    }
}

impl std::fmt::Display for CloseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloseKind::Normal => f.write_str("Normal closure"),
            CloseKind::InvalidSite => f.write_str("Invalid website ID"),
            CloseKind::UnauthorizedOrigin => f.write_str("Unauthorized origin"),
            CloseKind::Abnormal(code) => write!(f, "Abnormal closure ({code})"),
        }
    }
}

/// Socket events, as every host reports them to the widget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Opened,
    Text(String),
    Closed { code: u16, reason: String },
    Error(String),
}

/// What the host must do after a close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseAction {
    Nothing,
    Reconnect { delay: Duration, generation: u64 },
}

/// Connect/reconnect bookkeeping for the single channel of a widget.
///
/// Every connect attempt is stamped with a generation. Events and timers
/// carrying an older generation belong to a channel that has since been
/// torn down and are ignored.
#[derive(Debug)]
pub struct Lifecycle {
    state: ConnectionState,
    generation: u64,
    reconnect_delay: Duration,
    reconnect_attempts: u32,
}

impl Lifecycle {
    pub fn new(reconnect_delay: Duration) -> Self {
        Self {
            state: ConnectionState::Closed,
            generation: 0,
            reconnect_delay,
            reconnect_attempts: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    pub fn is_current(&self, generation: u64) -> bool {
        generation == self.generation
    }

    /// Starts a connect attempt and returns its generation.
    pub fn begin_connect(&mut self) -> u64 {
        self.generation += 1;
        self.state = ConnectionState::Connecting;
        self.generation
    }

    pub fn opened(&mut self, generation: u64) -> bool {
        if !self.is_current(generation) || self.state != ConnectionState::Connecting {
            return false;
        }
        info!("WebSocket connection established");
        self.state = ConnectionState::Open;
        true
    }

    pub fn closed(&mut self, generation: u64, code: u16, reason: &str) -> CloseAction {
        if !self.is_current(generation) || self.state == ConnectionState::Closed {
            return CloseAction::Nothing;
        }
        info!("WebSocket disconnected: code={code} reason={reason:?}");

        let kind = CloseKind::from_code(code);
        if kind.is_fatal() {
            error!("{kind}");
            self.state = ConnectionState::Closed;
            return CloseAction::Nothing;
        }
        match kind {
            CloseKind::Abnormal(_) => {
                // Fixed delay, no cap: sustained backend outages retry forever.
                self.state = ConnectionState::Reconnecting;
                CloseAction::Reconnect { delay: self.reconnect_delay, generation }
            }
            _ => {
                self.state = ConnectionState::Closed;
                CloseAction::Nothing
            }
        }
    }

    /// True when the reconnect timer for `generation` may act.
    pub fn reconnect_due(&mut self, generation: u64) -> bool {
        if !self.is_current(generation) || self.state != ConnectionState::Reconnecting {
            return false;
        }
        self.reconnect_attempts += 1;
        warn!("Attempting to reconnect (attempt {})", self.reconnect_attempts);
        true
    }

    /// Invalidates the current generation, orphaning any in-flight events or timers.
    pub fn teardown(&mut self) {
        self.generation += 1;
        self.state = ConnectionState::Closed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connected() -> (Lifecycle, u64) {
        let mut lc = Lifecycle::new(Duration::from_millis(3000));
        let generation = lc.begin_connect();
        assert!(lc.opened(generation));
        (lc, generation)
    }

    #[test]
    fn test_close_kinds() {
        assert_eq!(CloseKind::from_code(1000), CloseKind::Normal);
        assert!(CloseKind::from_code(4001).is_fatal());
        assert!(CloseKind::from_code(4002).is_fatal());
        assert_eq!(CloseKind::from_code(1006), CloseKind::Abnormal(1006));
        assert!(!CloseKind::from_code(1011).is_fatal());
        assert_eq!(CloseKind::from_code(4001).to_string(), "Invalid website ID");
        assert_eq!(CloseKind::from_code(4002).to_string(), "Unauthorized origin");
    }

    #[test]
    fn test_fatal_codes_do_not_reconnect() {
        for code in [NORMAL_CLOSURE, INVALID_SITE, UNAUTHORIZED_ORIGIN] {
            let (mut lc, generation) = connected();
            assert_eq!(lc.closed(generation, code, ""), CloseAction::Nothing);
            assert_eq!(lc.state(), ConnectionState::Closed);
            assert!(!lc.reconnect_due(generation));
        }
    }

    #[test]
    fn test_abnormal_close_schedules_one_reconnect() {
        let (mut lc, generation) = connected();
        let action = lc.closed(generation, ABNORMAL_CLOSURE, "");
        assert_eq!(
            action,
            CloseAction::Reconnect { delay: Duration::from_millis(3000), generation }
        );
        assert!(lc.reconnect_due(generation));
        // The same timer firing twice must not count twice.
        lc.begin_connect();
        assert!(!lc.reconnect_due(generation));
        assert_eq!(lc.reconnect_attempts(), 1);
    }

    #[test]
    fn test_teardown_orphans_pending_timer() {
        let (mut lc, generation) = connected();
        lc.closed(generation, 1011, "server restart");
        lc.teardown();
        assert!(!lc.reconnect_due(generation));
        assert_eq!(lc.state(), ConnectionState::Closed);
    }

    #[test]
    fn test_stale_events_are_ignored() {
        let (mut lc, old) = connected();
        lc.teardown();
        let fresh = lc.begin_connect();
        assert!(!lc.opened(old));
        assert_eq!(lc.closed(old, 1006, ""), CloseAction::Nothing);
        assert_eq!(lc.state(), ConnectionState::Connecting);
        assert!(lc.opened(fresh));
    }
}
