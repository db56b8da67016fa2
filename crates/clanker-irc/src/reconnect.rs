use std::collections::HashMap;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

const BACKOFF_BASE_SECS: u64 = 5;
const BACKOFF_MAX_SECS: u64 = 300;
const JITTER_FRACTION: f64 = 0.20;
const BAN_RETRY_SECS: u64 = 3600;

/// Same nanosecond-modulo jitter the persistence resilience layer uses,
/// avoided a `rand` dependency for one random draw per reconnect attempt.
fn jitter_unit() -> f64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    (nanos % 1_000_000) as f64 / 1_000_000.0
}

/// Delay before reconnect attempt `attempt` (1-indexed): `min(max, base*2^(n-1)) * (1 +/- 0.2*U)`.
pub fn backoff_delay(attempt: u32) -> Duration {
    let exp = BACKOFF_BASE_SECS.saturating_mul(1u64 << attempt.saturating_sub(1).min(20));
    let base = exp.min(BACKOFF_MAX_SECS) as f64;
    let jitter = 1.0 + JITTER_FRACTION * (2.0 * jitter_unit() - 1.0);
    Duration::from_secs_f64((base * jitter).max(0.0))
}

/// Tracks reconnect attempt count and the set of channels we're currently
/// excluded from due to a ban/forbidden error, per the banned-channel
/// quarantine rule: excluded until `ban_retry_delay` elapses, then reinstated.
#[derive(Debug, Default)]
pub struct ReconnectState {
    attempt: u32,
    banned: HashMap<String, Instant>,
}

impl ReconnectState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_attempt(&mut self) -> u32 {
        self.attempt += 1;
        self.attempt
    }

    /// A successful `Connected` transition resets the attempt counter.
    pub fn on_connected(&mut self) {
        self.attempt = 0;
    }

    pub fn ban(&mut self, channel: &str) {
        self.banned.insert(channel.to_string(), Instant::now());
    }

    /// Reinstate any banned channel whose retry delay has elapsed. Returns
    /// the set of channels reinstated this call.
    pub fn reinstate_expired(&mut self) -> Vec<String> {
        let mut reinstated = Vec::new();
        self.banned.retain(|channel, since| {
            if since.elapsed() >= Duration::from_secs(BAN_RETRY_SECS) {
                reinstated.push(channel.clone());
                false
            } else {
                true
            }
        });
        reinstated
    }

    /// Reinstate every banned channel unconditionally (conservative recovery
    /// when the whole target list would otherwise be empty).
    pub fn reinstate_all(&mut self) {
        self.banned.clear();
    }

    /// Build the channel join list: every configured channel not currently banned.
    pub fn target_channels<'a>(&self, configured: &'a [String]) -> Vec<&'a str> {
        configured
            .iter()
            .filter(|c| !self.banned.contains_key(c.as_str()))
            .map(|c| c.as_str())
            .collect()
    }

    pub fn is_banned(&self, channel: &str) -> bool {
        self.banned.contains_key(channel)
    }
}

/// True if error text contains one of the known ban/forbidden indicators.
pub fn is_ban_indicator(text: &str) -> bool {
    let lower = text.to_lowercase();
    ["banned", "msg_channel_banned", "forbidden", "access denied"]
        .iter()
        .any(|needle| lower.contains(needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_delay_respects_cap() {
        let d = backoff_delay(20);
        assert!(d.as_secs_f64() <= BACKOFF_MAX_SECS as f64 * 1.2 + 1.0);
    }

    #[test]
    fn backoff_delay_grows_with_attempt() {
        let d1 = backoff_delay(1).as_secs_f64();
        let d3 = backoff_delay(3).as_secs_f64();
        assert!(d3 > d1);
    }

    #[test]
    fn reconnect_resets_on_connected() {
        let mut state = ReconnectState::new();
        state.next_attempt();
        state.next_attempt();
        state.on_connected();
        assert_eq!(state.attempt, 0);
    }

    #[test]
    fn ban_excludes_from_target_list_until_reinstated() {
        let mut state = ReconnectState::new();
        state.ban("chanx");
        let configured = vec!["chanx".to_string(), "chany".to_string()];
        assert_eq!(state.target_channels(&configured), vec!["chany"]);
        state.reinstate_all();
        assert_eq!(state.target_channels(&configured), vec!["chanx", "chany"]);
    }

    #[test]
    fn is_ban_indicator_matches_known_phrases() {
        assert!(is_ban_indicator("msg_channel_banned: you are banned"));
        assert!(is_ban_indicator("403 Forbidden"));
        assert!(is_ban_indicator("Access Denied"));
        assert!(!is_ban_indicator("connection reset"));
    }
}
