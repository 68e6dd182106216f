//! Domain logic for reconnection decisions.
//!
//! Pure values and functions without side effects. The connection task owns
//! one [`ReconnectState`] and passes it into every attempt, so no attempt
//! depends on counters captured by an earlier, superseded attempt.

use std::time::Duration;

/// Default number of reconnect attempts after an unexpected close.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;
const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);
const DEFAULT_DELAY_CAP: u32 = 5;

/// Linear backoff policy: `base_delay × min(attempt, delay_cap)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Largest multiplier applied to `base_delay`
    pub delay_cap: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_RECONNECT_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            delay_cap: DEFAULT_DELAY_CAP,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before the given (1-based) attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * attempt.min(self.delay_cap)
    }
}

/// Who ended a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseInitiator {
    /// Teardown or navigation away; never reconnects
    Local,
    /// Server close, network loss, or heartbeat timeout
    Remote,
}

/// Check if the client should attempt to reconnect.
///
/// # Arguments
///
/// * `initiator` - Who closed the connection
/// * `current_attempt` - Reconnect attempts already made in this cycle
/// * `max_attempts` - The maximum number of reconnection attempts allowed
pub fn should_attempt_reconnect(
    initiator: CloseInitiator,
    current_attempt: u32,
    max_attempts: u32,
) -> bool {
    initiator == CloseInitiator::Remote && current_attempt < max_attempts
}

/// Outcome of asking the policy what to do after a close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Wait `delay`, then make attempt number `attempt`
    Retry { attempt: u32, delay: Duration },
    /// Attempts are exhausted; stay disconnected until a manual trigger
    GiveUp,
    /// The close was ours
    Stop,
}

/// Explicit reconnect bookkeeping for one connection manager run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconnectState {
    attempt: u32,
    handshake_confirmed: bool,
}

impl ReconnectState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Called for every freshly opened socket; the handshake is not yet confirmed.
    pub fn begin_connection(&mut self) {
        self.handshake_confirmed = false;
    }

    /// Called once the server has acknowledged the session join.
    ///
    /// Returns `true` the first time it is called for the current connection.
    pub fn confirm_handshake(&mut self) -> bool {
        if self.handshake_confirmed {
            return false;
        }
        self.handshake_confirmed = true;
        self.attempt = 0;
        true
    }

    pub fn is_confirmed(&self) -> bool {
        self.handshake_confirmed
    }

    /// Decide what to do after the current connection ended.
    pub fn on_close(
        &mut self,
        initiator: CloseInitiator,
        policy: &ReconnectPolicy,
    ) -> ReconnectDecision {
        self.handshake_confirmed = false;

        if initiator == CloseInitiator::Local {
            return ReconnectDecision::Stop;
        }
        if !should_attempt_reconnect(initiator, self.attempt, policy.max_attempts) {
            return ReconnectDecision::GiveUp;
        }

        self.attempt += 1;
        ReconnectDecision::Retry {
            attempt: self.attempt,
            delay: policy.delay_for(self.attempt),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> ReconnectPolicy {
        ReconnectPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            delay_cap: 3,
        }
    }

    #[test]
    fn test_should_attempt_reconnect_local_close() {
        // テスト項目: ローカルで閉じた接続は再接続しない
        // given (前提条件):
        let initiator = CloseInitiator::Local;

        // when (操作):
        let result = should_attempt_reconnect(initiator, 0, 5);

        // then (期待する結果):
        assert!(!result);
    }

    #[test]
    fn test_should_attempt_reconnect_within_limit() {
        // テスト項目: 再接続回数が上限未満の場合、再接続すべきと判定される
        // given (前提条件):
        let initiator = CloseInitiator::Remote;

        // when (操作):
        let result = should_attempt_reconnect(initiator, 4, 5);

        // then (期待する結果):
        assert!(result);
    }

    #[test]
    fn test_should_attempt_reconnect_at_limit() {
        // テスト項目: 再接続回数が上限に達した場合、再接続すべきではないと判定される
        // given (前提条件):
        let initiator = CloseInitiator::Remote;

        // when (操作):
        let result = should_attempt_reconnect(initiator, 5, 5);

        // then (期待する結果):
        assert!(!result);
    }

    #[test]
    fn test_delay_grows_linearly_then_caps() {
        // テスト項目: 遅延が線形に増加し、上限で頭打ちになる
        // given (前提条件):
        let policy = policy();

        // when (操作):
        let delays: Vec<_> = (1..=5).map(|attempt| policy.delay_for(attempt)).collect();

        // then (期待する結果):
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(300),
                Duration::from_millis(300),
                Duration::from_millis(300),
            ]
        );
    }

    #[test]
    fn test_remote_closes_retry_exactly_max_attempts() {
        // テスト項目: リモート切断が続くと最大 5 回まで再試行し、その後諦める
        // given (前提条件):
        let policy = policy();
        let mut state = ReconnectState::new();

        // when (操作):
        let decisions: Vec<_> = (0..6)
            .map(|_| state.on_close(CloseInitiator::Remote, &policy))
            .collect();

        // then (期待する結果):
        let attempts: Vec<_> = decisions
            .iter()
            .filter_map(|d| match d {
                ReconnectDecision::Retry { attempt, .. } => Some(*attempt),
                _ => None,
            })
            .collect();
        assert_eq!(attempts, vec![1, 2, 3, 4, 5]);
        assert_eq!(decisions[5], ReconnectDecision::GiveUp);
    }

    #[test]
    fn test_local_close_never_schedules_retry() {
        // テスト項目: ローカル切断では再接続がスケジュールされない
        // given (前提条件):
        let policy = policy();
        let mut state = ReconnectState::new();

        // when (操作):
        let decision = state.on_close(CloseInitiator::Local, &policy);

        // then (期待する結果):
        assert_eq!(decision, ReconnectDecision::Stop);
        assert_eq!(state.attempt(), 0);
    }

    #[test]
    fn test_socket_open_alone_does_not_reset_counter() {
        // テスト項目: ソケットが開いただけではカウンタはリセットされない
        // given (前提条件):
        let policy = policy();
        let mut state = ReconnectState::new();
        state.on_close(CloseInitiator::Remote, &policy);
        state.on_close(CloseInitiator::Remote, &policy);

        // when (操作):
        state.begin_connection();
        let decision = state.on_close(CloseInitiator::Remote, &policy);

        // then (期待する結果):
        assert!(matches!(decision, ReconnectDecision::Retry { attempt: 3, .. }));
    }

    #[test]
    fn test_drop_after_successful_reconnects_starts_fresh_cycle() {
        // テスト項目: 2 回の再接続成功後に 1006 で切断されると、新しいサイクルの 1 回目から始まる
        // given (前提条件):
        let policy = policy();
        let mut state = ReconnectState::new();
        for _ in 0..2 {
            state.on_close(CloseInitiator::Remote, &policy);
            state.begin_connection();
            assert!(state.confirm_handshake());
        }

        // when (操作):
        let decision = state.on_close(CloseInitiator::Remote, &policy);

        // then (期待する結果):
        assert_eq!(
            decision,
            ReconnectDecision::Retry {
                attempt: 1,
                delay: Duration::from_millis(100),
            }
        );
    }

    #[test]
    fn test_confirm_handshake_only_once_per_connection() {
        // テスト項目: ハンドシェイク確認は接続ごとに 1 回だけ true を返す
        // given (前提条件):
        let mut state = ReconnectState::new();
        state.begin_connection();

        // when (操作):
        let first = state.confirm_handshake();
        let second = state.confirm_handshake();

        // then (期待する結果):
        assert!(first);
        assert!(!second);
        assert!(state.is_confirmed());
    }
}
