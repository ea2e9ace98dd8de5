//! 连接闸门集成测试
//!
//! 使用暂停的时钟驱动重试循环，验证熔断、退避、取消与超时行为。

use crate::common::{test_config, Outcome, ScriptedDialer, TARGET};
use dialgate::constants::{MAX_BACKOFF_MULTIPLIER, MAX_CONFIG_DURATION_MS};
use dialgate::{
    BackoffConfig, BreakerConfig, BreakerEvent, BreakerState, ConnectivityGate, GateConfig,
    GateError, OpenPolicy,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

fn count(events: &[BreakerEvent], pred: impl Fn(&BreakerEvent) -> bool) -> usize {
    events.iter().filter(|e| pred(e)).count()
}

/// 9次失败后成功（阈值10）：不熔断，恰好一次成功
#[tokio::test(start_paused = true)]
async fn test_below_threshold_never_trips() {
    let dialer = Arc::new(ScriptedDialer::fail_then_succeed(9));
    let config = test_config(10, Duration::from_secs(30), OpenPolicy::Reject);
    let mut gate = ConnectivityGate::connect(config, dialer.clone(), TARGET).unwrap();
    let mut events = gate.subscribe();

    let handle = gate.acquire().await.unwrap();
    assert_eq!(handle, 10);

    let events = events.drain();
    assert_eq!(count(&events, |e| matches!(e, BreakerEvent::Tripped { .. })), 0);
    assert_eq!(count(&events, |e| matches!(e, BreakerEvent::Success)), 1);
    assert_eq!(count(&events, |e| matches!(e, BreakerEvent::Failure { .. })), 9);
    assert_eq!(gate.breaker().consecutive_failures(), 0);
    assert_eq!(gate.breaker().state(), BreakerState::Closed);
}

/// 10次失败后成功（阈值10）：熔断一次、恢复一次，返回第11次尝试的句柄
#[tokio::test(start_paused = true)]
async fn test_trip_then_reset() {
    let cool_down = Duration::from_millis(500);
    let dialer = Arc::new(ScriptedDialer::fail_then_succeed(10));
    let config = test_config(10, cool_down, OpenPolicy::Reject);
    let mut gate = ConnectivityGate::connect(config, dialer.clone(), TARGET).unwrap();
    let mut events = gate.subscribe();

    let handle = gate.acquire().await.unwrap();
    assert_eq!(handle, 11);
    assert_eq!(dialer.attempts(), 11);

    let events = events.drain();
    assert_eq!(count(&events, |e| matches!(e, BreakerEvent::Tripped { .. })), 1);
    assert_eq!(count(&events, |e| matches!(e, BreakerEvent::Reset { .. })), 1);
    assert_eq!(count(&events, |e| matches!(e, BreakerEvent::CoolDownElapsed)), 1);
    assert!(events.contains(&BreakerEvent::Reset {
        previous_failures: 10
    }));

    let tripped_at = events
        .iter()
        .position(|e| matches!(e, BreakerEvent::Tripped { .. }))
        .unwrap();
    let reset_at = events
        .iter()
        .position(|e| matches!(e, BreakerEvent::Reset { .. }))
        .unwrap();
    assert!(tripped_at < reset_at);

    let stats = gate.stats();
    assert_eq!(stats.trips, 1);
    assert_eq!(stats.consecutive_failures, 0);
    assert_eq!(stats.state, BreakerState::Closed);
}

/// 拒绝策略：打开状态下冷却结束前不拨号
#[tokio::test(start_paused = true)]
async fn test_reject_policy_waits_for_cool_down() {
    let cool_down = Duration::from_secs(5);
    let dialer = Arc::new(ScriptedDialer::fail_then_succeed(3));
    let config = test_config(3, cool_down, OpenPolicy::Reject);
    let mut gate = ConnectivityGate::connect(config, dialer.clone(), TARGET).unwrap();

    assert_eq!(gate.acquire().await.unwrap(), 4);

    let dialed_at = dialer.dialed_at();
    assert_eq!(dialed_at.len(), 4);
    assert!(dialed_at[3] - dialed_at[2] >= cool_down);
    assert!(gate.stats().total_rejections >= 1);
}

/// 探测失败后重新冷却，不重复熔断
#[tokio::test(start_paused = true)]
async fn test_failed_trial_attempt_restarts_cool_down() {
    let cool_down = Duration::from_secs(1);
    let dialer = Arc::new(ScriptedDialer::fail_then_succeed(4));
    let config = test_config(3, cool_down, OpenPolicy::Reject);
    let mut gate = ConnectivityGate::connect(config, dialer.clone(), TARGET).unwrap();
    let mut events = gate.subscribe();

    assert_eq!(gate.acquire().await.unwrap(), 5);

    let dialed_at = dialer.dialed_at();
    assert!(dialed_at[3] - dialed_at[2] >= cool_down);
    assert!(dialed_at[4] - dialed_at[3] >= cool_down);

    let events = events.drain();
    assert_eq!(count(&events, |e| matches!(e, BreakerEvent::Tripped { .. })), 1);
    assert_eq!(count(&events, |e| matches!(e, BreakerEvent::CoolDownElapsed)), 2);
    assert_eq!(count(&events, |e| matches!(e, BreakerEvent::Reset { .. })), 1);
}

/// 尝试策略：打开状态下继续按退避拨号
#[tokio::test(start_paused = true)]
async fn test_attempt_policy_keeps_dialing() {
    let dialer = Arc::new(ScriptedDialer::fail_then_succeed(5));
    let config = test_config(2, Duration::from_secs(3600), OpenPolicy::Attempt);
    let mut gate = ConnectivityGate::connect(config, dialer.clone(), TARGET).unwrap();
    let mut events = gate.subscribe();

    let started = Instant::now();
    assert_eq!(gate.acquire().await.unwrap(), 6);
    assert!(started.elapsed() < Duration::from_secs(60));

    let events = events.drain();
    assert_eq!(count(&events, |e| matches!(e, BreakerEvent::Rejected { .. })), 0);
    assert_eq!(count(&events, |e| matches!(e, BreakerEvent::Tripped { .. })), 1);
    assert_eq!(count(&events, |e| matches!(e, BreakerEvent::Reset { .. })), 1);
}

/// 退避间隔指数增长且不超过上限
#[tokio::test(start_paused = true)]
async fn test_backoff_between_attempts() {
    let dialer = Arc::new(ScriptedDialer::fail_then_succeed(6));
    let config = test_config(100, Duration::from_secs(1), OpenPolicy::Reject);
    let mut gate = ConnectivityGate::connect(config, dialer.clone(), TARGET).unwrap();

    gate.acquire().await.unwrap();

    let gaps: Vec<Duration> = dialer
        .dialed_at()
        .windows(2)
        .map(|pair| pair[1] - pair[0])
        .collect();
    let expected = [10, 20, 40, 80, 100, 100].map(Duration::from_millis);
    assert_eq!(gaps, expected);
}

/// 非法地址在任何拨号之前失败
#[tokio::test]
async fn test_invalid_target_never_dials() {
    let dialer = Arc::new(ScriptedDialer::fail_then_succeed(0));

    for address in ["localhost", "localhost:0", "localhost:99999", "", "bad host:5672"] {
        let config = test_config(10, Duration::from_secs(1), OpenPolicy::Reject);
        let err = ConnectivityGate::connect(config, dialer.clone(), address).unwrap_err();
        assert!(
            matches!(err, GateError::InvalidTarget { .. }),
            "{}: {:?}",
            address,
            err
        );
        assert!(err.is_fatal());
    }
    assert_eq!(dialer.attempts(), 0);
}

/// 不可重试错误立即返回
#[tokio::test(start_paused = true)]
async fn test_fatal_error_surfaces_immediately() {
    let dialer = Arc::new(ScriptedDialer::new(vec![Outcome::Fail], Outcome::Fatal));
    let config = test_config(10, Duration::from_secs(1), OpenPolicy::Reject);
    let mut gate = ConnectivityGate::connect(config, dialer.clone(), TARGET).unwrap();

    let err = gate.acquire().await.unwrap_err();
    assert!(matches!(err, GateError::Fatal { .. }));
    assert_eq!(dialer.attempts(), 2);
}

/// 取消后返回取消结果，不返回句柄
#[tokio::test(start_paused = true)]
async fn test_cancel_while_retrying() {
    let dialer = Arc::new(ScriptedDialer::always_fail());
    let config = test_config(3, Duration::from_secs(1), OpenPolicy::Reject);
    let gate = ConnectivityGate::connect(config, dialer.clone(), TARGET).unwrap();

    let pending = gate.spawn();
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(!pending.is_finished());
    assert_eq!(pending.state(), BreakerState::Open);

    pending.cancel();
    let err = pending.wait().await.unwrap_err();
    match err {
        GateError::Cancelled { attempts } => {
            assert!(attempts > 0);
            assert_eq!(attempts, dialer.attempts());
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

/// 拨号进行中取消，立即返回
#[tokio::test(start_paused = true)]
async fn test_cancel_during_dial() {
    let dialer = Arc::new(ScriptedDialer::new(
        Vec::new(),
        Outcome::Hang(Duration::from_secs(3600)),
    ));
    let config = test_config(3, Duration::from_secs(1), OpenPolicy::Reject);
    let gate = ConnectivityGate::connect(config, dialer.clone(), TARGET).unwrap();
    let token = gate.cancellation_token();

    let pending = gate.spawn();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let cancelled_at = Instant::now();
    token.cancel();
    let (gate, result) = pending.wait_with_gate().await;

    assert!(cancelled_at.elapsed() < Duration::from_millis(10));
    assert!(result.unwrap_err().is_cancelled());
    assert_eq!(dialer.attempts(), 1);
    // 中途取消的拨号不计入熔断器
    assert_eq!(gate.unwrap().stats().total_failures, 0);
}

/// 预先取消的令牌不会触发拨号
#[tokio::test(start_paused = true)]
async fn test_pre_cancelled_token() {
    let dialer = Arc::new(ScriptedDialer::fail_then_succeed(0));
    let token = tokio_util::sync::CancellationToken::new();
    token.cancel();

    let config = test_config(3, Duration::from_secs(1), OpenPolicy::Reject);
    let mut gate = ConnectivityGate::connect(config, dialer.clone(), TARGET)
        .unwrap()
        .with_cancellation(token);

    let err = gate.acquire().await.unwrap_err();
    assert!(matches!(err, GateError::Cancelled { attempts: 0 }));
    assert_eq!(dialer.attempts(), 0);
}

/// 超过最大等待时间
#[tokio::test(start_paused = true)]
async fn test_max_wait_exceeded() {
    let max_wait = Duration::from_secs(2);
    let dialer = Arc::new(ScriptedDialer::always_fail());
    let config = test_config(3, Duration::from_millis(500), OpenPolicy::Reject).max_wait(max_wait);
    let mut gate = ConnectivityGate::connect(config, dialer.clone(), TARGET).unwrap();

    let err = gate.acquire().await.unwrap_err();
    match err {
        GateError::MaxWaitExceeded { waited, attempts } => {
            assert!(waited >= max_wait);
            assert!(waited < max_wait + Duration::from_millis(100));
            assert_eq!(attempts, dialer.attempts());
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

/// 拨号挂起时最大等待时间同样生效
#[tokio::test(start_paused = true)]
async fn test_max_wait_bounds_hanging_dial() {
    let dialer = Arc::new(ScriptedDialer::new(
        Vec::new(),
        Outcome::Hang(Duration::from_secs(3600)),
    ));
    let config = test_config(3, Duration::from_secs(1), OpenPolicy::Reject)
        .max_wait(Duration::from_secs(1));
    let mut gate = ConnectivityGate::connect(config, dialer.clone(), TARGET).unwrap();

    let err = gate.acquire().await.unwrap_err();
    assert!(matches!(err, GateError::MaxWaitExceeded { attempts: 1, .. }));
}

/// 单次拨号超时视为瞬时失败
#[tokio::test(start_paused = true)]
async fn test_dial_timeout_is_transient() {
    let dialer = Arc::new(ScriptedDialer::new(
        vec![Outcome::Hang(Duration::from_secs(3600))],
        Outcome::Succeed,
    ));
    let config = test_config(3, Duration::from_secs(1), OpenPolicy::Reject)
        .dial_timeout(Duration::from_millis(200));
    let mut gate = ConnectivityGate::connect(config, dialer.clone(), TARGET).unwrap();

    assert_eq!(gate.acquire().await.unwrap(), 2);
    assert_eq!(gate.stats().total_failures, 1);
}

/// 后台等待并读取事件
#[tokio::test(start_paused = true)]
async fn test_spawned_acquire_events() {
    let dialer = Arc::new(ScriptedDialer::fail_then_succeed(3));
    let config = test_config(3, Duration::from_millis(200), OpenPolicy::Reject);
    let gate = ConnectivityGate::connect(config, dialer, TARGET).unwrap();

    let mut pending = gate.spawn();
    let mut events = pending.take_events().unwrap();
    assert!(pending.take_events().is_none());

    assert_eq!(pending.wait().await.unwrap(), 4);

    let mut transitions = Vec::new();
    while let Some(event) = events.recv().await {
        if event.is_transition() {
            transitions.push(event);
        }
    }
    assert_eq!(
        transitions,
        vec![
            BreakerEvent::Tripped {
                consecutive_failures: 3
            },
            BreakerEvent::Reset {
                previous_failures: 3
            },
        ]
    );
}

/// 丢弃未等待的后台任务后不再拨号
#[tokio::test(start_paused = true)]
async fn test_dropped_pending_stops_dialing() {
    let dialer = Arc::new(ScriptedDialer::always_fail());
    let config = test_config(100, Duration::from_secs(1), OpenPolicy::Reject);
    let gate = ConnectivityGate::connect(config, dialer.clone(), TARGET).unwrap();

    let mut pending = gate.spawn();
    let mut events = pending.take_events().unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;
    let attempts = dialer.attempts();
    assert!(attempts > 1);

    drop(pending);
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(dialer.attempts(), attempts);

    events.drain();
    assert_eq!(events.recv().await, None);
}

/// 允许的最大时长不会溢出
#[tokio::test(start_paused = true)]
async fn test_longest_accepted_durations() {
    let longest = Duration::from_millis(MAX_CONFIG_DURATION_MS);
    let config = GateConfig::default()
        .breaker(BreakerConfig::new(1, longest))
        .backoff(
            BackoffConfig::new(longest, longest)
                .multiplier(MAX_BACKOFF_MULTIPLIER)
                .jitter(1.0),
        )
        .dial_timeout(longest);
    config.validate().unwrap();

    let dialer = Arc::new(ScriptedDialer::fail_then_succeed(1));
    let mut gate = ConnectivityGate::connect(config.clone(), dialer, TARGET).unwrap();

    let started = Instant::now();
    assert_eq!(gate.acquire().await.unwrap(), 2);
    assert!(started.elapsed() >= longest);
    assert!(started.elapsed() < longest * 2);
    assert_eq!(gate.stats().trips, 1);

    let dialer = Arc::new(ScriptedDialer::always_fail());
    let mut gate = ConnectivityGate::connect(config.max_wait(longest), dialer, TARGET).unwrap();
    let err = gate.acquire().await.unwrap_err();
    assert!(matches!(err, GateError::MaxWaitExceeded { waited, .. } if waited >= longest));
}

/// 成功后可再次等待，统计累计
#[tokio::test(start_paused = true)]
async fn test_acquire_again_after_success() {
    let dialer = Arc::new(ScriptedDialer::new(
        vec![Outcome::Fail, Outcome::Succeed, Outcome::Fail],
        Outcome::Succeed,
    ));
    let config = test_config(5, Duration::from_secs(1), OpenPolicy::Reject);
    let mut gate = ConnectivityGate::connect(config, dialer, TARGET).unwrap();

    assert_eq!(gate.acquire().await.unwrap(), 2);
    assert_eq!(gate.acquire().await.unwrap(), 4);

    let stats = gate.stats();
    assert_eq!(stats.total_successes, 2);
    assert_eq!(stats.total_failures, 2);
    assert_eq!(stats.consecutive_failures, 0);
}
