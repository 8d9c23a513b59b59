//! Supervisor behavior against a scripted heater.

use async_trait::async_trait;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use vevor_ble_bridge::{
    CommandKind, CommandOutcome, ConnectionState, Connector, Error, HeaterControl, Rejection,
    Result, StatusSnapshot, Supervisor, SupervisorConfig, SupervisorState, TelemetryPublisher,
    TopicRole,
};

/// What the fake heater reports and how it misbehaves.
struct Heater {
    temperature: AtomicI16Cell,
    level: AtomicU32,
    mode: AtomicU32,
    error_code: AtomicU32,
    responsive: AtomicBool,
    fail_next: AtomicBool,
    fail_set: AtomicBool,
    delay: Mutex<Duration>,
    calls: Mutex<Vec<String>>,
    in_flight: AtomicBool,
    overlaps: AtomicU32,
    disconnects: AtomicU32,
}

/// `i16` stored in an atomic.
struct AtomicI16Cell(AtomicU32);

impl AtomicI16Cell {
    fn new(value: i16) -> Self {
        Self(AtomicU32::new(value as u16 as u32))
    }

    fn get(&self) -> i16 {
        self.0.load(Ordering::SeqCst) as u16 as i16
    }

    fn set(&self, value: i16) {
        self.0.store(value as u16 as u32, Ordering::SeqCst);
    }
}

impl Heater {
    fn new(temperature: i16, level: u16) -> Arc<Self> {
        Arc::new(Self {
            temperature: AtomicI16Cell::new(temperature),
            level: AtomicU32::new(level as u32),
            mode: AtomicU32::new(1),
            error_code: AtomicU32::new(0),
            responsive: AtomicBool::new(true),
            fail_next: AtomicBool::new(false),
            fail_set: AtomicBool::new(false),
            delay: Mutex::new(Duration::ZERO),
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicBool::new(false),
            overlaps: AtomicU32::new(0),
            disconnects: AtomicU32::new(0),
        })
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// A standard frame in level mode, step Running.
    fn frame(&self) -> Vec<u8> {
        let mut data = vec![0u8; 18];
        data[0] = 0xAA;
        data[1] = 0x55;
        data[3] = 1;
        data[4] = self.error_code.load(Ordering::SeqCst) as u8;
        data[5] = 3;
        data[8] = self.mode.load(Ordering::SeqCst) as u8;
        data[9] = self.level.load(Ordering::SeqCst) as u8;
        data[11..13].copy_from_slice(&125u16.to_le_bytes());
        data[13..15].copy_from_slice(&self.temperature.get().to_le_bytes());
        data[15..17].copy_from_slice(&18i16.to_le_bytes());
        data
    }

    async fn exchange(&self, call: String) -> Result<Option<StatusSnapshot>> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.calls.lock().push(call);
        self.in_flight.store(false, Ordering::SeqCst);

        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(Error::LinkDisconnected {
                reason: "write failed".to_string(),
            });
        }
        if !self.responsive.load(Ordering::SeqCst) {
            return Ok(None);
        }
        Ok(Some(StatusSnapshot::decode(&self.frame())?))
    }
}

struct FakeLink {
    heater: Arc<Heater>,
    state: ConnectionState,
}

impl FakeLink {
    async fn exchange(&mut self, call: String) -> Result<Option<StatusSnapshot>> {
        if !self.state.is_connected() {
            return Err(Error::NotConnected);
        }
        let result = self.heater.exchange(call).await;
        if matches!(result, Err(Error::LinkDisconnected { .. })) {
            self.state = ConnectionState::Disconnected;
        }
        result
    }
}

#[async_trait]
impl HeaterControl for FakeLink {
    async fn get_status(&mut self) -> Result<Option<StatusSnapshot>> {
        self.exchange("status".to_string()).await
    }

    async fn start(&mut self) -> Result<Option<StatusSnapshot>> {
        self.exchange("start".to_string()).await
    }

    async fn stop(&mut self) -> Result<Option<StatusSnapshot>> {
        self.exchange("stop".to_string()).await
    }

    async fn set_level_or_temperature(&mut self, value: u16) -> Result<Option<StatusSnapshot>> {
        if self.heater.fail_set.swap(false, Ordering::SeqCst) {
            self.state = ConnectionState::Disconnected;
            return Err(Error::LinkDisconnected {
                reason: "write failed".to_string(),
            });
        }
        self.heater.level.store(value as u32, Ordering::SeqCst);
        self.exchange(format!("set {}", value)).await
    }

    async fn set_mode(&mut self, mode: u8) -> Result<Option<StatusSnapshot>> {
        self.exchange(format!("mode {}", mode)).await
    }

    async fn disconnect(&mut self) {
        if self.state.is_connected() {
            self.heater.disconnects.fetch_add(1, Ordering::SeqCst);
        }
        self.state = ConnectionState::Disconnected;
    }

    fn connection_state(&self) -> ConnectionState {
        self.state
    }
}

struct FakeConnector {
    heater: Arc<Heater>,
    connects: AtomicU32,
    failures_left: AtomicU32,
    fatal: AtomicBool,
    resets: AtomicU32,
}

impl FakeConnector {
    fn new(heater: Arc<Heater>) -> Self {
        Self {
            heater,
            connects: AtomicU32::new(0),
            failures_left: AtomicU32::new(0),
            fatal: AtomicBool::new(false),
            resets: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl Connector for FakeConnector {
    type Link = FakeLink;

    async fn connect(&self) -> Result<FakeLink> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.fatal.load(Ordering::SeqCst) {
            return Err(Error::ServiceNotFound {
                uuid: "0000ffe0-0000-1000-8000-00805f9b34fb".to_string(),
            });
        }
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::SeqCst);
            return Err(Error::ConnectTimeout {
                address: "AA:BB:CC:DD:EE:FF".to_string(),
                timeout_secs: 10,
            });
        }
        Ok(FakeLink {
            heater: self.heater.clone(),
            state: ConnectionState::Connected,
        })
    }

    async fn reset_adapter(&self) -> Result<()> {
        self.resets.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
struct RecordingPublisher {
    messages: Mutex<Vec<(TopicRole, String)>>,
}

impl RecordingPublisher {
    fn last(&self, role: TopicRole) -> Option<String> {
        self.messages
            .lock()
            .iter()
            .rev()
            .find(|(r, _)| *r == role)
            .map(|(_, v)| v.clone())
    }
}

#[async_trait]
impl TelemetryPublisher for RecordingPublisher {
    async fn publish(&self, role: TopicRole, value: String) -> Result<()> {
        self.messages.lock().push((role, value));
        Ok(())
    }
}

type TestSupervisor = Supervisor<FakeConnector, Arc<RecordingPublisher>>;

fn supervisor(
    config: SupervisorConfig,
    heater: &Arc<Heater>,
) -> (TestSupervisor, Arc<RecordingPublisher>) {
    let publisher = Arc::new(RecordingPublisher::default());
    let supervisor = Supervisor::new(
        Arc::new(config.with_connect_timeouts(Duration::from_secs(10), Duration::from_secs(1))),
        FakeConnector::new(heater.clone()),
        publisher.clone(),
    );
    (supervisor, publisher)
}

fn config() -> SupervisorConfig {
    SupervisorConfig::new("AA:BB:CC:DD:EE:FF")
}

#[tokio::test(start_paused = true)]
async fn test_first_cycle_connects_and_publishes() {
    let heater = Heater::new(30, 5);
    let (supervisor, publisher) = supervisor(config(), &heater);

    let delay = supervisor.cycle().await.unwrap();
    assert_eq!(delay, Duration::from_secs(2));
    assert_eq!(supervisor.state(), SupervisorState::Connected);
    assert_eq!(heater.calls(), vec!["status"]);

    let status = supervisor.status();
    assert_eq!(status.connection, ConnectionState::Connected);
    assert_eq!(status.device_level, Some(5));
    assert_eq!(status.case_temperature, 30);
    assert!(status.last_poll_at.is_some());

    assert_eq!(publisher.last(TopicRole::Status).as_deref(), Some("Running"));
    assert_eq!(publisher.last(TopicRole::Level).as_deref(), Some("5"));
    assert_eq!(
        publisher.last(TopicRole::StopAvailability).as_deref(),
        Some("online")
    );
}

#[tokio::test(start_paused = true)]
async fn test_overheat_scenario() {
    let heater = Heater::new(38, 5);
    let config = config()
        .with_overheat_threshold(50)
        .with_watchdog_timeout(Duration::from_secs(600));
    let (supervisor, publisher) = supervisor(config, &heater);

    supervisor.cycle().await.unwrap();
    let status = supervisor.status();
    assert_eq!(status.level_cap, 36);
    assert!(!status.overheat.active);
    assert_eq!(status.state, SupervisorState::Connected);

    heater.temperature.set(50);
    supervisor.cycle().await.unwrap();
    let status = supervisor.status();
    assert_eq!(status.level_cap, 1);
    assert!(status.overheat.active);
    assert_eq!(status.state, SupervisorState::OverheatActive);
    assert_eq!(heater.calls(), vec!["status", "status", "set 1"]);
    assert_eq!(
        publisher.last(TopicRole::OverheatLockout).as_deref(),
        Some("Active (60s remaining)")
    );
    assert_eq!(
        publisher.last(TopicRole::LevelCap).as_deref(),
        Some("Active: max level 1")
    );

    let outcome = supervisor
        .handle_command(CommandKind::Level, b"8")
        .await
        .unwrap();
    assert_eq!(
        outcome,
        CommandOutcome::Rejected(Rejection::OverheatLockout { remaining_secs: 60 })
    );
    assert_eq!(
        publisher.last(TopicRole::Notice).as_deref(),
        Some("OVERHEAT LOCKOUT: 60s remaining")
    );
    assert_eq!(heater.calls().len(), 3);

    // Stop is never locked out.
    let outcome = supervisor
        .handle_command(CommandKind::Stop, b"")
        .await
        .unwrap();
    assert!(matches!(outcome, CommandOutcome::Applied(Some(_))));

    // Cooled below the threshold but still close to it.
    tokio::time::advance(Duration::from_secs(61)).await;
    heater.temperature.set(40);
    supervisor.cycle().await.unwrap();
    let status = supervisor.status();
    assert!(!status.overheat.active);
    assert_eq!(status.level_cap, 10);
    assert_eq!(
        status.state,
        SupervisorState::TemperatureLimiting { max_level: 10 }
    );
    assert_eq!(
        publisher.last(TopicRole::OverheatLockout).as_deref(),
        Some("Inactive")
    );

    let outcome = supervisor
        .handle_command(CommandKind::Level, b"20")
        .await
        .unwrap();
    assert!(matches!(outcome, CommandOutcome::Applied(_)));
    assert_eq!(heater.calls().last().map(String::as_str), Some("set 10"));

    // Already at 10: nothing is sent.
    let outcome = supervisor
        .handle_command(CommandKind::Level, b"10")
        .await
        .unwrap();
    assert_eq!(outcome, CommandOutcome::Suppressed { value: 10 });
}

#[tokio::test(start_paused = true)]
async fn test_heater_overheat_code_engages_guard() {
    let heater = Heater::new(30, 1);
    heater.error_code.store(9, Ordering::SeqCst);
    let (supervisor, publisher) = supervisor(config(), &heater);

    supervisor.cycle().await.unwrap();
    assert_eq!(supervisor.state(), SupervisorState::OverheatActive);
    // Already at level 1: no forced command.
    assert_eq!(heater.calls(), vec!["status"]);
    assert_eq!(
        publisher.last(TopicRole::Status).as_deref(),
        Some("Running (Overheating) [Overheat Active]")
    );
}

#[tokio::test(start_paused = true)]
async fn test_cap_reduces_running_level() {
    let heater = Heater::new(251, 20);
    let (supervisor, _) = supervisor(config(), &heater);

    supervisor.cycle().await.unwrap();
    assert_eq!(heater.calls(), vec!["status", "set 6"]);
    assert_eq!(
        supervisor.state(),
        SupervisorState::TemperatureLimiting { max_level: 6 }
    );
}

#[tokio::test(start_paused = true)]
async fn test_consecutive_misses_force_reconnect() {
    let heater = Heater::new(30, 5);
    heater.responsive.store(false, Ordering::SeqCst);
    let (supervisor, _) = supervisor(config(), &heater);

    assert_eq!(supervisor.cycle().await.unwrap(), Duration::from_secs(2));
    assert_eq!(supervisor.status().consecutive_failures, 1);

    assert_eq!(supervisor.cycle().await.unwrap(), Duration::from_secs(5));
    assert_eq!(supervisor.state(), SupervisorState::WatchdogTriggered);
    assert_eq!(heater.disconnects.load(Ordering::SeqCst), 1);
    assert_eq!(supervisor.status().connection, ConnectionState::Disconnected);

    heater.responsive.store(true, Ordering::SeqCst);
    supervisor.cycle().await.unwrap();
    assert_eq!(supervisor.connector().connects.load(Ordering::SeqCst), 2);
    assert_eq!(supervisor.state(), SupervisorState::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_watchdog_forces_reconnect() {
    let heater = Heater::new(30, 5);
    heater.responsive.store(false, Ordering::SeqCst);
    let mut config = config();
    config.max_consecutive_failures = 100;
    let (supervisor, _) = supervisor(config, &heater);

    supervisor.cycle().await.unwrap();
    for _ in 0..5 {
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(supervisor.cycle().await.unwrap(), Duration::from_secs(2));
    }
    assert_eq!(heater.disconnects.load(Ordering::SeqCst), 0);

    tokio::time::advance(Duration::from_secs(2)).await;
    assert_eq!(supervisor.cycle().await.unwrap(), Duration::from_secs(5));
    assert_eq!(supervisor.state(), SupervisorState::WatchdogTriggered);
    assert_eq!(heater.disconnects.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_backoff_escalates() {
    let heater = Heater::new(30, 5);
    let (supervisor, publisher) = supervisor(config(), &heater);
    supervisor
        .connector()
        .failures_left
        .store(10, Ordering::SeqCst);

    for _ in 0..4 {
        assert_eq!(supervisor.cycle().await.unwrap(), Duration::from_secs(5));
        assert_eq!(supervisor.state(), SupervisorState::Timeout);
    }
    assert_eq!(supervisor.cycle().await.unwrap(), Duration::from_secs(15));
    assert_eq!(supervisor.state(), SupervisorState::ConnectionFailed);
    assert_eq!(
        publisher.last(TopicRole::Status).as_deref(),
        Some("Connection Failed")
    );
    assert_eq!(supervisor.connector().resets.load(Ordering::SeqCst), 0);

    // Sixth attempt follows five failed connects: adapter reset, normal backoff again.
    assert_eq!(supervisor.cycle().await.unwrap(), Duration::from_secs(5));
    assert_eq!(supervisor.connector().resets.load(Ordering::SeqCst), 1);
    assert_eq!(supervisor.status().failed_reconnects, 6);
}

#[tokio::test(start_paused = true)]
async fn test_fatal_error_stops_run() {
    let heater = Heater::new(30, 5);
    let (supervisor, publisher) = supervisor(config(), &heater);
    supervisor.connector().fatal.store(true, Ordering::SeqCst);

    let result = supervisor.run(std::future::pending()).await;
    assert!(matches!(result, Err(Error::ServiceNotFound { .. })));
    assert_eq!(supervisor.connector().connects.load(Ordering::SeqCst), 1);
    assert_eq!(
        publisher.last(TopicRole::StartAvailability).as_deref(),
        Some("offline")
    );
}

#[tokio::test(start_paused = true)]
async fn test_command_while_disconnected() {
    let heater = Heater::new(30, 5);
    let (supervisor, publisher) = supervisor(config(), &heater);

    let outcome = supervisor
        .handle_command(CommandKind::Start, b"")
        .await
        .unwrap();
    assert_eq!(outcome, CommandOutcome::Rejected(Rejection::Disconnected));
    assert_eq!(
        publisher.last(TopicRole::Notice).as_deref(),
        Some("Disconnected - command ignored")
    );
    assert!(heater.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_invalid_payload_is_validation_error() {
    let heater = Heater::new(30, 5);
    let (supervisor, _) = supervisor(config(), &heater);
    supervisor.cycle().await.unwrap();

    let err = supervisor
        .handle_command(CommandKind::Mode, b"Turbo")
        .await
        .unwrap_err();
    assert!(err.is_validation());
    assert_eq!(supervisor.state(), SupervisorState::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_command_failure_routes_to_reconnect() {
    let heater = Heater::new(30, 5);
    let (supervisor, _) = supervisor(config(), &heater);
    supervisor.cycle().await.unwrap();

    heater.fail_next.store(true, Ordering::SeqCst);
    let result = supervisor.handle_command(CommandKind::Start, b"").await;
    assert!(matches!(result, Err(Error::LinkDisconnected { .. })));
    assert_eq!(supervisor.state(), SupervisorState::Disconnected);
    assert_eq!(supervisor.status().connection, ConnectionState::Disconnected);
    assert_eq!(supervisor.status().reconnect_attempts, 1);

    supervisor.cycle().await.unwrap();
    assert_eq!(supervisor.connector().connects.load(Ordering::SeqCst), 2);
    assert_eq!(supervisor.state(), SupervisorState::Connected);
    assert_eq!(supervisor.status().reconnect_attempts, 0);
}

#[tokio::test(start_paused = true)]
async fn test_command_failures_count_toward_escalation() {
    let heater = Heater::new(30, 5);
    let (supervisor, _) = supervisor(config(), &heater);
    supervisor.cycle().await.unwrap();

    heater.fail_next.store(true, Ordering::SeqCst);
    supervisor
        .handle_command(CommandKind::Start, b"")
        .await
        .unwrap_err();
    supervisor
        .connector()
        .failures_left
        .store(10, Ordering::SeqCst);

    // The command drop was the first recovery, so escalation comes one cycle early.
    for _ in 0..3 {
        assert_eq!(supervisor.cycle().await.unwrap(), Duration::from_secs(5));
    }
    assert_eq!(supervisor.cycle().await.unwrap(), Duration::from_secs(15));
    assert_eq!(supervisor.state(), SupervisorState::ConnectionFailed);
}

#[tokio::test(start_paused = true)]
async fn test_undecodable_status_routes_to_error() {
    let heater = Heater::new(30, 5);
    let (supervisor, publisher) = supervisor(config(), &heater);
    supervisor.cycle().await.unwrap();

    heater.mode.store(3, Ordering::SeqCst);
    assert_eq!(supervisor.cycle().await.unwrap(), Duration::from_secs(5));
    assert_eq!(supervisor.state(), SupervisorState::Error);
    assert_eq!(publisher.last(TopicRole::Status).as_deref(), Some("Error"));
    assert_eq!(
        publisher.last(TopicRole::LevelAvailability).as_deref(),
        Some("offline")
    );
    assert_eq!(heater.disconnects.load(Ordering::SeqCst), 1);
    assert_eq!(supervisor.status().reconnect_attempts, 1);

    heater.mode.store(1, Ordering::SeqCst);
    supervisor.cycle().await.unwrap();
    assert_eq!(supervisor.connector().connects.load(Ordering::SeqCst), 2);
    assert_eq!(supervisor.state(), SupervisorState::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_link_down_after_forced_reduction_reconnects() {
    let heater = Heater::new(251, 20);
    heater.fail_set.store(true, Ordering::SeqCst);
    let (supervisor, _) = supervisor(config(), &heater);

    // The poll itself was answered; the failed reduction leaves the link down.
    assert_eq!(supervisor.cycle().await.unwrap(), Duration::from_secs(2));
    assert_eq!(supervisor.cycle().await.unwrap(), Duration::from_secs(5));
    assert_eq!(supervisor.state(), SupervisorState::Disconnected);
    // No exchange is attempted on a link that reports itself down.
    assert_eq!(heater.calls(), vec!["status"]);

    supervisor.cycle().await.unwrap();
    assert_eq!(supervisor.connector().connects.load(Ordering::SeqCst), 2);
    assert_eq!(heater.calls(), vec!["status", "status", "set 6"]);
    assert_eq!(
        supervisor.state(),
        SupervisorState::TemperatureLimiting { max_level: 6 }
    );
}

#[tokio::test(start_paused = true)]
async fn test_expired_lockout_admits_commands_before_next_poll() {
    let heater = Heater::new(50, 5);
    let config = config()
        .with_overheat_threshold(50)
        .with_watchdog_timeout(Duration::from_secs(600));
    let (supervisor, _) = supervisor(config, &heater);
    supervisor.cycle().await.unwrap();
    assert_eq!(supervisor.state(), SupervisorState::OverheatActive);

    // Polls go unanswered, so nothing releases the guard.
    heater.responsive.store(false, Ordering::SeqCst);
    tokio::time::advance(Duration::from_secs(61)).await;
    assert!(supervisor.status().overheat.active);

    let outcome = supervisor
        .handle_command(CommandKind::Mode, b"Temperature")
        .await
        .unwrap();
    assert_eq!(outcome, CommandOutcome::Applied(None));
    assert_eq!(heater.calls().last().map(String::as_str), Some("mode 2"));
}

#[tokio::test(start_paused = true)]
async fn test_commands_and_polls_never_overlap() {
    let heater = Heater::new(30, 5);
    *heater.delay.lock() = Duration::from_millis(300);
    let (supervisor, _) = supervisor(config(), &heater);
    let supervisor = Arc::new(supervisor);
    supervisor.cycle().await.unwrap();

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let runner = {
        let supervisor = supervisor.clone();
        tokio::spawn(async move {
            supervisor
                .run(async {
                    let _ = stop_rx.await;
                })
                .await
        })
    };

    let mut handles = Vec::new();
    for i in 0..8 {
        let supervisor = supervisor.clone();
        let kind = if i % 2 == 0 {
            CommandKind::Start
        } else {
            CommandKind::Stop
        };
        handles.push(tokio::spawn(async move {
            supervisor.handle_command(kind, b"").await
        }));
    }

    let mut applied = 0;
    for handle in handles {
        match handle.await.unwrap().unwrap() {
            CommandOutcome::Applied(_) => applied += 1,
            CommandOutcome::Rejected(Rejection::Busy) => {}
            other => panic!("unexpected outcome {:?}", other),
        }
    }
    tokio::time::sleep(Duration::from_secs(10)).await;

    let _ = stop_tx.send(());
    runner.await.unwrap().unwrap();

    assert!(applied > 0);
    assert_eq!(heater.overlaps.load(Ordering::SeqCst), 0);
    assert_eq!(supervisor.state(), SupervisorState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_busy_transport_rejects_command() {
    let heater = Heater::new(30, 5);
    *heater.delay.lock() = Duration::from_secs(10);
    let config = config()
        .with_command_lock_timeout(Duration::from_secs(1))
        .with_watchdog_timeout(Duration::from_secs(600));
    let (supervisor, publisher) = supervisor(config, &heater);
    let supervisor = Arc::new(supervisor);
    supervisor.cycle().await.unwrap();

    let poller = {
        let supervisor = supervisor.clone();
        tokio::spawn(async move { supervisor.cycle().await })
    };
    tokio::task::yield_now().await;

    let outcome = supervisor
        .handle_command(CommandKind::Start, b"")
        .await
        .unwrap();
    assert_eq!(outcome, CommandOutcome::Rejected(Rejection::Busy));
    assert_eq!(
        publisher.last(TopicRole::Notice).as_deref(),
        Some("BLE busy - command ignored")
    );
    poller.await.unwrap().unwrap();
}
