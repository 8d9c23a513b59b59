//! Connection supervisor.
//!
//! The [`Supervisor`] owns the single live [`HeaterControl`] link. Its poll
//! loop requests status, enforces the temperature cap and overheat lockout,
//! and routes every link failure through one recovery path: tear the link
//! down, publish the new state, back off, reconnect.
//!
//! Commands from the telemetry side run on their own tasks and share the
//! link with the poll loop through an async transport lock, so at most one
//! frame exchange is in flight at any time. Bookkeeping lives behind a
//! separate synchronous lock that is never held across an await.

pub mod gate;
pub mod level_cap;
pub mod overheat;
pub mod state;

pub use gate::{
    Admission, Command, CommandGate, CommandKind, CommandOutcome, GateContext, Rejection,
};
pub use level_cap::{LevelCapPolicy, UNRESTRICTED};
pub use overheat::{GuardUpdate, OverheatGuard};
pub use state::{OverheatStatus, SupervisorState, SupervisorStatus};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::ble::connection::ConnectionState;
use crate::config::SupervisorConfig;
use crate::error::{Error, Result};
use crate::link::{Connector, HeaterControl};
use crate::protocol::status::StatusSnapshot;
use crate::telemetry::{
    level_cap_message, lockout_message, snapshot_messages, TelemetryPublisher, TopicRole,
};

/// Interval of the periodic health log.
const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(30);

/// Minimum spacing of "command clamped" warnings.
const CLAMP_WARNING_INTERVAL: Duration = Duration::from_secs(30);

/// Failed publishes in a row before the publisher is reported unhealthy.
const MAX_PUBLISH_FAILURES: u32 = 3;

/// Mutable bookkeeping shared by the poll loop and command handlers.
#[derive(Debug)]
struct Inner {
    /// Observable state.
    state: SupervisorState,
    /// Link state as tracked by the supervisor.
    connection: ConnectionState,
    /// Overheat lockout.
    guard: OverheatGuard,
    /// Current level cap.
    level_cap: u16,
    /// Last reported case temperature.
    case_temperature: i16,
    /// Last reported level.
    device_level: Option<u16>,
    /// Last reported setpoint.
    device_setpoint: Option<u8>,
    /// Last successful poll (or connect).
    last_success: Instant,
    /// Wall-clock time of the last successful poll.
    last_poll_at: Option<DateTime<Utc>>,
    /// Most recent decoded status.
    last_snapshot: Option<StatusSnapshot>,
    /// Unanswered polls in a row.
    consecutive_failures: u32,
    /// Failed connects since the last successful one.
    failed_reconnects: u32,
    /// Recoveries in a row, drives the backoff.
    reconnect_attempts: u32,
    /// Failed publishes in a row.
    publish_failures: u32,
    /// Last health log.
    last_health_log: Instant,
    /// Last "command clamped" warning.
    last_clamp_warning: Option<Instant>,
}

impl Inner {
    fn new(config: &SupervisorConfig, now: Instant) -> Self {
        Self {
            state: SupervisorState::Disconnected,
            connection: ConnectionState::Disconnected,
            guard: OverheatGuard::new(config),
            level_cap: UNRESTRICTED,
            case_temperature: 0,
            device_level: None,
            device_setpoint: None,
            last_success: now,
            last_poll_at: None,
            last_snapshot: None,
            consecutive_failures: 0,
            failed_reconnects: 0,
            reconnect_attempts: 0,
            publish_failures: 0,
            last_health_log: now,
            last_clamp_warning: None,
        }
    }
}

/// State while the link is up, given the protections in force.
fn connected_state(overheat: bool, cap: u16) -> SupervisorState {
    if overheat {
        SupervisorState::OverheatActive
    } else if LevelCapPolicy::is_limiting(cap) {
        SupervisorState::TemperatureLimiting { max_level: cap }
    } else {
        SupervisorState::Connected
    }
}

/// Keeps one heater link alive and protects the heater.
pub struct Supervisor<C: Connector, P> {
    /// Shared configuration.
    config: Arc<SupervisorConfig>,
    /// Produces new links.
    connector: C,
    /// Telemetry sink.
    publisher: P,
    /// Command admission rules.
    gate: CommandGate,
    /// The live link. Held for the whole of every frame exchange.
    link: tokio::sync::Mutex<Option<C::Link>>,
    /// Bookkeeping. Never held across an await.
    inner: Mutex<Inner>,
}

impl<C, P> Supervisor<C, P>
where
    C: Connector,
    P: TelemetryPublisher,
{
    /// Create a supervisor. Nothing connects until [`poll`](Self::poll) or
    /// [`run`](Self::run) is called.
    pub fn new(config: Arc<SupervisorConfig>, connector: C, publisher: P) -> Self {
        let gate = CommandGate::new(LevelCapPolicy::new(
            config.overheat_threshold,
            config.temperature_limiting,
        ));
        let inner = Inner::new(&config, Instant::now());
        Self {
            config,
            connector,
            publisher,
            gate,
            link: tokio::sync::Mutex::new(None),
            inner: Mutex::new(inner),
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Get the telemetry publisher.
    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    /// Get the connector.
    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Get the current state.
    pub fn state(&self) -> SupervisorState {
        self.inner.lock().state
    }

    /// Snapshot of everything the supervisor tracks.
    pub fn status(&self) -> SupervisorStatus {
        let now = Instant::now();
        let inner = self.inner.lock();
        SupervisorStatus {
            state: inner.state,
            connection: inner.connection,
            overheat: inner.guard.status(now),
            level_cap: inner.level_cap,
            case_temperature: inner.case_temperature,
            device_level: inner.device_level,
            consecutive_failures: inner.consecutive_failures,
            failed_reconnects: inner.failed_reconnects,
            reconnect_attempts: inner.reconnect_attempts,
            since_last_poll: now.saturating_duration_since(inner.last_success),
            last_poll_at: inner.last_poll_at,
            last_snapshot: inner.last_snapshot.clone(),
        }
    }

    /// Run until `shutdown` resolves or a fatal error occurs.
    ///
    /// The link is closed on the way out either way.
    pub async fn run<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!("Supervising heater {}", self.config.ble_address);

        let result = loop {
            let delay = tokio::select! {
                _ = &mut shutdown => break Ok(()),
                next = self.cycle() => match next {
                    Ok(delay) => delay,
                    Err(e) => break Err(e),
                },
            };
            tokio::select! {
                _ = &mut shutdown => break Ok(()),
                _ = tokio::time::sleep(delay) => {}
            }
        };

        self.shutdown().await;
        result
    }

    /// One poll plus failure routing.
    ///
    /// Returns how long to wait before the next cycle: the poll interval after
    /// a successful poll, the reconnect backoff after a routed failure.
    ///
    /// # Errors
    ///
    /// Only fatal errors (wrong hardware) are returned.
    pub async fn cycle(&self) -> Result<Duration> {
        match self.poll().await {
            Ok(()) => Ok(self.config.poll_interval),
            Err(e) if e.is_fatal() => {
                error!("Fatal error, giving up: {}", e);
                let link = self.link.lock().await.take();
                self.discard_link(link, SupervisorState::Error).await;
                Err(e)
            }
            Err(e) => Ok(self.recover(e).await),
        }
    }

    /// Connect if needed, request status and apply the protections.
    ///
    /// Unanswered polls are tolerated up to the configured limit; past it,
    /// or once the watchdog window elapses, an error is returned for the
    /// caller to route.
    pub async fn poll(&self) -> Result<()> {
        let mut slot = self.link.lock().await;
        let link_state = slot.as_ref().map(|link| link.connection_state());
        match link_state {
            Some(state) if !state.is_connected() => {
                return Err(Error::LinkDisconnected {
                    reason: format!("link reports {}", state),
                });
            }
            Some(_) => self.check_watchdog()?,
            None => *slot = Some(self.establish().await?),
        }

        let (answered, messages) = match slot.as_mut() {
            Some(link) => match link.get_status().await? {
                Some(snapshot) => (true, self.on_snapshot(link, snapshot).await),
                None => (false, Vec::new()),
            },
            None => return Err(Error::NotConnected),
        };
        drop(slot);

        self.publish_all(messages).await;
        if answered {
            Ok(())
        } else {
            self.on_missed_poll()
        }
    }

    /// Parse and execute a command payload.
    ///
    /// # Errors
    ///
    /// A validation error for an unusable payload, or the link error that
    /// sent the supervisor back to reconnecting.
    pub async fn handle_command(&self, kind: CommandKind, payload: &[u8]) -> Result<CommandOutcome> {
        let command = match Command::parse(kind, payload) {
            Ok(command) => command,
            Err(e) => {
                warn!("Ignoring {} command: {}", kind, e);
                return Err(e);
            }
        };
        self.execute(command).await
    }

    /// Execute a parsed command.
    ///
    /// Rejections and suppressions are outcomes, not errors. A link failure
    /// during the exchange tears the link down and counts as a recovery, so
    /// the poll loop reconnects with the same escalation as after a failed
    /// poll. The error is returned.
    pub async fn execute(&self, command: Command) -> Result<CommandOutcome> {
        let connected = self.inner.lock().connection.is_connected();
        if !connected {
            return Ok(self.refuse(CommandOutcome::Rejected(Rejection::Disconnected)).await);
        }

        let command = match self.screen(command) {
            Ok(command) => command,
            Err(outcome) => return Ok(self.refuse(outcome).await),
        };

        let lock = tokio::time::timeout(self.config.command_lock_timeout, self.link.lock()).await;
        let mut slot = match lock {
            Ok(slot) => slot,
            Err(_) => {
                warn!(
                    "Transport busy for {:?}, dropping {} command",
                    self.config.command_lock_timeout, command
                );
                return Ok(self.refuse(CommandOutcome::Rejected(Rejection::Busy)).await);
            }
        };

        // The poll loop may have moved on while this command waited.
        let command = match self.screen(command) {
            Ok(command) => command,
            Err(outcome) => {
                drop(slot);
                return Ok(self.refuse(outcome).await);
            }
        };
        if slot.is_none() {
            drop(slot);
            return Ok(self.refuse(CommandOutcome::Rejected(Rejection::Disconnected)).await);
        }

        info!("Sending {} command", command);
        let result = match slot.as_mut() {
            Some(link) => Self::send(link, command).await,
            None => Err(Error::NotConnected),
        };

        match result {
            Ok(snapshot) => {
                drop(slot);
                let state = {
                    let mut inner = self.inner.lock();
                    if let Some(s) = &snapshot {
                        inner.device_level = Some(s.set_level);
                        inner.device_setpoint = s.set_temperature;
                        inner.case_temperature = s.case_temperature;
                        inner.last_snapshot = Some(s.clone());
                    }
                    inner.state
                };
                self.publish_all(snapshot_messages(snapshot.as_ref(), &state))
                    .await;
                Ok(CommandOutcome::Applied(snapshot))
            }
            Err(e) if e.is_validation() => Err(e),
            Err(e) => {
                error!("{} command failed: {}", command, e);
                let link = slot.take();
                drop(slot);
                self.discard_link(link, e.supervisor_state()).await;
                self.count_recovery().await;
                Err(e)
            }
        }
    }

    /// Feed commands from a channel until it closes.
    pub async fn serve_commands(&self, mut commands: mpsc::Receiver<(CommandKind, Bytes)>) {
        while let Some((kind, payload)) = commands.recv().await {
            if let Err(e) = self.handle_command(kind, &payload).await {
                debug!("{} command ended with error: {}", kind, e);
            }
        }
        debug!("Command channel closed");
    }

    /// Close the link and publish the disconnected state.
    pub async fn shutdown(&self) {
        let link = self.link.lock().await.take();
        self.discard_link(link, SupervisorState::Disconnected).await;
        info!("Supervisor stopped");
    }

    async fn send(link: &mut C::Link, command: Command) -> Result<Option<StatusSnapshot>> {
        match command {
            Command::Start => link.start().await,
            Command::Stop => link.stop().await,
            Command::SetLevel(value) | Command::SetTemperature(value) => {
                link.set_level_or_temperature(value).await
            }
            Command::SetMode(mode) => link.set_mode(mode.to_raw()).await,
        }
    }

    /// Apply the admission rules against current bookkeeping.
    ///
    /// `Err` carries the outcome for a command that must not be sent.
    fn screen(&self, command: Command) -> std::result::Result<Command, CommandOutcome> {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let admission = self.gate.admit(
            command,
            &GateContext {
                guard: &inner.guard,
                case_temperature: inner.case_temperature,
                device_level: inner.device_level,
                device_setpoint: inner.device_setpoint,
                now,
            },
        );

        match admission {
            Admission::Forward {
                command: forwarded,
                clamped_from,
            } => {
                if let Some(requested) = clamped_from {
                    let due = inner
                        .last_clamp_warning
                        .map_or(true, |t| now.duration_since(t) >= CLAMP_WARNING_INTERVAL);
                    if due {
                        inner.last_clamp_warning = Some(now);
                        warn!(
                            "{} {} exceeds temperature limit at {}°C, sending {}",
                            command.kind(),
                            requested,
                            inner.case_temperature,
                            forwarded
                        );
                    }
                }
                Ok(forwarded)
            }
            Admission::Suppress { value } => {
                debug!("{} already at {}, command suppressed", command.kind(), value);
                Err(CommandOutcome::Suppressed { value })
            }
            Admission::Reject(rejection) => Err(CommandOutcome::Rejected(rejection)),
        }
    }

    /// Report a command that was not sent.
    async fn refuse(&self, outcome: CommandOutcome) -> CommandOutcome {
        if let CommandOutcome::Rejected(rejection) = &outcome {
            warn!("Command rejected: {}", rejection);
            self.publish(TopicRole::Notice, rejection.to_string()).await;
        }
        outcome
    }

    /// Connect a new link, resetting the adapter first on every Nth failure.
    async fn establish(&self) -> Result<C::Link> {
        let (failed, offline_for) = {
            let mut inner = self.inner.lock();
            inner.connection = ConnectionState::Connecting;
            (inner.failed_reconnects, inner.last_success.elapsed())
        };
        self.transition(SupervisorState::Reconnecting).await;

        let every = self.config.adapter_reset_every;
        if every > 0 && failed > 0 && failed % every == 0 {
            warn!("{} failed reconnects, resetting Bluetooth adapter", failed);
            if let Err(e) = self.connector.reset_adapter().await {
                warn!("Adapter reset failed: {}", e);
            }
        }

        info!(
            "Connecting to {} (offline for {:.1}s)",
            self.config.ble_address,
            offline_for.as_secs_f64()
        );
        match self.connector.connect().await {
            Ok(link) => {
                let state = {
                    let mut inner = self.inner.lock();
                    inner.connection = ConnectionState::Connected;
                    inner.failed_reconnects = 0;
                    inner.reconnect_attempts = 0;
                    inner.consecutive_failures = 0;
                    inner.last_success = Instant::now();
                    connected_state(inner.guard.is_active(), inner.level_cap)
                };
                info!("Connected to heater {}", self.config.ble_address);
                self.transition(state).await;
                Ok(link)
            }
            Err(e) => {
                let mut inner = self.inner.lock();
                inner.connection = ConnectionState::Disconnected;
                inner.failed_reconnects += 1;
                warn!(
                    "Connect failed ({} in a row): {}",
                    inner.failed_reconnects, e
                );
                Err(e)
            }
        }
    }

    /// Bookkeeping and protections for a decoded status.
    ///
    /// Returns the values to publish once the transport lock is released.
    async fn on_snapshot(
        &self,
        link: &mut C::Link,
        snapshot: StatusSnapshot,
    ) -> Vec<(TopicRole, String)> {
        let now = Instant::now();
        let temperature = snapshot.case_temperature;
        let cap = self.gate.policy().max_allowed(temperature);
        let mut messages = Vec::new();
        let mut forced_level = None;

        let state = {
            let mut inner = self.inner.lock();
            inner.consecutive_failures = 0;
            inner.last_success = now;
            inner.last_poll_at = Some(Utc::now());
            inner.case_temperature = temperature;
            inner.device_level = Some(snapshot.set_level);
            inner.device_setpoint = snapshot.set_temperature;

            if snapshot.set_level > cap {
                warn!(
                    "Current level {} exceeds limit {} at {}°C, reducing",
                    snapshot.set_level, cap, temperature
                );
                forced_level = Some(cap);
            }
            if cap != inner.level_cap {
                if LevelCapPolicy::is_limiting(cap) {
                    info!(
                        "Temperature limiting active: max level {} ({}°C)",
                        cap, temperature
                    );
                } else {
                    info!("Temperature limiting deactivated ({}°C)", temperature);
                }
                inner.level_cap = cap;
                messages.push((
                    TopicRole::LevelCap,
                    level_cap_message(LevelCapPolicy::is_limiting(cap).then_some(cap)),
                ));
            }

            if !inner.guard.is_active() {
                let reason = if snapshot.reports_overheat() {
                    Some("heater reports overheating")
                } else if temperature >= self.config.overheat_threshold {
                    Some("case temperature at threshold")
                } else {
                    None
                };
                if let Some(reason) = reason {
                    error!("Overheat detected ({}) at {}°C", reason, temperature);
                    inner.guard.engage(now, temperature);
                    forced_level = Some(1);
                    messages.push((
                        TopicRole::OverheatLockout,
                        lockout_message(Some(inner.guard.remaining_secs(now))),
                    ));
                }
            } else {
                match inner.guard.track(now, temperature) {
                    GuardUpdate::Released { .. } => {
                        messages.push((TopicRole::OverheatLockout, lockout_message(None)));
                    }
                    GuardUpdate::StillRising {
                        escalated: true, ..
                    } => {
                        messages.push((
                            TopicRole::OverheatLockout,
                            lockout_message(Some(inner.guard.remaining_secs(now))),
                        ));
                    }
                    _ => {}
                }
            }

            if now.duration_since(inner.last_health_log) >= HEALTH_LOG_INTERVAL {
                inner.last_health_log = now;
                debug!(
                    "Health check OK - temp: {}°C, level: {}, max allowed: {}, step: {}",
                    temperature, snapshot.set_level, cap, snapshot.running_step
                );
            }

            let state = connected_state(inner.guard.is_active(), cap);
            if state != inner.state {
                info!("Supervisor state: {} -> {}", inner.state, state);
                inner.state = state;
            }
            inner.last_snapshot = Some(snapshot.clone());
            state
        };

        if let Some(level) = forced_level.filter(|&level| level != snapshot.set_level) {
            match link.set_level_or_temperature(level).await {
                Ok(_) => info!("Level automatically reduced to {}", level),
                Err(e) => error!("Failed to reduce level to {}: {}", level, e),
            }
        }

        messages.extend(snapshot_messages(Some(&snapshot), &state));
        messages
    }

    fn on_missed_poll(&self) -> Result<()> {
        let (failures, since) = {
            let mut inner = self.inner.lock();
            inner.consecutive_failures += 1;
            (inner.consecutive_failures, inner.last_success.elapsed())
        };
        let limit = self.config.max_consecutive_failures;
        warn!(
            "No status from heater ({}/{}), {:.1}s since last success",
            failures,
            limit,
            since.as_secs_f64()
        );
        if failures >= limit {
            return Err(Error::NotResponding { attempts: failures });
        }
        Ok(())
    }

    fn check_watchdog(&self) -> Result<()> {
        let elapsed = self.inner.lock().last_success.elapsed();
        if elapsed > self.config.watchdog_timeout {
            return Err(Error::WatchdogTimeout {
                elapsed_secs: elapsed.as_secs_f64(),
                limit_secs: self.config.watchdog_timeout.as_secs(),
            });
        }
        Ok(())
    }

    /// The single recovery path for routed failures.
    ///
    /// Returns the backoff to wait before the next attempt.
    async fn recover(&self, err: Error) -> Duration {
        error!("{}", err);
        let link = self.link.lock().await.take();
        self.discard_link(link, err.supervisor_state()).await;
        self.count_recovery().await
    }

    /// Count one recovery, escalating to `ConnectionFailed` at the limit.
    ///
    /// Returns the backoff before the next connect attempt.
    async fn count_recovery(&self) -> Duration {
        let attempt = {
            let mut inner = self.inner.lock();
            inner.reconnect_attempts += 1;
            inner.reconnect_attempts
        };
        let max = self.config.max_reconnect_attempts;
        let backoff = self.config.backoff_for(attempt);

        if attempt >= max {
            error!(
                "{} recoveries in a row failed, waiting {:?} before retrying",
                attempt, backoff
            );
            self.inner.lock().reconnect_attempts = 0;
            self.transition(SupervisorState::ConnectionFailed).await;
        } else {
            info!("Recovery {}/{}, backoff {:?}", attempt, max, backoff);
        }
        backoff
    }

    /// Close a link taken out of the slot and publish `state`.
    async fn discard_link(&self, link: Option<C::Link>, state: SupervisorState) {
        if let Some(mut link) = link {
            link.disconnect().await;
        }
        {
            let mut inner = self.inner.lock();
            inner.connection = ConnectionState::Disconnected;
            inner.consecutive_failures = 0;
        }
        self.transition(state).await;
        self.publish_all(snapshot_messages(None, &state)).await;
    }

    /// Change state and publish it if it changed.
    async fn transition(&self, state: SupervisorState) {
        let previous = std::mem::replace(&mut self.inner.lock().state, state);
        if previous != state {
            info!("Supervisor state: {} -> {}", previous, state);
            self.publish(TopicRole::Status, state.to_string()).await;
        }
    }

    async fn publish_all(&self, messages: Vec<(TopicRole, String)>) {
        for (role, value) in messages {
            self.publish(role, value).await;
        }
    }

    async fn publish(&self, role: TopicRole, value: String) {
        match self.publisher.publish(role, value).await {
            Ok(()) => {
                self.inner.lock().publish_failures = 0;
            }
            Err(e) => {
                let failures = {
                    let mut inner = self.inner.lock();
                    inner.publish_failures += 1;
                    inner.publish_failures
                };
                if failures >= MAX_PUBLISH_FAILURES {
                    error!("Publishing {} failed ({} in a row): {}", role, failures, e);
                } else {
                    warn!("Publishing {} failed ({} in a row): {}", role, failures, e);
                }
            }
        }
    }
}
