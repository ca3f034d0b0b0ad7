//! Match coordinator: lifecycle state machine and authoritative win check
//!
//! One coordinator owns one match. Its `run` loop is the only place match state
//! changes: inbound client messages, the fixed simulation tick, lifecycle timers
//! and platform report completions are all serialized through a single
//! `select!`, so handlers never interleave.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, sleep_until, timeout_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

use crate::config::MatchConfig;
use crate::platform::{AuthProvider, PlatformReporter, ReportError, ReportResult};
use crate::ws::hub::Outbound;
use crate::ws::protocol::{ClientMsg, ConnectionId, ServerMsg};

use super::models::{mirror_bar, mirror_ball, Ball};
use super::registry::{ConnectionRegistry, Role};
use super::result::MatchResult;
use super::MatchInput;

/// Match phase; advances strictly in declaration order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPhase {
    /// No connections yet
    Idle,
    /// Connections arriving, seats filling
    Waiting,
    /// Start signal going out
    Starting,
    /// Ball in play, win check running
    Playing,
    /// Result out, departures and release pending
    Ending,
}

impl MatchPhase {
    fn next(self) -> Self {
        match self {
            MatchPhase::Idle => MatchPhase::Waiting,
            MatchPhase::Waiting => MatchPhase::Starting,
            MatchPhase::Starting => MatchPhase::Playing,
            MatchPhase::Playing => MatchPhase::Ending,
            MatchPhase::Ending => MatchPhase::Idle,
        }
    }
}

/// Timed lifecycle steps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleStep {
    /// Both seats filled, let clients finish setup
    Settle,
    /// End broadcast out, report departures next
    Depart,
    /// Departures reported, clear state next
    Release,
}

#[derive(Debug, Clone, Copy)]
struct PendingStep {
    step: LifecycleStep,
    deadline: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    Joined,
    Left,
    Result,
}

/// A completed platform report
#[derive(Debug)]
pub struct ReportOutcome {
    pub kind: ReportKind,
    /// User id, or the winner's user id for results
    pub subject: String,
    pub result: ReportResult,
}

type ReportFuture = BoxFuture<'static, ReportOutcome>;

/// Non-zero answer from the platform; ends the process
#[derive(Debug, thiserror::Error)]
#[error("{kind:?} report for {subject} failed (code {code}): {source}")]
pub struct ReportFailure {
    pub kind: ReportKind,
    pub subject: String,
    pub code: i32,
    pub source: ReportError,
}

/// How the match ended
#[derive(Debug)]
pub enum MatchOutcome {
    /// Result submitted and match released
    Completed(MatchResult),
    /// Every seated player disconnected before a result
    Abandoned,
    /// The platform rejected a report
    Aborted(ReportFailure),
}

pub struct MatchCoordinator {
    config: MatchConfig,
    phase: MatchPhase,
    phase_tx: watch::Sender<MatchPhase>,
    registry: ConnectionRegistry,
    ball: Ball,
    result: Option<MatchResult>,
    lifecycle: Option<PendingStep>,
    /// Seated players whose departure has been reported
    departed: HashSet<ConnectionId>,
    pending_reports: Vec<ReportFuture>,
    outbound: Arc<dyn Outbound>,
    auth: Arc<dyn AuthProvider>,
    reporter: Arc<dyn PlatformReporter>,
    rng: ChaCha8Rng,
    tick: u64,
}

impl MatchCoordinator {
    pub fn new(
        config: MatchConfig,
        outbound: Arc<dyn Outbound>,
        auth: Arc<dyn AuthProvider>,
        reporter: Arc<dyn PlatformReporter>,
    ) -> Self {
        let rng = match config.rng_seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        let (phase_tx, _) = watch::channel(MatchPhase::Idle);

        Self {
            config,
            phase: MatchPhase::Idle,
            phase_tx,
            registry: ConnectionRegistry::new(),
            ball: Ball::default(),
            result: None,
            lifecycle: None,
            departed: HashSet::new(),
            pending_reports: Vec::new(),
            outbound,
            auth,
            reporter,
            rng,
            tick: 0,
        }
    }

    pub fn phase(&self) -> MatchPhase {
        self.phase
    }

    /// Follow phase changes from outside the match task
    pub fn subscribe_phase(&self) -> watch::Receiver<MatchPhase> {
        self.phase_tx.subscribe()
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn ball(&self) -> &Ball {
        &self.ball
    }

    pub fn result(&self) -> Option<&MatchResult> {
        self.result.as_ref()
    }

    pub fn pending_step(&self) -> Option<LifecycleStep> {
        self.lifecycle.map(|p| p.step)
    }

    pub fn lifecycle_deadline(&self) -> Option<Instant> {
        self.lifecycle.map(|p| p.deadline)
    }

    /// Report futures issued since the last call
    pub fn take_reports(&mut self) -> Vec<BoxFuture<'static, ReportOutcome>> {
        std::mem::take(&mut self.pending_reports)
    }

    /// Run the match until release, abandonment or a fatal report failure
    pub async fn run(mut self, mut inputs: mpsc::UnboundedReceiver<MatchInput>) -> MatchOutcome {
        info!(tick_rate = self.config.tick_rate_hz, "Match coordinator running");

        let mut tick_interval = interval(self.config.tick_interval());
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut reports: FuturesUnordered<ReportFuture> = FuturesUnordered::new();

        let outcome = loop {
            reports.extend(self.take_reports());
            let deadline = self.lifecycle_deadline();

            tokio::select! {
                biased;

                Some(report) = reports.next(), if !reports.is_empty() => {
                    if let Err(failure) = self.on_report(report) {
                        break MatchOutcome::Aborted(failure);
                    }
                }
                input = inputs.recv() => match input {
                    Some(input) => {
                        if let Some(outcome) = self.handle_input(input) {
                            break outcome;
                        }
                    }
                    None => {
                        warn!("Input channel closed, abandoning match");
                        break MatchOutcome::Abandoned;
                    }
                },
                _ = sleep_until_deadline(deadline) => {
                    if let Some(outcome) = self.fire_lifecycle() {
                        break outcome;
                    }
                }
                _ = tick_interval.tick() => self.tick(),
            }
        };

        if matches!(outcome, MatchOutcome::Aborted(_)) {
            return outcome;
        }
        reports.extend(self.take_reports());
        self.drain_reports(reports, outcome).await
    }

    /// Wait (bounded) for reports still in flight so exit does not cut them off
    async fn drain_reports(
        &mut self,
        mut reports: FuturesUnordered<ReportFuture>,
        outcome: MatchOutcome,
    ) -> MatchOutcome {
        let deadline = Instant::now() + self.config.report_drain_timeout;
        while !reports.is_empty() {
            match timeout_at(deadline, reports.next()).await {
                Ok(Some(report)) => {
                    if let Err(failure) = self.on_report(report) {
                        return MatchOutcome::Aborted(failure);
                    }
                }
                Ok(None) => break,
                Err(_) => {
                    warn!(pending = reports.len(), "Gave up waiting for platform reports");
                    break;
                }
            }
        }
        outcome
    }

    /// Apply one inbound event; `Some` ends the match
    pub fn handle_input(&mut self, input: MatchInput) -> Option<MatchOutcome> {
        match input {
            MatchInput::Connected {
                connection_id,
                nickname,
            } => {
                self.on_connected(connection_id, &nickname);
                None
            }
            MatchInput::Message { connection_id, msg } => {
                match msg {
                    ClientMsg::Ready { user_id, token } => {
                        self.on_ready(connection_id, &user_id, &token)
                    }
                    ClientMsg::BarPos {
                        player_id,
                        position_x,
                        timestamp,
                    } => {
                        if player_id != connection_id.0 {
                            trace!(connection_id = %connection_id, claimed = player_id, "Bar claims another player id");
                        }
                        self.on_bar_position(connection_id, position_x, timestamp)
                    }
                    ClientMsg::BallPos {
                        position_x,
                        position_y,
                        velocity_x,
                        velocity_y,
                        ..
                    } => self.on_ball_position(
                        connection_id,
                        position_x,
                        position_y,
                        velocity_x,
                        velocity_y,
                    ),
                    ClientMsg::Ping { t } => {
                        if self.registry.find(connection_id).is_some() {
                            self.outbound.send_to(connection_id, ServerMsg::Pong { t });
                        }
                    }
                }
                None
            }
            MatchInput::Disconnected { connection_id } => self.on_disconnected(connection_id),
        }
    }

    pub fn on_connected(&mut self, connection_id: ConnectionId, nickname: &str) {
        match self.registry.add_player(connection_id, nickname) {
            Ok(slot) => {
                info!(
                    connection_id = %connection_id,
                    nickname = %nickname,
                    slot,
                    "Player connected"
                );
                if self.phase == MatchPhase::Idle {
                    self.advance_phase();
                }
            }
            Err(e) => warn!(connection_id = %connection_id, error = %e, "Rejected connection"),
        }
    }

    /// Authenticate, seat and privately start one player. Failed
    /// authentication is ignored without a reply; the client may retry.
    pub fn on_ready(&mut self, connection_id: ConnectionId, user_id: &str, token: &str) {
        let Some(player) = self.registry.find(connection_id) else {
            debug!(connection_id = %connection_id, "Ready from unknown connection");
            return;
        };
        if player.is_authenticated() {
            debug!(connection_id = %connection_id, "Ready from authenticated connection ignored");
            return;
        }

        if !self
            .registry
            .authenticate(connection_id, user_id, token, self.auth.as_ref())
        {
            info!(connection_id = %connection_id, user_id = %user_id, "Authentication failed");
            return;
        }

        let role = match self.registry.assign_role(connection_id) {
            Ok(role) => role,
            Err(e) => {
                error!(connection_id = %connection_id, user_id = %user_id, error = %e, "Cannot seat player");
                return;
            }
        };

        info!(
            connection_id = %connection_id,
            user_id = %user_id,
            role = ?role,
            "Player seated"
        );

        let call = self.reporter.notify_joined(user_id);
        self.report(ReportKind::Joined, user_id.to_string(), call);

        let start = match role {
            Role::Host => {
                let (vx, vy) = self.serve_velocity();
                self.ball.set_velocity(vx, vy);
                self.ball.owner = Some(Role::Host);
                ServerMsg::Start {
                    player_id: connection_id,
                    is_host: true,
                    ball_velocity_x: Some(vx),
                    ball_velocity_y: Some(vy),
                }
            }
            Role::Guest => ServerMsg::Start {
                player_id: connection_id,
                is_host: false,
                ball_velocity_x: None,
                ball_velocity_y: None,
            },
        };
        self.outbound.send_to(connection_id, start);

        if self.registry.seats_filled()
            && self.phase == MatchPhase::Waiting
            && self.lifecycle.is_none()
        {
            self.schedule(LifecycleStep::Settle, self.config.settle_delay);
        }
    }

    /// Relay a bar sample, mirrored, to the opponent's seat
    pub fn on_bar_position(&mut self, connection_id: ConnectionId, x: f32, timestamp: f32) {
        let Some(player) = self
            .registry
            .find_mut(connection_id)
            .filter(|p| p.role.is_some())
        else {
            trace!(connection_id = %connection_id, "Bar position from unseated connection");
            return;
        };
        player.bar.set_position_x(x, timestamp);

        self.relay_to_opponent(
            connection_id,
            ServerMsg::SetOpponentBar {
                player_id: connection_id,
                position_x: mirror_bar(x),
                timestamp,
            },
        );
    }

    /// Record the ball for the win check and relay it, mirrored, to the opponent's seat
    pub fn on_ball_position(
        &mut self,
        connection_id: ConnectionId,
        x: f32,
        y: f32,
        vx: f32,
        vy: f32,
    ) {
        let Some(owner) = self.registry.find(connection_id).and_then(|p| p.role) else {
            trace!(connection_id = %connection_id, "Ball position from unseated connection");
            return;
        };

        self.ball.set_position(x, y);
        self.ball.set_velocity(vx, vy);
        self.ball.owner = Some(owner);

        let mirrored = mirror_ball(&self.ball);
        self.relay_to_opponent(
            connection_id,
            ServerMsg::SetBallState {
                player_id: connection_id,
                position_x: mirrored.position_x,
                position_y: mirrored.position_y,
                velocity_x: mirrored.velocity_x,
                velocity_y: mirrored.velocity_y,
            },
        );
    }

    /// One fixed simulation step: the out-of-bounds check while playing
    pub fn tick(&mut self) {
        if self.phase != MatchPhase::Playing {
            return;
        }
        self.tick += 1;

        if let Some(winner) = self.exit_winner() {
            self.end_match(winner);
        }
    }

    /// Ball past the positive side: host wins; past the negative side: guest
    /// wins. Exactly on the threshold is still in play.
    fn exit_winner(&self) -> Option<Role> {
        let threshold = self.config.out_of_bounds_threshold();
        let y = self.ball.position_y;
        if y > threshold {
            Some(Role::Host)
        } else if y < -threshold {
            Some(Role::Guest)
        } else {
            None
        }
    }

    fn end_match(&mut self, winner: Role) {
        let Some(result) = MatchResult::for_winner(&self.registry, winner) else {
            error!(winner = ?winner, "Playing without both seats filled");
            return;
        };

        self.advance_phase();
        info!(
            tick = self.tick,
            ball_y = self.ball.position_y,
            winner_id = %result.winner_connection_id,
            winner_uid = %result.winner_user_id,
            loser_uid = %result.loser_user_id,
            "Ball out of bounds, match over"
        );

        self.outbound.broadcast(ServerMsg::MatchEnd {
            winner_id: result.winner_connection_id,
        });

        match result.to_payload() {
            Ok(payload) => {
                let call = self.reporter.submit_result(payload);
                self.report(ReportKind::Result, result.winner_user_id.clone(), call);
            }
            Err(e) => error!(error = %e, "Failed to serialize match result"),
        }

        self.result = Some(result);
        self.schedule(LifecycleStep::Depart, self.config.departure_delay);
    }

    /// Remove a player; a seated player is reported as having left
    pub fn on_disconnected(&mut self, connection_id: ConnectionId) -> Option<MatchOutcome> {
        let player = self.registry.remove(connection_id)?;
        info!(connection_id = %connection_id, user_id = ?player.user_id(), "Player disconnected");

        if player.role.is_some() {
            if let Some(user_id) = player.user_id() {
                self.report_left(connection_id, user_id.to_string());
            }
        }

        let seated_before = self.registry.host().is_some();
        if self.registry.is_empty() && seated_before && self.phase != MatchPhase::Ending {
            warn!(phase = ?self.phase, "All players gone before a result");
            return Some(MatchOutcome::Abandoned);
        }
        None
    }

    /// Run the pending lifecycle step now; `Some` once the match is released
    pub fn fire_lifecycle(&mut self) -> Option<MatchOutcome> {
        let pending = self.lifecycle.take()?;
        debug!(step = ?pending.step, "Lifecycle step");

        match pending.step {
            LifecycleStep::Settle => {
                self.advance_phase();
                self.outbound.broadcast(ServerMsg::MatchStart);
                self.advance_phase();
                None
            }
            LifecycleStep::Depart => {
                let leaving: Vec<(ConnectionId, String)> = self
                    .registry
                    .players()
                    .filter(|p| p.role.is_some())
                    .filter_map(|p| p.user_id().map(|u| (p.connection_id, u.to_string())))
                    .collect();
                for (connection_id, user_id) in leaving {
                    self.report_left(connection_id, user_id);
                }
                self.schedule(LifecycleStep::Release, self.config.release_delay);
                None
            }
            LifecycleStep::Release => {
                info!("Releasing match");
                self.registry.clear();
                self.ball.reset();
                self.advance_phase();
                self.result.take().map(MatchOutcome::Completed)
            }
        }
    }

    /// Log a finished report; any failure is fatal
    pub fn on_report(&self, report: ReportOutcome) -> Result<(), ReportFailure> {
        match report.result {
            Ok(()) => {
                debug!(kind = ?report.kind, subject = %report.subject, "Platform report ok");
                Ok(())
            }
            Err(source) => {
                let code = source.code();
                error!(
                    kind = ?report.kind,
                    subject = %report.subject,
                    code,
                    error = %source,
                    "Platform report failed"
                );
                Err(ReportFailure {
                    kind: report.kind,
                    subject: report.subject,
                    code,
                    source,
                })
            }
        }
    }

    fn report_left(&mut self, connection_id: ConnectionId, user_id: String) {
        if !self.departed.insert(connection_id) {
            return;
        }
        let call = self.reporter.notify_left(&user_id);
        self.report(ReportKind::Left, user_id, call);
    }

    fn report(&mut self, kind: ReportKind, subject: String, call: BoxFuture<'static, ReportResult>) {
        self.pending_reports.push(
            async move {
                ReportOutcome {
                    kind,
                    subject,
                    result: call.await,
                }
            }
            .boxed(),
        );
    }

    fn relay_to_opponent(&self, sender: ConnectionId, msg: ServerMsg) {
        if let Some(opponent) = self.registry.opponent(sender) {
            self.outbound.send_to(opponent.connection_id, msg);
        }
    }

    fn schedule(&mut self, step: LifecycleStep, delay: std::time::Duration) {
        self.lifecycle = Some(PendingStep {
            step,
            deadline: Instant::now() + delay,
        });
    }

    fn advance_phase(&mut self) {
        let from = self.phase;
        self.phase = from.next();
        self.phase_tx.send_replace(self.phase);
        info!(from = ?from, to = ?self.phase, "Match phase changed");
    }

    /// `±(base + U[0,1))` per axis, sign uniform
    fn serve_velocity(&mut self) -> (f32, f32) {
        let base = self.config.ball_base_speed;
        (
            serve_axis(&mut self.rng, base),
            serve_axis(&mut self.rng, base),
        )
    }
}

fn serve_axis(rng: &mut ChaCha8Rng, base: f32) -> f32 {
    let speed = base + rng.gen::<f32>();
    if rng.gen_bool(0.5) {
        -speed
    } else {
        speed
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    enum Sent {
        To(ConnectionId, ServerMsg),
        All(ServerMsg),
    }

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<Sent>>,
    }

    impl Recorder {
        fn take(&self) -> Vec<Sent> {
            std::mem::take(&mut *self.sent.lock().unwrap())
        }
    }

    impl Outbound for Recorder {
        fn send_to(&self, connection_id: ConnectionId, msg: ServerMsg) {
            self.sent.lock().unwrap().push(Sent::To(connection_id, msg));
        }

        fn broadcast(&self, msg: ServerMsg) {
            self.sent.lock().unwrap().push(Sent::All(msg));
        }
    }

    struct Tokens;

    impl AuthProvider for Tokens {
        fn auth_user(&self, user_id: &str, token: &str) -> bool {
            matches!((user_id, token), ("alice", "t1") | ("bob", "t2") | ("carol", "t3"))
        }
    }

    #[derive(Default)]
    struct Calls {
        calls: Mutex<Vec<String>>,
    }

    impl PlatformReporter for Calls {
        fn notify_joined(&self, user_id: &str) -> BoxFuture<'static, ReportResult> {
            self.calls.lock().unwrap().push(format!("joined:{}", user_id));
            futures::future::ready(Ok(())).boxed()
        }

        fn notify_left(&self, user_id: &str) -> BoxFuture<'static, ReportResult> {
            self.calls.lock().unwrap().push(format!("left:{}", user_id));
            futures::future::ready(Ok(())).boxed()
        }

        fn submit_result(&self, payload: String) -> BoxFuture<'static, ReportResult> {
            self.calls.lock().unwrap().push(format!("result:{}", payload));
            futures::future::ready(Ok(())).boxed()
        }
    }

    struct Harness {
        coordinator: MatchCoordinator,
        sent: Arc<Recorder>,
        calls: Arc<Calls>,
    }

    fn harness() -> Harness {
        let sent = Arc::new(Recorder::default());
        let calls = Arc::new(Calls::default());
        let config = MatchConfig {
            rng_seed: Some(7),
            ..MatchConfig::default()
        };
        let coordinator =
            MatchCoordinator::new(config, sent.clone(), Arc::new(Tokens), calls.clone());
        Harness {
            coordinator,
            sent,
            calls,
        }
    }

    const HOST: ConnectionId = ConnectionId(101);
    const GUEST: ConnectionId = ConnectionId(102);

    /// Two seated players, settle fired, clean outbox
    fn playing() -> Harness {
        let mut h = harness();
        h.coordinator.on_connected(HOST, "a");
        h.coordinator.on_connected(GUEST, "b");
        h.coordinator.on_ready(HOST, "alice", "t1");
        h.coordinator.on_ready(GUEST, "bob", "t2");
        assert!(h.coordinator.fire_lifecycle().is_none());
        assert_eq!(h.coordinator.phase(), MatchPhase::Playing);
        h.sent.take();
        h.calls.calls.lock().unwrap().clear();
        h
    }

    #[test]
    fn first_connection_moves_idle_to_waiting() {
        let mut h = harness();
        assert_eq!(h.coordinator.phase(), MatchPhase::Idle);
        h.coordinator.on_connected(HOST, "a");
        assert_eq!(h.coordinator.phase(), MatchPhase::Waiting);
        h.coordinator.on_connected(GUEST, "b");
        assert_eq!(h.coordinator.phase(), MatchPhase::Waiting);
    }

    #[test]
    fn ready_seats_host_then_guest_with_private_start() {
        let mut h = harness();
        h.coordinator.on_connected(HOST, "a");
        h.coordinator.on_connected(GUEST, "b");

        h.coordinator.on_ready(HOST, "alice", "t1");
        let sent = h.sent.take();
        assert_eq!(sent.len(), 1);
        match &sent[0] {
            Sent::To(
                to,
                ServerMsg::Start {
                    player_id,
                    is_host: true,
                    ball_velocity_x: Some(vx),
                    ball_velocity_y: Some(vy),
                },
            ) => {
                assert_eq!(*to, HOST);
                assert_eq!(*player_id, HOST);
                for v in [vx.abs(), vy.abs()] {
                    assert!((1.5..2.5).contains(&v), "serve speed {}", v);
                }
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(h.coordinator.pending_step(), None);

        h.coordinator.on_ready(GUEST, "bob", "t2");
        assert_eq!(
            h.sent.take(),
            vec![Sent::To(
                GUEST,
                ServerMsg::Start {
                    player_id: GUEST,
                    is_host: false,
                    ball_velocity_x: None,
                    ball_velocity_y: None,
                }
            )]
        );
        assert_eq!(h.coordinator.pending_step(), Some(LifecycleStep::Settle));
        assert_eq!(
            *h.calls.calls.lock().unwrap(),
            vec!["joined:alice".to_string(), "joined:bob".to_string()]
        );
        assert_eq!(h.coordinator.take_reports().len(), 2);
    }

    #[test]
    fn failed_auth_is_silent() {
        let mut h = harness();
        h.coordinator.on_connected(HOST, "a");
        h.coordinator.on_ready(HOST, "alice", "nope");

        assert!(h.sent.take().is_empty());
        assert!(h.calls.calls.lock().unwrap().is_empty());
        assert!(!h.coordinator.registry().find(HOST).unwrap().is_authenticated());
        assert!(h.coordinator.registry().host().is_none());

        h.coordinator.on_ready(HOST, "alice", "t1");
        assert_eq!(h.coordinator.registry().host().unwrap().connection_id, HOST);
    }

    #[test]
    fn repeated_and_third_ready_do_not_move_seats() {
        let mut h = playing();
        h.coordinator.on_ready(GUEST, "alice", "t1");
        h.coordinator.on_connected(ConnectionId(103), "c");
        h.coordinator.on_ready(ConnectionId(103), "carol", "t3");

        let registry = h.coordinator.registry();
        assert_eq!(registry.host().unwrap().connection_id, HOST);
        assert_eq!(registry.guest().unwrap().connection_id, GUEST);
        assert_eq!(registry.find(GUEST).unwrap().user_id(), Some("bob"));
        assert_eq!(registry.find(ConnectionId(103)).unwrap().role, None);
        assert!(h.sent.take().is_empty());
        assert!(h.calls.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn settle_broadcasts_start_and_enters_playing() {
        let mut h = harness();
        let mut phases = h.coordinator.subscribe_phase();
        h.coordinator.on_connected(HOST, "a");
        h.coordinator.on_connected(GUEST, "b");
        h.coordinator.on_ready(HOST, "alice", "t1");
        h.coordinator.on_ready(GUEST, "bob", "t2");
        h.sent.take();

        assert!(h.coordinator.fire_lifecycle().is_none());
        assert_eq!(h.sent.take(), vec![Sent::All(ServerMsg::MatchStart)]);
        assert_eq!(h.coordinator.phase(), MatchPhase::Playing);
        assert_eq!(*phases.borrow_and_update(), MatchPhase::Playing);
        assert_eq!(h.coordinator.pending_step(), None);
    }

    #[test]
    fn bar_relay_is_mirrored_to_the_other_player_only() {
        let mut h = playing();
        h.coordinator.on_bar_position(HOST, 42.0, 3.5);
        assert_eq!(
            h.sent.take(),
            vec![Sent::To(
                GUEST,
                ServerMsg::SetOpponentBar {
                    player_id: HOST,
                    position_x: -42.0,
                    timestamp: 3.5,
                }
            )]
        );
        assert_eq!(
            h.coordinator.registry().find(HOST).unwrap().bar.position_x(),
            42.0
        );
    }

    #[test]
    fn ball_relay_is_mirrored_on_both_axes() {
        let mut h = playing();
        h.coordinator.on_ball_position(GUEST, 10.0, -20.0, 1.0, -2.0);
        assert_eq!(
            h.sent.take(),
            vec![Sent::To(
                HOST,
                ServerMsg::SetBallState {
                    player_id: GUEST,
                    position_x: -10.0,
                    position_y: 20.0,
                    velocity_x: -1.0,
                    velocity_y: 2.0,
                }
            )]
        );
        assert_eq!(h.coordinator.ball().position(), (10.0, -20.0));
        assert_eq!(h.coordinator.ball().owner, Some(Role::Guest));
    }

    #[test]
    fn unknown_sender_positions_are_ignored() {
        let mut h = playing();
        h.coordinator.on_bar_position(ConnectionId(999), 1.0, 0.0);
        h.coordinator.on_ball_position(ConnectionId(999), 0.0, 400.0, 0.0, 0.0);
        h.coordinator.tick();

        assert!(h.sent.take().is_empty());
        assert_eq!(h.coordinator.phase(), MatchPhase::Playing);
    }

    #[test]
    fn unseated_connection_cannot_move_bar_or_ball() {
        let mut h = playing();
        let stranger = ConnectionId(103);
        h.coordinator.on_connected(stranger, "c");
        let before = *h.coordinator.ball();

        h.coordinator.on_bar_position(stranger, 99.0, 1.0);
        h.coordinator.on_ball_position(stranger, 0.0, -1000.0, 0.0, 0.0);
        h.coordinator.tick();

        assert!(h.sent.take().is_empty());
        assert_eq!(*h.coordinator.ball(), before);
        assert_eq!(h.coordinator.phase(), MatchPhase::Playing);
        assert!(h.coordinator.result().is_none());
        assert!(h.calls.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn relays_skip_connections_outside_the_seats() {
        let mut h = playing();
        h.coordinator.on_connected(ConnectionId(103), "c");

        h.coordinator.on_bar_position(HOST, 10.0, 1.0);
        h.coordinator.on_ball_position(GUEST, 1.0, 2.0, 3.0, 4.0);

        let sent = h.sent.take();
        assert_eq!(sent.len(), 2);
        assert!(matches!(
            &sent[0],
            Sent::To(to, ServerMsg::SetOpponentBar { .. }) if *to == GUEST
        ));
        assert!(matches!(
            &sent[1],
            Sent::To(to, ServerMsg::SetBallState { .. }) if *to == HOST
        ));
    }

    #[test]
    fn boundary_is_still_in_play() {
        let mut h = playing();
        for y in [0.0, 329.9, 330.0, -330.0] {
            h.coordinator.on_ball_position(HOST, 0.0, y, 0.0, 0.0);
            h.coordinator.tick();
            assert_eq!(h.coordinator.phase(), MatchPhase::Playing, "y = {}", y);
        }
    }

    #[test]
    fn positive_exit_means_host_wins() {
        let mut h = playing();
        h.coordinator.on_ball_position(HOST, 0.0, 335.0, 0.0, 3.0);
        h.sent.take();
        assert_eq!(h.coordinator.phase(), MatchPhase::Playing);

        h.coordinator.tick();
        assert_eq!(h.coordinator.phase(), MatchPhase::Ending);
        assert_eq!(
            h.sent.take(),
            vec![Sent::All(ServerMsg::MatchEnd { winner_id: HOST })]
        );

        let result = h.coordinator.result().unwrap();
        assert_eq!(result.loser_connection_id, GUEST);
        assert_eq!(result.winner_user_id, "alice");
        assert_eq!(result.loser_user_id, "bob");

        let calls = h.calls.calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].starts_with("result:"));
        assert!(calls[0].contains(r#""winner_uid":"alice""#));
        assert_eq!(h.coordinator.pending_step(), Some(LifecycleStep::Depart));
    }

    #[test]
    fn negative_exit_means_guest_wins() {
        let mut h = playing();
        h.coordinator.on_ball_position(GUEST, 5.0, -330.5, 0.0, 0.0);
        h.coordinator.tick();

        let result = h.coordinator.result().unwrap();
        assert_eq!(result.winner_connection_id, GUEST);
        assert_eq!(result.loser_connection_id, HOST);
    }

    #[test]
    fn win_check_only_runs_while_playing() {
        let mut h = harness();
        h.coordinator.on_connected(HOST, "a");
        h.coordinator.on_ready(HOST, "alice", "t1");
        h.coordinator.on_ball_position(HOST, 0.0, 1000.0, 0.0, 0.0);
        h.coordinator.tick();
        assert_eq!(h.coordinator.phase(), MatchPhase::Waiting);
        assert!(h.coordinator.result().is_none());
    }

    #[test]
    fn ending_sequence_reports_departures_then_releases() {
        let mut h = playing();
        h.coordinator.on_ball_position(HOST, 0.0, 400.0, 0.0, 0.0);
        h.coordinator.tick();
        h.calls.calls.lock().unwrap().clear();

        assert!(h.coordinator.fire_lifecycle().is_none());
        let mut calls = h.calls.calls.lock().unwrap().clone();
        calls.sort();
        assert_eq!(calls, vec!["left:alice".to_string(), "left:bob".to_string()]);
        assert_eq!(h.coordinator.pending_step(), Some(LifecycleStep::Release));

        // a late disconnect must not report the player twice
        assert!(h.coordinator.on_disconnected(GUEST).is_none());
        assert_eq!(h.calls.calls.lock().unwrap().len(), 2);

        match h.coordinator.fire_lifecycle() {
            Some(MatchOutcome::Completed(result)) => assert_eq!(result.winner_connection_id, HOST),
            other => panic!("unexpected {:?}", other),
        }
        assert!(h.coordinator.registry().is_empty());
        assert_eq!(h.coordinator.phase(), MatchPhase::Idle);
    }

    #[test]
    fn disconnect_reports_seated_player_left_once() {
        let mut h = playing();
        assert!(h.coordinator.on_disconnected(GUEST).is_none());
        assert!(h.coordinator.on_disconnected(GUEST).is_none());
        assert_eq!(
            *h.calls.calls.lock().unwrap(),
            vec!["left:bob".to_string()]
        );
        assert_eq!(h.coordinator.registry().guest().unwrap().user_id, "bob");
    }

    #[test]
    fn everyone_leaving_mid_match_abandons() {
        let mut h = playing();
        assert!(h.coordinator.on_disconnected(HOST).is_none());
        assert!(matches!(
            h.coordinator.on_disconnected(GUEST),
            Some(MatchOutcome::Abandoned)
        ));
    }

    #[test]
    fn unseated_visitor_leaving_does_not_abandon() {
        let mut h = harness();
        h.coordinator.on_connected(HOST, "a");
        assert!(h.coordinator.on_disconnected(HOST).is_none());
        assert_eq!(h.coordinator.phase(), MatchPhase::Waiting);
    }

    #[test]
    fn failed_report_is_fatal() {
        let h = harness();
        let report = ReportOutcome {
            kind: ReportKind::Result,
            subject: "alice".into(),
            result: Err(ReportError::Platform {
                code: 3,
                description: "match closed".into(),
            }),
        };
        let failure = h.coordinator.on_report(report).unwrap_err();
        assert_eq!(failure.code, 3);
        assert_eq!(failure.kind, ReportKind::Result);
    }

    #[test]
    fn ping_is_answered_to_sender() {
        let mut h = playing();
        h.coordinator.handle_input(MatchInput::Message {
            connection_id: GUEST,
            msg: ClientMsg::Ping { t: 99 },
        });
        assert_eq!(h.sent.take(), vec![Sent::To(GUEST, ServerMsg::Pong { t: 99 })]);
    }
}
