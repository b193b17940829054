//! The configuration engine façade.
//!
//! One handle owns every moving part: inventory access, the prober and its
//! snapshot store, the event bus, device leases, the transport, and the
//! dialect. Callers submit typed intents and follow progress on the returned
//! event stream; exactly one terminal event ends each stream. The engine
//! guarantees session close and lease release on every exit path, including
//! cancellation and the intent deadline.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::dialect::vrp::EASY_IP_MARKER;
use crate::dialect::{Command, CommandPlan, Dialect, Intent, Mode, RejectPolicy, VrpDialect};
use crate::driver::{DialogueDriver, DriverError};
use crate::error::{EngineError, Result};
use crate::events::{EventBus, EventKind, EventSubscription, StreamId};
use crate::inventory::InventoryRepository;
use crate::probe::{Pinger, Prober, ReachabilitySnapshot, SnapshotStore, SystemPinger};
use crate::scheduler::DeviceLeases;
use crate::topology::Topology;
use crate::transport::{Endpoint, Transport, TransportError};

/// How far the fallback rewind walks before declaring the dialogue lost.
const REWIND_DEPTH: usize = 4;

/// Why a plan run stopped early.
enum PlanFailure {
    /// The Easy-IP conflict marker appeared on a fallback-eligible command.
    EasyIp {
        command: String,
    },
    /// Any other terminal condition.
    Fatal(EngineError),
}

/// The orchestration façade. Construct once, wrap in `Arc`, share freely.
pub struct ConfigEngine {
    repository: Arc<dyn InventoryRepository>,
    transport: Arc<dyn Transport>,
    dialect: Arc<dyn Dialect>,
    config: EngineConfig,
    leases: Arc<DeviceLeases>,
    bus: Arc<EventBus>,
    store: Arc<SnapshotStore>,
    prober: Arc<Prober>,
    prober_cancel: parking_lot::Mutex<Option<CancellationToken>>,
    intents: DashMap<StreamId, CancellationToken>,
}

impl ConfigEngine {
    /// Creates an engine with the standard dual-region topology, the VRP
    /// dialect, and the system pinger.
    pub fn new(
        repository: Arc<dyn InventoryRepository>,
        transport: Arc<dyn Transport>,
        config: EngineConfig,
    ) -> Arc<Self> {
        Self::with_parts(
            repository,
            transport,
            Arc::new(VrpDialect::new()),
            Topology::dual_region(),
            Arc::new(SystemPinger::new()),
            config,
        )
    }

    /// Creates an engine from explicit parts. Tests use this to inject
    /// scripted transports and pingers.
    pub fn with_parts(
        repository: Arc<dyn InventoryRepository>,
        transport: Arc<dyn Transport>,
        dialect: Arc<dyn Dialect>,
        topology: Topology,
        pinger: Arc<dyn Pinger>,
        config: EngineConfig,
    ) -> Arc<Self> {
        let store = Arc::new(SnapshotStore::new(&topology));
        let prober = Arc::new(Prober::new(
            topology,
            Arc::clone(&repository),
            pinger,
            Arc::clone(&store),
            config.clone(),
        ));
        Arc::new(Self {
            repository,
            transport,
            dialect,
            leases: Arc::new(DeviceLeases::new(config.global_session_ceiling)),
            bus: Arc::new(EventBus::new()),
            store,
            prober,
            prober_cancel: parking_lot::Mutex::new(None),
            config,
            intents: DashMap::new(),
        })
    }

    // ------------------------------------------------------------------
    // Intent lifecycle
    // ------------------------------------------------------------------

    /// Submits an intent against a device by display name. Returns the event
    /// stream id immediately; the dialogue runs in a background task.
    pub fn submit_intent(self: &Arc<Self>, device_name: impl Into<String>, intent: Intent) -> StreamId {
        let device_name = device_name.into();
        let stream_id = self.bus.open_stream();
        let cancel = CancellationToken::new();
        self.intents.insert(stream_id, cancel.clone());
        info!(%stream_id, device = %device_name, intent = intent.family(), "intent submitted");

        let engine = Arc::clone(self);
        tokio::spawn(async move {
            engine.run_intent(stream_id, device_name, intent, cancel).await;
        });
        stream_id
    }

    /// Subscribes to an intent's event stream. Late subscribers replay the
    /// backlog, so the terminal event is always observable.
    pub fn events(&self, stream_id: StreamId) -> EventSubscription {
        self.bus.subscribe(stream_id)
    }

    /// Requests cancellation of a running intent. Returns false when the
    /// intent already reached a terminal state.
    pub fn cancel(&self, stream_id: StreamId) -> bool {
        match self.intents.remove(&stream_id) {
            Some((_, token)) => {
                info!(%stream_id, "intent cancellation requested");
                token.cancel();
                true
            }
            None => false,
        }
    }

    async fn run_intent(
        self: Arc<Self>,
        stream_id: StreamId,
        device_name: String,
        intent: Intent,
        cancel: CancellationToken,
    ) {
        let deadline = Instant::now() + self.config.intent_deadline();
        let result = self
            .execute(stream_id, &device_name, &intent, deadline, &cancel)
            .await;

        // Remove the cancellation handle before the terminal event becomes
        // observable, so cancel() is false once a stream has ended.
        self.intents.remove(&stream_id);

        match result {
            Ok(family) => {
                info!(%stream_id, device = %device_name, intent = family, "intent succeeded");
                self.publish(stream_id, EventKind::TerminalSuccess {
                    intent: family.to_string(),
                });
            }
            Err(err) => {
                warn!(%stream_id, device = %device_name, reason = err.reason(), error = %err, "intent failed");
                self.publish(stream_id, EventKind::TerminalFailure {
                    reason: err.reason().to_string(),
                    message: err.to_string(),
                });
            }
        }
    }

    /// Races one step of the dialogue against cancellation and the intent
    /// deadline. Only the step future is abandoned on abort; the caller keeps
    /// running, so session close and lease release still happen.
    async fn bounded<T>(
        &self,
        cancel: &CancellationToken,
        deadline: Instant,
        step: impl std::future::Future<Output = T>,
    ) -> Result<T> {
        tokio::select! {
            _ = cancel.cancelled() => Err(EngineError::Cancelled),
            _ = tokio::time::sleep_until(deadline) => Err(EngineError::Timeout {
                phase: "intent",
                timeout_secs: self.config.intent_deadline_seconds,
            }),
            value = step => Ok(value),
        }
    }

    /// The whole dialogue for one intent: validate, resolve, lease, login,
    /// drive the plan, verify. Every awaited step is individually bounded,
    /// so cancellation and the deadline surface as errors here instead of
    /// dropping the whole future, and the session close below runs on every
    /// path out of the driving phase.
    async fn execute(
        &self,
        stream_id: StreamId,
        device_name: &str,
        intent: &Intent,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Result<&'static str> {
        self.progress(stream_id, "validating parameters");
        self.dialect.validate(intent)?;

        self.progress(stream_id, format!("resolving device '{}'", device_name));
        let device = self
            .bounded(cancel, deadline, self.repository.find_by_name(device_name))
            .await??;

        self.progress(stream_id, format!("waiting for device lease on '{}'", device.name));
        let _lease = self
            .bounded(cancel, deadline, self.leases.acquire(&device.id, deadline))
            .await??;
        self.progress(stream_id, "device lease acquired");

        let endpoint = Endpoint::new(device.name.clone(), device.endpoint());
        let session = self
            .bounded(
                cancel,
                deadline,
                self.transport
                    .open(&endpoint, &device.credentials, self.config.login_timeout()),
            )
            .await?
            .map_err(|err| open_failure(&device.name, err))?;
        self.progress(stream_id, "session established");

        let mut driver = DialogueDriver::new(
            session,
            device.name.clone(),
            self.dialect.error_markers(),
            self.config.command_timeout(),
        );
        let result = self
            .drive(stream_id, &device.name, &mut driver, intent, deadline, cancel)
            .await;
        driver.close().await;
        result
    }

    /// Runs the plan, the planned Easy-IP retry when applicable, and the
    /// verification probe.
    async fn drive(
        &self,
        stream_id: StreamId,
        device: &str,
        driver: &mut DialogueDriver,
        intent: &Intent,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Result<&'static str> {
        let plan = self.dialect.plan(intent)?;
        let mut effective = intent.clone();

        match self
            .run_plan(stream_id, device, driver, &plan, deadline, cancel)
            .await
        {
            Ok(()) => {}
            Err(PlanFailure::EasyIp { command }) => {
                let Some(fallback) = self.dialect.fallback(intent) else {
                    return Err(EngineError::DeviceRejected {
                        command,
                        detail: EASY_IP_MARKER.to_string(),
                    });
                };
                self.publish(stream_id, EventKind::Warning {
                    message: format!(
                        "device reported '{}'; retrying once with the spare ACL",
                        EASY_IP_MARKER
                    ),
                });
                debug!(%stream_id, %device, "easy-ip conflict, replanning");
                self.bounded(cancel, deadline, self.rewind_to_user(device, driver))
                    .await??;
                let retry_plan = self.dialect.plan(&fallback)?;
                match self
                    .run_plan(stream_id, device, driver, &retry_plan, deadline, cancel)
                    .await
                {
                    Ok(()) => {}
                    // The spare number conflicting too is terminal.
                    Err(PlanFailure::EasyIp { command }) => {
                        return Err(EngineError::DeviceRejected {
                            command,
                            detail: EASY_IP_MARKER.to_string(),
                        })
                    }
                    Err(PlanFailure::Fatal(err)) => return Err(err),
                }
                effective = fallback;
            }
            Err(PlanFailure::Fatal(err)) => return Err(err),
        }

        self.progress(stream_id, "verifying applied configuration");
        let observed = self
            .bounded(cancel, deadline, self.dialect.verify(driver, &effective))
            .await??;
        if !observed {
            return Err(EngineError::verification(
                effective.family(),
                "post-condition probe did not observe the expected state",
            ));
        }
        self.progress(stream_id, "verification passed");
        Ok(intent.family())
    }

    /// Issues every command in order, emitting command and output events.
    async fn run_plan(
        &self,
        stream_id: StreamId,
        device: &str,
        driver: &mut DialogueDriver,
        plan: &CommandPlan,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> std::result::Result<(), PlanFailure> {
        for command in plan.commands() {
            self.publish(stream_id, EventKind::CommandIssued {
                command: command.text.clone(),
            });
            let step = match self.bounded(cancel, deadline, driver.run(command)).await {
                Ok(step) => step,
                Err(err) => return Err(PlanFailure::Fatal(err)),
            };
            match step {
                Ok(outcome) => {
                    if outcome.confirmed {
                        self.publish(stream_id, EventKind::CommandIssued {
                            command: "Y".to_string(),
                        });
                    }
                    self.publish(stream_id, EventKind::CommandOutput {
                        command: command.text.clone(),
                        output: outcome.output,
                    });
                }
                Err(DriverError::Rejected { command: text, output }) => {
                    match command.on_reject {
                        RejectPolicy::Warning => {
                            self.publish(stream_id, EventKind::CommandOutput {
                                command: text.clone(),
                                output: output.clone(),
                            });
                            self.publish(stream_id, EventKind::Warning {
                                message: format!("device rejected optional command '{}'", text),
                            });
                        }
                        RejectPolicy::EasyIpFallback if output.contains(EASY_IP_MARKER) => {
                            return Err(PlanFailure::EasyIp { command: text });
                        }
                        _ => {
                            return Err(PlanFailure::Fatal(EngineError::DeviceRejected {
                                command: text,
                                detail: output.trim().to_string(),
                            }))
                        }
                    }
                }
                Err(err) => return Err(PlanFailure::Fatal(err.into_engine(device))),
            }
        }
        Ok(())
    }

    /// Steps the dialogue back to user view before a replan.
    async fn rewind_to_user(&self, device: &str, driver: &mut DialogueDriver) -> Result<()> {
        for _ in 0..REWIND_DEPTH {
            let step = match driver.mode() {
                Mode::User => return Ok(()),
                Mode::System => Command::new("quit", Mode::User),
                Mode::Sub(_) => Command::new("quit", Mode::System),
            };
            driver
                .run(&step)
                .await
                .map_err(|err| err.into_engine(device))?;
        }
        match driver.mode() {
            Mode::User => Ok(()),
            _ => Err(EngineError::ModeDesync {
                expected: "user",
                seen: "config",
            }),
        }
    }

    // ------------------------------------------------------------------
    // Prober and snapshot access
    // ------------------------------------------------------------------

    /// Starts the periodic prober. Idempotent while running.
    pub fn start_prober(&self) {
        let mut guard = self.prober_cancel.lock();
        if guard.is_some() {
            return;
        }
        let cancel = CancellationToken::new();
        let prober = Arc::clone(&self.prober);
        let token = cancel.clone();
        tokio::spawn(async move { prober.run(token).await });
        *guard = Some(cancel);
        info!("prober started");
    }

    /// Stops the periodic prober. The current snapshot stays readable.
    pub fn stop_prober(&self) {
        if let Some(cancel) = self.prober_cancel.lock().take() {
            cancel.cancel();
        }
    }

    /// Runs one probe cycle immediately, outside the schedule.
    pub async fn probe_once(&self) {
        self.prober.run_cycle_now().await;
    }

    /// The current complete reachability snapshot.
    pub fn current_snapshot(&self) -> Arc<ReachabilitySnapshot> {
        self.store.current()
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn publish(&self, stream_id: StreamId, kind: EventKind) {
        self.bus.publish(stream_id, kind);
    }

    fn progress(&self, stream_id: StreamId, line: impl Into<String>) {
        self.publish(stream_id, EventKind::ProgressLine { line: line.into() });
    }
}

fn open_failure(host: &str, err: TransportError) -> EngineError {
    match err {
        TransportError::LoginFailed(message) => EngineError::LoginFailed {
            host: host.to_string(),
            message,
        },
        TransportError::Timeout { timeout } => EngineError::Timeout {
            phase: "login",
            timeout_secs: timeout.as_secs(),
        },
        other => EngineError::Transport {
            host: host.to_string(),
            source: other,
        },
    }
}
