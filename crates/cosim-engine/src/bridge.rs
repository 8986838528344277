//! User-facing `Bridge` runtime and shutdown state machine.
//!
//! # Architecture
//!
//! ```text
//! Subscriber            Gateway Thread        Clock Thread             Publisher Thread
//!     |                       |                     |                         |
//!     |--poll(interval)------>| decode + route      |                         |
//!     |                       | mailbox.write()---->| mailbox.take()          |
//!     |                       | mailbox.reset()     | stepper.reset()?        |
//!     |                       |                     | stepper.stage()         |
//!     |                       |                     | stepper.advance(dt)     |
//!     |                       |                     | latest.store(snap)----->| tick(period)
//!     |                       |                     | wait(budget - elapsed)  | latest.load()
//!     |                       |                     |                         | encode + publish
//! ```
//!
//! The clock thread owns the [`ModelStepper`]; nothing else touches the
//! model. All three threads wake on the same shutdown signal.

use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use cosim_bus::{Publisher, Subscriber, TransportError};
use cosim_core::LookupError;
use tracing::{error, info};

use crate::clock::{ClockReport, SimulationClock};
use crate::config::{ClockConfig, ConfigError, ScenarioConfig};
use crate::gateway::{GatewayExit, GatewayReport, InputGateway};
use crate::pending::InputMailbox;
use crate::publisher::{OutputPublisher, PublisherExit, PublisherReport};
use crate::router::TopicRouter;
use crate::shutdown::{shutdown_channel, ShutdownTrigger};
use crate::snapshot::LatestSnapshot;
use crate::stepper::{ModelStepper, OutputSnapshot};

/// Default slice the gateway waits on the subscriber between shutdown
/// checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

// ── BridgeOptions ────────────────────────────────────────────────

/// Runtime settings for a [`Bridge`].
#[derive(Clone, Debug, PartialEq)]
pub struct BridgeOptions {
    /// Step size, stop condition, and pacing.
    pub clock: ClockConfig,
    /// Wall-clock time between output publications.
    pub publish_period: Duration,
    /// Subscriber poll slice.
    pub poll_interval: Duration,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            clock: ClockConfig::default(),
            publish_period: Duration::from_millis(10),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl BridgeOptions {
    /// Options taken from a validated scenario.
    pub fn from_scenario(config: &ScenarioConfig) -> Self {
        Self {
            clock: config.clock.clone(),
            publish_period: config.publish.period_duration(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

// ── ShutdownReport ───────────────────────────────────────────────

/// Report from the shutdown state machine.
#[derive(Clone, Debug)]
pub struct ShutdownReport {
    /// Total time spent in the shutdown sequence.
    pub total_ms: u64,
    /// The clock's exit report, if it was joined.
    pub clock: Option<ClockReport>,
    /// The gateway's exit report, if it was joined.
    pub gateway: Option<GatewayReport>,
    /// The publisher's exit report, if it was joined.
    pub publisher: Option<PublisherReport>,
    /// Whether every thread was joined without panicking.
    pub all_joined: bool,
}

impl ShutdownReport {
    /// The transport failure that stopped the gateway or publisher, if any.
    pub fn transport_error(&self) -> Option<&TransportError> {
        let gateway = self.gateway.as_ref().and_then(|g| match &g.exit {
            GatewayExit::Transport(e) => Some(e),
            GatewayExit::Shutdown => None,
        });
        gateway.or_else(|| {
            self.publisher.as_ref().and_then(|p| match &p.exit {
                PublisherExit::Transport(e) => Some(e),
                PublisherExit::Shutdown => None,
            })
        })
    }
}

// ── ShutdownState ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ShutdownState {
    Running,
    Draining,
    Quiescing,
    Dropped,
}

// ── Bridge ───────────────────────────────────────────────────────

/// A running bridge: one model, one inbound and one outbound transport,
/// three threads.
pub struct Bridge {
    router: Arc<TopicRouter>,
    mailbox: Arc<InputMailbox>,
    latest: Arc<LatestSnapshot>,
    trigger: ShutdownTrigger,
    clock_thread: Option<JoinHandle<(ModelStepper, ClockReport)>>,
    gateway_thread: Option<JoinHandle<GatewayReport>>,
    publisher_thread: Option<JoinHandle<PublisherReport>>,
    clock_report: Option<ClockReport>,
    clock_joined: bool,
    /// Recovered from the clock thread on exit. Wrapped in a Mutex so the
    /// Bridge is Sync (the engine is Send but not Sync).
    recovered: Mutex<Option<ModelStepper>>,
    report: Option<ShutdownReport>,
    state: ShutdownState,
}

// Compile-time assertion: Bridge must be Send + Sync.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<Bridge>();
};

impl Bridge {
    /// Spawn the clock, gateway, and publisher threads.
    ///
    /// `router` must be built over the stepper's own registry. The
    /// subscriber should already be subscribed to
    /// [`TopicRouter::subscriptions`].
    pub fn start<P, S>(
        stepper: ModelStepper,
        router: Arc<TopicRouter>,
        options: BridgeOptions,
        mut publisher: P,
        mut subscriber: S,
    ) -> Result<Self, ConfigError>
    where
        P: Publisher + 'static,
        S: Subscriber + 'static,
    {
        if !Arc::ptr_eq(stepper.registry(), router.registry()) {
            return Err(ConfigError::RegistryMismatch);
        }
        if options.publish_period.is_zero() {
            return Err(ConfigError::InvalidPublishPeriod { value: 0.0 });
        }
        let poll_interval = options.poll_interval.max(Duration::from_millis(1));

        let mailbox = Arc::new(InputMailbox::new());
        let latest = Arc::new(LatestSnapshot::new());
        let clock = SimulationClock::new(
            stepper,
            Arc::clone(&mailbox),
            Arc::clone(&latest),
            &options.clock,
        )?;
        let (mut trigger, signal) = shutdown_channel();

        // Spawn clock thread: returns the stepper on exit.
        let clock_signal = signal.clone();
        let clock_thread = thread::Builder::new()
            .name("cosim-clock".into())
            .spawn(move || clock.run(&clock_signal))
            .map_err(|e| ConfigError::ThreadSpawnFailed {
                reason: format!("cosim-clock: {e}"),
            })?;

        let gateway = InputGateway::new(Arc::clone(&router), Arc::clone(&mailbox));
        let gateway_signal = signal.clone();
        let gateway_thread = match thread::Builder::new()
            .name("cosim-gateway".into())
            .spawn(move || gateway.run(&mut subscriber, &gateway_signal, poll_interval))
        {
            Ok(handle) => handle,
            Err(e) => {
                trigger.trigger();
                let _ = clock_thread.join();
                return Err(ConfigError::ThreadSpawnFailed {
                    reason: format!("cosim-gateway: {e}"),
                });
            }
        };

        let output = OutputPublisher::new(Arc::clone(&router));
        let reader = Arc::clone(&latest);
        let period = options.publish_period;
        let publisher_thread = match thread::Builder::new()
            .name("cosim-publisher".into())
            .spawn(move || output.run(&mut publisher, &reader, period, &signal))
        {
            Ok(handle) => handle,
            Err(e) => {
                trigger.trigger();
                let _ = clock_thread.join();
                let _ = gateway_thread.join();
                return Err(ConfigError::ThreadSpawnFailed {
                    reason: format!("cosim-publisher: {e}"),
                });
            }
        };

        info!(
            inputs = router.registry().inputs().len(),
            outputs = router.registry().outputs().len(),
            publish_period_ms = period.as_millis() as u64,
            "bridge started"
        );

        Ok(Self {
            router,
            mailbox,
            latest,
            trigger,
            clock_thread: Some(clock_thread),
            gateway_thread: Some(gateway_thread),
            publisher_thread: Some(publisher_thread),
            clock_report: None,
            clock_joined: false,
            recovered: Mutex::new(None),
            report: None,
            state: ShutdownState::Running,
        })
    }

    /// The topic table this bridge serves.
    pub fn router(&self) -> &Arc<TopicRouter> {
        &self.router
    }

    /// The most recent snapshot published by the clock.
    pub fn latest_snapshot(&self) -> Option<Arc<OutputSnapshot>> {
        self.latest.load()
    }

    /// The shared input mailbox, for in-process writers.
    pub fn mailbox(&self) -> &Arc<InputMailbox> {
        &self.mailbox
    }

    /// Buffer an input write by name, as if it had arrived on its topic.
    pub fn set_input(&self, name: &str, value: f64) -> Result<(), LookupError> {
        let id = self.router.registry().input(name)?;
        self.mailbox.write(id, value);
        Ok(())
    }

    /// Request a reset, as if it had arrived on the reset topic.
    pub fn request_reset(&self) {
        self.mailbox.request_reset();
    }

    /// Whether the clock thread has exited (stop time reached without
    /// holding, step failure, or shutdown).
    pub fn is_clock_finished(&self) -> bool {
        self.clock_thread
            .as_ref()
            .map_or(true, JoinHandle::is_finished)
    }

    /// Whether the gateway thread has exited. Before shutdown this means
    /// the inbound transport failed.
    pub fn is_gateway_finished(&self) -> bool {
        self.gateway_thread
            .as_ref()
            .map_or(true, JoinHandle::is_finished)
    }

    /// Whether the publisher thread has exited. Before shutdown this means
    /// the outbound transport failed.
    pub fn is_publisher_finished(&self) -> bool {
        self.publisher_thread
            .as_ref()
            .map_or(true, JoinHandle::is_finished)
    }

    /// Whether any of the three threads has exited.
    pub fn any_task_finished(&self) -> bool {
        self.is_clock_finished() || self.is_gateway_finished() || self.is_publisher_finished()
    }

    /// Block until the clock thread exits on its own, then shut the rest
    /// down.
    ///
    /// With `hold_at_stop` enabled and no step failure the clock never
    /// exits on its own; use [`shutdown()`](Self::shutdown) instead.
    pub fn wait(&mut self) -> ShutdownReport {
        if let Some(handle) = self.clock_thread.take() {
            self.join_clock(handle);
        }
        self.shutdown()
    }

    /// Shutdown the bridge with the 4-state machine.
    ///
    /// 1. **Running → Draining:** fire the shutdown signal (wakes every
    ///    thread from its sleep or poll) and join the clock.
    /// 2. **Draining → Quiescing:** join the gateway and publisher.
    /// 3. **Quiescing → Dropped:** assemble the report.
    ///
    /// Idempotent: later calls return the first report.
    pub fn shutdown(&mut self) -> ShutdownReport {
        if self.state == ShutdownState::Dropped {
            if let Some(report) = &self.report {
                return report.clone();
            }
        }

        let start = Instant::now();

        // Phase 1: Running → Draining
        self.state = ShutdownState::Draining;
        self.trigger.trigger();
        if let Some(handle) = self.clock_thread.take() {
            self.join_clock(handle);
        }

        // Phase 2: Draining → Quiescing
        self.state = ShutdownState::Quiescing;
        let (gateway, gateway_joined) = join_thread(self.gateway_thread.take(), "cosim-gateway");
        let (publisher, publisher_joined) =
            join_thread(self.publisher_thread.take(), "cosim-publisher");

        // Phase 3: Quiescing → Dropped
        self.state = ShutdownState::Dropped;
        let report = ShutdownReport {
            total_ms: start.elapsed().as_millis() as u64,
            clock: self.clock_report.clone(),
            gateway,
            publisher,
            all_joined: self.clock_joined && gateway_joined && publisher_joined,
        };
        info!(
            total_ms = report.total_ms,
            all_joined = report.all_joined,
            outcome = ?report.clock.as_ref().map(|c| &c.outcome),
            "bridge stopped"
        );
        self.report = Some(report.clone());
        report
    }

    fn join_clock(&mut self, handle: JoinHandle<(ModelStepper, ClockReport)>) {
        let (result, joined) = join_thread(Some(handle), "cosim-clock");
        self.clock_joined = joined;
        if let Some((stepper, report)) = result {
            *self
                .recovered
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(stepper);
            self.clock_report = Some(report);
        }
    }

    /// Take the stepper back after the clock has exited.
    ///
    /// Returns `None` while the clock is running, if the clock panicked,
    /// or if the stepper was already taken.
    pub fn take_stepper(&mut self) -> Option<ModelStepper> {
        self.recovered
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

fn join_thread<T>(handle: Option<JoinHandle<T>>, name: &str) -> (Option<T>, bool) {
    match handle {
        None => (None, true),
        Some(handle) => match handle.join() {
            Ok(value) => (Some(value), true),
            Err(_) => {
                error!(thread = name, "thread panicked");
                (None, false)
            }
        },
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        if self.state != ShutdownState::Dropped {
            self.shutdown();
        }
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("state", &self.state)
            .field("snapshot_version", &self.latest.version())
            .field("clock_finished", &self.is_clock_finished())
            .finish()
    }
}
