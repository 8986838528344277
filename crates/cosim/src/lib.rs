//! Cosim: a co-simulation bridge that exposes a stepped model over
//! topic-addressed publish/subscribe.
//!
//! This is the top-level facade crate. It re-exports the sub-crates, adds
//! scenario setup, the example PID controller, and an offline closed-loop
//! runner, and ships the `cosim-bridge` and `cosim-controller` binaries.
//!
//! # Quick start
//!
//! ```rust
//! use cosim::prelude::*;
//!
//! let scenario = ScenarioConfig::from_toml_str(
//!     r#"
//!     [model]
//!     source = "mass-spring-damper"
//!     [model.parameters]
//!     m = 10.0
//!     d = 1.0
//!     k = 2.0
//!     "#,
//! )
//! .unwrap();
//!
//! // Run the plant for one second in lockstep with a PID controller.
//! let mut stepper = cosim::setup::build_stepper(&scenario.model).unwrap();
//! let run = OfflineRun {
//!     measurement: "x".into(),
//!     actuation: "u".into(),
//!     step_size: 0.1,
//!     stop_time: 1.0,
//! };
//! let pid = Pid::new(10.0, PidGains::new(10.0, 1.0, 2.0));
//! let rows = run.execute(&mut stepper, &pid).unwrap();
//! assert_eq!(rows.len(), 10);
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `cosim-core` | IDs, variable definitions, the model trait, errors |
//! | [`bus`] | `cosim-bus` | Messages, transports, in-memory and ZeroMQ buses |
//! | [`models`] | `cosim-models` | Built-in models and the PID controller |
//! | [`engine`] | `cosim-engine` | Stepper, router, config, and the threaded bridge |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core types and the [`types::ModelEngine`] trait (`cosim-core`).
pub use cosim_core as types;

/// Messages and transports (`cosim-bus`).
///
/// [`bus::MemoryBus`] for in-process use; ZeroMQ sockets behind the `zmq`
/// feature.
pub use cosim_bus as bus;

/// Built-in models and the reference controller (`cosim-models`).
pub use cosim_models as models;

/// Stepping and the threaded runtime (`cosim-engine`).
///
/// [`engine::ModelStepper`] for direct control of one model,
/// [`engine::Bridge`] for the clock, gateway, and publisher threads.
pub use cosim_engine as engine;

pub mod controller;
pub mod offline;
pub mod setup;

pub use controller::{ClosedLoop, ControllerConfig, ControllerReport, ControllerScenario};
pub use offline::{OfflineError, OfflineRun, TrajectoryRow};
pub use setup::SetupError;

/// Common imports for typical usage.
///
/// ```rust
/// use cosim::prelude::*;
/// ```
pub mod prelude {
    // Core types and traits
    pub use cosim_core::{Causality, ModelEngine, VarId, VariableDef, VariableRegistry};

    // Errors
    pub use cosim_core::{EngineError, LookupError, StepError};
    pub use cosim_bus::TransportError;
    pub use cosim_engine::{ConfigError, ScenarioError};

    // Transport
    pub use cosim_bus::{Endpoint, MemoryBus, Message, Publisher, Subscriber};

    // Models
    pub use cosim_models::{Pid, PidGains, PidState};

    // Engine
    pub use cosim_engine::{
        Bridge, BridgeOptions, ClockConfig, ModelStepper, OutputSnapshot, ScenarioConfig,
        ShutdownReport, TopicRouter, TopicScheme,
    };

    // Facade
    pub use crate::offline::{OfflineRun, TrajectoryRow};
    pub use crate::setup::SetupError;
}
