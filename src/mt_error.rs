use thiserror::Error;

use crate::mt_interface::{AppId, NodeId, SimTime};

/// Errors surfaced by scenario construction and execution
///
/// Everything except `Engine` is detected before the engine is touched.
#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("unknown traffic type '{0}' (expected one of CBR, Burst, CBR_Burst)")]
    UnknownTrafficType(String),

    #[error(
        "traffic pattern {pattern} needs station index {required} but only {available} wireless station(s) exist"
    )]
    InsufficientNodes {
        pattern: String,
        required: usize,
        available: usize,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("simulation engine failure: {0}")]
    Engine(#[from] EngineError),
}

/// Faults raised by a simulation engine; the harness propagates them unmodified
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no network attached to the engine")]
    NotAttached,

    #[error("a network is already attached to the engine")]
    AlreadyAttached,

    #[error("unknown application {0:?}")]
    UnknownApplication(AppId),

    #[error("unknown node {0:?}")]
    UnknownNode(NodeId),

    #[error("flow probe not installed")]
    ProbeNotInstalled,

    #[error("cannot schedule at {at} before current time {now}")]
    ScheduleInPast { at: SimTime, now: SimTime },

    #[error("engine has already run")]
    AlreadyRan,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_yaml::Error),
}
