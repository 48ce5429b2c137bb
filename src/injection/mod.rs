pub mod gates;
pub mod profile;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GateError {
    #[error("gate {id}: open position {open} must be greater than close position {close}")]
    InvalidGate { id: u32, open: f64, close: f64 },

    #[error("gate {id}: invalid {field} position '{input}'")]
    InvalidFormat {
        id: u32,
        field: &'static str,
        input: String,
    },

    #[error("gate {id}: {field} position is missing")]
    MissingField { id: u32, field: &'static str },

    #[error("stage {stage} speed must be greater than zero, got {speed}")]
    InvalidSpeed { stage: usize, speed: f64 },

    #[error("stage positions must descend (start {start} > s1 {s1} > s2 {s2} > V/P {vp})")]
    InvalidStageOrder { start: f64, s1: f64, s2: f64, vp: f64 },
}
