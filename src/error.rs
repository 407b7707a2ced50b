use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("unknown optimizer algorithm {0:?}")]
    UnknownAlgorithm(String),

    #[error("option {name} out of range: {value}")]
    InvalidOption { name: &'static str, value: f64 },

    #[error("{algorithm} search supports at most {max} filaments, got {count}")]
    TooManyFilaments {
        algorithm: String,
        count: usize,
        max: usize,
    },

    #[error("request {id} was superseded by request {latest}")]
    Superseded { id: u64, latest: u64 },

    #[error("planner worker is no longer running")]
    WorkerDisconnected,

    #[error("request {id} failed: {message}")]
    Internal { id: u64, message: String },
}
