use thiserror::Error;

#[derive(Debug, Error)]
pub enum ZkError {
    #[error("invalid input length for {what}: expected {expected}, got {got}")]
    InvalidInputLength {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("witness does not satisfy the circuit: {0}")]
    Unsatisfiable(String),

    #[error("unknown circuit: {0}")]
    UnknownCircuit(String),

    #[error("invalid proof envelope: {0}")]
    InvalidEnvelope(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("proof verification failed")]
    VerificationFailed,

    #[error("arkworks error: {0}")]
    Ark(String),
}
