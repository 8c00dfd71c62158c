use thiserror::Error;

/// Failures talking to the remote automation agent.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AgentError {
    /// Network failure, timeout or a 5xx from the agent. Worth retrying
    /// for searches.
    #[error("Agent unavailable: {0}")]
    Unavailable(String),

    /// The agent answered with a well-formed error.
    #[error("Agent rejected the request{}: {message}", .status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default())]
    Rejected {
        status: Option<u16>,
        message: String,
    },

    /// The agent answered, but not with anything we can read.
    #[error("Invalid agent response: {0}")]
    InvalidResponse(String),
}

impl AgentError {
    pub fn rejected(message: impl Into<String>) -> Self {
        AgentError::Rejected {
            status: None,
            message: message.into(),
        }
    }
}
