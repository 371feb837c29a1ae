use std::time::Duration;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PoolError {
    #[error("Connection pool used before initialize()")]
    NotInitialized,

    #[error("Connection pool exhausted: no connection available after {waited:?}")]
    Exhausted { waited: Duration },

    #[error("Connection pool is shut down")]
    Closed,

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Health check failed: {0}")]
    HealthCheck(String),

    #[error("Handle already closed")]
    HandleClosed,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl PoolError {
    /// Sequencing or configuration mistakes that should abort startup
    pub fn is_fatal(&self) -> bool {
        matches!(self, PoolError::NotInitialized | PoolError::InvalidConfig(_))
    }

    /// Capacity or transport failures scoped to a single request
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PoolError::Exhausted { .. }
                | PoolError::Connect(_)
                | PoolError::HealthCheck(_)
                | PoolError::Io(_)
        )
    }

    /// Create a connection failed error
    pub fn connect(msg: impl Into<String>) -> Self {
        PoolError::Connect(msg.into())
    }

    /// Create a health check error
    pub fn health_check(msg: impl Into<String>) -> Self {
        PoolError::HealthCheck(msg.into())
    }

    /// Create an invalid config error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        PoolError::InvalidConfig(msg.into())
    }
}

impl From<std::io::Error> for PoolError {
    fn from(err: std::io::Error) -> Self {
        PoolError::Io(err.to_string())
    }
}
