use std::fmt;

#[derive(Debug)]
pub enum ImportError {
    Validation(String),
    Database(String),
    /// Network-level failure: connect, DNS, reset, client-side timeout.
    Transport(String),
    /// Non-2xx response, with as much of the body as the server gave us.
    Status { code: u16, body: String },
    Parse(String),
}

impl ImportError {
    /// Transient failures worth another attempt: transport errors, 429 and
    /// the overload family of 5xx. Everything else is terminal.
    pub fn is_retryable(&self) -> bool {
        match self {
            ImportError::Transport(_) => true,
            ImportError::Status { code, .. } => {
                matches!(*code, 429 | 500 | 502 | 503 | 504)
            }
            _ => false,
        }
    }
}

impl fmt::Display for ImportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportError::Validation(msg) => write!(f, "Validation error: {}", msg),
            ImportError::Database(msg) => write!(f, "Database error: {}", msg),
            ImportError::Transport(msg) => write!(f, "Transport error: {}", msg),
            ImportError::Status { code, body } => write!(f, "HTTP {}: {}", code, body),
            ImportError::Parse(msg) => write!(f, "Parse error: {}", msg),
        }
    }
}

impl std::error::Error for ImportError {}

impl From<tokio_postgres::Error> for ImportError {
    fn from(err: tokio_postgres::Error) -> Self {
        ImportError::Database(err.to_string())
    }
}

impl From<deadpool_postgres::PoolError> for ImportError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        ImportError::Database(err.to_string())
    }
}

impl From<reqwest::Error> for ImportError {
    fn from(err: reqwest::Error) -> Self {
        ImportError::Transport(err.to_string())
    }
}
