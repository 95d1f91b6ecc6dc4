use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Config key not found: {0}")]
    ConfigNotFound(String),

    #[error("Failed to persist {what}: {source}")]
    WriteFailed {
        what: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Ticket pool could not be initialized: {0}")]
    PoolInit(String),

    #[error("Vendor is not fully configured: {0}")]
    VendorMisconfigured(String),

    #[error("Vendor not found: {0}")]
    VendorNotFound(i64),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Scheduler error: {0}")]
    Scheduler(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Failed to initialize logging: {0}")]
    Logging(String),
}

pub type Result<T> = std::result::Result<T, Error>;

pub mod exit_code {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL_ERROR: i32 = 1;
    pub const INVALID_ARGUMENTS: i32 = 2;
    pub const INVALID_CONFIG: i32 = 3;
    pub const STARTUP_FAILED: i32 = 4;
    pub const NOT_FOUND: i32 = 5;
    pub const DATABASE_ERROR: i32 = 6;
}

impl Error {
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::InvalidArgument(_) => exit_code::INVALID_ARGUMENTS,
            Error::InvalidConfig(_) | Error::VendorMisconfigured(_) => exit_code::INVALID_CONFIG,
            Error::PoolInit(_) => exit_code::STARTUP_FAILED,
            Error::ConfigNotFound(_) | Error::VendorNotFound(_) => exit_code::NOT_FOUND,
            Error::Database(_) | Error::WriteFailed { .. } => exit_code::DATABASE_ERROR,
            _ => exit_code::GENERAL_ERROR,
        }
    }

    /// Wrap a failed durable write with the thing that was being written.
    pub(crate) fn write_failed(what: impl Into<String>, source: rusqlite::Error) -> Self {
        Error::WriteFailed {
            what: what.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(
            Error::InvalidConfig("x".into()).exit_code(),
            exit_code::INVALID_CONFIG
        );
        assert_eq!(
            Error::PoolInit("x".into()).exit_code(),
            exit_code::STARTUP_FAILED
        );
        assert_eq!(Error::VendorNotFound(3).exit_code(), exit_code::NOT_FOUND);
        assert_eq!(
            Error::Scheduler("x".into()).exit_code(),
            exit_code::GENERAL_ERROR
        );
    }
}
