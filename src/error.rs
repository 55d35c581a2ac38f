use thiserror::Error;

/// Errors that can occur when using FT232x devices.
///
/// This enum covers all error conditions that may arise during device
/// communication, bit-bang control, EEPROM access, and event
/// notification.
#[derive(Error, Debug)]
pub enum Error {
    /// Transport-level I/O failure reported by the underlying driver,
    /// or an operation attempted on a closed handle. May succeed on a
    /// caller retry if the transport recovers.
    #[error("I/O error: {message}")]
    Io {
        /// Description of the transport failure.
        message: String,
    },
    /// No device was found at the specified enumeration index.
    #[error("Device not found at index {index}: {message}")]
    DeviceNotFoundByIndex {
        /// The index that was requested.
        index: usize,
        /// Additional error details.
        message: String,
    },
    /// Caller-supplied mode, mask, or configuration record field is
    /// outside the range the device accepts. Not retried; the caller
    /// must fix the value.
    #[error("Invalid configuration: {message}")]
    InvalidConfiguration {
        /// Which field or combination was rejected, and why.
        message: String,
    },
    /// The device reported a corrupted configuration block. Surfaced
    /// as-is; the block is never auto-repaired.
    #[error("Configuration block failed checksum verification")]
    Checksum,
    /// Programmer error in how the API was called (e.g., starting the
    /// event waiter with an empty mask).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl Error {
    /// Shorthand for a transport failure with a formatted message.
    pub(crate) fn io(message: impl Into<String>) -> Self {
        Error::Io {
            message: message.into(),
        }
    }

    /// The error every command returns once the session is closed.
    pub(crate) fn closed() -> Self {
        Error::io("device handle is closed")
    }

    pub(crate) fn invalid_config(message: impl Into<String>) -> Self {
        Error::InvalidConfiguration {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io {
            message: e.to_string(),
        }
    }
}

/// Result type alias for FT232x operations.
///
/// This is a convenience alias for `std::result::Result<T, Error>` used
/// throughout the crate to reduce boilerplate.
pub type Result<T> = std::result::Result<T, Error>;
