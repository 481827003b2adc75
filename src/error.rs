//! Error types for the orders relay.

/// Top-level error type for the relay.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Sheet error: {0}")]
    Sheet(#[from] SheetError),
}

/// Configuration-related errors. Fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),
}

/// Channel-related errors (platform I/O and order delivery).
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Failed to send on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Order delivery failed on channel {name}: {reason}")]
    DeliveryFailed { name: String, reason: String },

    #[error("Member lookup failed on channel {name}: {reason}")]
    LookupFailed { name: String, reason: String },
}

/// Order log sink errors. Reported, never propagated past the dispatcher.
#[derive(Debug, thiserror::Error)]
pub enum SheetError {
    #[error("Sheet append request failed: {0}")]
    Request(String),

    #[error("Sheet append rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// User input that could not be accepted. Surfaced to the user as a rejection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("`{value}` is not a whole number.")]
    NotANumber { value: String },

    #[error("Turn must be a positive number, got `{value}`.")]
    NotPositive { value: String },

    #[error("Turn `{value}` is too large.")]
    OutOfRange { value: String },
}

/// The sender is not a member of the home server.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MembershipError {
    #[error("You need to be a member of the server to use this bot.")]
    NotMember { user_id: String },
}

/// Result type alias for the relay.
pub type Result<T> = std::result::Result<T, Error>;
