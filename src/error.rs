use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum BridgeError {
    #[error("Property already registered: {0}")]
    DuplicateField(String),

    #[error("Property not registered: {0}")]
    NotRegistered(String),

    #[error("Property is read-only: {0}")]
    ReadOnlyField(String),

    #[error("Invalid value for property {field}: expected {expected}")]
    InvalidValue { field: String, expected: String },

    #[error("No inverters found at {0}")]
    NoDevicesFound(String),

    #[error("Unknown thing: {0}")]
    UnknownThing(String),

    #[error("Command not supported by device: {0}")]
    UnsupportedCommand(String),

    #[error("Consumer context is no longer running")]
    ConsumerClosed,

    #[error("DTU request failed: {0}")]
    DtuRequest(#[from] reqwest::Error),

    #[error("Unexpected DTU response: {0}")]
    DtuResponse(String),

    #[error("MQTT error: {0}")]
    Mqtt(String),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
