use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BufferError {
    #[error("buffer is empty")]
    Empty,
    #[error("index {index} out of range for {len} retained values")]
    OutOfRange { index: usize, len: usize },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum HrvError {
    #[error("need at least 2 intervals, got {0}")]
    InsufficientData(usize),
    #[error("invalid interval data: {0}")]
    InvalidData(String),
}

#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("sample timer already running")]
    AlreadyRunning,
    #[error("no ADC attached to the sample source")]
    NoAdc,
    #[error("sample rate must be positive, got {0} Hz")]
    InvalidRate(f64),
    #[error("failed to spawn sample timer: {0}")]
    Spawn(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),
    #[error("failed to spawn detection thread: {0}")]
    Spawn(std::io::Error),
    #[error("detection thread panicked")]
    WorkerPanicked,
    #[error("sample source already released")]
    SourceReleased,
}

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("remote analysis rejected the request: {0}")]
    InvalidRequest(String),
    #[error("no response on '{topic}' within {timeout_ms} ms")]
    Timeout { topic: String, timeout_ms: u64 },
    #[error("transport closed for topic '{0}'")]
    Disconnected(String),
    #[error("not subscribed to topic '{0}'")]
    NotSubscribed(String),
    #[error("malformed payload: {0}")]
    Payload(#[from] serde_json::Error),
}
