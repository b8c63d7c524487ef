use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid frame size: expected {expected} samples, got {actual}")]
    InvalidFrameSize { expected: usize, actual: usize },
    #[error("Quantized LSPs are not strictly increasing")]
    UnstableSpectrum,
    #[error("Corrupted payload: {0}")]
    CorruptedPayload(&'static str),
    #[error("Unknown submode: {0}")]
    UnknownSubmode(usize),
    #[error("Unsupported control request: {0}")]
    UnsupportedControl(&'static str),
    #[error("Invalid argument: {0}")]
    InvalidArgument(&'static str),
    #[error("Invalid mode configuration: {0}")]
    InvalidConfig(String),
    #[error("Failed to parse mode configuration: {0}")]
    Config(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for symphonia_core::errors::Error {
    fn from(e: Error) -> Self {
        use symphonia_core::errors::Error as SymphoniaError;

        match e {
            Error::CorruptedPayload(reason) => SymphoniaError::DecodeError(reason),
            Error::UnknownSubmode(_) => SymphoniaError::DecodeError("Unknown submode"),
            Error::UnstableSpectrum => SymphoniaError::DecodeError("Unstable spectrum"),
            Error::InvalidFrameSize { .. } => SymphoniaError::DecodeError("Invalid frame size"),
            Error::UnsupportedControl(what) | Error::InvalidArgument(what) => {
                SymphoniaError::Unsupported(what)
            }
            Error::InvalidConfig(_) | Error::Config(_) => {
                SymphoniaError::Unsupported("Invalid Speex mode configuration")
            }
        }
    }
}
