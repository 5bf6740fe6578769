use thiserror::Error;

pub type Result<T> = std::result::Result<T, PaxzError>;

#[derive(Debug, Error)]
pub enum PaxzError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("archive error: {0}")]
    Archive(String),
    #[error("codec error in {phase} (code {code})")]
    Codec { phase: &'static str, code: u32 },
    #[error("invalid format: {0}")]
    InvalidFormat(&'static str),
    #[error("checksum mismatch (expected {expected:#010x}, actual {actual:#010x})")]
    ChecksumMismatch { expected: u32, actual: u32 },
    #[error("worker error: {0}")]
    Worker(String),
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<PaxzError>,
    },
}

impl PaxzError {
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    pub(crate) fn codec(phase: &'static str, code: u32) -> Self {
        Self::Codec { phase, code }
    }
}
