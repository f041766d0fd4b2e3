use thiserror::Error;

pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that end an ingest run
///
/// Every variant is terminal: nothing in the pipeline retries. Values that
/// fail datetime coercion are not errors at all; they are stored as null.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The source file could not be fetched (bad URL, HTTP status, broken
    /// transfer or local write failure).
    #[error("error downloading file: {context}")]
    Download {
        context: String,
        #[source]
        source: Option<BoxError>,
    },

    /// The database could not be reached or refused the credentials.
    #[error("database connection failed: {context}")]
    Connection {
        context: String,
        #[source]
        source: Option<BoxError>,
    },

    /// The downloaded file is not readable Parquet.
    #[error("invalid Parquet data: {context}")]
    Format {
        context: String,
        #[source]
        source: Option<BoxError>,
    },

    /// A batch could not be transformed or written.
    #[error("failed to load batch: {context}")]
    Load {
        context: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl IngestError {
    pub(crate) fn download(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Download {
            context: context.into(),
            source: Some(source.into()),
        }
    }

    pub(crate) fn connection(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Connection {
            context: context.into(),
            source: Some(source.into()),
        }
    }

    pub(crate) fn format(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Format {
            context: context.into(),
            source: Some(source.into()),
        }
    }

    pub(crate) fn load(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Load {
            context: context.into(),
            source: Some(source.into()),
        }
    }

    pub(crate) fn load_msg(context: impl Into<String>) -> Self {
        Self::Load {
            context: context.into(),
            source: None,
        }
    }

    /// Process exit code for this failure
    ///
    /// Download and connection failures are the explicit early exits (1);
    /// everything else that aborts a run exits with 2.
    pub fn exit_code(&self) -> u8 {
        match self {
            IngestError::Download { .. } | IngestError::Connection { .. } => 1,
            IngestError::Format { .. } | IngestError::Load { .. } | IngestError::InvalidConfig(_) => 2,
        }
    }
}
