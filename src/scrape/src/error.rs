use crate::parser::ParseError;
use crate::storage::StorageError;

/// The single most relevant error of one ingestion pass.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum IngestError {
    #[error("missing metric name (__name__ label)")]
    MissingMetricName,
    #[error("invalid metric name or label names: {0}")]
    InvalidLabels(String),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl IngestError {
    pub fn is_sample_limit(&self) -> bool {
        matches!(self, Self::Storage(StorageError::SampleLimitExceeded))
    }

    pub fn is_bucket_limit(&self) -> bool {
        matches!(self, Self::Storage(StorageError::BucketLimitExceeded))
    }
}

pub type Result<T> = std::result::Result<T, IngestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            IngestError::MissingMetricName.to_string(),
            "missing metric name (__name__ label)"
        );
        assert_eq!(
            IngestError::from(StorageError::SampleLimitExceeded).to_string(),
            "sample limit exceeded"
        );
        assert!(IngestError::from(StorageError::BucketLimitExceeded).is_bucket_limit());
    }
}
