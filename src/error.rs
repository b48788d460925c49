// Store error kinds

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("failed to read persisted state: {0}")]
    StorageRead(String),

    #[error("failed to persist state: {0}")]
    StorageWrite(String),

    #[error("index {index} out of range for {len} tasks")]
    IndexOutOfRange { index: usize, len: usize },
}

impl StoreError {
    pub(crate) fn read(report: &eyre::Report) -> Self {
        StoreError::StorageRead(format!("{:#}", report))
    }

    pub(crate) fn write(report: &eyre::Report) -> Self {
        StoreError::StorageWrite(format!("{:#}", report))
    }
}
