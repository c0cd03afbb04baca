use crate::gcp::AuthError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WarehouseError {
    #[error("Warehouse table not found: {0}")]
    TableNotFound(String),

    #[error("Invalid warehouse table id `{0}`, expected project.dataset.table")]
    InvalidTableId(String),

    #[error("Warehouse returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Warehouse request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Load job {job_id} failed: {message}")]
    JobFailed { job_id: String, message: String },

    #[error("Unexpected warehouse response: {0}")]
    InvalidResponse(String),

    #[error(transparent)]
    Auth(#[from] AuthError),
}
