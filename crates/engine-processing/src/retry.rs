use crate::error::ExportError;
use connectors::{
    sql::base::error::{ConnectorError, DbError, SinkError},
    store::error::StoreError,
};
use engine_core::retry::RetryDisposition;
use mysql_async::Error as MySqlError;
use std::error::Error;

/// Upload statuses worth another attempt.
const TRANSIENT_STATUS_CODES: [u16; 1] = [503];

/// MySQL server errors raised when a statement runs past its time limit:
/// lock wait timeout and `max_execution_time` exceeded.
const MYSQL_TIMEOUT_CODES: [u16; 2] = [1205, 3024];

/// Source failures are retried only when they are timeouts. Every other
/// connectivity or query failure is fatal.
pub fn classify_db_error(err: &DbError) -> RetryDisposition {
    match err {
        DbError::Sink(SinkError::Store(store_err)) => classify_store_error(store_err),
        DbError::Sink(SinkError::Encode(_)) | DbError::Decode { .. } | DbError::Unknown(_) => {
            RetryDisposition::Stop
        }
        DbError::MySqlError(MySqlError::Server(server_err))
            if MYSQL_TIMEOUT_CODES.contains(&server_err.code) =>
        {
            RetryDisposition::Retry
        }
        other => timeout_disposition(other),
    }
}

pub fn classify_connector_error(err: &ConnectorError) -> RetryDisposition {
    match err {
        ConnectorError::InvalidUrl(_) | ConnectorError::UnsupportedDriver(_) => {
            RetryDisposition::Stop
        }
        other => timeout_disposition(other),
    }
}

/// Writes are retried only on an allow-listed HTTP status.
pub fn classify_store_error(err: &StoreError) -> RetryDisposition {
    match err.status() {
        Some(status) if TRANSIENT_STATUS_CODES.contains(&status) => RetryDisposition::Retry,
        _ => RetryDisposition::Stop,
    }
}

/// Reads made while checking the cache. A missing object is a definitive
/// answer; transient statuses, local I/O hiccups and request timeouts are not.
pub fn classify_store_probe(err: &StoreError) -> RetryDisposition {
    match err {
        StoreError::NotFound(_) | StoreError::InvalidPath(_) => RetryDisposition::Stop,
        StoreError::Io { .. } => RetryDisposition::Retry,
        StoreError::Request(e) if e.is_timeout() || e.is_connect() => RetryDisposition::Retry,
        other => classify_store_error(other),
    }
}

pub fn classify_export_error(err: &ExportError) -> RetryDisposition {
    match err {
        ExportError::Source(db_err) => classify_db_error(db_err),
        ExportError::Store(store_err) => classify_store_error(store_err),
        ExportError::Encode(_) => RetryDisposition::Stop,
    }
}

fn timeout_disposition(err: &(dyn Error + 'static)) -> RetryDisposition {
    if is_timeout(err) {
        RetryDisposition::Retry
    } else {
        RetryDisposition::Stop
    }
}

/// Walks the source chain looking for a timed out I/O error or a message
/// that mentions a timeout.
fn is_timeout(err: &(dyn Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(io_err) = e.downcast_ref::<std::io::Error>()
            && io_err.kind() == std::io::ErrorKind::TimedOut
        {
            return true;
        }

        let message = e.to_string().to_lowercase();
        if message.contains("timeout") || message.contains("timed out") {
            return true;
        }
        current = e.source();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    fn http(status: u16) -> StoreError {
        StoreError::Http {
            path: "gs://b/o".into(),
            status,
            message: "nope".into(),
        }
    }

    #[test]
    fn only_timeouts_are_retried_on_the_source() {
        let timed_out = DbError::Io(io::Error::new(io::ErrorKind::TimedOut, "read"));
        assert_eq!(classify_db_error(&timed_out), RetryDisposition::Retry);

        let refused = DbError::Io(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"));
        assert_eq!(classify_db_error(&refused), RetryDisposition::Stop);

        let decode = DbError::Decode {
            column: "timeout".into(),
            message: "bad value".into(),
        };
        assert_eq!(classify_db_error(&decode), RetryDisposition::Stop);
    }

    #[test]
    fn timeout_in_the_message_is_enough() {
        let err = DbError::Io(io::Error::other("Connection timed out while reading"));
        assert_eq!(classify_db_error(&err), RetryDisposition::Retry);

        let err = ConnectorError::InvalidUrl("timeout=abc".into());
        assert_eq!(classify_connector_error(&err), RetryDisposition::Stop);
    }

    #[test]
    fn only_503_is_retried_on_upload() {
        assert_eq!(classify_store_error(&http(503)), RetryDisposition::Retry);
        assert_eq!(classify_store_error(&http(500)), RetryDisposition::Stop);
        assert_eq!(classify_store_error(&http(403)), RetryDisposition::Stop);
        assert_eq!(
            classify_store_error(&StoreError::NotFound("x".into())),
            RetryDisposition::Stop
        );
    }

    #[test]
    fn store_failures_inside_a_row_stream_keep_their_status() {
        let err = DbError::Sink(SinkError::Store(http(503)));
        assert_eq!(classify_db_error(&err), RetryDisposition::Retry);

        let err = ExportError::Source(DbError::Sink(SinkError::Store(http(404))));
        assert_eq!(classify_export_error(&err), RetryDisposition::Stop);

        let err = ExportError::Store(http(503));
        assert_eq!(classify_export_error(&err), RetryDisposition::Retry);
    }

    #[test]
    fn cache_probe_never_retries_not_found() {
        assert_eq!(
            classify_store_probe(&StoreError::NotFound("x".into())),
            RetryDisposition::Stop
        );
        let io_err = StoreError::Io {
            path: "/data/x".into(),
            source: io::Error::other("interrupted"),
        };
        assert_eq!(classify_store_probe(&io_err), RetryDisposition::Retry);
        assert_eq!(classify_store_probe(&http(503)), RetryDisposition::Retry);
    }
}
