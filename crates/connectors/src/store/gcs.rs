use crate::{
    gcp::GcpAuth,
    store::{ObjectStore, ObjectWriter, error::StoreError},
};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode, Url, header};
use std::{io::SeekFrom, sync::Arc};
use tokio::{
    fs::File,
    io::{AsyncSeekExt, AsyncWriteExt, BufWriter},
};
use tokio_util::io::ReaderStream;
use tracing::debug;

const DEFAULT_ENDPOINT: &str = "https://storage.googleapis.com";

/// Google Cloud Storage over the JSON API. Paths look like
/// `gs://bucket/path/to/object`.
pub struct GcsObjectStore {
    inner: Arc<GcsClient>,
}

struct GcsClient {
    http: Client,
    auth: GcpAuth,
    endpoint: String,
}

impl GcsObjectStore {
    pub fn new(auth: GcpAuth) -> Self {
        Self::with_endpoint(auth, DEFAULT_ENDPOINT)
    }

    /// Points the client at another endpoint, such as a local emulator.
    pub fn with_endpoint(auth: GcpAuth, endpoint: &str) -> Self {
        GcsObjectStore {
            inner: Arc::new(GcsClient {
                http: Client::new(),
                auth,
                endpoint: endpoint.trim_end_matches('/').to_string(),
            }),
        }
    }
}

/// Splits `gs://bucket/object` into its bucket and object name.
pub fn parse_gs_path(path: &str) -> Result<(&str, &str), StoreError> {
    let rest = path
        .strip_prefix("gs://")
        .ok_or_else(|| StoreError::InvalidPath(path.to_string()))?;
    match rest.split_once('/') {
        Some((bucket, object)) if !bucket.is_empty() && !object.is_empty() => Ok((bucket, object)),
        _ => Err(StoreError::InvalidPath(path.to_string())),
    }
}

impl GcsClient {
    fn object_url(&self, bucket: &str, object: &str) -> Result<Url, StoreError> {
        let mut url = Url::parse(&self.endpoint)
            .map_err(|e| StoreError::InvalidPath(format!("{}: {e}", self.endpoint)))?;
        url.path_segments_mut()
            .map_err(|_| StoreError::InvalidPath(self.endpoint.clone()))?
            .extend(["storage", "v1", "b", bucket, "o", object]);
        Ok(url)
    }

    fn upload_url(&self, bucket: &str, object: &str) -> Result<Url, StoreError> {
        let mut url = Url::parse(&self.endpoint)
            .map_err(|e| StoreError::InvalidPath(format!("{}: {e}", self.endpoint)))?;
        url.path_segments_mut()
            .map_err(|_| StoreError::InvalidPath(self.endpoint.clone()))?
            .extend(["upload", "storage", "v1", "b", bucket, "o"]);
        url.query_pairs_mut()
            .append_pair("uploadType", "media")
            .append_pair("name", object);
        Ok(url)
    }

    async fn get(&self, url: Url) -> Result<Response, StoreError> {
        let token = self.auth.bearer(&self.http).await?;
        Ok(self.http.get(url).bearer_auth(token).send().await?)
    }
}

async fn http_error(path: &str, response: Response) -> StoreError {
    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        return StoreError::NotFound(path.to_string());
    }
    let message = response.text().await.unwrap_or_default();
    StoreError::Http {
        path: path.to_string(),
        status: status.as_u16(),
        message,
    }
}

#[async_trait]
impl ObjectStore for GcsObjectStore {
    async fn read(&self, path: &str) -> Result<Vec<u8>, StoreError> {
        let (bucket, object) = parse_gs_path(path)?;
        let mut url = self.inner.object_url(bucket, object)?;
        url.query_pairs_mut().append_pair("alt", "media");

        let response = self.inner.get(url).await?;
        if !response.status().is_success() {
            return Err(http_error(path, response).await);
        }
        Ok(response.bytes().await?.to_vec())
    }

    async fn exists(&self, path: &str) -> Result<bool, StoreError> {
        let (bucket, object) = parse_gs_path(path)?;
        let url = self.inner.object_url(bucket, object)?;

        let response = self.inner.get(url).await?;
        match response.status() {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(http_error(path, response).await),
        }
    }

    async fn create(&self, path: &str) -> Result<Box<dyn ObjectWriter>, StoreError> {
        parse_gs_path(path)?;
        // Spool locally so the upload is a single request with a known length.
        let spool = tempfile::tempfile().map_err(|e| StoreError::io(path, e))?;
        Ok(Box::new(GcsObjectWriter {
            client: self.inner.clone(),
            path: path.to_string(),
            spool: BufWriter::new(File::from_std(spool)),
            len: 0,
        }))
    }

    fn name(&self) -> &'static str {
        "gcs"
    }
}

struct GcsObjectWriter {
    client: Arc<GcsClient>,
    path: String,
    spool: BufWriter<File>,
    len: u64,
}

#[async_trait]
impl ObjectWriter for GcsObjectWriter {
    async fn write_all(&mut self, bytes: &[u8]) -> Result<(), StoreError> {
        self.spool
            .write_all(bytes)
            .await
            .map_err(|e| StoreError::io(&self.path, e))?;
        self.len += bytes.len() as u64;
        Ok(())
    }

    async fn finish(self: Box<Self>) -> Result<(), StoreError> {
        let GcsObjectWriter {
            client,
            path,
            mut spool,
            len,
        } = *self;

        spool.flush().await.map_err(|e| StoreError::io(&path, e))?;
        let mut file = spool.into_inner();
        file.seek(SeekFrom::Start(0))
            .await
            .map_err(|e| StoreError::io(&path, e))?;

        let (bucket, object) = parse_gs_path(&path)?;
        let url = client.upload_url(bucket, object)?;
        let token = client.auth.bearer(&client.http).await?;

        debug!(path = %path, bytes = len, "Uploading object");
        let response = client
            .http
            .post(url)
            .bearer_auth(token)
            .header(header::CONTENT_TYPE, content_type(object))
            .header(header::CONTENT_LENGTH, len)
            .body(reqwest::Body::wrap_stream(ReaderStream::new(file)))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(http_error(&path, response).await);
        }
        Ok(())
    }
}

fn content_type(object: &str) -> &'static str {
    if object.ends_with(".csv") {
        "text/csv"
    } else if object.ends_with(".json") || object.ends_with(".crc") {
        "application/json"
    } else {
        "application/octet-stream"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bucket_and_object() {
        let (bucket, object) = parse_gs_path("gs://data/postgres/sales/orders/orders-1.crc").unwrap();
        assert_eq!(bucket, "data");
        assert_eq!(object, "postgres/sales/orders/orders-1.crc");
        assert!(parse_gs_path("gs://bucket-only").is_err());
        assert!(parse_gs_path("/tmp/file").is_err());
    }

    #[test]
    fn object_names_are_a_single_encoded_segment() {
        let store = GcsObjectStore::new(GcpAuth::Static("t".into()));
        let url = store.inner.object_url("data", "a/b c.csv").unwrap();
        assert_eq!(
            url.as_str(),
            "https://storage.googleapis.com/storage/v1/b/data/o/a%2Fb%20c.csv"
        );

        let upload = store.inner.upload_url("data", "a/b.csv").unwrap();
        assert_eq!(
            upload.as_str(),
            "https://storage.googleapis.com/upload/storage/v1/b/data/o?uploadType=media&name=a%2Fb.csv"
        );
    }
}
