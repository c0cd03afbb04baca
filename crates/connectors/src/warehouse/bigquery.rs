use crate::{
    gcp::GcpAuth,
    warehouse::{
        LoadJobHandle, LoadJobSpec, WarehouseClient, WarehouseField, WriteDisposition,
        error::WarehouseError,
    },
};
use async_trait::async_trait;
use model::core::identifiers::WarehouseTableId;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

const DEFAULT_ENDPOINT: &str = "https://bigquery.googleapis.com/bigquery/v2";

/// BigQuery over its REST API.
pub struct BigQueryClient {
    http: Client,
    auth: GcpAuth,
    endpoint: String,
    location: Option<String>,
    poll_interval: Duration,
}

impl BigQueryClient {
    pub fn new(auth: GcpAuth, location: Option<String>) -> Self {
        BigQueryClient {
            http: Client::new(),
            auth,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            location,
            poll_interval: Duration::from_secs(2),
        }
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.trim_end_matches('/').to_string();
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    async fn token(&self) -> Result<String, WarehouseError> {
        Ok(self.auth.bearer(&self.http).await?)
    }
}

fn split_table_id(table: &WarehouseTableId) -> Result<(&str, &str, &str), WarehouseError> {
    table
        .parts()
        .ok_or_else(|| WarehouseError::InvalidTableId(table.to_string()))
}

async fn http_error(response: Response) -> WarehouseError {
    let status = response.status().as_u16();
    let message = response.text().await.unwrap_or_default();
    WarehouseError::Http { status, message }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableResource {
    /// BigQuery encodes int64 fields as strings.
    num_rows: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct JobRequest<'a> {
    job_reference: JobReference,
    configuration: JobConfiguration<'a>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    project_id: String,
    job_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<String>,
}

#[derive(Debug, Serialize)]
struct JobConfiguration<'a> {
    load: LoadConfiguration<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LoadConfiguration<'a> {
    source_uris: Vec<&'a str>,
    destination_table: TableReference<'a>,
    schema: SchemaFields<'a>,
    source_format: &'static str,
    skip_leading_rows: u32,
    allow_quoted_newlines: bool,
    write_disposition: WriteDisposition,
    create_disposition: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TableReference<'a> {
    project_id: &'a str,
    dataset_id: &'a str,
    table_id: &'a str,
}

#[derive(Debug, Serialize)]
struct SchemaFields<'a> {
    fields: &'a [WarehouseField],
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobResource {
    job_reference: JobReference,
    status: Option<JobStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobStatus {
    state: String,
    error_result: Option<ErrorProto>,
}

#[derive(Debug, Deserialize)]
struct ErrorProto {
    reason: Option<String>,
    message: Option<String>,
}

impl ErrorProto {
    fn describe(&self) -> String {
        match (&self.reason, &self.message) {
            (Some(reason), Some(message)) => format!("{reason}: {message}"),
            (None, Some(message)) => message.clone(),
            (Some(reason), None) => reason.clone(),
            (None, None) => "unknown error".to_string(),
        }
    }
}

fn load_request<'a>(
    spec: &'a LoadJobSpec,
    job_id: String,
    location: Option<String>,
) -> Result<JobRequest<'a>, WarehouseError> {
    let (project, dataset, table) = split_table_id(&spec.table_id)?;
    Ok(JobRequest {
        job_reference: JobReference {
            project_id: project.to_string(),
            job_id,
            location,
        },
        configuration: JobConfiguration {
            load: LoadConfiguration {
                source_uris: vec![spec.source_uri.as_str()],
                destination_table: TableReference {
                    project_id: project,
                    dataset_id: dataset,
                    table_id: table,
                },
                schema: SchemaFields {
                    fields: &spec.schema,
                },
                source_format: "CSV",
                skip_leading_rows: spec.skip_leading_rows,
                allow_quoted_newlines: spec.allow_quoted_newlines,
                write_disposition: spec.write_disposition,
                create_disposition: "CREATE_IF_NEEDED",
            },
        },
    })
}

#[async_trait]
impl WarehouseClient for BigQueryClient {
    async fn table_row_count(&self, table: &WarehouseTableId) -> Result<u64, WarehouseError> {
        let (project, dataset, name) = split_table_id(table)?;
        let url = format!(
            "{}/projects/{project}/datasets/{dataset}/tables/{name}",
            self.endpoint
        );

        let response = self
            .http
            .get(&url)
            .bearer_auth(self.token().await?)
            .send()
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => return Err(WarehouseError::TableNotFound(table.to_string())),
            s if !s.is_success() => return Err(http_error(response).await),
            _ => {}
        }

        let resource: TableResource = response.json().await?;
        match resource.num_rows {
            Some(rows) => rows
                .parse::<u64>()
                .map_err(|e| WarehouseError::InvalidResponse(format!("numRows `{rows}`: {e}"))),
            None => Ok(0),
        }
    }

    async fn submit_load(&self, spec: &LoadJobSpec) -> Result<LoadJobHandle, WarehouseError> {
        let job_id = format!("splitsync_{}", Uuid::new_v4().simple());
        let request = load_request(spec, job_id, self.location.clone())?;
        let url = format!(
            "{}/projects/{}/jobs",
            self.endpoint, request.job_reference.project_id
        );

        debug!(table_id = %spec.table_id, uri = %spec.source_uri, "Submitting load job");
        let response = self
            .http
            .post(&url)
            .bearer_auth(self.token().await?)
            .json(&request)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(http_error(response).await);
        }

        let job: JobResource = response.json().await?;
        info!(job_id = %job.job_reference.job_id, "Load job accepted");
        Ok(LoadJobHandle {
            project: job.job_reference.project_id,
            job_id: job.job_reference.job_id,
            location: job.job_reference.location,
        })
    }

    async fn wait(&self, job: &LoadJobHandle) -> Result<(), WarehouseError> {
        let url = format!(
            "{}/projects/{}/jobs/{}",
            self.endpoint, job.project, job.job_id
        );

        loop {
            let mut request = self.http.get(&url).bearer_auth(self.token().await?);
            if let Some(location) = &job.location {
                request = request.query(&[("location", location)]);
            }

            let response = request.send().await?;
            if !response.status().is_success() {
                return Err(http_error(response).await);
            }

            let resource: JobResource = response.json().await?;
            let status = resource.status.ok_or_else(|| {
                WarehouseError::InvalidResponse(format!("job {} has no status", job.job_id))
            })?;

            if status.state == "DONE" {
                return match status.error_result {
                    Some(error) => Err(WarehouseError::JobFailed {
                        job_id: job.job_id.clone(),
                        message: error.describe(),
                    }),
                    None => Ok(()),
                };
            }

            debug!(job_id = %job.job_id, state = %status.state, "Waiting for load job");
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_request_matches_rest_shape() {
        let spec = LoadJobSpec::overwrite_csv(
            WarehouseTableId::new("proj", "sales", "orders"),
            "gs://b/postgres/sales/orders/orders-content*.csv".into(),
            vec![WarehouseField::nullable("id", "INT64")],
        );
        let request = load_request(&spec, "job1".into(), Some("EU".into())).unwrap();
        let json = serde_json::to_value(&request).unwrap();

        let load = &json["configuration"]["load"];
        assert_eq!(json["jobReference"]["jobId"], "job1");
        assert_eq!(json["jobReference"]["location"], "EU");
        assert_eq!(load["sourceUris"][0], "gs://b/postgres/sales/orders/orders-content*.csv");
        assert_eq!(load["destinationTable"]["datasetId"], "sales");
        assert_eq!(load["writeDisposition"], "WRITE_TRUNCATE");
        assert_eq!(load["skipLeadingRows"], 1);
        assert_eq!(load["allowQuotedNewlines"], true);
        assert_eq!(load["schema"]["fields"][0]["type"], "INT64");
        assert_eq!(load["schema"]["fields"][0]["mode"], "NULLABLE");
    }

    #[test]
    fn malformed_table_id_is_rejected() {
        let spec = LoadJobSpec::overwrite_csv("orders".into(), "gs://b/x".into(), vec![]);
        assert!(matches!(
            load_request(&spec, "j".into(), None),
            Err(WarehouseError::InvalidTableId(_))
        ));
    }

    #[test]
    fn error_result_is_described() {
        let error = ErrorProto {
            reason: Some("invalid".into()),
            message: Some("bad row".into()),
        };
        assert_eq!(error.describe(), "invalid: bad row");
    }
}
