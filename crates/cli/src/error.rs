use connectors::sql::base::error::ConnectorError;
use engine_runtime::error::IngestError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Failed to read the configuration file: {0}")]
    ConfigFileRead(#[from] std::io::Error),

    #[error("Failed to parse the configuration file as YAML: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    #[error("Missing {0} env variable or in config")]
    MissingConfig(&'static str),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Failed to connect to the source database: {0}")]
    Connect(#[from] ConnectorError),

    #[error("Ingestion failed: {0}")]
    Ingest(#[from] IngestError),

    #[error("Failed to serialize data to JSON: {0}")]
    JsonSerialize(#[from] serde_json::Error),
}
