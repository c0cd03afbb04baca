use crate::{commands::RunArgs, env::EnvManager, error::CliError};
use connectors::sql::base::{adapter::DatabaseKind, connection::ConnectionSettings};
use engine_runtime::capability::ExtractionOptions;
use model::{
    core::identifiers::{TableRef, WarehouseTableId},
    split::SplitDirective,
};
use serde::Deserialize;
use std::path::Path;
use tracing::info;

/// Settings as read from the YAML document. Every value may be overridden
/// by its environment variable, then by a command line flag.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub db_driver: Option<String>,
    pub db_username: Option<String>,
    pub db_password: Option<String>,
    pub db_host: Option<String>,
    pub db_port: Option<u16>,
    pub db_database: Option<String>,
    pub db_table: Option<String>,
    #[serde(alias = "sql_server_schema")]
    pub db_schema: Option<String>,
    pub split_size: Option<i64>,
    pub destination: Option<String>,
    pub gcs_bucket: Option<String>,
    pub bq_dataset: Option<String>,
    pub target_gcp_project: Option<String>,
    pub bq_location: Option<String>,
    pub key_fields: Vec<String>,
    pub extra_crc_fields: Vec<String>,
    pub unsupported_types: Option<Vec<String>>,
    pub force_load: bool,
    pub gcp_access_token: Option<String>,
}

/// Fully resolved values for one run.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub connection: ConnectionSettings,
    pub table: TableRef,
    pub destination: String,
    pub directive: SplitDirective,
    pub extraction: ExtractionOptions,
    pub access_token: Option<String>,
    pub force_load: bool,
    pub warehouse: Option<WarehouseSettings>,
}

#[derive(Debug, Clone)]
pub struct WarehouseSettings {
    pub table_id: WarehouseTableId,
    pub location: Option<String>,
}

impl IngestConfig {
    /// Reads the document named by `CONFIG_FILE`, or else by `--config`.
    /// Without either, every value has to come from the environment.
    pub fn load(flag_path: Option<&str>, env: &EnvManager) -> Result<Self, CliError> {
        let path = match (env.get("CONFIG_FILE"), flag_path) {
            (Some(path), _) => {
                info!(path, "Reading config (set in env)");
                path
            }
            (None, Some(path)) => {
                info!(path, "Reading config (program argument)");
                path
            }
            (None, None) => {
                info!("No config file specified");
                return Ok(Self::default());
            }
        };
        Self::from_file(path)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, CliError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, CliError> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(raw)?)
    }

    pub fn apply_env(&mut self, env: &EnvManager) -> Result<(), CliError> {
        let text = |slot: &mut Option<String>, key: &str| {
            if let Some(value) = env.get(key) {
                *slot = Some(value.to_string());
            }
        };
        text(&mut self.db_driver, "DB_DRIVER");
        text(&mut self.db_username, "DB_USERNAME");
        text(&mut self.db_password, "DB_PASSWORD");
        text(&mut self.db_host, "DB_HOST");
        text(&mut self.db_database, "DB_DATABASE");
        text(&mut self.db_table, "DB_TABLE");
        text(&mut self.db_schema, "SQL_SERVER_SCHEMA");
        text(&mut self.db_schema, "DB_SCHEMA");
        text(&mut self.destination, "DESTINATION");
        text(&mut self.gcs_bucket, "GCS_BUCKET");
        text(&mut self.bq_dataset, "BQ_DATASET");
        text(&mut self.target_gcp_project, "TARGET_GCP_PROJECT");
        text(&mut self.bq_location, "BQ_LOCATION");
        text(&mut self.gcp_access_token, "GCP_ACCESS_TOKEN");

        if let Some(port) = env.parse("DB_PORT")? {
            self.db_port = Some(port);
        }
        if let Some(split_size) = env.parse("SPLIT_SIZE")? {
            self.split_size = Some(split_size);
        }
        if let Some(fields) = env.list("KEY_FIELDS") {
            self.key_fields = fields;
        }
        if let Some(fields) = env.list("EXTRA_CRC_FIELDS") {
            self.extra_crc_fields = fields;
        }
        if let Some(types) = env.list("UNSUPPORTED_TYPES") {
            self.unsupported_types = Some(types);
        }
        if env.is_set("DISABLE_LOAD_CACHE") {
            self.force_load = true;
        }
        Ok(())
    }

    pub fn apply_args(&mut self, args: &RunArgs) {
        if let Some(table) = &args.table {
            self.db_table = Some(table.clone());
        }
        if let Some(schema) = &args.schema {
            self.db_schema = Some(schema.clone());
        }
        if let Some(split_size) = args.split_size {
            self.split_size = Some(split_size);
        }
        if let Some(destination) = &args.destination {
            self.destination = Some(destination.clone());
        }
        if !args.key_fields.is_empty() {
            self.key_fields = args.key_fields.clone();
        }
        if !args.extra_fields.is_empty() {
            self.extra_crc_fields = args.extra_fields.clone();
        }
    }

    /// Checks required values and derives the rest. Warehouse settings are
    /// only required when `with_warehouse` is set.
    pub fn resolve(self, with_warehouse: bool) -> Result<RunSettings, CliError> {
        let kind: DatabaseKind = self
            .db_driver
            .as_deref()
            .unwrap_or("postgres")
            .parse()
            .map_err(CliError::Config)?;

        let username = require(self.db_username, "DB_USERNAME")?;
        let password = require(self.db_password, "DB_PASSWORD")?;
        let host = require(self.db_host, "DB_HOST")?;
        if host.contains(':') {
            return Err(CliError::Config(format!(
                "Port should not be specified in host, use DB_PORT to override port ({})",
                kind.default_port()
            )));
        }
        let database = require(self.db_database, "DB_DATABASE")?;
        let table_name = require(self.db_table, "DB_TABLE")?;
        let schema = self
            .db_schema
            .unwrap_or_else(|| kind.default_schema(&database));

        let destination = match self.destination {
            Some(destination) => destination.trim_end_matches('/').to_string(),
            None => {
                let bucket = require(self.gcs_bucket, "GCS_BUCKET")?;
                let dataset = require(self.bq_dataset.clone(), "BQ_DATASET")?;
                format!("gs://{bucket}/{}/{dataset}", kind.as_str())
            }
        };

        let warehouse = if with_warehouse {
            let project = require(self.target_gcp_project, "TARGET_GCP_PROJECT")?;
            let dataset = require(self.bq_dataset, "BQ_DATASET")?;
            Some(WarehouseSettings {
                table_id: WarehouseTableId::new(&project, &dataset, &table_name),
                location: self.bq_location,
            })
        } else {
            None
        };

        Ok(RunSettings {
            connection: ConnectionSettings {
                kind,
                port: self.db_port.unwrap_or_else(|| kind.default_port()),
                host,
                username,
                password,
                database,
            },
            table: TableRef::new(schema, table_name),
            destination,
            directive: SplitDirective::from_i64(self.split_size.unwrap_or(-1)),
            extraction: ExtractionOptions {
                key_fields: self.key_fields,
                extra_fingerprint_fields: self.extra_crc_fields,
                unsupported_types: self.unsupported_types,
            },
            access_token: self.gcp_access_token,
            force_load: self.force_load,
            warehouse,
        })
    }
}

fn require(value: Option<String>, name: &'static str) -> Result<String, CliError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or(CliError::MissingConfig(name))
}
