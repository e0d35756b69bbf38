//! 🐘 RDS Data API: SQL over HTTPS, one statement at a time.

use anyhow::Result;
use async_trait::async_trait;
use aws_sdk_rdsdata::Client;
use aws_sdk_rdsdata::types::Field;
use tracing::debug;

use super::remote_error;
use crate::retry::RetryPolicy;
use crate::sql::{FieldValue, ResultSet, StatementExecutor};

/// The database the Data API connects to. Lifecycle tables are addressed by schema.
pub const DEFAULT_DATABASE: &str = "postgres";

/// 🔌 A [`StatementExecutor`] bound to one Aurora cluster and its credentials secret.
#[derive(Debug, Clone)]
pub struct DataApiExecutor {
    client: Client,
    cluster_arn: String,
    secret_arn: String,
    database: String,
    retry: RetryPolicy,
}

impl DataApiExecutor {
    pub fn new(
        client: Client,
        cluster_arn: impl Into<String>,
        secret_arn: impl Into<String>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            client,
            cluster_arn: cluster_arn.into(),
            secret_arn: secret_arn.into(),
            database: DEFAULT_DATABASE.to_string(),
            retry,
        }
    }
}

/// 🧪 Data API field → [`FieldValue`]. Blobs and arrays are reported, not guessed at.
pub fn field_value(field: &Field) -> FieldValue {
    match field {
        Field::DoubleValue(value) => FieldValue::Double(*value),
        Field::LongValue(value) => FieldValue::Long(*value),
        Field::StringValue(value) => FieldValue::String(value.clone()),
        Field::BooleanValue(value) => FieldValue::Boolean(*value),
        Field::IsNull(_) => FieldValue::Null,
        Field::BlobValue(_) => FieldValue::Unsupported("blobValue".to_string()),
        Field::ArrayValue(_) => FieldValue::Unsupported("arrayValue".to_string()),
        other => FieldValue::Unsupported(format!("{other:?}")),
    }
}

#[async_trait]
impl StatementExecutor for DataApiExecutor {
    async fn execute(&self, sql: &str) -> Result<ResultSet> {
        debug!(database = %self.database, "🐘 {sql}");
        let output = self
            .retry
            .with_context(sql)
            .run("ExecuteStatement", || {
                let request = self
                    .client
                    .execute_statement()
                    .resource_arn(&self.cluster_arn)
                    .secret_arn(&self.secret_arn)
                    .database(&self.database)
                    .sql(sql)
                    .continue_after_timeout(false)
                    .include_result_metadata(true);
                async move { request.send().await.map_err(remote_error) }
            })
            .await?;

        let columns = output
            .column_metadata()
            .iter()
            .map(|column| column.name().map(str::to_string))
            .collect();
        let records = output
            .records()
            .iter()
            .map(|record| record.iter().map(field_value).collect())
            .collect();
        Ok(ResultSet { columns, records })
    }
}
