//! 🐘 SQL helpers for the deployment lifecycle database: quoting, naming, and
//! turning Data API fields back into JSON.

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use serde_json::{Map, Number, Value};

pub const STATE_TABLE: &str = "state";
pub const COMMANDS_TABLE: &str = "commands";
pub const DEPLOYMENT_ID_COLUMN: &str = "deploymentId";

/// `"ident"` with embedded double quotes doubled.
pub fn escape_id(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

/// `'literal'` with embedded single quotes doubled.
pub fn escape(literal: &str) -> String {
    format!("'{}'", literal.replace('\'', "''"))
}

/// 🔢 The trailing number of a deployment id (`my-app-17` → 17).
pub fn deployment_version(deployment: &str) -> Result<u64> {
    let digits_from = deployment
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map(|(index, _)| index);
    let Some(start) = digits_from else {
        bail!("💀 unsupported deployment id {deployment}");
    };
    deployment[start..]
        .parse()
        .map_err(|_| anyhow!("💀 unsupported deployment id {deployment}"))
}

pub fn lifecycle_database(version: u64) -> String {
    format!("deployment-command-queue-prod-{version}")
}

/// 🔍 `SELECT * FROM "<db>"."<table>" WHERE "deploymentId" = '<deployment>'`
pub fn select_by_deployment(database: &str, table: &str, deployment: &str) -> String {
    format!(
        "SELECT * FROM {}.{} WHERE {} = {}",
        escape_id(database),
        escape_id(table),
        escape_id(DEPLOYMENT_ID_COLUMN),
        escape(deployment)
    )
}

/// 🧪 One Data API field, as the toolkit sees it. Checked in this order when coercing.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Double(f64),
    Long(i64),
    String(String),
    Boolean(bool),
    Null,
    /// blobs, arrays and anything newer than this enum
    Unsupported(String),
}

pub fn coerce(field: FieldValue) -> Result<Value> {
    Ok(match field {
        FieldValue::Double(value) => Number::from_f64(value)
            .map(Value::Number)
            .ok_or_else(|| anyhow!("💀 {value} has no JSON representation"))?,
        FieldValue::Long(value) => Value::from(value),
        FieldValue::String(value) => Value::String(value),
        FieldValue::Boolean(value) => Value::Bool(value),
        FieldValue::Null => Value::Null,
        FieldValue::Unsupported(kind) => bail!("💀 unknown field type {kind}"),
    })
}

/// 🧱 Zip column names with a record's fields into a JSON object. Unnamed columns are skipped.
pub fn row_to_object(columns: &[Option<String>], record: Vec<FieldValue>) -> Result<Value> {
    let mut row = Map::new();
    for (column, field) in columns.iter().zip(record) {
        if let Some(name) = column {
            row.insert(name.clone(), coerce(field)?);
        }
    }
    Ok(Value::Object(row))
}

/// 📋 What one statement returned: column names (when the driver knows them) and raw records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    pub columns: Vec<Option<String>>,
    pub records: Vec<Vec<FieldValue>>,
}

impl ResultSet {
    /// Every record as a JSON object keyed by column name.
    pub fn into_objects(self) -> Result<Vec<Value>> {
        let Self { columns, records } = self;
        records
            .into_iter()
            .map(|record| row_to_object(&columns, record))
            .collect()
    }
}

/// 🔌 Runs one SQL statement somewhere and hands back the rows.
#[async_trait]
pub trait StatementExecutor: Send + Sync {
    async fn execute(&self, sql: &str) -> Result<ResultSet>;
}

/// 📦 Parse a column holding embedded JSON text in place. Missing or non-string columns are left alone.
pub fn parse_embedded_json(row: &mut Value, column: &str) -> Result<()> {
    if let Some(slot) = row.get_mut(column)
        && let Value::String(text) = slot
    {
        let parsed = serde_json::from_str(text)
            .map_err(|err| anyhow!("💀 column {column} does not hold valid JSON: {err}"))?;
        *slot = parsed;
    }
    Ok(())
}
