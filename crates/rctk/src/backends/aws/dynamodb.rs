//! 🗄️ DynamoDB: scan pages in, update items out, and the AttributeValue ↔ JSON shuffle.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::types::AttributeValue;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Map, Number, Value};

use super::remote_error;
use crate::backends::Listing;
use crate::common::Page;
use crate::retry::{RetryError, RetryPolicy};
use crate::update_expression::UpdateExpression;

/// 🔖 Scan cursor: the last evaluated key.
pub type ScanCursor = HashMap<String, AttributeValue>;

/// 🚰 A full-table scan, one page per `Scan` call, items rendered as plain JSON.
#[derive(Debug, Clone)]
pub struct ScanListing {
    client: Client,
    table: String,
    retry: RetryPolicy,
}

impl ScanListing {
    pub fn new(client: Client, table: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            client,
            table: table.into(),
            retry,
        }
    }
}

#[async_trait]
impl Listing for ScanListing {
    type Item = Value;
    type Cursor = ScanCursor;

    async fn fetch_page(&mut self, cursor: Option<ScanCursor>) -> Result<Page<Value, ScanCursor>> {
        let output = self
            .retry
            .run("Scan", || {
                let request = self
                    .client
                    .scan()
                    .table_name(&self.table)
                    .set_exclusive_start_key(cursor.clone());
                async move { request.send().await.map_err(remote_error) }
            })
            .await?;

        let items = output.items().iter().map(item_to_json).collect();
        Ok(Page::new(items, output.last_evaluated_key().cloned()))
    }
}

/// 🧾 One item as a JSON object.
pub fn item_to_json(item: &HashMap<String, AttributeValue>) -> Value {
    let map: Map<String, Value> = item
        .iter()
        .map(|(name, value)| (name.clone(), attribute_to_json(value)))
        .collect();
    Value::Object(map)
}

/// 🔄 AttributeValue → JSON. Numbers stay numbers when JSON can hold them, binaries
/// become base64 strings, sets become arrays.
pub fn attribute_to_json(value: &AttributeValue) -> Value {
    match value {
        AttributeValue::S(text) => Value::String(text.clone()),
        AttributeValue::N(number) => number_to_json(number),
        AttributeValue::Bool(flag) => Value::Bool(*flag),
        AttributeValue::Null(_) => Value::Null,
        AttributeValue::B(blob) => Value::String(STANDARD.encode(blob.as_ref())),
        AttributeValue::L(items) => Value::Array(items.iter().map(attribute_to_json).collect()),
        AttributeValue::M(map) => item_to_json(map),
        AttributeValue::Ss(texts) => Value::Array(texts.iter().cloned().map(Value::String).collect()),
        AttributeValue::Ns(numbers) => Value::Array(numbers.iter().map(|n| number_to_json(n)).collect()),
        AttributeValue::Bs(blobs) => Value::Array(
            blobs
                .iter()
                .map(|blob| Value::String(STANDARD.encode(blob.as_ref())))
                .collect(),
        ),
        // non-exhaustive: whatever DynamoDB invents next
        other => Value::String(format!("{other:?}")),
    }
}

/// 🔢 A JSON number only when it renders back to the exact same text.
/// DynamoDB carries up to 38 significant digits; anything an f64 would
/// bend stays a string.
fn number_to_json(number: &str) -> Value {
    match serde_json::from_str::<Number>(number) {
        Ok(parsed) if parsed.to_string() == number => Value::Number(parsed),
        _ => Value::String(number.to_string()),
    }
}

/// 🔄 JSON → AttributeValue, the way a document client would do it.
pub fn json_to_attribute(value: &Value) -> AttributeValue {
    match value {
        Value::Null => AttributeValue::Null(true),
        Value::Bool(flag) => AttributeValue::Bool(*flag),
        Value::Number(number) => AttributeValue::N(number.to_string()),
        Value::String(text) => AttributeValue::S(text.clone()),
        Value::Array(items) => AttributeValue::L(items.iter().map(json_to_attribute).collect()),
        Value::Object(map) => AttributeValue::M(
            map.iter()
                .map(|(name, value)| (name.clone(), json_to_attribute(value)))
                .collect(),
        ),
    }
}

/// ✏️ Applies one prepared update expression to items, one key at a time.
#[derive(Debug, Clone)]
pub struct ItemUpdater {
    client: Client,
    table: String,
    key_name: String,
    expression: UpdateExpression,
    retry: RetryPolicy,
}

impl ItemUpdater {
    pub fn new(
        client: Client,
        table: impl Into<String>,
        key_name: impl Into<String>,
        expression: UpdateExpression,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            client,
            table: table.into(),
            key_name: key_name.into(),
            expression,
            retry,
        }
    }

    /// 🎯 `UpdateItem` for the item whose hash key equals `key`.
    pub async fn update(&self, key: &Value) -> Result<(), RetryError> {
        let key = json_to_attribute(key);
        let names: HashMap<String, String> = self
            .expression
            .names
            .iter()
            .map(|(placeholder, path)| (placeholder.clone(), path.clone()))
            .collect();
        let values: HashMap<String, AttributeValue> = self
            .expression
            .values
            .iter()
            .map(|(placeholder, value)| (placeholder.clone(), json_to_attribute(value)))
            .collect();

        self.retry
            .run("UpdateItem", || {
                let request = self
                    .client
                    .update_item()
                    .table_name(&self.table)
                    .key(&self.key_name, key.clone())
                    .update_expression(&self.expression.expression)
                    .set_expression_attribute_names(Some(names.clone()))
                    .set_expression_attribute_values(Some(values.clone()));
                async move { request.send().await.map_err(remote_error) }
            })
            .await?;
        Ok(())
    }
}
