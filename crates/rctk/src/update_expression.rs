//! ✏️ Update expressions — turning `{"profile": {"tier": "gold"}}` into
//! `SET #a_0 = :v_0` and two little maps, without anybody hand-counting placeholders.
//!
//! Every field added to the builder yields exactly one name placeholder (`#a_i`),
//! one value placeholder (`:v_i`) and one clause (`#a_i = :v_i`). The clauses share a
//! single `SET`.

use std::collections::BTreeMap;

use anyhow::{Result, bail};
use serde_json::{Map, Value};

/// 🧾 A finished expression plus its placeholder maps.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateExpression {
    pub expression: String,
    /// `#a_i` → attribute path
    pub names: BTreeMap<String, String>,
    /// `:v_i` → value
    pub values: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateExpressionBuilder {
    fields: Vec<(String, Value)>,
}

impl UpdateExpressionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// ➕ One more `path = value`.
    pub fn add(mut self, path: impl Into<String>, value: Value) -> Self {
        self.fields.push((path.into(), value));
        self
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// 🏁 Placeholders are numbered in insertion order.
    pub fn build(self) -> Result<UpdateExpression> {
        if self.fields.is_empty() {
            bail!("💀 an update expression needs at least one field to set, the patch was empty");
        }
        let mut names = BTreeMap::new();
        let mut values = BTreeMap::new();
        let mut clauses = Vec::with_capacity(self.fields.len());
        for (index, (path, value)) in self.fields.into_iter().enumerate() {
            let name = format!("#a_{index}");
            let placeholder = format!(":v_{index}");
            clauses.push(format!("{name} = {placeholder}"));
            names.insert(name, path);
            values.insert(placeholder, value);
        }
        Ok(UpdateExpression {
            expression: format!("SET {}", clauses.join(", ")),
            names,
            values,
        })
    }
}

impl FromIterator<(String, Value)> for UpdateExpressionBuilder {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

/// 🥞 Flattens nested objects and arrays into dotted paths, leaves only.
///
/// `{"a": {"b": 1}, "c": [true]}` → `[("a.b", 1), ("c.0", true)]`. Empty objects and
/// arrays are kept as values. A non-object root has no paths and flattens to nothing.
pub fn flatten_patch(patch: &Value) -> Vec<(String, Value)> {
    let mut flat = Vec::new();
    if let Value::Object(map) = patch {
        flatten_object(map, "", &mut flat);
    }
    flat
}

fn flatten_object(map: &Map<String, Value>, prefix: &str, flat: &mut Vec<(String, Value)>) {
    for (key, value) in map {
        flatten_value(value, join(prefix, key), flat);
    }
}

fn flatten_value(value: &Value, path: String, flat: &mut Vec<(String, Value)>) {
    match value {
        Value::Object(map) if !map.is_empty() => flatten_object(map, &path, flat),
        Value::Array(items) if !items.is_empty() => {
            for (index, item) in items.iter().enumerate() {
                flatten_value(item, join(&path, &index.to_string()), flat);
            }
        }
        leaf => flat.push((path, leaf.clone())),
    }
}

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn the_one_where_two_fields_share_one_set() -> Result<()> {
        let expression = UpdateExpressionBuilder::new()
            .add("status", json!("archived"))
            .add("profile.tier", json!(3))
            .build()?;

        assert_eq!(expression.expression, "SET #a_0 = :v_0, #a_1 = :v_1");
        assert_eq!(expression.names["#a_0"], "status");
        assert_eq!(expression.names["#a_1"], "profile.tier");
        assert_eq!(expression.values[":v_1"], json!(3));
        Ok(())
    }

    #[test]
    fn the_one_where_every_field_gets_its_own_pair() -> Result<()> {
        let builder: UpdateExpressionBuilder =
            (0..12).map(|i| (format!("f{i}"), json!(i))).collect();
        let expression = builder.build()?;

        assert_eq!(expression.names.len(), 12);
        assert_eq!(expression.values.len(), 12);
        assert_eq!(expression.expression.matches(" = ").count(), 12);
        assert_eq!(expression.expression.matches("SET").count(), 1);
        assert_eq!(expression.names["#a_11"], "f11");
        Ok(())
    }

    #[test]
    fn the_one_where_nothing_to_set_is_an_error() {
        assert!(UpdateExpressionBuilder::new().build().is_err());
    }

    #[test]
    fn the_one_where_the_patch_is_pressed_flat() {
        let flat = flatten_patch(&json!({
            "a": { "b": 1, "c": { "d": "x" } },
            "list": [true, { "deep": null }],
            "empty": {},
            "top": 2
        }));

        let flat: BTreeMap<_, _> = flat.into_iter().collect();
        assert_eq!(flat["a.b"], json!(1));
        assert_eq!(flat["a.c.d"], json!("x"));
        assert_eq!(flat["list.0"], json!(true));
        assert_eq!(flat["list.1.deep"], Value::Null);
        assert_eq!(flat["empty"], json!({}));
        assert_eq!(flat["top"], json!(2));
        assert_eq!(flat.len(), 6);
    }

    #[test]
    fn the_one_where_a_bare_scalar_has_no_paths() {
        assert!(flatten_patch(&json!(42)).is_empty());
    }
}
