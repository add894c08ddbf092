// Inline data tables for Vega-Lite specs

use anyhow::{anyhow, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::{Map, Value};
use std::cmp::Ordering;

pub type Row = Map<String, Value>;

/// Rows of a `data.values` array.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataTable {
    rows: Vec<Row>,
}

impl DataTable {
    pub fn new(rows: Vec<Row>) -> Self {
        Self { rows }
    }

    /// Build a table from a JSON array. Primitive items are wrapped as `{"data": item}`.
    pub fn from_json(value: &Value) -> Result<Self> {
        let array = value
            .as_array()
            .ok_or_else(|| anyhow!("data.values must be a JSON array"))?;

        let rows = array
            .iter()
            .map(|item| match item {
                Value::Object(obj) => obj.clone(),
                other => {
                    let mut row = Map::new();
                    row.insert("data".to_string(), other.clone());
                    row
                }
            })
            .collect();

        Ok(Self { rows })
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn filter(&self, mut keep: impl FnMut(&Row) -> bool) -> Self {
        Self {
            rows: self.rows.iter().filter(|r| keep(r)).cloned().collect(),
        }
    }

    /// Distinct values of `field` as text, ordered for display: numbers numerically,
    /// dates chronologically when `temporal`, everything else lexically.
    pub fn distinct(&self, field: &str, temporal: bool) -> Vec<String> {
        let mut values: Vec<String> = Vec::new();
        for row in &self.rows {
            if let Some(text) = text(row, field) {
                if !values.contains(&text) {
                    values.push(text);
                }
            }
        }
        values.sort_by(|a, b| compare_text(a, b, temporal));
        values
    }
}

/// Look up `field` in a row, following dotted paths into nested objects.
pub fn lookup<'a>(row: &'a Row, field: &str) -> Option<&'a Value> {
    if let Some(v) = row.get(field) {
        return Some(v);
    }
    let mut parts = field.split('.');
    let mut current = row.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

/// Numeric value of a field. Numeric strings count; null and missing do not.
pub fn number(row: &Row, field: &str) -> Option<f64> {
    match lookup(row, field)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// Text form of a field, as used for category keys.
pub fn text(row: &Row, field: &str) -> Option<String> {
    match lookup(row, field)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

/// Milliseconds since the epoch for common date and date-time spellings.
pub fn parse_timestamp(s: &str) -> Option<i64> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp_millis());
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Some(dt.and_utc().timestamp_millis());
        }
    }
    for format in ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%b %d %Y", "%d %b %Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(s, format) {
            return date
                .and_hms_opt(0, 0, 0)
                .map(|dt| dt.and_utc().timestamp_millis());
        }
    }
    None
}

pub(crate) fn compare_text(a: &str, b: &str, temporal: bool) -> Ordering {
    if temporal {
        if let (Some(x), Some(y)) = (parse_timestamp(a), parse_timestamp(b)) {
            return x.cmp(&y);
        }
    }
    match (a.parse::<f64>(), b.parse::<f64>()) {
        (Ok(x), Ok(y)) => x.total_cmp(&y),
        _ => a.cmp(b),
    }
}
