// /////////////////////////////////////////////////////////////////////////////
// Core Merge RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Field Value
//!
//! `FieldValue` is the sum type over the primitive kinds a staging or core
//! column may carry. The staging surface is heterogeneous (many columns per
//! entity, typed upstream), so the merge core moves values around as this
//! dynamic type and lets each handler declare the kind it expects per
//! mapped field.
//!
//! ## Value Kinds
//!
//! - **Null**: absent and SQL NULL are the same token
//! - **Boolean**, **Integer**, **Float**, **Text**: scalar kinds
//! - **Timestamp**: UTC instants, compared at millisecond precision
//! - **Array** / **Object**: nested structures, normalised recursively
//!
//! ## Kind Declarations
//!
//! Handlers declare a [`FieldKind`] per field mapping. Repositories use the
//! declared kind to bind typed SQL parameters and decode result columns;
//! [`FieldValue::coerce_to`] bridges a staged value into the declared kind
//! and fails with a transformation error when the value cannot represent it.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::MergeError;

/// A dynamically typed field value flowing from staging into the core model.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
    Array(Vec<FieldValue>),
    Object(BTreeMap<String, FieldValue>),
}

/// The primitive kind a handler declares for a mapped field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Boolean,
    Integer,
    Float,
    Text,
    Timestamp,
    Json,
}

impl FieldValue {
    /// Returns true when the value is the null token.
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Borrows the text payload when the value is text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Reads the value as a float when it is numeric.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Integer(i) => Some(*i as f64),
            FieldValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Reads the value as a timestamp when it is one.
    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            FieldValue::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }

    /// Converts the value into plain JSON.
    ///
    /// Timestamps render as ISO-8601 UTC with millisecond precision, the
    /// same form the fingerprint serialisation uses. Non-finite floats
    /// render as null.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            FieldValue::Null => serde_json::Value::Null,
            FieldValue::Boolean(b) => serde_json::Value::Bool(*b),
            FieldValue::Integer(i) => serde_json::Value::from(*i),
            FieldValue::Float(f) => {
                if f.is_finite() {
                    serde_json::Number::from_f64(*f)
                        .map(serde_json::Value::Number)
                        .unwrap_or(serde_json::Value::Null)
                } else {
                    serde_json::Value::Null
                }
            }
            FieldValue::Text(s) => serde_json::Value::String(s.clone()),
            FieldValue::Timestamp(ts) => {
                serde_json::Value::String(ts.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
            FieldValue::Array(items) => {
                serde_json::Value::Array(items.iter().map(FieldValue::to_json).collect())
            }
            FieldValue::Object(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }

    /// Builds a value from plain JSON.
    ///
    /// JSON strings stay text; timestamp recognition only happens through a
    /// declared [`FieldKind::Timestamp`] coercion.
    pub fn from_json(value: &serde_json::Value) -> FieldValue {
        match value {
            serde_json::Value::Null => FieldValue::Null,
            serde_json::Value::Bool(b) => FieldValue::Boolean(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    FieldValue::Integer(i)
                } else {
                    FieldValue::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => FieldValue::Text(s.clone()),
            serde_json::Value::Array(items) => {
                FieldValue::Array(items.iter().map(FieldValue::from_json).collect())
            }
            serde_json::Value::Object(map) => FieldValue::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), FieldValue::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Coerces the value into the declared kind.
    ///
    /// Null coerces into any kind. Integers widen into floats, text parses
    /// into timestamps and numbers. Anything else is a transformation error
    /// recorded against the staging row.
    pub fn coerce_to(&self, kind: FieldKind) -> Result<FieldValue, MergeError> {
        if self.is_null() {
            return Ok(FieldValue::Null);
        }
        match (kind, self) {
            (FieldKind::Boolean, FieldValue::Boolean(_)) => Ok(self.clone()),
            (FieldKind::Integer, FieldValue::Integer(_)) => Ok(self.clone()),
            (FieldKind::Integer, FieldValue::Text(s)) => s
                .trim()
                .parse::<i64>()
                .map(FieldValue::Integer)
                .map_err(|e| MergeError::transformation_error(format!("'{}' is not an integer: {}", s, e))),
            (FieldKind::Float, FieldValue::Float(_)) => Ok(self.clone()),
            (FieldKind::Float, FieldValue::Integer(i)) => Ok(FieldValue::Float(*i as f64)),
            (FieldKind::Float, FieldValue::Text(s)) => s
                .trim()
                .parse::<f64>()
                .map(FieldValue::Float)
                .map_err(|e| MergeError::transformation_error(format!("'{}' is not a number: {}", s, e))),
            (FieldKind::Text, FieldValue::Text(_)) => Ok(self.clone()),
            (FieldKind::Text, FieldValue::Integer(i)) => Ok(FieldValue::Text(i.to_string())),
            (FieldKind::Text, FieldValue::Boolean(b)) => Ok(FieldValue::Text(b.to_string())),
            (FieldKind::Timestamp, FieldValue::Timestamp(_)) => Ok(self.clone()),
            (FieldKind::Timestamp, FieldValue::Text(s)) => parse_timestamp(s.trim())
                .map(FieldValue::Timestamp)
                .ok_or_else(|| MergeError::transformation_error(format!("'{}' is not a timestamp", s))),
            (FieldKind::Json, FieldValue::Array(_)) | (FieldKind::Json, FieldValue::Object(_)) => Ok(self.clone()),
            (FieldKind::Json, _) => Ok(self.clone()),
            (kind, value) => Err(MergeError::transformation_error(format!(
                "cannot coerce {:?} into {:?}",
                value, kind
            ))),
        }
    }
}

/// Parses RFC 3339 timestamps and bare dates into UTC instants.
fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }
    // Date-only extracts come through as YYYY-MM-DD
    if let Ok(date) = chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(DateTime::from_naive_utc_and_offset(
            date.and_hms_opt(0, 0, 0)?,
            Utc,
        ));
    }
    None
}
