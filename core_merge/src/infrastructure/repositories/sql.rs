// /////////////////////////////////////////////////////////////////////////////
// Core Merge RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # SQL Value Bridging
//!
//! Helpers shared by the PostgreSQL repositories: binding dynamic
//! `FieldValue`s as typed parameters, decoding result columns back through
//! the declared `FieldKind`, and classifying sqlx errors into the domain
//! taxonomy. Identifiers (tables, columns) always come from static handler
//! data, never from row content.

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::{Postgres, Row};

use core_merge_domain::value_objects::{FieldKind, FieldValue};
use core_merge_domain::MergeError;

/// Binds one field value as a typed, nullable parameter.
///
/// The caller's handler declared `kind` for this column; values reaching
/// here were coerced during row conversion, so a mismatch is an internal
/// error rather than a row error.
pub fn bind_value<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: &FieldValue,
    kind: FieldKind,
) -> Result<Query<'q, Postgres, PgArguments>, MergeError> {
    let query = match kind {
        FieldKind::Boolean => match value {
            FieldValue::Null => query.bind(None::<bool>),
            FieldValue::Boolean(b) => query.bind(Some(*b)),
            other => return Err(mismatch(other, kind)),
        },
        FieldKind::Integer => match value {
            FieldValue::Null => query.bind(None::<i64>),
            FieldValue::Integer(i) => query.bind(Some(*i)),
            other => return Err(mismatch(other, kind)),
        },
        FieldKind::Float => match value {
            FieldValue::Null => query.bind(None::<f64>),
            FieldValue::Float(f) => query.bind(Some(*f)),
            FieldValue::Integer(i) => query.bind(Some(*i as f64)),
            other => return Err(mismatch(other, kind)),
        },
        FieldKind::Text => match value {
            FieldValue::Null => query.bind(None::<String>),
            FieldValue::Text(s) => query.bind(Some(s.clone())),
            other => return Err(mismatch(other, kind)),
        },
        FieldKind::Timestamp => match value {
            FieldValue::Null => query.bind(None::<DateTime<Utc>>),
            FieldValue::Timestamp(ts) => query.bind(Some(*ts)),
            other => return Err(mismatch(other, kind)),
        },
        FieldKind::Json => match value {
            FieldValue::Null => query.bind(None::<serde_json::Value>),
            other => query.bind(Some(other.to_json())),
        },
    };
    Ok(query)
}

fn mismatch(value: &FieldValue, kind: FieldKind) -> MergeError {
    MergeError::internal_error(format!("cannot bind {:?} as {:?}", value, kind))
}

/// Decodes one nullable column back into a field value.
pub fn decode_column(row: &PgRow, column: &str, kind: FieldKind) -> Result<FieldValue, MergeError> {
    let value = match kind {
        FieldKind::Boolean => row
            .try_get::<Option<bool>, _>(column)
            .map(|v| v.map(FieldValue::Boolean)),
        FieldKind::Integer => row
            .try_get::<Option<i64>, _>(column)
            .map(|v| v.map(FieldValue::Integer)),
        FieldKind::Float => row
            .try_get::<Option<f64>, _>(column)
            .map(|v| v.map(FieldValue::Float)),
        FieldKind::Text => row
            .try_get::<Option<String>, _>(column)
            .map(|v| v.map(FieldValue::Text)),
        FieldKind::Timestamp => row
            .try_get::<Option<DateTime<Utc>>, _>(column)
            .map(|v| v.map(FieldValue::Timestamp)),
        FieldKind::Json => row
            .try_get::<Option<serde_json::Value>, _>(column)
            .map(|v| v.map(|j| FieldValue::from_json(&j))),
    };
    value
        .map(|v| v.unwrap_or(FieldValue::Null))
        .map_err(|e| MergeError::database_error(format!("failed to decode column '{}': {}", column, e)))
}

/// Maps a sqlx error into the domain taxonomy.
///
/// Unique and foreign-key violations become `ConstraintViolation`; the rest
/// stay `DatabaseError` so the retry policy can treat them as recoverable.
pub fn classify_sqlx_error(err: sqlx::Error) -> MergeError {
    match &err {
        sqlx::Error::Database(db) if db.constraint().is_some() => {
            MergeError::ConstraintViolation(db.to_string())
        }
        _ => MergeError::database_error(err.to_string()),
    }
}

/// Renders `$1, $2, ...` for a parameter count.
pub fn placeholders(count: usize) -> String {
    (1..=count)
        .map(|i| format!("${}", i))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_render_in_order() {
        assert_eq!(placeholders(3), "$1, $2, $3");
        assert_eq!(placeholders(1), "$1");
        assert_eq!(placeholders(0), "");
    }
}
