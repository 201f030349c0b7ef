// /////////////////////////////////////////////////////////////////////////////
// Core Merge RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # PostgreSQL Dimension Repository
//!
//! SCD2 writes against `core.<dim>` tables. Column names derive from the
//! handler's target fields through the shared snake_case conversion, so
//! INSERT, UPDATE, and SELECT round-trip the same identifiers. Surrogate
//! keys come from each table's sequence via `RETURNING`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use core_merge_domain::entities::DimensionVersion;
use core_merge_domain::handlers::DimensionHandler;
use core_merge_domain::repositories::DimensionRepository;
use core_merge_domain::services::field_case::to_snake_case;
use core_merge_domain::value_objects::{
    BusinessKey, FieldKind, FieldValue, Lineage, SurrogateKey,
};
use core_merge_domain::MergeError;

use super::session::PgSession;
use super::sql::{bind_value, decode_column};

/// Dimension adapter over one warehouse pool.
pub struct PgDimensionRepository {
    session: PgSession,
}

impl PgDimensionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self {
            session: PgSession::new(pool),
        }
    }

    /// Columns selected when reading a full version row.
    fn select_list(handler: &DimensionHandler) -> String {
        let mut columns = vec![handler.surrogate_key_column.to_string()];
        columns.extend(
            handler
                .field_mappings
                .iter()
                .map(|m| to_snake_case(m.target_field)),
        );
        columns.extend(
            ["effective_from", "effective_to", "is_current", "load_run_id", "load_ts"]
                .iter()
                .map(|c| c.to_string()),
        );
        columns.join(", ")
    }

    fn key_predicate(handler: &DimensionHandler, first_param: usize) -> Result<String, MergeError> {
        let columns = handler.business_key_columns()?;
        Ok(columns
            .iter()
            .enumerate()
            .map(|(i, column)| format!("{} = ${}", column, first_param + i))
            .collect::<Vec<_>>()
            .join(" AND "))
    }

    fn row_to_version(
        handler: &DimensionHandler,
        row: &sqlx::postgres::PgRow,
    ) -> Result<DimensionVersion, MergeError> {
        let mut attributes = BTreeMap::new();
        for mapping in &handler.field_mappings {
            let column = to_snake_case(mapping.target_field);
            let value = decode_column(row, &column, mapping.kind)?;
            attributes.insert(mapping.target_field.to_string(), value);
        }

        let mut key_parts = Vec::new();
        for source in handler.business_key_fields {
            let mapping = handler.mapping_for_source(source).ok_or_else(|| {
                MergeError::invalid_config(format!(
                    "dimension {} business key field '{}' has no mapping",
                    handler.dimension, source
                ))
            })?;
            let value = attributes
                .get(mapping.target_field)
                .cloned()
                .unwrap_or(FieldValue::Null);
            key_parts.push(((*source).to_string(), value));
        }
        let business_key = BusinessKey::new(key_parts)?;

        let surrogate = decode_column(row, handler.surrogate_key_column, FieldKind::Integer)?;
        let FieldValue::Integer(surrogate) = surrogate else {
            return Err(MergeError::database_error(format!(
                "dimension {} row is missing its surrogate key",
                handler.dimension
            )));
        };

        let effective_from = decode_column(row, "effective_from", FieldKind::Timestamp)?
            .as_timestamp()
            .ok_or_else(|| MergeError::database_error("effective_from is null".to_string()))?;
        let effective_to = decode_column(row, "effective_to", FieldKind::Timestamp)?.as_timestamp();
        let is_current = matches!(
            decode_column(row, "is_current", FieldKind::Boolean)?,
            FieldValue::Boolean(true)
        );

        let load_run_id: uuid::Uuid = sqlx::Row::try_get(row, "load_run_id")
            .map_err(|e| MergeError::database_error(format!("failed to decode load_run_id: {}", e)))?;
        let load_ts = decode_column(row, "load_ts", FieldKind::Timestamp)?
            .as_timestamp()
            .ok_or_else(|| MergeError::database_error("load_ts is null".to_string()))?;

        DimensionVersion::from_store(
            SurrogateKey::new(surrogate)?,
            business_key,
            attributes,
            effective_from,
            effective_to,
            is_current,
            Lineage::new(load_run_id, load_ts),
        )
    }
}

#[async_trait]
impl DimensionRepository for PgDimensionRepository {
    async fn begin(&self) -> Result<(), MergeError> {
        self.session.begin().await
    }

    async fn commit(&self) -> Result<(), MergeError> {
        self.session.commit().await
    }

    async fn rollback(&self) -> Result<(), MergeError> {
        self.session.rollback().await
    }

    async fn find_current(
        &self,
        handler: &DimensionHandler,
        key: &BusinessKey,
    ) -> Result<Option<DimensionVersion>, MergeError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE is_current = TRUE AND {}",
            Self::select_list(handler),
            handler.target_table,
            Self::key_predicate(handler, 1)?,
        );

        let mut query = sqlx::query(&sql);
        for (source, value) in key.parts() {
            let kind = handler
                .mapping_for_source(source)
                .map(|m| m.kind)
                .unwrap_or(FieldKind::Text);
            query = bind_value(query, value, kind)?;
        }

        let rows = self.session.fetch_all(query).await?;
        match rows.len() {
            0 => Ok(None),
            1 => Ok(Some(Self::row_to_version(handler, &rows[0])?)),
            n => Err(MergeError::scd2_violation(format!(
                "dimension {} has {} current versions for business key {}",
                handler.dimension, n, key
            ))),
        }
    }

    async fn insert_version(
        &self,
        handler: &DimensionHandler,
        version: &DimensionVersion,
    ) -> Result<SurrogateKey, MergeError> {
        let mut columns = Vec::new();
        let mut kinds = Vec::new();
        for mapping in &handler.field_mappings {
            columns.push(to_snake_case(mapping.target_field));
            kinds.push((mapping.target_field, mapping.kind));
        }
        columns.extend(
            ["effective_from", "effective_to", "is_current", "load_run_id", "load_ts"]
                .iter()
                .map(|c| c.to_string()),
        );

        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
            handler.target_table,
            columns.join(", "),
            super::sql::placeholders(columns.len()),
            handler.surrogate_key_column,
        );

        let mut query = sqlx::query(&sql);
        for (target_field, kind) in kinds {
            query = bind_value(query, version.attribute(target_field), kind)?;
        }
        query = query
            .bind(version.effective_from())
            .bind(version.effective_to())
            .bind(version.is_current())
            .bind(version.lineage().load_run_id)
            .bind(version.lineage().load_ts);

        let row = self.session.fetch_one(query).await?;
        let assigned: i64 = sqlx::Row::try_get(&row, 0)
            .map_err(|e| MergeError::database_error(format!("insert returned no key: {}", e)))?;
        SurrogateKey::new(assigned)
    }

    async fn expire_version(
        &self,
        handler: &DimensionHandler,
        surrogate_key: SurrogateKey,
        effective_to: DateTime<Utc>,
    ) -> Result<(), MergeError> {
        let sql = format!(
            "UPDATE {} SET effective_to = $1, is_current = FALSE WHERE {} = $2",
            handler.target_table, handler.surrogate_key_column,
        );
        let affected = self
            .session
            .execute(sqlx::query(&sql).bind(effective_to).bind(surrogate_key.value()))
            .await?;
        if affected == 0 {
            return Err(MergeError::database_error(format!(
                "dimension {} version {} vanished before expiry",
                handler.dimension, surrogate_key
            )));
        }
        Ok(())
    }

    async fn update_in_place(
        &self,
        handler: &DimensionHandler,
        surrogate_key: SurrogateKey,
        changes: &BTreeMap<String, FieldValue>,
        lineage: &Lineage,
    ) -> Result<(), MergeError> {
        let mut assignments = Vec::new();
        let mut binds = Vec::new();
        let mut param = 1usize;
        for (field, value) in changes {
            let Some(mapping) = handler.mapping_for_target(field) else {
                // Diffs on unmapped fields have no column to update
                continue;
            };
            assignments.push(format!("{} = ${}", to_snake_case(field), param));
            binds.push((value.clone(), mapping.kind));
            param += 1;
        }
        assignments.push(format!("load_run_id = ${}", param));
        assignments.push(format!("load_ts = ${}", param + 1));
        let key_param = param + 2;

        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ${}",
            handler.target_table,
            assignments.join(", "),
            handler.surrogate_key_column,
            key_param,
        );

        let mut query = sqlx::query(&sql);
        for (value, kind) in &binds {
            query = bind_value(query, value, *kind)?;
        }
        query = query
            .bind(lineage.load_run_id)
            .bind(lineage.load_ts)
            .bind(surrogate_key.value());

        let affected = self.session.execute(query).await?;
        if affected == 0 {
            return Err(MergeError::database_error(format!(
                "dimension {} version {} vanished before in-place update",
                handler.dimension, surrogate_key
            )));
        }
        Ok(())
    }

    async fn current_keys(
        &self,
        handler: &DimensionHandler,
        limit: Option<u64>,
    ) -> Result<Vec<(BusinessKey, SurrogateKey)>, MergeError> {
        let key_columns = handler.business_key_columns()?;
        let mut sql = format!(
            "SELECT {}, {} FROM {} WHERE is_current = TRUE ORDER BY {}",
            handler.surrogate_key_column,
            key_columns.join(", "),
            handler.target_table,
            handler.surrogate_key_column,
        );
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        let rows = self.session.fetch_all(sqlx::query(&sql)).await?;
        let mut keys = Vec::with_capacity(rows.len());
        for row in &rows {
            let surrogate: i64 = sqlx::Row::try_get(row, handler.surrogate_key_column)
                .map_err(|e| MergeError::database_error(format!("failed to decode surrogate key: {}", e)))?;
            let mut parts = Vec::new();
            for (source, column) in handler.business_key_fields.iter().zip(&key_columns) {
                let kind = handler
                    .mapping_for_source(source)
                    .map(|m| m.kind)
                    .unwrap_or(FieldKind::Text);
                parts.push(((*source).to_string(), decode_column(row, column, kind)?));
            }
            keys.push((BusinessKey::new(parts)?, SurrogateKey::new(surrogate)?));
        }
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_merge_domain::handlers::{DimensionHandlerRegistry, DimensionType};

    #[test]
    fn select_list_round_trips_target_casing() {
        let registry = DimensionHandlerRegistry::standard();
        let patient = registry.handler(DimensionType::Patient).unwrap();
        let list = PgDimensionRepository::select_list(patient);
        assert!(list.starts_with("patient_key, "));
        assert!(list.contains("family_name"));
        assert!(list.contains("per_org_id"));
        assert!(list.ends_with("load_ts"));
    }

    #[test]
    fn key_predicate_numbers_parameters_in_key_order() {
        let registry = DimensionHandlerRegistry::standard();
        let patient = registry.handler(DimensionType::Patient).unwrap();
        let predicate = PgDimensionRepository::key_predicate(patient, 1).unwrap();
        assert_eq!(
            predicate,
            "patient_id = $1 AND practice_id = $2 AND per_org_id = $3"
        );
    }
}
