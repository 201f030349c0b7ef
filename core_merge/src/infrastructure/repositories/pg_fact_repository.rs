// /////////////////////////////////////////////////////////////////////////////
// Core Merge RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # PostgreSQL Fact Repository
//!
//! Upsert-style writes against `core.fact_*` tables: probe by business key,
//! insert with the resolved FK columns captured at load time, or update all
//! non-business-key columns. Duplicate business keys surface as constraint
//! violations for the loader's batch policy.

use async_trait::async_trait;
use sqlx::PgPool;

use core_merge_domain::entities::FactRecord;
use core_merge_domain::handlers::FactHandler;
use core_merge_domain::repositories::FactRepository;
use core_merge_domain::services::field_case::to_snake_case;
use core_merge_domain::value_objects::{BusinessKey, FieldKind};
use core_merge_domain::MergeError;

use super::session::PgSession;
use super::sql::{bind_value, placeholders};

/// Fact adapter over one warehouse pool.
pub struct PgFactRepository {
    session: PgSession,
}

impl PgFactRepository {
    pub fn new(pool: PgPool) -> Self {
        Self {
            session: PgSession::new(pool),
        }
    }

    fn key_predicate(handler: &FactHandler, first_param: usize) -> Result<String, MergeError> {
        let columns = handler.business_key_columns()?;
        Ok(columns
            .iter()
            .enumerate()
            .map(|(i, column)| format!("{} = ${}", column, first_param + i))
            .collect::<Vec<_>>()
            .join(" AND "))
    }

    fn bind_key<'q>(
        handler: &FactHandler,
        mut query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
        key: &BusinessKey,
    ) -> Result<sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>, MergeError> {
        for (source, value) in key.parts() {
            let kind = handler
                .mapping_for_source(source)
                .map(|m| m.kind)
                .unwrap_or(FieldKind::Text);
            query = bind_value(query, value, kind)?;
        }
        Ok(query)
    }
}

#[async_trait]
impl FactRepository for PgFactRepository {
    async fn begin(&self) -> Result<(), MergeError> {
        self.session.begin().await
    }

    async fn commit(&self) -> Result<(), MergeError> {
        self.session.commit().await
    }

    async fn rollback(&self) -> Result<(), MergeError> {
        self.session.rollback().await
    }

    async fn exists(&self, handler: &FactHandler, key: &BusinessKey) -> Result<bool, MergeError> {
        let sql = format!(
            "SELECT 1 FROM {} WHERE {} LIMIT 1",
            handler.target_table,
            Self::key_predicate(handler, 1)?,
        );
        let query = Self::bind_key(handler, sqlx::query(&sql), key)?;
        Ok(self.session.fetch_optional(query).await?.is_some())
    }

    async fn insert(&self, handler: &FactHandler, fact: &FactRecord) -> Result<(), MergeError> {
        let mut columns = Vec::new();
        let mut mapped = Vec::new();
        for mapping in &handler.field_mappings {
            columns.push(to_snake_case(mapping.target_field));
            mapped.push((mapping.target_field, mapping.kind));
        }
        let fk_columns: Vec<&'static str> =
            handler.foreign_keys.iter().map(|fk| fk.fact_column).collect();
        columns.extend(fk_columns.iter().map(|c| c.to_string()));
        columns.push("load_run_id".to_string());
        columns.push("load_ts".to_string());

        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            handler.target_table,
            columns.join(", "),
            placeholders(columns.len()),
        );

        let mut query = sqlx::query(&sql);
        for (target_field, kind) in mapped {
            let value = fact
                .attributes()
                .get(target_field)
                .cloned()
                .unwrap_or(core_merge_domain::value_objects::FieldValue::Null);
            query = bind_value(query, &value, kind)?;
        }
        for column in &fk_columns {
            query = query.bind(fact.dimension_key(column).map(|k| k.value()));
        }
        query = query.bind(fact.lineage().load_run_id).bind(fact.lineage().load_ts);

        self.session.execute(query).await?;
        Ok(())
    }

    async fn update(&self, handler: &FactHandler, fact: &FactRecord) -> Result<u64, MergeError> {
        let key_columns = handler.business_key_columns()?;
        let mut assignments = Vec::new();
        let mut mapped = Vec::new();
        let mut param = 1usize;
        for mapping in &handler.field_mappings {
            let column = to_snake_case(mapping.target_field);
            if key_columns.contains(&column) {
                continue;
            }
            assignments.push(format!("{} = ${}", column, param));
            mapped.push((mapping.target_field, mapping.kind));
            param += 1;
        }
        let fk_columns: Vec<&'static str> =
            handler.foreign_keys.iter().map(|fk| fk.fact_column).collect();
        for column in &fk_columns {
            assignments.push(format!("{} = ${}", column, param));
            param += 1;
        }
        assignments.push(format!("load_run_id = ${}", param));
        assignments.push(format!("load_ts = ${}", param + 1));
        let key_start = param + 2;

        let sql = format!(
            "UPDATE {} SET {} WHERE {}",
            handler.target_table,
            assignments.join(", "),
            Self::key_predicate(handler, key_start)?,
        );

        let mut query = sqlx::query(&sql);
        for (target_field, kind) in mapped {
            let value = fact
                .attributes()
                .get(target_field)
                .cloned()
                .unwrap_or(core_merge_domain::value_objects::FieldValue::Null);
            query = bind_value(query, &value, kind)?;
        }
        for column in &fk_columns {
            query = query.bind(fact.dimension_key(column).map(|k| k.value()));
        }
        query = query.bind(fact.lineage().load_run_id).bind(fact.lineage().load_ts);
        query = Self::bind_key(handler, query, fact.business_key())?;

        self.session.execute(query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_merge_domain::handlers::{FactHandlerRegistry, FactType};

    #[test]
    fn key_predicate_covers_the_whole_business_key() {
        let registry = FactHandlerRegistry::standard();
        let appointment = registry.handler(FactType::Appointment).unwrap();
        let predicate = PgFactRepository::key_predicate(appointment, 4).unwrap();
        assert_eq!(
            predicate,
            "appointment_id = $4 AND practice_id = $5 AND per_org_id = $6"
        );
    }
}
