use std::sync::Arc;

use async_trait::async_trait;
use bb8::PooledConnection;
use chrono::NaiveDateTime;
use serde_json::Value;
use tokio_postgres::Client;

use super::QueryHandle;
use super::params::as_pg_params;
use super::pool::PgPoolManager;
use crate::error::PgSteadyError;
use crate::results::ResultSet;
use crate::types::RowValues;

async fn run_on(client: &Client, sql: &str, params: &[RowValues]) -> Result<ResultSet, PgSteadyError> {
    let converted = as_pg_params(params);
    let rows = client.query(sql, &converted).await?;
    build_result_set(&rows)
}

async fn batch_on(client: &Client, sql: &str) -> Result<(), PgSteadyError> {
    // Simple-query protocol; required for LISTEN/UNLISTEN and fine for
    // transaction control statements.
    client.batch_execute(sql).await?;
    Ok(())
}

/// Handle shape for the owned session: the same client shared by every
/// caller.
#[async_trait]
impl QueryHandle for Arc<Client> {
    async fn run(&self, sql: &str, params: &[RowValues]) -> Result<ResultSet, PgSteadyError> {
        run_on(self, sql, params).await
    }

    async fn run_batch(&self, sql: &str) -> Result<(), PgSteadyError> {
        batch_on(self, sql).await
    }
}

/// Handle shape for the pool: a checkout that returns on drop.
#[async_trait]
impl QueryHandle for PooledConnection<'static, PgPoolManager> {
    async fn run(&self, sql: &str, params: &[RowValues]) -> Result<ResultSet, PgSteadyError> {
        run_on(self, sql, params).await
    }

    async fn run_batch(&self, sql: &str) -> Result<(), PgSteadyError> {
        batch_on(self, sql).await
    }
}

/// Build a [`ResultSet`] from driver rows.
///
/// # Errors
/// Returns errors from value extraction.
pub fn build_result_set(rows: &[tokio_postgres::Row]) -> Result<ResultSet, PgSteadyError> {
    let Some(first) = rows.first() else {
        return Ok(ResultSet::default());
    };

    let column_names: Vec<String> = first
        .columns()
        .iter()
        .map(|col| col.name().to_string())
        .collect();

    let mut result_set = ResultSet::with_capacity(rows.len());
    result_set.set_column_names(Arc::new(column_names));

    for row in rows {
        let mut values = Vec::with_capacity(row.len());
        for idx in 0..row.len() {
            values.push(extract_value(row, idx)?);
        }
        result_set.add_row_values(values);
    }

    Ok(result_set)
}

/// Extract a `RowValues` from a driver row at the given index, matching on
/// the column's PostgreSQL type name.
fn extract_value(row: &tokio_postgres::Row, idx: usize) -> Result<RowValues, PgSteadyError> {
    let type_name = row.columns()[idx].type_().name();

    match type_name {
        "int2" => {
            let val: Option<i16> = row.try_get(idx)?;
            Ok(val.map_or(RowValues::Null, |v| RowValues::Int(i64::from(v))))
        }
        "int4" => {
            let val: Option<i32> = row.try_get(idx)?;
            Ok(val.map_or(RowValues::Null, |v| RowValues::Int(i64::from(v))))
        }
        "int8" => {
            let val: Option<i64> = row.try_get(idx)?;
            Ok(val.map_or(RowValues::Null, RowValues::Int))
        }
        "float4" | "float8" => {
            let val: Option<f64> = row.try_get(idx)?;
            Ok(val.map_or(RowValues::Null, RowValues::Float))
        }
        "bool" => {
            let val: Option<bool> = row.try_get(idx)?;
            Ok(val.map_or(RowValues::Null, RowValues::Bool))
        }
        "timestamp" | "timestamptz" => {
            let val: Option<NaiveDateTime> = row.try_get(idx)?;
            Ok(val.map_or(RowValues::Null, RowValues::Timestamp))
        }
        "json" | "jsonb" => {
            let val: Option<Value> = row.try_get(idx)?;
            Ok(val.map_or(RowValues::Null, RowValues::JSON))
        }
        "bytea" => {
            let val: Option<Vec<u8>> = row.try_get(idx)?;
            Ok(val.map_or(RowValues::Null, RowValues::Blob))
        }
        _ => {
            // text, varchar, char, and anything else representable as text
            let val: Option<String> = row.try_get(idx)?;
            Ok(val.map_or(RowValues::Null, RowValues::Text))
        }
    }
}
