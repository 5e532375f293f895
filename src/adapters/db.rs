use crate::config::DatabaseConfig;
use crate::core::{InsertPlan, Record, RowWriter};
use crate::utils::error::InsertError;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use std::time::Duration;

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// Postgres-backed writer. The pool connects on first use.
#[derive(Debug, Clone)]
pub struct PgRowWriter {
    pool: PgPool,
}

impl PgRowWriter {
    pub fn connect_lazy(config: &DatabaseConfig) -> Self {
        let options = PgConnectOptions::new()
            .host(&config.server)
            .port(config.port)
            .database(&config.database)
            .username(&config.username)
            .password(&config.password)
            .application_name("daily-etl");

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect_lazy_with(options);

        Self { pool }
    }
}

/// JSON array of row objects restricted to, and ordered by, the plan's columns.
pub fn rows_payload(plan: &InsertPlan, records: &[Record]) -> Value {
    Value::Array(
        records
            .iter()
            .map(|record| {
                let row: serde_json::Map<String, Value> = plan
                    .columns
                    .iter()
                    .map(|column| {
                        let value = record.get(column).cloned().unwrap_or(Value::Null);
                        (column.clone(), value)
                    })
                    .collect();
                Value::Object(row)
            })
            .collect(),
    )
}

#[async_trait]
impl RowWriter for PgRowWriter {
    async fn write(&self, plan: &InsertPlan, records: &[Record]) -> Result<u64, InsertError> {
        let payload = rows_payload(plan, records);

        let result = sqlx::query(&plan.statement)
            .bind(sqlx::types::Json(payload))
            .execute(&self.pool)
            .await
            .map_err(|source| InsertError::Database {
                table: plan.table.clone(),
                source,
            })?;

        Ok(result.rows_affected())
    }
}
