use crate::connection::config::ConnectionConfig;
use crate::core::{DbError, Result, Row, Value};
use crate::interface::Connection;
use crate::result::QueryResult;
use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::{Client, NoTls, SimpleQueryMessage};
use tracing::{debug, warn};

/// A PostgreSQL session owned by the caller.
///
/// The background connection task is aborted when this value is dropped.
pub struct PgConnection {
    client: Client,
    driver: JoinHandle<()>,
}

impl PgConnection {
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        config.validate().map_err(DbError::Connection)?;

        debug!(url = %config.to_url(), "connecting");
        let (client, connection) = config
            .to_pg_config()
            .connect(NoTls)
            .await
            .map_err(DbError::from)?;

        let driver = tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!(error = %e, "postgres connection closed with error");
            }
        });

        Ok(Self { client, driver })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

impl Drop for PgConnection {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

#[async_trait]
impl Connection for PgConnection {
    async fn query(&self, sql: &str, params: &[&str]) -> Result<QueryResult> {
        Connection::query(&self.client, sql, params).await
    }

    async fn execute(&self, script: &str) -> Result<QueryResult> {
        Connection::execute(&self.client, script).await
    }

    async fn ping(&self) -> Result<()> {
        Connection::ping(&self.client).await
    }
}

#[async_trait]
impl Connection for Client {
    async fn query(&self, sql: &str, params: &[&str]) -> Result<QueryResult> {
        debug!(sql, "query");
        let params: Vec<&(dyn ToSql + Sync)> =
            params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

        let statement = self.prepare(sql).await?;
        let rows = Client::query(self, &statement, &params).await?;

        let columns = statement
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        let rows = rows.iter().map(convert_row).collect::<Vec<_>>();
        let count = rows.len() as u64;

        Ok(QueryResult::new(columns, rows).with_rows_affected(count))
    }

    async fn execute(&self, script: &str) -> Result<QueryResult> {
        debug!(bytes = script.len(), "execute script");
        let messages = self.simple_query(script).await?;

        let mut result = QueryResult::empty();
        let mut fresh_row_set = true;
        for message in messages {
            match message {
                SimpleQueryMessage::Row(row) => {
                    if fresh_row_set {
                        result.columns = row
                            .columns()
                            .iter()
                            .map(|c| c.name().to_string())
                            .collect();
                        result.rows.clear();
                        fresh_row_set = false;
                    }
                    let values = (0..row.len())
                        .map(|i| Value::from(row.get(i)))
                        .collect::<Row>();
                    result.rows.push(values);
                }
                SimpleQueryMessage::CommandComplete(count) => {
                    result.rows_affected += count;
                    fresh_row_set = true;
                }
                _ => {}
            }
        }

        Ok(result)
    }

    async fn ping(&self) -> Result<()> {
        self.simple_query("SELECT 1").await?;
        Ok(())
    }
}

fn convert_row(row: &tokio_postgres::Row) -> Row {
    row.columns()
        .iter()
        .enumerate()
        .map(|(idx, column)| convert_cell(row, idx, column.type_()))
        .collect()
}

fn convert_cell(row: &tokio_postgres::Row, idx: usize, ty: &Type) -> Value {
    let converted = if *ty == Type::BOOL {
        row.try_get::<_, Option<bool>>(idx).map(Value::from)
    } else if *ty == Type::INT2 {
        row.try_get::<_, Option<i16>>(idx)
            .map(|v| Value::from(v.map(i64::from)))
    } else if *ty == Type::INT4 {
        row.try_get::<_, Option<i32>>(idx)
            .map(|v| Value::from(v.map(i64::from)))
    } else if *ty == Type::INT8 {
        row.try_get::<_, Option<i64>>(idx).map(Value::from)
    } else if *ty == Type::FLOAT8 {
        row.try_get::<_, Option<f64>>(idx)
            .map(|v| v.map(Value::Float).unwrap_or(Value::Null))
    } else {
        row.try_get::<_, Option<String>>(idx).map(Value::from)
    };

    converted.unwrap_or(Value::Null)
}

impl From<tokio_postgres::Error> for DbError {
    fn from(err: tokio_postgres::Error) -> Self {
        if let Some(db) = err.as_db_error() {
            return DbError::Database {
                code: Some(db.code().code().to_string()),
                message: db.message().to_string(),
            };
        }

        if err.is_closed() {
            return DbError::Connection("connection closed".to_string());
        }

        DbError::Connection(err.to_string())
    }
}
