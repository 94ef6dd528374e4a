//! Pooled MSSQL access over tiberius.

use super::{Database, Statement};
use crate::config::DatabaseConfig;
use crate::core::FieldValue;
use crate::error::{ApiError, Result};
use async_trait::async_trait;
use bb8::{Pool, PooledConnection};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use serde_json::Value;
use tiberius::numeric::Numeric;
use tiberius::{AuthMethod, Client, Config, EncryptionLevel, Query, Row};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, info};
use uuid::Uuid;

/// Connection manager for bb8 pool with tiberius.
#[derive(Clone)]
struct TiberiusConnectionManager {
    config: DatabaseConfig,
}

impl TiberiusConnectionManager {
    fn new(config: DatabaseConfig) -> Self {
        Self { config }
    }

    fn build_config(&self) -> Config {
        let mut config = Config::new();
        config.host(&self.config.host);
        config.port(self.config.port);
        config.database(&self.config.database);
        config.authentication(AuthMethod::sql_server(&self.config.user, &self.config.password));

        if self.config.encryption_enabled() {
            if self.config.trust_server_cert {
                config.trust_cert();
            }
            config.encryption(EncryptionLevel::Required);
        } else {
            config.encryption(EncryptionLevel::NotSupported);
        }

        config
    }
}

#[async_trait]
impl bb8::ManageConnection for TiberiusConnectionManager {
    type Connection = Client<Compat<TcpStream>>;
    type Error = tiberius::error::Error;

    async fn connect(&self) -> std::result::Result<Self::Connection, Self::Error> {
        let config = self.build_config();
        let tcp = TcpStream::connect(config.get_addr())
            .await
            .map_err(|e| tiberius::error::Error::Io {
                kind: e.kind(),
                message: e.to_string(),
            })?;

        tcp.set_nodelay(true).ok();

        Client::connect(config, tcp.compat_write()).await
    }

    async fn is_valid(&self, conn: &mut Self::Connection) -> std::result::Result<(), Self::Error> {
        conn.simple_query("SELECT 1").await?.into_row().await?;
        Ok(())
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}

/// MSSQL pool implementation with connection pooling.
pub struct MssqlPool {
    pool: Pool<TiberiusConnectionManager>,
}

impl MssqlPool {
    /// Create a new MSSQL pool sized from the configuration.
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        Self::with_max_connections(config, config.get_max_connections()).await
    }

    /// Create a new MSSQL pool with specified max connections.
    pub async fn with_max_connections(config: &DatabaseConfig, max_size: u32) -> Result<Self> {
        let manager = TiberiusConnectionManager::new(config.clone());
        let pool = Pool::builder()
            .max_size(max_size)
            .min_idle(Some(1))
            .build(manager)
            .await
            .map_err(|e| ApiError::pool(e, "creating MSSQL pool"))?;

        // Test connection
        {
            let mut conn = pool
                .get()
                .await
                .map_err(|e| ApiError::pool(e, "testing MSSQL connection"))?;
            conn.simple_query("SELECT 1").await?.into_row().await?;
        }

        info!(
            "Connected to MSSQL: {}:{}/{} (pool_size={})",
            config.host, config.port, config.database, max_size
        );

        Ok(Self { pool })
    }

    /// Get a pooled connection.
    async fn get_client(&self) -> Result<PooledConnection<'_, TiberiusConnectionManager>> {
        self.pool
            .get()
            .await
            .map_err(|e| ApiError::pool(e, "getting MSSQL connection"))
    }
}

/// Build a tiberius query with every parameter bound.
fn build_query(stmt: &Statement) -> Query<'_> {
    let mut query = Query::new(stmt.sql.as_str());
    for param in &stmt.params {
        bind_param(&mut query, param);
    }
    query
}

fn bind_param<'a>(query: &mut Query<'a>, value: &'a FieldValue) {
    match value {
        FieldValue::Null => query.bind(Option::<String>::None),
        FieldValue::Integer(i) => query.bind(*i),
        FieldValue::Decimal(d) => query.bind(Numeric::new_with_scale(d.mantissa(), d.scale() as u8)),
        FieldValue::Text(s) => query.bind(s.as_str()),
        FieldValue::Opaque(v) => match v {
            Value::Null => query.bind(Option::<String>::None),
            Value::Bool(b) => query.bind(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => query.bind(i),
                None => query.bind(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => query.bind(s.as_str()),
            other => query.bind(other.to_string()),
        },
    }
}

#[async_trait]
impl Database for MssqlPool {
    async fn query(&self, stmt: &Statement, column_types: &[&str]) -> Result<Vec<Vec<FieldValue>>> {
        let mut client = self.get_client().await?;

        let stream = build_query(stmt).query(&mut *client).await?;
        let rows = stream.into_first_result().await?;

        let mut result = Vec::with_capacity(rows.len());
        for row in rows {
            let mut values = Vec::with_capacity(column_types.len());
            for (idx, data_type) in column_types.iter().enumerate() {
                values.push(convert_row_value(&row, idx, data_type)?);
            }
            result.push(values);
        }

        debug!("Fetched {} rows", result.len());
        Ok(result)
    }

    async fn execute(&self, stmt: &Statement) -> Result<u64> {
        let mut client = self.get_client().await?;
        let result = build_query(stmt).execute(&mut *client).await?;
        Ok(result.total())
    }

    async fn ping(&self) -> Result<()> {
        let mut client = self.get_client().await?;
        client.simple_query("SELECT 1").await?.into_row().await?;
        Ok(())
    }
}

/// Convert a row value to a FieldValue based on the column type.
fn convert_row_value(row: &Row, idx: usize, data_type: &str) -> Result<FieldValue> {
    let dt = data_type.to_lowercase();

    let value = match dt.as_str() {
        "bit" => row
            .try_get::<bool, _>(idx)?
            .map(|b| FieldValue::Opaque(Value::Bool(b))),
        "tinyint" => row
            .try_get::<u8, _>(idx)?
            .map(|v| FieldValue::Integer(v as i64)),
        "smallint" => row
            .try_get::<i16, _>(idx)?
            .map(|v| FieldValue::Integer(v as i64)),
        "int" => row
            .try_get::<i32, _>(idx)?
            .map(|v| FieldValue::Integer(v as i64)),
        "bigint" => row.try_get::<i64, _>(idx)?.map(FieldValue::Integer),
        "real" => row
            .try_get::<f32, _>(idx)?
            .map(|v| float_value(v as f64)),
        "float" | "money" | "smallmoney" => row.try_get::<f64, _>(idx)?.map(float_value),
        "decimal" | "numeric" => row.try_get::<Decimal, _>(idx)?.map(decimal_value),
        "uniqueidentifier" => row
            .try_get::<Uuid, _>(idx)?
            .map(|u| FieldValue::Opaque(Value::String(u.to_string()))),
        "datetime" | "datetime2" | "smalldatetime" => row
            .try_get::<NaiveDateTime, _>(idx)?
            .map(|v| opaque_string(v.format("%Y-%m-%dT%H:%M:%S%.f").to_string())),
        "date" => row
            .try_get::<NaiveDate, _>(idx)?
            .map(|v| opaque_string(v.format("%Y-%m-%d").to_string())),
        "time" => row
            .try_get::<NaiveTime, _>(idx)?
            .map(|v| opaque_string(v.format("%H:%M:%S%.f").to_string())),
        "datetimeoffset" => row
            .try_get::<DateTime<FixedOffset>, _>(idx)?
            .map(|v| opaque_string(v.to_rfc3339())),
        "binary" | "varbinary" | "image" | "timestamp" | "rowversion" => row
            .try_get::<&[u8], _>(idx)?
            .map(|bytes| opaque_string(hex_literal(bytes))),
        "char" | "varchar" | "text" | "nchar" | "nvarchar" | "ntext" | "sysname" => row
            .try_get::<&str, _>(idx)?
            .map(|s| FieldValue::Text(s.to_string())),
        _ => {
            // xml, sql_variant, spatial and user-defined types: best effort as text
            match row.try_get::<&str, _>(idx) {
                Ok(v) => v.map(|s| opaque_string(s.to_string())),
                Err(e) => {
                    debug!("Column {} ({}) not decodable as text: {}", idx, data_type, e);
                    None
                }
            }
        }
    };

    Ok(value.unwrap_or(FieldValue::Null))
}

fn opaque_string(s: String) -> FieldValue {
    FieldValue::Opaque(Value::String(s))
}

fn float_value(f: f64) -> FieldValue {
    serde_json::Number::from_f64(f)
        .map(|n| FieldValue::Opaque(Value::Number(n)))
        .unwrap_or(FieldValue::Null)
}

fn decimal_value(d: Decimal) -> FieldValue {
    if d.fract().is_zero() {
        if let Ok(i) = i64::try_from(d) {
            return FieldValue::Integer(i);
        }
    }
    FieldValue::Decimal(d)
}

fn hex_literal(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(2 + bytes.len() * 2);
    out.push_str("0x");
    for b in bytes {
        out.push_str(&format!("{:02X}", b));
    }
    out
}
