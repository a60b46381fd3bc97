// shard-invalidator - Selective cache-shard invalidation for PostgreSQL-backed parameters
// Copyright (C) 2025 shard-invalidator contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! PostgreSQL store and LISTEN/NOTIFY pump.

use crate::core::config::StoreConfig;
use crate::core::error::{Result, StoreError};
use crate::core::types::{ChangeEvent, ParameterRow, ReadLogRow};
use crate::store::{ParameterStore, StoreSession};
use async_trait::async_trait;
use futures::{stream, StreamExt};
use tokio::sync::mpsc;
use tokio_postgres::tls::NoTlsStream;
use tokio_postgres::{AsyncMessage, Client, Connection, IsolationLevel, NoTls, Socket, Transaction};
use tracing::{debug, error, info, warn};

pub const PARAMETER_TABLE: &str = "parameter_data";
pub const READ_LOG_TABLE: &str = "read_log";

const READ_LOG_QUERY: &str =
    "SELECT username, read_timestamp::text FROM read_log WHERE parameter_name = $1";

const LOOKUP_QUERY: &str =
    "SELECT ttl::float8, \"timestamp\"::text FROM parameter_data WHERE parameter_name = $1";

// Matches (username, read_timestamp) pairs so rows written after the snapshot survive.
const CONSUME_QUERY: &str = "DELETE FROM read_log r \
     USING unnest($2::text[], $3::text[]) AS c(username, read_timestamp) \
     WHERE r.parameter_name = $1 \
       AND r.username = c.username \
       AND r.read_timestamp::text = c.read_timestamp";

/// Receiving end of the change channel
pub type NotificationPump = mpsc::UnboundedReceiver<ChangeEvent>;

/// Authoritative store on a single PostgreSQL connection
pub struct PostgresStore {
    client: Client,
}

impl PostgresStore {
    /// Connect, start pumping notifications and `LISTEN` on `channel`
    pub async fn connect(config: &StoreConfig, channel: &str) -> Result<(Self, NotificationPump)> {
        let mut pg = tokio_postgres::Config::new();
        pg.host(&config.host)
            .port(config.port)
            .dbname(&config.dbname)
            .application_name("shard-invalidator")
            .connect_timeout(config.connect_timeout());
        if let Some(ref user) = config.user {
            pg.user(user);
        }
        if let Some(ref password) = config.password {
            pg.password(password);
        }

        debug!("Connecting to PostgreSQL at {}:{}/{}", config.host, config.port, config.dbname);
        let (client, connection) = tokio::time::timeout(config.connect_timeout(), pg.connect(NoTls))
            .await
            .map_err(|_| StoreError::ConnectTimeout {
                timeout_ms: config.connect_timeout_ms,
            })?
            .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(pump_notifications(connection, tx));

        client
            .batch_execute(&format!("LISTEN \"{}\"", channel))
            .await
            .map_err(|e| StoreError::QueryFailed(format!("LISTEN {}: {}", channel, e)))?;

        info!("Listening on channel '{}' at {}/{}", channel, config.host, config.dbname);
        Ok((Self { client }, rx))
    }
}

/// Drive the connection and forward notifications until it closes
async fn pump_notifications(mut connection: Connection<Socket, NoTlsStream>, tx: mpsc::UnboundedSender<ChangeEvent>) {
    let mut messages = stream::poll_fn(move |cx| connection.poll_message(cx));

    while let Some(message) = messages.next().await {
        match message {
            Ok(AsyncMessage::Notification(n)) => {
                if tx.send(ChangeEvent::new(n.channel(), n.payload())).is_err() {
                    debug!("Listener gone, stopping notification pump");
                    break;
                }
            }
            Ok(AsyncMessage::Notice(notice)) => {
                debug!("PostgreSQL notice: {}", notice.message());
            }
            Ok(_) => {}
            Err(e) => {
                error!("PostgreSQL connection error: {}", e);
                break;
            }
        }
    }
    warn!("PostgreSQL connection closed");
}

#[async_trait]
impl ParameterStore for PostgresStore {
    async fn begin<'a>(&'a mut self) -> Result<Box<dyn StoreSession + 'a>> {
        let txn = self
            .client
            .build_transaction()
            .isolation_level(IsolationLevel::RepeatableRead)
            .start()
            .await
            .map_err(|e| StoreError::TransactionFailed(e.to_string()))?;
        Ok(Box::new(PgSession { txn }))
    }
}

struct PgSession<'a> {
    txn: Transaction<'a>,
}

fn row_shape(table: &'static str) -> impl Fn(tokio_postgres::Error) -> StoreError {
    move |e| StoreError::RowShape {
        table,
        reason: e.to_string(),
    }
}

#[async_trait]
impl<'a> StoreSession for PgSession<'a> {
    async fn read_log(&mut self, parameter: &str) -> Result<Vec<ReadLogRow>> {
        let rows = self.txn.query(READ_LOG_QUERY, &[&parameter]).await?;
        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let username: String = row.try_get(0).map_err(row_shape(READ_LOG_TABLE))?;
            let read_timestamp: Option<String> = row.try_get(1).map_err(row_shape(READ_LOG_TABLE))?;
            entries.push(ReadLogRow::new(username, read_timestamp.unwrap_or_default()));
        }
        Ok(entries)
    }

    async fn lookup(&mut self, parameter: &str) -> Result<Option<ParameterRow>> {
        let row = match self.txn.query_opt(LOOKUP_QUERY, &[&parameter]).await? {
            Some(row) => row,
            None => return Ok(None),
        };
        let ttl: Option<f64> = row.try_get(0).map_err(row_shape(PARAMETER_TABLE))?;
        let last_write: Option<String> = row.try_get(1).map_err(row_shape(PARAMETER_TABLE))?;

        // NULL columns leave the expiry unknown, which the engine treats conservatively.
        Ok(Some(ParameterRow {
            ttl_ms: ttl.unwrap_or(f64::NAN),
            last_write: last_write.unwrap_or_default(),
        }))
    }

    async fn consume_read_log(&mut self, parameter: &str, rows: &[ReadLogRow]) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }
        let usernames: Vec<&str> = rows.iter().map(|r| r.username.as_str()).collect();
        let timestamps: Vec<&str> = rows.iter().map(|r| r.read_timestamp.as_str()).collect();
        let removed = self
            .txn
            .execute(CONSUME_QUERY, &[&parameter, &usernames, &timestamps])
            .await?;
        Ok(removed)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.txn
            .commit()
            .await
            .map_err(|e| StoreError::TransactionFailed(e.to_string()).into())
    }
}

/// DDL for the tables, read function and change trigger this daemon expects
pub fn schema_sql(channel: &str) -> String {
    format!(
        r#"-- shard-invalidator schema
CREATE TABLE IF NOT EXISTS {params} (
    parameter_name  text PRIMARY KEY,
    parameter_value text NOT NULL,
    ttl             double precision NOT NULL,  -- milliseconds
    "timestamp"     timestamptz NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS {log} (
    username        text NOT NULL,
    parameter_name  text NOT NULL REFERENCES {params} (parameter_name) ON DELETE CASCADE,
    read_timestamp  timestamptz NOT NULL DEFAULT clock_timestamp()
);

CREATE INDEX IF NOT EXISTS {log}_parameter_idx ON {log} (parameter_name);

-- Read path used by clients on a shard miss; records the read in {log}.
CREATE OR REPLACE FUNCTION get_parameter(name text)
RETURNS TABLE (ttl double precision, "timestamp" timestamptz, parameter_value text) AS $$
BEGIN
    INSERT INTO {log} (username, parameter_name) VALUES (current_user, name);
    RETURN QUERY
        SELECT p.ttl, p."timestamp", p.parameter_value FROM {params} p WHERE p.parameter_name = name;
END;
$$ LANGUAGE plpgsql;

CREATE OR REPLACE FUNCTION notify_parameter_change() RETURNS trigger AS $$
BEGIN
    PERFORM pg_notify('{channel}', NEW.parameter_name);
    RETURN NEW;
END;
$$ LANGUAGE plpgsql;

DROP TRIGGER IF EXISTS {params}_changed ON {params};
CREATE TRIGGER {params}_changed
    AFTER UPDATE ON {params}
    FOR EACH ROW EXECUTE FUNCTION notify_parameter_change();
"#,
        params = PARAMETER_TABLE,
        log = READ_LOG_TABLE,
        channel = channel,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_mentions_channel_and_tables() {
        let sql = schema_sql("data_update");
        assert!(sql.contains("pg_notify('data_update', NEW.parameter_name)"));
        assert!(sql.contains("CREATE TABLE IF NOT EXISTS parameter_data"));
        assert!(sql.contains("CREATE TABLE IF NOT EXISTS read_log"));
        assert!(sql.contains("FUNCTION get_parameter"));
    }

    #[test]
    fn test_queries_target_expected_tables() {
        assert!(READ_LOG_QUERY.contains(READ_LOG_TABLE));
        assert!(LOOKUP_QUERY.contains(PARAMETER_TABLE));
        assert!(CONSUME_QUERY.starts_with("DELETE FROM read_log"));
    }
}
