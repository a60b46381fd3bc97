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

//! Fixed username -> shard table, built once at startup.

use crate::core::error::ShardError;
use crate::shard::client::{RedisShard, ShardClient};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use url::Url;

const DEFAULT_PORT: u16 = 6379;

/// One configured shard: `username@host:port`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardSpec {
    pub username: String,
    url: Url,
}

impl ShardSpec {
    /// Parse a single `username@address` entry
    pub fn parse(entry: &str) -> Result<Self, ShardError> {
        let entry = entry.trim();
        let invalid = |reason: &str| ShardError::InvalidEntry {
            entry: entry.to_string(),
            reason: reason.to_string(),
        };

        let (username, address) = entry.split_once('@').ok_or_else(|| invalid("missing '@'"))?;
        let username = username.trim();
        let address = address.trim();

        if username.is_empty() {
            return Err(invalid("empty username"));
        }
        if username.chars().any(char::is_whitespace) {
            return Err(invalid("username contains whitespace"));
        }
        if address.is_empty() {
            return Err(invalid("empty address"));
        }

        let raw = if address.contains("://") {
            address.to_string()
        } else {
            format!("redis://{}", address)
        };
        let url = Url::parse(&raw).map_err(|e| invalid(&e.to_string()))?;

        if !matches!(url.scheme(), "redis" | "rediss") {
            return Err(invalid("unsupported scheme"));
        }
        if url.host_str().map_or(true, str::is_empty) {
            return Err(invalid("missing host"));
        }

        Ok(Self {
            username: username.to_string(),
            url,
        })
    }

    /// `host:port` of the shard
    pub fn address(&self) -> String {
        format!(
            "{}:{}",
            self.url.host_str().unwrap_or_default(),
            self.url.port().unwrap_or(DEFAULT_PORT)
        )
    }

    /// Connection URL handed to the Redis client
    pub fn connection_url(&self) -> &str {
        self.url.as_str()
    }
}

impl fmt::Display for ShardSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.username, self.address())
    }
}

/// Parse a comma-separated shard list, sorted by username.
///
/// Duplicate usernames are rejected instead of silently overwritten.
pub fn parse_shard_list(list: &str) -> Result<Vec<ShardSpec>, ShardError> {
    let mut specs = list
        .split(',')
        .filter(|entry| !entry.trim().is_empty())
        .map(ShardSpec::parse)
        .collect::<Result<Vec<_>, _>>()?;

    specs.sort_by(|a, b| a.username.cmp(&b.username));
    if let Some(pair) = specs.windows(2).find(|w| w[0].username == w[1].username) {
        return Err(ShardError::DuplicateUser {
            username: pair[0].username.clone(),
        });
    }
    Ok(specs)
}

/// A registered shard and its connection handle
#[derive(Clone)]
pub struct Shard {
    pub username: String,
    pub client: Arc<dyn ShardClient>,
}

impl fmt::Debug for Shard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shard")
            .field("username", &self.username)
            .field("address", &self.client.address())
            .finish()
    }
}

/// Immutable registry of every configured shard
#[derive(Debug, Default)]
pub struct ShardRegistry {
    shards: Vec<Shard>,
    index: HashMap<String, usize>,
}

impl ShardRegistry {
    /// One Redis handle per spec. Connections are opened lazily, so an
    /// unreachable shard does not keep the others from being registered.
    pub fn open(specs: &[ShardSpec], connect_timeout: Duration) -> Result<Self, ShardError> {
        let clients = specs
            .iter()
            .map(|spec| {
                let shard = RedisShard::new(spec, connect_timeout)?;
                Ok((spec.username.clone(), Arc::new(shard) as Arc<dyn ShardClient>))
            })
            .collect::<Result<Vec<_>, ShardError>>()?;

        let registry = Self::from_clients(clients)?;
        info!("Registered {} cache shard(s)", registry.len());
        Ok(registry)
    }

    /// Build a registry from ready clients
    pub fn from_clients<I>(clients: I) -> Result<Self, ShardError>
    where
        I: IntoIterator<Item = (String, Arc<dyn ShardClient>)>,
    {
        let mut shards: Vec<Shard> = clients
            .into_iter()
            .map(|(username, client)| Shard { username, client })
            .collect();
        shards.sort_by(|a, b| a.username.cmp(&b.username));

        let mut index = HashMap::with_capacity(shards.len());
        for (i, shard) in shards.iter().enumerate() {
            if index.insert(shard.username.clone(), i).is_some() {
                return Err(ShardError::DuplicateUser {
                    username: shard.username.clone(),
                });
            }
        }

        Ok(Self { shards, index })
    }

    /// All shards, ordered by username
    pub fn iter(&self) -> impl Iterator<Item = &Shard> {
        self.shards.iter()
    }

    pub fn get(&self, username: &str) -> Option<&Shard> {
        self.index.get(username).map(|&i| &self.shards[i])
    }

    pub fn len(&self) -> usize {
        self.shards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }

    pub fn usernames(&self) -> Vec<&str> {
        self.shards.iter().map(|s| s.username.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingShard;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_entry() {
        let spec = ShardSpec::parse(" alice@10.0.0.2:6379 ").unwrap();
        assert_eq!(spec.username, "alice");
        assert_eq!(spec.address(), "10.0.0.2:6379");
        assert_eq!(spec.to_string(), "alice@10.0.0.2:6379");
    }

    #[test]
    fn test_parse_entry_default_port_and_url() {
        let spec = ShardSpec::parse("bob@cache-b").unwrap();
        assert_eq!(spec.address(), "cache-b:6379");

        let spec = ShardSpec::parse("carol@redis://cache-c:7000/2").unwrap();
        assert_eq!(spec.address(), "cache-c:7000");
        assert_eq!(spec.connection_url(), "redis://cache-c:7000/2");
    }

    #[test]
    fn test_parse_entry_rejects_malformed() {
        for bad in ["alice", "@10.0.0.2:6379", "alice@", "al ice@host:1", "alice@host:notaport", "alice@http://host:1"] {
            assert!(ShardSpec::parse(bad).is_err(), "expected failure for {:?}", bad);
        }
    }

    #[test]
    fn test_parse_list_sorted() {
        let specs = parse_shard_list("zed@10.0.0.9:6379,alice@10.0.0.2:6379,").unwrap();
        let names: Vec<_> = specs.iter().map(|s| s.username.as_str()).collect();
        assert_eq!(names, vec!["alice", "zed"]);
    }

    #[test]
    fn test_parse_list_rejects_duplicates() {
        let err = parse_shard_list("alice@10.0.0.2:6379,alice@10.0.0.3:6379").unwrap_err();
        assert!(matches!(err, ShardError::DuplicateUser { username } if username == "alice"));
    }

    #[test]
    fn test_registry_lookup() {
        let registry = ShardRegistry::from_clients(vec![
            ("bob".to_string(), RecordingShard::shared("b:1")),
            ("alice".to_string(), RecordingShard::shared("a:1")),
        ])
        .unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.usernames(), vec!["alice", "bob"]);
        assert_eq!(registry.get("bob").unwrap().client.address(), "b:1");
        assert!(registry.get("carol").is_none());
    }

    #[test]
    fn test_registry_opens_with_dead_shards() {
        let specs = parse_shard_list("alice@127.0.0.1:1,bob@127.0.0.1:2").unwrap();
        let registry = ShardRegistry::open(&specs, Duration::from_millis(200)).unwrap();

        assert_eq!(registry.usernames(), vec!["alice", "bob"]);
        assert_eq!(registry.get("bob").unwrap().client.address(), "127.0.0.1:2");
    }

    #[test]
    fn test_registry_rejects_duplicates() {
        let result = ShardRegistry::from_clients(vec![
            ("alice".to_string(), RecordingShard::shared("a:1")),
            ("alice".to_string(), RecordingShard::shared("a:2")),
        ]);
        assert!(result.is_err());
    }
}
