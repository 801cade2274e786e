// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connection pool keyed by canonical target.
//!
//! At most one [`Connection`] exists per target; concurrent acquirers of
//! the same target receive the same handle. Lifecycle is explicit:
//! acquire / remove / clear.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use crate::config::{ConnectionConfig, DEFAULT_PORT};
use crate::connection::Connection;

/// Canonicalize a robot endpoint to `host:port`, appending the default
/// gRPC port when none is given.
pub fn canonical_target(target: &str) -> String {
    if target.contains(':') {
        target.to_owned()
    } else {
        format!("{target}:{DEFAULT_PORT}")
    }
}

/// Registry of pooled connections.
#[derive(Default)]
pub struct ConnectionPool {
    entries: tokio::sync::Mutex<HashMap<String, Arc<Connection>>>,
}

impl ConnectionPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the pooled connection for `target` with default
    /// connection settings.
    pub async fn acquire(&self, target: &str) -> anyhow::Result<Arc<Connection>> {
        self.acquire_with(target, ConnectionConfig::default()).await
    }

    /// Get or create the pooled connection for `target`. The config only
    /// applies when this call creates the handle.
    ///
    /// The returned handle always has a materialized transport; a failed
    /// connectivity probe is tolerated (the retry policy re-exercises the
    /// transport on real traffic), an unbuildable endpoint is not.
    pub async fn acquire_with(
        &self,
        target: &str,
        config: ConnectionConfig,
    ) -> anyhow::Result<Arc<Connection>> {
        if target.trim().is_empty() {
            anyhow::bail!("empty target");
        }
        let key = canonical_target(target);
        let conn = {
            let mut entries = self.entries.lock().await;
            Arc::clone(
                entries
                    .entry(key.clone())
                    .or_insert_with(|| Arc::new(Connection::bare(key, config))),
            )
        };
        conn.api().await?;
        Ok(conn)
    }

    /// Drop the connection for `target` (e.g. on permanent failure).
    pub async fn remove(&self, target: &str) {
        self.entries.lock().await.remove(&canonical_target(target));
    }

    /// Drop every pooled connection.
    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

/// Process-wide pool shared by every caller that does not bring its own.
pub fn global() -> &'static ConnectionPool {
    static GLOBAL: OnceLock<ConnectionPool> = OnceLock::new();
    GLOBAL.get_or_init(ConnectionPool::new)
}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod tests;
