//! Static room directory
//!
//! Answers directory lookups from a fixed table instead of talking to remote
//! servers. A server that was never registered is treated as unreachable; a
//! registered server that does not know the alias answers with an empty
//! room ID. A server marked as refusing answers every lookup with an error.

use crate::core_room::errors::DirectoryError;
use crate::core_room::traits::{DirectoryLookup, DirectoryLookupRequest, DirectoryLookupResponse};
use crate::core_room::types::{RoomAlias, ServerName};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

#[derive(Default)]
pub struct StaticDirectory {
    servers: RwLock<HashMap<ServerName, HashMap<RoomAlias, DirectoryLookupResponse>>>,
    refusals: RwLock<HashMap<ServerName, String>>,
    requests: RwLock<Vec<DirectoryLookupRequest>>,
    lookups: AtomicUsize,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a server that is reachable but knows no aliases yet
    pub async fn add_server(&self, server: ServerName) {
        self.servers.write().await.entry(server).or_default();
    }

    /// Make `server` reject every lookup with `reason`
    pub async fn refuse(&self, server: ServerName, reason: impl Into<String>) {
        self.refusals.write().await.insert(server, reason.into());
    }

    /// Register the answer for `alias` on the server that owns it
    pub async fn insert(&self, alias: RoomAlias, response: DirectoryLookupResponse) {
        self.servers
            .write()
            .await
            .entry(alias.server_name())
            .or_default()
            .insert(alias, response);
    }

    /// Number of lookups performed so far
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    /// Every request received so far, in order
    pub async fn requests(&self) -> Vec<DirectoryLookupRequest> {
        self.requests.read().await.clone()
    }
}

#[async_trait]
impl DirectoryLookup for StaticDirectory {
    async fn perform_directory_lookup(
        &self,
        request: DirectoryLookupRequest,
    ) -> Result<DirectoryLookupResponse, DirectoryError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.requests.write().await.push(request.clone());

        if let Some(reason) = self.refusals.read().await.get(&request.server_name) {
            return Err(DirectoryError::Rejected(reason.clone()));
        }

        let servers = self.servers.read().await;
        let aliases = servers
            .get(&request.server_name)
            .ok_or_else(|| DirectoryError::Unreachable(request.server_name.to_string()))?;
        Ok(aliases.get(&request.room_alias).cloned().unwrap_or_default())
    }
}
