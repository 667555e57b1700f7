//! Alias resolution
//!
//! Aliases owned by this server are resolved from local storage. Aliases
//! owned by another server are resolved by asking that server's directory.

use super::candidates::{Rejection, ServerCandidates, StepResult};
use super::errors::PerformError;
use super::traits::{DirectoryLookup, DirectoryLookupRequest, RoomDatabase};
use super::types::{RoomAlias, ServerName};
use crate::metrics::{record_labeled_counter, DIRECTORY_LOOKUPS};
use tracing::{debug, error};

/// Outcome of resolving an alias
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasResolution {
    /// The room ID as reported by the resolver, not yet validated
    pub room_id: String,
    pub candidates: ServerCandidates,
}

/// Resolve `alias` to a room ID.
///
/// The alias's domain is appended to `candidates` before any lookup, even
/// when it is the local server. Servers returned by a remote directory are
/// appended after it. A failure hands back whatever was gathered up to that
/// point.
pub async fn resolve_alias(
    local: &ServerName,
    alias: &str,
    candidates: ServerCandidates,
    db: &dyn RoomDatabase,
    directory: &dyn DirectoryLookup,
) -> StepResult<AliasResolution> {
    let alias = match RoomAlias::parse(alias) {
        Ok(alias) => alias,
        Err(e) => {
            let err = PerformError::bad_request(format!(
                "Alias {:?} is not in the correct format: {}",
                alias, e
            ));
            return Err(Rejection::new(err, candidates));
        }
    };
    let domain = alias.server_name();
    let candidates = candidates.with(domain.clone());

    let (room_id, candidates) = if alias.is_owned_by(local) {
        debug!(alias = %alias, "resolving local alias");
        match db.room_id_for_alias(&alias).await {
            Ok(room_id) => (room_id.map(String::from).unwrap_or_default(), candidates),
            Err(e) => {
                let err = PerformError::internal(format!(
                    "Lookup room alias {:?} failed: {}",
                    alias.as_str(),
                    e
                ));
                return Err(Rejection::new(err, candidates));
            }
        }
    } else {
        debug!(alias = %alias, server = %domain, "resolving alias over federation");
        let request = DirectoryLookupRequest {
            room_alias: alias.clone(),
            server_name: domain.clone(),
        };
        match directory.perform_directory_lookup(request).await {
            Ok(response) => {
                record_labeled_counter(DIRECTORY_LOOKUPS, "outcome", "ok");
                (response.room_id, candidates.extended(response.server_names))
            }
            Err(e) => {
                record_labeled_counter(DIRECTORY_LOOKUPS, "outcome", "error");
                error!(alias = %alias, server = %domain, error = %e, "directory lookup failed");
                let err = PerformError::internal(format!(
                    "Looking up alias {:?} over federation via {:?} failed: {}",
                    alias.as_str(),
                    domain.as_str(),
                    e
                ));
                return Err(Rejection::new(err, candidates));
            }
        }
    };

    if room_id.is_empty() {
        let err = PerformError::internal(format!("Alias {:?} not found", alias.as_str()));
        return Err(Rejection::new(err, candidates));
    }

    Ok(AliasResolution { room_id, candidates })
}
