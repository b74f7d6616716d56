//! # Persistence Boundary
//!
//! The remote proposal API is a collaborator: this module only defines the
//! contract the engine consumes ([`ProposalStore`]), the tolerant reader for
//! whatever rows it returns, the local cache that mirrors them for offline
//! use, and form validation in front of create/update calls.
//!
//! ```text
//!   ProposalStore ──rows──▶ normalize_proposal ──▶ reconcile_with_cache ──▶ Proposal
//!        ▲                                              ▲
//!        └── save (debounced by session) ──▶ ProposalCache (key "proposals")
//! ```

mod cache;
mod normalize;
mod validate;

pub use cache::{
    Invite, KeyValueStore, MemoryKv, ProposalCache, Role, TeamMember, TeamStore,
    CURRENT_ROLE_KEY, INVITES_KEY, PROPOSALS_KEY, USERS_KEY,
};
pub use normalize::{normalize_proposal, reconcile_with_cache};
pub use validate::{field_errors, ClientInput, FieldErrors, ProposalInput};

use std::collections::BTreeMap;

use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use crate::error::QuireError;
use crate::model::Proposal;

/// Failures talking to the proposal API.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Could not reach the server: {0}")]
    Network(String),

    #[error("Proposal not found: {0}")]
    NotFound(String),

    #[error("Server responded with {code}: {message}")]
    Status { code: u16, message: String },

    #[error("Server returned an unreadable proposal: {0}")]
    Malformed(String),
}

/// The remote proposal API.
pub trait ProposalStore {
    fn list(&self) -> Result<Vec<Proposal>, StoreError>;
    fn get(&self, id: &str) -> Result<Proposal, StoreError>;
    /// Create or update; returns the proposal as the server now has it.
    fn save(&mut self, proposal: &Proposal) -> Result<Proposal, StoreError>;
    fn delete(&mut self, id: &str) -> Result<(), StoreError>;
}

/// Sections fields the backend does not yet round-trip.
const CLIENT_ONLY_SECTION_FIELDS: &[&str] = &["layout", "columnContents", "columnStyles"];

/// In-memory [`ProposalStore`] holding raw JSON rows.
///
/// It can be told to fail every call (to exercise offline paths) and to drop
/// the client-only section fields on write, as the real backend does.
#[derive(Debug, Clone, Default)]
pub struct MemoryProposalStore {
    rows: BTreeMap<String, Value>,
    failure: Option<StoreError>,
    drops_client_fields: bool,
}

impl MemoryProposalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with `error` (or succeed again with `None`).
    pub fn fail_with(&mut self, error: Option<StoreError>) {
        self.failure = error;
    }

    pub fn dropping_client_fields(mut self) -> Self {
        self.drops_client_fields = true;
        self
    }

    /// Insert a raw row as-is, bypassing serialization.
    pub fn insert_raw(&mut self, id: &str, row: Value) {
        self.rows.insert(id.to_string(), row);
    }

    fn check(&self) -> Result<(), StoreError> {
        match &self.failure {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    fn read(row: &Value) -> Result<Proposal, StoreError> {
        normalize_proposal(row).map_err(|e| StoreError::Malformed(e.to_string()))
    }
}

impl ProposalStore for MemoryProposalStore {
    fn list(&self) -> Result<Vec<Proposal>, StoreError> {
        self.check()?;
        self.rows.values().map(Self::read).collect()
    }

    fn get(&self, id: &str) -> Result<Proposal, StoreError> {
        self.check()?;
        let row = self
            .rows
            .get(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        Self::read(row)
    }

    fn save(&mut self, proposal: &Proposal) -> Result<Proposal, StoreError> {
        self.check()?;
        let mut row =
            serde_json::to_value(proposal).map_err(|e| StoreError::Malformed(e.to_string()))?;
        if self.drops_client_fields {
            if let Some(Value::Array(sections)) = row.get_mut("sections") {
                for section in sections.iter_mut().filter_map(Value::as_object_mut) {
                    for field in CLIENT_ONLY_SECTION_FIELDS {
                        section.remove(*field);
                    }
                }
            }
        }
        let saved = Self::read(&row)?;
        self.rows.insert(proposal.id.clone(), row);
        Ok(saved)
    }

    fn delete(&mut self, id: &str) -> Result<(), StoreError> {
        self.check()?;
        self.rows
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }
}

/// The proposal list, and whether it came from the offline cache.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedProposals {
    pub proposals: Vec<Proposal>,
    pub from_cache: bool,
}

/// List proposals from the API, refreshing the cache; fall back to the
/// cache when the API cannot be reached.
pub fn load_proposals<S: ProposalStore, K: KeyValueStore>(
    store: &S,
    cache: &mut ProposalCache<K>,
) -> Result<LoadedProposals, QuireError> {
    match store.list() {
        Ok(proposals) => {
            let previous = cache.load();
            let proposals: Vec<Proposal> = proposals
                .iter()
                .map(|p| reconcile_with_cache(p, previous.iter().find(|c| c.id == p.id)))
                .collect();
            cache.save(&proposals)?;
            Ok(LoadedProposals {
                proposals,
                from_cache: false,
            })
        }
        Err(StoreError::Network(reason)) => {
            warn!(%reason, "Proposal API unreachable, serving cached list");
            Ok(LoadedProposals {
                proposals: cache.load(),
                from_cache: true,
            })
        }
        Err(e) => Err(e.into()),
    }
}

/// Fetch one proposal's full details and repair fields the server dropped.
pub fn fetch_full_details<S: ProposalStore, K: KeyValueStore>(
    store: &S,
    cache: &mut ProposalCache<K>,
    id: &str,
) -> Result<Proposal, QuireError> {
    let server = store.get(id)?;
    let merged = reconcile_with_cache(&server, cache.get(id).as_ref());
    cache.upsert(&merged)?;
    Ok(merged)
}

/// Validate form input and create the proposal remotely.
pub fn create_proposal<S: ProposalStore, K: KeyValueStore>(
    store: &mut S,
    cache: &mut ProposalCache<K>,
    input: ProposalInput,
) -> Result<Proposal, QuireError> {
    let errors = field_errors(&input);
    if !errors.is_empty() {
        return Err(QuireError::Validation(errors));
    }
    let proposal = input.into_proposal();
    let saved = store.save(&proposal)?;
    cache.upsert(&saved)?;
    info!(proposal = %saved.id, "Created proposal");
    Ok(saved)
}
