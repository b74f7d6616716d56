//! Local key-value persistence: the offline proposal mirror and the team
//! (users, invites, current role) store.
//!
//! Both sit on a [`KeyValueStore`], the same load/save/clear contract a
//! browser's local storage offers. Values are JSON strings; anything that
//! fails to parse reads as empty rather than failing the caller.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;
use validator::ValidateEmail;

use super::normalize::normalize_proposal;
use super::FieldErrors;
use crate::error::QuireError;
use crate::model::{new_id, Proposal};

/// Fixed namespace key under which the proposal list is mirrored.
pub const PROPOSALS_KEY: &str = "proposals";
pub const USERS_KEY: &str = "team.users";
pub const INVITES_KEY: &str = "team.invites";
pub const CURRENT_ROLE_KEY: &str = "team.currentRole";

pub trait KeyValueStore {
    fn load(&self, key: &str) -> Option<String>;
    fn save(&mut self, key: &str, value: String);
    fn clear(&mut self, key: &str);
}

/// In-process [`KeyValueStore`].
#[derive(Debug, Clone, Default)]
pub struct MemoryKv {
    entries: HashMap<String, String>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryKv {
    fn load(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn save(&mut self, key: &str, value: String) {
        self.entries.insert(key.to_string(), value);
    }

    fn clear(&mut self, key: &str) {
        self.entries.remove(key);
    }
}

fn load_json<T: DeserializeOwned + Default>(kv: &impl KeyValueStore, key: &str) -> T {
    let Some(raw) = kv.load(key) else {
        return T::default();
    };
    match serde_json::from_str(&raw) {
        Ok(v) => v,
        Err(e) => {
            warn!(key, error = %e, "Discarding unreadable cache entry");
            T::default()
        }
    }
}

fn save_json<T: Serialize + ?Sized>(
    kv: &mut impl KeyValueStore,
    key: &str,
    value: &T,
) -> Result<(), QuireError> {
    kv.save(key, serde_json::to_string(value)?);
    Ok(())
}

/// Mirror of the last-known proposal list. Never the source of truth while
/// the API is reachable.
#[derive(Debug, Clone, Default)]
pub struct ProposalCache<K: KeyValueStore> {
    kv: K,
}

impl<K: KeyValueStore> ProposalCache<K> {
    pub fn new(kv: K) -> Self {
        Self { kv }
    }

    /// Every cached proposal that still normalizes; broken rows are skipped.
    pub fn load(&self) -> Vec<Proposal> {
        let rows: Vec<Value> = load_json(&self.kv, PROPOSALS_KEY);
        rows.iter()
            .filter_map(|row| match normalize_proposal(row) {
                Ok(p) => Some(p),
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable cached proposal");
                    None
                }
            })
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<Proposal> {
        self.load().into_iter().find(|p| p.id == id)
    }

    pub fn save(&mut self, proposals: &[Proposal]) -> Result<(), QuireError> {
        save_json(&mut self.kv, PROPOSALS_KEY, proposals)
    }

    /// Replace the cached copy of one proposal, or append it.
    pub fn upsert(&mut self, proposal: &Proposal) -> Result<(), QuireError> {
        let mut all = self.load();
        match all.iter_mut().find(|p| p.id == proposal.id) {
            Some(slot) => *slot = proposal.clone(),
            None => all.push(proposal.clone()),
        }
        self.save(&all)
    }

    pub fn remove(&mut self, id: &str) -> Result<(), QuireError> {
        let mut all = self.load();
        all.retain(|p| p.id != id);
        self.save(&all)
    }

    pub fn clear(&mut self) {
        self.kv.clear(PROPOSALS_KEY);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Owner,
    Admin,
    Editor,
    #[default]
    Viewer,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamMember {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invite {
    pub id: String,
    pub email: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// Users, pending invites and the current user's role. A bounded context of
/// its own, independent of proposals.
#[derive(Debug, Clone, Default)]
pub struct TeamStore<K: KeyValueStore> {
    kv: K,
}

impl<K: KeyValueStore> TeamStore<K> {
    pub fn new(kv: K) -> Self {
        Self { kv }
    }

    pub fn users(&self) -> Vec<TeamMember> {
        load_json(&self.kv, USERS_KEY)
    }

    pub fn save_users(&mut self, users: &[TeamMember]) -> Result<(), QuireError> {
        save_json(&mut self.kv, USERS_KEY, users)
    }

    pub fn invites(&self) -> Vec<Invite> {
        load_json(&self.kv, INVITES_KEY)
    }

    /// Record an invite. Re-inviting an address updates its role.
    pub fn invite(&mut self, email: &str, role: Role) -> Result<Invite, QuireError> {
        let email = email.trim().to_ascii_lowercase();
        if !email.validate_email() {
            let mut errors = FieldErrors::new();
            errors.insert("email".to_string(), vec!["Enter a valid email address".to_string()]);
            return Err(QuireError::Validation(errors));
        }
        let mut invites = self.invites();
        let invite = match invites.iter_mut().find(|i| i.email == email) {
            Some(existing) => {
                existing.role = role;
                existing.clone()
            }
            None => {
                let invite = Invite {
                    id: new_id(),
                    email,
                    role,
                    created_at: Utc::now(),
                };
                invites.push(invite.clone());
                invite
            }
        };
        save_json(&mut self.kv, INVITES_KEY, &invites)?;
        Ok(invite)
    }

    pub fn revoke_invite(&mut self, id: &str) -> Result<(), QuireError> {
        let mut invites = self.invites();
        invites.retain(|i| i.id != id);
        save_json(&mut self.kv, INVITES_KEY, &invites)
    }

    pub fn current_role(&self) -> Role {
        load_json(&self.kv, CURRENT_ROLE_KEY)
    }

    pub fn set_current_role(&mut self, role: Role) -> Result<(), QuireError> {
        save_json(&mut self.kv, CURRENT_ROLE_KEY, &role)
    }

    /// Forget everything team-related.
    pub fn clear(&mut self) {
        for key in [USERS_KEY, INVITES_KEY, CURRENT_ROLE_KEY] {
            self.kv.clear(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn cache_round_trips_under_fixed_key() {
        let mut cache = ProposalCache::new(MemoryKv::new());
        assert!(cache.load().is_empty());
        let a = Proposal::new("A", "x");
        let b = Proposal::new("B", "y");
        cache.save(&[a.clone(), b.clone()]).unwrap();
        assert!(cache.kv.load(PROPOSALS_KEY).is_some());
        assert_eq!(cache.load(), vec![a.clone(), b.clone()]);

        let mut a2 = a.clone();
        a2.title = "A2".into();
        cache.upsert(&a2).unwrap();
        assert_eq!(cache.get(&a.id).unwrap().title, "A2");
        assert_eq!(cache.load().len(), 2);

        cache.clear();
        assert!(cache.load().is_empty());
    }

    #[test]
    fn garbage_cache_reads_as_empty() {
        let mut kv = MemoryKv::new();
        kv.save(PROPOSALS_KEY, "{not json".into());
        assert!(ProposalCache::new(kv).load().is_empty());
    }

    #[test]
    fn team_store_is_independent() {
        let mut team = TeamStore::new(MemoryKv::new());
        assert_eq!(team.current_role(), Role::Viewer);
        team.set_current_role(Role::Admin).unwrap();
        assert_eq!(team.current_role(), Role::Admin);

        let first = team.invite("Ava@Example.com", Role::Editor).unwrap();
        let again = team.invite("ava@example.com", Role::Admin).unwrap();
        assert_eq!(first.id, again.id);
        assert_eq!(team.invites().len(), 1);
        assert_eq!(team.invites()[0].role, Role::Admin);

        assert_matches!(
            team.invite("not-an-email", Role::Viewer),
            Err(QuireError::Validation(errors)) if errors.contains_key("email")
        );

        team.clear();
        assert!(team.invites().is_empty());
        assert_eq!(team.current_role(), Role::Viewer);
    }
}
