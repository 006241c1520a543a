// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The credential-to-client registry.
//!
//! The only module-level mutable state in the process. The reconciler is
//! the single writer; HTTP and WebSocket handlers take snapshot reads.
//! During a replacement a reader may briefly see either generation of a
//! client, which is fine — each client's state is self-contained.

use depin_core::{Clock, ControlPlane, CredentialName, Fingerprint};
use depin_provider::ProviderClient;
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::info;

struct Entry<P: ControlPlane, C: Clock> {
    client: ProviderClient<P, C>,
    fingerprint: Fingerprint,
    /// Registration order. Replacing a name in place keeps its original
    /// position, so a key rotation does not demote the default credential.
    seq: u64,
}

struct RegistryState<P: ControlPlane, C: Clock> {
    clients: HashMap<CredentialName, Entry<P, C>>,
    /// Invariant: when set, always names an entry present in `clients`.
    default_name: Option<CredentialName>,
    next_seq: u64,
}

pub struct ClientRegistry<P: ControlPlane, C: Clock> {
    state: RwLock<RegistryState<P, C>>,
}

impl<P: ControlPlane, C: Clock> Default for ClientRegistry<P, C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: ControlPlane, C: Clock> ClientRegistry<P, C> {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(RegistryState {
                clients: HashMap::new(),
                default_name: None,
                next_seq: 0,
            }),
        }
    }

    /// Resolve a client by name, or the default when no name is given.
    pub fn resolve(&self, name: Option<&str>) -> Option<ProviderClient<P, C>> {
        let state = self.state.read();
        match name {
            Some(name) => state.clients.get(name).map(|e| e.client.clone()),
            None => {
                let default = state.default_name.as_ref()?;
                state.clients.get(default).map(|e| e.client.clone())
            }
        }
    }

    pub fn fingerprint(&self, name: &str) -> Option<Fingerprint> {
        self.state.read().clients.get(name).map(|e| e.fingerprint)
    }

    /// Insert or replace the client for `name`.
    pub fn insert(&self, client: ProviderClient<P, C>) {
        let name = client.name().clone();
        let fingerprint = client.fingerprint();
        let mut state = self.state.write();
        let seq = match state.clients.get(name.as_str()) {
            Some(existing) => existing.seq,
            None => {
                let seq = state.next_seq;
                state.next_seq += 1;
                seq
            }
        };
        state.clients.insert(name.clone(), Entry { client, fingerprint, seq });
        if name.is_default() {
            state.default_name = Some(name);
        }
        self.fix_default(&mut state);
    }

    /// Remove the client for `name`, repairing the default pointer if it
    /// referenced the removed entry.
    pub fn remove(&self, name: &str) -> Option<ProviderClient<P, C>> {
        let mut state = self.state.write();
        let removed = state.clients.remove(name).map(|e| e.client);
        if state.default_name.as_ref().map(|d| d.as_str() == name).unwrap_or(false) {
            state.default_name = None;
        }
        self.fix_default(&mut state);
        removed
    }

    /// Sorted names currently registered.
    pub fn names(&self) -> Vec<CredentialName> {
        let mut names: Vec<CredentialName> =
            self.state.read().clients.keys().cloned().collect();
        names.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        names
    }

    pub fn default_name(&self) -> Option<CredentialName> {
        self.state.read().default_name.clone()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().clients.is_empty()
    }

    /// All clients, for fan-out operations (recovery, diagnostics).
    pub fn clients(&self) -> Vec<ProviderClient<P, C>> {
        let state = self.state.read();
        let mut entries: Vec<_> = state.clients.iter().collect();
        entries.sort_by(|(a, _), (b, _)| a.as_str().cmp(b.as_str()));
        entries.into_iter().map(|(_, e)| e.client.clone()).collect()
    }

    /// Keep the default pointer valid: prefer an entry literally named
    /// `default`, otherwise promote the earliest-registered client when
    /// none is marked.
    fn fix_default(&self, state: &mut RegistryState<P, C>) {
        if let Some(default) = &state.default_name {
            if state.clients.contains_key(default.as_str()) {
                return;
            }
            state.default_name = None;
        }
        if state.clients.contains_key(CredentialName::DEFAULT) {
            state.default_name = Some(CredentialName::default_name());
            return;
        }
        let promoted = state
            .clients
            .iter()
            .min_by_key(|(_, entry)| entry.seq)
            .map(|(name, _)| name.clone());
        if let Some(name) = promoted {
            info!(credential = %name, "promoted credential to default");
            state.default_name = Some(name);
        }
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
