use crate::{key_for, transfer_io, validate_key, write_atomic, RemoteError, RemoteProvider};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// One recorded provider call, in the order it was made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderCall {
    List(String),
    Push(String),
    Pull(String),
    Delete(String),
}

#[derive(Debug, Default)]
struct State {
    objects: BTreeMap<String, Vec<u8>>,
    calls: Vec<ProviderCall>,
    fail_transfers: bool,
}

/// An in-process provider that records every call.
///
/// Clones share state, so a test can hand one clone to the engine and keep
/// another to inspect what happened.
#[derive(Debug, Clone, Default)]
pub struct MemoryProvider {
    state: Arc<Mutex<State>>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Seed an object without recording a call.
    pub fn insert(&self, key: &str, data: &[u8]) {
        self.state().objects.insert(key.to_owned(), data.to_vec());
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.state().objects.get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.state().objects.keys().cloned().collect()
    }

    pub fn calls(&self) -> Vec<ProviderCall> {
        self.state().calls.clone()
    }

    /// Make every subsequent push and pull fail with a transfer error.
    pub fn fail_transfers(&self, fail: bool) {
        self.state().fail_transfers = fail;
    }
}

impl RemoteProvider for MemoryProvider {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn list(&self, extension: &str) -> Result<Vec<String>, RemoteError> {
        let mut state = self.state();
        state.calls.push(ProviderCall::List(extension.to_owned()));
        Ok(state
            .objects
            .keys()
            .filter(|k| k.ends_with(extension))
            .cloned()
            .collect())
    }

    fn push(&self, local_path: &Path) -> Result<(), RemoteError> {
        let key = key_for(local_path)?;
        let mut state = self.state();
        state.calls.push(ProviderCall::Push(key.clone()));
        if state.fail_transfers {
            return Err(RemoteError::Transfer(format!("simulated failure pushing {key}")));
        }
        let data = std::fs::read(local_path).map_err(|e| transfer_io(local_path, &e))?;
        state.objects.insert(key, data);
        Ok(())
    }

    fn pull(&self, key: &str, dest: &Path) -> Result<(), RemoteError> {
        validate_key(key)?;
        let data = {
            let mut state = self.state();
            state.calls.push(ProviderCall::Pull(key.to_owned()));
            if state.fail_transfers {
                return Err(RemoteError::Transfer(format!("simulated failure pulling {key}")));
            }
            state
                .objects
                .get(key)
                .cloned()
                .ok_or_else(|| RemoteError::NotFound(key.to_owned()))?
        };
        write_atomic(dest, &mut data.as_slice())?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), RemoteError> {
        validate_key(key)?;
        let mut state = self.state();
        state.calls.push(ProviderCall::Delete(key.to_owned()));
        state
            .objects
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| RemoteError::NotFound(key.to_owned()))
    }
}
