use parking_lot::RwLock;
use smm_core::{AccountRecord, AccountStore, PersistedState, SignalFilters, StoreError};
use std::collections::HashMap;

/// [`AccountStore`] kept in memory. Used by paper sessions and tests.
#[derive(Debug, Default)]
pub struct MemoryAccountStore {
    state: RwLock<PersistedState>,
}

impl MemoryAccountStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing snapshot.
    #[must_use]
    pub fn with_state(state: PersistedState) -> Self {
        Self {
            state: RwLock::new(state),
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> PersistedState {
        self.state.read().clone()
    }
}

impl AccountStore for MemoryAccountStore {
    fn load(&self) -> Result<PersistedState, StoreError> {
        Ok(self.snapshot())
    }

    fn save_account(&self, record: &AccountRecord) -> Result<(), StoreError> {
        let mut state = self.state.write();
        match state
            .accounts
            .iter_mut()
            .find(|a| a.account_id == record.account_id)
        {
            Some(existing) => *existing = record.clone(),
            None => state.accounts.push(record.clone()),
        }
        Ok(())
    }

    fn remove_account(&self, account_id: &str) -> Result<(), StoreError> {
        self.state
            .write()
            .accounts
            .retain(|a| a.account_id != account_id);
        Ok(())
    }

    fn save_sync_groups(&self, groups: &HashMap<String, Vec<String>>) -> Result<(), StoreError> {
        self.state.write().sync_groups = groups.clone();
        Ok(())
    }

    fn save_filters(&self, filters: &SignalFilters) -> Result<(), StoreError> {
        self.state.write().filters = Some(*filters);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_account_upserts() {
        let store = MemoryAccountStore::new();
        store
            .save_account(&AccountRecord {
                account_id: "A".into(),
                enabled: true,
            })
            .unwrap();
        store
            .save_account(&AccountRecord {
                account_id: "A".into(),
                enabled: false,
            })
            .unwrap();

        let state = store.load().unwrap();
        assert_eq!(state.accounts.len(), 1);
        assert!(!state.accounts[0].enabled);

        store.remove_account("A").unwrap();
        assert!(store.load().unwrap().accounts.is_empty());
    }

    #[test]
    fn test_filters_and_groups_round_trip() {
        let store = MemoryAccountStore::new();
        let filters = SignalFilters {
            long_enabled: true,
            short_enabled: false,
        };
        store.save_filters(&filters).unwrap();
        store
            .save_sync_groups(&HashMap::from([("main".to_string(), vec!["A".to_string()])]))
            .unwrap();

        let state = store.load().unwrap();
        assert_eq!(state.filters, Some(filters));
        assert_eq!(state.sync_groups["main"], vec!["A".to_string()]);
    }
}
