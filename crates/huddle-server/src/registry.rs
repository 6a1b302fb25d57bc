//! Connection registry: the authoritative set of online users.
//!
//! Every operation takes the single registry mutex for its whole duration,
//! so the name-uniqueness check and the insert in [`ConnectionRegistry::try_join`]
//! are one atomic step. Records are kept in join order.

use std::collections::{BTreeMap, HashMap};

use huddle_core::{ConnectionId, JoinError, UserRecord, normalize_display_name};
use parking_lot::Mutex;

#[derive(Default)]
struct RegistryState {
    next_seq: u64,
    seq_by_connection: HashMap<ConnectionId, u64>,
    records: BTreeMap<u64, UserRecord>,
}

impl RegistryState {
    fn name_taken(&self, name: &str) -> bool {
        self.records.values().any(|r| r.display_name == name)
    }
}

/// In-memory mapping from connection to user identity.
///
/// Created at server start and dropped at shutdown; nothing is persisted.
#[derive(Default)]
pub struct ConnectionRegistry {
    state: Mutex<RegistryState>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `connection_id` under the trimmed `raw_name`.
    ///
    /// Fails with `AlreadyJoined` if the connection already has a record,
    /// `InvalidName` if the name is blank, and `NameConflict` if an online
    /// user holds the same trimmed name.
    pub fn try_join(
        &self,
        connection_id: &ConnectionId,
        raw_name: &str,
    ) -> Result<UserRecord, JoinError> {
        let mut state = self.state.lock();
        if state.seq_by_connection.contains_key(connection_id) {
            return Err(JoinError::AlreadyJoined);
        }
        let name = normalize_display_name(raw_name)?;
        if state.name_taken(&name) {
            return Err(JoinError::NameConflict { name });
        }

        let record = UserRecord::new(connection_id.clone(), name);
        let seq = state.next_seq;
        state.next_seq += 1;
        let _ = state.seq_by_connection.insert(connection_id.clone(), seq);
        let _ = state.records.insert(seq, record.clone());
        Ok(record)
    }

    /// Remove and return the record for `connection_id`, if it ever joined.
    pub fn leave(&self, connection_id: &ConnectionId) -> Option<UserRecord> {
        let mut state = self.state.lock();
        let seq = state.seq_by_connection.remove(connection_id)?;
        state.records.remove(&seq)
    }

    /// Record for `connection_id`, if joined.
    pub fn lookup(&self, connection_id: &ConnectionId) -> Option<UserRecord> {
        let state = self.state.lock();
        let seq = state.seq_by_connection.get(connection_id)?;
        state.records.get(seq).cloned()
    }

    /// All online users in join order.
    pub fn snapshot(&self) -> Vec<UserRecord> {
        self.state.lock().records.values().cloned().collect()
    }

    /// Advisory availability check for a name; never reserves it.
    ///
    /// Returns the trimmed name when it is valid and currently free.
    pub fn check_available(&self, raw_name: &str) -> Result<String, JoinError> {
        let name = normalize_display_name(raw_name)?;
        if self.state.lock().name_taken(&name) {
            return Err(JoinError::NameConflict { name });
        }
        Ok(name)
    }

    /// Number of online users.
    pub fn len(&self) -> usize {
        self.state.lock().records.len()
    }

    /// Whether nobody is online.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
