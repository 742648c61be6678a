//! Redb-backed implementation of [`HotStoreBackend`].

use crate::{principal_key, turn_key, HotStoreBackend, HotStoreError, TurnRecord};
use bincode::config::standard;
use bincode::serde::{decode_from_slice, encode_to_vec};
use redb::{Database, ReadableTable, TableDefinition};
use std::path::Path;

const TURNS: TableDefinition<&str, &[u8]> = TableDefinition::new("hot_turns");
const IDXMAP: TableDefinition<&str, &[u8]> = TableDefinition::new("hot_idxmap");
const TOMB: TableDefinition<&str, &[u8]> = TableDefinition::new("hot_tomb");

fn backend_err<E: std::fmt::Display>(e: E) -> HotStoreError {
    HotStoreError::Backend(e.to_string())
}

/// Keyed turn record store backed by a single redb database file.
pub struct RedbHotStore {
    db: Database,
}

impl RedbHotStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, HotStoreError> {
        let db = Database::create(path).map_err(backend_err)?;
        let txn = db.begin_write().map_err(backend_err)?;
        {
            txn.open_table(TURNS).map_err(backend_err)?;
            txn.open_table(IDXMAP).map_err(backend_err)?;
            txn.open_table(TOMB).map_err(backend_err)?;
        }
        txn.commit().map_err(backend_err)?;
        Ok(Self { db })
    }

    fn read_idxmap(&self, key: &str) -> Result<Vec<String>, HotStoreError> {
        let txn = self.db.begin_read().map_err(backend_err)?;
        let table = txn.open_table(IDXMAP).map_err(backend_err)?;
        match table.get(key).map_err(backend_err)? {
            Some(bytes) => {
                let (ids, _): (Vec<String>, usize) =
                    decode_from_slice(bytes.value(), standard())?;
                Ok(ids)
            }
            None => Ok(Vec::new()),
        }
    }
}

impl HotStoreBackend for RedbHotStore {
    fn put_turn(
        &self,
        tenant: &str,
        user: &str,
        turn_id: &str,
        text: &str,
        signature: &str,
        ts: f64,
    ) -> Result<(), HotStoreError> {
        let record = TurnRecord {
            text: text.to_string(),
            signature: signature.to_string(),
            ts,
        };
        let record_bytes = encode_to_vec(&record, standard())?;

        let pkey = principal_key(tenant, user);
        let tkey = turn_key(tenant, user, turn_id);

        let txn = self.db.begin_write().map_err(backend_err)?;
        {
            let mut turns = txn.open_table(TURNS).map_err(backend_err)?;
            turns
                .insert(tkey.as_str(), record_bytes.as_slice())
                .map_err(backend_err)?;

            let mut idxmap = txn.open_table(IDXMAP).map_err(backend_err)?;
            let mut ids: Vec<String> = match idxmap.get(pkey.as_str()).map_err(backend_err)? {
                Some(bytes) => decode_from_slice(bytes.value(), standard())?.0,
                None => Vec::new(),
            };
            ids.push(turn_id.to_string());
            let ids_bytes = encode_to_vec(&ids, standard())?;
            idxmap
                .insert(pkey.as_str(), ids_bytes.as_slice())
                .map_err(backend_err)?;
        }
        txn.commit().map_err(backend_err)?;
        Ok(())
    }

    fn get_turn(
        &self,
        tenant: &str,
        user: &str,
        turn_id: &str,
    ) -> Result<Option<TurnRecord>, HotStoreError> {
        let tkey = turn_key(tenant, user, turn_id);
        let txn = self.db.begin_read().map_err(backend_err)?;
        let table = txn.open_table(TURNS).map_err(backend_err)?;
        match table.get(tkey.as_str()).map_err(backend_err)? {
            Some(bytes) => {
                let (record, _): (TurnRecord, usize) =
                    decode_from_slice(bytes.value(), standard())?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    fn idxmap_mget(
        &self,
        tenant: &str,
        user: &str,
        slots: &[usize],
    ) -> Result<Vec<Option<String>>, HotStoreError> {
        let pkey = principal_key(tenant, user);
        let ids = self.read_idxmap(&pkey)?;
        Ok(slots.iter().map(|&slot| ids.get(slot).cloned()).collect())
    }

    fn tombstone(&self, tenant: &str, user: &str, turn_id: &str) -> Result<bool, HotStoreError> {
        let tkey = turn_key(tenant, user, turn_id);
        let txn = self.db.begin_write().map_err(backend_err)?;
        {
            let mut tomb = txn.open_table(TOMB).map_err(backend_err)?;
            tomb.insert(tkey.as_str(), &[][..]).map_err(backend_err)?;

            let mut turns = txn.open_table(TURNS).map_err(backend_err)?;
            turns.remove(tkey.as_str()).map_err(backend_err)?;
        }
        txn.commit().map_err(backend_err)?;
        Ok(true)
    }

    fn tombstoned(&self, tenant: &str, user: &str, turn_id: &str) -> Result<bool, HotStoreError> {
        let tkey = turn_key(tenant, user, turn_id);
        let txn = self.db.begin_read().map_err(backend_err)?;
        let table = txn.open_table(TOMB).map_err(backend_err)?;
        Ok(table.get(tkey.as_str()).map_err(backend_err)?.is_some())
    }
}
