//! Redb-backed [`ColdStore`]: authoritative rows plus a derived BM25 index.

use crate::bm25::{idf, term_score};
use crate::tokenize::tokenize;
use crate::{ColdRow, ColdStoreError};
use bincode::config::standard;
use bincode::serde::{decode_from_slice, encode_to_vec};
use fst::{Map as FstMap, MapBuilder};
use redb::{Database, ReadableTable, TableDefinition};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::time::{Duration, Instant};

const ROWS: TableDefinition<&str, &[u8]> = TableDefinition::new("cold_rows");
const POSTINGS: TableDefinition<&str, &[u8]> = TableDefinition::new("cold_postings");
const DOC_LEN: TableDefinition<&str, &[u8]> = TableDefinition::new("cold_doc_len");
const ROW_TERMS: TableDefinition<&str, &[u8]> = TableDefinition::new("cold_row_terms");
const STATS: TableDefinition<&str, &[u8]> = TableDefinition::new("cold_stats");
const TERM_DICT: TableDefinition<&str, &[u8]> = TableDefinition::new("cold_term_dict");

fn backend_err<E: std::fmt::Display>(e: E) -> ColdStoreError {
    ColdStoreError::Backend(e.to_string())
}

fn pkey(tenant: &str, user: &str) -> String {
    format!("{tenant}\u{1}{user}")
}

fn rkey(tenant: &str, user: &str, turn_id: &str) -> String {
    format!("{tenant}\u{1}{user}\u{1}{turn_id}")
}

fn tkey(tenant: &str, user: &str, term: &str) -> String {
    format!("{tenant}\u{1}{user}\u{1}{term}")
}

type Postings = Vec<(String, u32)>;

/// Authoritative durable turn rows with a derived BM25 full-text index.
pub struct ColdStore {
    db: Database,
}

impl ColdStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ColdStoreError> {
        let db = Database::create(path).map_err(backend_err)?;
        let txn = db.begin_write().map_err(backend_err)?;
        {
            txn.open_table(ROWS).map_err(backend_err)?;
            txn.open_table(POSTINGS).map_err(backend_err)?;
            txn.open_table(DOC_LEN).map_err(backend_err)?;
            txn.open_table(ROW_TERMS).map_err(backend_err)?;
            txn.open_table(STATS).map_err(backend_err)?;
            txn.open_table(TERM_DICT).map_err(backend_err)?;
        }
        txn.commit().map_err(backend_err)?;
        Ok(Self { db })
    }

    /// Upsert every row; for each, drop any prior FTS entry for the same
    /// `(tenant, user, turn_id)` and index the new text. Executed in one
    /// transaction.
    pub fn put_many(&self, rows: &[ColdRow]) -> Result<(), ColdStoreError> {
        if rows.is_empty() {
            return Ok(());
        }

        let mut touched = BTreeSet::new();
        let txn = self.db.begin_write().map_err(backend_err)?;
        {
            let mut rows_t = txn.open_table(ROWS).map_err(backend_err)?;
            let mut post_t = txn.open_table(POSTINGS).map_err(backend_err)?;
            let mut len_t = txn.open_table(DOC_LEN).map_err(backend_err)?;
            let mut terms_t = txn.open_table(ROW_TERMS).map_err(backend_err)?;
            let mut stats_t = txn.open_table(STATS).map_err(backend_err)?;

            for row in rows {
                let rk = rkey(&row.tenant_id, &row.user_id, &row.turn_id);
                let pk = pkey(&row.tenant_id, &row.user_id);
                touched.insert(pk.clone());

                let existed = rows_t.get(rk.as_str()).map_err(backend_err)?.is_some();
                let old_terms: Vec<String> = match terms_t.get(rk.as_str()).map_err(backend_err)? {
                    Some(bytes) => {
                        decode_from_slice(bytes.value(), standard())
                            .map_err(|e| ColdStoreError::Corrupt(e.to_string()))?
                            .0
                    }
                    None => Vec::new(),
                };
                let old_len: u32 = match len_t.get(rk.as_str()).map_err(backend_err)? {
                    Some(bytes) => {
                        decode_from_slice(bytes.value(), standard())
                            .map_err(|e| ColdStoreError::Corrupt(e.to_string()))?
                            .0
                    }
                    None => 0,
                };

                for term in &old_terms {
                    let tk = tkey(&row.tenant_id, &row.user_id, term);
                    remove_posting(&mut post_t, &tk, &row.turn_id)?;
                }

                let tokens = tokenize(&row.text);
                let mut freq: BTreeMap<String, u32> = BTreeMap::new();
                for t in &tokens {
                    *freq.entry(t.clone()).or_insert(0) += 1;
                }
                let new_len = tokens.len() as u32;

                for (term, tf) in &freq {
                    let tk = tkey(&row.tenant_id, &row.user_id, term);
                    let mut list: Postings = match post_t.get(tk.as_str()).map_err(backend_err)? {
                        Some(bytes) => {
                            decode_from_slice(bytes.value(), standard())
                                .map_err(|e| ColdStoreError::Corrupt(e.to_string()))?
                                .0
                        }
                        None => Vec::new(),
                    };
                    list.retain(|(id, _)| id != &row.turn_id);
                    list.push((row.turn_id.clone(), *tf));
                    list.sort_by(|a, b| a.0.cmp(&b.0));
                    let bytes = encode_to_vec(&list, standard())?;
                    post_t.insert(tk.as_str(), bytes.as_slice()).map_err(backend_err)?;
                }

                let term_names: Vec<String> = freq.keys().cloned().collect();
                let terms_bytes = encode_to_vec(&term_names, standard())?;
                terms_t
                    .insert(rk.as_str(), terms_bytes.as_slice())
                    .map_err(backend_err)?;

                let len_bytes = encode_to_vec(&new_len, standard())?;
                len_t.insert(rk.as_str(), len_bytes.as_slice()).map_err(backend_err)?;

                let row_bytes = encode_to_vec(row, standard())?;
                rows_t.insert(rk.as_str(), row_bytes.as_slice()).map_err(backend_err)?;

                let (mut ndocs, mut total_len): (u64, u64) =
                    match stats_t.get(pk.as_str()).map_err(backend_err)? {
                        Some(bytes) => {
                            decode_from_slice(bytes.value(), standard())
                                .map_err(|e| ColdStoreError::Corrupt(e.to_string()))?
                                .0
                        }
                        None => (0, 0),
                    };
                if existed {
                    total_len = total_len.saturating_sub(old_len as u64) + new_len as u64;
                } else {
                    ndocs += 1;
                    total_len += new_len as u64;
                }
                let stats_bytes = encode_to_vec(&(ndocs, total_len), standard())?;
                stats_t
                    .insert(pk.as_str(), stats_bytes.as_slice())
                    .map_err(backend_err)?;
            }
        }
        txn.commit().map_err(backend_err)?;

        for pk in touched {
            self.rebuild_term_dict(&pk)?;
        }
        Ok(())
    }

    /// Truncate and rebuild every derived table from `cold_rows`.
    pub fn repair_fts(&self) -> Result<(), ColdStoreError> {
        let txn = self.db.begin_write().map_err(backend_err)?;
        let mut all_rows: Vec<ColdRow> = Vec::new();
        {
            let rows_t = txn.open_table(ROWS).map_err(backend_err)?;
            for entry in rows_t.iter().map_err(backend_err)? {
                let (_, value) = entry.map_err(backend_err)?;
                let (row, _): (ColdRow, usize) = decode_from_slice(value.value(), standard())?;
                all_rows.push(row);
            }
        }

        txn.delete_table(POSTINGS).map_err(backend_err)?;
        txn.delete_table(DOC_LEN).map_err(backend_err)?;
        txn.delete_table(ROW_TERMS).map_err(backend_err)?;
        txn.delete_table(STATS).map_err(backend_err)?;
        txn.delete_table(TERM_DICT).map_err(backend_err)?;

        let mut touched = BTreeSet::new();
        {
            let mut post_t = txn.open_table(POSTINGS).map_err(backend_err)?;
            let mut len_t = txn.open_table(DOC_LEN).map_err(backend_err)?;
            let mut terms_t = txn.open_table(ROW_TERMS).map_err(backend_err)?;
            let mut stats_t = txn.open_table(STATS).map_err(backend_err)?;
            txn.open_table(TERM_DICT).map_err(backend_err)?;

            for row in &all_rows {
                let rk = rkey(&row.tenant_id, &row.user_id, &row.turn_id);
                let pk = pkey(&row.tenant_id, &row.user_id);
                touched.insert(pk.clone());

                let tokens = tokenize(&row.text);
                let mut freq: BTreeMap<String, u32> = BTreeMap::new();
                for t in &tokens {
                    *freq.entry(t.clone()).or_insert(0) += 1;
                }
                let new_len = tokens.len() as u32;

                for (term, tf) in &freq {
                    let tk = tkey(&row.tenant_id, &row.user_id, term);
                    let mut list: Postings = match post_t.get(tk.as_str()).map_err(backend_err)? {
                        Some(bytes) => {
                            decode_from_slice(bytes.value(), standard())
                                .map_err(|e| ColdStoreError::Corrupt(e.to_string()))?
                                .0
                        }
                        None => Vec::new(),
                    };
                    list.push((row.turn_id.clone(), *tf));
                    list.sort_by(|a, b| a.0.cmp(&b.0));
                    let bytes = encode_to_vec(&list, standard())?;
                    post_t.insert(tk.as_str(), bytes.as_slice()).map_err(backend_err)?;
                }

                let term_names: Vec<String> = freq.keys().cloned().collect();
                let terms_bytes = encode_to_vec(&term_names, standard())?;
                terms_t
                    .insert(rk.as_str(), terms_bytes.as_slice())
                    .map_err(backend_err)?;

                let len_bytes = encode_to_vec(&new_len, standard())?;
                len_t.insert(rk.as_str(), len_bytes.as_slice()).map_err(backend_err)?;

                let (mut ndocs, mut total_len): (u64, u64) =
                    match stats_t.get(pk.as_str()).map_err(backend_err)? {
                        Some(bytes) => {
                            decode_from_slice(bytes.value(), standard())
                                .map_err(|e| ColdStoreError::Corrupt(e.to_string()))?
                                .0
                        }
                        None => (0, 0),
                    };
                ndocs += 1;
                total_len += new_len as u64;
                let stats_bytes = encode_to_vec(&(ndocs, total_len), standard())?;
                stats_t
                    .insert(pk.as_str(), stats_bytes.as_slice())
                    .map_err(backend_err)?;
            }
        }
        txn.commit().map_err(backend_err)?;

        for pk in touched {
            self.rebuild_term_dict(&pk)?;
        }
        Ok(())
    }

    /// Rebuild the per-principal FST term dictionary from the postings
    /// table. Scans the whole postings table once; fine at the scale a
    /// single embedded deployment targets.
    fn rebuild_term_dict(&self, pk: &str) -> Result<(), ColdStoreError> {
        let prefix = format!("{pk}\u{1}");
        let txn = self.db.begin_write().map_err(backend_err)?;
        let mut terms: BTreeMap<String, u64> = BTreeMap::new();
        {
            let post_t = txn.open_table(POSTINGS).map_err(backend_err)?;
            for entry in post_t.iter().map_err(backend_err)? {
                let (key, value) = entry.map_err(backend_err)?;
                let key = key.value();
                if let Some(term) = key.strip_prefix(prefix.as_str()) {
                    let list: Postings = decode_from_slice(value.value(), standard())
                        .map_err(|e| ColdStoreError::Corrupt(e.to_string()))?
                        .0;
                    terms.insert(term.to_string(), list.len() as u64);
                }
            }
        }

        let mut builder = MapBuilder::memory();
        for (term, df) in &terms {
            builder.insert(term, *df).map_err(backend_err)?;
        }
        let bytes = builder.into_inner().map_err(backend_err)?;

        {
            let mut dict_t = txn.open_table(TERM_DICT).map_err(backend_err)?;
            dict_t.insert(pk, bytes.as_slice()).map_err(backend_err)?;
        }
        txn.commit().map_err(backend_err)?;
        Ok(())
    }

    /// BM25-ranked search scoped to `(tenant, user)`, ordered by descending
    /// relevance with `turn_id` breaking ties. Stops accumulating rows once
    /// `budget_ms` has elapsed; a corruption-class failure in the derived
    /// tables triggers exactly one [`ColdStore::repair_fts`] and a retry.
    pub fn search_fts(
        &self,
        tenant: &str,
        user: &str,
        query: &str,
        limit: usize,
        budget: Duration,
    ) -> Result<Vec<ColdRow>, ColdStoreError> {
        match self.try_search_fts(tenant, user, query, limit, budget) {
            Ok(rows) => Ok(rows),
            Err(ColdStoreError::Corrupt(reason)) => {
                tracing::warn!(reason, "cold FTS index corrupt, repairing");
                self.repair_fts()?;
                self.try_search_fts(tenant, user, query, limit, budget)
            }
            Err(other) => Err(other),
        }
    }

    fn try_search_fts(
        &self,
        tenant: &str,
        user: &str,
        query: &str,
        limit: usize,
        budget: Duration,
    ) -> Result<Vec<ColdRow>, ColdStoreError> {
        let t0 = Instant::now();
        let pk = pkey(tenant, user);

        let txn = self.db.begin_read().map_err(backend_err)?;
        let stats_t = txn.open_table(STATS).map_err(backend_err)?;
        let (ndocs, total_len): (u64, u64) = match stats_t.get(pk.as_str()).map_err(backend_err)? {
            Some(bytes) => decode_from_slice(bytes.value(), standard())
                .map_err(|e| ColdStoreError::Corrupt(e.to_string()))?
                .0,
            None => return Ok(Vec::new()),
        };
        if ndocs == 0 {
            return Ok(Vec::new());
        }
        let avg_doc_len = total_len as f64 / ndocs as f64;

        let dict_t = txn.open_table(TERM_DICT).map_err(backend_err)?;
        let dict_bytes = dict_t
            .get(pk.as_str())
            .map_err(backend_err)?
            .ok_or_else(|| ColdStoreError::Corrupt("missing term dictionary".to_string()))?
            .value()
            .to_vec();
        let map = FstMap::new(dict_bytes).map_err(|e| ColdStoreError::Corrupt(e.to_string()))?;

        let terms: BTreeSet<String> = tokenize(query).into_iter().collect();
        let post_t = txn.open_table(POSTINGS).map_err(backend_err)?;
        let len_t = txn.open_table(DOC_LEN).map_err(backend_err)?;

        let mut scores: BTreeMap<String, f64> = BTreeMap::new();
        for term in &terms {
            let Some(df) = map.get(term) else { continue };
            let tk = tkey(tenant, user, term);
            let Some(bytes) = post_t.get(tk.as_str()).map_err(backend_err)? else {
                continue;
            };
            let postings: Postings = decode_from_slice(bytes.value(), standard())
                .map_err(|e| ColdStoreError::Corrupt(e.to_string()))?
                .0;
            let idf_val = idf(ndocs, df);
            for (turn_id, tf) in postings {
                let rk = rkey(tenant, user, &turn_id);
                let doc_len: u32 = len_t
                    .get(rk.as_str())
                    .map_err(backend_err)?
                    .map(|b| decode_from_slice(b.value(), standard()).map(|(v, _)| v))
                    .transpose()
                    .map_err(|e: bincode::error::DecodeError| ColdStoreError::Corrupt(e.to_string()))?
                    .unwrap_or(0);
                let contrib = term_score(idf_val, tf, doc_len as u64, avg_doc_len);
                *scores.entry(turn_id).or_insert(0.0) += contrib;
            }
        }

        let mut ranked: Vec<(String, f64)> = scores.into_iter().collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });

        let rows_t = txn.open_table(ROWS).map_err(backend_err)?;
        let mut out = Vec::with_capacity(limit.min(ranked.len()));
        for (turn_id, _score) in ranked {
            if out.len() >= limit {
                break;
            }
            if t0.elapsed() > budget {
                break;
            }
            let rk = rkey(tenant, user, &turn_id);
            if let Some(bytes) = rows_t.get(rk.as_str()).map_err(backend_err)? {
                let (row, _): (ColdRow, usize) = decode_from_slice(bytes.value(), standard())?;
                out.push(row);
            }
        }
        Ok(out)
    }
}

fn remove_posting(
    table: &mut redb::Table<&str, &[u8]>,
    key: &str,
    turn_id: &str,
) -> Result<(), ColdStoreError> {
    let existing: Option<Postings> = match table.get(key).map_err(backend_err)? {
        Some(bytes) => Some(
            decode_from_slice(bytes.value(), standard())
                .map_err(|e| ColdStoreError::Corrupt(e.to_string()))?
                .0,
        ),
        None => None,
    };
    if let Some(mut list) = existing {
        list.retain(|(id, _)| id != turn_id);
        if list.is_empty() {
            table.remove(key).map_err(backend_err)?;
        } else {
            let bytes = encode_to_vec(&list, standard())?;
            table.insert(key, bytes.as_slice()).map_err(backend_err)?;
        }
    }
    Ok(())
}
