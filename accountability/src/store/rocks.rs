//! RocksDB-backed store
//!
//! Provides persistent storage with one column family per entity type.
//! Records are bincode-encoded. Conditional updates take the write side of
//! the lock so the read-check-write sequence cannot interleave, and
//! multi-row changes are committed through a single `WriteBatch`.

use std::path::PathBuf;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, Options, WriteBatch, DB};
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use super::schema::{self, keys, ALL_CFS};
use super::{
    sort_events, sort_requests, ContractDirectory, EscalationTransition, PolicyStore,
    RedTagRepository, RequestFilter, RequestRepository, StateChange, StoreError, StoreResult,
};
use crate::blocking::BlockScope;
use crate::model::{
    AccountabilityEvent, Contract, RedTag, RedTagState, Request, RequestId, RequestState,
};
use crate::policy::AccountabilityPolicy;

impl From<rocksdb::Error> for StoreError {
    fn from(e: rocksdb::Error) -> Self {
        StoreError::RocksDb(e)
    }
}

fn encode<T: Serialize>(value: &T) -> StoreResult<Vec<u8>> {
    bincode::serde::encode_to_vec(value, bincode::config::standard())
        .map_err(|e| StoreError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StoreResult<T> {
    let (value, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .map_err(|e| StoreError::Deserialization(e.to_string()))?;
    Ok(value)
}

fn handle<'a>(db: &'a DB, cf_name: &str) -> StoreResult<&'a ColumnFamily> {
    db.cf_handle(cf_name)
        .ok_or_else(|| StoreError::ColumnFamilyNotFound(cf_name.to_string()))
}

fn get_value<T: DeserializeOwned>(db: &DB, cf_name: &str, key: &str) -> StoreResult<Option<T>> {
    let cf = handle(db, cf_name)?;
    match db.get_cf(&cf, key.as_bytes())? {
        Some(bytes) => Ok(Some(decode(&bytes)?)),
        None => Ok(None),
    }
}

fn put_value<T: Serialize>(db: &DB, cf_name: &str, key: &str, value: &T) -> StoreResult<()> {
    let cf = handle(db, cf_name)?;
    db.put_cf(&cf, key.as_bytes(), encode(value)?)?;
    Ok(())
}

/// Decode every value whose key starts with `prefix`, in key order
fn scan<T: DeserializeOwned>(db: &DB, cf_name: &str, prefix: &str) -> StoreResult<Vec<T>> {
    let cf = handle(db, cf_name)?;
    let mut values = Vec::new();

    for result in db.prefix_iterator_cf(&cf, prefix.as_bytes()) {
        let (key, value) = result?;
        if !key.starts_with(prefix.as_bytes()) {
            break; // Prefix no longer matches
        }
        values.push(decode(&value)?);
    }

    Ok(values)
}

/// Shared reference to RocksStore
pub type SharedRocksStore = Arc<RocksStore>;

/// RocksDB-backed persistent store
pub struct RocksStore {
    db: RwLock<DB>,
    path: PathBuf,
}

impl RocksStore {
    /// Open or create a store at the given path
    pub fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = ALL_CFS
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect();

        let db = DB::open_cf_descriptors(&opts, &path, cf_descriptors)?;
        debug!(path = %path.display(), "Opened RocksDB store");

        Ok(Self {
            db: RwLock::new(db),
            path,
        })
    }

    /// Create a shared reference to this store
    pub fn shared(self) -> SharedRocksStore {
        Arc::new(self)
    }

    /// Get the database path
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, DB>> {
        self.db.read().map_err(|_| StoreError::LockPoisoned)
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, DB>> {
        self.db.write().map_err(|_| StoreError::LockPoisoned)
    }

    /// Rewrite every request matching `select` in one batch
    fn update_requests_where(
        &self,
        select: impl Fn(&Request) -> bool,
        update: impl Fn(&mut Request),
    ) -> StoreResult<Vec<RequestId>> {
        let db = self.write()?;
        let requests: Vec<Request> = scan(&db, schema::CF_REQUESTS, keys::REQUEST_PREFIX)?;
        let cf = handle(&db, schema::CF_REQUESTS)?;

        let mut batch = WriteBatch::default();
        let mut changed = Vec::new();
        for mut request in requests.into_iter().filter(|r| select(r)) {
            update(&mut request);
            batch.put_cf(&cf, keys::request(&request.id).as_bytes(), encode(&request)?);
            changed.push(request.id);
        }

        if !changed.is_empty() {
            db.write(batch)?;
        }
        Ok(changed)
    }
}

impl PolicyStore for RocksStore {
    fn get_policy(&self, client_package: &str) -> StoreResult<Option<AccountabilityPolicy>> {
        get_value(&self.read()?, schema::CF_POLICIES, &keys::policy(client_package))
    }

    fn upsert_policy(&self, policy: AccountabilityPolicy) -> StoreResult<AccountabilityPolicy> {
        let db = self.read()?;
        put_value(
            &db,
            schema::CF_POLICIES,
            &keys::policy(&policy.client_package),
            &policy,
        )?;
        Ok(policy)
    }

    fn list_policies(&self) -> StoreResult<Vec<AccountabilityPolicy>> {
        scan(&self.read()?, schema::CF_POLICIES, keys::POLICY_PREFIX)
    }
}

impl ContractDirectory for RocksStore {
    fn put_contract(&self, contract: &Contract) -> StoreResult<()> {
        put_value(
            &self.read()?,
            schema::CF_CONTRACTS,
            &keys::contract(&contract.id),
            contract,
        )
    }

    fn get_contract(&self, contract_id: &str) -> StoreResult<Option<Contract>> {
        get_value(&self.read()?, schema::CF_CONTRACTS, &keys::contract(contract_id))
    }

    fn list_contracts(&self) -> StoreResult<Vec<Contract>> {
        scan(&self.read()?, schema::CF_CONTRACTS, keys::CONTRACT_PREFIX)
    }
}

impl RequestRepository for RocksStore {
    fn create_request(&self, request: &Request) -> StoreResult<()> {
        let db = self.write()?;
        let key = keys::request(&request.id);
        if get_value::<Request>(&db, schema::CF_REQUESTS, &key)?.is_some() {
            return Err(StoreError::AlreadyExists(request.id.clone()));
        }
        put_value(&db, schema::CF_REQUESTS, &key, request)
    }

    fn get_request(&self, request_id: &str) -> StoreResult<Option<Request>> {
        get_value(&self.read()?, schema::CF_REQUESTS, &keys::request(request_id))
    }

    fn find_requests(&self, filter: &RequestFilter) -> StoreResult<Vec<Request>> {
        let mut requests: Vec<Request> =
            scan::<Request>(&self.read()?, schema::CF_REQUESTS, keys::REQUEST_PREFIX)?
                .into_iter()
                .filter(|r| filter.matches(r))
                .collect();
        sort_requests(&mut requests);
        Ok(requests)
    }

    fn set_request_state(&self, change: &StateChange) -> StoreResult<Option<Request>> {
        let db = self.write()?;
        let key = keys::request(&change.request_id);
        let mut request: Request = get_value(&db, schema::CF_REQUESTS, &key)?
            .ok_or_else(|| StoreError::NotFound(change.request_id.clone()))?;

        if request.state != change.expected {
            return Ok(None);
        }
        change.apply_to(&mut request);
        put_value(&db, schema::CF_REQUESTS, &key, &request)?;
        Ok(Some(request))
    }

    fn apply_escalation(&self, transition: &EscalationTransition) -> StoreResult<bool> {
        let db = self.write()?;
        let key = keys::request(&transition.request_id);
        let Some(mut request) = get_value::<Request>(&db, schema::CF_REQUESTS, &key)? else {
            return Ok(false);
        };

        if request.escalation_level != transition.expected_level || !request.state.is_active() {
            return Ok(false);
        }

        let event = &transition.event;
        request.escalation_level = event.to_level;
        request.updated_at = event.created_at;

        let event_key = keys::event(
            &event.request_id,
            event.created_at.timestamp_nanos_opt().unwrap_or_default(),
            &event.id,
        );

        // Level and event land together or not at all
        let mut batch = WriteBatch::default();
        batch.put_cf(
            &handle(&db, schema::CF_REQUESTS)?,
            key.as_bytes(),
            encode(&request)?,
        );
        batch.put_cf(
            &handle(&db, schema::CF_EVENTS)?,
            event_key.as_bytes(),
            encode(event)?,
        );
        db.write(batch)?;
        Ok(true)
    }

    fn block_requests(
        &self,
        scope: &BlockScope,
        red_tag_id: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<Vec<RequestId>> {
        self.update_requests_where(
            |request| scope.matches(request) && request.state.is_active(),
            |request| {
                request.state = RequestState::Blocked;
                request.blocked_by_red_tag_id = Some(red_tag_id.to_string());
                request.updated_at = at;
            },
        )
    }

    fn unblock_requests(
        &self,
        red_tag_id: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<Vec<RequestId>> {
        self.update_requests_where(
            |request| request.blocked_by_red_tag_id.as_deref() == Some(red_tag_id),
            |request| {
                request.state = RequestState::Open;
                request.blocked_by_red_tag_id = None;
                request.updated_at = at;
            },
        )
    }

    fn list_events(&self, request_id: Option<&str>) -> StoreResult<Vec<AccountabilityEvent>> {
        let prefix = match request_id {
            Some(id) => keys::request_events(id),
            None => keys::EVENT_PREFIX.to_string(),
        };
        let mut events: Vec<AccountabilityEvent> =
            scan(&self.read()?, schema::CF_EVENTS, &prefix)?;
        sort_events(&mut events);
        Ok(events)
    }
}

impl RedTagRepository for RocksStore {
    fn create_red_tag(&self, red_tag: &RedTag) -> StoreResult<()> {
        let db = self.write()?;
        let key = keys::red_tag(&red_tag.id);
        if get_value::<RedTag>(&db, schema::CF_RED_TAGS, &key)?.is_some() {
            return Err(StoreError::AlreadyExists(red_tag.id.clone()));
        }
        put_value(&db, schema::CF_RED_TAGS, &key, red_tag)
    }

    fn get_red_tag(&self, red_tag_id: &str) -> StoreResult<Option<RedTag>> {
        get_value(&self.read()?, schema::CF_RED_TAGS, &keys::red_tag(red_tag_id))
    }

    fn update_red_tag(&self, red_tag: &RedTag, expected: RedTagState) -> StoreResult<bool> {
        let db = self.write()?;
        let key = keys::red_tag(&red_tag.id);
        match get_value::<RedTag>(&db, schema::CF_RED_TAGS, &key)? {
            None => Err(StoreError::NotFound(red_tag.id.clone())),
            Some(existing) if existing.state != expected => {
                debug!(red_tag_id = %red_tag.id, expected = %expected, "Stale red tag update");
                Ok(false)
            }
            Some(_) => {
                put_value(&db, schema::CF_RED_TAGS, &key, red_tag)?;
                Ok(true)
            }
        }
    }

    fn list_red_tags(&self) -> StoreResult<Vec<RedTag>> {
        let mut tags: Vec<RedTag> = scan(&self.read()?, schema::CF_RED_TAGS, keys::RED_TAG_PREFIX)?;
        tags.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tags)
    }
}
