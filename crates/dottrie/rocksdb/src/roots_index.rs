// Dotlanth
// Copyright (C) 2025 Synerthink

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! RocksDB-backed versioned roots index
//!
//! Roots live in the `roots` column family. Version keys are 8-byte
//! big-endian integers so lexicographic order equals numeric order and
//! range queries are simple iterator scans; two sentinel keys track the
//! latest root and the highest recorded version. An optional one-byte
//! namespace prefix isolates multiple logical trees in one family.

use crate::namespace::{KeyPrefixer, NamespaceOptions};
use crate::session::SessionStore;
use crate::{backend_err, missing_cf, open_db, CF_ROOTS};
use byteorder::{BigEndian, ByteOrder};
use dottrie_core::hash::Hash;
use dottrie_core::store::{RootsIndex, StoreError, StoreResult};
use rocksdb::{DB, Direction, IteratorMode};
use std::path::Path;
use std::sync::Arc;

const LATEST_KEY: &[u8] = b"LATEST";
const LAST_VERSION_KEY: &[u8] = b"VERSION";

/// Versioned root index over RocksDB, optionally namespaced.
#[derive(Clone)]
pub struct RocksDbRootsIndex {
    db: Arc<DB>,
    prefixer: KeyPrefixer,
}

impl RocksDbRootsIndex {
    /// Opens (or creates) a database at `path` with the default
    /// namespace.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::open_with(path, NamespaceOptions::defaults())
    }

    /// Opens with an explicit namespace.
    pub fn open_with(path: impl AsRef<Path>, namespace: NamespaceOptions) -> StoreResult<Self> {
        Ok(Self {
            db: Arc::new(open_db(path.as_ref())?),
            prefixer: KeyPrefixer::new(namespace),
        })
    }

    /// Shares an already-open database.
    pub fn from_db(db: Arc<DB>, namespace: NamespaceOptions) -> Self {
        Self {
            db,
            prefixer: KeyPrefixer::new(namespace),
        }
    }

    fn read(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        let cf = self.db.cf_handle(CF_ROOTS).ok_or_else(|| missing_cf(CF_ROOTS))?;
        self.db.get_cf(cf, self.prefixer.apply(key)).map_err(backend_err)
    }

    fn write(&self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        let cf = self.db.cf_handle(CF_ROOTS).ok_or_else(|| missing_cf(CF_ROOTS))?;
        self.db.put_cf(cf, self.prefixer.apply(key), value).map_err(backend_err)
    }

    fn as_root(bytes: Vec<u8>) -> StoreResult<Hash> {
        bytes.try_into().map_err(|b: Vec<u8>| StoreError::Corrupt(format!("root entry has {} bytes, expected 32", b.len())))
    }

    /// All roots in the inclusive version range, ascending.
    pub fn list_range(&self, from: u64, to: u64) -> StoreResult<Vec<(u64, Hash)>> {
        let mut results = Vec::new();
        if from > to {
            return Ok(results);
        }
        let cf = self.db.cf_handle(CF_ROOTS).ok_or_else(|| missing_cf(CF_ROOTS))?;
        let start = self.prefixer.apply(&version_key(from));
        for item in self.db.iterator_cf(cf, IteratorMode::From(&start, Direction::Forward)) {
            let (key, value) = item.map_err(backend_err)?;
            let Some(unprefixed) = self.prefixer.strip(&key) else {
                break; // left our namespace
            };
            if unprefixed.len() != 8 {
                continue; // sentinel keys
            }
            let version = BigEndian::read_u64(unprefixed);
            if version > to {
                break;
            }
            results.push((version, Self::as_root(value.into_vec())?));
        }
        Ok(results)
    }

    /// Highest version recorded so far.
    pub fn last_version(&self) -> StoreResult<Option<u64>> {
        match self.read(LAST_VERSION_KEY)? {
            Some(bytes) if bytes.len() == 8 => Ok(Some(BigEndian::read_u64(&bytes))),
            Some(bytes) => Err(StoreError::Corrupt(format!("version marker has {} bytes, expected 8", bytes.len()))),
            None => Ok(None),
        }
    }

    /// Allocates the next version number, persisting the marker.
    pub fn next_version(&self) -> StoreResult<u64> {
        let next = self.last_version()?.map_or(0, |v| v + 1);
        let mut marker = [0u8; 8];
        BigEndian::write_u64(&mut marker, next);
        self.write(LAST_VERSION_KEY, &marker)?;
        Ok(next)
    }

    /// Stages a root entry (plus latest/last-version maintenance) into a
    /// session batch instead of writing directly.
    pub fn put_in_session(&self, session: &mut SessionStore<'_>, version: u64, root: &Hash) -> StoreResult<()> {
        session.put_cf(CF_ROOTS, &self.prefixer.apply(&version_key(version)), root)?;
        session.put_cf(CF_ROOTS, &self.prefixer.apply(LATEST_KEY), root)?;
        if self.last_version()?.is_none_or(|last| version > last) {
            let mut marker = [0u8; 8];
            BigEndian::write_u64(&mut marker, version);
            session.put_cf(CF_ROOTS, &self.prefixer.apply(LAST_VERSION_KEY), &marker)?;
        }
        Ok(())
    }

    /// Stages removal of a root entry into a session batch.
    pub fn delete_in_session(&self, session: &mut SessionStore<'_>, version: u64) -> StoreResult<()> {
        session.delete_cf(CF_ROOTS, &self.prefixer.apply(&version_key(version)))
    }
}

impl RootsIndex for RocksDbRootsIndex {
    fn put(&mut self, version: u64, root: &Hash) -> StoreResult<()> {
        self.write(&version_key(version), root)?;
        self.write(LATEST_KEY, root)?;
        if self.last_version()?.is_none_or(|last| version > last) {
            let mut marker = [0u8; 8];
            BigEndian::write_u64(&mut marker, version);
            self.write(LAST_VERSION_KEY, &marker)?;
        }
        Ok(())
    }

    fn get(&self, version: u64) -> StoreResult<Option<Hash>> {
        self.read(&version_key(version))?.map(Self::as_root).transpose()
    }

    fn latest(&self) -> StoreResult<Option<Hash>> {
        self.read(LATEST_KEY)?.map(Self::as_root).transpose()
    }
}

fn version_key(version: u64) -> [u8; 8] {
    let mut key = [0u8; 8];
    BigEndian::write_u64(&mut key, version);
    key
}
