/*
 * trust.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Gemello, a Gemini protocol client.
 *
 * Gemello is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Gemello is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Gemello.  If not, see <http://www.gnu.org/licenses/>.
 */

//! Trust records: one pinned certificate fingerprint per host.
//!
//! The client consults and updates the store during the TLS handshake but never owns it.
//! Backends: process memory, a known-hosts file (one `host fingerprint` line per record),
//! and the system keychain. Fingerprints are opaque strings here; nothing checks their format.
//!
//! Two concurrent first-contact fetches to the same unknown host both call `save`; the last
//! writer wins. No backend serializes across processes.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use keyring::Entry;

use crate::error::TrustStoreError;

/// Service name for keyring entries (one entry per host).
const KEYRING_SERVICE: &str = "gemello-known-hosts";

/// Per-host fingerprint persistence.
pub trait TrustStore: Send + Sync {
    /// Pinned fingerprint for `host`, or `None` if the host has never been seen.
    fn get(&self, host: &str) -> Result<Option<String>, TrustStoreError>;
    /// Pin `fingerprint` for `host`, replacing any existing record.
    fn save(&self, host: &str, fingerprint: &str) -> Result<(), TrustStoreError>;
    /// Forget `host`. No-op if there is no record.
    fn delete(&self, host: &str) -> Result<(), TrustStoreError>;
}

impl<T: TrustStore + ?Sized> TrustStore for Arc<T> {
    fn get(&self, host: &str) -> Result<Option<String>, TrustStoreError> {
        (**self).get(host)
    }

    fn save(&self, host: &str, fingerprint: &str) -> Result<(), TrustStoreError> {
        (**self).save(host, fingerprint)
    }

    fn delete(&self, host: &str) -> Result<(), TrustStoreError> {
        (**self).delete(host)
    }
}

fn lock_err<T>(_: std::sync::PoisonError<T>) -> TrustStoreError {
    TrustStoreError::unavailable("trust store lock poisoned")
}

/// In-memory store; records live as long as the value.
#[derive(Debug, Default)]
pub struct MemoryTrustStore {
    records: Mutex<HashMap<String, String>>,
}

impl MemoryTrustStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of pinned hosts.
    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TrustStore for MemoryTrustStore {
    fn get(&self, host: &str) -> Result<Option<String>, TrustStoreError> {
        Ok(self.records.lock().map_err(lock_err)?.get(host).cloned())
    }

    fn save(&self, host: &str, fingerprint: &str) -> Result<(), TrustStoreError> {
        self.records
            .lock()
            .map_err(lock_err)?
            .insert(host.to_string(), fingerprint.to_string());
        Ok(())
    }

    fn delete(&self, host: &str) -> Result<(), TrustStoreError> {
        self.records.lock().map_err(lock_err)?.remove(host);
        Ok(())
    }
}

/// Known-hosts file: `host fingerprint` per line, `#` comments and blank lines ignored.
/// Every save or delete writes a temporary sibling (mode 0o600 on unix) and renames it over
/// the file.
#[derive(Debug)]
pub struct FileTrustStore {
    path: PathBuf,
    // Serializes read-modify-write within this process.
    guard: Mutex<()>,
}

impl FileTrustStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
        }
    }

    /// Store at ~/.gemello/known_hosts. `None` when HOME is not set.
    pub fn open_default() -> Option<Self> {
        crate::config::default_trust_path().map(Self::new)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Vec<(String, String)>, TrustStoreError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(parse_known_hosts(&content))
    }

    fn store(&self, records: &[(String, String)]) -> Result<(), TrustStoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut out = String::new();
        for (host, fingerprint) in records {
            out.push_str(host);
            out.push(' ');
            out.push_str(fingerprint);
            out.push('\n');
        }
        // The store file is only ever replaced whole, by rename.
        let tmp = self.temp_path();
        // Leftover from an interrupted write; recreating it applies the private mode.
        let _ = fs::remove_file(&tmp);
        let written = open_for_write(&tmp).and_then(|mut f| {
            f.write_all(out.as_bytes())?;
            f.sync_all()
        });
        if let Err(e) = written.and_then(|()| fs::rename(&tmp, &self.path)) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }

    /// Sibling of the store file: `known_hosts` becomes `.known_hosts.tmp`.
    fn temp_path(&self) -> PathBuf {
        let mut name = std::ffi::OsString::from(".");
        name.push(self.path.file_name().unwrap_or_else(|| "known_hosts".as_ref()));
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[cfg(unix)]
fn open_for_write(path: &Path) -> io::Result<fs::File> {
    use std::os::unix::fs::OpenOptionsExt;
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn open_for_write(path: &Path) -> io::Result<fs::File> {
    OpenOptions::new().write(true).create(true).truncate(true).open(path)
}

fn parse_known_hosts(content: &str) -> Vec<(String, String)> {
    let mut out: Vec<(String, String)> = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut parts = line.split_whitespace();
        if let (Some(host), Some(fingerprint)) = (parts.next(), parts.next()) {
            // A later line for the same host replaces an earlier one.
            out.retain(|(h, _)| h != host);
            out.push((host.to_string(), fingerprint.to_string()));
        }
    }
    out
}

impl TrustStore for FileTrustStore {
    fn get(&self, host: &str) -> Result<Option<String>, TrustStoreError> {
        let _g = self.guard.lock().map_err(lock_err)?;
        Ok(self
            .load()?
            .into_iter()
            .find(|(h, _)| h == host)
            .map(|(_, fp)| fp))
    }

    fn save(&self, host: &str, fingerprint: &str) -> Result<(), TrustStoreError> {
        if host.is_empty() || host.contains(char::is_whitespace) {
            return Err(TrustStoreError::unavailable(format!("cannot record host {:?}", host)));
        }
        if fingerprint.is_empty() || fingerprint.contains(char::is_whitespace) {
            return Err(TrustStoreError::unavailable("cannot record fingerprint containing whitespace"));
        }
        let _g = self.guard.lock().map_err(lock_err)?;
        let mut records = self.load()?;
        match records.iter_mut().find(|(h, _)| h == host) {
            Some(record) => record.1 = fingerprint.to_string(),
            None => records.push((host.to_string(), fingerprint.to_string())),
        }
        self.store(&records)
    }

    fn delete(&self, host: &str) -> Result<(), TrustStoreError> {
        let _g = self.guard.lock().map_err(lock_err)?;
        let mut records = self.load()?;
        let before = records.len();
        records.retain(|(h, _)| h != host);
        if records.len() == before {
            return Ok(());
        }
        self.store(&records)
    }
}

/// System keychain store: one keyring entry per host under the `gemello-known-hosts` service.
#[derive(Debug, Default)]
pub struct KeyringTrustStore;

impl KeyringTrustStore {
    pub fn new() -> Self {
        Self
    }

    /// Probe: create and delete a dummy entry. Returns true if the keychain is usable.
    pub fn available() -> bool {
        let entry = match Entry::new(KEYRING_SERVICE, "__gemello_probe__") {
            Ok(e) => e,
            Err(_) => return false,
        };
        if entry.set_password("probe").is_err() {
            return false;
        }
        let _ = entry.delete_credential();
        true
    }

    fn entry(host: &str) -> Result<Entry, TrustStoreError> {
        Entry::new(KEYRING_SERVICE, host).map_err(|e| TrustStoreError::unavailable(e.to_string()))
    }
}

impl TrustStore for KeyringTrustStore {
    fn get(&self, host: &str) -> Result<Option<String>, TrustStoreError> {
        match Self::entry(host)?.get_password() {
            Ok(fp) => Ok(Some(fp)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(TrustStoreError::unavailable(e.to_string())),
        }
    }

    fn save(&self, host: &str, fingerprint: &str) -> Result<(), TrustStoreError> {
        Self::entry(host)?
            .set_password(fingerprint)
            .map_err(|e| TrustStoreError::unavailable(e.to_string()))
    }

    fn delete(&self, host: &str) -> Result<(), TrustStoreError> {
        match Self::entry(host)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(TrustStoreError::unavailable(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_get_save_delete() {
        let store = MemoryTrustStore::new();
        assert_eq!(store.get("a.example").unwrap(), None);
        store.save("a.example", "fp1").unwrap();
        assert_eq!(store.get("a.example").unwrap().as_deref(), Some("fp1"));
        store.save("a.example", "fp2").unwrap();
        assert_eq!(store.get("a.example").unwrap().as_deref(), Some("fp2"));
        assert_eq!(store.len(), 1);
        store.delete("a.example").unwrap();
        store.delete("a.example").unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn file_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("known_hosts");
        let store = FileTrustStore::new(&path);
        assert_eq!(store.get("a.example").unwrap(), None);
        store.save("a.example", "AAAA").unwrap();
        store.save("b.example", "BBBB").unwrap();
        store.save("a.example", "CCCC").unwrap();

        let reopened = FileTrustStore::new(&path);
        assert_eq!(reopened.get("a.example").unwrap().as_deref(), Some("CCCC"));
        assert_eq!(reopened.get("b.example").unwrap().as_deref(), Some("BBBB"));

        reopened.delete("a.example").unwrap();
        reopened.delete("missing.example").unwrap();
        assert_eq!(store.get("a.example").unwrap(), None);
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "b.example BBBB\n");
    }

    #[cfg(unix)]
    #[test]
    fn file_store_is_private() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("known_hosts");
        FileTrustStore::new(&path).save("h", "fp").unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn file_store_replaces_file_without_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("known_hosts");
        // A temp file left behind by an interrupted write is overwritten, not appended to.
        fs::write(dir.path().join(".known_hosts.tmp"), "stale.example OLD\n").unwrap();
        let store = FileTrustStore::new(&path);
        store.save("a.example", "AAAA").unwrap();
        store.save("b.example", "BBBB").unwrap();
        store.delete("a.example").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "b.example BBBB\n");
        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("known_hosts")]);
    }

    #[test]
    fn failed_write_keeps_existing_pins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("known_hosts");
        let store = FileTrustStore::new(&path);
        store.save("a.example", "AAAA").unwrap();
        // A directory in the temp file's place makes the write fail.
        fs::create_dir(dir.path().join(".known_hosts.tmp")).unwrap();
        assert!(store.save("b.example", "BBBB").is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), "a.example AAAA\n");
        assert_eq!(store.get("a.example").unwrap().as_deref(), Some("AAAA"));
    }

    #[test]
    fn file_store_rejects_whitespace() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTrustStore::new(dir.path().join("known_hosts"));
        assert!(store.save("bad host", "fp").is_err());
        assert!(store.save("host", "f p").is_err());
    }

    #[test]
    fn parse_skips_comments_and_keeps_last() {
        let records = parse_known_hosts("# pinned\n\na.example X\nb.example Y\na.example Z\ngarbage\n");
        assert_eq!(
            records,
            vec![
                ("b.example".to_string(), "Y".to_string()),
                ("a.example".to_string(), "Z".to_string()),
            ]
        );
    }

    #[test]
    #[ignore] // requires a system keychain; run with: cargo test -- --ignored
    fn keyring_get_save_delete() {
        let store = KeyringTrustStore::new();
        let host = "gemello-test.invalid";
        store.save(host, "fp").unwrap();
        assert_eq!(store.get(host).unwrap().as_deref(), Some("fp"));
        store.delete(host).unwrap();
        store.delete(host).unwrap();
        assert_eq!(store.get(host).unwrap(), None);
    }

    #[test]
    fn unreadable_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the file should be cannot be read as text.
        let store = FileTrustStore::new(dir.path());
        assert!(store.get("a.example").is_err());
    }
}
