//! The in-memory archive model: an ordered map of entries plus a baseline
//! snapshot for revert, and the `Matcher` selector used to batch-apply
//! mutations (spec.md §4.4).

use std::collections::HashMap;

use regex::Regex;
use tracing::info;

use crate::byteio::ByteIO;
use crate::entry::{Data, EncryptionMethod, ZipEntry};
use crate::error::{Result, SZipError};

/// Ordered map of entries plus an optional baseline snapshot captured at
/// open time, used to service `revert_*`.
#[derive(Debug, Default)]
pub struct Container {
    order: Vec<String>,
    entries: HashMap<String, ZipEntry>,
    archive_comment: String,
    baseline: Option<Baseline>,
}

#[derive(Debug, Clone)]
struct Baseline {
    order: Vec<String>,
    entries: HashMap<String, ZipEntry>,
    comment: String,
}

impl Container {
    /// An empty container with no baseline (nothing to revert to).
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps a freshly-mounted set of entries as the container's baseline,
    /// used by [`crate::codec::reader::open`].
    pub(crate) fn from_mounted(order: Vec<String>, entries: HashMap<String, ZipEntry>, comment: String) -> Self {
        let baseline = Baseline {
            order: order.clone(),
            entries: entries.clone(),
            comment: comment.clone(),
        };
        Self {
            order,
            entries,
            archive_comment: comment,
            baseline: Some(baseline),
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn get(&self, name: &str) -> Option<&ZipEntry> {
        self.entries.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut ZipEntry> {
        self.entries.get_mut(name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Inserts a new entry, or replaces an existing one with the same name
    /// in place (preserving its position in insertion order).
    pub fn put(&mut self, entry: ZipEntry) {
        let name = entry.name().to_string();
        if !self.entries.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.entries.insert(name, entry);
    }

    /// Convenience wrapper matching the façade's `put(name, bytes, ...)`
    /// call shape (spec.md §6): builds a `ZipEntry` carrying owned bytes
    /// and inserts it.
    pub fn put_bytes(&mut self, name: impl Into<String>, bytes: Vec<u8>) -> Result<()> {
        let entry = ZipEntry::new_file(name, Data::NewBytes(bytes))?;
        self.put(entry);
        Ok(())
    }

    pub fn delete(&mut self, name: &str) -> bool {
        if self.entries.remove(name).is_some() {
            self.order.retain(|n| n != name);
            true
        } else {
            false
        }
    }

    pub fn delete_by_regex(&mut self, pattern: &str) -> Result<usize> {
        let re = Regex::new(pattern).map_err(|e| SZipError::InvalidArgument(e.to_string()))?;
        let doomed: Vec<String> = self.order.iter().filter(|n| re.is_match(n)).cloned().collect();
        for name in &doomed {
            self.delete(name);
        }
        Ok(doomed.len())
    }

    /// Renames an entry, failing if `new` already exists (spec.md §4.4).
    pub fn rename(&mut self, old: &str, new: &str) -> Result<()> {
        if self.entries.contains_key(new) {
            return Err(SZipError::DuplicateEntry(new.to_string()));
        }
        let entry = self
            .entries
            .remove(old)
            .ok_or_else(|| SZipError::EntryNotFound(old.to_string()))?;
        let renamed = entry.rename(new)?;
        if let Some(pos) = self.order.iter().position(|n| n == old) {
            self.order[pos] = new.to_string();
        }
        self.entries.insert(new.to_string(), renamed);
        Ok(())
    }

    /// Sorts entries by name using the caller's comparator (spec.md §4.4).
    pub fn sort_by_name<F>(&mut self, mut cmp: F)
    where
        F: FnMut(&str, &str) -> std::cmp::Ordering,
    {
        self.order.sort_by(|a, b| cmp(a, b));
    }

    /// Sorts entries by their full metadata using the caller's comparator
    /// (spec.md §4.4).
    pub fn sort_by_entry<F>(&mut self, mut cmp: F)
    where
        F: FnMut(&ZipEntry, &ZipEntry) -> std::cmp::Ordering,
    {
        let entries = &self.entries;
        self.order.sort_by(|a, b| cmp(&entries[a], &entries[b]));
    }

    pub fn set_archive_comment(&mut self, comment: impl Into<String>) -> Result<()> {
        let comment = comment.into();
        if comment.len() > 65_535 {
            return Err(SZipError::InvalidArgument(
                "archive comment exceeds 65,535 bytes".into(),
            ));
        }
        self.archive_comment = comment;
        Ok(())
    }

    pub fn archive_comment(&self) -> &str {
        &self.archive_comment
    }

    /// Propagates a read password to every baseline entry that reports
    /// itself encrypted (spec.md §4.4).
    pub fn set_read_password(&mut self, password: impl Into<String>) {
        let password = password.into();
        let names: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, e)| e.encryption_method().is_encrypted())
            .map(|(n, _)| n.clone())
            .collect();
        for name in names {
            if let Some(e) = self.entries.get_mut(&name) {
                e.set_password(Some(password.clone()), Some(e.encryption_method()));
            }
        }
    }

    pub fn set_read_password_entry(&mut self, name: &str, password: impl Into<String>) -> Result<()> {
        let entry = self
            .entries
            .get_mut(name)
            .ok_or_else(|| SZipError::EntryNotFound(name.to_string()))?;
        let method = entry.encryption_method();
        entry.set_password(Some(password.into()), Some(method));
        Ok(())
    }

    /// Restores every entry and the archive comment to the open-time
    /// baseline. A no-op on a container with no baseline (never opened
    /// from an existing archive).
    pub fn revert_all(&mut self) {
        if let Some(baseline) = self.baseline.clone() {
            self.order = baseline.order;
            self.entries = baseline.entries;
            self.archive_comment = baseline.comment;
            info!("reverted container to its open-time baseline");
        }
    }

    pub fn revert_comment(&mut self) {
        if let Some(baseline) = &self.baseline {
            self.archive_comment = baseline.comment.clone();
        }
    }

    /// Restores a single entry from baseline, or does nothing if there is
    /// no baseline or the entry didn't exist there (spec.md §4.4).
    pub fn revert_entry(&mut self, name: &str) {
        let Some(baseline) = &self.baseline else {
            return;
        };
        match baseline.entries.get(name) {
            Some(original) => {
                let original = original.clone();
                if !self.entries.contains_key(name) {
                    self.order.push(name.to_string());
                }
                self.entries.insert(name.to_string(), original);
            }
            None => {
                self.delete(name);
            }
        }
    }

    pub fn matcher(&mut self) -> Matcher<'_> {
        Matcher::new(self)
    }

    /// Mounts an existing archive read through `reader` (spec.md §4.5).
    pub fn open<R: ByteIO + 'static>(reader: R) -> Result<Self> {
        crate::codec::reader::open(reader)
    }

    /// Serializes this container to `writer` (spec.md §4.6).
    pub fn write_to<W: ByteIO>(&self, writer: &mut W) -> Result<()> {
        crate::codec::writer::serialize(self, writer)
    }

    /// Decodes an entry's plaintext: decrypts, decompresses, and verifies
    /// its CRC-32 as needed (spec.md §4.5).
    pub fn get_bytes(&self, name: &str) -> Result<Vec<u8>> {
        let entry = self.get(name).ok_or_else(|| SZipError::EntryNotFound(name.to_string()))?;
        crate::codec::reader::get_bytes(entry)
    }

    /// Same decode pipeline as [`Container::get_bytes`], handed back as a
    /// reader instead of a fully materialized buffer (spec.md §4.5,
    /// SPEC_FULL.md §4).
    pub fn get_reader(&self, name: &str) -> Result<std::io::Cursor<Vec<u8>>> {
        Ok(std::io::Cursor::new(self.get_bytes(name)?))
    }

    /// The open-time snapshot of `name`, if this container was mounted from
    /// an existing archive and `name` existed in it. Used by the writer's
    /// copy-vs-rebuild decision (spec.md §4.6).
    pub(crate) fn baseline_entry(&self, name: &str) -> Option<&ZipEntry> {
        self.baseline.as_ref().and_then(|b| b.entries.get(name))
    }
}

/// A selector built up by `add`/`match`/`all`, then applied to the
/// container in one batch operation (spec.md §4.4).
pub struct Matcher<'c> {
    container: &'c mut Container,
    selected: Vec<String>,
}

impl<'c> Matcher<'c> {
    fn new(container: &'c mut Container) -> Self {
        Self {
            container,
            selected: Vec::new(),
        }
    }

    pub fn add(mut self, name: &str) -> Self {
        if self.container.has(name) && !self.selected.iter().any(|n| n == name) {
            self.selected.push(name.to_string());
        }
        self
    }

    pub fn add_many<I: IntoIterator<Item = S>, S: AsRef<str>>(mut self, names: I) -> Self {
        for name in names {
            self = self.add(name.as_ref());
        }
        self
    }

    pub fn matching(mut self, pattern: &str) -> Result<Self> {
        let re = Regex::new(pattern).map_err(|e| SZipError::InvalidArgument(e.to_string()))?;
        for name in self.container.order.clone() {
            if re.is_match(&name) && !self.selected.iter().any(|n| n == &name) {
                self.selected.push(name);
            }
        }
        Ok(self)
    }

    pub fn all(mut self) -> Self {
        self.selected = self.container.order.clone();
        self
    }

    pub fn count(&self) -> usize {
        self.selected.len()
    }

    pub fn get_matches(&self) -> Vec<&ZipEntry> {
        self.selected
            .iter()
            .filter_map(|n| self.container.entries.get(n))
            .collect()
    }

    pub fn invoke<F: FnMut(&mut ZipEntry)>(self, mut f: F) -> Self {
        for name in &self.selected {
            if let Some(e) = self.container.entries.get_mut(name) {
                f(e);
            }
        }
        self
    }

    pub fn delete(self) -> usize {
        let mut count = 0;
        for name in &self.selected {
            if self.container.delete(name) {
                count += 1;
            }
        }
        count
    }

    /// Sets a password on every selected non-directory entry (spec.md
    /// §4.4: "skips directory entries").
    pub fn set_password(self, password: &str, method: Option<EncryptionMethod>) -> Self {
        self.invoke(|e| {
            if !e.is_directory() {
                e.set_password(Some(password.to_string()), method);
            }
        })
    }

    pub fn set_encryption_method(self, method: EncryptionMethod) -> Self {
        self.invoke(|e| {
            if !e.is_directory() {
                e.set_password(e.password().map(str::to_string), Some(method));
            }
        })
    }

    pub fn disable_encryption(self) -> Self {
        self.invoke(|e| {
            if !e.is_directory() {
                e.disable_encryption();
            }
        })
    }
}
