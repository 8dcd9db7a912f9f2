//! `.mv` session files.
//!
//! A session records which recording and firings are being curated, the
//! sample rate, and the user's curation state (cluster merges and tags) as
//! pretty-printed JSON.

use crate::Result;
use mountainview_core::ClusterMerge;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

const SESSION_VERSION: u32 = 2;

fn default_version() -> u32 {
    SESSION_VERSION
}

/// Per-cluster curation attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterAttributes {
    /// Free-form tags such as `accepted`, `rejected`, `noise`.
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

/// A curation session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Format version.
    #[serde(default = "default_version")]
    pub version: u32,
    /// Path of the raw or filtered timeseries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeseries: Option<PathBuf>,
    /// Path of the firings array.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firings: Option<PathBuf>,
    /// Sample rate in Hz.
    #[serde(default)]
    pub samplerate: f64,
    /// Merged cluster groups.
    #[serde(default)]
    pub cluster_merge: ClusterMerge,
    /// Attributes keyed by cluster label.
    #[serde(default)]
    pub cluster_attributes: BTreeMap<i32, ClusterAttributes>,
    /// View options carried through unchanged.
    #[serde(default)]
    pub options: BTreeMap<String, serde_json::Value>,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            version: SESSION_VERSION,
            timeseries: None,
            firings: None,
            samplerate: 0.0,
            cluster_merge: ClusterMerge::default(),
            cluster_attributes: BTreeMap::new(),
            options: BTreeMap::new(),
        }
    }
}

impl Session {
    /// Creates an empty session.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a session file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or is not valid JSON.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    /// Saves the session as pretty-printed JSON.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }

    /// Adds `tag` to cluster `k`.
    pub fn tag_cluster(&mut self, k: i32, tag: &str) {
        self.cluster_attributes
            .entry(k)
            .or_default()
            .tags
            .insert(tag.to_string());
    }

    /// Removes `tag` from cluster `k`, dropping empty attribute entries.
    pub fn untag_cluster(&mut self, k: i32, tag: &str) {
        if let Some(attrs) = self.cluster_attributes.get_mut(&k) {
            attrs.tags.remove(tag);
            if attrs.tags.is_empty() {
                self.cluster_attributes.remove(&k);
            }
        }
    }

    /// Tags of cluster `k`.
    #[must_use]
    pub fn cluster_tags(&self, k: i32) -> Vec<&str> {
        self.cluster_attributes
            .get(&k)
            .map(|attrs| attrs.tags.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_save_and_load() {
        let file = NamedTempFile::new().unwrap();
        let mut session = Session::new();
        session.samplerate = 30_000.0;
        session.timeseries = Some(PathBuf::from("raw.mda"));
        session.cluster_merge.merge(&[4, 2]);
        session.tag_cluster(2, "accepted");
        session.save(file.path()).unwrap();

        let loaded = Session::load(file.path()).unwrap();
        assert_eq!(loaded, session);
        assert_eq!(loaded.cluster_merge.representative_label(4), 2);
        assert_eq!(loaded.cluster_tags(2), vec!["accepted"]);
    }

    #[test]
    fn test_missing_fields_default() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), r#"{"samplerate": 20000}"#).unwrap();
        let session = Session::load(file.path()).unwrap();
        assert_eq!(session.version, SESSION_VERSION);
        assert!(session.cluster_merge.is_empty());
        assert!(session.firings.is_none());
    }

    #[test]
    fn test_merge_serialized_as_groups() {
        let mut session = Session::new();
        session.cluster_merge.merge(&[1, 3]);
        let json = serde_json::to_value(&session).unwrap();
        assert_eq!(json["cluster_merge"], serde_json::json!([[1, 3]]));
    }

    #[test]
    fn test_untag_drops_empty_entries() {
        let mut session = Session::new();
        session.tag_cluster(5, "noise");
        session.untag_cluster(5, "noise");
        assert!(session.cluster_attributes.is_empty());
        assert!(session.cluster_tags(5).is_empty());
    }
}
