use crate::filename::{decode, BackupDescriptor};
use serde::{Deserialize, Serialize};

/// A label/value pair for presenting a backup to a user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackupOption {
    pub label: String,
    pub value: String,
}

/// Decoded backups ordered newest-first, plus the keys that did not decode.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Catalog {
    pub backups: Vec<BackupDescriptor>,
    /// Keys that did not match the filename grammar, in input order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<String>,
}

impl Catalog {
    pub fn len(&self) -> usize {
        self.backups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backups.is_empty()
    }

    pub fn find(&self, filename: &str) -> Option<&BackupDescriptor> {
        self.backups.iter().find(|b| b.filename == filename)
    }

    pub fn options(&self) -> Vec<BackupOption> {
        self.backups
            .iter()
            .map(|b| BackupOption {
                label: b.label.clone(),
                value: b.filename.clone(),
            })
            .collect()
    }
}

/// Decode every filename, drop the undecodable ones, and sort the rest by
/// timestamp descending. The sort is stable: backups sharing a timestamp keep
/// their input order.
pub fn catalog<I, S>(filenames: I) -> Catalog
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = Catalog::default();
    for name in filenames {
        let name = name.as_ref();
        match decode(name) {
            Some(descriptor) => out.backups.push(descriptor),
            None => out.skipped.push(name.to_owned()),
        }
    }
    out.backups.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    out
}
