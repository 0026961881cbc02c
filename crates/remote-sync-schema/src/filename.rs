use crate::FilenameError;
use chrono::{DateTime, NaiveDateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

/// `strftime` layout of the timestamp field (`YYMMDD_HHMMSS`, UTC).
pub const TIMESTAMP_FORMAT: &str = "%y%m%d_%H%M%S";
const LABEL_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Length of the random disambiguator generated for new backups.
pub const RANDOM_TOKEN_LEN: usize = 10;

/// The wire grammar. Archives written by earlier releases must keep decoding,
/// so the version group still accepts the bare `[v0-9.]+` form.
static FILENAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^([a-zA-Z0-9\-]+)_(?:([a-zA-Z0-9\-]+)_)?([0-9]{6}_[0-9]{6})_([a-zA-Z0-9]+)_([v0-9.]+)\.(sql|zip)$",
    )
    .expect("backup filename pattern compiles")
});

/// What a backup artifact contains, carried by its extension.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    /// A database dump (`.sql`).
    Database,
    /// A zip of every registered volume (`.zip`).
    Volumes,
}

impl ArtifactKind {
    pub fn extension(self) -> &'static str {
        match self {
            ArtifactKind::Database => "sql",
            ArtifactKind::Volumes => "zip",
        }
    }

    /// The extension with its leading dot, as passed to provider listings.
    pub fn suffix(self) -> &'static str {
        match self {
            ArtifactKind::Database => ".sql",
            ArtifactKind::Volumes => ".zip",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "sql" => Some(ArtifactKind::Database),
            "zip" => Some(ArtifactKind::Volumes),
            _ => None,
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactKind::Database => f.write_str("database"),
            ArtifactKind::Volumes => f.write_str("volumes"),
        }
    }
}

/// An encoded filename without its extension.
///
/// One stem is generated per push and turned into the final key once the
/// artifact kind is known.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BackupStem(String);

impl BackupStem {
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn filename(&self, kind: ArtifactKind) -> String {
        format!("{}.{}", self.0, kind.extension())
    }
}

impl fmt::Display for BackupStem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Structured metadata recovered from a backup filename.
///
/// A descriptor is a pure function of `filename`: equal filenames always
/// decode to equal descriptors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackupDescriptor {
    pub filename: String,
    pub system_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub random_token: String,
    pub version: String,
    pub kind: ArtifactKind,
    pub label: String,
}

/// Build the canonical stem
/// `{system}_[{environment}_]{YYMMDD_HHMMSS}_{token}_v{version}`, lowercased.
///
/// The system name and environment pass through [`sanitize_token`], so no
/// field ever contains the `_` separator. An environment that sanitizes to
/// nothing is dropped.
pub fn encode_stem(
    system_name: &str,
    environment: Option<&str>,
    timestamp: DateTime<Utc>,
    random_token: &str,
    version: &str,
) -> Result<BackupStem, FilenameError> {
    let system = sanitize_token(system_name);
    if system.is_empty() {
        return Err(FilenameError::EmptySystemName(system_name.to_owned()));
    }

    if random_token.is_empty() || !random_token.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(FilenameError::InvalidToken(random_token.to_owned()));
    }

    let version = normalize_version(version)?;

    let mut stem = system;
    stem.push('_');
    if let Some(env) = environment.map(sanitize_token).filter(|e| !e.is_empty()) {
        stem.push_str(&env);
        stem.push('_');
    }
    stem.push_str(&timestamp.format(TIMESTAMP_FORMAT).to_string());
    stem.push('_');
    stem.push_str(random_token);
    stem.push_str("_v");
    stem.push_str(&version);

    Ok(BackupStem(stem.to_lowercase()))
}

/// Decode a filename against the backup grammar.
///
/// The whole string must match; anything else (missing fields, an unknown
/// extension, an impossible calendar date) yields `None`.
pub fn decode(filename: &str) -> Option<BackupDescriptor> {
    let caps = FILENAME_RE.captures(filename)?;

    let timestamp = NaiveDateTime::parse_from_str(&caps[3], TIMESTAMP_FORMAT)
        .ok()?
        .and_utc();
    let environment = caps.get(2).map(|m| m.as_str().to_owned());
    let kind = ArtifactKind::from_extension(&caps[6])?;

    let mut label = timestamp.format(LABEL_FORMAT).to_string();
    if let Some(env) = &environment {
        label.push_str(&format!(" ({env})"));
    }

    Some(BackupDescriptor {
        filename: filename.to_owned(),
        system_name: caps[1].to_owned(),
        environment,
        timestamp,
        random_token: caps[4].to_owned(),
        version: caps[5].trim_start_matches('v').to_owned(),
        kind,
        label,
    })
}

/// Reduce free text to an ASCII `[a-z0-9-]` token.
///
/// Letters and digits are lowercased and kept, runs of whitespace, `_`, `.`
/// and `-` collapse to a single `-`, and everything else is dropped. Leading
/// and trailing hyphens are trimmed.
pub fn sanitize_token(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
        } else if (ch.is_whitespace() || matches!(ch, '-' | '_' | '.'))
            && !out.is_empty()
            && !out.ends_with('-')
        {
            out.push('-');
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}

/// Strip an optional `v` prefix and keep the leading dotted numeric part, so
/// `4.5.0-beta.1` encodes as `4.5.0`.
pub fn normalize_version(version: &str) -> Result<String, FilenameError> {
    let trimmed = version.trim();
    let bare = trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed);
    let numeric: String = bare
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let numeric = numeric.trim_end_matches('.');
    if numeric.is_empty() || !numeric.starts_with(|c: char| c.is_ascii_digit()) {
        return Err(FilenameError::InvalidVersion(version.to_owned()));
    }
    Ok(numeric.to_owned())
}

/// A fresh lowercase alphanumeric disambiguator.
pub fn generate_random_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(RANDOM_TOKEN_LEN)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect()
}
