// Completeness check of OASIS-3 derivatives. Every session folder is expected to hold
// `<sub>_<ses><suffix>` for each required suffix.

use crate::error::{Error, Result};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_REQUIRED_SUFFIXES: [&str; 4] = [
    "_dwi_allruns.bval",
    "_dwi_allruns.bvec",
    "_dwi_allruns.nii.gz",
    "_T1w_preproc.nii.gz",
];

/// one `sub-XXX/ses-XXX` row of a session list
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionEntry {
    pub subject: String,
    pub session: String,
}

impl SessionEntry {
    pub fn folder(&self, root: &Path) -> PathBuf {
        root.join(&self.subject).join(&self.session)
    }

    pub fn prefix(&self) -> String {
        format!("{}_{}", self.subject, self.session)
    }
}

impl fmt::Display for SessionEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.subject, self.session)
    }
}

/// entries of a session list and the rows that could not be split into subject and session.
/// Blank rows and `#` comments are dropped.
pub fn parse_session_list(text: &str) -> (Vec<SessionEntry>, Vec<String>) {
    let mut entries = Vec::new();
    let mut malformed = Vec::new();
    for line in text.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match line.split_once('/') {
            Some((subject, session)) => entries.push(SessionEntry {
                subject: subject.to_string(),
                session: session.to_string(),
            }),
            None => {
                tracing::warn!("Skipping malformed line: {}", line);
                malformed.push(line.to_string());
            }
        }
    }
    (entries, malformed)
}

/// suffixes (in the order given) whose file is absent from the entry's session folder
pub fn files_missing(entry: &SessionEntry, root: &Path, suffixes: &[String]) -> Vec<String> {
    let folder = entry.folder(root);
    let prefix = entry.prefix();
    suffixes
        .iter()
        .filter(|suffix| !folder.join(format!("{prefix}{suffix}")).is_file())
        .cloned()
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct CompletenessReport {
    /// number of entries examined (malformed rows excluded)
    pub checked: usize,
    /// entry -> missing suffixes, ordered by entry
    pub incomplete: BTreeMap<String, Vec<String>>,
    pub malformed: Vec<String>,
}

impl CompletenessReport {
    pub fn is_complete(&self) -> bool {
        self.incomplete.is_empty()
    }

    pub fn render(&self) -> String {
        if self.is_complete() {
            return "All entries complete.\n".to_string();
        }
        let mut out = String::from("Incomplete entries:\n");
        for (entry, missing) in &self.incomplete {
            out.push_str(&format!("  {}: missing {}\n", entry, missing.join(", ")));
        }
        out
    }
}

pub fn check_entries(entries: &[SessionEntry], root: &Path, suffixes: &[String]) -> BTreeMap<String, Vec<String>> {
    entries
        .par_iter()
        .filter_map(|entry| {
            let missing = files_missing(entry, root, suffixes);
            (!missing.is_empty()).then(|| (entry.to_string(), missing))
        })
        .collect::<Vec<_>>()
        .into_iter()
        .collect()
}

/// checks every entry of `list_file` under `root_dir`
pub fn check_derivatives(list_file: impl AsRef<Path>, root_dir: impl AsRef<Path>, suffixes: &[String]) -> Result<CompletenessReport> {
    let root = fs::canonicalize(root_dir.as_ref()).map_err(|_| Error::RootNotFound(root_dir.as_ref().to_path_buf()))?;
    if !root.is_dir() {
        return Err(Error::RootNotFound(root));
    }

    let list_path = list_file.as_ref();
    let text = fs::read_to_string(list_path).map_err(|source| Error::InputNotFound { path: list_path.to_path_buf(), source })?;
    let (entries, malformed) = parse_session_list(&text);
    tracing::info!("checking {} entries under {}", entries.len(), root.display());

    let incomplete = check_entries(&entries, &root, suffixes);
    Ok(CompletenessReport {
        checked: entries.len(),
        incomplete,
        malformed,
    })
}
