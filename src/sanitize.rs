// Normalizes an OASIS-3 tree into <root>/<sub>/<ses>/<modality dir>/<sub>_<ses>[_<run>]_<modality>.nii.gz,
// removing DWI series that lost their gradient sidecars and pruning empty directories.

use crate::error::{Error, Result};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

const NII_GZ: &str = ".nii.gz";
const SUBJECT_PREFIX: &str = "sub-OAS3";

/// the parts of a well-formed OASIS-3 image file name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OasisName {
    /// e.g. sub-OAS30001
    pub subject: String,
    /// e.g. ses-d0129
    pub session: String,
    /// e.g. run-01
    pub run: Option<String>,
    /// e.g. T1w, dwi
    pub modality: String,
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn is_word(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_alphanumeric() || c == '_')
}

impl OasisName {
    /// parses `sub-OAS3<digits>_ses-d<digits>[_run-<digits>]_<modality>.nii.gz`. The common
    /// `sess-` typo is corrected first.
    pub fn parse(file_name: &str) -> Option<Self> {
        let corrected = file_name.replace("sess-", "ses-");
        let stem = corrected.strip_suffix(NII_GZ)?;

        let (subject, rest) = stem.split_once("_ses-")?;
        if !is_digits(subject.strip_prefix(SUBJECT_PREFIX)?) {
            return None;
        }

        let (session_digits, tail) = rest.strip_prefix('d')?.split_once('_')?;
        if !is_digits(session_digits) {
            return None;
        }

        let (run, modality) = match tail.strip_prefix("run-").and_then(|t| t.split_once('_')) {
            Some((run_digits, modality)) if is_digits(run_digits) => (Some(format!("run-{run_digits}")), modality),
            _ => (None, tail),
        };
        if !is_word(modality) {
            return None;
        }

        Some(Self {
            subject: subject.to_string(),
            session: format!("ses-d{session_digits}"),
            run,
            modality: modality.to_string(),
        })
    }

    pub fn canonical_file_name(&self) -> String {
        match &self.run {
            Some(run) => format!("{}_{}_{}_{}{NII_GZ}", self.subject, self.session, run, self.modality),
            None => format!("{}_{}_{}{NII_GZ}", self.subject, self.session, self.modality),
        }
    }

    /// T1w images live under `anat`, everything else under a folder named after the modality
    pub fn modality_dir(&self) -> &str {
        if self.modality == "T1w" {
            "anat"
        } else {
            &self.modality
        }
    }

    pub fn canonical_path(&self, root: &Path) -> PathBuf {
        root.join(&self.subject)
            .join(&self.session)
            .join(self.modality_dir())
            .join(self.canonical_file_name())
    }

    fn is_dwi(&self) -> bool {
        self.modality == "dwi"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Level {
    Info,
    Warn,
    Error,
}

/// mirrors every message to tracing and to a timestamped log file
pub struct CleanupLog {
    path: PathBuf,
    file: File,
}

impl CleanupLog {
    pub fn create(log_dir: impl AsRef<Path>) -> Result<Self> {
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let path = log_dir.as_ref().join(format!("cleanup_log_{stamp}.txt"));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| Error::OutputWrite { path: path.clone(), source })?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn record(&mut self, level: Level, message: &str) -> Result<()> {
        let tag = match level {
            Level::Info => {
                tracing::info!("{}", message);
                "INFO"
            }
            Level::Warn => {
                tracing::warn!("{}", message);
                "WARN"
            }
            Level::Error => {
                tracing::error!("{}", message);
                "ERROR"
            }
        };
        writeln!(self.file, "[{tag}] {message}").map_err(|source| Error::OutputWrite { path: self.path.clone(), source })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// (from, to) for every image and sidecar moved
    pub moved: Vec<(PathBuf, PathBuf)>,
    /// DWI images dropped because a gradient sidecar was missing
    pub removed: Vec<PathBuf>,
    /// images whose name did not parse
    pub skipped: Vec<PathBuf>,
    pub removed_dirs: Vec<PathBuf>,
    /// DWI images still lacking a .bval, .bvec or .json after cleanup
    pub missing_sidecars: Vec<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SanitizeOptions {
    /// log every action without changing the filesystem
    pub dry_run: bool,
}

fn sibling(file: &Path, stem: &str, ext: &str) -> PathBuf {
    file.with_file_name(format!("{stem}{ext}"))
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(Error::io(path, e)),
        _ => Ok(()),
    }
}

fn move_file(from: &Path, to: &Path) -> Result<()> {
    fs::rename(from, to).map_err(|e| Error::io(from, e))
}

/// sorted paths matching `pattern` relative to `root`
fn glob_under(root: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let root_str = root
        .to_str()
        .ok_or_else(|| Error::InvalidParams(format!("root path {} is not valid UTF-8", root.display())))?;
    let full = format!("{}/{}", glob::Pattern::escape(root_str), pattern);
    let mut paths = glob::glob(&full)
        .map_err(|e| Error::InvalidParams(format!("bad glob pattern {full}: {e}")))?
        .map(|entry| entry.map_err(|e| Error::io(e.path().to_path_buf(), e.into_error())))
        .collect::<Result<Vec<_>>>()?;
    paths.sort();
    Ok(paths)
}

/// runs the full cleanup of `root`, writing the log into `log`
pub fn sanitize_dataset(root: impl AsRef<Path>, options: SanitizeOptions, log: &mut CleanupLog) -> Result<CleanupReport> {
    let root = fs::canonicalize(root.as_ref()).map_err(|_| Error::RootNotFound(root.as_ref().to_path_buf()))?;
    if !root.is_dir() {
        return Err(Error::RootNotFound(root));
    }
    let dry_run = options.dry_run;
    let mut report = CleanupReport::default();

    // collected up front so files moved below are not visited twice
    let images = glob_under(&root, "**/*.nii.gz")?;
    tracing::info!("found {} images under {}", images.len(), root.display());

    for file in images {
        let Some(file_name) = file.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
            continue;
        };
        let Some(name) = OasisName::parse(&file_name) else {
            log.record(Level::Warn, &format!("Skipping unexpected file format: {}", file.display()))?;
            report.skipped.push(file);
            continue;
        };
        let old_stem = file_name.strip_suffix(NII_GZ).unwrap_or(&file_name).to_string();

        if name.is_dwi() {
            let bval = sibling(&file, &old_stem, ".bval");
            let bvec = sibling(&file, &old_stem, ".bvec");
            if !bval.exists() || !bvec.exists() {
                log.record(Level::Warn, &format!("Removing incomplete DWI (missing bval or bvec): {}", file.display()))?;
                if !dry_run {
                    remove_if_exists(&file)?;
                    remove_if_exists(&sibling(&file, &old_stem, ".json"))?;
                    remove_if_exists(&bval)?;
                    remove_if_exists(&bvec)?;
                }
                report.removed.push(file);
                continue;
            }
        }

        let correct_path = name.canonical_path(&root);
        if file == correct_path {
            continue;
        }

        if !dry_run {
            if let Some(dir) = correct_path.parent() {
                fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;
            }
        }

        log.record(Level::Info, &format!("Moving {} -> {}", file.display(), correct_path.display()))?;
        if !dry_run {
            move_file(&file, &correct_path)?;
        }
        report.moved.push((file.clone(), correct_path.clone()));

        let new_stem = name.canonical_file_name();
        let new_stem = new_stem.strip_suffix(NII_GZ).unwrap_or(&new_stem);
        let extensions: &[&str] = if name.is_dwi() { &[".bval", ".bvec", ".json"] } else { &[".json"] };
        for ext in extensions {
            let sidecar = sibling(&file, &old_stem, ext);
            let new_sidecar = sibling(&correct_path, new_stem, ext);
            if sidecar.exists() {
                log.record(Level::Info, &format!("Moving sidecar {} -> {}", sidecar.display(), new_sidecar.display()))?;
                if !dry_run {
                    move_file(&sidecar, &new_sidecar)?;
                }
                report.moved.push((sidecar, new_sidecar));
            }
        }
    }

    // reverse lexical order visits children before their parents
    let mut entries = glob_under(&root, "**/*")?;
    entries.reverse();
    for dir in entries.into_iter().filter(|p| p.is_dir()) {
        let is_empty = fs::read_dir(&dir).map_err(|e| Error::io(&dir, e))?.next().is_none();
        if is_empty {
            log.record(Level::Info, &format!("Removing empty directory: {}", dir.display()))?;
            if !dry_run {
                fs::remove_dir(&dir).map_err(|e| Error::io(&dir, e))?;
            }
            report.removed_dirs.push(dir);
        }
    }

    for dwi in glob_under(&root, "**/*_dwi.nii.gz")? {
        let Some(stem) = dwi.file_name().and_then(|n| n.to_str()).and_then(|n| n.strip_suffix(NII_GZ)).map(str::to_string) else {
            continue;
        };
        let sidecars = [".bval", ".bvec", ".json"].map(|ext| sibling(&dwi, &stem, ext));
        if sidecars.iter().all(|s| s.exists()) {
            continue;
        }
        log.record(Level::Error, &format!("DWI missing sidecars: {}", dwi.display()))?;
        for missing in sidecars.iter().filter(|s| !s.exists()) {
            let missing_name = missing.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
            log.record(Level::Error, &format!("Missing: {missing_name}"))?;
        }
        report.missing_sidecars.push(dwi);
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parses_names() {
        let n = OasisName::parse("sub-OAS30001_ses-d0129_run-01_T1w.nii.gz").unwrap();
        assert_eq!(n.subject, "sub-OAS30001");
        assert_eq!(n.session, "ses-d0129");
        assert_eq!(n.run.as_deref(), Some("run-01"));
        assert_eq!(n.modality, "T1w");
        assert_eq!(n.modality_dir(), "anat");

        let n = OasisName::parse("sub-OAS30002_ses-d0001_dwi.nii.gz").unwrap();
        assert_eq!(n.run, None);
        assert_eq!(n.modality_dir(), "dwi");
        assert_eq!(n.canonical_file_name(), "sub-OAS30002_ses-d0001_dwi.nii.gz");

        let n = OasisName::parse("sub-OAS30003_ses-d0002_T1w_preproc.nii.gz").unwrap();
        assert_eq!(n.modality, "T1w_preproc");
    }

    #[test]
    fn corrects_sess_typo() {
        let n = OasisName::parse("sub-OAS30001_sess-d0129_dwi.nii.gz").unwrap();
        assert_eq!(n.session, "ses-d0129");
        assert_eq!(n.canonical_file_name(), "sub-OAS30001_ses-d0129_dwi.nii.gz");
    }

    #[test]
    fn rejects_unexpected_names() {
        for name in [
            "sub-OAS20001_ses-d0129_dwi.nii.gz",
            "sub-OAS3_ses-d0129_dwi.nii.gz",
            "sub-OAS30001_ses-0129_dwi.nii.gz",
            "sub-OAS30001_ses-d0129.nii.gz",
            "sub-OAS30001_ses-d0129_run-01.nii.gz",
            "sub-OAS30001_ses-d0129_run-1a_T1w.nii.gz",
            "sub-OAS30001_ses-d0129_dwi.v2.nii.gz",
            "sub-OAS30001_ses-d0129_dwi.nii",
            "notes.nii.gz",
        ] {
            assert!(OasisName::parse(name).is_none(), "{name} should not parse");
        }
    }

    #[test]
    fn canonical_path_layout() {
        let n = OasisName::parse("sub-OAS30001_ses-d0129_run-02_T1w.nii.gz").unwrap();
        assert_eq!(
            n.canonical_path(Path::new("/data")),
            PathBuf::from("/data/sub-OAS30001/ses-d0129/anat/sub-OAS30001_ses-d0129_run-02_T1w.nii.gz")
        );
    }

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn log_file_receives_tagged_lines() {
        let dir = tempdir().unwrap();
        let mut log = CleanupLog::create(dir.path()).unwrap();
        log.record(Level::Warn, "something odd").unwrap();
        let text = fs::read_to_string(log.path()).unwrap();
        assert_eq!(text, "[WARN] something odd\n");
        let name = log.path().file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("cleanup_log_") && name.ends_with(".txt"));
    }

    #[test]
    fn dry_run_leaves_tree_untouched() {
        let data = tempdir().unwrap();
        let logs = tempdir().unwrap();
        let misplaced = data.path().join("incoming").join("sub-OAS30001_sess-d0129_T1w.nii.gz");
        touch(&misplaced);
        fs::create_dir_all(data.path().join("empty")).unwrap();

        let mut log = CleanupLog::create(logs.path()).unwrap();
        let report = sanitize_dataset(data.path(), SanitizeOptions { dry_run: true }, &mut log).unwrap();
        assert_eq!(report.moved.len(), 1);
        assert_eq!(report.removed_dirs.len(), 1);
        assert!(misplaced.exists());
        assert!(data.path().join("empty").exists());
        assert!(!data.path().join("sub-OAS30001").exists());

        let text = fs::read_to_string(log.path()).unwrap();
        assert!(text.contains("[INFO] Moving "));
        assert!(text.contains("[INFO] Removing empty directory: "));
    }
}
