use crate::error::StrategyFileError;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Strips markdown fences and a leading `patch` line from a model-suggested patch
/// and normalises line endings.
pub fn sanitize_patch(raw: &str) -> String {
    let mut text = raw.trim();
    if text.starts_with("```") && text.ends_with("```") && text.len() >= 6 {
        text = match text.find('\n') {
            Some(first_newline) => &text[first_newline + 1..],
            None => &text[3..],
        };
        text = text.strip_suffix("```").unwrap_or(text);
    }
    if text.get(..6).is_some_and(|head| head.eq_ignore_ascii_case("patch\n")) {
        text = &text[6..];
    }
    text.replace("\r\n", "\n").replace('\r', "\n").trim().to_string()
}

/// A unified diff starts with `---` headers or is a `git diff`.
pub fn is_unified_diff(text: &str) -> bool {
    text.trim_start().starts_with("---") || text.contains("diff --git")
}

/// How a suggestion ended up on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchOutcome {
    /// The suggestion was not a diff and replaced the file's content.
    Replaced,
    /// The diff applied with the given command line.
    Patched { command: String },
}

/// Applies model-suggested edits with a backup to roll back to.
#[derive(Debug, Clone)]
pub struct PatchManager {
    backup_dir: PathBuf,
    fail_log: PathBuf,
}

impl PatchManager {
    pub fn new(backup_dir: impl Into<PathBuf>, fail_log: impl Into<PathBuf>) -> Self {
        Self {
            backup_dir: backup_dir.into(),
            fail_log: fail_log.into(),
        }
    }

    pub fn backup_path(&self, target: &Path) -> PathBuf {
        let name = target
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "unnamed".into());
        self.backup_dir.join(name)
    }

    /// Copies `target` into the backup directory, replacing the previous backup.
    pub fn backup(&self, target: &Path) -> Result<PathBuf, StrategyFileError> {
        fs::create_dir_all(&self.backup_dir).map_err(|e| StrategyFileError::io(&self.backup_dir, e))?;
        let backup = self.backup_path(target);
        fs::copy(target, &backup).map_err(|e| StrategyFileError::io(target, e))?;
        tracing::info!(from = %target.display(), to = %backup.display(), "Backed up file");
        Ok(backup)
    }

    /// Restores `target` from its backup.
    pub fn rollback(&self, target: &Path) -> Result<(), StrategyFileError> {
        let backup = self.backup_path(target);
        if !backup.exists() {
            return Err(StrategyFileError::NoBackup(target.display().to_string()));
        }
        fs::copy(&backup, target).map_err(|e| StrategyFileError::io(target, e))?;
        tracing::info!(target = %target.display(), "Rolled back from backup");
        Ok(())
    }

    /// Applies a suggestion to a single file.
    ///
    /// A backup is always taken first. Non-diff text replaces the file; a diff is tried
    /// with `patch -p0`, `patch -p1`, `git apply` and `git apply -p0` in that order. When
    /// all of them fail, the last tool output is written to the failure log.
    pub fn apply(&self, target: &Path, suggestion: &str) -> Result<PatchOutcome, StrategyFileError> {
        let patch = sanitize_patch(suggestion);
        self.backup(target)?;

        if !is_unified_diff(&patch) {
            fs::write(target, format!("{}\n", patch)).map_err(|e| StrategyFileError::io(target, e))?;
            tracing::info!(target = %target.display(), "Wrote non-diff suggestion as full content");
            return Ok(PatchOutcome::Replaced);
        }

        let workdir = target
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        self.apply_diff(&patch, workdir, target)
    }

    /// Applies a diff that may touch several files, relative to `workdir`.
    pub fn apply_to_tree(&self, suggestion: &str, workdir: &Path) -> Result<PatchOutcome, StrategyFileError> {
        let patch = sanitize_patch(suggestion);
        self.apply_diff(&patch, workdir, workdir)
    }

    fn apply_diff(&self, patch: &str, workdir: &Path, label: &Path) -> Result<PatchOutcome, StrategyFileError> {
        let patch_file = patch_file_in(workdir);
        fs::write(&patch_file, format!("{}\n", patch)).map_err(|e| StrategyFileError::io(&patch_file, e))?;
        // The tools run inside `workdir`, where the patch file lives.
        let patch_arg = patch_file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let attempts: [&[&str]; 4] = [
            &["patch", "--batch", "--forward", "-p0", "-i"],
            &["patch", "--batch", "--forward", "-p1", "-i"],
            &["git", "apply", "--reject", "--whitespace=fix"],
            &["git", "apply", "-p0", "--reject", "--whitespace=fix"],
        ];

        let mut last_output = String::new();
        let mut outcome = None;
        for args in attempts {
            let command_line = format!("{} {}", args.join(" "), patch_arg);
            let result = Command::new(args[0])
                .args(&args[1..])
                .arg(&patch_arg)
                .current_dir(workdir)
                .output();
            match result {
                Ok(output) if output.status.success() => {
                    tracing::info!(target = %label.display(), command = %command_line, "Patch applied");
                    outcome = Some(PatchOutcome::Patched {
                        command: command_line,
                    });
                    break;
                }
                Ok(output) => {
                    last_output = format!(
                        "{}{}",
                        String::from_utf8_lossy(&output.stdout),
                        String::from_utf8_lossy(&output.stderr)
                    );
                }
                Err(e) => last_output = format!("Command not runnable: {} ({})", command_line, e),
            }
        }
        let _ = fs::remove_file(&patch_file);

        match outcome {
            Some(outcome) => Ok(outcome),
            None => {
                let excerpt: String = last_output.chars().take(5000).collect();
                if let Some(dir) = self.fail_log.parent().filter(|p| !p.as_os_str().is_empty()) {
                    let _ = fs::create_dir_all(dir);
                }
                if let Err(e) = fs::write(&self.fail_log, &excerpt) {
                    tracing::warn!(error = %e, "Failed to persist patch failure output");
                }
                tracing::error!(target = %label.display(), "All patch strategies failed");
                Err(StrategyFileError::PatchRejected {
                    path: label.display().to_string(),
                    reason: excerpt.chars().take(1000).collect(),
                })
            }
        }
    }
}

fn patch_file_in(dir: &Path) -> PathBuf {
    let stamp = chrono::Utc::now().format("%Y%m%d%H%M%S%f");
    dir.join(format!(".suggestion-{}-{}.patch", std::process::id(), stamp))
}
