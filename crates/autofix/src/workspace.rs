//! Staging workspace for candidate changes.
//!
//! Changes are applied to a throwaway copy of the repo tree first; only a
//! copy that survives the sandbox gets promoted to the real clone.

use std::path::{Path, PathBuf};

use incident::RewriteFile;
use rag::chunk::EXCLUDED_DIRS;
use rag::GitRunner;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::diff::{is_denylisted, strip_non_diff_lines};
use crate::FixError;

/// Create a sibling `.workspaces/<random>/repo` copy of the repo tree,
/// excluding ignored directories and denylisted paths.
///
/// # Errors
/// Returns an error on filesystem failure.
pub fn stage_workspace(repo_dir: &Path) -> Result<PathBuf, FixError> {
    let parent = repo_dir.parent().unwrap_or_else(|| Path::new("."));
    let workspace = parent
        .join(".workspaces")
        .join(Uuid::new_v4().to_string())
        .join("repo");
    std::fs::create_dir_all(&workspace)?;
    copy_tree(repo_dir, repo_dir, &workspace)?;
    debug!(workspace = %workspace.display(), "staged workspace copy");
    Ok(workspace)
}

fn copy_tree(root: &Path, from: &Path, to: &Path) -> Result<(), FixError> {
    for entry in std::fs::read_dir(from)? {
        let entry = entry?;
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().to_string();

        let rel = path
            .strip_prefix(root)
            .unwrap_or(&path)
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if path.is_dir() {
            if EXCLUDED_DIRS.contains(&name.as_str()) {
                continue;
            }
            let dest = to.join(&name);
            std::fs::create_dir_all(&dest)?;
            copy_tree(root, &path, &dest)?;
        } else {
            if is_denylisted(&rel) {
                continue;
            }
            std::fs::copy(&path, to.join(&name))?;
        }
    }
    Ok(())
}

/// Apply a unified diff with `git apply --whitespace=fix`, retrying once
/// with non-diff lines stripped. Returns `false` when both attempts fail.
///
/// # Errors
/// Returns an error on filesystem failure while writing the patch.
pub async fn apply_diff(git: &GitRunner, dir: &Path, diff: &str) -> Result<bool, FixError> {
    let patch_path = dir.join(".warden-fix.patch");

    std::fs::write(&patch_path, ensure_trailing_newline(diff))?;
    let first = git.apply_patch(dir, &patch_path).await;
    if first.is_ok() {
        std::fs::remove_file(&patch_path).ok();
        return Ok(true);
    }
    warn!(error = %first.unwrap_err(), "git apply failed, retrying with stripped diff");

    std::fs::write(&patch_path, strip_non_diff_lines(diff))?;
    let second = git.apply_patch(dir, &patch_path).await;
    std::fs::remove_file(&patch_path).ok();

    match second {
        Ok(()) => Ok(true),
        Err(error) => {
            warn!(%error, "git apply failed after stripping");
            Ok(false)
        }
    }
}

/// Apply a rewrite by writing each file, creating parents as needed.
///
/// # Errors
/// Returns an error on filesystem failure.
pub fn apply_rewrite(dir: &Path, files: &[RewriteFile]) -> Result<(), FixError> {
    for file in files {
        let dest = dir.join(&file.path);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&dest, &file.content)?;
    }
    Ok(())
}

fn ensure_trailing_newline(diff: &str) -> String {
    if diff.ends_with('\n') {
        diff.to_string()
    } else {
        format!("{diff}\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_workspace_excludes_denylist_and_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let repo = dir.path().join("repo");
        std::fs::create_dir_all(repo.join("src")).unwrap();
        std::fs::create_dir_all(repo.join("node_modules/pkg")).unwrap();
        std::fs::write(repo.join("src/app.js"), "code\n").unwrap();
        std::fs::write(repo.join(".env"), "SECRET=1\n").unwrap();
        std::fs::write(repo.join("node_modules/pkg/index.js"), "dep\n").unwrap();

        let workspace = stage_workspace(&repo).unwrap();
        assert!(workspace.join("src/app.js").exists());
        assert!(!workspace.join(".env").exists());
        assert!(!workspace.join("node_modules").exists());
    }

    #[test]
    fn test_apply_rewrite_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![RewriteFile {
            path: "deep/nested/file.js".to_string(),
            content: "x\n".to_string(),
        }];
        apply_rewrite(dir.path(), &files).unwrap();
        assert_eq!(
            std::fs::read_to_string(dir.path().join("deep/nested/file.js")).unwrap(),
            "x\n"
        );
    }
}
