//! Proposal validation: unified diffs, rewrites, and the path denylist.

use std::path::Path;

use incident::RewriteFile;

/// Path substrings the engine refuses to touch.
pub const DENYLIST: &[&str] = &[".env", ".env.local", "secrets", "credentials"];

/// Upper bound on an acceptable diff, in bytes.
pub const MAX_DIFF_BYTES: usize = 200_000;

/// Upper bound on a single rewritten file, in bytes.
pub const MAX_REWRITE_BYTES: usize = 500_000;

/// Existing files at or above this many non-blank lines get the anchor check.
const ANCHOR_MIN_LINES: usize = 20;

/// Whether a repo-relative path hits the denylist.
#[must_use]
pub fn is_denylisted(path: &str) -> bool {
    DENYLIST.iter().any(|needle| path.contains(needle))
}

/// Why a diff proposal was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffIssue {
    /// Over [`MAX_DIFF_BYTES`]; terminal, no fallback.
    TooLarge { bytes: usize },
    /// Missing `--- a/` / `+++ b/` / `@@` markers; falls through to rewrite.
    MissingMarkers,
    /// No touched file could be extracted; falls through to rewrite.
    NoFiles,
}

/// Validate a strict diff and extract its touched paths.
pub fn validate_diff(diff: &str) -> Result<Vec<String>, DiffIssue> {
    if diff.len() > MAX_DIFF_BYTES {
        return Err(DiffIssue::TooLarge { bytes: diff.len() });
    }
    if !(diff.contains("--- a/") && diff.contains("+++ b/") && diff.contains("@@")) {
        return Err(DiffIssue::MissingMarkers);
    }
    let paths = touched_diff_paths(diff);
    if paths.is_empty() {
        return Err(DiffIssue::NoFiles);
    }
    Ok(paths)
}

/// Touched paths from `diff --git a/… b/…` and `--- a/…` lines.
#[must_use]
pub fn touched_diff_paths(diff: &str) -> Vec<String> {
    let mut paths = Vec::new();
    for line in diff.lines() {
        let candidate = if let Some(rest) = line.strip_prefix("diff --git a/") {
            rest.split(" b/").next()
        } else if let Some(rest) = line.strip_prefix("--- a/") {
            Some(rest.trim())
        } else {
            None
        };
        if let Some(path) = candidate {
            let path = path.trim();
            if !path.is_empty() && !paths.iter().any(|p| p == path) {
                paths.push(path.to_string());
            }
        }
    }
    paths
}

/// Keep only lines a patch applier understands. Used as the retry filter
/// when `git apply` rejects a model-authored diff.
#[must_use]
pub fn strip_non_diff_lines(diff: &str) -> String {
    const PREFIXES: &[&str] = &[
        "diff ", "index ", "--- ", "+++ ", "@@", "+", "-", " ", "\\",
    ];
    let mut kept: Vec<&str> = diff
        .lines()
        .filter(|line| line.is_empty() || PREFIXES.iter().any(|p| line.starts_with(p)))
        .collect();
    // A trailing newline keeps `git apply` happy with the last hunk.
    kept.push("");
    kept.join("\n")
}

/// Why a rewrite proposal was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewriteIssue {
    TooLarge { path: String, bytes: usize },
    Denylisted { path: String },
    /// None of the existing file's anchor lines appear in the rewrite.
    AnchorMissing { path: String },
    /// Rewrite shrank below half the original length.
    TooSmall { path: String },
}

impl std::fmt::Display for RewriteIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RewriteIssue::TooLarge { path, bytes } => {
                write!(f, "`{path}` is {bytes} bytes, over the rewrite limit")
            }
            RewriteIssue::Denylisted { path } => write!(f, "`{path}` matches the path denylist"),
            RewriteIssue::AnchorMissing { path } => {
                write!(f, "`{path}` shares no anchor lines with the existing file")
            }
            RewriteIssue::TooSmall { path } => {
                write!(f, "`{path}` rewrite is under half the original length")
            }
        }
    }
}

/// Validate every file of a rewrite proposal against the tree at `repo_dir`.
pub fn validate_rewrite(files: &[RewriteFile], repo_dir: &Path) -> Result<(), RewriteIssue> {
    for file in files {
        if file.content.len() > MAX_REWRITE_BYTES {
            return Err(RewriteIssue::TooLarge {
                path: file.path.clone(),
                bytes: file.content.len(),
            });
        }
        if is_denylisted(&file.path) {
            return Err(RewriteIssue::Denylisted {
                path: file.path.clone(),
            });
        }

        let existing_path = repo_dir.join(&file.path);
        let Ok(existing) = std::fs::read_to_string(&existing_path) else {
            // New file: nothing to anchor against.
            continue;
        };

        let non_blank: Vec<&str> = existing
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();
        if non_blank.len() >= ANCHOR_MIN_LINES {
            let anchors: Vec<&str> = non_blank
                .iter()
                .take(3)
                .chain(non_blank.iter().rev().take(3))
                .copied()
                .collect();
            if !anchors.iter().any(|anchor| file.content.contains(anchor)) {
                return Err(RewriteIssue::AnchorMissing {
                    path: file.path.clone(),
                });
            }
        }

        if file.content.len() * 2 < existing.len() {
            return Err(RewriteIssue::TooSmall {
                path: file.path.clone(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOOD_DIFF: &str = "diff --git a/src/app.js b/src/app.js\n\
                             --- a/src/app.js\n\
                             +++ b/src/app.js\n\
                             @@ -1,2 +1,2 @@\n\
                             -const a = 1;\n\
                             +const a = 2;\n";

    #[test]
    fn test_validate_diff_extracts_paths() {
        assert_eq!(validate_diff(GOOD_DIFF).unwrap(), vec!["src/app.js"]);
    }

    #[test]
    fn test_validate_diff_rejects_missing_markers() {
        assert_eq!(
            validate_diff("just some text"),
            Err(DiffIssue::MissingMarkers)
        );
    }

    #[test]
    fn test_validate_diff_size_boundary() {
        let mut big = GOOD_DIFF.to_string();
        big.push_str(&" ".repeat(MAX_DIFF_BYTES + 1 - big.len()));
        assert!(matches!(
            validate_diff(&big),
            Err(DiffIssue::TooLarge { bytes }) if bytes == MAX_DIFF_BYTES + 1
        ));
    }

    #[test]
    fn test_denylist_is_substring_match() {
        assert!(is_denylisted(".env"));
        assert!(is_denylisted("config/.env.local"));
        assert!(is_denylisted("ops/credentials/token.json"));
        assert!(!is_denylisted("src/environment.js"));
    }

    #[test]
    fn test_strip_non_diff_lines_idempotent_filter() {
        let noisy = format!("Here is your patch:\n{GOOD_DIFF}Let me know!");
        let stripped = strip_non_diff_lines(&noisy);
        assert!(!stripped.contains("Here is your patch"));
        assert!(!stripped.contains("Let me know"));
        assert!(stripped.contains("diff --git a/src/app.js"));
        assert_eq!(strip_non_diff_lines(&stripped), stripped);
    }

    #[test]
    fn test_validate_rewrite_anchor_and_size() {
        let dir = tempfile::tempdir().unwrap();
        let original: String = (0..30).map(|i| format!("line number {i}\n")).collect();
        std::fs::write(dir.path().join("big.js"), &original).unwrap();

        // Keeps an anchor (first line) and enough length.
        let good = RewriteFile {
            path: "big.js".to_string(),
            content: format!("line number 0\n{}", "filler\n".repeat(40)),
        };
        assert!(validate_rewrite(std::slice::from_ref(&good), dir.path()).is_ok());

        // No anchors at all.
        let unanchored = RewriteFile {
            path: "big.js".to_string(),
            content: "completely unrelated\n".repeat(30),
        };
        assert!(matches!(
            validate_rewrite(&[unanchored], dir.path()),
            Err(RewriteIssue::AnchorMissing { .. })
        ));

        // Anchored but shrunk below half.
        let tiny = RewriteFile {
            path: "big.js".to_string(),
            content: "line number 0\n".to_string(),
        };
        assert!(matches!(
            validate_rewrite(&[tiny], dir.path()),
            Err(RewriteIssue::TooSmall { .. })
        ));

        // New files skip the anchor check.
        let fresh = RewriteFile {
            path: "brand_new.js".to_string(),
            content: "anything\n".to_string(),
        };
        assert!(validate_rewrite(&[fresh], dir.path()).is_ok());
    }
}
