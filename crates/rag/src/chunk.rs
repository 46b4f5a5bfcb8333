//! File walking, text chunking, and content hashing.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::RagError;

/// Directory names never descended into.
pub const EXCLUDED_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "dist",
    "build",
    "coverage",
    ".cursor",
    ".next",
    ".turbo",
    "logs",
];

/// Extensions treated as non-text regardless of content.
pub const NON_TEXT_EXTENSIONS: &[&str] = &[
    ".png", ".jpg", ".jpeg", ".gif", ".webp", ".ico", ".pdf", ".zip", ".tar", ".gz", ".lock",
];

/// Files larger than this are skipped outright.
pub const MAX_FILE_BYTES: u64 = 300_000;

/// Bytes sniffed for a NUL to detect binary content.
const BINARY_SNIFF_BYTES: usize = 1024;

/// SHA-256 of a chunk's content, lowercase hex.
#[must_use]
pub fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Slice text into overlapping windows of at most `chunk_size` characters
/// with `overlap` characters shared between neighbours. Chunking stops once
/// a window reaches the end of the file, so the last chunk always ends at
/// the final character.
#[must_use]
pub fn chunk_text(content: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    debug_assert!(overlap < chunk_size, "overlap must be smaller than the window");

    let chars: Vec<char> = content.chars().collect();
    if chars.len() <= chunk_size {
        return vec![content.to_string()];
    }

    let step = chunk_size - overlap;
    let mut chunks = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + chunk_size).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }
    chunks
}

/// One text file kept by the walker.
#[derive(Debug, Clone)]
pub struct WalkedFile {
    /// Forward-slash path relative to the walk root.
    pub rel_path: String,
    pub content: String,
}

/// Walk a repository tree and return its indexable text files, sorted by
/// relative path for deterministic processing order.
///
/// # Errors
/// Returns an error if the root cannot be read; unreadable individual files
/// are skipped.
pub fn walk_text_files(root: &Path) -> Result<Vec<WalkedFile>, RagError> {
    let mut files = Vec::new();
    walk_dir(root, root, &mut files)?;
    files.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
    Ok(files)
}

fn walk_dir(root: &Path, dir: &Path, files: &mut Vec<WalkedFile>) -> Result<(), RagError> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .collect();
    entries.sort();

    for path in entries {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        if path.is_dir() {
            if EXCLUDED_DIRS.contains(&name.as_str()) {
                continue;
            }
            walk_dir(root, &path, files)?;
            continue;
        }

        if !keep_file(&path, &name) {
            continue;
        }

        let Ok(bytes) = std::fs::read(&path) else {
            continue;
        };
        let sniff = &bytes[..bytes.len().min(BINARY_SNIFF_BYTES)];
        if sniff.contains(&0) {
            debug!(path = %path.display(), "skipping binary file");
            continue;
        }

        let rel_path = path
            .strip_prefix(root)
            .unwrap_or(&path)
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        files.push(WalkedFile {
            rel_path,
            content: String::from_utf8_lossy(&bytes).into_owned(),
        });
    }
    Ok(())
}

fn keep_file(path: &Path, name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    if NON_TEXT_EXTENSIONS.iter().any(|ext| lower.ends_with(ext)) {
        return false;
    }
    match std::fs::metadata(path) {
        Ok(meta) => meta.len() <= MAX_FILE_BYTES,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_content_stable() {
        assert_eq!(hash_content("abc"), hash_content("abc"));
        assert_ne!(hash_content("abc"), hash_content("abd"));
        // Known SHA-256 of "abc".
        assert_eq!(
            hash_content("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_small_file_is_one_chunk() {
        let chunks = chunk_text("short", 900, 150);
        assert_eq!(chunks, vec!["short".to_string()]);

        let exactly = "x".repeat(900);
        assert_eq!(chunk_text(&exactly, 900, 150).len(), 1);
    }

    #[test]
    fn test_chunk_count_formula() {
        // n > chunk_size: ceil((n - size) / (size - overlap)) + 1 chunks.
        let n = 2000;
        let (size, overlap) = (900, 150);
        let content = "y".repeat(n);
        let chunks = chunk_text(&content, size, overlap);
        let expected = (n - size).div_ceil(size - overlap) + 1;
        assert_eq!(chunks.len(), expected);

        // The last chunk ends at the file end.
        let reassembled_tail = chunks.last().unwrap();
        assert!(content.ends_with(reassembled_tail.as_str()));
    }

    #[test]
    fn test_chunks_overlap() {
        let content: String = ('a'..='z').cycle().take(2000).collect();
        let chunks = chunk_text(&content, 900, 150);
        let first_tail: String = chunks[0].chars().skip(900 - 150).collect();
        let second_head: String = chunks[1].chars().take(150).collect();
        assert_eq!(first_tail, second_head);
    }

    #[test]
    fn test_walker_skips_excluded_and_binary() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("node_modules")).unwrap();
        std::fs::write(dir.path().join("node_modules/pkg.js"), "skip me").unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/app.js"), "console.log(1)\n").unwrap();
        std::fs::write(dir.path().join("logo.png"), [0u8, 1, 2]).unwrap();
        std::fs::write(dir.path().join("blob.bin"), [b'a', 0, b'b']).unwrap();

        let files = walk_text_files(dir.path()).unwrap();
        let paths: Vec<&str> = files.iter().map(|f| f.rel_path.as_str()).collect();
        assert_eq!(paths, vec!["src/app.js"]);
    }
}
