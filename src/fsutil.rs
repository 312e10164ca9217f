//! File operations: atomic publish with collision renaming, content hashing

use crate::error::Result;
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;

/// Maximum number of rename attempts when resolving destination collisions
const MAX_RENAME_ATTEMPTS: u32 = 9999;

/// Length of a file in bytes, 0 if it does not exist
pub async fn file_len(path: &Path) -> u64 {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => meta.len(),
        _ => 0,
    }
}

/// The `i`-th auto-rename candidate: `_i` suffixed before the extension
///
/// `/dl/movie.mkv` becomes `/dl/movie_1.mkv`, `/dl/movie_2.mkv`, and so
/// on; candidate 0 is the path itself.
fn rename_candidate(path: &Path, i: u32) -> PathBuf {
    if i == 0 {
        return path.to_path_buf();
    }
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    let parent = path.parent().unwrap_or_else(|| Path::new(""));
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => parent.join(format!("{stem}_{i}.{ext}")),
        None => parent.join(format!("{stem}_{i}")),
    }
}

/// Claim a free destination name by atomically creating an empty
/// placeholder
///
/// `create_new` is the atomic existence check: two tasks finishing
/// concurrently with the same destination can never both claim one name,
/// so an existing file is never overwritten. The caller's subsequent
/// rename replaces the placeholder with the complete file.
async fn claim_dest_path(path: &Path) -> Result<PathBuf> {
    for i in 0..=MAX_RENAME_ATTEMPTS {
        let candidate = rename_candidate(path, i);
        match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
            .await
        {
            Ok(_) => return Ok(candidate),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e.into()),
        }
    }

    Err(std::io::Error::other(format!(
        "no free destination name for {} after {} attempts",
        path.display(),
        MAX_RENAME_ATTEMPTS
    ))
    .into())
}

/// Move `src` to `dest`, auto-renaming on collision
///
/// The parent directory is created if missing. The landed name is claimed
/// atomically, then filled by a single rename; across filesystems the
/// rename falls back to copy + delete. Returns the path the file actually
/// landed at.
pub async fn move_file(src: &Path, dest: &Path) -> Result<PathBuf> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let dest = claim_dest_path(dest).await?;

    match tokio::fs::rename(src, &dest).await {
        Ok(()) => Ok(dest),
        Err(_) => {
            // Cross-device move: rename cannot span filesystems
            tokio::fs::copy(src, &dest).await?;
            tokio::fs::remove_file(src).await?;
            Ok(dest)
        }
    }
}

/// Remove a file, ignoring a missing one
pub async fn remove_file_if_exists(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// MD5 of a file as a lowercase hex string
pub async fn file_md5(path: &Path) -> Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut context = md5::Context::new();
    let mut buffer = vec![0u8; 8192];

    loop {
        let read = file.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        context.consume(&buffer[..read]);
    }

    Ok(format!("{:x}", context.compute()))
}

/// Normalize a fingerprint for comparison: strip quotes, lowercase
///
/// Strong HTTP validators arrive quoted (`"abc123"`); content hashes do
/// not. Both compare against the same normal form.
pub fn normalize_fingerprint(fingerprint: &str) -> String {
    fingerprint.replace('"', "").to_ascii_lowercase()
}

/// Whether the file's MD5 matches the expected fingerprint
///
/// A missing file never matches. Comparison is quote-insensitive and
/// case-insensitive so ETag-style validators and raw hashes both work.
pub async fn fingerprint_matches(path: &Path, expected: &str) -> bool {
    if file_len(path).await == 0 && !path.exists() {
        return false;
    }
    match file_md5(path).await {
        Ok(actual) => normalize_fingerprint(&actual) == normalize_fingerprint(expected),
        Err(_) => false,
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn file_len_of_missing_file_is_zero() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(file_len(&dir.path().join("nope.bin")).await, 0);
    }

    #[tokio::test]
    async fn file_len_reports_written_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        tokio::fs::write(&path, b"hello").await.unwrap();
        assert_eq!(file_len(&path).await, 5);
    }

    #[test]
    fn rename_candidates_suffix_before_extension() {
        let path = Path::new("/dl/movie.mkv");
        assert_eq!(rename_candidate(path, 0), PathBuf::from("/dl/movie.mkv"));
        assert_eq!(rename_candidate(path, 1), PathBuf::from("/dl/movie_1.mkv"));
        assert_eq!(rename_candidate(path, 2), PathBuf::from("/dl/movie_2.mkv"));
    }

    #[test]
    fn rename_candidates_handle_extensionless_names() {
        let path = Path::new("/dl/README");
        assert_eq!(rename_candidate(path, 1), PathBuf::from("/dl/README_1"));
    }

    #[tokio::test]
    async fn successive_moves_to_one_destination_count_upward() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("movie.mkv");

        for (i, expected) in ["movie.mkv", "movie_1.mkv", "movie_2.mkv"]
            .iter()
            .enumerate()
        {
            let src = dir.path().join(format!("part{i}.tmp"));
            tokio::fs::write(&src, format!("copy {i}")).await.unwrap();
            let landed = move_file(&src, &dest).await.unwrap();
            assert_eq!(landed, dir.path().join(expected));
        }

        assert_eq!(
            tokio::fs::read(dir.path().join("movie.mkv")).await.unwrap(),
            b"copy 0"
        );
        assert_eq!(
            tokio::fs::read(dir.path().join("movie_2.mkv")).await.unwrap(),
            b"copy 2"
        );
    }

    #[tokio::test]
    async fn concurrent_moves_claim_distinct_destinations() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("same.bin");

        let mut handles = Vec::new();
        for i in 0..4 {
            let src = dir.path().join(format!("src{i}.tmp"));
            tokio::fs::write(&src, format!("payload {i}")).await.unwrap();
            let dest = dest.clone();
            handles.push(tokio::spawn(
                async move { move_file(&src, &dest).await.unwrap() },
            ));
        }

        let mut landed = Vec::new();
        for handle in handles {
            landed.push(handle.await.unwrap());
        }
        landed.sort();
        landed.dedup();
        assert_eq!(landed.len(), 4, "every move must land on its own path");
    }

    #[tokio::test]
    async fn move_file_relocates_and_removes_source() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("part.tmp");
        let dest = dir.path().join("out/final.bin");
        tokio::fs::write(&src, b"payload").await.unwrap();

        let landed = move_file(&src, &dest).await.unwrap();

        assert_eq!(landed, dest);
        assert!(!src.exists(), "source must be gone after the move");
        assert_eq!(tokio::fs::read(&dest).await.unwrap(), b"payload");
    }

    #[tokio::test]
    async fn move_file_never_overwrites_existing_destination() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("part.tmp");
        let dest = dir.path().join("final.bin");
        tokio::fs::write(&src, b"new").await.unwrap();
        tokio::fs::write(&dest, b"old").await.unwrap();

        let landed = move_file(&src, &dest).await.unwrap();

        assert_eq!(landed, dir.path().join("final_1.bin"));
        assert_eq!(
            tokio::fs::read(&dest).await.unwrap(),
            b"old",
            "pre-existing file must stay untouched"
        );
        assert_eq!(tokio::fs::read(&landed).await.unwrap(), b"new");
    }

    #[tokio::test]
    async fn file_md5_matches_known_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("abc.txt");
        tokio::fs::write(&path, b"abc").await.unwrap();
        // md5("abc")
        assert_eq!(
            file_md5(&path).await.unwrap(),
            "900150983cd24fb0d6963f7d28e17f72"
        );
    }

    #[test]
    fn normalize_fingerprint_strips_quotes_and_case() {
        assert_eq!(
            normalize_fingerprint("\"900150983CD24FB0D6963F7D28E17F72\""),
            "900150983cd24fb0d6963f7d28e17f72"
        );
    }

    #[tokio::test]
    async fn fingerprint_matches_accepts_quoted_etag_form() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("abc.txt");
        tokio::fs::write(&path, b"abc").await.unwrap();

        assert!(fingerprint_matches(&path, "\"900150983cd24fb0d6963f7d28e17f72\"").await);
        assert!(fingerprint_matches(&path, "900150983CD24FB0D6963F7D28E17F72").await);
        assert!(!fingerprint_matches(&path, "deadbeef").await);
    }

    #[tokio::test]
    async fn fingerprint_matches_is_false_for_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!fingerprint_matches(&dir.path().join("gone.bin"), "abc").await);
    }
}
