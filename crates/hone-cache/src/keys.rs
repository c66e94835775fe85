//! Fingerprints and cache keys.

use hone_core::{Error, Job, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::PathBuf;
use walkdir::WalkDir;

/// Hex SHA-256 of a byte slice.
pub fn fingerprint(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// The parts of a job definition that change what it produces.
#[derive(Serialize)]
struct KeyInput<'a> {
    name: &'a str,
    image: Option<&'a str>,
    shell: &'a str,
    engine: Option<&'a str>,
    env: &'a BTreeMap<String, String>,
    deps: &'a [String],
    outputs: &'a [PathBuf],
}

/// Derive the cache key for a job: its sanitized name followed by a hash of
/// its definition and the contents of its declared inputs.
pub async fn job_cache_key(job: &Job) -> Result<String> {
    let input = KeyInput {
        name: &job.name,
        image: job.image.as_deref(),
        shell: &job.shell,
        engine: job.engine.as_deref(),
        env: &job.env,
        deps: &job.deps,
        outputs: &job.outputs,
    };

    let mut hasher = Sha256::new();
    hasher.update(serde_json::to_vec(&input)?);

    for path in expand_paths(&job.inputs).await? {
        let contents = tokio::fs::read(&path).await.map_err(|e| {
            Error::Cache(format!("Failed to read input {}: {}", path.display(), e))
        })?;
        hasher.update(path.to_string_lossy().as_bytes());
        hasher.update(fingerprint(&contents).as_bytes());
    }

    Ok(format!(
        "{}-{}",
        sanitize_key(&job.name),
        hex::encode(hasher.finalize())
    ))
}

/// Sanitize a key for use in filenames and object keys.
pub fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | ' ' => '_',
            _ => c,
        })
        .collect()
}

/// Expand directories into the files beneath them, in a stable order.
pub async fn expand_paths(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let paths = paths.to_vec();
    tokio::task::spawn_blocking(move || walk_paths(&paths))
        .await
        .map_err(|e| Error::Internal(format!("Path walk failed: {}", e)))?
}

fn walk_paths(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        // A missing root surfaces as an error instead of an empty walk.
        for entry in WalkDir::new(path).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                Error::Cache(format!("Failed to read {}: {}", path.display(), e))
            })?;
            if !entry.file_type().is_dir() {
                files.push(entry.into_path());
            }
        }
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_sha256() {
        assert_eq!(
            fingerprint(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_sanitize_key() {
        assert_eq!(sanitize_key("my/cache/key"), "my_cache_key");
        assert_eq!(sanitize_key("build: release"), "build__release");
    }

    #[tokio::test]
    async fn test_key_is_stable_for_same_definition() {
        let a = Job::new("build", "make").with_image("gcc:13");
        let b = Job::new("build", "make").with_image("gcc:13");
        let key = job_cache_key(&a).await.unwrap();
        assert_eq!(key, job_cache_key(&b).await.unwrap());
        assert!(key.starts_with("build-"));
    }

    #[tokio::test]
    async fn test_key_changes_with_definition() {
        let base = job_cache_key(&Job::new("build", "make")).await.unwrap();
        let shell = job_cache_key(&Job::new("build", "make all")).await.unwrap();
        let env = job_cache_key(&Job::new("build", "make").with_env("CC", "clang"))
            .await
            .unwrap();
        assert_ne!(base, shell);
        assert_ne!(base, env);
    }

    #[tokio::test]
    async fn test_key_changes_with_input_content() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("Cargo.lock");
        std::fs::write(&input, "v1").unwrap();
        let job = Job::new("build", "make").with_inputs([input.clone()]);

        let first = job_cache_key(&job).await.unwrap();
        std::fs::write(&input, "v2").unwrap();
        let second = job_cache_key(&job).await.unwrap();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_missing_input_is_an_error() {
        let job = Job::new("build", "make").with_inputs(["/nonexistent/input"]);
        assert!(matches!(job_cache_key(&job).await, Err(Error::Cache(_))));
    }

    #[tokio::test]
    async fn test_expand_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("out/sub")).unwrap();
        std::fs::write(dir.path().join("out/b.txt"), "b").unwrap();
        std::fs::write(dir.path().join("out/sub/a.txt"), "a").unwrap();

        let files = expand_paths(&[dir.path().join("out")]).await.unwrap();
        assert_eq!(
            files,
            vec![dir.path().join("out/b.txt"), dir.path().join("out/sub/a.txt")]
        );
    }

    #[tokio::test]
    async fn test_expand_keeps_files_and_rejects_missing_paths() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("report.xml");
        std::fs::write(&file, "<ok/>").unwrap();

        assert_eq!(expand_paths(&[file.clone()]).await.unwrap(), vec![file]);
        assert!(matches!(
            expand_paths(&[dir.path().join("missing")]).await,
            Err(Error::Cache(_))
        ));
    }
}
