//! Shared helpers for cluster integration tests
#![allow(dead_code)]

use std::io::Read;
use std::path::Path;

use service::testkit::TestCluster;

/// Start the default four store cluster with test logging enabled.
pub async fn cluster() -> TestCluster {
    init_tracing();
    TestCluster::start().await.unwrap()
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Deterministic, non-repeating-at-chunk-size content.
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Entry names and bodies of a tar archive held in memory.
pub fn tar_entries(bytes: &[u8]) -> Vec<(String, Vec<u8>)> {
    let mut archive = tar::Archive::new(bytes);
    let mut entries = Vec::new();
    for entry in archive.entries().unwrap() {
        let mut entry = entry.unwrap();
        let name = entry.path().unwrap().to_string_lossy().into_owned();
        let mut body = Vec::new();
        entry.read_to_end(&mut body).unwrap();
        entries.push((name, body));
    }
    entries.sort();
    entries
}

/// Number of regular files anywhere under `root`.
pub fn count_files(root: &Path) -> usize {
    let Ok(entries) = std::fs::read_dir(root) else {
        return 0;
    };
    entries
        .map(|entry| entry.unwrap())
        .map(|entry| {
            let file_type = entry.file_type().unwrap();
            if file_type.is_dir() {
                count_files(&entry.path())
            } else {
                usize::from(file_type.is_file())
            }
        })
        .sum()
}
