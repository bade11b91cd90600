mod common;

use crate::common::{cluster, payload, tar_entries};
use service::testkit::TarResponse;

#[tokio::test]
async fn test_native_round_trip_sizes() {
    let cluster = cluster().await;
    let client = cluster.client();

    for len in [0, 1, 1023, 1024, 1025, 3 * 1024 * 1024] {
        let name = format!("size_{}.c", len);
        let data = payload(len);

        let status = client.upload_bytes(&name, &data, "~S1/sizes").await.unwrap();
        assert_eq!(status, "SUCCESS: File uploaded to S1");

        let downloaded = client
            .download(&format!("~S1/sizes/{}", name))
            .await
            .unwrap()
            .expect("file should exist");
        assert_eq!(downloaded.len(), len);
        assert_eq!(downloaded, data);
    }

    cluster.shutdown().await;
}

#[tokio::test]
async fn test_native_upload_lands_under_router_root() {
    let cluster = cluster().await;
    let client = cluster.client();

    let status = client
        .upload_bytes("sample.c", b"int main() {}", "~S1/folder1/folder2")
        .await
        .unwrap();
    assert_eq!(status, "SUCCESS: File uploaded to S1");

    let stored = cluster.router().path("folder1/folder2/sample.c");
    assert_eq!(std::fs::read(stored).unwrap(), b"int main() {}");
    // no backend sees native files
    for backend in cluster.backends() {
        assert!(!backend.path("folder1").exists());
    }

    cluster.shutdown().await;
}

#[tokio::test]
async fn test_upload_file_from_disk_overwrites() {
    let cluster = cluster().await;
    let client = cluster.client();
    let scratch = tempfile::TempDir::new().unwrap();
    let local = scratch.path().join("main.c");

    std::fs::write(&local, b"first version").unwrap();
    client.upload_file(&local, "~S1").await.unwrap();
    std::fs::write(&local, b"v2").unwrap();
    let status = client.upload_file(&local, "~S1").await.unwrap();
    assert_eq!(status, "SUCCESS: File uploaded to S1");

    assert_eq!(
        client.download("~S1/main.c").await.unwrap(),
        Some(b"v2".to_vec())
    );

    cluster.shutdown().await;
}

#[tokio::test]
async fn test_native_remove() {
    let cluster = cluster().await;
    let client = cluster.client();

    client.upload_bytes("gone.c", b"x", "~S1/docs").await.unwrap();
    assert_eq!(
        client.remove("~S1/docs/gone.c").await.unwrap(),
        "SUCCESS: File deleted from S1"
    );
    assert!(!cluster.router().path("docs/gone.c").exists());
    assert_eq!(
        client.remove("~S1/docs/gone.c").await.unwrap(),
        "ERROR: File not found"
    );

    cluster.shutdown().await;
}

#[tokio::test]
async fn test_native_tar_contains_every_c_file() {
    let cluster = cluster().await;
    let client = cluster.client();

    client.upload_bytes("a.c", b"a", "~S1/docs").await.unwrap();
    client.upload_bytes("b.c", b"bb", "~S1/docs/sub").await.unwrap();
    client.upload_bytes("top.c", b"top", "~S1").await.unwrap();

    let TarResponse::Archive(bytes) = client.tar(".c").await.unwrap() else {
        panic!("expected an archive");
    };
    assert_eq!(
        tar_entries(&bytes),
        vec![
            ("docs/a.c".to_string(), b"a".to_vec()),
            ("docs/sub/b.c".to_string(), b"bb".to_vec()),
            ("top.c".to_string(), b"top".to_vec()),
        ]
    );

    cluster.shutdown().await;
}

#[tokio::test]
async fn test_native_tar_without_files_is_empty_archive() {
    let cluster = cluster().await;

    let TarResponse::Archive(bytes) = cluster.client().tar(".c").await.unwrap() else {
        panic!("expected an archive");
    };
    assert!(!bytes.is_empty());
    assert!(tar_entries(&bytes).is_empty());

    cluster.shutdown().await;
}
