mod common;

use crate::common::{cluster, payload, tar_entries};
use service::testkit::{TarResponse, TestClient};

#[tokio::test]
async fn test_forwarded_round_trip_removes_staging() {
    let cluster = cluster().await;
    let client = cluster.client();
    let data = payload(3 * 1024 + 7);

    let status = client.upload_bytes("notes.txt", &data, "~S1/docs").await.unwrap();
    assert_eq!(status, "SUCCESS: TXT stored in S3");

    let s3 = cluster.backend("S3").unwrap();
    assert_eq!(std::fs::read(s3.path("docs/notes.txt")).unwrap(), data);

    // the router only staged the body
    let staging_dir = cluster.router().path("docs");
    assert!(!staging_dir.join("notes.txt").exists());
    assert_eq!(std::fs::read_dir(&staging_dir).unwrap().count(), 0);

    assert_eq!(client.download("~S1/docs/notes.txt").await.unwrap(), Some(data));

    cluster.shutdown().await;
}

#[tokio::test]
async fn test_every_extension_is_listed_once() {
    let cluster = cluster().await;
    let client = cluster.client();

    for (name, store) in [
        ("main.c", "S1"),
        ("paper.pdf", "S2"),
        ("notes.txt", "S3"),
        ("bundle.zip", "S4"),
    ] {
        client.upload_bytes(name, b"content", "~S1/mixed").await.unwrap();
        let listing = client.list("~S1/mixed").await.unwrap();
        let expected = format!("~S1/mixed/{}", name);
        assert_eq!(
            listing.lines().filter(|line| *line == expected).count(),
            1,
            "{} missing from listing {:?}",
            expected,
            listing
        );

        let owner = cluster.stores().find(|s| s.name == store).unwrap();
        assert!(owner.path("mixed").join(name).is_file());
    }

    cluster.shutdown().await;
}

#[tokio::test]
async fn test_listing_is_native_then_backend_order() {
    let cluster = cluster().await;
    let client = cluster.client();

    client.upload_bytes("b.txt", b"t", "~S1/docs").await.unwrap();
    client.upload_bytes("a.pdf", b"p", "~S1/docs").await.unwrap();
    client.upload_bytes("main.c", b"c", "~S1/docs").await.unwrap();

    let listing = client.list("~S1/docs").await.unwrap();
    assert_eq!(
        listing.lines().collect::<Vec<_>>(),
        vec!["~S1/docs/main.c", "~S1/docs/a.pdf", "~S1/docs/b.txt"]
    );

    // a missing directory lists as nothing
    assert_eq!(client.list("~S1/nowhere").await.unwrap(), "");

    cluster.shutdown().await;
}

#[tokio::test]
async fn test_forwarded_remove() {
    let cluster = cluster().await;
    let client = cluster.client();

    client.upload_bytes("paper.pdf", b"pdf", "~S1/docs").await.unwrap();
    assert_eq!(
        client.remove("~S1/docs/paper.pdf").await.unwrap(),
        "SUCCESS: PDF deleted from S2"
    );
    assert_eq!(
        client.remove("~S1/docs/paper.pdf").await.unwrap(),
        "ERROR: PDF not found in S2"
    );
    assert_eq!(client.download("~S1/docs/paper.pdf").await.unwrap(), None);

    cluster.shutdown().await;
}

#[tokio::test]
async fn test_forwarded_tar_is_readable() {
    let cluster = cluster().await;
    let client = cluster.client();

    client.upload_bytes("one.txt", b"1", "~S1").await.unwrap();
    client.upload_bytes("two.txt", b"22", "~S1/deep/er").await.unwrap();
    client.upload_bytes("skip.pdf", b"p", "~S1").await.unwrap();

    let TarResponse::Archive(bytes) = client.tar(".txt").await.unwrap() else {
        panic!("expected an archive");
    };
    assert_eq!(
        tar_entries(&bytes),
        vec![
            ("deep/er/two.txt".to_string(), b"22".to_vec()),
            ("one.txt".to_string(), b"1".to_vec()),
        ]
    );

    // no files of that type still yields an archive
    let TarResponse::Archive(bytes) = client.tar(".zip").await.unwrap() else {
        panic!("expected an archive");
    };
    assert!(tar_entries(&bytes).is_empty());

    cluster.shutdown().await;
}

#[tokio::test]
async fn test_backend_answers_directly() {
    let cluster = cluster().await;
    cluster
        .client()
        .upload_bytes("notes.txt", b"hi", "~S1/docs")
        .await
        .unwrap();

    let s3 = TestClient::new(cluster.backend("S3").unwrap().addr);
    assert_eq!(s3.list("~S1/docs").await.unwrap(), "~S1/docs/notes.txt\n");
    assert_eq!(
        s3.download("~S1/docs/notes.txt").await.unwrap(),
        Some(b"hi".to_vec())
    );

    // a bare `downltar` works on a backend
    let response = s3.raw("downltar").await.unwrap();
    let TarResponse::Archive(forwarded) = cluster.client().tar(".txt").await.unwrap() else {
        panic!("expected an archive");
    };
    assert_eq!(tar_entries(&response[8..]), tar_entries(&forwarded));

    cluster.shutdown().await;
}
