/// Lightweight harness for router + backend integration tests
///
/// This module starts a whole store topology in-process on ephemeral
/// loopback ports, each store with its own temporary root, and a protocol
/// level client to drive it.
///
/// # Example
///
/// ```rust,ignore
/// use service::testkit::TestCluster;
///
/// #[tokio::test]
/// async fn test_upload() -> anyhow::Result<()> {
///     let cluster = TestCluster::start().await?;
///     let client = cluster.client();
///
///     let status = client.upload_bytes("notes.txt", b"hi", "~S1/docs").await?;
///     assert_eq!(status, "SUCCESS: TXT stored in S3");
///
///     cluster.shutdown().await;
///     Ok(())
/// }
/// ```
mod client;
mod cluster;

pub use client::{TarResponse, TestClient};
pub use cluster::{TestCluster, TestStore};
