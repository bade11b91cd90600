//! Request steps that act on a store's own root. Shared by the router, for
//! its native extension, and by every backend store.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncWrite};

use common::archive::{ArchiveBuilder, BuiltArchive};
use common::path::VirtualPath;
use common::protocol::envelope::{self, Header};
use common::protocol::{Reply, TransferError};
use common::store::LocalStore;

use crate::error::ServiceError;

/// Receive an upload body into `<dest>/<file_name>` under the store root,
/// creating missing directories first.
///
/// `Ok(Err(reply))` is a failure the client should be told about. A
/// truncated or stalled body is left on disk as received.
pub(crate) async fn receive_upload<S>(
    stream: &mut S,
    store: &LocalStore,
    dest: &VirtualPath,
    file_name: &str,
    idle: Duration,
) -> Result<Result<PathBuf, Reply>, ServiceError>
where
    S: AsyncRead + Unpin,
{
    let dir = match store.materialize_dir(dest).await {
        Ok(dir) => dir,
        Err(e) => {
            tracing::warn!(error = %e, "cannot materialize {}", dest);
            drain_upload(stream, idle).await?;
            return Ok(Err(Reply::CreateDirFailed));
        }
    };
    let target = dir.join(file_name);
    match receive_body(stream, &target, idle).await? {
        Ok(len) => {
            tracing::debug!(len, "stored {:?}", target);
            Ok(Ok(target))
        }
        Err(reply) => Ok(Err(reply)),
    }
}

/// Receive one envelope into `target`, creating or truncating it.
pub(crate) async fn receive_body<S>(
    stream: &mut S,
    target: &Path,
    idle: Duration,
) -> Result<Result<u64, Reply>, ServiceError>
where
    S: AsyncRead + Unpin,
{
    let len = match envelope::read_header_within(stream, idle).await {
        Ok(Header::Size(len)) => len,
        Ok(Header::Failed) => {
            tracing::info!("uploader reported a failed transfer");
            return Ok(Err(Reply::TransferFailed));
        }
        Err(e) => {
            tracing::warn!(error = %e, "no size field from uploader");
            return Ok(Err(Reply::TransferFailed));
        }
    };

    let mut file = match File::create(target).await {
        Ok(file) => file,
        Err(e) => {
            tracing::warn!(error = %e, "cannot create {:?}", target);
            envelope::discard_body(stream, len, idle).await?;
            return Ok(Err(Reply::CreateFileFailed));
        }
    };

    match envelope::copy_exact(stream, &mut file, len, idle).await {
        Ok(received) => Ok(Ok(received)),
        Err(e) => {
            tracing::warn!(error = %e, "upload into {:?} failed", target);
            Ok(Err(Reply::TransferFailed))
        }
    }
}

/// Consume an upload body that will not be stored.
pub(crate) async fn drain_upload<S>(stream: &mut S, idle: Duration) -> Result<(), ServiceError>
where
    S: AsyncRead + Unpin,
{
    if let Header::Size(len) = envelope::read_header_within(stream, idle).await? {
        envelope::discard_body(stream, len, idle).await?;
    }
    Ok(())
}

/// Stream `path` as an envelope, or the failure sentinel if it cannot be
/// opened.
pub(crate) async fn send_file_or_failure<S>(
    stream: &mut S,
    path: &Path,
    idle: Duration,
) -> Result<(), ServiceError>
where
    S: AsyncWrite + Unpin,
{
    match envelope::send_file(stream, path, idle).await {
        Ok(len) => {
            tracing::debug!(len, "sent {:?}", path);
            Ok(())
        }
        Err(TransferError::Source(e)) => {
            tracing::warn!(error = %e, "cannot open {:?}", path);
            envelope::write_failure(stream).await?;
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Build an archive of every native file in `store` and stream it.
pub(crate) async fn send_native_archive<S>(
    stream: &mut S,
    store: &LocalStore,
    archiver: &Arc<dyn ArchiveBuilder>,
    idle: Duration,
) -> Result<(), ServiceError>
where
    S: AsyncWrite + Unpin,
{
    let built = match build_native_archive(store.clone(), archiver.clone()).await {
        Ok(built) => built,
        Err(e) => {
            tracing::warn!(error = %e, "cannot build {} archive", store.extension());
            envelope::write_failure(stream).await?;
            return Ok(());
        }
    };
    tracing::info!(len = built.len(), "sending {} archive", store.extension());
    send_file_or_failure(stream, built.path(), idle).await
}

async fn build_native_archive(
    store: LocalStore,
    archiver: Arc<dyn ArchiveBuilder>,
) -> Result<BuiltArchive, ServiceError> {
    tokio::task::spawn_blocking(move || {
        let files = store.native_files()?;
        let built = archiver.build(store.root(), &files)?;
        Ok::<_, ServiceError>(built)
    })
    .await?
}
