use common::archive::ArchiveError;
use common::protocol::TransferError;
use common::routing::AssignmentError;
use common::store::StoreError;

use crate::router::ForwardError;

/// Failures that end a request or stop a service.
///
/// By the time one of these is returned the peer has already been sent
/// whatever protocol response applied; they only reach the logs.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("connection I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Transfer(#[from] TransferError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error(transparent)]
    Forward(#[from] ForwardError),
    #[error("invalid routing table: {0}")]
    Assignment(#[from] AssignmentError),
    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
