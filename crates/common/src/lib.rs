/**
 * Bundling a store's native files into one
 *  archive for `downltar`.
 */
pub mod archive;
/**
 * Virtual paths rooted at the mount token
 *  and their resolution onto physical roots.
 */
pub mod path;
/**
 * Command lines, status replies and the
 *  length-prefixed transfer envelope.
 */
pub mod protocol;
/**
 * Extension keyed placement of files
 *  across the router and its backends.
 */
pub mod routing;
pub mod store;
/**
 * Helper for setting build version information
 *  at compile time.
 */
pub mod version;

pub mod prelude {
    pub use crate::archive::{ArchiveBuilder, ArchiveError, BuiltArchive, TarArchiveBuilder};
    pub use crate::path::{MountToken, PathError, VirtualPath, DEFAULT_MOUNT_TOKEN};
    pub use crate::protocol::{Command, CommandError, Header, Reply, TransferError, Verb};
    pub use crate::routing::{
        BackendId, Extension, ExtensionError, Placement, RouteError, StoreAssignment,
    };
    pub use crate::store::{LocalStore, StoreError};
    pub use crate::version::build_info;
}
