pub mod backend;
pub mod health;
pub mod init;
pub mod router;
mod serve;
pub mod version;

pub use backend::Backend;
pub use health::Health;
pub use init::Init;
pub use router::Router;
pub use version::Version;
