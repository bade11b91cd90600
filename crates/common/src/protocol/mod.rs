//! The extstore wire protocol.
//!
//! One connection carries exactly one request. The caller writes a single
//! space-delimited command line; what follows depends on the verb:
//!
//! | Verb | Args | Response |
//! |---|---|---|
//! | `uploadf` | file name, virtual dest dir | `READY`, envelope in, status text |
//! | `downlf` | virtual path | envelope out (`-1` on failure) |
//! | `removef` | virtual path | status text |
//! | `downltar` | extension | envelope out, or a bare error string |
//! | `dispfnames` | virtual path | newline separated virtual paths |
//!
//! Status text and listings carry no terminator: the responder closes the
//! connection when it is done. File bodies always travel inside an
//! [envelope](envelope): a little-endian `i64` size followed by exactly that
//! many bytes.

mod command;
pub mod envelope;
mod reply;

pub use command::{
    read_command_line, write_command, Command, CommandError, Verb, COMMAND_SETTLE, MAX_COMMAND_LEN,
};
pub use envelope::{Header, TransferError, CHUNK_SIZE, DEFAULT_IDLE_TIMEOUT};
pub use reply::{
    expect_ready, read_reply, read_until_close, write_ready, write_reply, Reply, MAX_REPLY_LEN,
    READY,
};
