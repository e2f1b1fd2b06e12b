//! Multiplayer: wire vocabulary, host authority, remote shadows, transport

pub mod authority;
pub mod protocol;
pub mod shadow;
pub mod transport;

pub use authority::{NetRole, NetworkAuthority};
pub use protocol::{Envelope, NetError, NetMsg};
pub use transport::{Inbox, Transport};
