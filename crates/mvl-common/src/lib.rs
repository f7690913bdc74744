pub mod directory;
pub mod props;
pub mod protocol;
pub mod region;
pub mod replay;
pub mod results;
pub mod room;
pub mod room_code;
pub mod sim;

/// Version string sent in the lobby handshake.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
