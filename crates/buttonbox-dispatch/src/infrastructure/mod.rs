//! Infrastructure layer: settings persistence, the UDP sender, the
//! connection monitor, and LAN peer discovery.

pub mod discovery;
pub mod monitor;
pub mod sender;
pub mod settings;
