//! Application layer: use cases depending only on traits and domain types.

pub mod dispatch_command;
