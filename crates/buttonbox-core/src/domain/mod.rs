//! Domain value types with no protocol or OS dependencies.

pub mod endpoint;

pub use endpoint::{Endpoint, EndpointError};
