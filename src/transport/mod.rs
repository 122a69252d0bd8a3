mod error;
#[cfg(test)]
pub mod mock;
pub mod tcp;
pub mod traits;

pub use error::TransportError;
pub use tcp::TcpCloudTransport;
pub use traits::{CloudTransport, InboundEvent, Readiness};
