//! Network plumbing: Ethernet link, TCP socket wrapper and errors

pub mod error;
pub mod link;
pub mod socket;

pub use error::NetworkError;
pub use link::EthernetLink;
pub use socket::AsyncTcpSocket;
