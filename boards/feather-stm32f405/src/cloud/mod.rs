//! Cloud side of the bootstrap: credentials, provisioning and the hub link

pub mod hub;
pub mod keystore;
pub mod mqtt;
pub mod provisioning;
pub mod sas;

pub use hub::LinkedHub;
pub use keystore::KeyStore;
pub use mqtt::run_cloud_link;
pub use provisioning::PreassignedAuthority;
