//! Stack composer adapters
//!
//! One adapter per template domain. Logical ids referenced across adapters
//! are defined next to the adapter that declares them.

pub mod compute;
pub mod dns;
pub mod encryption;
pub mod host_iam;
pub mod iam;
pub mod monitoring;
pub mod network;

pub use compute::ComputeAdapter;
pub use dns::DnsAdapter;
pub use encryption::EncryptionAdapter;
pub use host_iam::HostIamAdapter;
pub use iam::GuestIamAdapter;
pub use monitoring::MonitoringAdapter;
pub use network::NetworkAdapter;
