//! Resource reconcilers

pub mod cloudformation;
pub mod iamrole;
pub mod loadbalancer;
pub mod s3bucket;

pub use cloudformation::{StackResource, StackState};
pub use iamrole::{RoleResource, RoleState};
pub use loadbalancer::{LoadBalancerResource, LoadBalancerState};
pub use s3bucket::{BucketResource, BucketState};
