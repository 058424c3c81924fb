//! Culling module
pub mod policy;

pub use self::policy::CullingPolicy;
