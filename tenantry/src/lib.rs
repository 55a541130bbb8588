pub mod space;

pub mod ctx;
pub mod env;
pub mod err;
pub mod handler;
pub mod quota;
pub mod registry;
pub mod shutdown;
pub mod tenancy;
pub mod topology;

pub use crate::err::TenancyErr;
pub use crate::tenancy::Tenancy;

pub static VERSION: &str = env!("CARGO_PKG_VERSION");
