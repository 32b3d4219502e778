pub mod capabilities;
pub mod provider_base;
pub mod providers;

pub use capabilities::*;
pub use providers::*;
