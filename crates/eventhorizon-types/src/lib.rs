pub mod flags;
pub mod github;
pub mod patch;
pub mod policy;
pub mod resource;
pub mod tasks;
pub mod tenancy;
pub mod turn_log;

pub use flags::*;
pub use github::*;
pub use patch::*;
pub use policy::*;
pub use resource::*;
pub use tasks::*;
pub use tenancy::*;
pub use turn_log::*;
