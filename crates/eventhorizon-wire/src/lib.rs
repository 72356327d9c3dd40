pub mod conflict;
pub mod envelope;
pub mod turn_logs;

pub use conflict::*;
pub use envelope::*;
pub use turn_logs::*;
