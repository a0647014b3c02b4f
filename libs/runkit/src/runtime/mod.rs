pub(crate) mod lifecycle;
mod resolver;
pub(crate) mod runner;
pub(crate) mod shutdown;
pub mod signals;

pub use runner::ShutdownOptions;
pub use shutdown::ShutdownReport;
