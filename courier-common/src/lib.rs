pub mod logging;
pub mod shutdown;

pub use shutdown::Shutdown;

pub use tracing;
