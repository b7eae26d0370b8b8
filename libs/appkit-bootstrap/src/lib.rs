pub mod cache;
pub mod config;
pub mod logging;
pub mod signals;

pub use cache::*;
pub use config::*;
pub use logging::*;
pub use signals::*;
