// Surface handed to the presentation layer.

pub mod services;
pub mod simple;

pub use services::OfflineServices;
pub use simple::init_tracing;
