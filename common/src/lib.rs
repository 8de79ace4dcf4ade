pub mod logger;

pub use logger::init::init_logger;
pub use logger::trace_id::TraceId;
