pub mod interval;
pub mod model;
pub mod store;
