pub mod availability;
pub mod clock;
pub mod engine;
pub mod error;
pub mod identity;
pub mod lifecycle;
pub mod notifier;
pub mod types;
