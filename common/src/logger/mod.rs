pub mod init;
pub mod macros;
pub mod trace_id;
