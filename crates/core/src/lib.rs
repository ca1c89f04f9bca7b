pub mod agent;
pub mod config;
pub mod connection_string;
pub mod conversation;
pub mod database_kind;
pub mod protocol;
pub mod response_decoder;
pub mod result_table;
pub mod session;
