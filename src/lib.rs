pub mod bot_command_handlers;
pub mod bot_command_helpers;
pub mod constants;
pub mod data_types;
pub mod db_operations;
pub mod errors;
pub mod selfservice;
pub mod session_cache;
pub mod shared_main;
