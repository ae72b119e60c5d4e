//! The provisioning command

pub mod handler;
pub mod output;

pub use handler::handle_provision_command;
