//! Builtin Commands
//!
//! This module contains implementations of shell builtin commands.

pub mod cd_cmd;
pub mod exit_cmd;
pub mod pwd_cmd;

pub use cd_cmd::handle_cd;
pub use exit_cmd::handle_exit;
pub use pwd_cmd::handle_pwd;
