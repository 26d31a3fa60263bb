//! One module per subcommand.  Each exposes an `execute` function that
//! takes the resolved `Context` plus the subcommand's arguments.

pub mod add;
#[cfg(feature = "audit-log")]
pub mod audit_cmd;
pub mod change_password;
pub mod delete;
pub mod edit;
pub mod init;
pub mod list;
pub mod show;
