//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module    | Commands handled                                        |
//! |-----------|---------------------------------------------------------|
//! | `session` | `Create`, `Join`, `Resume`, `Status`, `Reveal`, `Reset` |
//! | `info`    | `Levels`, `History`, `Export`                           |
//! | `config`  | `Config`                                                |

pub mod config;
pub mod info;
pub mod session;

pub use config::cmd_config;
pub use info::{cmd_export, cmd_history, cmd_levels};
pub use session::{cmd_create, cmd_join, cmd_reset, cmd_resume, cmd_reveal, cmd_status};
