//! 🧰 rctk — the cloud toolkit behind the `rctk` binary.
//!
//! Three pieces do the real work: the paginator ([`pagination`]), the retry policy
//! ([`retry`]) and the provisioner ([`provisioning`]). Everything else plugs AWS
//! into them ([`backends`]) or plugs the command line into AWS ([`commands`]).

pub mod app_config;
pub mod backends;
pub mod batch;
pub mod commands;
pub mod common;
pub mod pagination;
pub mod progress;
pub mod provisioning;
pub mod retry;
pub mod sql;
pub mod update_expression;
