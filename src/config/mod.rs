//! Configuration: network groups, per-group tuning and the config file

mod file;
mod group;

pub use file::{ConfigFile, GroupOverride, Settings};
pub use group::{GroupParams, NetworkGroup, ParamsTable};
