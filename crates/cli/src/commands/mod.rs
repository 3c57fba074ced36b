pub mod config_cmd;
pub mod credentials;
pub mod nodes;
pub mod providers;
pub mod run;
