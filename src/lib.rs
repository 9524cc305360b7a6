pub mod config;
pub mod delivery;
pub mod domain;
pub mod error;
pub mod getchips;
pub mod lookup;
pub mod nexar;
pub mod output;
pub mod pipeline;
pub mod sheet;
pub mod token;
pub mod watcher;
