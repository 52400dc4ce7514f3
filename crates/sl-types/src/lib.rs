pub mod config;
pub mod errors;
pub mod params;
pub mod run;

pub use config::*;
pub use errors::*;
pub use params::*;
pub use run::*;
