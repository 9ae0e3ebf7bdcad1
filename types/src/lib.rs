pub mod config;
pub mod job;
pub mod outcome;
pub mod run;
pub mod step;

pub use config::*;
pub use job::*;
pub use outcome::*;
pub use run::*;
pub use step::*;
