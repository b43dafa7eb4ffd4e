pub mod catalog;
pub mod cross;
pub mod diff;
pub mod error;
pub mod git;
pub mod github;
pub mod io;
pub mod lock;
pub mod merge;
pub mod promote;
pub mod yaml;

pub use error::{CaravelError, Result};
