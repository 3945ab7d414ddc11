pub mod backend;
pub mod parallel;

pub use backend::*;
pub use parallel::*;
