pub mod client;
pub mod prompts;
pub mod rate;
pub mod retry;
pub mod validation;

pub use client::*;
pub use prompts::*;
pub use rate::*;
pub use retry::*;
pub use validation::*;
