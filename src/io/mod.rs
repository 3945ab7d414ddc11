pub mod input;
pub mod output;
pub mod publish;
pub mod store;
pub mod transcribe;

pub use input::*;
pub use output::*;
pub use publish::*;
pub use store::*;
pub use transcribe::*;
