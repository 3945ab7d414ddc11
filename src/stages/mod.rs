pub mod acquire;
pub mod generate;
pub mod select;

pub use acquire::*;
pub use generate::*;
pub use select::*;
