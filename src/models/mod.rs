pub mod classification;
pub mod feedback;
pub mod rubric;
pub mod transcript;

pub use classification::*;
pub use feedback::*;
pub use rubric::*;
pub use transcript::*;
