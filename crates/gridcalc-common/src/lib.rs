pub mod coord;
pub mod datetime;
pub mod error;
pub mod value;

pub use coord::*;
pub use datetime::*;
pub use error::*;
pub use value::*;
