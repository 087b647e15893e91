pub mod errors;
pub mod objective;
pub mod point;
pub mod space;

pub use errors::*;
pub use objective::*;
pub use point::*;
pub use space::*;
