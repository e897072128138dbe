pub mod instrument;
pub mod operator;

pub use instrument::*;
pub use operator::*;
