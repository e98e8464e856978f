mod health;
mod search;

pub use health::*;
pub use search::*;
