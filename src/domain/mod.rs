mod title;
mod types;

pub use title::*;
pub use types::*;
