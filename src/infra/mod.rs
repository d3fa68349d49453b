mod content;
mod keys;
mod settings;
mod telnet;

pub use content::*;
pub use keys::*;
pub use settings::*;
pub use telnet::*;
