pub mod command;
pub mod config;
pub mod node;
pub mod refresh;

pub use command::*;
pub use config::*;
pub use node::*;
pub use refresh::*;
