pub mod config_io;
pub mod script_io;

pub use config_io::{ConfigError, load_config, read_config, render_config};
pub use script_io::{Script, ScriptError, Step, parse_script, read_script};
