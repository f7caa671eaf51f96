//! # stereo-depth
//!
//! Computes a depth image from a stereo pair. The configuration is read from `stereo.json` in the
//! working directory when that file exists, otherwise the built-in defaults are used. Set
//! `RUST_LOG` to control the log output.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use log::error;

use stereo_depth::config::GlobalConfig;
use stereo_depth::pipeline;
use stereo_depth::Result;

// -----------------------------------------------------------------------------------------------
// CONSTANTS
// -----------------------------------------------------------------------------------------------

const CONFIG_FILE: &str = "stereo.json";

// -----------------------------------------------------------------------------------------------
// FUNCTIONS
// -----------------------------------------------------------------------------------------------

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = try_main() {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn try_main() -> Result<()> {
    let cfg = GlobalConfig::load_or_default(CONFIG_FILE)?;

    let output = pipeline::run(&cfg)?;
    pipeline::write_outputs(&output, &cfg)?;

    Ok(())
}
