//! Lock decision host for the app lock accessibility service.
//!
//! Runs as a child process of the service, speaking the length-prefixed JSON
//! protocol on stdin/stdout until the service closes the pipe.

#![allow(
    clippy::print_stderr,
    reason = "stderr is the only channel left once stdout carries frames"
)]

use applock_lib::{
    config::{default_config_path, default_db_path},
    host::NativeHost,
    AppContext, EngineConfig,
};
use std::io;

fn start() -> applock_lib::Result<()> {
    let config = EngineConfig::load(&default_config_path()?)?;
    let context = AppContext::open(&default_db_path()?, config)?;
    let host = NativeHost::new(context);
    host.run(io::stdin(), io::stdout())
}

fn main() {
    if let Err(e) = start() {
        eprintln!("Lock host error: {e}");
        std::process::exit(1);
    }
}
