//! `archgate` binary entry point

use archgate_cli::{cli, exit, run};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let matches = cli().get_matches();
    let mut stdout = std::io::stdout().lock();

    let code = match run(&matches, &mut stdout) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            exit::FAILURE
        }
    };
    std::process::exit(code);
}
