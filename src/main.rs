// src/main.rs

use rowflow::{cli, logging, run};

fn main() {
    if let Err(err) = run_main() {
        eprintln!("rowflow error: {err:?}");
        std::process::exit(1);
    }
}

fn run_main() -> anyhow::Result<()> {
    let args = cli::parse();
    logging::init_logging(args.log_level)?;
    run(args)
}
