// ComTerm - Serial terminal redirector
use clap::Parser;
use comterm::cli::args::Args;
use comterm::cli::commands::{config_manager, execute_command};
use comterm::infrastructure::logging::init_logging;

fn main() {
    let args = Args::parse();

    let loaded = config_manager(&args).and_then(|manager| {
        let config = manager.load_config()?;
        Ok((manager, config))
    });
    let (manager, config) = match loaded {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(e.exit_code());
        }
    };

    let level = if args.verbose {
        "debug"
    } else {
        config.global.log_level.as_str()
    };
    if let Err(e) = init_logging(level, args.trace_file.as_deref()) {
        eprintln!("Warning: {:#}", e);
    }

    std::process::exit(execute_command(args, &manager, &config));
}
