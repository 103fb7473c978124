use crate::cli::args::{Args, Command, ConfigCommand, ConnectArgs, OutputFormat};
use crate::cli::output::{ConsoleWriter, OutputWriter, StderrReporter};
use crate::core::console::LogSink;
use crate::core::device::DeviceScanner;
use crate::core::session::{Collaborators, SessionOrchestrator, SessionResult};
use crate::domain::config::ComTermConfig;
use crate::domain::error::{exit_code, ComTermResult};
use crate::infrastructure::config::ConfigManager;
use crate::infrastructure::console::CrosstermConsole;
use crate::infrastructure::log_writer::LogWriter;
use crate::infrastructure::serial::{SerialPortOpener, SerialPortScanner};
use std::io;
use std::sync::Arc;
use tracing::info;

/// Pick the configuration file named on the command line, or the per-user one.
pub fn config_manager(args: &Args) -> ComTermResult<ConfigManager> {
    match &args.config {
        Some(path) => Ok(ConfigManager::with_path(path)),
        None => ConfigManager::new(),
    }
}

/// Execute CLI command and return the process exit code
pub fn execute_command(args: Args, manager: &ConfigManager, config: &ComTermConfig) -> i32 {
    let format = args.output;
    let writer = ConsoleWriter::new(format);

    let outcome = match args.command {
        Command::Connect(connect) => execute_connect(connect, format, config),
        Command::List => execute_list(&writer),
        Command::Config(config_args) => match config_args.command {
            ConfigCommand::Show => writer.write_config(config).map_err(Into::into),
            ConfigCommand::Init => manager.init_config().and_then(|path| {
                writer
                    .write_message(&format!("Configuration written to {}", path.display()))
                    .map_err(Into::into)
            }),
        }
        .map(|()| exit_code::SUCCESS),
        Command::Version => writer
            .write_message(&format!("comterm {}", env!("CARGO_PKG_VERSION")))
            .map(|()| exit_code::SUCCESS)
            .map_err(Into::into),
    };

    match outcome {
        Ok(code) => code,
        Err(e) => {
            if let Err(output_error) = writer.write_error(&e.to_string()) {
                eprintln!("Error: {} ({})", e, output_error);
            }
            e.exit_code()
        }
    }
}

fn execute_list(writer: &ConsoleWriter) -> ComTermResult<i32> {
    let devices = SerialPortScanner::new().scan_devices()?;
    writer.write_devices(&devices)?;
    Ok(exit_code::SUCCESS)
}

fn execute_connect(
    connect: ConnectArgs,
    format: OutputFormat,
    config: &ComTermConfig,
) -> ComTermResult<i32> {
    let session = connect.into_session_config(config)?;
    let log = session
        .log_file
        .as_ref()
        .map(LogWriter::open)
        .transpose()?
        .map(|writer| Arc::new(writer) as Arc<dyn LogSink>);

    let collaborators = Collaborators {
        opener: Box::new(SerialPortOpener::new()),
        consoles: Box::new(CrosstermConsole::new()),
        scanner: Box::new(SerialPortScanner::new()),
        reporter: Box::new(StderrReporter::new(format)),
    };

    let batch = session.batch;
    let mut orchestrator = SessionOrchestrator::new(session, collaborators);
    if let Some(log) = log {
        orchestrator = orchestrator.with_log(log);
    }

    let result = if batch {
        orchestrator.run_batch(Box::new(io::stdin()), Box::new(io::stdout()))?
    } else {
        orchestrator.run()?
    };
    info!("Finished after {} session(s)", orchestrator.sessions());
    Ok(session_exit_code(&result))
}

/// Surfaced failures make an otherwise clean exit a runtime error.
pub fn session_exit_code(result: &SessionResult) -> i32 {
    if result.errors.is_empty() {
        exit_code::SUCCESS
    } else {
        exit_code::RUNTIME_IO
    }
}
