use std::io::IsTerminal;
use std::process::ExitCode;

use clap::{ArgAction, ArgGroup, Parser};
use tracing::error;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::prelude::*;

mod run;

use crate::run::RunOpt;

#[derive(Parser)]
#[command(version, author, about, group = ArgGroup::new("format"))]
struct Opt {
    /// Increase the level of verbosity. Can be used multiple times.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Force colored output. Default is to check if the output is a tty
    #[arg(short = 'c', long, global = true, group = "format")]
    color: bool,

    /// Force non-colored output. Default is to check if the output is a tty
    #[arg(short = 'C', long, global = true, group = "format")]
    no_color: bool,

    /// Use JSON output for log messages
    #[arg(short, long, global = true, group = "format")]
    json: bool,

    #[command(flatten)]
    run: RunOpt,
}

impl Opt {
    const fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "synacor_emulator=info,synacor_cli=info,warn",
            2 => "synacor_emulator=debug,synacor_cli=debug,info",
            3 => "synacor_emulator=trace,synacor_cli=trace,info",
            4..=u8::MAX => "trace",
        }
    }

    fn should_use_colors(&self) -> bool {
        if self.color {
            true
        } else if self.no_color {
            false
        } else {
            // Logs go to stderr, stdout belongs to the program
            std::io::stderr().is_terminal()
        }
    }

    fn filter_layer(&self) -> EnvFilter {
        // Parse log level from env
        EnvFilter::try_from_default_env()
            // or infer from args
            .unwrap_or_else(|_| EnvFilter::new(self.log_filter()))
    }
}

fn main() -> ExitCode {
    // First, parse the arguments
    let opt = Opt::parse();

    // Then, setup the tracing formatter for logging and instrumentation
    let registry = tracing_subscriber::Registry::default().with(opt.filter_layer());

    if opt.json {
        let json_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr);
        registry.with(json_layer).init();
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .without_time()
            .with_ansi(opt.should_use_colors())
            .with_target(false)
            .with_writer(std::io::stderr);
        registry.with(fmt_layer).init();
    }

    // And run the program
    match opt.run.exec() {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn command_test() {
        Opt::command().debug_assert();
    }

    #[test]
    fn verbosity_test() {
        let opt = Opt::parse_from(["synacor", "challenge.bin"]);
        assert_eq!(opt.log_filter(), "warn");

        let opt = Opt::parse_from(["synacor", "-vv", "challenge.bin"]);
        assert_eq!(opt.log_filter(), "synacor_emulator=debug,synacor_cli=debug,info");

        let opt = Opt::parse_from(["synacor", "-vvvvvv", "challenge.bin"]);
        assert_eq!(opt.log_filter(), "trace");
    }

    #[test]
    fn color_flags_conflict_test() {
        let res = Opt::try_parse_from(["synacor", "--color", "--no-color", "challenge.bin"]);
        assert!(res.is_err());

        let opt = Opt::parse_from(["synacor", "--no-color", "challenge.bin"]);
        assert!(!opt.should_use_colors());
    }
}
