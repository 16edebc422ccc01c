use clap::{App, Arg, ArgMatches};
use log::LevelFilter;
use simplelog::{ColorChoice, Config, SimpleLogger, TermLogger, TerminalMode};

pub use crate::compiler::error::{RUNTIME_ERROR_STATUS, SEMANTIC_ERROR_CODE, SYNTACTIC_ERROR_CODE};

/// Exit code for failures of the driver itself (unreadable input file,
/// unwritable output file), as opposed to failures of the program being
/// compiled.
pub const ERR_IO_ERROR: i32 = 1;

pub fn configure_cli() -> clap::App<'static, 'static> {
    let app = App::new("Bryony Compiler")
        .version("0.1.0")
        .about("Compiles Bryony parse trees into ARM assembly for use by the GNU assembler")
        .arg(
            Arg::with_name("input")
                .short("i")
                .long("input")
                .takes_value(true)
                .required(true)
                .help("Parse-tree JSON file produced by the front end"),
        )
        .arg(
            Arg::with_name("output")
                .short("o")
                .long("output")
                .takes_value(true)
                .required(true)
                .help("Name of the output file that the assembly will be written to"),
        )
        .arg(
            Arg::with_name("log")
                .long("log")
                .takes_value(true)
                .possible_values(&["debug", "info", "error"])
                .help("Writes the compiler's internal log to the terminal at the given level"),
        );
    app
}

pub fn get_log_level(args: &ArgMatches) -> Option<LevelFilter> {
    match args.value_of("log") {
        Some("debug") => Some(LevelFilter::Debug),
        Some("info") => Some(LevelFilter::Info),
        Some("error") => Some(LevelFilter::Error),
        _ => None,
    }
}

pub fn configure_logging(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    TermLogger::init(level, Config::default(), TerminalMode::Mixed, ColorChoice::Auto)
        .or_else(|_| SimpleLogger::init(level, Config::default()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_level_argument_is_parsed() {
        let app = configure_cli();
        let matches = app.get_matches_from(vec![
            "bryonyc", "-i", "in.json", "-o", "out.s", "--log", "debug",
        ]);
        assert_eq!(get_log_level(&matches), Some(LevelFilter::Debug));

        let matches =
            configure_cli().get_matches_from(vec!["bryonyc", "-i", "in.json", "-o", "out.s"]);
        assert_eq!(get_log_level(&matches), None);
    }

    #[test]
    fn logger_initialises_once() {
        assert!(configure_logging(LevelFilter::Error).is_ok());
    }
}
