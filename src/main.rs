extern crate log;
extern crate simplelog;

use std::fs;
use std::process::exit;

use log::info;

use bryony_lang::cli::*;
use bryony_lang::compiler::error::ErrorList;
use bryony_lang::compiler::{compile, parsetree};

fn main() {
    let config = configure_cli().get_matches();

    if let Some(level) = get_log_level(&config) {
        configure_logging(level).expect("Failed to configure logger.")
    }

    let input = config
        .value_of("input")
        .expect("Expected an input parse-tree file to compile");
    let output = config
        .value_of("output")
        .expect("Expected an output file for the assembly");

    let text = match fs::read_to_string(input) {
        Ok(text) => text,
        Err(err) => {
            eprintln!("Could not read {}: {}", input, err);
            exit(ERR_IO_ERROR);
        }
    };

    let tree: parsetree::Program = match serde_json::from_str(&text) {
        Ok(tree) => tree,
        Err(err) => {
            let mut errs: ErrorList<String> = ErrorList::new(SYNTACTIC_ERROR_CODE);
            errs.add(format!("Malformed parse tree: {}", err));
            print!("{}", errs);
            exit(errs.exit_code());
        }
    };

    let assembly = match compile(&tree) {
        Ok(assembly) => assembly,
        Err(err) => {
            print!("{}", err);
            exit(err.exit_code());
        }
    };

    if let Err(err) = fs::write(output, assembly) {
        eprintln!("Could not write {}: {}", output, err);
        exit(ERR_IO_ERROR);
    }
    info!("Assembly written to {}", output);
}
