use std::{env, fs, process};

use rustyline::{DefaultEditor, error::ReadlineError};

use monkey::Session;

const PROMPT: &str = ">> ";

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args: Vec<String> = env::args().collect();

    match args.as_slice() {
        [_] => run_repl(),
        [_, path] => run_file(path),
        _ => {
            print_usage();
            process::exit(2);
        }
    }
}

fn print_usage() {
    eprintln!("MONKEY - bytecode compiler and virtual machine");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  monkey              Start interactive REPL");
    eprintln!("  monkey <file>       Run a program");
    eprintln!();
    eprintln!("Set RUST_LOG=debug to see compiled bytecode.");
}

fn run_file(path: &str) {
    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Failed to read '{}': {}", path, e);
            process::exit(1);
        }
    };

    if let Err(e) = Session::new().eval(&source) {
        eprintln!("{}", e);
        process::exit(1);
    }
}

fn run_repl() {
    let mut rl = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(e) => {
            eprintln!("failed to start line editor: {}", e);
            process::exit(1);
        }
    };

    println!("Monkey REPL. Type `exit` or press Ctrl-D to quit.");
    let mut session = Session::new();

    loop {
        let line = match rl.readline(PROMPT) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("{}", e);
                break;
            }
        };

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed == "exit" {
            break;
        }
        let _ = rl.add_history_entry(trimmed);

        match session.eval(trimmed) {
            Ok(value) => println!("{}", value),
            Err(e) => eprintln!("{}", e),
        }
    }
}
