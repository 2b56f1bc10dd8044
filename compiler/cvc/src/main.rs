//! The `cvc` binary: run canvas source from a file, from inline arguments,
//! or as an interactive session.

use std::io::{BufRead, Write};

use cv_diagnostic::Cursor;
use cv_ir::{quant_to_text, Token};
use cv_runtime::Runtime;

struct Options {
    /// Report errors and keep evaluating instead of exiting.
    relaxed: bool,
    /// Print the last statement's value when the program finishes.
    print_result: bool,
}

fn main() {
    std::process::exit(run());
}

fn run() -> i32 {
    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut opts = Options {
        relaxed: false,
        print_result: true,
    };
    let mut file: Option<String> = None;
    let mut repl = false;
    let mut inline: Vec<String> = Vec::new();

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-f" | "--file" => {
                if i + 1 >= args.len() {
                    eprintln!("error: '--file' expects a path");
                    print_usage();
                    return 1;
                }
                file = Some(args[i + 1].clone());
                i += 1;
            }
            "-e" | "--repl" => repl = true,
            "-r" | "--relaxed" => opts.relaxed = true,
            "-u" | "--no-return" => opts.print_result = false,
            "-v" | "--version" => {
                println!("cvc {}", env!("CARGO_PKG_VERSION"));
                return 0;
            }
            "-h" | "--help" => {
                print_usage();
                return 0;
            }
            other if other.starts_with('-') => {
                eprintln!("error: unknown option '{other}'");
                print_usage();
                return 1;
            }
            text => inline.push(text.to_string()),
        }
        i += 1;
    }

    let rt = Runtime::new();
    rt.register_extension("std", cv_runtime::stdlib::install);

    if repl {
        return run_repl(&rt);
    }

    let source = match file {
        Some(path) => match std::fs::read_to_string(&path) {
            Ok(source) => source,
            Err(err) => {
                eprintln!("error: cannot open '{path}': {err}");
                return 1;
            }
        },
        None => {
            if inline.is_empty() {
                print_usage();
                return 1;
            }
            // Bare arguments form one program, so quoting the whole
            // expression is optional: `cvc [+ 1 2]` works.
            inline.join(" ")
        }
    };
    run_source(&rt, &source, &opts)
}

/// Evaluate a whole source unit statement by statement against the root
/// context, reporting diagnostics as they arise.
fn run_source(rt: &Runtime, source: &str, opts: &Options) -> i32 {
    let cursor = Cursor::new();
    let Some(root) = cv_lexer::lex(source, &cursor) else {
        report(&cursor);
        return 1;
    };
    let statements: Vec<&Token> =
        if !root.children.is_empty() && root.children.iter().all(Token::is_complex) {
            root.children.iter().collect()
        } else {
            vec![&root]
        };
    let mut last = None;
    for statement in statements {
        match rt.eval_statement(statement, rt.root(), &cursor) {
            Some(value) => last = Some(value),
            None => {
                report(&cursor);
                if cursor.should_exit() || !opts.relaxed {
                    return 1;
                }
                cursor.clear();
            }
        }
    }
    if opts.print_result {
        if let Some(value) = last {
            println!("{}", quant_to_text(&value));
        }
    }
    0
}

/// Interactive loop. Errors never end the session unless an import marked
/// them fatal; the cursor resets between lines.
fn run_repl(rt: &Runtime) -> i32 {
    let cursor = Cursor::new();
    let stdin = std::io::stdin();
    let mut line = String::new();
    loop {
        print!("cv> ");
        let _ = std::io::stdout().flush();
        line.clear();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => return 0,
            Ok(_) => {}
            Err(err) => {
                eprintln!("error: {err}");
                return 1;
            }
        }
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if text == "exit" {
            return 0;
        }
        match rt.eval(text, &cursor) {
            Some(value) => println!("{}", quant_to_text(&value)),
            None => {
                report(&cursor);
                if cursor.should_exit() {
                    return 1;
                }
                cursor.clear();
            }
        }
    }
}

fn report(cursor: &Cursor) {
    if let Some(diagnostic) = cursor.raised() {
        eprintln!("{diagnostic}");
    }
}

fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    // Only initialize when RUST_LOG asks for output.
    if std::env::var("RUST_LOG").is_ok() {
        let filter = EnvFilter::from_default_env();
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(true).with_level(true))
            .with(filter)
            .init();
    }
}

fn print_usage() {
    eprintln!("Usage: cvc [options] [expression...]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -f, --file <path>    Run a source file");
    eprintln!("  -e, --repl           Interactive session");
    eprintln!("  -r, --relaxed        Report errors and keep going instead of exiting");
    eprintln!("  -u, --no-return      Do not print the final value");
    eprintln!("  -v, --version        Print the version");
    eprintln!("  -h, --help           Show this help");
    eprintln!();
    eprintln!("Bare arguments are joined and evaluated as one program.");
}
