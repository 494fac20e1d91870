use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use schemexp::builtinops::get_builtin_ops;
use schemexp::reader::{ParseConfig, read_all};
use schemexp::{Environment, Error, Expr, eval, parse};
use std::panic;
use std::process;
use tracing_subscriber::EnvFilter;

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let result = panic::catch_unwind(|| {
        run_repl();
    });

    if let Err(panic_info) = result {
        eprintln!("The REPL encountered an unexpected error and must exit.");

        if let Some(msg) = panic_info.downcast_ref::<&str>() {
            eprintln!("Error: {msg}");
        } else if let Some(msg) = panic_info.downcast_ref::<String>() {
            eprintln!("Error: {msg}");
        } else {
            eprintln!("Error: Unknown panic occurred");
        }

        process::exit(1);
    }
}

/// What the loop should do after a line has been handled
enum Flow {
    Continue,
    Exit,
}

fn run_repl() {
    println!("SchemeXP - a small Scheme with exact rationals");
    println!("Enter expressions like: (define (square x) (* x x))");
    println!("Type :help for more commands, (exit) or Ctrl+C to exit.");
    println!();

    let mut rl = DefaultEditor::new().expect("Could not initialize REPL");
    let env = Environment::new();

    loop {
        match rl.readline("scm> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                // Add the line to history
                let _ = rl.add_history_entry(line);

                // Handle special commands
                match line {
                    ":help" => {
                        print_help();
                        continue;
                    }
                    ":env" => {
                        print_environment(&env);
                        continue;
                    }
                    ":quit" => {
                        println!("Goodbye!");
                        break;
                    }
                    _ => {}
                }

                match eval_line(line, &env) {
                    Ok(Flow::Continue) => {}
                    Ok(Flow::Exit) => {
                        println!("Goodbye!");
                        break;
                    }
                    Err(e) => println!("Error: {e}"),
                }
            }

            Err(ReadlineError::Eof) | Err(ReadlineError::Interrupted) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                println!("Error: {err:?}");
                break;
            }
        }
    }
}

/// Evaluate every form on the line, printing each non-void result
fn eval_line(line: &str, env: &Environment) -> Result<Flow, Error> {
    for datum in read_all(line, ParseConfig::default())? {
        let expr = parse(&datum, env)?;
        match eval(&expr, env)? {
            Expr::Exit => return Ok(Flow::Exit),
            // Don't print void values (e.g., from define)
            Expr::Void => {}
            result => println!("{result}"),
        }
    }
    Ok(Flow::Continue)
}

fn print_help() {
    println!("SchemeXP commands:");
    println!("  :help      - Show this help message");
    println!("  :env       - Show global environment bindings");
    println!("  :quit      - Exit the interpreter");
    println!("  (exit)     - Exit the interpreter");
    println!("  Ctrl+C     - Exit the interpreter");
    println!();
    println!("Special forms: quote begin if cond lambda define let letrec set!");
    println!("Numbers: 42, -5, #x1F, 1/3 (exact rationals)");
    println!();
    println!("Examples:");
    println!("  (+ 1/2 1/3)");
    println!("  (define (fact n) (if (= n 0) 1 (* n (fact (- n 1)))))");
    println!("  (let ((p (cons 1 2))) (set-car! p 9) p)");
    println!("  '(1 2 . 3)");
    println!();
}

fn print_environment(env: &Environment) {
    let primitives: Vec<&str> = get_builtin_ops()
        .iter()
        .map(|op| op.scheme_id)
        .collect();

    println!("Built-in operations ({}):", primitives.len());
    // Print in columns for readability
    let mut col = 0;
    for name in primitives {
        print!("  {name:<15}");
        col += 1;
        if col % 4 == 0 {
            println!();
        }
    }
    if col % 4 != 0 {
        println!();
    }
    println!();

    let bindings = env.bindings();
    if bindings.is_empty() {
        println!("No user-defined values.");
        return;
    }

    println!("User-defined values ({}):", bindings.len());
    for (name, value) in bindings {
        println!("  {name} = {value}");
    }
}
