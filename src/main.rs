use std::io::{IsTerminal, Read, Write};

use clap::Parser;
use serde::Serialize;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use embsh::{IoConfig, Shell, ShellOptions};

#[derive(Parser)]
#[command(name = "embsh")]
#[command(about = "Run one-line shell commands through the embsh interpreter")]
#[command(version)]
struct Cli {
    /// Execute the command line given as argument
    #[arg(short = 'c')]
    command: Option<String>,

    /// Capture child output and print it after each command
    #[arg(long = "capture")]
    capture: bool,

    /// Output results as JSON (stdout, stderr, exitCode)
    #[arg(long = "json")]
    json: bool,

    /// Feed TEXT to the first command's standard input (implies --capture)
    #[arg(long = "stdin", value_name = "TEXT")]
    stdin: Option<String>,

    /// Command line to execute
    #[arg(conflicts_with = "command")]
    line: Option<String>,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct Report {
    stdout: String,
    stderr: String,
    exit_code: i32,
}

fn main() {
    // Logs go to stderr so they never mix with command output.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    // Determine command source: -c, positional, or one per line on stdin
    let lines: Vec<String> = if let Some(command) = cli.command.clone().or(cli.line.clone()) {
        vec![command]
    } else {
        if std::io::stdin().is_terminal() {
            eprintln!("Error: No command provided. Use -c 'command', pass it as an argument, or pipe lines via stdin.");
            std::process::exit(1);
        }
        // Read everything first: children inherit stdin and could swallow later lines.
        let mut buf = String::new();
        if let Err(e) = std::io::stdin().read_to_string(&mut buf) {
            eprintln!("Error: Cannot read stdin: {}", e);
            std::process::exit(1);
        }
        buf.lines().map(str::to_string).collect()
    };

    let capture = cli.capture || cli.json || cli.stdin.is_some();
    // With capture on, `exit` must not skip printing what was captured.
    let shell = Shell::new(ShellOptions::default().exit_terminates_process(!capture));

    let mut report = Report::default();
    for line in &lines {
        if !capture {
            report.exit_code = shell.interpret(line, None);
            continue;
        }

        let mut io = IoConfig::new();
        if let Some(text) = &cli.stdin {
            io.set_stdin(Some(text.clone().into_bytes()));
        }
        report.exit_code = shell.interpret(line, Some(&mut io));

        if cli.json {
            report.stdout.push_str(&io.stdout_lossy());
            report.stderr.push_str(&io.stderr_lossy());
        } else {
            let _ = std::io::stdout().write_all(io.stdout().as_bytes());
            let _ = std::io::stderr().write_all(io.stderr().as_bytes());
        }
    }

    if cli.json {
        match serde_json::to_string(&report) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("Error: Cannot encode report: {}", e),
        }
    }
    let _ = std::io::stdout().flush();

    // Library errors are negative; report them as a generic failure.
    std::process::exit(if report.exit_code < 0 { 2 } else { report.exit_code });
}
