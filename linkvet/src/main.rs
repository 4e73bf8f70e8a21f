use colored::Colorize;
use commands::command_argument_builder;
use linkvet::handlers::{ExitStatus, handle_check, handle_extract, print_banner};

mod commands;

#[tokio::main]
async fn main() {
    let cmd = command_argument_builder();
    let chosen_command = cmd.get_matches();
    let quiet = chosen_command.get_flag("quiet");

    // Show banner unless --quiet flag is set
    if !quiet {
        print_banner();
    }

    let result = match chosen_command.subcommand() {
        Some(("check", primary_command)) => handle_check(primary_command, quiet).await,
        Some(("extract", primary_command)) => handle_extract(primary_command),
        _ => unreachable!("clap should ensure we don't get here"),
    };

    let status = result.unwrap_or_else(|e| {
        eprintln!("{} {:#}", "✗".red().bold(), e);
        ExitStatus::Fatal
    });

    std::process::exit(status.code());
}

pub const CLAP_STYLING: clap::builder::styling::Styles = clap::builder::styling::Styles::styled()
    .header(clap_cargo::style::HEADER)
    .usage(clap_cargo::style::USAGE)
    .literal(clap_cargo::style::LITERAL)
    .placeholder(clap_cargo::style::PLACEHOLDER)
    .error(clap_cargo::style::ERROR)
    .valid(clap_cargo::style::VALID)
    .invalid(clap_cargo::style::INVALID);
