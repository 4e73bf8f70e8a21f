use crate::CLAP_STYLING;
use clap::{arg, command};
use linkvet::handlers::parse_domain_interval;
use std::path::PathBuf;

pub(crate) fn command_argument_builder() -> clap::Command {
    clap::Command::new("linkvet")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("linkvet")
        .about("Finds broken outbound links in a collection of HTML documents")
        .styles(CLAP_STYLING)
        .arg(
            arg!(-q --"quiet" "Suppress banner and progress output")
                .required(false)
                .global(true),
        )
        .subcommand_required(true)
        .subcommand(
            command!("check")
                .about(
                    "Probe every outbound link in a document collection and write a report. \
                Resumes from the checkpoint if one exists.",
                )
                .arg(
                    arg!(<DIR>)
                        .help("Directory of HTML documents to check")
                        .value_parser(clap::value_parser!(PathBuf)),
                )
                .arg(
                    arg!(-o --"output" <PATH>)
                        .required(false)
                        .help("Report file (default: broken_links_report.txt)")
                        .value_parser(clap::value_parser!(PathBuf)),
                )
                .arg(
                    arg!(--"checkpoint" <PATH>)
                        .required(false)
                        .help("Checkpoint file (default: <output>.checkpoint.json)")
                        .value_parser(clap::value_parser!(PathBuf)),
                )
                .arg(
                    arg!(-c --"config" <PATH>)
                        .required(false)
                        .help("JSON config file; command line flags take precedence")
                        .value_parser(clap::value_parser!(PathBuf)),
                )
                .arg(
                    arg!(-t --"threads" <NUM_WORKERS>)
                        .required(false)
                        .help("The number of concurrent probe workers")
                        .value_parser(clap::value_parser!(usize)),
                )
                .arg(
                    arg!(--"batch-size" <COUNT>)
                        .required(false)
                        .help("URLs per batch; the checkpoint is flushed after every batch")
                        .value_parser(clap::value_parser!(usize)),
                )
                .arg(
                    arg!(--"timeout" <SECONDS>)
                        .required(false)
                        .help("Per-request timeout in seconds")
                        .value_parser(clap::value_parser!(u64)),
                )
                .arg(
                    arg!(--"interval" <MILLIS>)
                        .required(false)
                        .help("Default minimum delay between requests to the same domain")
                        .value_parser(clap::value_parser!(u64)),
                )
                .arg(
                    arg!(--"domain-interval" <HOST_EQ_MILLIS>)
                        .required(false)
                        .help("Per-domain delay override, e.g. doi.org=2000 (repeatable)")
                        .value_parser(parse_domain_interval)
                        .action(clap::ArgAction::Append),
                )
                .arg(
                    arg!(-f --"format" <FORMAT>)
                        .required(false)
                        .help("Report format: text, json")
                        .value_parser(["text", "json"])
                        .default_value("text"),
                )
                .arg(
                    arg!(--"fresh")
                        .required(false)
                        .help("Discard any existing checkpoint and start over")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(
                    arg!(--"strict")
                        .required(false)
                        .help("Skip documents with any HTML parse error")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(
                    arg!(--"no-browser-headers")
                        .required(false)
                        .help("Send a plain user agent instead of browser-like headers")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(
                    arg!(--"fail-on-broken")
                        .required(false)
                        .help("Exit with status 3 if any link is definitely broken")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(
                    arg!(-v --"verbose")
                        .required(false)
                        .help("Log every probe")
                        .action(clap::ArgAction::SetTrue),
                ),
        )
        .subcommand(
            command!("extract")
                .about("List the unique outbound links in a document collection without probing")
                .arg(
                    arg!(<DIR>)
                        .help("Directory of HTML documents")
                        .value_parser(clap::value_parser!(PathBuf)),
                )
                .arg(
                    arg!(--"strict")
                        .required(false)
                        .help("Skip documents with any HTML parse error")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(
                    arg!(-v --"verbose")
                        .required(false)
                        .help("Enable debug logging")
                        .action(clap::ArgAction::SetTrue),
                ),
        )
}
