//! Clap command tree definition.

use clap::{Arg, ArgAction, Command};

use docbus_engine::CONFIG_FILE_NAME;

/// Build the complete CLI command tree.
pub fn build_cli() -> Command {
    Command::new("docbus")
        .about("Document persistor on an in-process message bus")
        .subcommand_required(false)
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .help(format!("Config file (default: {})", CONFIG_FILE_NAME))
                .global(true),
        )
        .arg(
            Arg::new("address")
                .long("address")
                .help("Bus address, overriding the config file")
                .global(true),
        )
        .arg(
            Arg::new("init")
                .long("init")
                .help("Provision the bucket and views before serving")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("nodes")
                .long("nodes")
                .help("Node count of the in-process cluster (default: 1)")
                .value_parser(clap::value_parser!(u32).range(1..))
                .global(true),
        )
        .arg(
            Arg::new("pretty")
                .long("pretty")
                .help("Pretty-print replies")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .subcommand(
            Command::new("send")
                .about("Send one request and print the reply")
                .arg(
                    Arg::new("request")
                        .required(true)
                        .help("Request message as JSON"),
                ),
        )
        .subcommand(Command::new("setup").about("Write the default config file if missing"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_tree_is_consistent() {
        build_cli().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let m = build_cli()
            .try_get_matches_from(["docbus", "send", "{}", "--init", "--nodes", "3"])
            .unwrap();
        assert!(m.get_flag("init"));
        assert_eq!(m.get_one::<u32>("nodes"), Some(&3));
    }

    #[test]
    fn test_zero_nodes_rejected() {
        assert!(build_cli()
            .try_get_matches_from(["docbus", "--nodes", "0"])
            .is_err());
    }
}
