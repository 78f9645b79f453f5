//! Command line tool for Switchmate light switches
//!
//! Discovers switches, pairs with them to obtain an auth key and toggles
//! them using that key.

use std::process::ExitCode;
use std::time::Duration;

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use switchmate_controller::{
    BtleAdapter, DEFAULT_TIMEOUT, Error, Options, Report, SwitchPosition, Workflow, run,
};

#[derive(Parser)]
#[command(name = "switchmate")]
#[command(about = "Discover, pair with and toggle Switchmate light switches")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print every Switchmate in range until interrupted
    Discover {
        #[command(subcommand)]
        mode: Option<DiscoverMode>,
    },
    /// Pair with a switch and print its auth key (press the button when asked)
    #[command(name = "getauthkey")]
    GetAuthKey {
        /// Device uuid as printed by `discover` (macOS peripheral id)
        peripheral: String,
        /// Give up after this many seconds, 0 waits forever
        #[arg(long, default_value_t = DEFAULT_TIMEOUT.as_secs())]
        timeout: u64,
    },
    /// Turn a switch on or off
    Toggle {
        position: Position,
        /// Device uuid as printed by `discover` (macOS peripheral id)
        peripheral: String,
        /// Base64 auth key from `getauthkey`
        key: String,
        /// Give up after this many seconds, 0 waits forever
        #[arg(long, default_value_t = DEFAULT_TIMEOUT.as_secs())]
        timeout: u64,
    },
}

#[derive(Subcommand)]
enum DiscoverMode {
    /// Stop scanning after the given number of seconds
    Wait { seconds: u64 },
}

#[derive(Clone, Copy, ValueEnum)]
enum Position {
    On,
    Off,
}

impl From<Position> for SwitchPosition {
    fn from(position: Position) -> Self {
        match position {
            Position::On => SwitchPosition::On,
            Position::Off => SwitchPosition::Off,
        }
    }
}

impl Commands {
    fn workflow(self) -> Result<(Workflow, Options), Error> {
        match self {
            Commands::Discover { mode } => {
                let wait = mode.map(|DiscoverMode::Wait { seconds }| Duration::from_secs(seconds));
                Ok((Workflow::discover(wait), Options::default()))
            }
            Commands::GetAuthKey { peripheral, timeout } => Ok((
                Workflow::authenticate(&peripheral)?,
                Options::with_timeout_secs(timeout),
            )),
            Commands::Toggle {
                position,
                peripheral,
                key,
                timeout,
            } => Ok((
                Workflow::toggle(position.into(), &peripheral, &key)?,
                Options::with_timeout_secs(timeout),
            )),
        }
    }
}

fn init_logging() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    pretty_env_logger::formatted_builder()
        .parse_filters(&filter)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    init_logging();

    let (workflow, options) = match cli.command.workflow() {
        Ok(parsed) => parsed,
        Err(e @ Error::Usage(_)) => {
            eprintln!("error: {e}");
            eprintln!("{}", Cli::command().render_usage());
            return ExitCode::FAILURE;
        }
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mut adapter = match BtleAdapter::new().await {
        Ok(adapter) => adapter,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    match run(workflow, &mut adapter, &options, &mut std::io::stdout()).await {
        Ok(Report::AuthKey(key)) => {
            println!("{key}");
            ExitCode::SUCCESS
        }
        Ok(Report::Toggled(position)) => {
            eprintln!("Toggled {position} ok!");
            ExitCode::SUCCESS
        }
        Ok(Report::Discovered) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("switchmate").chain(args.iter().copied()))
    }

    const DEVICE: &str = "6f3a2a52-8b1a-4c5e-9d0e-1f2a3b4c5d6e";

    #[test]
    fn cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn discover_forever() {
        let cli = parse(&["discover"]).unwrap();
        let (workflow, _) = cli.command.workflow().unwrap();
        assert_eq!(workflow, Workflow::discover(None));
    }

    #[test]
    fn discover_wait() {
        let cli = parse(&["discover", "wait", "7"]).unwrap();
        let (workflow, _) = cli.command.workflow().unwrap();
        assert_eq!(workflow, Workflow::discover(Some(Duration::from_secs(7))));
    }

    #[test]
    fn discover_wait_needs_a_number() {
        assert!(parse(&["discover", "wait", "soon"]).is_err());
        assert!(parse(&["discover", "wait"]).is_err());
        assert!(parse(&["discover", "linger", "3"]).is_err());
    }

    #[test]
    fn getauthkey_default_timeout() {
        let cli = parse(&["getauthkey", DEVICE]).unwrap();
        let (workflow, options) = cli.command.workflow().unwrap();
        assert_eq!(workflow, Workflow::authenticate(DEVICE).unwrap());
        assert_eq!(options.timeout, Some(DEFAULT_TIMEOUT));
    }

    #[test]
    fn zero_timeout_disables_deadline() {
        let cli = parse(&["getauthkey", DEVICE, "--timeout", "0"]).unwrap();
        let (_, options) = cli.command.workflow().unwrap();
        assert_eq!(options.timeout, None);
    }

    #[test]
    fn toggle_parses_position() {
        let cli = parse(&["toggle", "on", DEVICE, "ESIz"]).unwrap();
        let (workflow, _) = cli.command.workflow().unwrap();
        assert_eq!(
            workflow,
            Workflow::toggle(SwitchPosition::On, DEVICE, "ESIz").unwrap()
        );
    }

    #[test]
    fn toggle_rejects_unknown_position() {
        assert!(parse(&["toggle", "dim", DEVICE, "ESIz"]).is_err());
    }

    #[test]
    fn toggle_needs_all_arguments() {
        assert!(parse(&["toggle", "off", DEVICE]).is_err());
    }

    #[test]
    fn bad_uuid_is_a_usage_error() {
        let cli = parse(&["getauthkey", "not-a-uuid"]).unwrap();
        assert!(matches!(cli.command.workflow(), Err(Error::Usage(_))));
    }

    #[test]
    fn bad_key_is_an_input_error() {
        let cli = parse(&["toggle", "off", DEVICE, "%%%"]).unwrap();
        assert!(matches!(cli.command.workflow(), Err(Error::Input(_))));
    }

    #[test]
    fn help_is_not_a_failure() {
        let e = parse(&["--help"]).err().unwrap();
        assert!(!e.use_stderr());
    }
}
