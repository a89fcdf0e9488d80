use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use vibra_core::ReinitPolicy;

#[derive(Debug, Parser, Clone)]
#[command(name = "vibra")]
#[command(about = "Stereo vibrato tone harness for exercising audio device lifecycles")]
pub struct Cli {
    /// JSON configuration file. Built-in defaults are used when omitted.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Output device name (case-insensitive, exact match preferred over partial).
    #[arg(long)]
    pub device: Option<String>,

    /// What happens to the previous stream on reinitialize.
    #[arg(long, value_enum)]
    pub reinit_policy: Option<PolicyArg>,

    /// Print the available output devices and exit.
    #[arg(long)]
    pub list_devices: bool,

    /// Log filter directives, e.g. `debug` or `vibra_backend=trace`. Overrides RUST_LOG.
    #[arg(long)]
    pub log: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PolicyArg {
    /// Pause the old stream and leave it to the subsystem.
    Discard,
    /// Pause and close the old stream.
    Close,
}

impl From<PolicyArg> for ReinitPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Discard => ReinitPolicy::Discard,
            PolicyArg::Close => ReinitPolicy::Close,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_flag() {
        let cli = Cli::try_parse_from([
            "vibra",
            "--config",
            "harness.json",
            "--device",
            "usb",
            "--reinit-policy",
            "close",
            "--log",
            "debug",
        ])
        .expect("parse");
        assert_eq!(cli.config, Some(PathBuf::from("harness.json")));
        assert_eq!(cli.device.as_deref(), Some("usb"));
        assert_eq!(cli.reinit_policy.map(ReinitPolicy::from), Some(ReinitPolicy::Close));
        assert_eq!(cli.log.as_deref(), Some("debug"));
        assert!(!cli.list_devices);
    }

    #[test]
    fn unknown_policy_is_rejected() {
        assert!(Cli::try_parse_from(["vibra", "--reinit-policy", "leak"]).is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
