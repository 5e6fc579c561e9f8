use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use livekeeper::domain::{NotifyTargets, SubscriptionFlags};

/// Supervise live broadcasters: notify on live edges and record their streams.
#[derive(Parser, Debug)]
#[command(name = "livekeeper")]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Configuration file (TOML)
    #[arg(short, long, env = "LIVEKEEPER_CONFIG", default_value = "livekeeper.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the daemon until Ctrl-C
    Run,

    /// Subscribe a broadcaster, or add flags to an existing subscription
    Add {
        /// Broadcaster id
        id: u64,

        /// Flags to set
        #[arg(short, long, value_enum, value_delimiter = ',', default_value = "all")]
        flags: Vec<FlagArg>,

        /// Display name used in filenames and messages
        #[arg(short, long)]
        name: Option<String>,

        /// Chat user to notify
        #[arg(long)]
        user_id: Option<u64>,

        /// Chat group to notify
        #[arg(long)]
        group_id: Option<u64>,
    },

    /// Clear flags from a subscription; it is deleted once none remain
    Remove {
        /// Broadcaster id
        id: u64,

        /// Flags to clear
        #[arg(short, long, value_enum, value_delimiter = ',', default_value = "all")]
        flags: Vec<FlagArg>,
    },

    /// Print the subscription list
    List,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FlagArg {
    NotifyLive,
    NotifyOffline,
    Notify,
    Record,
    CaptureChat,
    All,
}

impl FlagArg {
    fn flags(self) -> SubscriptionFlags {
        let mut flags = SubscriptionFlags::NONE;
        match self {
            FlagArg::NotifyLive => flags.notify_live = true,
            FlagArg::NotifyOffline => flags.notify_offline = true,
            FlagArg::Notify => {
                flags.notify_live = true;
                flags.notify_offline = true;
            }
            FlagArg::Record => flags.record = true,
            FlagArg::CaptureChat => flags.capture_chat = true,
            FlagArg::All => flags = SubscriptionFlags::ALL,
        }
        flags
    }

    /// Union of every flag in `args`.
    pub fn combine(args: &[FlagArg]) -> SubscriptionFlags {
        let mut flags = SubscriptionFlags::NONE;
        for arg in args {
            flags.insert(arg.flags());
        }
        flags
    }
}

/// Targets given on the command line, `None` when neither was passed.
pub fn targets(user_id: Option<u64>, group_id: Option<u64>) -> Option<NotifyTargets> {
    (user_id.is_some() || group_id.is_some()).then_some(NotifyTargets { user_id, group_id })
}
