use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "plaza")]
#[command(version)]
#[command(about = "A terminal client for the Plaza social network", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// API base URL, overriding configuration
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Keep the session in memory only
    #[arg(long, global = true)]
    pub ephemeral: bool,

    /// Output format for profile and status commands
    #[arg(long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    pub output_format: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Password source shared by `signup` and `login`
#[derive(Args, Debug, Clone)]
pub struct PasswordArg {
    /// Password (read from stdin when omitted)
    #[arg(long, env = "PLAZA_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize configuration
    Init,
    /// Create an account
    Signup {
        username: String,
        #[command(flatten)]
        password: PasswordArg,
        /// Log in right after the account is created
        #[arg(long)]
        login: bool,
    },
    /// Log in and persist the session
    Login {
        username: String,
        #[command(flatten)]
        password: PasswordArg,
    },
    /// Forget the persisted session
    Logout,
    /// Show the current session
    Status,
    /// Show your profile
    Me,
    /// Edit your profile
    Edit {
        #[arg(long)]
        display_name: Option<String>,
        #[arg(long)]
        bio: Option<String>,
        /// Image to upload as the new profile photo
        #[arg(long)]
        photo: Option<PathBuf>,
    },
    /// Remove your profile photo
    DeletePhoto,
    /// Show a user's profile
    User { username: String },
    /// Show a user's follower counts
    Stats { username: String },
    /// Follow a user
    Follow { username: String },
    /// Unfollow a user
    Unfollow { username: String },
    /// Hold the session open until it expires
    Watch,
    /// Show version information
    Version,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Plain text output
    Text,
    /// JSON structured output
    Json,
}
