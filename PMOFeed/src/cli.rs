use clap::{Parser, Subcommand};
use pmoproviders::Provider;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration directory (defaults to $PMOFEED_CONFIG, ./.pmofeed or ~/.pmofeed)
    #[arg(short, long, env = "PMOFEED_CONFIG")]
    pub config: Option<String>,

    /// Log level override (trace, debug, info, warn, error)
    #[arg(short, long)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the configured providers
    Providers,

    /// Page through a provider collection and print its items as JSON lines
    Fetch {
        /// spotify, applemusic, soundcloud, youtube or blogs
        provider: Provider,

        /// Stop after this many pages (all pages when omitted)
        #[arg(short, long)]
        pages: Option<usize>,

        /// Page size for this run (the configuration is left untouched)
        #[arg(long)]
        page_size: Option<u64>,
    },

    /// Force a token refresh and store the new credential
    Refresh { provider: Provider },

    /// Store OAuth tokens obtained out of band
    Login {
        provider: Provider,

        #[arg(long)]
        access_token: String,

        #[arg(long)]
        refresh_token: String,

        /// Access token lifetime in seconds
        #[arg(long)]
        expires_in: Option<i64>,

        #[arg(long)]
        client_id: Option<String>,

        #[arg(long)]
        client_secret: Option<String>,
    },
}
