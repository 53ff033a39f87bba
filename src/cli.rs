use std::time::Duration;

use clap::{Parser, Subcommand};

use crate::{
    api::solark::{self, AuthMode},
    prelude::*,
};

#[derive(Parser)]
#[command(author, version, about, propagate_version = true)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Poll the cloud on a fixed interval and publish readings as JSON lines.
    Poll(PollArgs),

    /// Fetch and normalize a single reading, then exit.
    Fetch(FetchArgs),

    /// Check the credentials and plant id, reporting the plant's name.
    Validate(ValidateArgs),

    /// Development tools.
    Debug(DebugArgs),
}

#[derive(Parser)]
pub struct ConnectionArgs {
    /// Sol-Ark Cloud account email.
    #[clap(long, env = "SOLARK_EMAIL")]
    pub email: String,

    /// Sol-Ark Cloud account password.
    #[clap(long, env = "SOLARK_PASSWORD")]
    pub password: String,

    /// Vendor-assigned plant identifier.
    #[clap(long, env = "SOLARK_PLANT_ID")]
    pub plant_id: String,

    /// Portal base URL, used for login and the classic plant endpoint.
    #[clap(long, env = "SOLARK_BASE_URL", default_value = "https://api.solarkcloud.com")]
    pub base_url: String,

    /// REST API base URL; defaults to the portal base URL.
    #[clap(long, env = "SOLARK_API_URL")]
    pub api_url: Option<String>,

    /// Login handshake selection.
    #[clap(long, env = "SOLARK_AUTH_MODE", value_enum, default_value = "auto")]
    pub auth_mode: AuthMode,
}

impl ConnectionArgs {
    pub fn try_new_client(&self) -> Result<solark::Api> {
        Ok(solark::Api::try_new(
            &self.email,
            &self.password,
            &self.base_url,
            self.api_url.as_deref(),
            self.auth_mode,
        )?)
    }
}

#[derive(Parser)]
pub struct PollArgs {
    #[clap(flatten)]
    pub connection: ConnectionArgs,

    /// Seconds between fetch cycles.
    #[clap(
        long = "interval-secs",
        env = "SOLARK_POLL_INTERVAL",
        default_value = "120",
        value_parser = clap::value_parser!(u64).range(30..=3600),
    )]
    pub interval_secs: u64,
}

impl PollArgs {
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[derive(Parser)]
pub struct FetchArgs {
    #[clap(flatten)]
    pub connection: ConnectionArgs,

    /// Emit the reading as pretty JSON instead of a table.
    #[clap(long)]
    pub json: bool,
}

#[derive(Parser)]
pub struct ValidateArgs {
    #[clap(flatten)]
    pub connection: ConnectionArgs,
}

#[derive(Parser)]
pub struct DebugArgs {
    #[clap(flatten)]
    pub connection: ConnectionArgs,

    #[command(subcommand)]
    pub command: DebugCommand,
}

#[derive(Subcommand)]
pub enum DebugCommand {
    /// Run the login handshake only.
    Login,

    /// Dump the classic plant summary as raw JSON.
    PlantData,

    /// Dump the merged raw telemetry record as JSON.
    Telemetry,
}
