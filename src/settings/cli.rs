use super::Parser;

#[derive(Parser, Debug)]
#[command(version, about = "Refresh-token session service")]
pub struct Cli {
    /// Path to a TOML settings file.
    #[arg(long)]
    pub settings: Option<String>,
    /// Overrides `log.filter` from the settings file.
    #[arg(long)]
    pub log_filter: Option<String>,
}
