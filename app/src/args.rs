use clap::Parser;

/// Command-line overrides for the proxy's process configuration. Every
/// field is optional: anything left unset keeps whatever `config::load`
/// already read from the environment.
#[derive(Debug, Parser)]
#[command(version, about)]
pub struct Args {
    /// Port to listen on, overriding `PORT`.
    #[arg(long)]
    pub port: Option<u16>,

    /// Log filter string (e.g. "info" or "server=debug,llm=debug"), overriding `LOG_FILTER`.
    #[arg(long)]
    pub log_filter: Option<String>,
}

impl Args {
    /// Apply any CLI-provided overrides on top of an already-loaded config.
    pub fn apply(self, mut config: config::Config) -> config::Config {
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(log_filter) = self.log_filter {
            config.log_filter = log_filter;
        }
        config
    }
}
