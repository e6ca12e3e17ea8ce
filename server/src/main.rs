use clap::Parser;
use log::{error, info};
use server::ai::gemini::{GeminiClient, DEFAULT_ENDPOINT, DEFAULT_MODEL};
use server::ai::service::check_connectivity;
use server::ai::{MoveResolver, MoveSuggester, ResolverConfig};
use server::config::{self, ServerConfig};
use server::network::Server;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Maximum concurrent connections, players and spectators together
    #[arg(short, long, default_value = "32")]
    max_clients: usize,

    /// Seat played by the AI opponent
    #[arg(long, default_value = "black")]
    ai_seat: String,

    /// Play without the AI opponent; both seats go to human players
    #[arg(long)]
    no_ai: bool,

    /// Send one test prompt to the AI service, print the reply and exit
    #[arg(long)]
    check_ai: bool,

    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    gemini_api_key: Option<String>,

    #[arg(long, default_value = DEFAULT_MODEL)]
    model: String,

    #[arg(long, default_value = DEFAULT_ENDPOINT)]
    endpoint: String,

    /// Per-request timeout in milliseconds
    #[arg(long, default_value = "10000")]
    request_timeout_ms: u64,

    /// Retries after the first failed suggestion
    #[arg(long, default_value = "3")]
    max_retries: u32,

    /// Base backoff delay in milliseconds, doubled per retry
    #[arg(long, default_value = "1000")]
    base_delay_ms: u64,

    /// Upper bound of random jitter added to each backoff, in milliseconds
    #[arg(long, default_value = "1000")]
    max_jitter_ms: u64,

    /// Minimum spacing between AI requests in milliseconds
    #[arg(long, default_value = "1000")]
    min_request_interval_ms: u64,

    /// How many legal moves are listed in each prompt
    #[arg(long, default_value = "20")]
    candidate_limit: usize,
}

impl Args {
    fn resolver_config(&self) -> ResolverConfig {
        ResolverConfig {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_jitter: Duration::from_millis(self.max_jitter_ms),
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            min_request_interval: Duration::from_millis(self.min_request_interval_ms),
            candidate_limit: self.candidate_limit,
        }
    }

    fn server_config(&self) -> Result<ServerConfig, config::ConfigError> {
        let ai_seat = if self.no_ai {
            None
        } else {
            Some(config::parse_seat(&self.ai_seat)?)
        };
        let server_config = ServerConfig {
            host: self.host.clone(),
            port: self.port,
            max_clients: self.max_clients,
            ai_seat,
        };
        server_config.validate()?;
        Ok(server_config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let ai_enabled = !args.no_ai || args.check_ai;

    let api_key = match config::require_api_key(args.gemini_api_key.as_deref(), ai_enabled) {
        Ok(key) => key,
        Err(e) => {
            error!("{}", e);
            return Err(e.into());
        }
    };
    let server_config = args.server_config()?;
    let resolver_config = args.resolver_config();
    config::validate_resolver(&resolver_config)?;

    let service: Option<Arc<dyn MoveSuggester>> = api_key.map(|key| {
        Arc::new(GeminiClient::new(key, args.model.clone(), args.endpoint.clone()))
            as Arc<dyn MoveSuggester>
    });

    if args.check_ai {
        if let Some(service) = &service {
            let reply =
                check_connectivity(service.as_ref(), resolver_config.request_timeout).await?;
            println!("AI service reachable, replied: {}", reply.trim());
        }
        return Ok(());
    }

    info!("Starting chess server on {}", server_config.bind_addr());
    let resolver = service.map(|service| MoveResolver::new(service, resolver_config));

    let mut server = Server::new(server_config, resolver).await?;
    server.run().await?;

    Ok(())
}
