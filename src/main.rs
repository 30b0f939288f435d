use staticd::config::Config;
use staticd::server::Server;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut cfg = Config::load()?;
    cfg.apply_args(std::env::args().skip(1))?;

    Server::bind(&cfg)?.run()
}
