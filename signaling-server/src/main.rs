use log::info;
use simplelog::{ColorChoice, TermLogger, TerminalMode};

use gant_meet_signaling_server::config::Config;
use gant_meet_signaling_server::relay::Relay;
use gant_meet_signaling_server::router::{self, ServerState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    TermLogger::init(
        config.level_filter()?,
        simplelog::Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )?;

    let relay = Relay::new(config.relay_settings());
    if config.access_secret.is_some() {
        info!("joins require the shared secret");
    }
    let app = router::create(ServerState::new(relay));

    info!("signaling relay listening on {}", config.address);
    axum::Server::bind(&config.address)
        .serve(app.into_make_service())
        .await?;
    Ok(())
}
