// Nuvex Bot - Rust Edition
// A lightweight Discord verification bot with a guided setup wizard

mod commands;
mod features;
mod models;
mod storage;
mod utils;

use std::env;
use std::sync::Arc;

use poise::serenity_prelude as serenity;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::features::setup_wizard::WizardSessions;
use crate::features::{setup_wizard, verification};
use crate::storage::{ConfigStore, JsonFileBackend};

/// Shared state across all commands and interaction handlers
pub struct Data {
    pub store: Arc<ConfigStore>,
    pub wizard_sessions: WizardSessions,
}

// Manual Debug impl since ConfigStore holds a backend trait object
impl std::fmt::Debug for Data {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Data")
            .field("store", &"ConfigStore")
            .field("wizard_sessions", &"WizardSessions")
            .finish()
    }
}

type Error = Box<dyn std::error::Error + Send + Sync>;
type Context<'a> = poise::Context<'a, Data, Error>;

/// Register all slash commands
fn get_commands() -> Vec<poise::Command<Data, Error>> {
    vec![
        commands::setup::setup(),
        commands::settings::settings(),
        commands::deploy::deploy(),
    ]
}

/// Route component and modal interactions to the wizard and the
/// verification flow
async fn event_handler(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    if let serenity::FullEvent::InteractionCreate { interaction } = event {
        match interaction {
            serenity::Interaction::Component(component) => {
                let custom_id = component.data.custom_id.as_str();
                if custom_id.starts_with("verify_") {
                    verification::handle_verify(ctx, component, data).await?;
                } else if custom_id.starts_with("setup_") {
                    setup_wizard::handle_component(ctx, component, data).await?;
                }
            }
            serenity::Interaction::Modal(modal) => {
                if modal.data.custom_id.starts_with("setup_") {
                    setup_wizard::handle_modal(ctx, modal, data).await?;
                }
            }
            _ => {}
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            env::var("RUST_LOG").unwrap_or_else(|_| "nuvex_rs=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    let token = env::var("DISCORD_TOKEN").expect("DISCORD_TOKEN must be set");
    let config_path =
        env::var("CONFIG_PATH").unwrap_or_else(|_| "server_configs.json".to_string());

    info!("Starting Nuvex Bot (Rust Edition)...");

    let store = Arc::new(ConfigStore::new(JsonFileBackend::new(&config_path)));
    store.load().expect("Failed to load config store");
    info!("Config store ready ({})", config_path);

    // Setup framework
    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: get_commands(),
            event_handler: |ctx, event, framework, data| {
                Box::pin(event_handler(ctx, event, framework, data))
            },
            on_error: |error| {
                Box::pin(async move {
                    match error {
                        poise::FrameworkError::Command { error, ctx, .. } => {
                            error!("Command error: {:?}", error);
                            let _ = ctx.say(format!("❌ Error: {}", error)).await;
                        }
                        err => {
                            error!("Framework error: {:?}", err);
                        }
                    }
                })
            },
            ..Default::default()
        })
        .setup(|ctx, _ready, framework| {
            Box::pin(async move {
                info!("Bot is ready! Registering commands...");
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                info!("Commands registered successfully!");

                Ok(Data {
                    store,
                    wizard_sessions: WizardSessions::default(),
                })
            })
        })
        .build();

    let intents = serenity::GatewayIntents::GUILDS | serenity::GatewayIntents::GUILD_MEMBERS;

    let mut client = serenity::ClientBuilder::new(token, intents)
        .framework(framework)
        .await
        .expect("Failed to create client");

    // Run with graceful shutdown
    let shard_manager = client.shard_manager.clone();

    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to register Ctrl+C handler");
        info!("Shutting down...");
        shard_manager.shutdown_all().await;
    });

    if let Err(why) = client.start().await {
        error!("Client error: {:?}", why);
    }

    info!("Goodbye!");
}
