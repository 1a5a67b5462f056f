// This is the entry point of the Discord bot.
//
// **Architecture Overview:**
// - `core/` = Business logic (platform-agnostic)
// - `infra/` = Implementations of core traits (databases, files)
// - `discord/` = Discord-specific adapters (commands, events)
//
// This file's job is to:
// 1. Load configuration
// 2. Initialize services (dependency injection)
// 3. Set up the Discord framework
// 4. Register commands and event handlers

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with half a dozen mod.rs files that all look the same.
mod config;
#[path = "core/core_layer.rs"]
mod core;
#[path = "discord/discord_layer.rs"]
mod discord;
#[path = "infra/infra_layer.rs"]
mod infra;

use crate::config::BotConfig;
use crate::core::leveling::LevelingService;
use crate::core::member_count::MemberCountService;
use crate::discord::commands::member_count::{refresh_guild, update_member_count};
use crate::discord::commands::presence;
use crate::discord::leveling_announcements::send_level_up_embed;
use crate::discord::{Data, Error};
use crate::infra::leveling::SqliteXpStore;
use crate::infra::member_count::JsonMemberCountStore;
use anyhow::Context as _;
use poise::serenity_prelude as serenity;
use std::sync::Arc;
use std::time::Duration;

const MEMBER_COUNT_SWEEP_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Event handler for non-command Discord events.
async fn event_handler(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    match event {
        serenity::FullEvent::Message { new_message } => {
            // Ignore bot messages (including our own)
            if new_message.author.bot {
                return Ok(());
            }

            // Only guild messages earn XP
            let Some(guild_id) = new_message.guild_id else {
                return Ok(());
            };

            let now = chrono::Utc::now().timestamp();
            match data
                .leveling
                .process_message(new_message.author.id.get(), guild_id.get(), now)
                .await
            {
                Ok(Some(level_up)) => {
                    tracing::info!(
                        user_id = level_up.user_id,
                        guild_id = level_up.guild_id,
                        old_level = level_up.old_level,
                        new_level = level_up.new_level,
                        total_xp = level_up.total_xp,
                        "User leveled up"
                    );

                    if let Err(err) = send_level_up_embed(ctx, new_message, data, &level_up).await
                    {
                        tracing::warn!("Failed to send level-up embed: {err}");
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::error!("Error processing XP for message: {}", e);
                }
            }
        }
        serenity::FullEvent::GuildMemberAddition { new_member } => {
            if let Err(e) = update_member_count(ctx, data, new_member.guild_id).await {
                tracing::error!("Error updating member count on join: {}", e);
            }
        }
        serenity::FullEvent::GuildMemberRemoval { guild_id, .. } => {
            if let Err(e) = update_member_count(ctx, data, *guild_id).await {
                tracing::error!("Error updating member count on leave: {}", e);
            }
        }
        _ => {}
    }

    Ok(())
}

/// Periodically retry counters whose last rename was skipped by the cooldown.
fn spawn_member_count_sweep(ctx: &serenity::Context, service: Arc<MemberCountService<JsonMemberCountStore>>) {
    let http = ctx.http.clone();
    let cache = ctx.cache.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(MEMBER_COUNT_SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            tracing::debug!("Member count sweep starting");

            let configs = match service.get_all_configs().await {
                Ok(configs) => configs,
                Err(e) => {
                    tracing::warn!("Member count sweep failed to load configs: {}", e);
                    continue;
                }
            };

            for config in configs.into_iter().filter(|c| c.enabled) {
                let guild_id = serenity::GuildId::new(config.guild_id);
                if let Err(e) = refresh_guild(&http, &cache, &service, guild_id).await {
                    tracing::warn!(
                        guild_id = config.guild_id,
                        "Member count sweep update failed: {}",
                        e
                    );
                }
            }
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging so we can see what's happening
    tracing_subscriber::fmt::init();

    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    let config = Arc::new(BotConfig::from_env()?);

    // Keep runtime data in a dedicated folder so the repo root stays tidy.
    std::fs::create_dir_all(&config.data_dir).with_context(|| {
        format!(
            "Failed to create data directory {}",
            config.data_dir.display()
        )
    })?;

    // ========================================================================
    // DEPENDENCY INJECTION
    // ========================================================================
    // This is the "composition root" where we wire everything together.

    let db_path = config.leveling_db_path();
    let xp_store = SqliteXpStore::connect(&db_path.to_string_lossy())
        .await
        .context("Failed to initialize SQLite store")?;
    let leveling_service = Arc::new(LevelingService::with_config(
        xp_store,
        config.leveling.clone(),
    ));

    let member_count_store = JsonMemberCountStore::open(config.member_count_path())
        .context("Failed to load member count configs")?;
    let member_count_service = Arc::new(MemberCountService::new(
        member_count_store,
        config.member_count_cooldown_secs,
    ));

    let data = Data {
        leveling: Arc::clone(&leveling_service),
        member_count: Arc::clone(&member_count_service),
        config: Arc::clone(&config),
    };

    // ========================================================================
    // DISCORD FRAMEWORK SETUP
    // ========================================================================

    let intents = serenity::GatewayIntents::GUILD_MESSAGES
        | serenity::GatewayIntents::MESSAGE_CONTENT
        | serenity::GatewayIntents::GUILDS
        | serenity::GatewayIntents::GUILD_MEMBERS;

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: vec![
                discord::commands::leveling::rank(),
                discord::commands::leveling::leaderboard(),
                discord::commands::leveling::xp(),
                discord::commands::member_count::membercount(),
            ],
            event_handler: |ctx, event, framework, data| {
                Box::pin(event_handler(ctx, event, framework, data))
            },
            on_error: |error| {
                Box::pin(async move {
                    if let poise::FrameworkError::Command { error, ctx, .. } = &error {
                        tracing::error!(command = %ctx.command().name, "Command failed: {}", error);
                    }
                    if let Err(e) = poise::builtins::on_error(error).await {
                        tracing::error!("Error while handling error: {}", e);
                    }
                })
            },
            ..Default::default()
        })
        .setup(|ctx, ready, framework| {
            Box::pin(async move {
                tracing::info!("Logged in as {}", ready.user.name);

                // Register slash commands globally (can take up to an hour to propagate)
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                tracing::info!("Commands registered");

                presence::on_ready(ctx, &data.config.status_text);
                spawn_member_count_sweep(ctx, Arc::clone(&data.member_count));

                Ok(data)
            })
        })
        .build();

    let mut client = serenity::ClientBuilder::new(&config.discord_token, intents)
        .framework(framework)
        .await
        .context("Error creating client")?;

    let result = client.start().await.context("Error running bot");

    leveling_service.store().close().await;
    result
}
