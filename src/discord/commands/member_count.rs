use crate::core::member_count::member_count_models::DEFAULT_TEMPLATE;
use crate::core::member_count::{MemberCountError, MemberCountService};
use crate::discord::{Context, Data, Error};
use crate::infra::member_count::JsonMemberCountStore;
use poise::serenity_prelude as serenity;

/// Keep a channel's name in sync with the server's member count
#[poise::command(
    slash_command,
    guild_only,
    required_permissions = "ADMINISTRATOR",
    subcommands("setup", "remove", "pause", "resume", "status")
)]
pub async fn membercount(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Use a channel as the member counter
#[poise::command(slash_command, guild_only, required_permissions = "ADMINISTRATOR")]
pub async fn setup(
    ctx: Context<'_>,
    #[description = "Channel to rename (usually a locked voice channel)"]
    #[channel_types("Voice", "Text")]
    channel: serenity::GuildChannel,
    #[description = "Name template, must contain {count}"] template: Option<String>,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be in a guild")?;
    let template = template.unwrap_or_else(|| DEFAULT_TEMPLATE.to_string());

    ctx.defer().await?;

    match ctx
        .data()
        .member_count
        .configure(guild_id.get(), channel.id.get(), &template)
        .await
    {
        Ok(_) => {}
        Err(MemberCountError::AlreadyConfigured) => {
            ctx.say("❌ A member counter is already configured! Use `/membercount remove` first.")
                .await?;
            return Ok(());
        }
        Err(MemberCountError::InvalidTemplate(reason)) => {
            ctx.say(format!("❌ Invalid template: {}", reason)).await?;
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    }

    if let Err(e) = update_member_count(ctx.serenity_context(), ctx.data(), guild_id).await {
        tracing::warn!("Initial member count update failed: {}", e);
    }

    ctx.say(format!("✅ <#{}> will now show the member count.", channel.id))
        .await?;

    Ok(())
}

/// Stop using a channel as the member counter (the channel is kept)
#[poise::command(slash_command, guild_only, required_permissions = "ADMINISTRATOR")]
pub async fn remove(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be in a guild")?;

    match ctx.data().member_count.remove(guild_id.get()).await {
        Ok(config) => {
            ctx.say(format!(
                "✅ <#{}> is no longer a member counter.",
                config.channel_id
            ))
            .await?;
        }
        Err(MemberCountError::NotConfigured) => {
            ctx.say("❌ No member counter is configured for this server!")
                .await?;
        }
        Err(e) => return Err(e.into()),
    }

    Ok(())
}

/// Pause member count updates
#[poise::command(slash_command, guild_only, required_permissions = "ADMINISTRATOR")]
pub async fn pause(ctx: Context<'_>) -> Result<(), Error> {
    toggle(ctx, false).await
}

/// Resume member count updates
#[poise::command(slash_command, guild_only, required_permissions = "ADMINISTRATOR")]
pub async fn resume(ctx: Context<'_>) -> Result<(), Error> {
    toggle(ctx, true).await
}

async fn toggle(ctx: Context<'_>, enabled: bool) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be in a guild")?;

    match ctx
        .data()
        .member_count
        .set_enabled(guild_id.get(), enabled)
        .await
    {
        Ok(()) => {
            if enabled {
                if let Err(e) =
                    update_member_count(ctx.serenity_context(), ctx.data(), guild_id).await
                {
                    tracing::warn!("Member count refresh failed: {}", e);
                }
                ctx.say("✅ Member counter resumed.").await?;
            } else {
                ctx.say("⏸️ Member counter paused.").await?;
            }
        }
        Err(MemberCountError::NotConfigured) => {
            ctx.say("❌ No member counter is configured for this server!")
                .await?;
        }
        Err(e) => return Err(e.into()),
    }

    Ok(())
}

/// Show member counter status
#[poise::command(slash_command, guild_only, required_permissions = "ADMINISTRATOR")]
pub async fn status(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be in a guild")?;

    let config = match ctx.data().member_count.get_config(guild_id.get()).await? {
        Some(c) => c,
        None => {
            ctx.say("❌ No member counter is configured for this server!")
                .await?;
            return Ok(());
        }
    };

    let last_count = config
        .last_count
        .map(|c| c.to_string())
        .unwrap_or_else(|| "—".to_string());
    let last_renamed = config
        .last_renamed_at
        .map(|t| format!("<t:{}:R>", t.timestamp()))
        .unwrap_or_else(|| "never".to_string());

    let embed = serenity::CreateEmbed::default()
        .title("Member Counter Status")
        .color(0x3498db)
        .field(
            "Status",
            if config.enabled { "Enabled" } else { "Paused" },
            true,
        )
        .field("Channel", format!("<#{}>", config.channel_id), true)
        .field("Template", format!("`{}`", config.template), false)
        .field("Last count", last_count, true)
        .field("Last renamed", last_renamed, true);

    ctx.send(poise::CreateReply::default().embed(embed)).await?;

    Ok(())
}

/// Refresh the counter channel for a guild from the cached member count.
pub async fn update_member_count(
    ctx: &serenity::Context,
    data: &Data,
    guild_id: serenity::GuildId,
) -> Result<(), Error> {
    refresh_guild(&ctx.http, &ctx.cache, &data.member_count, guild_id).await
}

/// Same as [`update_member_count`] but usable from background tasks that only
/// hold the HTTP client and cache.
pub async fn refresh_guild(
    http: &serenity::Http,
    cache: &serenity::Cache,
    service: &MemberCountService<JsonMemberCountStore>,
    guild_id: serenity::GuildId,
) -> Result<(), Error> {
    // The count comes from the cache; it's kept current by member add/remove events.
    let Some(count) = cache.guild(guild_id).map(|guild| guild.member_count) else {
        return Ok(());
    };

    let now = chrono::Utc::now();
    let rename = match service.plan_update(guild_id.get(), count, now).await? {
        Some(rename) => rename,
        None => return Ok(()),
    };

    // Only a successful edit is recorded, so a failed one is retried by the sweep.
    serenity::ChannelId::new(rename.channel_id)
        .edit(http, serenity::EditChannel::new().name(&rename.name))
        .await?;
    service.record_rename(guild_id.get(), count, now).await?;

    tracing::debug!(
        guild_id = guild_id.get(),
        count,
        "Renamed member count channel"
    );
    Ok(())
}
