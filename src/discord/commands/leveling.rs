// Discord commands for the leveling system.
//
// The pattern is the same for every command:
// 1. Extract primitive data from Discord types
// 2. Call the core service
// 3. Format the response
//
// No leveling rules live here; thresholds and ranks come from the core.

use crate::config::BotConfig;
use crate::core::leveling::{
    AdjustmentInputError, AdjustmentKind, AdminAdjustment, LevelingError, LevelingService,
    UserProgress,
};
use crate::core::member_count::MemberCountService;
use crate::infra::leveling::SqliteXpStore;
use crate::infra::member_count::JsonMemberCountStore;
use poise::serenity_prelude as serenity;
use std::sync::Arc;

/// Type alias for our bot's context.
/// This is what every command receives as its first parameter.
pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;

/// Data that's shared across all commands.
pub struct Data {
    pub leveling: Arc<LevelingService<SqliteXpStore>>,
    pub member_count: Arc<MemberCountService<JsonMemberCountStore>>,
    pub config: Arc<BotConfig>,
}

const LEADERBOARD_PER_PAGE: usize = 5;
const LEADERBOARD_FETCH_LIMIT: usize = 100;

/// Show your level, XP and rank.
#[poise::command(slash_command, guild_only)]
pub async fn rank(
    ctx: Context<'_>,
    #[description = "User to check (defaults to you)"] user: Option<serenity::User>,
) -> Result<(), Error> {
    let target_user = user.as_ref().unwrap_or_else(|| ctx.author());
    let user_id = target_user.id.get();
    let guild_id = ctx
        .guild_id()
        .ok_or("This command only works in servers")?
        .get();

    if target_user.bot {
        ctx.say("Bots don't earn XP! 🤖").await?;
        return Ok(());
    }

    let card = ctx.data().leveling.rank_card(user_id, guild_id).await?;
    let progress = card.progress;

    let embed = serenity::CreateEmbed::new()
        .title(format!("Rank of {}", target_user.name))
        .color(0x00ff00)
        .thumbnail(target_user.face())
        .field("Level", format!("**{}**", progress.level), true)
        .field("Total XP", format!("**{}**", card.record.xp), true)
        .field("Rank", format!("**#{}**", card.rank), true)
        .field(
            "Progress",
            format!(
                "{}/{} XP\n{}",
                progress.xp_into_level,
                progress.xp_for_next_level,
                build_progress_bar(progress.ratio(), 15)
            ),
            false,
        )
        .field("XP to next level", progress.xp_remaining().to_string(), true)
        .field("Messages", card.record.message_count.to_string(), true);

    ctx.send(poise::CreateReply::default().embed(embed)).await?;

    Ok(())
}

/// Show the server's XP leaderboard.
#[poise::command(slash_command, guild_only)]
pub async fn leaderboard(
    ctx: Context<'_>,
    #[description = "Page number (default: 1)"]
    #[min = 1]
    page: Option<usize>,
) -> Result<(), Error> {
    let guild_id = ctx
        .guild_id()
        .ok_or("This command only works in servers")?
        .get();

    ctx.defer().await?;

    let profiles: Vec<UserProgress> = ctx
        .data()
        .leveling
        .leaderboard(guild_id, LEADERBOARD_FETCH_LIMIT)
        .await?
        .into_iter()
        .filter(|profile| !is_bot_cached(&ctx, guild_id, profile.user_id))
        .collect();

    if profiles.is_empty() {
        ctx.say("No one has earned XP yet! Start chatting to get on the leaderboard! 💬")
            .await?;
        return Ok(());
    }

    let author_id = ctx.author().id.get();
    // Positions on the board skip bots, so the header uses the same list.
    let author_position = profiles.iter().position(|p| p.user_id == author_id);

    let total_pages = page_count(profiles.len(), LEADERBOARD_PER_PAGE);
    let mut current_page = page.unwrap_or(1).clamp(1, total_pages);

    let render = |current_page: usize| {
        let header = match author_position {
            Some(idx) => format!("Your rank: **#{}**\n\n", idx + 1),
            None => format!("You are not in the top {}.\n\n", LEADERBOARD_FETCH_LIMIT),
        };
        let embed = leaderboard_embed(
            &ctx,
            guild_id,
            &profiles,
            header,
            current_page,
            total_pages,
        );
        poise::CreateReply::default()
            .embed(embed)
            .components(leaderboard_buttons(current_page, total_pages))
    };

    let msg = ctx.send(render(current_page)).await?;
    let msg_id = msg.message().await?.id;

    while let Some(mci) = serenity::ComponentInteractionCollector::new(ctx)
        .author_id(ctx.author().id)
        .channel_id(ctx.channel_id())
        .timeout(std::time::Duration::from_secs(60 * 2))
        .filter(move |mci| mci.message.id == msg_id)
        .await
    {
        match mci.data.custom_id.as_str() {
            "prev" => current_page = current_page.saturating_sub(1).max(1),
            "next" => current_page = (current_page + 1).min(total_pages),
            "find_me" => match author_position {
                Some(idx) => current_page = idx / LEADERBOARD_PER_PAGE + 1,
                None => {
                    if let Err(e) = mci
                        .create_response(
                            &ctx,
                            serenity::CreateInteractionResponse::Message(
                                serenity::CreateInteractionResponseMessage::new()
                                    .content("You are not on the leaderboard yet!")
                                    .ephemeral(true),
                            ),
                        )
                        .await
                    {
                        tracing::warn!("Error sending ephemeral response: {}", e);
                    }
                    continue;
                }
            },
            _ => {}
        }

        // Defer so slow edits don't surface as "Unknown interaction".
        if let Err(e) = mci.defer(&ctx.http()).await {
            tracing::warn!("Error deferring interaction: {}", e);
            continue;
        }

        if let Err(e) = msg.edit(ctx, render(current_page)).await {
            tracing::warn!("Error updating leaderboard: {}", e);
        }
    }

    // Drop the buttons once the collector times out.
    let _ = msg
        .edit(ctx, poise::CreateReply::default().components(vec![]))
        .await;

    Ok(())
}

fn leaderboard_embed(
    ctx: &Context<'_>,
    guild_id: u64,
    profiles: &[UserProgress],
    mut description: String,
    current_page: usize,
    total_pages: usize,
) -> serenity::CreateEmbed {
    let offset = (current_page - 1) * LEADERBOARD_PER_PAGE;
    let author_id = ctx.author().id.get();

    for (index, stats) in profiles
        .iter()
        .skip(offset)
        .take(LEADERBOARD_PER_PAGE)
        .enumerate()
    {
        let position = offset + index + 1;
        let user_name = resolve_display_name_cached(ctx, guild_id, stats.user_id);

        let medal = match position {
            1 => "🥇",
            2 => "🥈",
            3 => "🥉",
            _ => "  ",
        };

        let name_display = if stats.user_id == author_id {
            format!("**{}** (You)", user_name)
        } else {
            user_name
        };

        let bar = build_progress_bar(stats.progress().ratio(), 10);

        description.push_str(&format!(
            "{} **#{}** {}\nLevel {} | {} XP\n{}\n\n",
            medal, position, name_display, stats.level, stats.xp, bar
        ));
    }

    serenity::CreateEmbed::new()
        .title("📊 Leaderboard")
        .description(description)
        .color(0xffd700)
        .footer(serenity::CreateEmbedFooter::new(format!(
            "Page {}/{}",
            current_page, total_pages
        )))
}

fn leaderboard_buttons(current_page: usize, total_pages: usize) -> Vec<serenity::CreateActionRow> {
    vec![serenity::CreateActionRow::Buttons(vec![
        serenity::CreateButton::new("prev")
            .label("◀ Previous")
            .style(serenity::ButtonStyle::Primary)
            .disabled(current_page <= 1),
        serenity::CreateButton::new("next")
            .label("Next ▶")
            .style(serenity::ButtonStyle::Primary)
            .disabled(current_page >= total_pages),
        serenity::CreateButton::new("find_me")
            .label("🔍 Find Me")
            .style(serenity::ButtonStyle::Secondary),
    ])]
}

fn page_count(len: usize, per_page: usize) -> usize {
    len.div_ceil(per_page).max(1)
}

/// Display name from the cache only: guild nickname, then username, then a
/// mention. Leaderboards must not wait on HTTP.
fn resolve_display_name_cached(ctx: &Context<'_>, guild_id: u64, user_id: u64) -> String {
    let guild_id_s = serenity::GuildId::from(guild_id);
    let user_id_s = serenity::UserId::from(user_id);

    if let Some(guild) = ctx.serenity_context().cache.guild(guild_id_s) {
        if let Some(member) = guild.members.get(&user_id_s) {
            return member.display_name().to_string();
        }
    }

    if let Some(user) = ctx.serenity_context().cache.user(user_id_s) {
        return user.name.clone();
    }

    format!("<@{}>", user_id)
}

/// Cache-only bot check. Unknown users are treated as humans.
fn is_bot_cached(ctx: &Context<'_>, guild_id: u64, user_id: u64) -> bool {
    let user_id_s = serenity::UserId::from(user_id);
    let guild_id_s = serenity::GuildId::from(guild_id);

    if let Some(user) = ctx.serenity_context().cache.user(user_id_s) {
        return user.bot;
    }

    if let Some(guild) = ctx.serenity_context().cache.guild(guild_id_s) {
        if let Some(member) = guild.members.get(&user_id_s) {
            return member.user.bot;
        }
    }

    false
}

// ============================================================================
// ADMIN COMMANDS
// ============================================================================

/// Adjust a member's XP (admin only).
#[poise::command(
    slash_command,
    guild_only,
    required_permissions = "ADMINISTRATOR",
    subcommands("add", "remove", "set")
)]
pub async fn xp(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Give XP to a member.
#[poise::command(slash_command, guild_only, required_permissions = "ADMINISTRATOR")]
pub async fn add(
    ctx: Context<'_>,
    #[description = "Member to give XP to"] user: serenity::User,
    #[description = "Amount of XP to add"] amount: i64,
) -> Result<(), Error> {
    adjust(ctx, user, AdminAdjustment::parse(AdjustmentKind::Add, amount)).await
}

/// Take XP away from a member. XP never drops below zero.
#[poise::command(slash_command, guild_only, required_permissions = "ADMINISTRATOR")]
pub async fn remove(
    ctx: Context<'_>,
    #[description = "Member to take XP from"] user: serenity::User,
    #[description = "Amount of XP to remove"] amount: i64,
) -> Result<(), Error> {
    adjust(ctx, user, AdminAdjustment::parse(AdjustmentKind::Remove, amount)).await
}

/// Set a member's level or total XP. Provide exactly one of the two.
#[poise::command(slash_command, guild_only, required_permissions = "ADMINISTRATOR")]
pub async fn set(
    ctx: Context<'_>,
    #[description = "Member to update"] user: serenity::User,
    #[description = "Level to set (XP becomes that level's threshold)"] level: Option<i64>,
    #[description = "Total XP to set"] total_xp: Option<i64>,
) -> Result<(), Error> {
    adjust(ctx, user, AdminAdjustment::for_set(level, total_xp)).await
}

async fn adjust(
    ctx: Context<'_>,
    user: serenity::User,
    adjustment: Result<AdminAdjustment, AdjustmentInputError>,
) -> Result<(), Error> {
    if user.bot {
        ctx.say("You can't adjust XP for bots!").await?;
        return Ok(());
    }

    let adjustment = match adjustment {
        Ok(adjustment) => adjustment,
        Err(err) => {
            ctx.send(
                poise::CreateReply::default()
                    .content(format!("❌ {}", err))
                    .ephemeral(true),
            )
            .await?;
            return Ok(());
        }
    };

    let guild_id = ctx
        .guild_id()
        .ok_or("This command only works in servers")?
        .get();

    let outcome = match ctx
        .data()
        .leveling
        .apply_admin_delta(user.id.get(), guild_id, adjustment)
        .await
    {
        Ok(outcome) => outcome,
        Err(LevelingError::InvalidInput(reason)) => {
            ctx.send(
                poise::CreateReply::default()
                    .content(format!("❌ {}", reason))
                    .ephemeral(true),
            )
            .await?;
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    ctx.say(format!(
        "✅ {}: {} → {} XP (level {} → {})",
        user.name,
        outcome.previous_xp,
        outcome.record.xp,
        outcome.previous_level,
        outcome.record.level
    ))
    .await?;

    Ok(())
}

pub fn build_progress_bar(progress: f64, length: usize) -> String {
    let clamped = progress.clamp(0.0, 1.0);
    let mut filled = (clamped * length as f64).round() as usize;
    if clamped > 0.0 && filled == 0 {
        filled = 1;
    }
    filled = filled.min(length);
    let bar = "▰".repeat(filled) + &"▱".repeat(length - filled);
    format!("{} ({}%)", bar, (clamped * 100.0).round() as u32)
}
