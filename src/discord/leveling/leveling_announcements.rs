use crate::core::leveling::progression;
use crate::core::leveling::LevelUpEvent;
use crate::discord::commands::leveling::build_progress_bar;
use crate::discord::Data;
use poise::serenity_prelude::{self as serenity, builder::CreateMessage};
use rand::seq::SliceRandom;

/// Post a level-up embed to the configured announcement channel, or to the
/// channel the message came from when none is configured.
pub async fn send_level_up_embed(
    ctx: &serenity::Context,
    message: &serenity::Message,
    data: &Data,
    level_up: &LevelUpEvent,
) -> Result<(), serenity::Error> {
    let channel_id = data
        .config
        .level_up_channel_id
        .map(serenity::ChannelId::new)
        .unwrap_or(message.channel_id);

    let progress = progression::progress(level_up.total_xp);

    let embed = serenity::CreateEmbed::new()
        .title("Level Up!")
        .description(format!(
            "<@{}> reached level {}!",
            level_up.user_id, level_up.new_level
        ))
        .color(level_color(level_up.new_level))
        .field("Total XP", level_up.total_xp.to_string(), true)
        .field(
            "Next level in",
            format!("{} XP", progress.xp_remaining()),
            true,
        )
        .field(
            "Progress",
            format!(
                "{}/{} XP\n{}",
                progress.xp_into_level,
                progress.xp_for_next_level,
                build_progress_bar(progress.ratio(), 18)
            ),
            false,
        )
        .footer(serenity::CreateEmbedFooter::new(random_flavor_line()));

    channel_id
        .send_message(ctx, CreateMessage::new().embed(embed))
        .await
        .map(|_| ())
}

fn level_color(level: u32) -> serenity::Colour {
    if level >= 50 {
        serenity::Colour::DARK_PURPLE
    } else if level >= 25 {
        serenity::Colour::ORANGE
    } else if level >= 10 {
        serenity::Colour::GOLD
    } else if level >= 5 {
        serenity::Colour::BLURPLE
    } else {
        serenity::Colour::LIGHT_GREY
    }
}

fn random_flavor_line() -> &'static str {
    const FLAVOR_LINES: [&str; 4] = [
        "Keep the conversation going!",
        "Every message counts.",
        "Another level, another milestone.",
        "The next threshold is already in sight.",
    ];

    FLAVOR_LINES
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(FLAVOR_LINES[0])
}
