// Bot presence. Kept apart from the commands so the setup hook stays short.

use poise::serenity_prelude as serenity;

/// Show `status_text` as the bot's activity. A leading "listening:" prefix
/// switches the activity kind, anything else is shown as "Playing".
pub fn set_status(ctx: &serenity::Context, status_text: &str) {
    let activity = match status_text.strip_prefix("listening:") {
        Some(rest) => serenity::ActivityData::listening(rest.trim()),
        None => serenity::ActivityData::playing(status_text),
    };
    ctx.set_presence(Some(activity), serenity::OnlineStatus::Online);
}

/// Called once the bot is ready.
pub fn on_ready(ctx: &serenity::Context, status_text: &str) {
    set_status(ctx, status_text);
}
