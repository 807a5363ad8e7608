use poise::serenity_prelude as serenity;
use tracing::info;

use crate::features::setup_wizard::preview_embed;
use crate::features::verification::{is_permission_error, verify_button};
use crate::{Context, Error};

/// The prompt only goes to plain text channels; categories, voice
/// channels and threads are refused.
pub fn deployable_channel(kind: serenity::ChannelType) -> bool {
    kind == serenity::ChannelType::Text
}

/// Publish the verification prompt in a channel
#[poise::command(
    slash_command,
    guild_only,
    required_permissions = "ADMINISTRATOR",
    default_member_permissions = "ADMINISTRATOR"
)]
pub async fn deploy(
    ctx: Context<'_>,
    #[description = "Channel to publish the verification prompt in"]
    #[channel_types("Text")]
    channel: serenity::GuildChannel,
) -> Result<(), Error> {
    let guild_id = match ctx.guild_id() {
        Some(id) => id,
        None => {
            ctx.say("This command can only be used in a server.").await?;
            return Ok(());
        }
    };

    let data = ctx.data();
    let config = data.store.get_or_create(&guild_id.to_string())?;

    if !config.setup_complete {
        ctx.send(
            poise::CreateReply::default()
                .content("❌ Finish the initial setup with `/setup` first!")
                .ephemeral(true),
        )
        .await?;
        return Ok(());
    }
    if config.verified_role_id.is_none() {
        ctx.send(
            poise::CreateReply::default()
                .content("❌ No verification role is set. Configure one with `/settings`.")
                .ephemeral(true),
        )
        .await?;
        return Ok(());
    }

    // The picker is already constrained to text channels; the resolved
    // kind is re-checked on the way out
    if !deployable_channel(channel.kind) {
        ctx.send(
            poise::CreateReply::default()
                .content("❌ The verification prompt can only be published in a text channel.")
                .ephemeral(true),
        )
        .await?;
        return Ok(());
    }

    let channel_id = channel.id;
    let message = serenity::CreateMessage::new()
        .embed(preview_embed(&config))
        .components(vec![serenity::CreateActionRow::Buttons(vec![
            verify_button(&config, guild_id.get()),
        ])]);

    match channel_id.send_message(ctx.http(), message).await {
        Ok(_) => {
            info!("Guild {}: verification prompt deployed to {}", guild_id, channel_id);
            ctx.send(
                poise::CreateReply::default()
                    .content(format!("✅ Verification prompt published in <#{}>!", channel_id))
                    .ephemeral(true),
            )
            .await?;
        }
        Err(err) if is_permission_error(&err) => {
            ctx.send(
                poise::CreateReply::default()
                    .content(format!(
                        "❌ The bot is not allowed to send messages in <#{}>.",
                        channel_id
                    ))
                    .ephemeral(true),
            )
            .await?;
        }
        Err(err) => {
            ctx.send(
                poise::CreateReply::default()
                    .content(format!("❌ Something went wrong: {}", err))
                    .ephemeral(true),
            )
            .await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_text_channels_accept_the_prompt() {
        assert!(deployable_channel(serenity::ChannelType::Text));
        assert!(!deployable_channel(serenity::ChannelType::Voice));
        assert!(!deployable_channel(serenity::ChannelType::Category));
        assert!(!deployable_channel(serenity::ChannelType::Forum));
        assert!(!deployable_channel(serenity::ChannelType::PublicThread));
    }
}
