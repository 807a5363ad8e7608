use crate::features::setup_wizard::{embed_step_components, preview_embed, WizardState};
use crate::{Context, Error};

/// Change the verification configuration of this server
#[poise::command(
    slash_command,
    guild_only,
    required_permissions = "ADMINISTRATOR",
    default_member_permissions = "ADMINISTRATOR"
)]
pub async fn settings(ctx: Context<'_>) -> Result<(), Error> {
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

    // Re-entry starts at the embed step against the existing record
    data.wizard_sessions
        .open(guild_id.get(), ctx.author().id.get(), WizardState::EmbedStep);

    ctx.send(
        poise::CreateReply::default()
            .embed(preview_embed(&config))
            .components(embed_step_components(&config))
            .ephemeral(true),
    )
    .await?;

    Ok(())
}
