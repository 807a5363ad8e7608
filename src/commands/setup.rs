use crate::features::setup_wizard::{intro_components, intro_embed, WizardState};
use crate::models::guild::GuildConfig;
use crate::{Context, Error};

/// Entry decision for `/setup`. A guild that already completed setup is
/// pointed at `/settings` and never re-enters the intro.
#[derive(Debug, PartialEq, Eq)]
pub enum SetupEntry {
    AlreadyComplete,
    OpenIntro,
}

pub fn setup_entry(config: &GuildConfig) -> SetupEntry {
    if config.setup_complete {
        SetupEntry::AlreadyComplete
    } else {
        SetupEntry::OpenIntro
    }
}

/// Start the verification setup wizard for this server
#[poise::command(
    slash_command,
    guild_only,
    required_permissions = "ADMINISTRATOR",
    default_member_permissions = "ADMINISTRATOR"
)]
pub async fn setup(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = match ctx.guild_id() {
        Some(id) => id,
        None => {
            ctx.say("This command can only be used in a server.").await?;
            return Ok(());
        }
    };

    let data = ctx.data();
    let config = data.store.get_or_create(&guild_id.to_string())?;

    // Re-running after completion short-circuits; no wizard re-entry here
    if setup_entry(&config) == SetupEntry::AlreadyComplete {
        ctx.send(
            poise::CreateReply::default()
                .content("✅ Setup is already complete! Use `/settings` to change the configuration.")
                .ephemeral(true),
        )
        .await?;
        return Ok(());
    }

    data.wizard_sessions
        .open(guild_id.get(), ctx.author().id.get(), WizardState::Intro);

    ctx.send(
        poise::CreateReply::default()
            .embed(intro_embed())
            .components(intro_components())
            .ephemeral(true),
    )
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completed_setup_short_circuits_without_reset() {
        let mut config = GuildConfig::default();
        config.setup_complete = true;
        config.verified_role_id = Some(42);
        config.log_channel_id = Some(7);
        let before = config.clone();

        // A second /setup after completion never re-enters the intro,
        // and the decision touches nothing in the record
        assert_eq!(setup_entry(&config), SetupEntry::AlreadyComplete);
        assert_eq!(config, before);
    }

    #[test]
    fn fresh_guild_enters_the_intro() {
        assert_eq!(setup_entry(&GuildConfig::default()), SetupEntry::OpenIntro);
    }
}
