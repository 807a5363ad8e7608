// End-user verification: the deployed button click, the simulated check,
// the role grant and the optional audit entry.
//
// The "bot check" arithmetic is a display-only placeholder, not a security
// control: the grant always proceeds after the delay.

use std::time::Duration;

use poise::serenity_prelude as serenity;
use rand::Rng;
use tracing::{debug, info, warn};

use crate::models::guild::GuildConfig;
use crate::utils::config::colors;
use crate::{Data, Error};

/// Fixed pause shown after the arithmetic, before the grant.
const POST_CHECK_PAUSE: Duration = Duration::from_millis(500);

// --- Pure flow pieces ---

/// Outcome of the pre-grant checks, in abort order. `AlreadyVerified`
/// makes the flow idempotent: repeated clicks by a verified user never
/// reach the grant or the audit entry.
#[derive(Debug, PartialEq, Eq)]
pub enum Precheck {
    NotConfigured,
    RoleMissing,
    AlreadyVerified,
    Grant { role_id: u64 },
}

pub fn precheck(config: &GuildConfig, role_exists: bool, member_roles: &[u64]) -> Precheck {
    let Some(role_id) = config.verified_role_id else {
        return Precheck::NotConfigured;
    };
    if !role_exists {
        return Precheck::RoleMissing;
    }
    if member_roles.contains(&role_id) {
        return Precheck::AlreadyVerified;
    }
    Precheck::Grant { role_id }
}

/// The cosmetic arithmetic shown to the user while "verifying".
#[derive(Debug, Clone, Copy)]
pub struct BotCheck {
    pub a: u32,
    pub b: u32,
}

impl BotCheck {
    pub fn generate(rng: &mut impl Rng) -> Self {
        Self {
            a: rng.random_range(1..=10),
            b: rng.random_range(1..=10),
        }
    }

    pub fn sum(&self) -> u32 {
        self.a + self.b
    }
}

/// Uniformly distributed pause in [1.0, 3.0] seconds.
pub fn verification_delay(rng: &mut impl Rng) -> Duration {
    Duration::from_secs_f64(rng.random_range(1.0..=3.0))
}

pub fn success_message(role_name: &str, check: &BotCheck) -> String {
    format!(
        "✅ Verification complete! You received the **{}** role.\n\
         🤖 Bot check passed: `{} + {} = {}` ✓",
        role_name,
        check.a,
        check.b,
        check.sum()
    )
}

pub fn verify_custom_id(guild_id: u64) -> String {
    format!("verify_{guild_id}")
}

/// The deployed verification control, styled from the guild's config.
pub fn verify_button(config: &GuildConfig, guild_id: u64) -> serenity::CreateButton {
    let mut button = serenity::CreateButton::new(verify_custom_id(guild_id))
        .label(config.button_label.clone())
        .style(serenity::ButtonStyle::Success);
    if let Some(emoji) = &config.button_emoji {
        button = button.emoji(serenity::ReactionType::Unicode(emoji.clone()));
    }
    button
}

pub fn is_permission_error(err: &::serenity::Error) -> bool {
    matches!(
        err,
        ::serenity::Error::Http(::serenity::http::HttpError::UnsuccessfulRequest(response))
            if response.status_code.as_u16() == 403
    )
}

// --- Handler ---

/// Handle a click on the deployed verification button. Reads the guild
/// config; never mutates it.
pub async fn handle_verify(
    ctx: &serenity::Context,
    interaction: &serenity::ComponentInteraction,
    data: &Data,
) -> Result<(), Error> {
    let Some(guild_id) = interaction.guild_id else {
        return Ok(());
    };
    let guild_key = guild_id.get().to_string();
    let config = data.store.get_or_create(&guild_key)?;

    // Resolve the configured role before deciding anything; cache refs
    // must not be held across awaits
    let role_name = {
        config.verified_role_id.and_then(|role_id| {
            guild_id
                .to_guild_cached(&ctx.cache)
                .and_then(|guild| guild.roles.get(&serenity::RoleId::new(role_id)).cloned())
                .map(|role| role.name)
        })
    };
    let member_roles: Vec<u64> = interaction
        .member
        .as_ref()
        .map(|member| member.roles.iter().map(|role_id| role_id.get()).collect())
        .unwrap_or_default();

    let role_id = match precheck(&config, role_name.is_some(), &member_roles) {
        Precheck::NotConfigured => {
            return ephemeral_reply(
                ctx,
                interaction,
                "❌ No verification role is configured. Contact an administrator.",
            )
            .await;
        }
        Precheck::RoleMissing => {
            return ephemeral_reply(
                ctx,
                interaction,
                "❌ The verification role no longer exists. Contact an administrator.",
            )
            .await;
        }
        Precheck::AlreadyVerified => {
            return ephemeral_reply(ctx, interaction, "✅ You are already verified!").await;
        }
        Precheck::Grant { role_id } => role_id,
    };
    let role_name = role_name.unwrap_or_default();

    // Pending acknowledgment, visible only to the clicking user
    interaction
        .create_response(
            &ctx.http,
            serenity::CreateInteractionResponse::Defer(
                serenity::CreateInteractionResponseMessage::new().ephemeral(true),
            ),
        )
        .await?;

    // ThreadRng is not Send; draw everything before the first await
    let (delay, check) = {
        let mut rng = rand::rng();
        (verification_delay(&mut rng), BotCheck::generate(&mut rng))
    };
    tokio::time::sleep(delay).await;
    tokio::time::sleep(POST_CHECK_PAUSE).await;

    let grant = ctx
        .http
        .add_member_role(
            guild_id,
            interaction.user.id,
            serenity::RoleId::new(role_id),
            Some("Verification"),
        )
        .await;

    match grant {
        Ok(()) => {
            info!(
                "Guild {}: granted role {} to user {}",
                guild_key, role_id, interaction.user.id
            );
            followup(ctx, interaction, success_message(&role_name, &check)).await?;
            send_audit_entry(ctx, interaction, &config, role_id).await;
        }
        Err(err) if is_permission_error(&err) => {
            followup(
                ctx,
                interaction,
                "❌ The bot lacks permission to grant the role. Check the bot's permissions.",
            )
            .await?;
        }
        Err(err) => {
            warn!("Guild {}: role grant failed: {:?}", guild_key, err);
            followup(ctx, interaction, format!("❌ Something went wrong: {}", err)).await?;
        }
    }

    Ok(())
}

/// One audit embed per successful grant. An unresolvable or unwritable
/// log channel is skipped without failing the grant.
async fn send_audit_entry(
    ctx: &serenity::Context,
    interaction: &serenity::ComponentInteraction,
    config: &GuildConfig,
    role_id: u64,
) {
    let Some(log_channel_id) = config.log_channel_id else {
        return;
    };
    let Some(guild_id) = interaction.guild_id else {
        return;
    };

    let resolvable = {
        guild_id
            .to_guild_cached(&ctx.cache)
            .map(|guild| {
                guild
                    .channels
                    .contains_key(&serenity::ChannelId::new(log_channel_id))
            })
            .unwrap_or(false)
    };
    if !resolvable {
        debug!(
            "Guild {}: log channel {} not resolvable, skipping audit entry",
            guild_id, log_channel_id
        );
        return;
    }

    let embed = serenity::CreateEmbed::new()
        .title("✅ Verification log")
        .description(format!("<@{}> completed verification.", interaction.user.id))
        .field(
            "User",
            format!("{} ({})", interaction.user.tag(), interaction.user.id),
            true,
        )
        .field("Role", format!("<@&{}>", role_id), true)
        .field(
            "At",
            chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            true,
        )
        .color(colors::SUCCESS)
        .timestamp(serenity::Timestamp::now());

    if let Err(err) = serenity::ChannelId::new(log_channel_id)
        .send_message(&ctx.http, serenity::CreateMessage::new().embed(embed))
        .await
    {
        warn!(
            "Guild {}: failed to send audit entry to {}: {:?}",
            guild_id, log_channel_id, err
        );
    }
}

async fn ephemeral_reply(
    ctx: &serenity::Context,
    interaction: &serenity::ComponentInteraction,
    content: impl Into<String>,
) -> Result<(), Error> {
    interaction
        .create_response(
            &ctx.http,
            serenity::CreateInteractionResponse::Message(
                serenity::CreateInteractionResponseMessage::new()
                    .content(content.into())
                    .ephemeral(true),
            ),
        )
        .await?;
    Ok(())
}

async fn followup(
    ctx: &serenity::Context,
    interaction: &serenity::ComponentInteraction,
    content: impl Into<String>,
) -> Result<(), Error> {
    interaction
        .create_followup(
            &ctx.http,
            serenity::CreateInteractionResponseFollowup::new()
                .content(content.into())
                .ephemeral(true),
        )
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precheck_aborts_in_order() {
        let mut config = GuildConfig::default();
        assert_eq!(precheck(&config, true, &[]), Precheck::NotConfigured);

        config.verified_role_id = Some(42);
        assert_eq!(precheck(&config, false, &[]), Precheck::RoleMissing);
        assert_eq!(precheck(&config, true, &[42]), Precheck::AlreadyVerified);
        assert_eq!(precheck(&config, true, &[7]), Precheck::Grant { role_id: 42 });
    }

    #[test]
    fn repeated_clicks_by_verified_user_never_grant() {
        let mut config = GuildConfig::default();
        config.verified_role_id = Some(42);
        config.setup_complete = true;

        // First click grants, after which the member holds the role
        assert_eq!(precheck(&config, true, &[]), Precheck::Grant { role_id: 42 });
        let member_roles = vec![42];

        // Every further click stops before grant and audit
        for _ in 0..2 {
            assert_eq!(
                precheck(&config, true, &member_roles),
                Precheck::AlreadyVerified
            );
        }
    }

    #[test]
    fn precheck_reads_config_only() {
        let mut config = GuildConfig::default();
        config.verified_role_id = Some(42);
        let before = config.clone();
        let _ = precheck(&config, true, &[]);
        assert_eq!(config, before);
    }

    #[test]
    fn bot_check_is_two_small_integers() {
        let mut rng = rand::rng();
        for _ in 0..100 {
            let check = BotCheck::generate(&mut rng);
            assert!((1..=10).contains(&check.a));
            assert!((1..=10).contains(&check.b));
            assert_eq!(check.sum(), check.a + check.b);
        }
    }

    #[test]
    fn delay_is_within_the_advertised_window() {
        let mut rng = rand::rng();
        for _ in 0..100 {
            let delay = verification_delay(&mut rng);
            assert!(delay >= Duration::from_secs(1));
            assert!(delay <= Duration::from_secs(3));
        }
    }

    #[test]
    fn success_message_names_role_and_arithmetic() {
        let check = BotCheck { a: 3, b: 4 };
        let message = success_message("Member", &check);
        assert!(message.contains("Member"));
        assert!(message.contains("3 + 4 = 7"));
    }

    #[test]
    fn verify_custom_id_embeds_the_guild() {
        assert_eq!(verify_custom_id(123), "verify_123");
    }
}
