// Setup wizard: drives an administrator through the ordered configuration
// steps (embed content -> button content -> role selection -> log channel).
//
// The step logic is an explicit state machine (`transition`) over the
// guild's config record; the serenity handlers below only translate
// component/modal interactions into actions and render the result.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use poise::serenity_prelude as serenity;
use thiserror::Error;
use tracing::info;

use crate::models::guild::GuildConfig;
use crate::utils::config::{colors, parse_embed_color};
use crate::{Data, Error};

/// Inactivity window for the intro dialog. Later steps are long-lived
/// because a configuration session may span an unbounded amount of time.
const INTRO_TIMEOUT: Duration = Duration::from_secs(300);

/// Discord caps string select menus at 25 options.
const MAX_ROLE_CHOICES: usize = 25;

// --- State machine ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WizardState {
    Intro,
    EmbedStep,
    RoleStep,
    LogStep,
    Complete,
}

#[derive(Debug, Clone)]
pub enum WizardAction {
    Begin,
    SubmitEmbed {
        title: String,
        description: String,
        color: String,
    },
    SubmitButton {
        label: String,
        emoji: Option<String>,
    },
    AdvanceToRole,
    SelectRole(u64),
    AdvanceToLog,
    SkipLogging,
    /// Issued by the log-channel dialog handler only after the submitted
    /// id passed validation; completion is this explicit transition, not
    /// a side effect inside the validation code.
    ConfirmLogChannel(u64),
}

impl WizardAction {
    fn name(&self) -> &'static str {
        match self {
            WizardAction::Begin => "begin",
            WizardAction::SubmitEmbed { .. } => "submit_embed",
            WizardAction::SubmitButton { .. } => "submit_button",
            WizardAction::AdvanceToRole => "advance_to_role",
            WizardAction::SelectRole(_) => "select_role",
            WizardAction::AdvanceToLog => "advance_to_log",
            WizardAction::SkipLogging => "skip_logging",
            WizardAction::ConfirmLogChannel(_) => "confirm_log_channel",
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum WizardError {
    #[error("a role must be selected before continuing")]
    RoleNotSelected,
    #[error("action '{action}' is not valid in state {state:?}")]
    InvalidAction {
        state: WizardState,
        action: &'static str,
    },
}

/// Apply one wizard action. Mutates `config` where the step does; the
/// caller persists on success. Errors leave both state and config as
/// they were.
pub fn transition(
    state: WizardState,
    action: WizardAction,
    config: &mut GuildConfig,
) -> Result<WizardState, WizardError> {
    match (state, action) {
        (WizardState::Intro, WizardAction::Begin) => Ok(WizardState::EmbedStep),
        (
            WizardState::EmbedStep,
            WizardAction::SubmitEmbed {
                title,
                description,
                color,
            },
        ) => {
            config.embed_title = title;
            config.embed_description = description;
            config.embed_color = color;
            Ok(WizardState::EmbedStep)
        }
        (WizardState::EmbedStep, WizardAction::SubmitButton { label, emoji }) => {
            config.button_label = label;
            config.button_emoji = emoji;
            Ok(WizardState::EmbedStep)
        }
        (WizardState::EmbedStep, WizardAction::AdvanceToRole) => Ok(WizardState::RoleStep),
        (WizardState::RoleStep, WizardAction::SelectRole(role_id)) => {
            config.verified_role_id = Some(role_id);
            Ok(WizardState::RoleStep)
        }
        (WizardState::RoleStep, WizardAction::AdvanceToLog) => {
            if config.verified_role_id.is_none() {
                return Err(WizardError::RoleNotSelected);
            }
            Ok(WizardState::LogStep)
        }
        (WizardState::LogStep, WizardAction::SkipLogging) => {
            config.log_channel_id = None;
            config.setup_complete = true;
            Ok(WizardState::Complete)
        }
        (WizardState::LogStep, WizardAction::ConfirmLogChannel(channel_id)) => {
            config.log_channel_id = Some(channel_id);
            config.setup_complete = true;
            Ok(WizardState::Complete)
        }
        (state, action) => Err(WizardError::InvalidAction {
            state,
            action: action.name(),
        }),
    }
}

// --- Pure view helpers ---

/// Renderer-independent preview payload computed from a config.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbedPreview {
    pub title: String,
    pub description: String,
    pub color: u32,
}

pub fn embed_preview(config: &GuildConfig) -> EmbedPreview {
    EmbedPreview {
        title: config.embed_title.clone(),
        description: config.embed_description.clone(),
        color: parse_embed_color(&config.embed_color),
    }
}

#[derive(Debug, Clone)]
pub struct RoleChoice {
    pub id: u64,
    pub name: String,
    pub position: u16,
    pub managed: bool,
}

/// Roles offered in the role step: @everyone and platform-managed roles
/// are excluded, highest roles first, capped at the select-menu limit.
pub fn assignable_roles(mut roles: Vec<RoleChoice>, everyone_id: u64) -> Vec<RoleChoice> {
    roles.retain(|role| role.id != everyone_id && !role.managed);
    roles.sort_by(|a, b| b.position.cmp(&a.position).then_with(|| a.name.cmp(&b.name)));
    roles.truncate(MAX_ROLE_CHOICES);
    roles
}

/// Channel ids submitted through the log dialog must be 17-20 digits.
pub fn parse_channel_id(input: &str) -> Option<u64> {
    let trimmed = input.trim();
    if !(17..=20).contains(&trimmed.len()) {
        return None;
    }
    trimmed.parse().ok()
}

// --- Sessions ---

#[derive(Debug, Clone, Copy)]
pub struct WizardSession {
    pub state: WizardState,
    pub opened_at: Instant,
}

impl WizardSession {
    fn new(state: WizardState) -> Self {
        Self {
            state,
            opened_at: Instant::now(),
        }
    }

    /// Only the intro dialog expires; every later step is long-lived.
    pub fn intro_expired(&self) -> bool {
        self.state == WizardState::Intro && self.opened_at.elapsed() > INTRO_TIMEOUT
    }
}

/// Live wizard sessions, keyed by (guild id, administrator id).
#[derive(Default, Clone)]
pub struct WizardSessions {
    inner: Arc<DashMap<(u64, u64), WizardSession>>,
}

impl WizardSessions {
    pub fn open(&self, guild_id: u64, user_id: u64, state: WizardState) {
        self.inner
            .insert((guild_id, user_id), WizardSession::new(state));
    }

    /// The live session for this admin, discarding it if the intro
    /// window lapsed. Post-expiry actions must read as stale.
    pub fn active(&self, guild_id: u64, user_id: u64) -> Option<WizardSession> {
        let key = (guild_id, user_id);
        let session = *self.inner.get(&key)?;
        if session.intro_expired() {
            self.inner.remove(&key);
            return None;
        }
        Some(session)
    }

    pub fn set_state(&self, guild_id: u64, user_id: u64, state: WizardState) {
        if let Some(mut session) = self.inner.get_mut(&(guild_id, user_id)) {
            session.state = state;
        }
    }

    pub fn close(&self, guild_id: u64, user_id: u64) {
        self.inner.remove(&(guild_id, user_id));
    }
}

// --- Rendering ---

pub fn preview_embed(config: &GuildConfig) -> serenity::CreateEmbed {
    let preview = embed_preview(config);
    serenity::CreateEmbed::new()
        .title(preview.title)
        .description(preview.description)
        .color(preview.color)
}

pub fn intro_embed() -> serenity::CreateEmbed {
    serenity::CreateEmbed::new()
        .title("Welcome!")
        .description(
            "Thanks for using Nuvex. Press the button below to configure \
             the verification system for this server.\n\
             You can change everything later with `/settings`.",
        )
        .color(colors::INFO)
}

pub fn intro_components() -> Vec<serenity::CreateActionRow> {
    vec![serenity::CreateActionRow::Buttons(vec![
        serenity::CreateButton::new("setup_begin")
            .label("Begin")
            .style(serenity::ButtonStyle::Success)
            .emoji(serenity::ReactionType::Unicode("✅".to_string())),
    ])]
}

/// Embed step: live preview of the prompt plus a decorative (disabled)
/// copy of the verify button, and the edit/advance actions.
pub fn embed_step_components(config: &GuildConfig) -> Vec<serenity::CreateActionRow> {
    let mut preview_button = serenity::CreateButton::new("setup_preview_button")
        .label(config.button_label.clone())
        .style(serenity::ButtonStyle::Primary)
        .disabled(true);
    if let Some(emoji) = &config.button_emoji {
        preview_button = preview_button.emoji(serenity::ReactionType::Unicode(emoji.clone()));
    }

    vec![
        serenity::CreateActionRow::Buttons(vec![preview_button]),
        serenity::CreateActionRow::Buttons(vec![
            serenity::CreateButton::new("setup_edit_embed")
                .label("Edit embed")
                .style(serenity::ButtonStyle::Secondary),
            serenity::CreateButton::new("setup_edit_button")
                .label("Edit button")
                .style(serenity::ButtonStyle::Secondary),
            serenity::CreateButton::new("setup_next_role")
                .label("Next")
                .style(serenity::ButtonStyle::Success),
        ]),
    ]
}

fn role_step_embed() -> serenity::CreateEmbed {
    serenity::CreateEmbed::new()
        .title("Role selection")
        .description(
            "Pick the role to grant when a user verifies.\n\
             (The bot cannot grant roles placed above its own role.)",
        )
        .color(colors::INFO)
}

fn role_step_components(choices: &[RoleChoice]) -> Vec<serenity::CreateActionRow> {
    let options = if choices.is_empty() {
        vec![
            serenity::CreateSelectMenuOption::new("No roles available", "0")
                .description("Create a role in this server first"),
        ]
    } else {
        choices
            .iter()
            .map(|choice| {
                serenity::CreateSelectMenuOption::new(choice.name.clone(), choice.id.to_string())
                    .description(format!("ID: {}", choice.id))
            })
            .collect()
    };

    let menu = serenity::CreateSelectMenu::new(
        "setup_role_select",
        serenity::CreateSelectMenuKind::String { options },
    )
    .placeholder("Select a role...")
    .min_values(1)
    .max_values(1);

    vec![
        serenity::CreateActionRow::SelectMenu(menu),
        serenity::CreateActionRow::Buttons(vec![serenity::CreateButton::new("setup_role_next")
            .label("Next")
            .style(serenity::ButtonStyle::Success)]),
    ]
}

fn log_step_embed() -> serenity::CreateEmbed {
    serenity::CreateEmbed::new()
        .title("Log channel")
        .description("Last step! Set a channel for verification audit entries, or skip logging.")
        .color(colors::INFO)
}

fn log_step_components() -> Vec<serenity::CreateActionRow> {
    vec![serenity::CreateActionRow::Buttons(vec![
        serenity::CreateButton::new("setup_log_skip")
            .label("Skip logging")
            .style(serenity::ButtonStyle::Secondary),
        serenity::CreateButton::new("setup_log_set")
            .label("Set log channel")
            .style(serenity::ButtonStyle::Primary),
    ])]
}

fn completion_embed() -> serenity::CreateEmbed {
    serenity::CreateEmbed::new()
        .title("✅ Setup complete!")
        .description(
            "Setup is finished. Run `/deploy` in a channel of your choice \
             to publish the verification prompt.\n\n\
             💡 **Tips**\n\
             * `/settings` lets you change the embed, button, role and log channel later.",
        )
        .color(colors::SUCCESS)
}

fn embed_modal(config: &GuildConfig) -> serenity::CreateModal {
    serenity::CreateModal::new("setup_embed_modal", "Embed settings").components(vec![
        serenity::CreateActionRow::InputText(
            serenity::CreateInputText::new(
                serenity::InputTextStyle::Short,
                "Embed title",
                "embed_title",
            )
            .value(config.embed_title.clone())
            .max_length(256)
            .required(true),
        ),
        serenity::CreateActionRow::InputText(
            serenity::CreateInputText::new(
                serenity::InputTextStyle::Paragraph,
                "Embed description",
                "embed_description",
            )
            .value(config.embed_description.clone())
            .max_length(4000)
            .required(true),
        ),
        serenity::CreateActionRow::InputText(
            serenity::CreateInputText::new(
                serenity::InputTextStyle::Short,
                "Embed color (hex, without #)",
                "embed_color",
            )
            .value(config.embed_color.clone())
            .min_length(6)
            .max_length(6)
            .required(true),
        ),
    ])
}

fn button_modal(config: &GuildConfig) -> serenity::CreateModal {
    serenity::CreateModal::new("setup_button_modal", "Button settings").components(vec![
        serenity::CreateActionRow::InputText(
            serenity::CreateInputText::new(
                serenity::InputTextStyle::Short,
                "Button label",
                "button_label",
            )
            .value(config.button_label.clone())
            .max_length(80)
            .required(true),
        ),
        serenity::CreateActionRow::InputText(
            serenity::CreateInputText::new(
                serenity::InputTextStyle::Short,
                "Button emoji (optional)",
                "button_emoji",
            )
            .value(config.button_emoji.clone().unwrap_or_default())
            .max_length(2)
            .required(false),
        ),
    ])
}

fn log_channel_modal() -> serenity::CreateModal {
    serenity::CreateModal::new("setup_log_modal", "Log channel").components(vec![
        serenity::CreateActionRow::InputText(
            serenity::CreateInputText::new(
                serenity::InputTextStyle::Short,
                "Channel ID",
                "log_channel_id",
            )
            .placeholder("1234567890123456789")
            .min_length(17)
            .max_length(20)
            .required(true),
        ),
    ])
}

// --- Interaction handlers ---

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

async fn ephemeral_modal_reply(
    ctx: &serenity::Context,
    modal: &serenity::ModalInteraction,
    content: impl Into<String>,
) -> Result<(), Error> {
    modal
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

const STALE_SESSION: &str =
    "❌ This setup session is no longer active. Run `/setup` or `/settings` again.";

const STALE_VIEW: &str =
    "❌ That control belongs to an earlier step. Continue from the latest setup message.";

/// User-facing text for a refused wizard action. `InvalidAction` means
/// the control came from a superseded copy of a step message (e.g. a
/// second `/settings` view left behind after the session advanced), so
/// the admin is pointed at the current one; state and config are
/// untouched either way.
fn wizard_error_notice(err: &WizardError) -> &'static str {
    match err {
        WizardError::RoleNotSelected => "❌ Select a role first!",
        WizardError::InvalidAction { .. } => STALE_VIEW,
    }
}

fn modal_input<'a>(modal: &'a serenity::ModalInteraction, custom_id: &str) -> Option<&'a str> {
    for row in &modal.data.components {
        for component in &row.components {
            if let serenity::ActionRowComponent::InputText(input) = component {
                if input.custom_id == custom_id {
                    return input.value.as_deref();
                }
            }
        }
    }
    None
}

/// Handle wizard button/select interactions (custom ids prefixed `setup_`).
pub async fn handle_component(
    ctx: &serenity::Context,
    interaction: &serenity::ComponentInteraction,
    data: &Data,
) -> Result<(), Error> {
    let Some(guild_id) = interaction.guild_id else {
        return Ok(());
    };
    let user_id = interaction.user.id.get();
    let guild_key = guild_id.get().to_string();

    let Some(session) = data.wizard_sessions.active(guild_id.get(), user_id) else {
        return ephemeral_reply(ctx, interaction, STALE_SESSION).await;
    };

    match interaction.data.custom_id.as_str() {
        "setup_begin" => {
            let mut config = data.store.get_or_create(&guild_key)?;
            let next = match transition(session.state, WizardAction::Begin, &mut config) {
                Ok(next) => next,
                Err(err) => {
                    return ephemeral_reply(ctx, interaction, wizard_error_notice(&err)).await;
                }
            };
            data.wizard_sessions.set_state(guild_id.get(), user_id, next);

            interaction
                .create_response(
                    &ctx.http,
                    serenity::CreateInteractionResponse::UpdateMessage(
                        serenity::CreateInteractionResponseMessage::new()
                            .embed(preview_embed(&config))
                            .components(embed_step_components(&config)),
                    ),
                )
                .await?;
        }
        "setup_edit_embed" => {
            let config = data.store.get_or_create(&guild_key)?;
            interaction
                .create_response(
                    &ctx.http,
                    serenity::CreateInteractionResponse::Modal(embed_modal(&config)),
                )
                .await?;
        }
        "setup_edit_button" => {
            let config = data.store.get_or_create(&guild_key)?;
            interaction
                .create_response(
                    &ctx.http,
                    serenity::CreateInteractionResponse::Modal(button_modal(&config)),
                )
                .await?;
        }
        "setup_next_role" => {
            let mut config = data.store.get_or_create(&guild_key)?;
            let next = match transition(session.state, WizardAction::AdvanceToRole, &mut config) {
                Ok(next) => next,
                Err(err) => {
                    return ephemeral_reply(ctx, interaction, wizard_error_notice(&err)).await;
                }
            };
            data.wizard_sessions.set_state(guild_id.get(), user_id, next);

            // Collect role data before awaiting; cache refs are not Send
            let choices = {
                let roles: Vec<RoleChoice> = guild_id
                    .to_guild_cached(&ctx.cache)
                    .map(|guild| {
                        guild
                            .roles
                            .values()
                            .map(|role| RoleChoice {
                                id: role.id.get(),
                                name: role.name.clone(),
                                position: role.position,
                                managed: role.managed,
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                assignable_roles(roles, guild_id.get())
            };

            interaction
                .create_response(
                    &ctx.http,
                    serenity::CreateInteractionResponse::UpdateMessage(
                        serenity::CreateInteractionResponseMessage::new()
                            .embed(role_step_embed())
                            .components(role_step_components(&choices)),
                    ),
                )
                .await?;
        }
        "setup_role_select" => {
            let selected = match &interaction.data.kind {
                serenity::ComponentInteractionDataKind::StringSelect { values } => {
                    values.first().cloned()
                }
                _ => None,
            };
            let Some(value) = selected else {
                return ephemeral_reply(ctx, interaction, "❌ No role selected.").await;
            };
            if value == "0" {
                // Placeholder entry shown when the guild has no assignable roles
                return ephemeral_reply(
                    ctx,
                    interaction,
                    "❌ There are no assignable roles in this server. Create one first.",
                )
                .await;
            }
            let role_id: u64 = value.parse()?;

            let role_name = {
                guild_id
                    .to_guild_cached(&ctx.cache)
                    .and_then(|guild| guild.roles.get(&serenity::RoleId::new(role_id)).cloned())
                    .map(|role| role.name)
            };
            let Some(role_name) = role_name else {
                return ephemeral_reply(ctx, interaction, "❌ Role not found.").await;
            };

            // The selection persists immediately, independent of "Next"
            let mut config = data.store.get_or_create(&guild_key)?;
            let next =
                match transition(session.state, WizardAction::SelectRole(role_id), &mut config) {
                    Ok(next) => next,
                    Err(err) => {
                        return ephemeral_reply(ctx, interaction, wizard_error_notice(&err)).await;
                    }
                };
            data.store.put(&guild_key, config)?;
            data.wizard_sessions.set_state(guild_id.get(), user_id, next);
            info!("Guild {}: verification role set to {}", guild_key, role_id);

            ephemeral_reply(
                ctx,
                interaction,
                format!("✅ Verification role set to **{}**!", role_name),
            )
            .await?;
        }
        "setup_role_next" => {
            let mut config = data.store.get_or_create(&guild_key)?;
            match transition(session.state, WizardAction::AdvanceToLog, &mut config) {
                Ok(next) => {
                    data.wizard_sessions.set_state(guild_id.get(), user_id, next);
                    interaction
                        .create_response(
                            &ctx.http,
                            serenity::CreateInteractionResponse::UpdateMessage(
                                serenity::CreateInteractionResponseMessage::new()
                                    .embed(log_step_embed())
                                    .components(log_step_components()),
                            ),
                        )
                        .await?;
                }
                Err(err) => {
                    ephemeral_reply(ctx, interaction, wizard_error_notice(&err)).await?;
                }
            }
        }
        "setup_log_skip" => {
            let mut config = data.store.get_or_create(&guild_key)?;
            if let Err(err) = transition(session.state, WizardAction::SkipLogging, &mut config) {
                return ephemeral_reply(ctx, interaction, wizard_error_notice(&err)).await;
            }
            data.store.put(&guild_key, config)?;
            data.wizard_sessions.close(guild_id.get(), user_id);
            info!("Guild {}: setup complete (logging skipped)", guild_key);

            interaction
                .create_response(
                    &ctx.http,
                    serenity::CreateInteractionResponse::UpdateMessage(
                        serenity::CreateInteractionResponseMessage::new()
                            .embed(completion_embed())
                            .components(vec![]),
                    ),
                )
                .await?;
        }
        "setup_log_set" => {
            interaction
                .create_response(
                    &ctx.http,
                    serenity::CreateInteractionResponse::Modal(log_channel_modal()),
                )
                .await?;
        }
        _ => {}
    }

    Ok(())
}

/// Handle wizard modal submissions (custom ids prefixed `setup_`).
pub async fn handle_modal(
    ctx: &serenity::Context,
    modal: &serenity::ModalInteraction,
    data: &Data,
) -> Result<(), Error> {
    let Some(guild_id) = modal.guild_id else {
        return Ok(());
    };
    let user_id = modal.user.id.get();
    let guild_key = guild_id.get().to_string();

    let Some(session) = data.wizard_sessions.active(guild_id.get(), user_id) else {
        return ephemeral_modal_reply(ctx, modal, STALE_SESSION).await;
    };

    match modal.data.custom_id.as_str() {
        "setup_embed_modal" => {
            let title = modal_input(modal, "embed_title").unwrap_or_default().to_string();
            let description = modal_input(modal, "embed_description")
                .unwrap_or_default()
                .to_string();
            let color = modal_input(modal, "embed_color").unwrap_or_default().to_string();

            let mut config = data.store.get_or_create(&guild_key)?;
            let next = match transition(
                session.state,
                WizardAction::SubmitEmbed {
                    title,
                    description,
                    color,
                },
                &mut config,
            ) {
                Ok(next) => next,
                Err(err) => {
                    return ephemeral_modal_reply(ctx, modal, wizard_error_notice(&err)).await;
                }
            };
            data.store.put(&guild_key, config.clone())?;
            data.wizard_sessions.set_state(guild_id.get(), user_id, next);

            modal
                .create_response(
                    &ctx.http,
                    serenity::CreateInteractionResponse::UpdateMessage(
                        serenity::CreateInteractionResponseMessage::new()
                            .embed(preview_embed(&config))
                            .components(embed_step_components(&config)),
                    ),
                )
                .await?;
        }
        "setup_button_modal" => {
            let label = modal_input(modal, "button_label").unwrap_or_default().to_string();
            let emoji = modal_input(modal, "button_emoji")
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string);

            let mut config = data.store.get_or_create(&guild_key)?;
            let next = match transition(
                session.state,
                WizardAction::SubmitButton { label, emoji },
                &mut config,
            ) {
                Ok(next) => next,
                Err(err) => {
                    return ephemeral_modal_reply(ctx, modal, wizard_error_notice(&err)).await;
                }
            };
            data.store.put(&guild_key, config.clone())?;
            data.wizard_sessions.set_state(guild_id.get(), user_id, next);

            modal
                .create_response(
                    &ctx.http,
                    serenity::CreateInteractionResponse::UpdateMessage(
                        serenity::CreateInteractionResponseMessage::new()
                            .embed(preview_embed(&config))
                            .components(embed_step_components(&config)),
                    ),
                )
                .await?;
        }
        "setup_log_modal" => {
            let submitted = modal_input(modal, "log_channel_id").unwrap_or_default();
            let Some(channel_id) = parse_channel_id(submitted) else {
                // Validation failure: wizard stays on the log step
                return ephemeral_modal_reply(
                    ctx,
                    modal,
                    "❌ That does not look like a valid channel ID.",
                )
                .await;
            };

            let channel_kind = {
                guild_id.to_guild_cached(&ctx.cache).and_then(|guild| {
                    guild
                        .channels
                        .get(&serenity::ChannelId::new(channel_id))
                        .map(|channel| channel.kind)
                })
            };
            match channel_kind {
                None => {
                    return ephemeral_modal_reply(
                        ctx,
                        modal,
                        "❌ No channel with that ID exists in this server.",
                    )
                    .await;
                }
                Some(serenity::ChannelType::Text) => {}
                Some(_) => {
                    return ephemeral_modal_reply(ctx, modal, "❌ Please enter a text channel ID.")
                        .await;
                }
            }

            let mut config = data.store.get_or_create(&guild_key)?;
            if let Err(err) = transition(
                session.state,
                WizardAction::ConfirmLogChannel(channel_id),
                &mut config,
            ) {
                return ephemeral_modal_reply(ctx, modal, wizard_error_notice(&err)).await;
            }
            data.store.put(&guild_key, config)?;
            data.wizard_sessions.close(guild_id.get(), user_id);
            info!(
                "Guild {}: setup complete (log channel {})",
                guild_key, channel_id
            );

            modal
                .create_response(
                    &ctx.http,
                    serenity::CreateInteractionResponse::UpdateMessage(
                        serenity::CreateInteractionResponseMessage::new()
                            .embed(completion_embed())
                            .components(vec![]),
                    ),
                )
                .await?;
        }
        _ => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn role(id: u64, name: &str, position: u16, managed: bool) -> RoleChoice {
        RoleChoice {
            id,
            name: name.to_string(),
            position,
            managed,
        }
    }

    #[test]
    fn begin_moves_to_embed_step_without_mutation() {
        let mut config = GuildConfig::default();
        let next = transition(WizardState::Intro, WizardAction::Begin, &mut config).unwrap();
        assert_eq!(next, WizardState::EmbedStep);
        assert_eq!(config, GuildConfig::default());
    }

    #[test]
    fn edit_dialogs_do_not_advance_the_step() {
        let mut config = GuildConfig::default();
        let next = transition(
            WizardState::EmbedStep,
            WizardAction::SubmitEmbed {
                title: "Title".to_string(),
                description: "Desc".to_string(),
                color: "FF0000".to_string(),
            },
            &mut config,
        )
        .unwrap();
        assert_eq!(next, WizardState::EmbedStep);
        assert_eq!(config.embed_title, "Title");
        assert_eq!(embed_preview(&config).color, 0xff0000);

        let next = transition(
            WizardState::EmbedStep,
            WizardAction::SubmitButton {
                label: "Click me".to_string(),
                emoji: None,
            },
            &mut config,
        )
        .unwrap();
        assert_eq!(next, WizardState::EmbedStep);
        assert_eq!(config.button_label, "Click me");
        assert!(config.button_emoji.is_none());
    }

    #[test]
    fn invalid_embed_color_previews_with_fallback() {
        let mut config = GuildConfig::default();
        config.embed_color = "GGGGGG".to_string();
        assert_eq!(embed_preview(&config).color, colors::FALLBACK);
    }

    #[test]
    fn advancing_without_role_is_refused() {
        let mut config = GuildConfig::default();
        let err = transition(WizardState::RoleStep, WizardAction::AdvanceToLog, &mut config)
            .unwrap_err();
        assert_eq!(err, WizardError::RoleNotSelected);
        assert_eq!(wizard_error_notice(&err), "❌ Select a role first!");
        assert!(config.verified_role_id.is_none());
        assert!(!config.setup_complete);
    }

    #[test]
    fn role_selection_persists_independent_of_advancing() {
        let mut config = GuildConfig::default();
        let next = transition(
            WizardState::RoleStep,
            WizardAction::SelectRole(42),
            &mut config,
        )
        .unwrap();
        assert_eq!(next, WizardState::RoleStep);
        assert_eq!(config.verified_role_id, Some(42));
    }

    #[test]
    fn skip_logging_completes_setup() {
        let mut config = GuildConfig::default();
        config.verified_role_id = Some(42);
        let next = transition(WizardState::LogStep, WizardAction::SkipLogging, &mut config)
            .unwrap();
        assert_eq!(next, WizardState::Complete);
        assert!(config.setup_complete);
        assert!(config.log_channel_id.is_none());
    }

    #[test]
    fn confirming_log_channel_completes_setup() {
        let mut config = GuildConfig::default();
        config.verified_role_id = Some(42);
        let next = transition(
            WizardState::LogStep,
            WizardAction::ConfirmLogChannel(7),
            &mut config,
        )
        .unwrap();
        assert_eq!(next, WizardState::Complete);
        assert!(config.setup_complete);
        assert_eq!(config.log_channel_id, Some(7));
    }

    #[test]
    fn superseded_step_controls_get_a_stale_view_notice() {
        // Two live embed-step messages share one session; the admin
        // advances to the role step via one, then submits the embed
        // dialog opened from the other
        let mut config = GuildConfig::default();
        let mut state = transition(WizardState::Intro, WizardAction::Begin, &mut config).unwrap();
        state = transition(state, WizardAction::AdvanceToRole, &mut config).unwrap();
        let before = config.clone();

        let err = transition(
            state,
            WizardAction::SubmitEmbed {
                title: "Late".to_string(),
                description: "Late".to_string(),
                color: "123456".to_string(),
            },
            &mut config,
        )
        .unwrap_err();
        assert!(matches!(err, WizardError::InvalidAction { .. }));
        assert_eq!(config, before);
        assert_eq!(wizard_error_notice(&err), STALE_VIEW);

        // Double click on the intro button: the second Begin lands in
        // EmbedStep and reads as stale too
        let err =
            transition(WizardState::EmbedStep, WizardAction::Begin, &mut config).unwrap_err();
        assert_eq!(wizard_error_notice(&err), STALE_VIEW);
        assert_eq!(config, before);
    }

    #[test]
    fn out_of_order_actions_are_invalid() {
        let mut config = GuildConfig::default();
        let before = config.clone();
        let err = transition(WizardState::Intro, WizardAction::SkipLogging, &mut config)
            .unwrap_err();
        assert!(matches!(err, WizardError::InvalidAction { .. }));
        assert_eq!(config, before);
    }

    #[test]
    fn full_wizard_walk() {
        let mut config = GuildConfig::default();
        let mut state = WizardState::Intro;

        state = transition(state, WizardAction::Begin, &mut config).unwrap();
        state = transition(
            state,
            WizardAction::SubmitEmbed {
                title: "Title".to_string(),
                description: "Desc".to_string(),
                color: "FF0000".to_string(),
            },
            &mut config,
        )
        .unwrap();
        state = transition(state, WizardAction::AdvanceToRole, &mut config).unwrap();
        state = transition(state, WizardAction::SelectRole(42), &mut config).unwrap();
        state = transition(state, WizardAction::AdvanceToLog, &mut config).unwrap();
        state = transition(state, WizardAction::SkipLogging, &mut config).unwrap();

        assert_eq!(state, WizardState::Complete);
        assert!(config.setup_complete);
        assert_eq!(config.embed_title, "Title");
        assert_eq!(config.embed_description, "Desc");
        assert_eq!(config.verified_role_id, Some(42));
        assert!(config.log_channel_id.is_none());
    }

    #[test]
    fn assignable_roles_filters_and_caps() {
        let everyone = 100;
        let mut roles = vec![
            role(everyone, "@everyone", 0, false),
            role(1, "Bot Role", 5, true),
            role(2, "Member", 3, false),
            role(3, "Admin", 10, false),
        ];
        for i in 0..30 {
            roles.push(role(1000 + i, &format!("Filler {i}"), 1, false));
        }

        let choices = assignable_roles(roles, everyone);
        assert_eq!(choices.len(), 25);
        assert!(choices.iter().all(|c| c.id != everyone && c.id != 1));
        // Highest role first
        assert_eq!(choices[0].id, 3);
    }

    #[test]
    fn assignable_roles_can_be_empty() {
        let choices = assignable_roles(vec![role(100, "@everyone", 0, false)], 100);
        assert!(choices.is_empty());
    }

    #[test]
    fn channel_id_parsing_requires_plausible_snowflakes() {
        assert_eq!(parse_channel_id("1234567890123456789"), Some(1234567890123456789));
        assert_eq!(parse_channel_id(" 12345678901234567 "), Some(12345678901234567));
        assert_eq!(parse_channel_id("12345"), None);
        assert_eq!(parse_channel_id("123456789012345678901"), None);
        assert_eq!(parse_channel_id("not-a-channel-id!"), None);
    }

    #[test]
    fn only_the_intro_dialog_expires() {
        // checked_sub: the monotonic clock may not reach back far enough
        // right after boot
        let Some(stale) = Instant::now().checked_sub(INTRO_TIMEOUT + Duration::from_secs(1))
        else {
            return;
        };

        let intro = WizardSession {
            state: WizardState::Intro,
            opened_at: stale,
        };
        assert!(intro.intro_expired());

        let embed_step = WizardSession {
            state: WizardState::EmbedStep,
            opened_at: stale,
        };
        assert!(!embed_step.intro_expired());
    }

    #[test]
    fn expired_intro_session_is_discarded() {
        let sessions = WizardSessions::default();
        sessions.open(1, 2, WizardState::Intro);
        let Some(stale) = Instant::now().checked_sub(INTRO_TIMEOUT + Duration::from_secs(1))
        else {
            return;
        };
        {
            let mut session = sessions.inner.get_mut(&(1, 2)).unwrap();
            session.opened_at = stale;
        }
        assert!(sessions.active(1, 2).is_none());
        // Discarded for good, not just hidden
        assert!(sessions.inner.get(&(1, 2)).is_none());
    }
}
