use anyhow::Result;
use serenity::{
    builder::{
        CreateEmbed, CreateInteractionResponse, CreateInteractionResponseMessage,
        EditInteractionResponse,
    },
    model::{
        application::{CommandDataOption, CommandDataOptionValue, CommandInteraction},
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use tracing::info;

use crate::{
    audio::queue::LoopMode,
    bot::MusicBot,
    sources::Song,
    ui::embeds,
};

/// Resultado de una petición de reproducción, venga de donde venga
/// (slash command o texto plano en un canal de autoplay).
pub enum PlayOutcome {
    Added { song: Song, position: usize },
    Refused(String),
}

/// Maneja comandos slash
pub async fn handle_command(
    ctx: &Context,
    command: CommandInteraction,
    bot: &MusicBot,
) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Comando usado fuera de un servidor"))?;

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    match command.data.name.as_str() {
        "play" => handle_play(ctx, command, bot).await?,
        "skip" => handle_skip(ctx, command, bot).await?,
        "stop" => handle_stop(ctx, command, bot).await?,
        "pause" => handle_pause(ctx, command, bot).await?,
        "resume" => handle_resume(ctx, command, bot).await?,
        "queue" => handle_queue(ctx, command, bot).await?,
        "loop" => handle_loop(ctx, command, bot).await?,
        "playlist" => handle_playlist(ctx, command, bot).await?,
        "autoplay" => handle_autoplay(ctx, command, bot).await?,
        _ => respond_text(ctx, &command, "❌ Comando no reconocido").await?,
    }

    Ok(())
}

/// Camino único de reproducción: resuelve la petición a una canción y la
/// encola en la sesión de la guild, creándola (y conectando) si hace falta.
pub async fn play_request(
    ctx: &Context,
    bot: &MusicBot,
    guild_id: GuildId,
    user_id: UserId,
    text_channel: ChannelId,
    query: &str,
) -> Result<PlayOutcome> {
    let Some(voice_channel) = user_voice_channel(ctx, guild_id, user_id) else {
        return Ok(PlayOutcome::Refused(
            "❌ Debes estar en un canal de voz".to_string(),
        ));
    };

    let resolved =
        tokio::time::timeout(bot.config.stream_timeout(), bot.resolver.resolve(query)).await;
    let song = match resolved {
        Ok(Ok(song)) => song,
        Ok(Err(e)) => return Ok(PlayOutcome::Refused(format!("❌ {e}"))),
        Err(_) => {
            return Ok(PlayOutcome::Refused(
                "❌ La búsqueda tardó demasiado".to_string(),
            ))
        }
    };

    let sessions = bot.sessions(ctx).await?;
    let session = sessions.get_or_create(guild_id);
    match session.enqueue(song.clone(), voice_channel, text_channel).await {
        Ok(position) => Ok(PlayOutcome::Added { song, position }),
        Err(e) => Ok(PlayOutcome::Refused(format!("❌ {e}"))),
    }
}

// Handlers específicos para cada comando

async fn handle_play(ctx: &Context, command: CommandInteraction, bot: &MusicBot) -> Result<()> {
    let guild_id = command.guild_id.unwrap();
    let query = str_option(&command.data.options, "query")
        .ok_or_else(|| anyhow::anyhow!("Query no proporcionado"))?
        .to_string();

    // Defer: la resolución puede tardar
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let outcome = play_request(
        ctx,
        bot,
        guild_id,
        command.user.id,
        command.channel_id,
        &query,
    )
    .await?;

    let response = match outcome {
        PlayOutcome::Added { song, position } => {
            EditInteractionResponse::new().embed(embeds::create_track_added_embed(&song, position))
        }
        PlayOutcome::Refused(reply) => EditInteractionResponse::new().content(reply),
    };
    command.edit_response(&ctx.http, response).await?;

    Ok(())
}

async fn handle_skip(ctx: &Context, command: CommandInteraction, bot: &MusicBot) -> Result<()> {
    let guild_id = command.guild_id.unwrap();

    let reply = match bot.sessions(ctx).await?.get(guild_id) {
        Some(session) => match session.skip().await {
            Ok(song) => format!("⏭️ Saltada: **{}**", song.title),
            Err(e) => format!("❌ {e}"),
        },
        None => "❌ No estoy conectado a un canal de voz".to_string(),
    };

    respond_text(ctx, &command, &reply).await
}

async fn handle_stop(ctx: &Context, command: CommandInteraction, bot: &MusicBot) -> Result<()> {
    let guild_id = command.guild_id.unwrap();

    let reply = match bot.sessions(ctx).await?.get(guild_id) {
        Some(session) => {
            session.stop().await;
            "⏹️ Reproducción detenida y cola vacía".to_string()
        }
        None => "❌ No estoy conectado a un canal de voz".to_string(),
    };

    respond_text(ctx, &command, &reply).await
}

async fn handle_pause(ctx: &Context, command: CommandInteraction, bot: &MusicBot) -> Result<()> {
    let guild_id = command.guild_id.unwrap();

    let reply = match bot.sessions(ctx).await?.get(guild_id) {
        Some(session) => match session.pause().await {
            Ok(()) => "⏸️ Reproducción pausada".to_string(),
            Err(e) => format!("❌ {e}"),
        },
        None => "❌ No estoy conectado a un canal de voz".to_string(),
    };

    respond_text(ctx, &command, &reply).await
}

async fn handle_resume(ctx: &Context, command: CommandInteraction, bot: &MusicBot) -> Result<()> {
    let guild_id = command.guild_id.unwrap();

    let reply = match bot.sessions(ctx).await?.get(guild_id) {
        Some(session) => match session.resume().await {
            Ok(()) => "▶️ Reproducción reanudada".to_string(),
            Err(e) => format!("❌ {e}"),
        },
        None => "❌ No estoy conectado a un canal de voz".to_string(),
    };

    respond_text(ctx, &command, &reply).await
}

async fn handle_queue(ctx: &Context, command: CommandInteraction, bot: &MusicBot) -> Result<()> {
    let guild_id = command.guild_id.unwrap();

    match bot.sessions(ctx).await?.get(guild_id) {
        Some(session) => {
            let view = session.queue_view().await;
            respond_embed(ctx, &command, embeds::create_queue_embed(&view)).await
        }
        None => respond_text(ctx, &command, "📭 La cola está vacía").await,
    }
}

async fn handle_loop(ctx: &Context, command: CommandInteraction, bot: &MusicBot) -> Result<()> {
    let guild_id = command.guild_id.unwrap();
    let mode_arg = str_option(&command.data.options, "mode").unwrap_or("off");

    let mode: LoopMode = match mode_arg.parse() {
        Ok(mode) => mode,
        Err(e) => return respond_text(ctx, &command, &format!("❌ {e}")).await,
    };

    let reply = match bot.sessions(ctx).await?.get(guild_id) {
        Some(session) => {
            session.set_loop_mode(mode).await;
            match mode {
                LoopMode::Off => "➡️ Repetición desactivada".to_string(),
                LoopMode::Single => "🔂 Repitiendo la canción actual".to_string(),
                LoopMode::All => "🔁 Repitiendo la cola completa".to_string(),
            }
        }
        None => "❌ No estoy conectado a un canal de voz".to_string(),
    };

    respond_text(ctx, &command, &reply).await
}

async fn handle_playlist(ctx: &Context, command: CommandInteraction, bot: &MusicBot) -> Result<()> {
    let guild_id = command.guild_id.unwrap();

    let Some((subcommand, options)) = subcommand(&command.data.options) else {
        return respond_text(ctx, &command, "❌ Subcomando no reconocido").await;
    };

    match subcommand {
        "save" => {
            let name = str_option(options, "name").unwrap_or_default().to_string();
            let reply = match bot.sessions(ctx).await?.get(guild_id) {
                Some(session) => {
                    let songs = session.queue_view().await.songs;
                    if songs.is_empty() {
                        "📭 La cola está vacía".to_string()
                    } else {
                        let count = songs.len();
                        match bot.store.save(&name, songs).await {
                            Ok(()) => {
                                format!("💾 Playlist '{name}' guardada ({count} canciones)")
                            }
                            Err(e) => format!("❌ {e}"),
                        }
                    }
                }
                None => "📭 La cola está vacía".to_string(),
            };
            respond_text(ctx, &command, &reply).await
        }
        "load" => {
            let name = str_option(options, "name").unwrap_or_default().to_string();

            command
                .create_response(
                    &ctx.http,
                    CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
                )
                .await?;

            let reply = load_playlist(ctx, bot, guild_id, command.user.id, command.channel_id, &name)
                .await?;
            command
                .edit_response(&ctx.http, EditInteractionResponse::new().content(reply))
                .await?;
            Ok(())
        }
        "list" => {
            let names = bot.store.list().await;
            let reply = if names.is_empty() {
                "📭 No hay playlists guardadas".to_string()
            } else {
                format!("📚 Playlists: {}", names.join(", "))
            };
            respond_text(ctx, &command, &reply).await
        }
        "delete" => {
            let name = str_option(options, "name").unwrap_or_default().to_string();
            let reply = match bot.store.delete(&name).await {
                Ok(()) => format!("🗑️ Playlist '{name}' eliminada"),
                Err(e) => format!("❌ {e}"),
            };
            respond_text(ctx, &command, &reply).await
        }
        "add" => {
            let name = str_option(options, "name").unwrap_or_default().to_string();
            let query = str_option(options, "query").unwrap_or_default().to_string();

            command
                .create_response(
                    &ctx.http,
                    CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
                )
                .await?;

            let resolved = tokio::time::timeout(
                bot.config.stream_timeout(),
                bot.resolver.resolve(&query),
            )
            .await;
            let reply = match resolved {
                Ok(Ok(song)) => match bot.store.add_song(&name, song.clone()).await {
                    Ok(len) => {
                        format!("➕ **{}** añadida a '{name}' ({len} canciones)", song.title)
                    }
                    Err(e) => format!("❌ {e}"),
                },
                Ok(Err(e)) => format!("❌ {e}"),
                Err(_) => "❌ La búsqueda tardó demasiado".to_string(),
            };
            command
                .edit_response(&ctx.http, EditInteractionResponse::new().content(reply))
                .await?;
            Ok(())
        }
        "remove" => {
            let name = str_option(options, "name").unwrap_or_default().to_string();
            let title = str_option(options, "title").unwrap_or_default().to_string();
            let reply = match bot.store.remove_song(&name, &title).await {
                Ok(song) => format!("➖ **{}** eliminada de '{name}'", song.title),
                Err(e) => format!("❌ {e}"),
            };
            respond_text(ctx, &command, &reply).await
        }
        _ => respond_text(ctx, &command, "❌ Subcomando no reconocido").await,
    }
}

async fn handle_autoplay(ctx: &Context, command: CommandInteraction, bot: &MusicBot) -> Result<()> {
    let guild_id = command.guild_id.unwrap();
    let action = str_option(&command.data.options, "action").unwrap_or("on");

    if !bot.config.enable_autoplay {
        return respond_text(ctx, &command, "❌ El autoplay está desactivado en este bot").await;
    }

    let reply = match action {
        "on" => {
            bot.autoplay.bind(guild_id, command.channel_id);
            "📻 Autoplay activado: el texto plano de este canal se reproduce".to_string()
        }
        _ => {
            if bot.autoplay.unbind(guild_id) {
                "📴 Autoplay desactivado".to_string()
            } else {
                "❌ El autoplay no estaba activado en esta guild".to_string()
            }
        }
    };

    respond_text(ctx, &command, &reply).await
}

// Funciones auxiliares

async fn load_playlist(
    ctx: &Context,
    bot: &MusicBot,
    guild_id: GuildId,
    user_id: UserId,
    text_channel: ChannelId,
    name: &str,
) -> Result<String> {
    let songs = match bot.store.load(name).await {
        Ok(songs) => songs,
        Err(e) => return Ok(format!("❌ {e}")),
    };
    if songs.is_empty() {
        return Ok(format!("📭 La playlist '{name}' está vacía"));
    }

    let Some(voice_channel) = user_voice_channel(ctx, guild_id, user_id) else {
        return Ok("❌ Debes estar en un canal de voz".to_string());
    };

    let count = songs.len();
    let sessions = bot.sessions(ctx).await?;
    let session = sessions.get_or_create(guild_id);
    match session.enqueue_all(songs, voice_channel, text_channel).await {
        Ok(_) => Ok(format!("📂 {count} canciones de '{name}' añadidas a la cola")),
        Err(e) => Ok(format!("❌ {e}")),
    }
}

fn user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = ctx.cache.guild(guild_id)?;
    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
}

fn str_option<'a>(options: &'a [CommandDataOption], name: &str) -> Option<&'a str> {
    options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_str())
}

fn subcommand(options: &[CommandDataOption]) -> Option<(&str, &[CommandDataOption])> {
    options.first().and_then(|opt| match &opt.value {
        CommandDataOptionValue::SubCommand(sub) => Some((opt.name.as_str(), sub.as_slice())),
        _ => None,
    })
}

async fn respond_text(ctx: &Context, command: &CommandInteraction, content: &str) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new().content(content),
            ),
        )
        .await?;
    Ok(())
}

async fn respond_embed(ctx: &Context, command: &CommandInteraction, embed: CreateEmbed) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new().embed(embed),
            ),
        )
        .await?;
    Ok(())
}
