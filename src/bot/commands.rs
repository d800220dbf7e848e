use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{application::CommandOptionType, id::GuildId},
    prelude::Context,
};

fn all_commands() -> Vec<CreateCommand> {
    vec![
        play_command(),
        skip_command(),
        stop_command(),
        pause_command(),
        resume_command(),
        queue_command(),
        loop_command(),
        playlist_command(),
        autoplay_command(),
    ]
}

/// Registra comandos globales
pub async fn register_global_commands(ctx: &Context) -> Result<()> {
    for command in all_commands() {
        ctx.http.create_global_command(&command).await?;
    }
    Ok(())
}

/// Registra comandos para una guild específica (desarrollo)
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id.set_commands(&ctx.http, all_commands()).await?;
    Ok(())
}

// Comandos de reproducción

fn play_command() -> CreateCommand {
    CreateCommand::new("play")
        .description("Reproduce una canción o la añade a la cola")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "query",
                "URL o término de búsqueda",
            )
            .required(true),
        )
}

fn skip_command() -> CreateCommand {
    CreateCommand::new("skip").description("Salta la canción actual")
}

fn stop_command() -> CreateCommand {
    CreateCommand::new("stop").description("Detiene la reproducción y vacía la cola")
}

fn pause_command() -> CreateCommand {
    CreateCommand::new("pause").description("Pausa la canción actual")
}

fn resume_command() -> CreateCommand {
    CreateCommand::new("resume").description("Reanuda la canción pausada")
}

fn queue_command() -> CreateCommand {
    CreateCommand::new("queue").description("Muestra la cola de reproducción")
}

fn loop_command() -> CreateCommand {
    CreateCommand::new("loop")
        .description("Configura el modo de repetición")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "mode", "off, single o all")
                .required(true)
                .add_string_choice("off", "off")
                .add_string_choice("single", "single")
                .add_string_choice("all", "all"),
        )
}

// Comandos de playlists

fn playlist_command() -> CreateCommand {
    CreateCommand::new("playlist")
        .description("Gestiona playlists guardadas")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::SubCommand,
                "save",
                "Guarda la cola actual como playlist",
            )
            .add_sub_option(
                CreateCommandOption::new(CommandOptionType::String, "name", "Nombre de la playlist")
                    .required(true),
            ),
        )
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::SubCommand,
                "load",
                "Añade una playlist guardada a la cola",
            )
            .add_sub_option(
                CreateCommandOption::new(CommandOptionType::String, "name", "Nombre de la playlist")
                    .required(true),
            ),
        )
        .add_option(CreateCommandOption::new(
            CommandOptionType::SubCommand,
            "list",
            "Lista las playlists guardadas",
        ))
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::SubCommand,
                "delete",
                "Elimina una playlist guardada",
            )
            .add_sub_option(
                CreateCommandOption::new(CommandOptionType::String, "name", "Nombre de la playlist")
                    .required(true),
            ),
        )
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::SubCommand,
                "add",
                "Añade una canción a una playlist",
            )
            .add_sub_option(
                CreateCommandOption::new(CommandOptionType::String, "name", "Nombre de la playlist")
                    .required(true),
            )
            .add_sub_option(
                CreateCommandOption::new(
                    CommandOptionType::String,
                    "query",
                    "URL o término de búsqueda",
                )
                .required(true),
            ),
        )
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::SubCommand,
                "remove",
                "Quita una canción de una playlist por título",
            )
            .add_sub_option(
                CreateCommandOption::new(CommandOptionType::String, "name", "Nombre de la playlist")
                    .required(true),
            )
            .add_sub_option(
                CreateCommandOption::new(CommandOptionType::String, "title", "Título exacto")
                    .required(true),
            ),
        )
}

// Autoplay

fn autoplay_command() -> CreateCommand {
    CreateCommand::new("autoplay")
        .description("Trata el texto plano de este canal como peticiones de reproducción")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "action", "on u off")
                .required(true)
                .add_string_choice("on", "on")
                .add_string_choice("off", "off"),
        )
}
