use serenity::all::Timestamp;
use serenity::builder::{CreateEmbed, CreateEmbedFooter};

use crate::audio::queue::LoopMode;
use crate::audio::session::QueueView;
use crate::sources::Song;

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 Quaver";

/// Embed de confirmación al encolar una canción.
pub fn create_track_added_embed(song: &Song, position: usize) -> CreateEmbed {
    CreateEmbed::default()
        .title("➕ Añadida a la cola")
        .description(format!("**{}**", song.title))
        .field("📍 Posición", position.to_string(), true)
        .url(&song.source)
        .color(colors::SUCCESS_GREEN)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Embed con el estado de la cola. La cabeza es la canción sonando.
pub fn create_queue_embed(view: &QueueView) -> CreateEmbed {
    const MAX_LINES: usize = 15;

    let description = if view.songs.is_empty() {
        "📭 La cola está vacía".to_string()
    } else {
        let mut lines: Vec<String> = view
            .songs
            .iter()
            .take(MAX_LINES)
            .enumerate()
            .map(|(i, song)| {
                if i == 0 {
                    format!("▶️ **{}**", song.title)
                } else {
                    format!("`{}.` {}", i + 1, song.title)
                }
            })
            .collect();

        if view.songs.len() > MAX_LINES {
            lines.push(format!("… y {} más", view.songs.len() - MAX_LINES));
        }
        lines.join("\n")
    };

    let loop_label = match view.loop_mode {
        LoopMode::Off => "➡️ off",
        LoopMode::Single => "🔂 single",
        LoopMode::All => "🔁 all",
    };

    CreateEmbed::default()
        .title("🎶 Cola de reproducción")
        .description(description)
        .field("🔁 Repetición", loop_label, true)
        .field("📊 Canciones", view.songs.len().to_string(), true)
        .color(colors::MUSIC_PURPLE)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}
