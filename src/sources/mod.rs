pub mod ytdlp;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::MusicError;

pub use ytdlp::YtDlpResolver;

/// Una canción resoluble: título para mostrar y referencia opaca a la fuente.
///
/// `source` es lo que el transporte sabe abrir (normalmente una URL).
/// Inmutable una vez construida; es el único dato que viaja entre la cola,
/// el almacenamiento de playlists y el motor de reproducción.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Song {
    pub title: String,
    pub source: String,
}

impl Song {
    pub fn new(title: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            source: source.into(),
        }
    }
}

impl std::fmt::Display for Song {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.title)
    }
}

/// Resolutor externo: convierte texto libre o una URL en una [`Song`].
///
/// La resolución ocurre al encolar; abrir el stream es trabajo del
/// transporte. Implementaciones reales hablan con yt-dlp; los tests usan
/// resolutores de mentira.
#[async_trait]
pub trait SongResolver: Send + Sync {
    async fn resolve(&self, query: &str) -> Result<Song, MusicError>;
}
