use async_process::Command;
use async_trait::async_trait;
use tracing::{debug, info, warn};
use url::Url;

use super::{Song, SongResolver};
use crate::error::MusicError;

/// Resolutor respaldado por yt-dlp.
///
/// URLs directas se aceptan tal cual (con una sonda de metadatos para el
/// título); texto libre pasa por `ytsearch1:`. No abre streams, solo
/// resuelve `query → Song`.
pub struct YtDlpResolver;

impl YtDlpResolver {
    pub fn new() -> Self {
        Self
    }

    /// Verifica que yt-dlp esté disponible en el sistema.
    pub async fn verify_dependencies() -> Result<(), MusicError> {
        let check = Command::new("yt-dlp").arg("--version").output().await;

        match check {
            Ok(output) if output.status.success() => {
                let version = String::from_utf8_lossy(&output.stdout);
                info!("✅ yt-dlp versión: {}", version.trim());
                Ok(())
            }
            _ => {
                warn!("❌ yt-dlp no encontrado. Instala con: pip install yt-dlp");
                Err(MusicError::ResolutionFailed("yt-dlp no disponible".into()))
            }
        }
    }

    fn is_url(query: &str) -> bool {
        Url::parse(query)
            .map(|u| matches!(u.scheme(), "http" | "https"))
            .unwrap_or(false)
    }

    /// Una línea `titulo<TAB>url` por resultado.
    async fn probe(&self, target: &str) -> Result<Song, MusicError> {
        let output = Command::new("yt-dlp")
            .arg("--no-playlist")
            .arg("--no-warnings")
            .arg("--skip-download")
            .arg("--print")
            .arg("%(title)s\t%(webpage_url)s")
            .arg(target)
            .output()
            .await
            .map_err(|e| MusicError::ResolutionFailed(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(MusicError::ResolutionFailed(
                stderr.lines().last().unwrap_or("yt-dlp falló").to_string(),
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let line = stdout
            .lines()
            .next()
            .ok_or_else(|| MusicError::ResolutionFailed("sin resultados".into()))?;

        match line.split_once('\t') {
            Some((title, url)) if !url.is_empty() => {
                debug!("🔎 Resuelto '{}' → {}", title, url);
                Ok(Song::new(title, url))
            }
            _ => Err(MusicError::ResolutionFailed("salida inesperada de yt-dlp".into())),
        }
    }
}

impl Default for YtDlpResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SongResolver for YtDlpResolver {
    async fn resolve(&self, query: &str) -> Result<Song, MusicError> {
        let target = if Self::is_url(query) {
            query.to_string()
        } else {
            format!("ytsearch1:{}", query)
        };

        self.probe(&target).await
    }
}
