use thiserror::Error;

/// Errores del núcleo de reproducción.
///
/// El `Display` de cada variante es directamente el texto que ve el usuario,
/// así los handlers responden con una sola línea sin traducir nada.
#[derive(Debug, Error)]
pub enum MusicError {
    /// La búsqueda o la URL no produjeron una canción reproducible.
    #[error("No se pudo resolver la canción: {0}")]
    ResolutionFailed(String),

    /// No se pudo establecer la conexión de voz al crear la sesión.
    #[error("No se pudo conectar al canal de voz")]
    ConnectionFailed,

    /// El stream de audio falló a mitad de reproducción.
    #[error("El stream de audio falló: {0}")]
    StreamFailed(String),

    #[error("Playlist no encontrada: {0}")]
    PlaylistNotFound(String),

    #[error("Canción no encontrada: {0}")]
    SongNotFound(String),

    #[error("Modo de repetición inválido: {0} (usa off, single o all)")]
    InvalidLoopMode(String),

    /// Operación que requiere una sesión activa sobre una guild sin sesión.
    #[error("No estoy conectado a un canal de voz")]
    NotConnected,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_facing_messages() {
        assert_eq!(
            MusicError::NotConnected.to_string(),
            "No estoy conectado a un canal de voz"
        );
        assert!(MusicError::PlaylistNotFound("mix".into())
            .to_string()
            .contains("mix"));
        assert!(MusicError::InvalidLoopMode("bogus".into())
            .to_string()
            .contains("bogus"));
    }
}
