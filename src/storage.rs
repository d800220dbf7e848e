use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::MusicError;
use crate::sources::Song;

/// Playlist con nombre, persistida en JSON. Su ciclo de vida es
/// independiente de cualquier sesión: sobrevive al teardown y a reinicios.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Playlist {
    pub name: String,
    pub songs: Vec<Song>,
    pub updated_at: DateTime<Utc>,
}

/// Almacén de playlists basado en archivos JSON, un archivo por playlist
/// bajo `<data_dir>/playlists/`.
///
/// El mutex del caché serializa a los escritores: un read-modify-write
/// sobre el mismo nombre nunca pisa la actualización de otro escritor.
pub struct PlaylistStore {
    playlists_dir: PathBuf,
    cache: Mutex<HashMap<String, Playlist>>,
}

impl PlaylistStore {
    pub async fn new(data_dir: PathBuf) -> Result<Self> {
        let playlists_dir = data_dir.join("playlists");
        fs::create_dir_all(&playlists_dir)
            .await
            .with_context(|| format!("creando {}", playlists_dir.display()))?;

        info!("📁 Playlists en: {}", playlists_dir.display());

        let store = Self {
            playlists_dir,
            cache: Mutex::new(HashMap::new()),
        };
        store.load_all().await?;
        Ok(store)
    }

    /// Upsert: sobreescribe cualquier playlist existente con ese nombre.
    pub async fn save(&self, name: &str, songs: Vec<Song>) -> Result<()> {
        let mut cache = self.cache.lock().await;
        let playlist = Playlist {
            name: name.to_string(),
            songs,
            updated_at: Utc::now(),
        };
        self.persist(&playlist).await?;
        cache.insert(name.to_string(), playlist);
        info!("💾 Playlist '{}' guardada", name);
        Ok(())
    }

    pub async fn load(&self, name: &str) -> Result<Vec<Song>> {
        let cache = self.cache.lock().await;
        cache
            .get(name)
            .map(|p| p.songs.clone())
            .ok_or_else(|| MusicError::PlaylistNotFound(name.to_string()).into())
    }

    pub async fn list(&self) -> Vec<String> {
        let cache = self.cache.lock().await;
        let mut names: Vec<String> = cache.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn delete(&self, name: &str) -> Result<()> {
        let mut cache = self.cache.lock().await;
        if cache.remove(name).is_none() {
            return Err(MusicError::PlaylistNotFound(name.to_string()).into());
        }
        fs::remove_file(self.file_path(name))
            .await
            .with_context(|| format!("eliminando playlist '{name}'"))?;
        info!("🗑️ Playlist '{}' eliminada", name);
        Ok(())
    }

    /// Crea la playlist si no existe y añade la canción al final.
    /// Devuelve el tamaño resultante.
    pub async fn add_song(&self, name: &str, song: Song) -> Result<usize> {
        let mut cache = self.cache.lock().await;
        let playlist = cache.entry(name.to_string()).or_insert_with(|| Playlist {
            name: name.to_string(),
            songs: Vec::new(),
            updated_at: Utc::now(),
        });
        playlist.songs.push(song);
        playlist.updated_at = Utc::now();

        let snapshot = playlist.clone();
        self.persist(&snapshot).await?;
        Ok(snapshot.songs.len())
    }

    /// Elimina la **primera** entrada cuyo título coincide exactamente; ese
    /// es el contrato con títulos duplicados. Devuelve la canción eliminada.
    pub async fn remove_song(&self, name: &str, title: &str) -> Result<Song> {
        let mut cache = self.cache.lock().await;
        let playlist = cache
            .get_mut(name)
            .ok_or_else(|| MusicError::PlaylistNotFound(name.to_string()))?;

        let index = playlist
            .songs
            .iter()
            .position(|s| s.title == title)
            .ok_or_else(|| MusicError::SongNotFound(title.to_string()))?;
        let removed = playlist.songs.remove(index);
        playlist.updated_at = Utc::now();

        let snapshot = playlist.clone();
        self.persist(&snapshot).await?;
        Ok(removed)
    }

    // Métodos privados

    /// Escritura a temporal + rename: el JSON en disco siempre es válido,
    /// incluso si el proceso muere a mitad de escritura.
    async fn persist(&self, playlist: &Playlist) -> Result<()> {
        let path = self.file_path(&playlist.name);
        let content = serde_json::to_string_pretty(playlist)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, content)
            .await
            .with_context(|| format!("escribiendo {}", tmp.display()))?;
        fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("renombrando {}", path.display()))?;
        Ok(())
    }

    async fn load_all(&self) -> Result<()> {
        let mut cache = self.cache.lock().await;
        let mut entries = fs::read_dir(&self.playlists_dir).await?;
        let mut loaded = 0usize;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !path.extension().is_some_and(|ext| ext == "json") {
                continue;
            }
            match fs::read_to_string(&path).await {
                Ok(content) => match serde_json::from_str::<Playlist>(&content) {
                    Ok(playlist) => {
                        cache.insert(playlist.name.clone(), playlist);
                        loaded += 1;
                    }
                    Err(e) => warn!("Playlist corrupta en {}: {}", path.display(), e),
                },
                Err(e) => warn!("No se pudo leer {}: {}", path.display(), e),
            }
        }

        if loaded > 0 {
            info!("📂 Cargadas {} playlists", loaded);
        }
        Ok(())
    }

    fn file_path(&self, name: &str) -> PathBuf {
        self.playlists_dir
            .join(format!("{}.json", urlencoding::encode(name)))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    use super::*;

    fn song(title: &str) -> Song {
        Song::new(title, format!("https://example.com/{title}"))
    }

    #[tokio::test]
    async fn test_save_load_roundtrip() {
        let dir = tempdir().unwrap();
        let store = PlaylistStore::new(dir.path().to_path_buf()).await.unwrap();

        store
            .save("mix", vec![song("A"), song("B")])
            .await
            .unwrap();

        let songs = store.load("mix").await.unwrap();
        assert_eq!(
            songs.iter().map(|s| &s.title).collect::<Vec<_>>(),
            vec!["A", "B"]
        );
    }

    #[tokio::test]
    async fn test_survives_restart() {
        let dir = tempdir().unwrap();
        {
            let store = PlaylistStore::new(dir.path().to_path_buf()).await.unwrap();
            store
                .save("fiesta latina", vec![song("A"), song("B")])
                .await
                .unwrap();
        }

        // un almacén nuevo sobre el mismo directorio ve lo persistido
        let store = PlaylistStore::new(dir.path().to_path_buf()).await.unwrap();
        assert_eq!(store.list().await, vec!["fiesta latina"]);
        let songs = store.load("fiesta latina").await.unwrap();
        assert_eq!(songs.len(), 2);
        assert_eq!(songs[0].title, "A");
    }

    #[tokio::test]
    async fn test_save_overwrites_existing() {
        let dir = tempdir().unwrap();
        let store = PlaylistStore::new(dir.path().to_path_buf()).await.unwrap();

        store.save("mix", vec![song("A")]).await.unwrap();
        store.save("mix", vec![song("B"), song("C")]).await.unwrap();

        let songs = store.load("mix").await.unwrap();
        assert_eq!(
            songs.iter().map(|s| &s.title).collect::<Vec<_>>(),
            vec!["B", "C"]
        );
        assert_eq!(store.list().await.len(), 1);
    }

    #[tokio::test]
    async fn test_load_missing_playlist_fails() {
        let dir = tempdir().unwrap();
        let store = PlaylistStore::new(dir.path().to_path_buf()).await.unwrap();

        let err = store.load("nada").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MusicError>(),
            Some(MusicError::PlaylistNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_missing_playlist_fails() {
        let dir = tempdir().unwrap();
        let store = PlaylistStore::new(dir.path().to_path_buf()).await.unwrap();

        let err = store.delete("nada").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MusicError>(),
            Some(MusicError::PlaylistNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_add_song_creates_playlist() {
        let dir = tempdir().unwrap();
        let store = PlaylistStore::new(dir.path().to_path_buf()).await.unwrap();

        let len = store.add_song("nueva", song("A")).await.unwrap();
        assert_eq!(len, 1);
        let len = store.add_song("nueva", song("B")).await.unwrap();
        assert_eq!(len, 2);

        let songs = store.load("nueva").await.unwrap();
        assert_eq!(
            songs.iter().map(|s| &s.title).collect::<Vec<_>>(),
            vec!["A", "B"]
        );
    }

    #[tokio::test]
    async fn test_remove_song_takes_first_title_match() {
        let dir = tempdir().unwrap();
        let store = PlaylistStore::new(dir.path().to_path_buf()).await.unwrap();

        store
            .save(
                "mix",
                vec![
                    Song::new("A", "https://example.com/1"),
                    Song::new("B", "https://example.com/2"),
                    Song::new("A", "https://example.com/3"),
                ],
            )
            .await
            .unwrap();

        let removed = store.remove_song("mix", "A").await.unwrap();
        assert_eq!(removed.source, "https://example.com/1");

        let songs = store.load("mix").await.unwrap();
        assert_eq!(
            songs.iter().map(|s| s.source.as_str()).collect::<Vec<_>>(),
            vec!["https://example.com/2", "https://example.com/3"]
        );
    }

    #[tokio::test]
    async fn test_remove_song_errors() {
        let dir = tempdir().unwrap();
        let store = PlaylistStore::new(dir.path().to_path_buf()).await.unwrap();

        let err = store.remove_song("nada", "A").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MusicError>(),
            Some(MusicError::PlaylistNotFound(_))
        ));

        store.save("mix", vec![song("A")]).await.unwrap();
        let err = store.remove_song("mix", "Z").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MusicError>(),
            Some(MusicError::SongNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_names_with_special_characters() {
        let dir = tempdir().unwrap();
        let store = PlaylistStore::new(dir.path().to_path_buf()).await.unwrap();

        let name = "lo-fi / çhill ~ 2024";
        store.save(name, vec![song("A")]).await.unwrap();

        let store = PlaylistStore::new(dir.path().to_path_buf()).await.unwrap();
        assert_eq!(store.list().await, vec![name.to_string()]);
        assert_eq!(store.load(name).await.unwrap().len(), 1);
    }
}
