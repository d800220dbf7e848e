use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuración de runtime cargada del entorno.
///
/// Las credenciales llegan siempre por variables de entorno (o `.env`),
/// nunca van embebidas en el código ni aparecen en los logs.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Paths
    pub data_dir: PathBuf,

    // Límites
    /// Tope para abrir el stream de una canción; al expirar se trata como
    /// fallo de resolución y la cola avanza.
    pub stream_timeout_secs: u64,

    // Features
    pub enable_autoplay: bool,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            // Discord
            discord_token: std::env::var("DISCORD_TOKEN")?,
            application_id: std::env::var("APPLICATION_ID")?.parse()?,
            guild_id: std::env::var("GUILD_ID").ok().and_then(|s| s.parse().ok()),

            // Paths
            data_dir: std::env::var("DATA_DIR")
                .unwrap_or_else(|_| "./data".to_string())
                .into(),

            // Límites
            stream_timeout_secs: std::env::var("STREAM_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()?,

            // Features
            enable_autoplay: std::env::var("ENABLE_AUTOPLAY")
                .unwrap_or_else(|_| "true".to_string())
                .parse()?,
        };

        std::fs::create_dir_all(&config.data_dir)?;

        config.validate()?;

        Ok(config)
    }

    pub fn stream_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_timeout_secs)
    }

    /// Sanity checks sobre los valores cargados.
    pub fn validate(&self) -> Result<()> {
        if self.stream_timeout_secs == 0 {
            anyhow::bail!("STREAM_TIMEOUT_SECS debe ser mayor que 0");
        }
        if self.stream_timeout_secs > 300 {
            anyhow::bail!(
                "STREAM_TIMEOUT_SECS demasiado alto ({}), máximo 300",
                self.stream_timeout_secs
            );
        }
        Ok(())
    }

    /// Resumen apto para logs: sin token.
    pub fn summary(&self) -> String {
        format!(
            "Config: app {} (guild: {}), datos en {}, timeout de stream {}s, autoplay={}",
            self.application_id,
            self.guild_id
                .map_or("global".to_string(), |id| id.to_string()),
            self.data_dir.display(),
            self.stream_timeout_secs,
            self.enable_autoplay
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            discord_token: String::new(),
            application_id: 0,
            guild_id: None,
            data_dir: "./data".into(),
            stream_timeout_secs: 30,
            enable_autoplay: true,
        }
    }
}
