use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::audio::session::GuildSession;
use crate::audio::transport::{PlaybackOutcome, TrackEndCallback, VoiceConnection};
use crate::sources::Song;

/// Puente sin estado entre una sesión y el transporte de audio.
///
/// Cada petición "reproduce la cabeza" es una tarea propia que hace un único
/// viaje de ida y vuelta: abre el stream, registra el callback de fin
/// (exactamente uno por recurso) y entrega el player a la sesión. Todo fallo
/// desemboca en `on_playback_finished` con la misma generación, así la
/// sesión ve como mucho una transición por recurso.
pub struct PlaybackEngine {
    stream_timeout: Duration,
}

impl PlaybackEngine {
    pub fn new(stream_timeout: Duration) -> Self {
        Self { stream_timeout }
    }

    pub(crate) fn start(
        &self,
        session: Arc<GuildSession>,
        conn: Arc<dyn VoiceConnection>,
        song: Song,
        generation: u64,
        cancel: CancellationToken,
    ) {
        let stream_timeout = self.stream_timeout;

        tokio::spawn(async move {
            let callback_session = session.clone();
            let on_end: TrackEndCallback = Box::new(move |outcome| {
                let done: BoxFuture<'static, ()> = Box::pin(async move {
                    callback_session.on_playback_finished(generation, outcome).await;
                });
                done
            });

            // `biased`: una cancelación por skip/stop gana siempre a una
            // apertura que se resolvió en el mismo instante.
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("⏹️ Apertura de stream cancelada para '{}'", song.title);
                }
                started = tokio::time::timeout(stream_timeout, conn.play(&song, on_end)) => {
                    match started {
                        Ok(Ok(player)) => {
                            session.on_playback_started(generation, player).await;
                        }
                        Ok(Err(err)) => {
                            session
                                .on_playback_finished(
                                    generation,
                                    PlaybackOutcome::Failed(err.to_string()),
                                )
                                .await;
                        }
                        Err(_) => {
                            session
                                .on_playback_finished(
                                    generation,
                                    PlaybackOutcome::Failed(format!(
                                        "la apertura del stream superó {}s",
                                        stream_timeout.as_secs()
                                    )),
                                )
                                .await;
                        }
                    }
                }
            }
        });
    }
}
