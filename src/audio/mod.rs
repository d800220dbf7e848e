//! Núcleo de reproducción por guild.
//!
//! Cada guild es una unidad de concurrencia independiente: una
//! [`session::GuildSession`] con su cola y su máquina de estados, creada y
//! reclamada por el [`registry::SessionRegistry`]. El
//! [`engine::PlaybackEngine`] hace de puente con el transporte de voz a
//! través de los seams de [`transport`].

pub mod engine;
pub mod queue;
pub mod registry;
pub mod session;
pub mod transport;

pub use engine::PlaybackEngine;
pub use queue::{LoopMode, SongQueue};
pub use registry::SessionRegistry;
pub use session::{GuildSession, Notifier, PlaybackState, QueueView};
pub use transport::{SongbirdTransport, VoiceTransport};
