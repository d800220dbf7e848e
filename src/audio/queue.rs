use std::collections::VecDeque;
use std::str::FromStr;

use crate::error::MusicError;
use crate::sources::Song;

/// Política aplicada a la cabeza de la cola cuando termina su reproducción.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopMode {
    #[default]
    Off,
    /// Repite la canción actual: la cabeza se conserva.
    Single,
    /// Repite la cola completa: la cabeza rota al final.
    All,
}

impl FromStr for LoopMode {
    type Err = MusicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" => Ok(LoopMode::Off),
            "single" => Ok(LoopMode::Single),
            "all" => Ok(LoopMode::All),
            other => Err(MusicError::InvalidLoopMode(other.to_string())),
        }
    }
}

impl std::fmt::Display for LoopMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoopMode::Off => write!(f, "off"),
            LoopMode::Single => write!(f, "single"),
            LoopMode::All => write!(f, "all"),
        }
    }
}

/// Cola FIFO de una guild. La cabeza es la canción en reproducción
/// (o a punto de reproducirse); solo ella puede estar sonando.
#[derive(Debug, Default)]
pub struct SongQueue {
    items: VecDeque<Song>,
}

impl SongQueue {
    pub fn new() -> Self {
        Self {
            items: VecDeque::new(),
        }
    }

    pub fn push(&mut self, song: Song) {
        self.items.push_back(song);
    }

    pub fn head(&self) -> Option<&Song> {
        self.items.front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Aplica la política de repetición a la cabeza recién terminada.
    ///
    /// `Single` la conserva, `All` la rota al final, `Off` la descarta.
    /// La nueva cabeza (si existe) es la siguiente canción a reproducir.
    pub fn advance(&mut self, mode: LoopMode) {
        match mode {
            LoopMode::Single => {}
            LoopMode::All => {
                if let Some(head) = self.items.pop_front() {
                    self.items.push_back(head);
                }
            }
            LoopMode::Off => {
                self.items.pop_front();
            }
        }
    }

    pub fn snapshot(&self) -> Vec<Song> {
        self.items.iter().cloned().collect()
    }
}

impl Extend<Song> for SongQueue {
    fn extend<T: IntoIterator<Item = Song>>(&mut self, iter: T) {
        self.items.extend(iter);
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn queue_of(titles: &[&str]) -> SongQueue {
        let mut q = SongQueue::new();
        for t in titles {
            q.push(Song::new(*t, format!("https://example.com/{t}")));
        }
        q
    }

    fn titles(q: &SongQueue) -> Vec<String> {
        q.snapshot().into_iter().map(|s| s.title).collect()
    }

    #[test]
    fn test_off_removes_head() {
        let mut q = queue_of(&["A", "B"]);
        q.advance(LoopMode::Off);
        assert_eq!(titles(&q), vec!["B"]);
        q.advance(LoopMode::Off);
        assert!(q.is_empty());
        // avanzar una cola vacía no hace nada
        q.advance(LoopMode::Off);
        assert!(q.is_empty());
    }

    #[test]
    fn test_single_keeps_head() {
        let mut q = queue_of(&["A", "B"]);
        q.advance(LoopMode::Single);
        assert_eq!(titles(&q), vec!["A", "B"]);
    }

    #[test]
    fn test_all_rotates_back_to_original_order() {
        let mut q = queue_of(&["A", "B"]);
        q.advance(LoopMode::All);
        assert_eq!(titles(&q), vec!["B", "A"]);
        q.advance(LoopMode::All);
        assert_eq!(titles(&q), vec!["A", "B"]);
    }

    #[test]
    fn test_length_invariants_per_mode() {
        for (mode, expected) in [
            (LoopMode::Single, 3),
            (LoopMode::All, 3),
            (LoopMode::Off, 2),
        ] {
            let mut q = queue_of(&["A", "B", "C"]);
            q.advance(mode);
            assert_eq!(q.len(), expected, "modo {mode}");
        }
    }

    #[test]
    fn test_loop_mode_parse() {
        assert_eq!("off".parse::<LoopMode>().unwrap(), LoopMode::Off);
        assert_eq!("Single".parse::<LoopMode>().unwrap(), LoopMode::Single);
        assert_eq!(" all ".parse::<LoopMode>().unwrap(), LoopMode::All);
        assert!(matches!(
            "bogus".parse::<LoopMode>(),
            Err(MusicError::InvalidLoopMode(_))
        ));
    }
}
