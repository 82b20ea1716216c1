//! 4-deck mixer: sequencer decks feed the kinetic/pattern selectors, layer decks play back
//! independently as opacity-blended overlays.

use std::sync::Arc;

use choreo_frames::{FrameId, FramePool};

use crate::decision::{BlendMode, LayeredFrame};
use crate::error::EngineError;

pub const DECK_COUNT: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeckRole {
    Sequencer,
    Layer,
    Off,
}

pub struct Deck {
    pub role: DeckRole,
    pub opacity: f32,
    pub volume: f32,
    pool: Option<Arc<FramePool>>,
    frame_index: usize,
}

impl Deck {
    fn new(role: DeckRole) -> Self {
        Self { role, opacity: 1.0, volume: 1.0, pool: None, frame_index: 0 }
    }

    pub fn pool(&self) -> Option<&FramePool> {
        self.pool.as_deref()
    }

    fn advance_layer_frame(&mut self, reverse: bool) -> Option<FrameId> {
        let pool = self.pool.as_ref()?;
        if pool.is_empty() {
            return None;
        }
        let ids = pool.all_ids();
        let len = ids.len();
        let id = ids[self.frame_index % len];
        self.frame_index = if reverse {
            (self.frame_index + len - 1) % len
        } else {
            self.frame_index + 1
        };
        Some(id)
    }
}

/// Owns the four fixed decks: deck 0 defaults to `sequencer`, decks 1-3 default to `off`.
pub struct DeckMixer {
    decks: [Deck; DECK_COUNT],
    crossfader: f32,
    reverse: bool,
}

impl DeckMixer {
    pub fn new() -> Self {
        let decks = [
            Deck::new(DeckRole::Sequencer),
            Deck::new(DeckRole::Off),
            Deck::new(DeckRole::Off),
            Deck::new(DeckRole::Off),
        ];
        Self { decks, crossfader: 0.5, reverse: false }
    }

    pub fn set_reverse(&mut self, reverse: bool) {
        self.reverse = reverse;
    }

    /// Indices of decks currently holding a loaded pool, regardless of role.
    pub fn active_deck_ids(&self) -> Vec<usize> {
        self.decks
            .iter()
            .enumerate()
            .filter(|(_, deck)| deck.pool.is_some())
            .map(|(i, _)| i)
            .collect()
    }

    pub fn crossfader(&self) -> f32 {
        self.crossfader
    }

    pub fn set_crossfader(&mut self, value: f32) -> Result<(), EngineError> {
        if !(0.0..=1.0).contains(&value) {
            return Err(EngineError::InvalidParameter {
                name: "crossfader",
                value,
            });
        }
        self.crossfader = value;
        Ok(())
    }

    pub fn deck(&self, index: usize) -> Option<&Deck> {
        self.decks.get(index)
    }

    pub fn load_deck(&mut self, index: usize, pool: Arc<FramePool>) -> Result<(), EngineError> {
        let deck = self.decks.get_mut(index).ok_or(EngineError::InvalidDeckIndex(index))?;
        deck.pool = Some(pool);
        deck.frame_index = 0;
        Ok(())
    }

    pub fn set_deck_role(&mut self, index: usize, role: DeckRole) -> Result<(), EngineError> {
        let deck = self.decks.get_mut(index).ok_or(EngineError::InvalidDeckIndex(index))?;
        deck.role = role;
        Ok(())
    }

    pub fn set_deck_opacity(&mut self, index: usize, opacity: f32) -> Result<(), EngineError> {
        if !(0.0..=1.0).contains(&opacity) {
            return Err(EngineError::InvalidParameter { name: "deck_opacity", value: opacity });
        }
        let deck = self.decks.get_mut(index).ok_or(EngineError::InvalidDeckIndex(index))?;
        deck.opacity = opacity;
        Ok(())
    }

    /// Concatenates `selector`'s results across every deck whose role is `sequencer`.
    pub fn gather_frames<F>(&self, mut selector: F) -> Vec<FrameId>
    where
        F: FnMut(&FramePool) -> Option<FrameId>,
    {
        let mut out = Vec::new();
        for deck in &self.decks {
            if deck.role != DeckRole::Sequencer {
                continue;
            }
            if let Some(pool) = &deck.pool {
                if let Some(id) = selector(pool.as_ref()) {
                    out.push(id);
                }
            }
        }
        out
    }

    /// Advances every `layer` deck by one manual index step and returns its current frame.
    pub fn layered_frames(&mut self) -> Vec<LayeredFrame> {
        let mut out = Vec::new();
        for deck in &mut self.decks {
            if deck.role != DeckRole::Layer {
                continue;
            }
            if let Some(frame_id) = deck.advance_layer_frame(self.reverse) {
                out.push(LayeredFrame { frame_id, opacity: deck.opacity, blend_mode: BlendMode::Normal });
            }
        }
        out
    }

    pub fn reset(&mut self) {
        self.reverse = false;
        for deck in &mut self.decks {
            deck.frame_index = 0;
        }
    }
}

impl Default for DeckMixer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use choreo_frames::{Category, Direction, Energy, Frame, FrameType, Role};

    fn frame(id: u32) -> Frame {
        Frame {
            id: FrameId(id),
            image_handle: format!("f{id}"),
            energy: Energy::Mid,
            direction: Direction::Center,
            frame_type: FrameType::Body,
            role: Role::Base,
            pose: format!("pose{id}"),
            derived_from: None,
            weight: 1.0,
            preferred_transitions: Vec::new(),
            best_phases: Vec::new(),
        }
    }

    fn pool_with(count: u32) -> FramePool {
        let mut pool = FramePool::new(Category::Character);
        pool.load((0..count).map(frame).collect());
        pool
    }

    #[test]
    fn gather_frames_only_consults_sequencer_decks() {
        let mut mixer = DeckMixer::new();
        mixer.load_deck(0, Arc::new(pool_with(2))).unwrap();
        mixer.set_deck_role(1, DeckRole::Layer).unwrap();
        mixer.load_deck(1, Arc::new(pool_with(2))).unwrap();

        let picked = mixer.gather_frames(|pool| pool.all_ids().first().copied());
        assert_eq!(picked.len(), 1, "deck 1 is a layer deck and must not contribute");
    }

    #[test]
    fn layer_deck_advances_through_its_pool() {
        let mut mixer = DeckMixer::new();
        mixer.set_deck_role(1, DeckRole::Layer).unwrap();
        mixer.load_deck(1, Arc::new(pool_with(2))).unwrap();

        let first = mixer.layered_frames();
        let second = mixer.layered_frames();
        assert_ne!(first[0].frame_id, second[0].frame_id);
        let third = mixer.layered_frames();
        assert_eq!(first[0].frame_id, third[0].frame_id);
    }

    #[test]
    fn crossfader_rejects_out_of_range_values() {
        let mut mixer = DeckMixer::new();
        assert!(mixer.set_crossfader(1.5).is_err());
        assert!(mixer.set_crossfader(0.5).is_ok());
    }
}
