use std::fmt;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::signal::matrix::SampleMatrix;
use crate::signal::ViewerError;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    #[default]
    Standard,
    Xor,
    Polar,
    Recurrence,
}

impl ViewMode {
    pub const ALL: [ViewMode; 4] = [
        ViewMode::Standard,
        ViewMode::Xor,
        ViewMode::Polar,
        ViewMode::Recurrence,
    ];

    /// Minimum number of active channels the mode needs.
    pub fn required_channels(self) -> usize {
        match self {
            ViewMode::Recurrence => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for ViewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ViewMode::Standard => "standard",
            ViewMode::Xor => "xor",
            ViewMode::Polar => "polar",
            ViewMode::Recurrence => "recurrence",
        };
        f.write_str(name)
    }
}

/// Active channels plus the per-mode selection drawn from them.
///
/// Standard shows every active channel, XOR and polar show the focus
/// channel, recurrence shows the pair. The selection is repaired on every
/// change so it always satisfies the current mode.
#[derive(Clone, Debug)]
pub struct ChannelSelectionModel {
    mode: ViewMode,
    ids: Vec<String>,
    active: Vec<bool>,
    focus: Option<usize>,
    pair: Option<(usize, usize)>,
}

impl ChannelSelectionModel {
    pub fn from_matrix(matrix: &SampleMatrix) -> Self {
        let mut model = Self {
            mode: ViewMode::Standard,
            ids: matrix.channels().iter().map(|c| c.id.clone()).collect(),
            active: matrix.channels().iter().map(|c| c.active).collect(),
            focus: None,
            pair: None,
        };
        model.repair();
        model
    }

    /// Rebinds to a new matrix with the same mode. Falls back to standard
    /// when the new matrix is too small for the current mode.
    pub fn rebind(&mut self, matrix: &SampleMatrix) {
        let mode = self.mode;
        *self = Self::from_matrix(matrix);
        if self.set_mode(mode).is_err() {
            warn!("{mode} view needs more channels, staying in standard view");
        }
    }

    pub fn mode(&self) -> ViewMode {
        self.mode
    }

    pub fn is_active(&self, index: usize) -> bool {
        self.active.get(index).copied().unwrap_or(false)
    }

    pub fn active_flags(&self) -> &[bool] {
        &self.active
    }

    pub fn active_count(&self) -> usize {
        self.active.iter().filter(|a| **a).count()
    }

    pub fn focus(&self) -> Option<usize> {
        self.focus
    }

    pub fn pair(&self) -> Option<(usize, usize)> {
        self.pair
    }

    /// Channel indices the current mode renders, in matrix order for standard.
    pub fn selected(&self) -> Vec<usize> {
        match self.mode {
            ViewMode::Standard => self.active_indices().collect(),
            ViewMode::Xor | ViewMode::Polar => self.focus.into_iter().collect(),
            ViewMode::Recurrence => self.pair.map(|(a, b)| vec![a, b]).unwrap_or_default(),
        }
    }

    fn active_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.active
            .iter()
            .enumerate()
            .filter(|(_, a)| **a)
            .map(|(i, _)| i)
    }

    fn index_of(&self, channel_id: &str) -> Result<usize, ViewerError> {
        let wanted = crate::signal::leads::normalize_name(channel_id);
        self.ids
            .iter()
            .position(|id| *id == wanted)
            .ok_or_else(|| ViewerError::Validation(format!("unknown channel {channel_id}")))
    }

    pub fn set_mode(&mut self, mode: ViewMode) -> Result<(), ViewerError> {
        if self.ids.len() < mode.required_channels() {
            return Err(ViewerError::Validation(format!(
                "{mode} view needs {} channels, data has {}",
                mode.required_channels(),
                self.ids.len()
            )));
        }
        if mode != self.mode {
            info!("view mode {} -> {mode}", self.mode);
        }
        self.mode = mode;
        self.repair();
        Ok(())
    }

    /// Switches a channel on or off. Refuses to drop below the number of
    /// channels the current mode needs; the prior state is kept on refusal.
    pub fn toggle(&mut self, channel_id: &str, active: bool) -> Result<(), ViewerError> {
        let index = self.index_of(channel_id)?;
        if !active && self.active[index] && self.active_count() <= self.mode.required_channels() {
            warn!("refusing to deactivate {channel_id}: last active channel for {} view", self.mode);
            return Err(ViewerError::Validation(format!(
                "at least {} channel(s) must stay active",
                self.mode.required_channels()
            )));
        }
        self.active[index] = active;
        debug!("channel {channel_id} active={active}");
        self.repair();
        Ok(())
    }

    /// Makes `channel_id` the XOR/polar channel, activating it if needed.
    pub fn set_focus(&mut self, channel_id: &str) -> Result<(), ViewerError> {
        let index = self.index_of(channel_id)?;
        self.active[index] = true;
        self.focus = Some(index);
        self.repair();
        Ok(())
    }

    /// Sets the recurrence pair, activating both channels.
    pub fn set_pair(&mut self, first: &str, second: &str) -> Result<(), ViewerError> {
        let a = self.index_of(first)?;
        let b = self.index_of(second)?;
        if a == b {
            return Err(ViewerError::validation("recurrence needs two different channels"));
        }
        self.active[a] = true;
        self.active[b] = true;
        self.pair = Some((a, b));
        self.repair();
        Ok(())
    }

    fn repair(&mut self) {
        let required = self.mode.required_channels();
        let mut missing = required.saturating_sub(self.active_count());
        for flag in self.active.iter_mut() {
            if missing == 0 {
                break;
            }
            if !*flag {
                *flag = true;
                missing -= 1;
            }
        }

        let first_active = self.active_indices().next();
        self.focus = match self.focus {
            Some(f) if self.is_active(f) => Some(f),
            _ => first_active,
        };
        self.pair = match self.pair {
            Some((a, b)) if a != b && self.is_active(a) && self.is_active(b) => Some((a, b)),
            _ => {
                let mut it = self.active_indices();
                match (it.next(), it.next()) {
                    (Some(a), Some(b)) => Some((a, b)),
                    _ => None,
                }
            }
        };
    }

    /// Pushes the active flags back into the matrix metadata.
    pub fn apply_to(&self, matrix: &mut SampleMatrix) {
        for (idx, active) in self.active.iter().enumerate() {
            matrix.set_active(idx, *active);
        }
    }
}
