use quarry_common::RegionKey;
use quarry_render::RenderMode;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// One region to render into a staging file
#[derive(Debug, Clone, PartialEq)]
pub struct RenderJob {
    pub key: RegionKey,
    /// World folder the region is read from
    pub world: PathBuf,
    /// Where the worker writes the tile; the coordinator moves it into the cache
    pub output: PathBuf,
    pub mode: RenderMode,
    /// Colour table override, if any
    pub colors: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobState {
    Pending,
    Running,
    Done,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Done | JobState::Failed | JobState::Cancelled)
    }

    /// Pending -> Running -> Done or Failed, and Pending or Running -> Cancelled.
    /// A pending job whose task is lost before it starts may also fail.
    pub fn can_move_to(&self, next: JobState) -> bool {
        use JobState::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Cancelled)
                | (Pending, Failed)
                | (Running, Done)
                | (Running, Failed)
                | (Running, Cancelled)
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobState::Pending => "pending",
            JobState::Running => "running",
            JobState::Done => "done",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// States of every job in a batch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobTable {
    states: BTreeMap<RegionKey, JobState>,
}

impl JobTable {
    pub fn new(keys: &[RegionKey]) -> Self {
        Self {
            states: keys.iter().map(|key| (*key, JobState::Pending)).collect(),
        }
    }

    pub fn state(&self, key: RegionKey) -> Option<JobState> {
        self.states.get(&key).copied()
    }

    /// Applies a transition if it is legal. Returns false and leaves the state alone otherwise.
    pub fn transition(&mut self, key: RegionKey, next: JobState) -> bool {
        match self.states.get_mut(&key) {
            Some(state) if state.can_move_to(next) => {
                *state = next;
                true
            }
            _ => false,
        }
    }

    /// Keys that never reached a final state
    pub fn unfinished(&self) -> Vec<RegionKey> {
        self.states
            .iter()
            .filter(|(_, state)| !state.is_terminal())
            .map(|(key, _)| *key)
            .collect()
    }

    pub fn count(&self, state: JobState) -> usize {
        self.states.values().filter(|s| **s == state).count()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (RegionKey, JobState)> + '_ {
        self.states.iter().map(|(key, state)| (*key, *state))
    }
}
