//! The optimizer's live scenario set.

use std::fmt;

use od_core::ScenarioId;

/// Scenarios under optimization plus the distinguished (consensus) plan and
/// the current best plan used for reporting.
#[derive(Clone, Debug)]
pub struct ScenarioPool<P> {
    scenarios: Vec<(ScenarioId, P)>,
    next_id: u32,
    distinguished: Option<P>,
    current_best: Option<P>,
}

impl<P> Default for ScenarioPool<P> {
    fn default() -> Self {
        Self {
            scenarios: Vec::new(),
            next_id: 0,
            distinguished: None,
            current_best: None,
        }
    }
}

impl<P> ScenarioPool<P> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, scenario: P) -> ScenarioId {
        let id = ScenarioId(self.next_id);
        self.next_id += 1;
        self.scenarios.push((id, scenario));
        id
    }

    pub fn remove(&mut self, id: ScenarioId) -> Option<P> {
        let i = self.scenarios.iter().position(|(s, _)| *s == id)?;
        Some(self.scenarios.remove(i).1)
    }

    /// Remove every listed scenario; returns how many were present.
    pub fn remove_all(&mut self, ids: &[ScenarioId]) -> usize {
        let before = self.scenarios.len();
        self.scenarios.retain(|(id, _)| !ids.contains(id));
        before - self.scenarios.len()
    }

    pub fn get(&self, id: ScenarioId) -> Option<&P> {
        self.scenarios.iter().find(|(s, _)| *s == id).map(|(_, p)| p)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ScenarioId, &P)> + '_ {
        self.scenarios.iter().map(|(id, p)| (*id, p))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (ScenarioId, &mut P)> + '_ {
        self.scenarios.iter_mut().map(|(id, p)| (*id, p))
    }

    pub fn ids(&self) -> Vec<ScenarioId> {
        self.scenarios.iter().map(|(id, _)| *id).collect()
    }

    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }

    pub fn distinguished(&self) -> Option<&P> {
        self.distinguished.as_ref()
    }

    pub fn distinguished_mut(&mut self) -> Option<&mut P> {
        self.distinguished.as_mut()
    }

    pub fn set_distinguished(&mut self, plan: P) -> Option<P> {
        self.distinguished.replace(plan)
    }

    pub fn current_best(&self) -> Option<&P> {
        self.current_best.as_ref()
    }

    pub fn current_best_mut(&mut self) -> Option<&mut P> {
        self.current_best.as_mut()
    }

    pub fn set_current_best(&mut self, plan: P) -> Option<P> {
        self.current_best.replace(plan)
    }
}

impl<P: fmt::Display> fmt::Display for ScenarioPool<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "pool of {} scenario(s)", self.scenarios.len())?;
        for (id, p) in &self.scenarios {
            writeln!(f, "── {id}\n{p}")?;
        }
        if let Some(d) = &self.distinguished {
            writeln!(f, "── distinguished\n{d}")?;
        }
        if let Some(b) = &self.current_best {
            write!(f, "── current best\n{b}")?;
        }
        Ok(())
    }
}
