use serde::Serialize;
use std::fs;
use std::path::Path;

use crate::compiler::ActionCompiler;
use crate::error::{ShowError, ShowResult};
use crate::models::actions::{span_of, ActionKey, ActionModel};

/// The declarative program for one song: ActionModel entries in insertion
/// order. Insertion order is the paint order at render time.
///
/// Mutating the sheet never touches the canvas; changes become visible on the
/// next render.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ActionsSheet {
    actions: Vec<ActionModel>,
}

impl ActionsSheet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a sheet from a saved list, validating every entry. Nothing is
    /// returned unless the whole list is admissible.
    pub fn from_actions(
        actions: Vec<ActionModel>,
        compiler: &ActionCompiler<'_>,
    ) -> ShowResult<Self> {
        let mut sheet = Self::new();
        for action in actions {
            sheet.add(action, compiler)?;
        }
        Ok(sheet)
    }

    pub fn add(&mut self, action: ActionModel, compiler: &ActionCompiler<'_>) -> ShowResult<()> {
        compiler.validate(&action)?;
        if self.contains(&action.key()) {
            return Err(ShowError::DuplicateAction {
                fixture_id: action.fixture_id,
                action_type: action.action_type,
                start_time: action.start_time,
            });
        }
        self.actions.push(action);
        Ok(())
    }

    pub fn remove(&mut self, key: &ActionKey) -> ShowResult<ActionModel> {
        let index = self.position(key)?;
        Ok(self.actions.remove(index))
    }

    /// Swap the entry at `key` for `action`, keeping its position. The new
    /// entry may move in time as long as it does not collide with another.
    pub fn replace(
        &mut self,
        key: &ActionKey,
        action: ActionModel,
        compiler: &ActionCompiler<'_>,
    ) -> ShowResult<ActionModel> {
        let index = self.position(key)?;
        compiler.validate(&action)?;
        let new_key = action.key();
        if new_key != *key && self.contains(&new_key) {
            return Err(ShowError::DuplicateAction {
                fixture_id: action.fixture_id,
                action_type: action.action_type,
                start_time: action.start_time,
            });
        }
        Ok(std::mem::replace(&mut self.actions[index], action))
    }

    pub fn contains(&self, key: &ActionKey) -> bool {
        self.actions.iter().any(|a| a.key() == *key)
    }

    fn position(&self, key: &ActionKey) -> ShowResult<usize> {
        self.actions
            .iter()
            .position(|a| a.key() == *key)
            .ok_or_else(|| ShowError::ActionNotFound {
                fixture_id: key.fixture_id.clone(),
                action_type: key.action_type.clone(),
                start_time: key.start_seconds(),
            })
    }

    pub fn actions(&self) -> &[ActionModel] {
        &self.actions
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Earliest start to latest end over all entries.
    pub fn span(&self) -> Option<(f64, f64)> {
        span_of(&self.actions)
    }

    pub fn to_json(&self) -> ShowResult<String> {
        Ok(serde_json::to_string_pretty(&self.actions)?)
    }

    pub fn from_json(json: &str, compiler: &ActionCompiler<'_>) -> ShowResult<Self> {
        let actions: Vec<ActionModel> = serde_json::from_str(json)?;
        Self::from_actions(actions, compiler)
    }

    pub fn save(&self, path: &Path) -> ShowResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn load(path: &Path, compiler: &ActionCompiler<'_>) -> ShowResult<Self> {
        let json = fs::read_to_string(path)
            .map_err(|e| ShowError::Io(format!("Failed to read {}: {}", path.display(), e)))?;
        Self::from_json(&json, compiler)
    }
}
