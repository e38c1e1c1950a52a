//! In-memory session history.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How a navigation entered the history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NavigationType {
	/// A new entry was pushed.
	Push,
	/// The current entry was replaced.
	Replace,
	/// The cursor moved (back/forward).
	Pop,
}

/// State stored with one history entry.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HistoryState {
	/// Requested path.
	pub path: String,
	/// Parameters extracted by the matched route.
	pub params: HashMap<String, String>,
	/// Full path of the matched route, if any.
	pub route_path: Option<String>,
}

impl HistoryState {
	/// Creates state for `path` with no match information.
	pub fn new(path: impl Into<String>) -> Self {
		Self {
			path: path.into(),
			..Self::default()
		}
	}

	/// Sets the extracted parameters.
	pub fn with_params(mut self, params: HashMap<String, String>) -> Self {
		self.params = params;
		self
	}

	/// Sets the matched route path.
	pub fn with_route_path(mut self, route_path: impl Into<String>) -> Self {
		self.route_path = Some(route_path.into());
		self
	}
}

/// Entries plus a cursor. Pushing truncates any forward entries.
#[derive(Debug, Clone)]
pub struct History {
	entries: Vec<HistoryState>,
	cursor: usize,
}

impl History {
	/// Creates a history whose only entry is `initial`.
	pub fn new(initial: HistoryState) -> Self {
		Self {
			entries: vec![initial],
			cursor: 0,
		}
	}

	/// Current entry.
	pub fn current(&self) -> &HistoryState {
		&self.entries[self.cursor]
	}

	/// Appends `state` after the cursor, dropping forward entries.
	pub fn push(&mut self, state: HistoryState) {
		self.entries.truncate(self.cursor + 1);
		self.entries.push(state);
		self.cursor = self.entries.len() - 1;
	}

	/// Replaces the current entry.
	pub fn replace(&mut self, state: HistoryState) {
		self.entries[self.cursor] = state;
	}

	/// Moves back one entry. Returns the new current entry, `None` at the start.
	pub fn back(&mut self) -> Option<&HistoryState> {
		if self.cursor == 0 {
			return None;
		}
		self.cursor -= 1;
		Some(self.current())
	}

	/// Moves forward one entry. Returns the new current entry, `None` at the end.
	pub fn forward(&mut self) -> Option<&HistoryState> {
		if self.cursor + 1 >= self.entries.len() {
			return None;
		}
		self.cursor += 1;
		Some(self.current())
	}

	/// Whether [`History::back`] would move.
	pub fn can_go_back(&self) -> bool {
		self.cursor > 0
	}

	/// Whether [`History::forward`] would move.
	pub fn can_go_forward(&self) -> bool {
		self.cursor + 1 < self.entries.len()
	}

	/// Number of entries.
	pub fn len(&self) -> usize {
		self.entries.len()
	}

	/// Always `false`; a history has at least one entry.
	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}
}

impl Default for History {
	fn default() -> Self {
		Self::new(HistoryState::new("/"))
	}
}
