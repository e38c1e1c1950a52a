//! Navigation state machine.
//!
//! `Idle -> Resolving -> Rendering -> Idle`. Each transition returns the new
//! state and the effects the caller must apply, so the machine has no
//! knowledge of history, matching or rendering.
//!
//! A navigation started while another is in progress supersedes it: the
//! machine moves to `Resolving` under a new id, and later events carrying the
//! old id are rejected as stale.

use super::history::NavigationType;
use crate::error::RouterError;

/// Identifier of one navigation.
pub type NavigationId = u64;

/// Current phase of the router.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum NavigationState {
	/// Nothing in progress.
	#[default]
	Idle,
	/// Matching `path` against the route table.
	Resolving {
		/// Navigation id.
		id: NavigationId,
		/// Requested path.
		path: String,
	},
	/// Rendering the matched route into containers.
	Rendering {
		/// Navigation id.
		id: NavigationId,
		/// Requested path.
		path: String,
	},
}

impl NavigationState {
	/// Id of the navigation in progress.
	pub fn id(&self) -> Option<NavigationId> {
		match self {
			Self::Idle => None,
			Self::Resolving { id, .. } | Self::Rendering { id, .. } => Some(*id),
		}
	}

	/// Whether no navigation is in progress.
	pub fn is_idle(&self) -> bool {
		matches!(self, Self::Idle)
	}
}

/// Input to [`NavigationMachine::transition`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationEvent {
	/// A navigation was requested.
	Navigate {
		/// Requested path.
		path: String,
		/// Push, replace, or a history pop.
		kind: NavigationType,
	},
	/// Matching finished. `route_path` is `None` when nothing matched.
	Resolved {
		/// Navigation id.
		id: NavigationId,
		/// Full path of the matched route.
		route_path: Option<String>,
	},
	/// Rendering finished.
	Rendered {
		/// Navigation id.
		id: NavigationId,
		/// Whether any container rendered.
		rendered: bool,
	},
	/// Resolving or rendering failed.
	Failed {
		/// Navigation id.
		id: NavigationId,
		/// Failure message.
		reason: String,
	},
}

/// Work the caller performs after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationEffect {
	/// Push a history entry for the path.
	PushHistory(String),
	/// Replace the current history entry.
	ReplaceHistory(String),
	/// Match the path.
	Resolve {
		/// Navigation id.
		id: NavigationId,
		/// Path to match.
		path: String,
	},
	/// Render the resolved route.
	Render {
		/// Navigation id.
		id: NavigationId,
		/// Path being rendered.
		path: String,
	},
	/// The navigation is over.
	Finish {
		/// Navigation id.
		id: NavigationId,
		/// Path navigated to.
		path: String,
		/// Whether anything rendered.
		rendered: bool,
	},
}

/// Pure navigation state machine.
#[derive(Debug, Clone, Default)]
pub struct NavigationMachine {
	state: NavigationState,
	next_id: NavigationId,
}

impl NavigationMachine {
	/// Creates an idle machine.
	pub fn new() -> Self {
		Self::default()
	}

	/// Current state.
	pub fn state(&self) -> &NavigationState {
		&self.state
	}

	/// Applies `event`.
	///
	/// # Errors
	///
	/// Returns [`RouterError::NavigationFailed`] for an event that is not
	/// legal in the current state or that belongs to a superseded navigation.
	/// The state is unchanged in that case.
	pub fn transition(
		&mut self,
		event: NavigationEvent,
	) -> Result<(NavigationState, Vec<NavigationEffect>), RouterError> {
		let (next, effects) = match (&self.state, event) {
			(_, NavigationEvent::Navigate { path, kind }) => {
				self.next_id += 1;
				let id = self.next_id;
				let mut effects = Vec::with_capacity(2);
				match kind {
					NavigationType::Push => effects.push(NavigationEffect::PushHistory(path.clone())),
					NavigationType::Replace => {
						effects.push(NavigationEffect::ReplaceHistory(path.clone()))
					}
					NavigationType::Pop => {}
				}
				effects.push(NavigationEffect::Resolve {
					id,
					path: path.clone(),
				});
				(NavigationState::Resolving { id, path }, effects)
			}
			(
				NavigationState::Resolving { id, path },
				NavigationEvent::Resolved {
					id: event_id,
					route_path,
				},
			) if *id == event_id => match route_path {
				Some(_) => (
					NavigationState::Rendering {
						id: *id,
						path: path.clone(),
					},
					vec![NavigationEffect::Render {
						id: *id,
						path: path.clone(),
					}],
				),
				None => (
					NavigationState::Idle,
					vec![NavigationEffect::Finish {
						id: *id,
						path: path.clone(),
						rendered: false,
					}],
				),
			},
			(
				NavigationState::Rendering { id, path },
				NavigationEvent::Rendered {
					id: event_id,
					rendered,
				},
			) if *id == event_id => (
				NavigationState::Idle,
				vec![NavigationEffect::Finish {
					id: *id,
					path: path.clone(),
					rendered,
				}],
			),
			(
				NavigationState::Resolving { id, path } | NavigationState::Rendering { id, path },
				NavigationEvent::Failed { id: event_id, .. },
			) if *id == event_id => (
				NavigationState::Idle,
				vec![NavigationEffect::Finish {
					id: *id,
					path: path.clone(),
					rendered: false,
				}],
			),
			(state, event) => {
				return Err(RouterError::NavigationFailed(format!(
					"illegal transition from {:?} on {:?}",
					state, event
				)));
			}
		};
		self.state = next.clone();
		Ok((next, effects))
	}
}
