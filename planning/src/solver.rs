use std::collections::BTreeSet;

use itertools::Itertools;
use thiserror::Error;
use tracing::{debug, trace};

use crate::graph::Layer;
use crate::state::{ActionId, Catalog, State};

/// Search signals of the backward solver.
///
/// `NotFound` is recoverable: the graph may still grow and a deeper search
/// can succeed. `NotPossible` is terminal: the graph levelled off and no
/// expansion can ever change the outcome.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
pub(crate) enum SearchError {
    #[error("no plan found at the current graph depth")]
    NotFound,
    #[error("no plan is possible: the planning graph levelled off")]
    NotPossible,
}

/// Backward goal-regression search over a stack of layers.
pub(crate) struct GraphSolver<'a> {
    catalog: &'a Catalog,
}

impl<'a> GraphSolver<'a> {
    pub fn new(catalog: &'a Catalog) -> GraphSolver<'a> {
        GraphSolver { catalog }
    }

    /// Looks in the deepest layer for an action set achieving `goal`, then
    /// regresses its requirements through the remaining layers down to the
    /// initial one. Returns the achieving actions, deepest level last.
    pub fn search_for_solution(
        &self,
        layers: &[Layer],
        goal: &State,
    ) -> Result<Vec<ActionId>, SearchError> {
        if goal.is_empty() {
            return Ok(Vec::new());
        }

        if let [.., previous, last] = layers {
            if previous == last {
                debug!("planning graph levelled off");
                return Err(SearchError::NotPossible);
            }
        }

        let Some(layer) = layers.last() else {
            return Err(SearchError::NotFound);
        };

        if !goal_reached(layer, goal) {
            trace!(goal = goal.len(), "goal not reached in this layer");
            return Err(SearchError::NotFound);
        }

        if layer.actions.is_empty() {
            // the initial layer already satisfies the goal
            return Ok(Vec::new());
        }

        let candidates = goal
            .iter()
            .map(|g| layer.producers[g].iter().copied())
            .multi_cartesian_product();

        for candidate in candidates {
            let actions: BTreeSet<ActionId> = candidate.into_iter().collect();
            if set_is_mutex(layer, &actions) {
                continue;
            }

            let subgoal: State = actions
                .iter()
                .flat_map(|&id| self.catalog[id].requirements.iter().copied())
                .collect();
            trace!(actions = actions.len(), subgoal = subgoal.len(), "trying action set");

            match self.search_for_solution(&layers[..layers.len() - 1], &subgoal) {
                Ok(mut plan) => {
                    plan.extend(actions);
                    return Ok(plan);
                }
                Err(SearchError::NotFound) => continue,
                Err(SearchError::NotPossible) => return Err(SearchError::NotPossible),
            }
        }

        debug!("no action set achieves the goal at this depth");
        Err(SearchError::NotFound)
    }
}

/// The goal holds in `layer` iff every goal proposition is present and no
/// two of them are mutex.
fn goal_reached(layer: &Layer, goal: &State) -> bool {
    goal.is_subset(&layer.propositions)
        && !goal.iter().any(|&g| {
            layer
                .mutex_propositions
                .get(&g)
                .is_some_and(|m| !m.is_disjoint(goal))
        })
}

fn set_is_mutex(layer: &Layer, actions: &BTreeSet<ActionId>) -> bool {
    actions
        .iter()
        .tuple_combinations()
        .any(|(&a, &b)| layer.actions_mutex(a, b))
}
