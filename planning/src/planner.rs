use thiserror::Error;
use tracing::debug;

use crate::graph::{GraphBuilder, Layer};
use crate::solver::{GraphSolver, SearchError};
use crate::state::{Action, State, World};

/// The planning graph levelled off before the goal became reachable: no
/// sequence of the given actions can achieve it.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
#[error("no plan is possible: the planning graph levelled off before reaching the goal")]
pub struct PlanNotPossible;

/// Ties the graph builder and solver together: grows the graph until the
/// solver finds a plan or proves there is none.
pub struct Planner<'a> {
    world: &'a World,
}

impl<'a> Planner<'a> {
    pub fn new(world: &'a World) -> Planner<'a> {
        Planner { world }
    }

    /// Searches for a sequence of `actions` transforming `state` into one
    /// that satisfies `goal`. The returned plan is free of no-ops.
    pub fn plan(
        &self,
        state: &State,
        goal: &State,
        actions: &[Action],
    ) -> Result<Vec<Action>, PlanNotPossible> {
        let mut builder = GraphBuilder::new(self.world, actions.iter().cloned());
        let mut layers = vec![Layer::initial(state.clone())];

        loop {
            let next = builder.calculate_next_layer(&layers[layers.len() - 1]);
            layers.push(next);

            let solver = GraphSolver::new(builder.catalog());
            match solver.search_for_solution(&layers, goal) {
                Ok(plan) => {
                    debug!(depth = layers.len() - 1, actions = plan.len(), "plan found");
                    return Ok(plan
                        .into_iter()
                        .map(|id| builder.catalog()[id].clone())
                        .filter(|action| !action.is_noop())
                        .collect());
                }
                Err(SearchError::NotFound) => {
                    debug!(depth = layers.len() - 1, "plan not found, extending the graph");
                }
                Err(SearchError::NotPossible) => return Err(PlanNotPossible),
            }
        }
    }

    /// Replans after the propositions in `update` stopped holding: they are
    /// invalidated together with every effect depending on them, and the
    /// planner is asked to restore the state the world was in. Propositions
    /// that survive the invalidation are retained through no-ops rather than
    /// re-achieved.
    pub fn plan_state_update(
        &self,
        state: &State,
        update: &State,
        actions: &[Action],
    ) -> Result<Vec<Action>, PlanNotPossible> {
        let mentioned: State = actions
            .iter()
            .flat_map(|a| a.requirements.union(&a.effects).copied())
            .collect();
        let original_state: State = state.intersection(&mentioned).copied().collect();

        let dependent_effects: State = actions
            .iter()
            .filter(|a| !a.requirements.is_disjoint(update))
            .flat_map(|a| a.effects.iter().copied())
            .collect();
        let invalidated: State = update.union(&dependent_effects).copied().collect();
        let new_state: State = original_state.difference(&invalidated).copied().collect();

        debug!(
            invalidated = invalidated.len(),
            "replanning after state update"
        );
        self.plan(&new_state, &original_state, actions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chains_actions_through_replacement() {
        let mut world = World::new();
        let x = world.prop("x");
        let y = world.prop("y");
        let z = world.prop("z");

        let add_x = Action::new("add_x", [], [x]);
        let add_y = Action::new("add_y", [x], [y]);
        let replace_x_z = Action::new("replace_x_z", [x], [z, !x]);

        let actions = [add_x.clone(), add_y.clone(), replace_x_z.clone()];
        let planner = Planner::new(&world);
        let plan = planner
            .plan(&State::new(), &[x, y, z].into_iter().collect(), &actions)
            .unwrap();

        // x must be re-achieved after its replacement deletes it
        assert_eq!(plan, vec![add_x.clone(), replace_x_z, add_x, add_y]);
    }

    #[test]
    fn unreachable_goal_is_not_possible() {
        let mut world = World::new();
        let x = world.prop("x");
        let y = world.prop("y");
        let planner = Planner::new(&world);
        let result = planner.plan(
            &State::new(),
            &[y].into_iter().collect(),
            &[Action::new("add_x", [], [x])],
        );
        assert_eq!(result, Err(PlanNotPossible));
    }

    #[test]
    fn satisfied_goal_needs_no_actions() {
        let mut world = World::new();
        let a = world.prop("a");
        let b = world.prop("b");
        let x = world.prop("x");
        let planner = Planner::new(&world);
        let plan = planner
            .plan(
                &[a, b].into_iter().collect(),
                &[a].into_iter().collect(),
                &[Action::new("add_x", [a], [x])],
            )
            .unwrap();
        assert_eq!(plan, vec![]);
    }

    #[test]
    fn empty_goal_returns_empty_plan() {
        let mut world = World::new();
        let x = world.prop("x");
        let planner = Planner::new(&world);
        let plan = planner
            .plan(&State::new(), &State::new(), &[Action::new("add_x", [], [x])])
            .unwrap();
        assert_eq!(plan, vec![]);
    }

    #[test]
    fn untouched_update_needs_no_actions() {
        // the update is disjoint from the state and from every requirement
        let mut world = World::new();
        let x = world.prop("x");
        let y = world.prop("y");
        let unrelated = world.prop("unrelated");
        let planner = Planner::new(&world);
        let plan = planner
            .plan_state_update(
                &[x, y].into_iter().collect(),
                &[unrelated].into_iter().collect(),
                &[Action::new("add_y", [x], [y])],
            )
            .unwrap();
        assert_eq!(plan, vec![]);
    }
}
