use std::collections::{BTreeMap, BTreeSet};

use itertools::Itertools;
use tracing::{debug, trace};

use crate::state::{Action, ActionId, Catalog, Prop, State, World};

/// Snapshot of the planning graph at one depth: the actions that could fire,
/// the propositions they could produce, and the pairs of each that cannot
/// co-occur.
///
/// Two consecutive equal layers mean the graph reached its fix-point and
/// further expansion can never change anything.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct Layer {
    pub(crate) actions: Vec<ActionId>,
    pub(crate) propositions: State,
    /// For each proposition, the actions of this layer asserting it, in
    /// action order.
    pub(crate) producers: BTreeMap<Prop, Vec<ActionId>>,
    pub(crate) mutex_actions: BTreeMap<ActionId, BTreeSet<ActionId>>,
    pub(crate) mutex_propositions: BTreeMap<Prop, BTreeSet<Prop>>,
}

impl Layer {
    /// The synthetic first layer: no actions, only the initial propositions.
    pub fn initial(propositions: State) -> Layer {
        Layer {
            propositions,
            ..Default::default()
        }
    }

    pub fn actions_mutex(&self, a: ActionId, b: ActionId) -> bool {
        self.mutex_actions.get(&a).is_some_and(|m| m.contains(&b))
    }
}

/// Grows the planning graph one layer at a time.
pub(crate) struct GraphBuilder<'a> {
    world: &'a World,
    catalog: Catalog,
    available: Vec<ActionId>,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(world: &'a World, actions: impl IntoIterator<Item = Action>) -> GraphBuilder<'a> {
        let mut catalog = Catalog::new();
        let available = actions.into_iter().map(|a| catalog.push(a)).collect();
        GraphBuilder {
            world,
            catalog,
            available,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Produces the layer at depth `k + 1` from the layer at depth `k`.
    pub fn calculate_next_layer(&mut self, current: &Layer) -> Layer {
        let actions = self.calculate_actions(current);
        let mutex_actions = self.calculate_action_mutex(current, &actions);
        let (propositions, producers) = self.calculate_propositions(&actions);
        let mutex_propositions = calculate_proposition_mutex(&producers, &mutex_actions);
        debug!(
            actions = actions.len(),
            propositions = propositions.len(),
            "expanded layer"
        );
        Layer {
            actions,
            propositions,
            producers,
            mutex_actions,
            mutex_propositions,
        }
    }

    /// One no-op per current proposition, plus every domain action whose
    /// requirements all hold.
    fn calculate_actions(&mut self, current: &Layer) -> Vec<ActionId> {
        let mut actions = Vec::with_capacity(current.propositions.len() + self.available.len());
        for &prop in &current.propositions {
            actions.push(self.catalog.noop(prop, self.world));
        }
        for &id in &self.available {
            if self.catalog[id].requirements.is_subset(&current.propositions) {
                actions.push(id);
            } else {
                trace!(action = self.catalog.name(id), "requirements not met");
            }
        }
        actions
    }

    fn calculate_action_mutex(
        &self,
        current: &Layer,
        actions: &[ActionId],
    ) -> BTreeMap<ActionId, BTreeSet<ActionId>> {
        let mut mutex: BTreeMap<ActionId, BTreeSet<ActionId>> = BTreeMap::new();
        for (a, b) in actions.iter().copied().tuple_combinations() {
            if self.action_pair_mutex(current, a, b) || self.action_pair_mutex(current, b, a) {
                trace!(
                    a = self.catalog.name(a),
                    b = self.catalog.name(b),
                    "mutex actions"
                );
                mutex.entry(a).or_default().insert(b);
                mutex.entry(b).or_default().insert(a);
            }
        }
        mutex
    }

    /// Directional check of the mutex rules between `a` and `b`; callers
    /// evaluate both orderings.
    fn action_pair_mutex(&self, current: &Layer, a: ActionId, b: ActionId) -> bool {
        let (a, b) = (&self.catalog[a], &self.catalog[b]);

        // a's effects contradict b's effects
        if a.effects.iter().any(|&e| b.effects.contains(&!e)) {
            return true;
        }
        // a's effects contradict b's requirements
        if a.effects.iter().any(|&e| b.requirements.contains(&!e)) {
            return true;
        }
        // the requirements themselves could not hold together
        a.requirements.iter().any(|p| {
            current
                .mutex_propositions
                .get(p)
                .is_some_and(|m| !m.is_disjoint(&b.requirements))
        })
    }

    fn calculate_propositions(
        &self,
        actions: &[ActionId],
    ) -> (State, BTreeMap<Prop, Vec<ActionId>>) {
        let mut producers: BTreeMap<Prop, Vec<ActionId>> = BTreeMap::new();
        for &id in actions {
            for &effect in &self.catalog[id].effects {
                producers.entry(effect).or_default().push(id);
            }
        }
        let propositions = producers.keys().copied().collect();
        (propositions, producers)
    }
}

/// Two propositions are mutex iff every producer of one is mutex with every
/// producer of the other. An action is never mutex with itself, so a shared
/// producer makes the pair compatible.
fn calculate_proposition_mutex(
    producers: &BTreeMap<Prop, Vec<ActionId>>,
    mutex_actions: &BTreeMap<ActionId, BTreeSet<ActionId>>,
) -> BTreeMap<Prop, BTreeSet<Prop>> {
    let mut mutex: BTreeMap<Prop, BTreeSet<Prop>> = BTreeMap::new();
    for ((&p, p_producers), (&q, q_producers)) in producers.iter().tuple_combinations() {
        let all_pairs_mutex = p_producers.iter().all(|a| {
            q_producers
                .iter()
                .all(|b| mutex_actions.get(a).is_some_and(|m| m.contains(b)))
        });
        if all_pairs_mutex {
            mutex.entry(p).or_default().insert(q);
            mutex.entry(q).or_default().insert(p);
        }
    }
    mutex
}
