use std::collections::{BTreeSet, HashMap};
use std::fmt::{Display, Error, Formatter};
use std::ops::{Index, Not};

use serde_json::Value;

/// Suffix that marks the negative form of a fact in textual labels.
const UNSET_SUFFIX: &str = "__unset";

/// Prefix of the synthesized actions that carry a proposition across a layer.
const NOOP_PREFIX: &str = "noop_";

/// Compact id of an interned fact symbol.
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Debug, Hash)]
struct SymId(u32);

impl SymId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Proposition: a fact symbol together with a sign.
///
/// The positive form states that the fact holds, the negative form that it
/// is explicitly unset. The two forms of the same fact contradict each
/// other and can never hold together. Negation flips the sign; label text
/// is never inspected once the proposition exists.
///
/// The derived ordering keeps both signs of a fact adjacent, so ordered
/// proposition sets iterate in interning order.
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Debug, Hash)]
pub struct Prop {
    sym: SymId,
    positive: bool,
}

impl Not for Prop {
    type Output = Prop;
    fn not(self) -> Self::Output {
        Prop {
            positive: !self.positive,
            ..self
        }
    }
}

/// Keeps track of all fact symbols that can appear in a state.
///
/// Labels are interned once; a trailing `__unset` is recognized here and
/// becomes the sign of the returned proposition, so the rest of the
/// algorithm only ever compares numeric ids.
#[derive(Clone, Debug, Default)]
pub struct World {
    labels: Vec<String>,
    ids: HashMap<String, SymId>,
}

impl World {
    pub fn new() -> World {
        Default::default()
    }

    /// Interns `label` and returns the corresponding proposition.
    pub fn prop(&mut self, label: &str) -> Prop {
        match label.strip_suffix(UNSET_SUFFIX) {
            Some(base) => Prop {
                sym: self.sym(base),
                positive: false,
            },
            None => Prop {
                sym: self.sym(label),
                positive: true,
            },
        }
    }

    /// Looks up an already interned label. Returns None for unknown facts.
    pub fn lookup(&self, label: &str) -> Option<Prop> {
        match label.strip_suffix(UNSET_SUFFIX) {
            Some(base) => self.ids.get(base).map(|&sym| Prop {
                sym,
                positive: false,
            }),
            None => self.ids.get(label).map(|&sym| Prop {
                sym,
                positive: true,
            }),
        }
    }

    fn sym(&mut self, name: &str) -> SymId {
        if let Some(&sym) = self.ids.get(name) {
            return sym;
        }
        let sym = SymId(self.labels.len() as u32);
        self.labels.push(name.to_string());
        self.ids.insert(name.to_string(), sym);
        sym
    }

    fn label(&self, sym: SymId) -> &str {
        &self.labels[sym.index()]
    }

    /// Displayable view of a proposition, reattaching the `__unset` suffix
    /// on negative forms.
    pub fn display(&self, prop: Prop) -> impl Display + '_ {
        DispProp(prop, self)
    }
}

/// Composition of a proposition and its defining world, so that the label
/// can be looked up for display.
struct DispProp<'a>(Prop, &'a World);

impl Display for DispProp<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(f, "{}", self.1.label(self.0.sym))?;
        if !self.0.positive {
            write!(f, "{UNSET_SUFFIX}")?;
        }
        Ok(())
    }
}

/// A state (and a goal) is a set of propositions holding simultaneously.
pub type State = BTreeSet<Prop>;

/// Converts a world description (fact name to value) into a state: a truthy
/// value yields the positive proposition, anything else the negative one.
pub fn state_from_world(world: &mut World, facts: &serde_json::Map<String, Value>) -> State {
    let mut state = State::new();
    for (name, value) in facts {
        let prop = world.prop(name);
        state.insert(if truthy(value) { prop } else { !prop });
    }
    state
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|x| x != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(values) => !values.is_empty(),
        Value::Object(fields) => !fields.is_empty(),
    }
}

/// A planning action: a transition from a set of required propositions to a
/// set of asserted effects.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Action {
    pub name: String,
    pub requirements: BTreeSet<Prop>,
    pub effects: BTreeSet<Prop>,
}

impl Action {
    pub fn new(
        name: impl Into<String>,
        requirements: impl IntoIterator<Item = Prop>,
        effects: impl IntoIterator<Item = Prop>,
    ) -> Action {
        Action {
            name: name.into(),
            requirements: requirements.into_iter().collect(),
            effects: effects.into_iter().collect(),
        }
    }

    /// Whether this action only carries a proposition forward.
    pub fn is_noop(&self) -> bool {
        self.name.starts_with(NOOP_PREFIX)
    }
}

/// Unique numeric identifier of an `Action` within a `Catalog`.
#[derive(Debug, Clone, Copy, Ord, PartialOrd, Eq, PartialEq, Hash)]
pub(crate) struct ActionId(usize);

impl From<ActionId> for usize {
    fn from(id: ActionId) -> Self {
        id.0
    }
}
impl From<usize> for ActionId {
    fn from(x: usize) -> Self {
        ActionId(x)
    }
}

/// Store of all actions considered during one planning run: the domain
/// actions plus the no-ops synthesized while the graph grows.
///
/// Structurally equal actions share an id, so the no-op of a proposition is
/// the same action at every depth.
#[derive(Default)]
pub(crate) struct Catalog {
    all: Vec<Action>,
    ids: HashMap<Action, ActionId>,
    noops: HashMap<Prop, ActionId>,
}

impl Catalog {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn push(&mut self, action: Action) -> ActionId {
        if let Some(&id) = self.ids.get(&action) {
            return id;
        }
        let id = ActionId(self.all.len());
        self.ids.insert(action.clone(), id);
        self.all.push(action);
        id
    }

    /// The no-op carrying `prop`, synthesized on first request.
    pub fn noop(&mut self, prop: Prop, world: &World) -> ActionId {
        if let Some(&id) = self.noops.get(&prop) {
            return id;
        }
        let name = format!("{NOOP_PREFIX}{}", world.display(prop));
        let id = self.push(Action::new(name, [prop], [prop]));
        self.noops.insert(prop, id);
        id
    }

    pub fn name(&self, id: ActionId) -> &str {
        &self[id].name
    }
}

impl Index<ActionId> for Catalog {
    type Output = Action;
    fn index(&self, id: ActionId) -> &Action {
        &self.all[id.0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn negation_is_a_sign_flip() {
        let mut world = World::new();
        let x = world.prop("x");
        assert!(x.positive);
        assert!(!(!x).positive);
        assert_eq!(!!x, x);
        assert_eq!((!x).sym, x.sym);
        // the negative form sorts right before its positive form
        assert!(!x < x);
    }

    #[test]
    fn unset_labels_intern_to_negative_forms() {
        let mut world = World::new();
        let down = world.prop("downtime");
        let up = world.prop("downtime__unset");
        assert_eq!(up, !down);
        assert_eq!(world.display(down).to_string(), "downtime");
        assert_eq!(world.display(up).to_string(), "downtime__unset");
    }

    #[test]
    fn lookup_does_not_intern() {
        let mut world = World::new();
        assert!(world.lookup("x").is_none());
        let x = world.prop("x");
        assert_eq!(world.lookup("x"), Some(x));
        assert_eq!(world.lookup("x__unset"), Some(!x));
    }

    #[test]
    fn state_from_world_signs_by_truthiness() {
        let mut world = World::new();
        let facts = serde_json::Map::from_iter([
            ("ip_address".to_string(), json!("169.254.169.1")),
            ("ip_address_ipmi".to_string(), json!("")),
            ("downtime".to_string(), json!(false)),
            ("retries".to_string(), json!(0)),
            ("memory_gb".to_string(), json!(64)),
            ("tags".to_string(), json!([])),
            ("owner".to_string(), json!(null)),
        ]);
        let state = state_from_world(&mut world, &facts);
        let expected: State = [
            world.prop("ip_address"),
            !world.prop("ip_address_ipmi"),
            !world.prop("downtime"),
            !world.prop("retries"),
            world.prop("memory_gb"),
            !world.prop("tags"),
            !world.prop("owner"),
        ]
        .into_iter()
        .collect();
        assert_eq!(state, expected);
    }

    #[test]
    fn noops_are_interned_once() {
        let mut world = World::new();
        let x = world.prop("x");
        let mut catalog = Catalog::new();
        let a = catalog.noop(x, &world);
        let b = catalog.noop(x, &world);
        assert_eq!(a, b);
        assert_eq!(catalog.name(a), "noop_x");
        assert!(catalog[a].is_noop());
        assert_eq!(catalog[a], Action::new("noop_x", [x], [x]));
    }

    #[test]
    fn catalog_shares_ids_of_equal_actions() {
        let mut world = World::new();
        let x = world.prop("x");
        let mut catalog = Catalog::new();
        let a = catalog.push(Action::new("add_x", [], [x]));
        let b = catalog.push(Action::new("add_x", [], [x]));
        assert_eq!(a, b);
    }
}
