//! Variable reference resolution for configuration trees.
//!
//! Every text leaf of a tree becomes a deferred value that is interpolated on
//! first use. References such as `${section.field}` or
//! `${database.(test|default).host}` look up other parts of the same tree,
//! resolving whatever they touch first, so references chain transitively and
//! each value is evaluated at most once. A reference that leads back to a
//! value still being evaluated is reported with the full chain of paths.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::ControlFlow;
use std::rc::Rc;

use super::interpolate::{
    interpolate, process_env, EnvFunction, EnvLookup, EnvVariable, PathFunction, ResolveContext,
    Resolver,
};
use super::merge::{merge, merge_with, Mergeable, Shape};
use super::pattern::MultiPath;
use super::value::{Map, Text, Value};
use super::ConfigError;

/// Options controlling how a tree is expanded.
pub struct ExpandOptions {
    /// Tried before anything else.
    pub resolvers: Vec<Box<dyn Resolver>>,
    /// Tried after every built-in resolver has declined.
    pub default_resolvers: Vec<Box<dyn Resolver>>,
    /// Resolve references to other paths in the tree.
    pub expand_vars: bool,
    /// Resolve `${env:NAME}`, and `${NAME}` when no path matches.
    pub expand_env: bool,
    /// Let unresolved references expand to nothing instead of failing.
    pub allow_undefined: bool,
    /// Source of environment variables.
    pub env: Box<EnvLookup>,
}

impl Default for ExpandOptions {
    fn default() -> Self {
        Self {
            resolvers: Vec::new(),
            default_resolvers: Vec::new(),
            expand_vars: true,
            expand_env: true,
            allow_undefined: false,
            env: Box::new(process_env),
        }
    }
}

impl fmt::Debug for ExpandOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpandOptions")
            .field("resolvers", &self.resolvers.len())
            .field("default_resolvers", &self.default_resolvers.len())
            .field("expand_vars", &self.expand_vars)
            .field("expand_env", &self.expand_env)
            .field("allow_undefined", &self.allow_undefined)
            .finish_non_exhaustive()
    }
}

/// Expands every reference in `tree`.
pub fn expand(tree: &Value, options: ExpandOptions) -> Result<Value, ConfigError> {
    Expander::new(tree, options).expand()
}

/// Looks up `path_spec` in an already expanded tree.
///
/// Every path the pattern names is looked up and the results are merged, so
/// `env.(live|dev)` combines both sections with `live` taking precedence.
pub fn get(tree: &Value, path_spec: &str) -> Result<Option<Value>, ConfigError> {
    let pattern = MultiPath::parse(path_spec)?;
    let mut found = Vec::new();
    let _ = pattern.each(|path| {
        found.push(walk_path(tree, path));
        ControlFlow::Continue(())
    });
    Ok(merge(found))
}

/// Follows a concrete dotted path. Numeric segments index into sequences.
pub fn walk_path<'v>(tree: &'v Value, path: &str) -> Option<&'v Value> {
    if path.is_empty() {
        return None;
    }
    path.split('.').try_fold(tree, |node, key| match node {
        Value::Map(map) => map.get(key),
        Value::Seq(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// A tree whose text leaves are evaluated lazily.
pub struct Expander {
    root: Slot,
    options: ExpandOptions,
}

impl Expander {
    pub fn new(tree: &Value, options: ExpandOptions) -> Self {
        Self {
            root: Slot::defer(tree, String::new()),
            options,
        }
    }

    /// Looks up `path_spec` and fully resolves the result.
    pub fn get(&self, path_spec: &str) -> Result<Option<Value>, ConfigError> {
        let pattern = MultiPath::parse(path_spec)?;
        match self.lookup(&pattern, None)? {
            Some(slot) => self.force(&slot, None).map(Some),
            None => Ok(None),
        }
    }

    /// Resolves every deferred value in the tree.
    pub fn expand(&self) -> Result<Value, ConfigError> {
        self.force(&self.root, None)
    }

    fn lookup(&self, pattern: &MultiPath, trigger: Option<&Rc<Deferred>>) -> Result<Option<Slot>, ConfigError> {
        let mut found = Vec::new();
        let mut failure = None;

        let _ = pattern.each(|path| match self.walk(path, trigger) {
            Ok(slot) => {
                found.push(slot);
                ControlFlow::Continue(())
            }
            Err(err) => {
                failure = Some(err);
                ControlFlow::Break(())
            }
        });
        if let Some(err) = failure {
            return Err(err);
        }

        Ok(merge_with(found.iter().map(Option::as_ref), Slot::is_unresolved))
    }

    /// Walks one concrete path. Deferred values met on the way are resolved
    /// so that references into spliced structures work; the value at the end
    /// of the path is returned as-is.
    fn walk(&self, path: &str, trigger: Option<&Rc<Deferred>>) -> Result<Option<Slot>, ConfigError> {
        if path.is_empty() {
            return Ok(None);
        }

        let mut step = Step::Slot(&self.root);
        for key in path.split('.') {
            let next = match step {
                Step::Slot(Slot::Map(map)) => map.get(key).map(Step::Slot),
                Step::Slot(Slot::Seq(items)) => index(items, key).map(Step::Slot),
                Step::Slot(Slot::Value(value)) => child(value.clone(), key).map(Step::Value),
                Step::Slot(Slot::Deferred(node)) => {
                    child(self.resolve(node, trigger)?, key).map(Step::Value)
                }
                Step::Value(value) => child(value, key).map(Step::Value),
            };
            match next {
                Some(next) => step = next,
                None => return Ok(None),
            }
        }

        Ok(Some(match step {
            Step::Slot(slot) => slot.clone(),
            Step::Value(value) => Slot::Value(value),
        }))
    }

    fn force(&self, slot: &Slot, trigger: Option<&Rc<Deferred>>) -> Result<Value, ConfigError> {
        match slot {
            Slot::Value(value) => Ok(value.clone()),
            Slot::Deferred(node) => self.resolve(node, trigger),
            Slot::Seq(items) => items
                .iter()
                .map(|item| self.force(item, trigger))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Seq),
            Slot::Map(map) => map
                .iter()
                .map(|(key, item)| self.force(item, trigger).map(|value| (key.clone(), value)))
                .collect::<Result<Map, ConfigError>>()
                .map(Value::Map),
        }
    }

    fn resolve(&self, node: &Rc<Deferred>, trigger: Option<&Rc<Deferred>>) -> Result<Value, ConfigError> {
        match &*node.state.borrow() {
            State::Resolved(value) => return Ok(value.clone()),
            State::Evaluating { .. } => {
                return Err(ConfigError::CircularReference {
                    trace: cycle_trace(trigger, node),
                })
            }
            State::Pending => {}
        }

        *node.state.borrow_mut() = State::Evaluating {
            triggered_by: trigger.cloned(),
        };
        tracing::trace!(path = %node.path, "resolving");

        let value = match self.interpolate_node(node) {
            Ok(Value::Text(text)) => Value::Text(node.raw.with_text(text.into_string())),
            Ok(value) => value,
            Err(err) => {
                *node.state.borrow_mut() = State::Pending;
                return Err(err);
            }
        };

        *node.state.borrow_mut() = State::Resolved(value.clone());
        Ok(value)
    }

    fn interpolate_node(&self, node: &Rc<Deferred>) -> Result<Value, ConfigError> {
        let options = &self.options;

        let scope = |expression: &str, ctx: &ResolveContext<'_>| -> Result<Option<Value>, ConfigError> {
            if ctx.func.is_some() {
                return Ok(None);
            }
            // Text that is not a path is left to the rest of the chain.
            let Ok(pattern) = MultiPath::parse(expression) else {
                return Ok(None);
            };
            match self.lookup(&pattern, Some(node))? {
                Some(slot) => self.force(&slot, Some(node)).map(Some),
                None => Ok(None),
            }
        };
        let reject = |expression: &str, _ctx: &ResolveContext<'_>| -> Result<Option<Value>, ConfigError> {
            Err(ConfigError::UndefinedVariable {
                name: expression.to_string(),
                origin: Some(node.path.clone()),
            })
        };
        let env_function = EnvFunction::new(&*options.env);
        let env_variable = EnvVariable::new(&*options.env);

        let mut chain: Vec<&dyn Resolver> = options.resolvers.iter().map(|r| &**r).collect();
        chain.push(&PathFunction);
        if options.expand_env {
            chain.push(&env_function);
        }
        if options.expand_vars {
            chain.push(&scope);
        }
        if options.expand_env {
            chain.push(&env_variable);
        }
        chain.extend(options.default_resolvers.iter().map(|r| &**r));
        if !options.allow_undefined {
            chain.push(&reject);
        }

        interpolate(node.raw.as_str(), &chain, Some(&node.raw))
    }
}

impl fmt::Debug for Expander {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Expander")
            .field("root", &self.root)
            .field("options", &self.options)
            .finish()
    }
}

/// Lists the origin paths from the value whose evaluation started the chain
/// down to `revisited`.
fn cycle_trace(trigger: Option<&Rc<Deferred>>, revisited: &Deferred) -> Vec<String> {
    let mut trace = vec![revisited.path.clone()];
    let mut current = trigger.cloned();
    while let Some(node) = current {
        trace.push(node.path.clone());
        current = match &*node.state.borrow() {
            State::Evaluating { triggered_by } => triggered_by.clone(),
            _ => None,
        };
    }
    trace.reverse();
    trace
}

fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

fn index<'s>(items: &'s [Slot], key: &str) -> Option<&'s Slot> {
    key.parse::<usize>().ok().and_then(|i| items.get(i))
}

fn child(value: Value, key: &str) -> Option<Value> {
    match value {
        Value::Map(mut map) => map.remove(key),
        Value::Seq(items) => {
            let i = key.parse::<usize>().ok()?;
            items.into_iter().nth(i)
        }
        _ => None,
    }
}

#[derive(Debug)]
enum State {
    Pending,
    Evaluating { triggered_by: Option<Rc<Deferred>> },
    Resolved(Value),
}

/// A text leaf awaiting interpolation.
#[derive(Debug)]
struct Deferred {
    raw: Text,
    path: String,
    state: RefCell<State>,
}

impl Deferred {
    fn resolved(&self) -> Option<Value> {
        match &*self.state.borrow() {
            State::Resolved(value) => Some(value.clone()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
enum Slot {
    Value(Value),
    Deferred(Rc<Deferred>),
    Seq(Vec<Slot>),
    Map(BTreeMap<String, Slot>),
}

impl Slot {
    fn defer(value: &Value, path: String) -> Slot {
        match value {
            Value::Text(text) => Slot::Deferred(Rc::new(Deferred {
                raw: text.clone(),
                path,
                state: RefCell::new(State::Pending),
            })),
            Value::Seq(items) => Slot::Seq(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| Slot::defer(item, join_path(&path, &i.to_string())))
                    .collect(),
            ),
            Value::Map(map) => Slot::Map(
                map.iter()
                    .map(|(key, item)| (key.clone(), Slot::defer(item, join_path(&path, key))))
                    .collect(),
            ),
            terminal => Slot::Value(terminal.clone()),
        }
    }

    fn is_unresolved(&self) -> bool {
        matches!(self, Slot::Deferred(node) if node.resolved().is_none())
    }
}

fn lift(value: Value) -> Shape<Slot> {
    match value.into_shape() {
        Shape::Terminal(value) => Shape::Terminal(Slot::Value(value)),
        Shape::Seq(items) => Shape::Seq(items.into_iter().map(Slot::Value).collect()),
        Shape::Map(map) => Shape::Map(map.into_iter().map(|(k, v)| (k, Slot::Value(v))).collect()),
    }
}

impl Mergeable for Slot {
    fn into_shape(self) -> Shape<Self> {
        match self {
            Slot::Seq(items) => Shape::Seq(items),
            Slot::Map(map) => Shape::Map(map),
            Slot::Value(value) => lift(value),
            Slot::Deferred(node) => match node.resolved() {
                Some(value) if !value.is_terminal() => lift(value),
                _ => Shape::Terminal(Slot::Deferred(node)),
            },
        }
    }

    fn from_shape(shape: Shape<Self>) -> Self {
        match shape {
            Shape::Terminal(slot) => slot,
            Shape::Seq(items) => Slot::Seq(items),
            Shape::Map(map) => Slot::Map(map),
        }
    }
}

enum Step<'s> {
    Slot(&'s Slot),
    Value(Value),
}
