//! Structural merging of configuration trees.
//!
//! Values are merged left to right and the first value wins:
//!
//! - a terminal as the first value is returned as-is, ignoring the rest;
//! - a sequence absorbs later sequences element by element, and later
//!   terminals or mappings as single elements;
//! - a mapping merges later mappings key by key, recursing on keys present in
//!   both, and ignores later values of any other shape.
//!
//! Inputs are borrowed and never modified.

use std::collections::BTreeMap;

use super::value::Value;

/// The shape of a tree node, as seen by the merge.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape<T> {
    Terminal(T),
    Seq(Vec<T>),
    Map(BTreeMap<String, T>),
}

/// A tree that can be taken apart into its shape and rebuilt from one.
pub trait Mergeable: Clone {
    fn into_shape(self) -> Shape<Self>;
    fn from_shape(shape: Shape<Self>) -> Self;
}

impl Mergeable for Value {
    fn into_shape(self) -> Shape<Self> {
        match self {
            Value::Seq(items) => Shape::Seq(items),
            Value::Map(map) => Shape::Map(map),
            terminal => Shape::Terminal(terminal),
        }
    }

    fn from_shape(shape: Shape<Self>) -> Self {
        match shape {
            Shape::Terminal(value) => value,
            Shape::Seq(items) => Value::Seq(items),
            Shape::Map(map) => Value::Map(map),
        }
    }
}

/// Merges `values`, skipping `None`. Returns `None` if every value is `None`.
///
/// ```
/// use configle::{merge, Value};
///
/// let a = Value::from(vec![Value::from("a")]);
/// let b = Value::from(vec![Value::from("b")]);
/// let merged = merge([Some(&a), None, Some(&b)]).unwrap();
/// assert_eq!(merged, Value::from(vec![Value::from("a"), Value::from("b")]));
/// ```
pub fn merge<'a, T, I>(values: I) -> Option<T>
where
    T: Mergeable + 'a,
    I: IntoIterator<Item = Option<&'a T>>,
{
    merge_with(values, |_| false)
}

/// Like [`merge`], but values matching `stop` are treated as opaque
/// terminals: never expanded, never merged into.
pub fn merge_with<'a, T, I, P>(values: I, stop: P) -> Option<T>
where
    T: Mergeable + 'a,
    I: IntoIterator<Item = Option<&'a T>>,
    P: Fn(&T) -> bool,
{
    let mut values = values.into_iter().flatten().cloned();
    let first = values.next()?;
    Some(fold(first, values, &stop))
}

fn fold<T, P>(first: T, rest: impl Iterator<Item = T>, stop: &P) -> T
where
    T: Mergeable,
    P: Fn(&T) -> bool,
{
    if stop(&first) {
        return first;
    }

    match first.into_shape() {
        Shape::Terminal(terminal) => terminal,
        Shape::Seq(mut acc) => {
            for value in rest {
                if stop(&value) {
                    acc.push(value);
                    continue;
                }
                match value.into_shape() {
                    Shape::Seq(items) => acc.extend(items),
                    Shape::Terminal(terminal) => acc.push(terminal),
                    map => acc.push(T::from_shape(map)),
                }
            }
            T::from_shape(Shape::Seq(acc))
        }
        Shape::Map(mut acc) => {
            for value in rest {
                if stop(&value) {
                    continue;
                }
                let Shape::Map(map) = value.into_shape() else {
                    continue;
                };
                for (key, elt) in map {
                    let merged = match acc.remove(&key) {
                        Some(existing) => fold(existing, std::iter::once(elt), stop),
                        None => elt,
                    };
                    acc.insert(key, merged);
                }
            }
            T::from_shape(Shape::Map(acc))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn json(value: serde_json::Value) -> Value {
        Value::from(value)
    }

    fn merge_all(values: &[Value]) -> Option<Value> {
        merge(values.iter().map(Some))
    }

    #[test]
    fn test_single_terminal() {
        assert_eq!(merge_all(&[Value::from("Hello!")]), Some(Value::from("Hello!")));
        assert_eq!(merge_all(&[Value::Bool(true)]), Some(Value::Bool(true)));
        assert_eq!(merge_all(&[Value::Null]), Some(Value::Null));
    }

    #[test]
    fn test_terminals_short_circuit() {
        assert_eq!(
            merge_all(&[Value::from("Hello!"), Value::from("Goodbye!")]),
            Some(Value::from("Hello!"))
        );
        assert_eq!(merge_all(&[Value::Bool(false), Value::Bool(true)]), Some(Value::Bool(false)));
        assert_eq!(merge_all(&[Value::Null, Value::Bool(false)]), Some(Value::Null));
        assert_eq!(
            merge_all(&[Value::Integer(1), json(serde_json::json!({ "a": 1 }))]),
            Some(Value::Integer(1))
        );
    }

    #[test]
    fn test_all_undefined() {
        assert_eq!(merge::<Value, _>([None, None]), None);
        assert_eq!(merge::<Value, _>([]), None);
    }

    #[test]
    fn test_skips_undefined() {
        let b = Value::from("b");
        assert_eq!(merge([None, Some(&b)]), Some(b.clone()));
    }

    #[test]
    fn test_merges_mappings() {
        let a = json(serde_json::json!({ "a": "a", "c": "c" }));
        let b = json(serde_json::json!({ "b": "b", "d": "d", "c": "Booga!" }));
        assert_eq!(
            merge([Some(&a), Some(&b)]),
            Some(json(serde_json::json!({ "a": "a", "b": "b", "c": "c", "d": "d" })))
        );
    }

    #[test]
    fn test_concatenates_sequences() {
        let a = json(serde_json::json!([1, 2, 3]));
        let b = json(serde_json::json!([4, 5, 6]));
        assert_eq!(merge([Some(&a), Some(&b)]), Some(json(serde_json::json!([1, 2, 3, 4, 5, 6]))));
    }

    #[test]
    fn test_appends_terminals_to_sequence() {
        let merged = merge_all(&[
            json(serde_json::json!(["a", "b", "c"])),
            Value::from("d"),
            Value::from("e"),
        ]);
        assert_eq!(merged, Some(json(serde_json::json!(["a", "b", "c", "d", "e"]))));
    }

    #[test]
    fn test_appends_mapping_to_sequence() {
        let merged = merge_all(&[json(serde_json::json!([1])), json(serde_json::json!({ "x": 2 }))]);
        assert_eq!(merged, Some(json(serde_json::json!([1, { "x": 2 }]))));
    }

    #[test]
    fn test_mapping_ignores_other_shapes() {
        let merged = merge_all(&[
            json(serde_json::json!({ "a": 1 })),
            Value::from("ignored"),
            json(serde_json::json!([1, 2])),
            json(serde_json::json!({ "b": 2 })),
        ]);
        assert_eq!(merged, Some(json(serde_json::json!({ "a": 1, "b": 2 }))));
    }

    #[test]
    fn test_merges_deeply() {
        let a = json(serde_json::json!({
            "a": "a",
            "b": { "c": "c", "d": "d" },
            "e": [1, 2, 3]
        }));
        let b = json(serde_json::json!({
            "a": "a",
            "b": { "c": "e", "f": "f" },
            "e": ["four", "five", "six"],
            "g": true
        }));
        assert_eq!(
            merge([Some(&a), Some(&b)]),
            Some(json(serde_json::json!({
                "a": "a",
                "b": { "c": "c", "d": "d", "f": "f" },
                "e": [1, 2, 3, "four", "five", "six"],
                "g": true
            })))
        );
    }

    #[test]
    fn test_inputs_are_untouched() {
        let a = json(serde_json::json!({ "list": [1], "nested": { "x": 1 } }));
        let b = json(serde_json::json!({ "list": [2], "nested": { "y": 2 } }));
        let (a_before, b_before) = (a.clone(), b.clone());

        let _ = merge([Some(&a), Some(&b)]);

        assert_eq!(a, a_before);
        assert_eq!(b, b_before);
    }

    #[test]
    fn test_stop_predicate_keeps_values_opaque() {
        let opaque = |v: &Value| v.as_map().is_some_and(|m| m.contains_key("opaque"));
        let marked = json(serde_json::json!({ "opaque": true }));

        let seq = json(serde_json::json!([0]));
        let merged = merge_with([Some(&seq), Some(&marked)], opaque);
        assert_eq!(merged, Some(json(serde_json::json!([0, { "opaque": true }]))));

        let map = json(serde_json::json!({ "a": 1 }));
        let merged = merge_with([Some(&map), Some(&marked)], opaque);
        assert_eq!(merged, Some(map.clone()));

        let merged = merge_with([Some(&marked), Some(&map)], opaque);
        assert_eq!(merged, Some(marked.clone()));
    }
}
