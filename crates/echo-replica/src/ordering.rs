// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Total order over local items.

use crate::item::LocalItem;
use serde_json::{Number, Value};
use std::cmp::Ordering as CmpOrdering;

/// Default sort field.
pub const DEFAULT_ORDER_FIELD: &str = "timestamp";

/// Strict weak ordering over items.
pub trait Ordering: Send + Sync {
    /// `true` when `a` sorts strictly before `b`.
    fn less(&self, a: &LocalItem, b: &LocalItem) -> bool;
}

impl<F> Ordering for F
where
    F: Fn(&LocalItem, &LocalItem) -> bool + Send + Sync,
{
    fn less(&self, a: &LocalItem, b: &LocalItem) -> bool {
        self(a, b)
    }
}

/// Ascending order by one payload field.
///
/// Values compare by type rank first (missing/null, bool, number, string,
/// then arrays and objects, which are all equivalent), then by value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldOrder {
    field: String,
}

impl FieldOrder {
    /// Order by `field` ascending.
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
        }
    }

    /// Field used as the sort key.
    pub fn field(&self) -> &str {
        &self.field
    }
}

impl Default for FieldOrder {
    fn default() -> Self {
        Self::new(DEFAULT_ORDER_FIELD)
    }
}

impl Ordering for FieldOrder {
    fn less(&self, a: &LocalItem, b: &LocalItem) -> bool {
        compare_values(a.field(&self.field), b.field(&self.field)) == CmpOrdering::Less
    }
}

fn rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Bool(_)) => 1,
        Some(Value::Number(_)) => 2,
        Some(Value::String(_)) => 3,
        Some(Value::Array(_) | Value::Object(_)) => 4,
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> CmpOrdering {
    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => compare_numbers(x, y),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

fn integer(n: &Number) -> Option<i128> {
    n.as_i64()
        .map(i128::from)
        .or_else(|| n.as_u64().map(i128::from))
}

// Integers compare exactly; f64 only when a float is involved.
fn compare_numbers(x: &Number, y: &Number) -> CmpOrdering {
    if let (Some(x), Some(y)) = (integer(x), integer(y)) {
        return x.cmp(&y);
    }
    let x = x.as_f64().unwrap_or(f64::NAN);
    let y = y.as_f64().unwrap_or(f64::NAN);
    x.total_cmp(&y)
}

/// Comparator used for sorting: `less` both ways, ties broken by `_key`.
///
/// The key tie-break makes the sorted result independent of arrival order.
pub fn total_cmp(ordering: &dyn Ordering, a: &LocalItem, b: &LocalItem) -> CmpOrdering {
    if ordering.less(a, b) {
        CmpOrdering::Less
    } else if ordering.less(b, a) {
        CmpOrdering::Greater
    } else {
        a.key.cmp(&b.key)
    }
}

/// Whether `items` is sorted under [`total_cmp`].
pub fn is_sorted(ordering: &dyn Ordering, items: &[LocalItem]) -> bool {
    items
        .windows(2)
        .all(|pair| total_cmp(ordering, &pair[0], &pair[1]) != CmpOrdering::Greater)
}
