//! The "inherit" sentinel and the two resolution rules built on top of it:
//! list-splice for sequence-valued fields, first-non-inherit-wins for
//! scalars.

use std::sync::Arc;

use crate::config::Config;

/// A scalar configurable field: either an explicit value, or a request to
/// defer to the parent chain.
#[derive(Debug, Clone)]
pub enum Scalar<T> {
    /// Defer resolution to the nearest parent that has an explicit value, or
    /// to the factory default if the parent chain is exhausted.
    Inherit,
    /// An explicit value, resolved here.
    Value(T),
}

impl<T> Scalar<T> {
    /// Resolve against an ordered parent chain (nearest first). `accessor`
    /// reads the same field off a parent; `factory_default` supplies the
    /// value used once the chain is exhausted without finding an explicit
    /// value.
    ///
    /// Returns the resolved value plus whether it was actually set somewhere
    /// in the chain (`true`) or fell all the way through to the factory
    /// default (`false`) — callers like the shared-cache inherit switch care
    /// about that distinction, not just the final value.
    pub fn resolve(
        &self,
        parents: &[Arc<Config>],
        accessor: &dyn Fn(&Config) -> Scalar<T>,
        factory_default: &dyn Fn() -> T,
    ) -> (T, bool)
    where
        T: Clone,
    {
        match self {
            Scalar::Value(v) => (v.clone(), true),
            Scalar::Inherit => match parents.split_first() {
                Some((next, rest)) => accessor(next).resolve(rest, accessor, factory_default),
                None => (factory_default(), false),
            },
        }
    }
}

/// One entry of a sequence-valued configurable field (providers, directories,
/// exports): either a literal value, or the inherit sentinel, which may
/// appear anywhere in the list (not just as the sole entry).
#[derive(Debug, Clone)]
pub enum ListItem<T> {
    /// A literal value at this position.
    Value(T),
    /// Splice the parent-resolved list in at this position.
    Inherit,
}

/// A sequence-valued configurable field.
pub type InheritableList<T> = Vec<ListItem<T>>;

/// Resolve a sequence-valued field.
///
/// - No `Inherit` entries: use the list as-is.
/// - Exactly `[Inherit]`: delegate entirely to the next parent (or the
///   factory default, if the chain is exhausted).
/// - `Inherit` mixed with literal entries: splice the parent-resolved list
///   into the position(s) where `Inherit` appears.
pub fn resolve_list<T: Clone>(
    list: &InheritableList<T>,
    parents: &[Arc<Config>],
    accessor: &dyn Fn(&Config) -> InheritableList<T>,
    factory_default: &dyn Fn() -> Vec<T>,
) -> Vec<T> {
    if !list.iter().any(|item| matches!(item, ListItem::Inherit)) {
        return list
            .iter()
            .filter_map(|item| match item {
                ListItem::Value(v) => Some(v.clone()),
                ListItem::Inherit => None,
            })
            .collect();
    }

    let delegate = |parents: &[Arc<Config>]| match parents.split_first() {
        Some((next, rest)) => resolve_list(&accessor(next), rest, accessor, factory_default),
        None => factory_default(),
    };

    if list.len() == 1 {
        return delegate(parents);
    }

    let mut result = Vec::with_capacity(list.len());
    for item in list {
        match item {
            ListItem::Value(v) => result.push(v.clone()),
            ListItem::Inherit => result.extend(delegate(parents)),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_inherit_entries_use_list_as_is() {
        let list: InheritableList<i32> = vec![ListItem::Value(1), ListItem::Value(2)];
        let resolved = resolve_list(&list, &[], &|_| vec![], &|| vec![99]);
        assert_eq!(resolved, vec![1, 2]);
    }

    #[test]
    fn sole_inherit_falls_back_to_factory_default_without_parents() {
        let list: InheritableList<i32> = vec![ListItem::Inherit];
        let resolved = resolve_list(&list, &[], &|_| vec![], &|| vec![7, 8]);
        assert_eq!(resolved, vec![7, 8]);
    }

    #[test]
    fn spliced_inherit_is_inserted_in_place() {
        let list: InheritableList<i32> = vec![
            ListItem::Value(1),
            ListItem::Inherit,
            ListItem::Value(4),
        ];
        // No parents: the spliced-in segment is the factory default.
        let resolved = resolve_list(&list, &[], &|_| vec![], &|| vec![2, 3]);
        assert_eq!(resolved, vec![1, 2, 3, 4]);
    }

    #[test]
    fn scalar_inherit_falls_back_to_factory_default() {
        let scalar: Scalar<i32> = Scalar::Inherit;
        let (value, explicit) = scalar.resolve(&[], &|_| Scalar::Inherit, &|| 42);
        assert_eq!(value, 42);
        assert!(!explicit);
    }

    #[test]
    fn scalar_value_wins_immediately() {
        let scalar: Scalar<i32> = Scalar::Value(5);
        let (value, explicit) = scalar.resolve(&[], &|_| Scalar::Inherit, &|| 42);
        assert_eq!(value, 5);
        assert!(explicit);
    }
}
