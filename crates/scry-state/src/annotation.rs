// SPDX-License-Identifier: AGPL-3.0

//! State annotations and the per-state annotation table

use indexmap::map::Entry;
use indexmap::IndexMap;
use scry_exceptions::{ScryException, ScryResult};
use std::any::{Any, TypeId};
use std::fmt::Debug;

/// Upcast helper so annotations can be downcast to their concrete type.
pub trait AsAny {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Mutable, typed side-information attached to an execution state.
///
/// The two persistence flags describe how far the annotation travels:
/// across an external call boundary inside one transaction, and into the
/// world state when the transaction commits. [`duplicate`](Self::duplicate)
/// decides what happens on a fork. The default returns `None` and the
/// annotation is dropped from every child: losing optional information is
/// preferred over two branches sharing one mutable value.
pub trait StateAnnotation: AsAny + Debug + Send + Sync + 'static {
    fn persist_to_world_state(&self) -> bool {
        false
    }

    fn persist_over_calls(&self) -> bool {
        false
    }

    /// Distinguishes several annotations of the same type on one state.
    /// `None` means at most one instance of the type per state.
    fn discriminator(&self) -> Option<String> {
        None
    }

    /// An independent copy for a forked state, or `None` to drop it.
    fn duplicate(&self) -> Option<Box<dyn StateAnnotation>> {
        None
    }
}

impl dyn StateAnnotation {
    pub fn downcast_ref<T: StateAnnotation>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    pub fn downcast_mut<T: StateAnnotation>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut::<T>()
    }

    pub fn is<T: StateAnnotation>(&self) -> bool {
        self.as_any().is::<T>()
    }
}

/// Slot key of an annotation: its concrete type plus optional discriminator
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AnnotationKey {
    type_id: TypeId,
    discriminator: Option<String>,
}

impl AnnotationKey {
    pub fn of(annotation: &dyn StateAnnotation) -> Self {
        Self {
            type_id: annotation.as_any().type_id(),
            discriminator: annotation.discriminator(),
        }
    }

    /// Key of the undiscriminated slot of `T`
    pub fn for_type<T: StateAnnotation>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            discriminator: None,
        }
    }

    pub fn for_discriminated<T: StateAnnotation>(discriminator: impl Into<String>) -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            discriminator: Some(discriminator.into()),
        }
    }
}

/// Ordered annotation table of one state
#[derive(Debug, Default)]
pub struct Annotations {
    slots: IndexMap<AnnotationKey, Box<dyn StateAnnotation>>,
}

impl Annotations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Attach an annotation, replacing the one already in its slot.
    pub fn insert(&mut self, annotation: Box<dyn StateAnnotation>) -> Option<Box<dyn StateAnnotation>> {
        let key = AnnotationKey::of(&*annotation);
        self.slots.insert(key, annotation)
    }

    /// The annotation of type `T` whose discriminator is `None`.
    ///
    /// Annotations that report a discriminator live in their own slots and
    /// are only reachable through [`get_discriminated`](Self::get_discriminated)
    /// or [`of_type`](Self::of_type); for such a type this returns `None`.
    pub fn get<T: StateAnnotation>(&self) -> Option<&T> {
        self.slots
            .get(&AnnotationKey::for_type::<T>())
            .and_then(|annotation| (**annotation).downcast_ref::<T>())
    }

    pub fn get_mut<T: StateAnnotation>(&mut self) -> Option<&mut T> {
        self.slots
            .get_mut(&AnnotationKey::for_type::<T>())
            .and_then(|annotation| (**annotation).downcast_mut::<T>())
    }

    /// The annotation of type `T` with discriminator `discriminator`
    pub fn get_discriminated<T: StateAnnotation>(&self, discriminator: &str) -> Option<&T> {
        self.slots
            .get(&AnnotationKey::for_discriminated::<T>(discriminator))
            .and_then(|annotation| (**annotation).downcast_ref::<T>())
    }

    /// The annotation of type `T`, attaching `T::default()` first if absent.
    /// Fails for a type whose default reports a discriminator, since the
    /// created value would not belong in the undiscriminated slot.
    pub fn get_or_create<T: StateAnnotation + Default>(&mut self) -> ScryResult<&mut T> {
        let slot = match self.slots.entry(AnnotationKey::for_type::<T>()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let created = T::default();
                if let Some(discriminator) = created.discriminator() {
                    return Err(ScryException::Internal(format!(
                        "{} is discriminated ({}), attach it with insert",
                        std::any::type_name::<T>(),
                        discriminator
                    )));
                }
                entry.insert(Box::new(created))
            }
        };
        (**slot).downcast_mut::<T>().ok_or_else(|| {
            ScryException::Internal(format!(
                "annotation slot for {} holds another type",
                std::any::type_name::<T>()
            ))
        })
    }

    /// Every annotation of type `T`, whatever its discriminator
    pub fn of_type<T: StateAnnotation>(&self) -> impl Iterator<Item = &T> {
        self.slots
            .values()
            .filter_map(|annotation| (**annotation).downcast_ref::<T>())
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn StateAnnotation> {
        self.slots.values().map(|annotation| &**annotation)
    }

    /// Copies for a forked state, one `duplicate` call per annotation.
    pub fn fork(&self) -> Annotations {
        self.duplicate_where(|_| true)
    }

    /// Copies of the annotations matching `keep`; the rest are left behind.
    pub fn duplicate_where<F>(&self, keep: F) -> Annotations
    where
        F: Fn(&dyn StateAnnotation) -> bool,
    {
        let mut copies = Annotations::new();
        for (key, annotation) in &self.slots {
            if !keep(&**annotation) {
                continue;
            }
            match annotation.duplicate() {
                Some(copy) => {
                    copies.slots.insert(key.clone(), copy);
                }
                None => {
                    tracing::trace!(annotation = ?annotation, "annotation has no duplication rule, dropped");
                }
            }
        }
        copies
    }

    /// Move every annotation of `other` in, replacing same-slot entries.
    pub fn absorb(&mut self, other: Annotations) {
        self.slots.extend(other.slots);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, Clone)]
    struct Counter {
        hits: Vec<usize>,
    }

    impl StateAnnotation for Counter {
        fn duplicate(&self) -> Option<Box<dyn StateAnnotation>> {
            Some(Box::new(self.clone()))
        }
    }

    #[derive(Debug)]
    struct Scratch;

    impl StateAnnotation for Scratch {}

    #[derive(Debug, Clone)]
    struct Tagged(&'static str);

    impl StateAnnotation for Tagged {
        fn discriminator(&self) -> Option<String> {
            Some(self.0.to_string())
        }

        fn duplicate(&self) -> Option<Box<dyn StateAnnotation>> {
            Some(Box::new(self.clone()))
        }
    }

    #[test]
    fn test_get_or_create_is_idempotent() {
        let mut annotations = Annotations::new();
        annotations.get_or_create::<Counter>().unwrap().hits.push(1);
        annotations.get_or_create::<Counter>().unwrap().hits.push(2);

        assert_eq!(annotations.len(), 1);
        assert_eq!(annotations.get::<Counter>().unwrap().hits, vec![1, 2]);
    }

    #[test]
    fn test_insert_replaces_same_slot() {
        let mut annotations = Annotations::new();
        annotations.insert(Box::new(Counter { hits: vec![1] }));
        let old = annotations.insert(Box::new(Counter { hits: vec![7] }));

        assert!(old.unwrap().is::<Counter>());
        assert_eq!(annotations.get::<Counter>().unwrap().hits, vec![7]);
    }

    #[test]
    fn test_fork_copies_are_independent() {
        let mut parent = Annotations::new();
        parent.get_or_create::<Counter>().unwrap().hits.push(10);

        let mut child = parent.fork();
        child.get_mut::<Counter>().unwrap().hits.push(20);

        assert_eq!(parent.get::<Counter>().unwrap().hits, vec![10]);
        assert_eq!(child.get::<Counter>().unwrap().hits, vec![10, 20]);
    }

    #[test]
    fn test_fork_drops_annotations_without_duplication_rule() {
        let mut parent = Annotations::new();
        parent.insert(Box::new(Scratch));
        parent.insert(Box::new(Counter::default()));

        let child = parent.fork();
        assert_eq!(child.len(), 1);
        assert!(child.get::<Scratch>().is_none());
        assert!(child.get::<Counter>().is_some());
    }

    #[test]
    fn test_discriminated_slots_coexist() {
        let mut annotations = Annotations::new();
        annotations.insert(Box::new(Tagged("a")));
        annotations.insert(Box::new(Tagged("b")));
        annotations.insert(Box::new(Tagged("a")));

        assert_eq!(annotations.len(), 2);
        let tags: Vec<_> = annotations.of_type::<Tagged>().map(|t| t.0).collect();
        assert_eq!(tags, vec!["a", "b"]);
    }

    #[derive(Debug, Default)]
    struct Keyed;

    impl StateAnnotation for Keyed {
        fn discriminator(&self) -> Option<String> {
            Some("k".to_string())
        }
    }

    #[test]
    fn test_discriminated_lookup() {
        let mut annotations = Annotations::new();
        annotations.insert(Box::new(Tagged("a")));
        annotations.insert(Box::new(Tagged("b")));

        assert!(annotations.get::<Tagged>().is_none());
        assert_eq!(annotations.get_discriminated::<Tagged>("b").unwrap().0, "b");
        assert!(annotations.get_discriminated::<Tagged>("c").is_none());
        assert_eq!(annotations.of_type::<Tagged>().count(), 2);

        assert!(matches!(
            annotations.get_or_create::<Keyed>(),
            Err(ScryException::Internal(_))
        ));
        assert_eq!(annotations.len(), 2);
    }
}
