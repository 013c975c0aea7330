use elsa::FrozenIndexSet;
use rustc_hash::FxHashMap;
use std::cell::Cell;
use std::convert::TryInto;
use std::hash::Hash;
use std::ops::{Deref, DerefMut};

/// Context object with global resources for a `tilir` module.
///
/// Those resources currently are:
/// * interners, for anything without an identity, and which can be deduplicated
/// * "entity" allocators, for everything else - i.e. anything with an identity
///   that needs to remain unique across an entire `Context`
///   * the *definition* of an entity isn't kept in the `Context`, but rather in
///     some `EntityDefs` collection somewhere in a `Module` (or further nested),
///     with only the entity *indices* being allocated by the `Context`
pub struct Context {
    interners: Interners,
    entity_allocs: EntityAllocs,
}

/// Dispatch helper, to allow implementing interning logic on
/// the type passed to `cx.intern(...)`.
pub trait InternInCx<I> {
    #[must_use]
    fn intern_in_cx(self, cx: &Context) -> I;
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    pub fn new() -> Self {
        Context {
            interners: Interners::default(),
            entity_allocs: EntityAllocs::default(),
        }
    }

    pub fn intern<T: InternInCx<I>, I>(&self, x: T) -> I {
        x.intern_in_cx(self)
    }
}

struct Interner<T: ?Sized>(FrozenIndexSet<Box<T>>);

impl<T: ?Sized + Eq + Hash> Default for Interner<T> {
    fn default() -> Self {
        Self(FrozenIndexSet::new())
    }
}

impl<T: ?Sized + Eq + Hash> Interner<T> {
    #[track_caller]
    fn intern(&self, value: impl AsRef<T> + Into<Box<T>>) -> u32 {
        if let Some((i, _)) = self.0.get_full(value.as_ref()) {
            return i as u32;
        }
        let (i, _) = self.0.insert_full(value.into());
        i.try_into().expect("interner overflowed u32")
    }
}

macro_rules! interners {
    (
        needs_as_ref { $($needs_as_ref_ty:ty),* $(,)? }
        $($name:ident => $ty:ty),+ $(,)?
    ) => {
        $(impl AsRef<Self> for $needs_as_ref_ty {
            fn as_ref(&self) -> &Self {
                self
            }
        })*

        #[allow(non_snake_case)]
        #[derive(Default)]
        struct Interners {
            $($name: Interner<$ty>),*
        }

        $(
            // NOTE: never derive `PartialOrd, Ord` for these types, as
            // observing the interning order shouldn't be allowed.
            #[derive(Copy, Clone, PartialEq, Eq, Hash)]
            pub struct $name(u32);

            impl std::ops::Index<$name> for Context {
                type Output = $ty;

                fn index(&self, interned: $name) -> &Self::Output {
                    &self.interners.$name.0[interned.0 as usize]
                }
            }
        )*
    };
}

interners! {
    needs_as_ref {
        crate::TypeDef,
        crate::ConstDef,
    }

    InternedStr => str,
    Type => crate::TypeDef,
    Const => crate::ConstDef,
}

impl InternInCx<InternedStr> for &'_ str {
    fn intern_in_cx(self, cx: &Context) -> InternedStr {
        InternedStr(cx.interners.InternedStr.intern(self))
    }
}

impl InternInCx<InternedStr> for String {
    fn intern_in_cx(self, cx: &Context) -> InternedStr {
        InternedStr(cx.interners.InternedStr.intern(self))
    }
}

impl InternInCx<Type> for crate::TypeDef {
    fn intern_in_cx(self, cx: &Context) -> Type {
        Type(cx.interners.Type.intern(self))
    }
}

impl InternInCx<Const> for crate::ConstDef {
    fn intern_in_cx(self, cx: &Context) -> Const {
        Const(cx.interners.Const.intern(self))
    }
}

/// Collection holding the actual definitions for `Context`-allocated entities.
///
/// By design there is no way to iterate the contents of an `EntityDefs`, or
/// generate entity indices without defining the entity in an `EntityDefs`
/// (ordered traversal goes through e.g. [`EntityList`]s instead).
pub struct EntityDefs<E: sealed::Entity> {
    // FIXME: use more efficient storage by optimizing for compact ranges,
    // allowing the use of `Vec` (plus the base index) for the fast path, and
    // keeping the map as a fallback.
    map: FxHashMap<E, E::Def>,
}

impl<E: sealed::Entity> Default for EntityDefs<E> {
    fn default() -> Self {
        Self {
            map: FxHashMap::default(),
        }
    }
}

impl<E: sealed::Entity> EntityDefs<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define(&mut self, cx: &Context, def: E::Def) -> E {
        let entity = E::alloc(cx);
        assert!(self.map.insert(entity, def).is_none());
        entity
    }

    /// Destroy the definition of `entity`, which must not be used afterwards.
    ///
    /// For entities that can be part of an [`EntityList`], `entity` has to be
    /// removed from its list first (as the neighbors would be left dangling).
    #[track_caller]
    pub fn remove(&mut self, entity: E) -> E::Def {
        self.map
            .remove(&entity)
            .expect("EntityDefs::remove: entity not defined (or already removed)")
    }

    /// Returns `true` iff `entity` is (still) defined in `self`.
    pub fn contains(&self, entity: E) -> bool {
        self.map.contains_key(&entity)
    }
}

impl<E: sealed::Entity> std::ops::Index<E> for EntityDefs<E> {
    type Output = E::Def;

    #[track_caller]
    fn index(&self, entity: E) -> &Self::Output {
        &self.map[&entity]
    }
}

impl<E: sealed::Entity> std::ops::IndexMut<E> for EntityDefs<E> {
    #[track_caller]
    fn index_mut(&mut self, entity: E) -> &mut Self::Output {
        self.map.get_mut(&entity).expect("EntityDefs: entity not defined")
    }
}

mod sealed {
    use super::Context;
    use std::hash::Hash;

    pub trait Entity: Copy + Eq + Hash + 'static {
        type Def;

        fn alloc(cx: &Context) -> Self;
    }
}

macro_rules! entities {
    (
        $($name:ident => $def:ty),+ $(,)?
    ) => {
        #[allow(non_snake_case)]
        #[derive(Default)]
        struct EntityAllocs {
            $($name: Cell<u32>),*
        }

        $(
            // NOTE: never derive `PartialOrd, Ord` for these types, as
            // observing the entity index allocation order shouldn't be allowed.
            #[derive(Copy, Clone, PartialEq, Eq, Hash)]
            pub struct $name(u32);

            impl sealed::Entity for $name {
                type Def = $def;

                fn alloc(cx: &Context) -> Self {
                    let idx = cx.entity_allocs.$name.get();
                    let next_idx = idx.checked_add(1).expect("entity index overflowed u32");
                    cx.entity_allocs.$name.set(next_idx);
                    $name(idx)
                }
            }

            #[cfg(test)]
            #[allow(dead_code)]
            impl $name {
                /// Allocation order, only observable by tests (e.g. to check
                /// that one pass created its entities before another's).
                pub(crate) fn alloc_index(self) -> u32 {
                    self.0
                }
            }
        )*
    };
}

entities! {
    Func => crate::FuncDecl,
    Block => crate::BlockDef,
    DataInst => EntityListNode<DataInst, crate::DataInstDef>,
}

/// Doubly-linked list, "intrusively" going through `E::Def`, which must be an
/// `EntityListNode<E, _>` (to hold the "previous/next node" links).
///
/// Fields are private to avoid arbitrary user interactions.
#[derive(Copy, Clone)]
pub struct EntityList<E: sealed::Entity>(Option<FirstLast<E, E>>);

// HACK: this only exists to give field names to the non-empty case.
#[derive(Copy, Clone)]
struct FirstLast<F, L> {
    first: F,
    last: L,
}

impl<E: sealed::Entity> Default for EntityList<E> {
    fn default() -> Self {
        Self(None)
    }
}

impl<E: sealed::Entity<Def = EntityListNode<E, D>>, D> EntityList<E> {
    pub fn empty() -> Self {
        Self(None)
    }

    pub fn is_empty(self) -> bool {
        self.0.is_none()
    }

    pub fn iter(self) -> EntityListIter<E> {
        EntityListIter {
            first: self.0.map(|list| list.first),
            last: self.0.map(|list| list.last),
        }
    }

    /// Insert `new_node` (defined in `defs`) at the start of `self`.
    #[track_caller]
    pub fn insert_first(&mut self, new_node: E, defs: &mut EntityDefs<E>) {
        let new_node_def = &mut defs[new_node];
        assert!(
            new_node_def.prev.is_none() && new_node_def.next.is_none(),
            "EntityList::insert_first: new node already linked into a (different?) list"
        );

        new_node_def.next = self.0.map(|this| this.first);
        if let Some(old_first) = new_node_def.next {
            let old_first_def = &mut defs[old_first];

            // FIXME: this situation should be impossible anyway, as it
            // involves the `EntityListNode`s links, which should be unforgeable,
            // but it's still possible to keep around outdated `EntityList`s
            // (should `EntityList` not implement `Copy`/`Clone` *at all*?)
            assert!(
                old_first_def.prev.is_none(),
                "invalid EntityList: `first->prev != None`"
            );

            old_first_def.prev = Some(new_node);
        }

        self.0 = Some(FirstLast {
            first: new_node,
            last: self.0.map_or(new_node, |this| this.last),
        });
    }

    /// Insert `new_node` (defined in `defs`) at the end of `self`.
    #[track_caller]
    pub fn insert_last(&mut self, new_node: E, defs: &mut EntityDefs<E>) {
        let new_node_def = &mut defs[new_node];
        assert!(
            new_node_def.prev.is_none() && new_node_def.next.is_none(),
            "EntityList::insert_last: new node already linked into a (different?) list"
        );

        new_node_def.prev = self.0.map(|this| this.last);
        if let Some(old_last) = new_node_def.prev {
            let old_last_def = &mut defs[old_last];

            // FIXME: this situation should be impossible anyway, as it
            // involves the `EntityListNode`s links, which should be unforgeable,
            // but it's still possible to keep around outdated `EntityList`s
            // (should `EntityList` not implement `Copy`/`Clone` *at all*?)
            assert!(
                old_last_def.next.is_none(),
                "invalid EntityList: `last->next != None`"
            );

            old_last_def.next = Some(new_node);
        }

        self.0 = Some(FirstLast {
            first: self.0.map_or(new_node, |this| this.first),
            last: new_node,
        });
    }

    /// Insert `new_node` (defined in `defs`) into `self`, before `next`.
    //
    // FIXME: unify this with the other insert methods, maybe with a new
    // "insert position" type?
    #[track_caller]
    pub fn insert_before(&mut self, new_node: E, next: E, defs: &mut EntityDefs<E>) {
        let prev = defs[next].prev.replace(new_node);

        let new_node_def = &mut defs[new_node];
        assert!(
            new_node_def.prev.is_none() && new_node_def.next.is_none(),
            "EntityList::insert_before: new node already linked into a (different?) list"
        );
        new_node_def.prev = prev;
        new_node_def.next = Some(next);

        match prev {
            Some(prev) => {
                let old_prev_next = defs[prev].next.replace(new_node);

                // FIXME: this situation should be impossible anyway, as it
                // involves the `EntityListNode`s links, which should be unforgeable.
                assert!(
                    old_prev_next == Some(next),
                    "invalid EntityListNode: `node->prev->next != node`"
                );
            }
            None => {
                // FIXME: this situation should be impossible anyway, as it
                // involves the `EntityListNode`s links, which should be unforgeable,
                // but it's still possible to keep around outdated `EntityList`s
                // (should `EntityList` not implement `Copy`/`Clone` *at all*?)
                assert!(
                    self.0.map(|this| this.first) == Some(next),
                    "invalid EntityList: `node->prev == None` but `node != first`"
                );

                self.0.as_mut().unwrap().first = new_node;
            }
        }
    }

    /// Insert `new_node` (defined in `defs`) into `self`, after `prev`.
    #[track_caller]
    pub fn insert_after(&mut self, new_node: E, prev: E, defs: &mut EntityDefs<E>) {
        let next = defs[prev].next.replace(new_node);

        let new_node_def = &mut defs[new_node];
        assert!(
            new_node_def.prev.is_none() && new_node_def.next.is_none(),
            "EntityList::insert_after: new node already linked into a (different?) list"
        );
        new_node_def.prev = Some(prev);
        new_node_def.next = next;

        match next {
            Some(next) => {
                let old_next_prev = defs[next].prev.replace(new_node);

                // FIXME: this situation should be impossible anyway, as it
                // involves the `EntityListNode`s links, which should be unforgeable.
                assert!(
                    old_next_prev == Some(prev),
                    "invalid EntityListNode: `node->next->prev != node`"
                );
            }
            None => {
                assert!(
                    self.0.map(|this| this.last) == Some(prev),
                    "invalid EntityList: `node->next == None` but `node != last`"
                );

                self.0.as_mut().unwrap().last = new_node;
            }
        }
    }

    /// Remove `node` (defined in `defs`) from `self`.
    ///
    /// `node` remains defined in `defs`, unlinked from any list.
    #[track_caller]
    pub fn remove(&mut self, node: E, defs: &mut EntityDefs<E>) {
        // Unlink `node->{prev,next}` first (also allowing re-insertion elsewhere).
        let (prev, next) = {
            let node_def = &mut defs[node];
            (node_def.prev.take(), node_def.next.take())
        };

        // Unlink `prev->next = node` (or validate `first = node`).
        match prev {
            Some(prev) => {
                let old_prev_next = std::mem::replace(&mut defs[prev].next, next);

                // FIXME: this situation should be impossible anyway, as it
                // involves the `EntityListNode`s links, which should be unforgeable.
                assert!(
                    old_prev_next == Some(node),
                    "invalid EntityListNode: `node->prev->next != node`"
                );
            }
            None => {
                assert!(
                    self.0.map(|this| this.first) == Some(node),
                    "invalid EntityList: `node->prev == None` but `node != first`"
                );
            }
        }

        // Unlink `next->prev = node` (or validate `last = node`).
        match next {
            Some(next) => {
                let old_next_prev = std::mem::replace(&mut defs[next].prev, prev);

                // FIXME: this situation should be impossible anyway, as it
                // involves the `EntityListNode`s links, which should be unforgeable.
                assert!(
                    old_next_prev == Some(node),
                    "invalid EntityListNode: `node->next->prev != node`"
                );
            }
            None => {
                assert!(
                    self.0.map(|this| this.last) == Some(node),
                    "invalid EntityList: `node->next == None` but `node != last`"
                );
            }
        }

        // Update list end-points (overwritten `first`/`last` validated above).
        match (prev, next) {
            (None, None) => self.0 = None,
            _ => {
                let this = self.0.as_mut().unwrap();
                if prev.is_none() {
                    this.first = next.unwrap();
                }
                if next.is_none() {
                    this.last = prev.unwrap();
                }
            }
        }
    }
}

/// [`EntityList<E>`] iterator, but with a different API than [`Iterator`].
///
/// This can also be considered a (non-random-access) "subslice" of the list.
///
/// Splitting off an element (see [`split_first`](Self::split_first) and
/// [`split_last`](Self::split_last)) reads the link to its neighbor *before*
/// handing it out, so the element can then be removed from the list, or have
/// new elements inserted next to it, without affecting the rest of the iteration
/// (nodes inserted next to a split off element are never visited).
#[derive(Copy, Clone)]
pub struct EntityListIter<E: sealed::Entity> {
    pub first: Option<E>,
    pub last: Option<E>,
}

impl<E: sealed::Entity<Def = EntityListNode<E, D>>, D> EntityListIter<E> {
    #[track_caller]
    pub fn split_first(self, defs: &EntityDefs<E>) -> Option<(E, Self)> {
        let Self { first, last } = self;
        let first = first?;
        let last = last.expect("invalid EntityListIter: `first` without `last`");

        if first == last {
            return Some((first, Self { first: None, last: None }));
        }

        let next = defs[first]
            .next
            .expect("invalid EntityListIter: `first` not linked to `last`");
        Some((first, Self { first: Some(next), last: Some(last) }))
    }

    #[track_caller]
    pub fn split_last(self, defs: &EntityDefs<E>) -> Option<(E, Self)> {
        let Self { first, last } = self;
        let last = last?;
        let first = first.expect("invalid EntityListIter: `last` without `first`");

        if first == last {
            return Some((last, Self { first: None, last: None }));
        }

        let prev = defs[last]
            .prev
            .expect("invalid EntityListIter: `last` not linked to `first`");
        Some((last, Self { first: Some(first), last: Some(prev) }))
    }
}

/// `EntityList<E>` node, containing `D` (which can be accessed via `Deref`/`DerefMut`)
/// and the links to the previous/next nodes in the list (if any).
#[derive(Clone)]
pub struct EntityListNode<E: sealed::Entity<Def = Self>, D> {
    prev: Option<E>,
    next: Option<E>,

    inner_def: D,
}

impl<E: sealed::Entity<Def = Self>, D> From<D> for EntityListNode<E, D> {
    fn from(inner_def: D) -> Self {
        Self { prev: None, next: None, inner_def }
    }
}

impl<E: sealed::Entity<Def = Self>, D> EntityListNode<E, D> {
    /// Returns `true` iff this node is linked to another node (of some list).
    ///
    /// **Note**: a list with a single node has no links, so the only node of a
    /// single-element list is indistinguishable from a detached node.
    pub fn has_neighbors(&self) -> bool {
        self.prev.is_some() || self.next.is_some()
    }

    pub fn into_inner_def(self) -> D {
        self.inner_def
    }
}

impl<E: sealed::Entity<Def = Self>, D> Deref for EntityListNode<E, D> {
    type Target = D;
    fn deref(&self) -> &D {
        &self.inner_def
    }
}

impl<E: sealed::Entity<Def = Self>, D> DerefMut for EntityListNode<E, D> {
    fn deref_mut(&mut self) -> &mut D {
        &mut self.inner_def
    }
}
