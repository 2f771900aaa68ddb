use serde::Serialize;
use std::fmt;
use std::marker::PhantomData;

/// A typed wrapper around a `String` name, so e.g. a resource name and a router name
/// can never be accidentally swapped even though both are plain strings on the wire.
///
/// Mirrors the teacher repository's tagged-id pattern (`Id<T>` over a `PhantomData` marker)
/// rather than introducing one bare `String` per id kind.
#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Hash, Serialize)]
pub struct Name<T> {
    pub name: String,
    _marker: PhantomData<T>,
}

impl<T> Name<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Name { name: name.into(), _marker: PhantomData }
    }
}

impl<T> fmt::Display for Name<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl<T> fmt::Debug for Name<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let full_name = std::any::type_name::<T>();
        let clean_name = full_name.split("::").last().unwrap_or(full_name);
        write!(f, "{}({:?})", clean_name, self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityNameTag;
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeIdTag;

pub type EntityName = Name<EntityNameTag>;
/// Identifier of a physical node/machine as it appears in failure and topology traces.
pub type NodeId = Name<NodeIdTag>;

slotmap::new_key_type! {
    /// Stable id of a registered entity, handed out by the engine at registration time.
    pub struct EntityId;
}

/// Sender-assigned correlation id carried on every AR request so the initiator can match
/// an asynchronous `RETURN_AR_*` reply back to the request that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TransactionId(pub u64);

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn-{}", self.0)
    }
}

/// Monotonically increasing allocator for `TransactionId`s, one per submitting entity.
#[derive(Debug, Default)]
pub struct TransactionIdAllocator {
    next: u64,
}

impl TransactionIdAllocator {
    pub fn next(&mut self) -> TransactionId {
        let id = TransactionId(self.next);
        self.next += 1;
        id
    }
}
