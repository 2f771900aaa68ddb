use crate::engine::core::Engine;
use crate::engine::event::{Event, Payload, Tag};
use crate::engine::ids::{EntityId, EntityName};

/// A single participant in the simulation: a resource, the GIS, a failure injector, a
/// statistics sink, or a user/broker. Registered once with the [`Engine`] and driven
/// entirely through [`Entity::on_event`] afterward — there is no background task and
/// no real thread backing it.
pub trait Entity {
    fn name(&self) -> &EntityName;

    /// Called once, at simulation time 0, before any event is delivered. The default
    /// implementation does nothing.
    fn start(&mut self, ctx: &mut EntityContext) {
        let _ = ctx;
    }

    /// Called once per event delivered to this entity, in nondecreasing simulated-time
    /// order. `event` has already been appended to the entity's deferred queue; this
    /// hook typically pulls it straight back out with [`EntityContext::get_next_event`]
    /// using a predicate, exactly as an event-driven resource or broker would.
    fn on_event(&mut self, ctx: &mut EntityContext, event: Event);

    /// Called once after the entity is marked terminated (either it requested
    /// [`EntityContext::terminate`] or the engine is shutting down). Default no-op.
    fn on_shutdown(&mut self, ctx: &mut EntityContext) {
        let _ = ctx;
    }
}

/// The handle an [`Entity`] uses to interact with the rest of the simulation while
/// handling one event: send/schedule further events, read the virtual clock, pull
/// matching events out of its own deferred queue, and resolve other entities by name.
///
/// Borrows the [`Engine`] mutably and also knows which entity is "self" for this call,
/// so `schedule` with a zero delay targeting `self.id()` behaves like the classic
/// self-scheduled wakeup used for timeouts and periodic polling.
pub struct EntityContext<'a> {
    engine: &'a mut Engine,
    id: EntityId,
}

impl<'a> EntityContext<'a> {
    pub(crate) fn new(engine: &'a mut Engine, id: EntityId) -> Self {
        EntityContext { engine, id }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn now(&self) -> f64 {
        self.engine.now()
    }

    /// Resolves a registered entity's id by name, for destinations learned only as a
    /// string (e.g. read out of a scenario file or a GIS resource list).
    pub fn lookup_id(&self, name: &EntityName) -> Option<EntityId> {
        self.engine.lookup_id(name)
    }

    /// Schedules `payload` tagged `tag` for delivery to `dest` after `delay` simulated
    /// seconds (must be `>= 0`). Returns the sequence number assigned, mostly useful in
    /// tests asserting delivery order.
    pub fn schedule(&mut self, dest: EntityId, delay: f64, tag: Tag, payload: Payload) -> u64 {
        self.engine.schedule(self.id, dest, delay, tag, payload, None)
    }

    pub fn schedule_with_transaction(&mut self, dest: EntityId, delay: f64, tag: Tag, payload: Payload, transaction_id: crate::engine::ids::TransactionId) -> u64 {
        self.engine.schedule(self.id, dest, delay, tag, payload, Some(transaction_id))
    }

    /// Self-schedules a `Wakeup` event after `delay` seconds, the idiom resources use to
    /// poll a timeline or retry an admission test without blocking the whole engine.
    pub fn pause(&mut self, delay: f64) {
        self.engine.schedule(self.id, self.id, delay, Tag::Wakeup, Payload::None, None);
    }

    /// Pops the first event in this entity's deferred queue matching `predicate`,
    /// leaving every other queued event untouched and in order. Mirrors the
    /// predicate-matched receive used throughout the allocation/AR policies to pick a
    /// specific reply out of a backlog of unrelated traffic.
    pub fn get_next_event<F>(&mut self, predicate: F) -> Option<Event>
    where
        F: Fn(&Event) -> bool,
    {
        self.engine.take_deferred(self.id, predicate)
    }

    /// Non-destructively checks whether any deferred event matches `predicate`.
    pub fn peek_event<F>(&self, predicate: F) -> bool
    where
        F: Fn(&Event) -> bool,
    {
        self.engine.peek_deferred(self.id, predicate)
    }

    /// Marks this entity terminated; it receives no further events and its
    /// `on_shutdown` hook runs at the next opportunity.
    pub fn terminate(&mut self) {
        self.engine.terminate(self.id);
    }
}
