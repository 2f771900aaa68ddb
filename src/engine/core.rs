use std::collections::{BinaryHeap, VecDeque};

use crate::engine::entity::{Entity, EntityContext};
use crate::engine::event::{Event, Payload, Tag};
use crate::engine::ids::{EntityId, EntityName, TransactionId};

struct EntityRecord {
    name: EntityName,
    /// `None` while the entity's own `on_event`/`start` is executing (taken out so the
    /// body can borrow the engine mutably through its [`EntityContext`] at the same
    /// time the engine holds this record); always restored before control returns to
    /// the caller.
    body: Option<Box<dyn Entity>>,
    deferred: VecDeque<Event>,
    terminated: bool,
}

/// The discrete-event kernel: a monotonic virtual clock, a future-event list ordered by
/// `(delivery_time, sequence)`, and a registry of entities each holding their own
/// deferred queue.
///
/// Single-threaded and synchronous by design: there is exactly one call stack, so an
/// entity's `on_event` always runs to completion (including any sends it makes) before
/// the next event anywhere in the simulation is processed. This keeps the model
/// deterministic without needing real concurrency primitives.
pub struct Engine {
    clock: f64,
    future: BinaryHeap<Event>,
    sequence: u64,
    entities: slotmap::SlotMap<EntityId, EntityRecord>,
    name_index: std::collections::HashMap<String, EntityId>,
    running_count: usize,
}

impl Default for Engine {
    fn default() -> Self {
        Engine { clock: 0.0, future: BinaryHeap::new(), sequence: 0, entities: slotmap::SlotMap::with_key(), name_index: std::collections::HashMap::new(), running_count: 0 }
    }
}

impl Engine {
    pub fn new() -> Self {
        Engine::default()
    }

    pub fn now(&self) -> f64 {
        self.clock
    }

    pub fn lookup_id(&self, name: &EntityName) -> Option<EntityId> {
        self.name_index.get(&name.name).copied()
    }

    /// Registers a new entity under `body.name()`. Panics if the name is already taken,
    /// since two entities sharing a name would make `lookup_id` ambiguous; scenario
    /// construction is expected to assign unique names up front.
    pub fn register(&mut self, body: Box<dyn Entity>) -> EntityId {
        let name = body.name().clone();
        if self.name_index.contains_key(&name.name) {
            panic!("duplicate entity name: {}", name.name);
        }
        let id = self.entities.insert(EntityRecord { name: name.clone(), body: Some(body), deferred: VecDeque::new(), terminated: false });
        self.name_index.insert(name.name, id);
        self.running_count += 1;
        id
    }

    fn next_sequence(&mut self) -> u64 {
        let seq = self.sequence;
        self.sequence += 1;
        seq
    }

    /// Enqueues `payload` for delivery to `dest` after `delay` simulated seconds.
    ///
    /// Per §4.1's error taxonomy: a negative `delay` is a programmer slip, not a fatal
    /// condition, so it is clamped to zero with a logged warning rather than rejected;
    /// scheduling to an id this engine never registered is a hard error (panics), since
    /// there is no well-defined recipient to ever detect the event was lost.
    pub fn schedule(&mut self, source: EntityId, dest: EntityId, delay: f64, tag: Tag, payload: Payload, transaction_id: Option<TransactionId>) -> u64 {
        assert!(self.entities.contains_key(dest), "scheduling to unknown entity id");
        let delay = if delay < 0.0 {
            log::warn!("clamped negative schedule delay {delay} to 0 (tag {tag:?})");
            0.0
        } else {
            delay
        };
        let sequence = self.next_sequence();
        let mut event = Event::new(source, dest, self.clock, self.clock + delay, sequence, tag, payload);
        event.transaction_id = transaction_id;
        self.future.push(event);
        sequence
    }

    pub(crate) fn take_deferred<F>(&mut self, id: EntityId, predicate: F) -> Option<Event>
    where
        F: Fn(&Event) -> bool,
    {
        let record = self.entities.get_mut(id)?;
        let idx = record.deferred.iter().position(predicate)?;
        record.deferred.remove(idx)
    }

    pub(crate) fn peek_deferred<F>(&self, id: EntityId, predicate: F) -> bool
    where
        F: Fn(&Event) -> bool,
    {
        self.entities.get(id).map(|r| r.deferred.iter().any(predicate)).unwrap_or(false)
    }

    pub(crate) fn terminate(&mut self, id: EntityId) {
        if let Some(record) = self.entities.get_mut(id) {
            if !record.terminated {
                record.terminated = true;
                self.running_count = self.running_count.saturating_sub(1);
            }
        }
    }

    fn dispatch(&mut self, id: EntityId, event: Option<Event>, via_start: bool) {
        let Some(mut body) = self.entities.get_mut(id).and_then(|r| r.body.take()) else {
            return;
        };
        let mut ctx = EntityContext::new(self, id);
        if via_start {
            body.start(&mut ctx);
        } else if let Some(event) = event {
            body.on_event(&mut ctx, event);
        }
        if let Some(record) = self.entities.get_mut(id) {
            record.body = Some(body);
        }
    }

    fn dispatch_shutdown(&mut self, id: EntityId) {
        let Some(mut body) = self.entities.get_mut(id).and_then(|r| r.body.take()) else {
            return;
        };
        let mut ctx = EntityContext::new(self, id);
        body.on_shutdown(&mut ctx);
        if let Some(record) = self.entities.get_mut(id) {
            record.body = Some(body);
        }
    }

    /// Runs `start()` on every registered entity, in registration order, at time 0.
    pub fn start_all(&mut self) {
        let ids: Vec<EntityId> = self.entities.keys().collect();
        for id in ids {
            self.dispatch(id, None, true);
        }
    }

    /// Drains the future-event list, advancing the clock monotonically and dispatching
    /// each event to its destination's deferred queue and `on_event` hook in turn.
    /// Stops when the queue empties or every entity has terminated.
    pub fn run(&mut self) {
        self.start_all();
        while let Some(event) = self.future.pop() {
            if self.running_count == 0 {
                break;
            }
            debug_assert!(event.delivery_time + 1e-9 >= self.clock, "clock moved backward");
            self.clock = event.delivery_time;

            let dest = event.dest;
            let terminated = self.entities.get(dest).map(|r| r.terminated).unwrap_or(true);
            if terminated {
                continue;
            }
            if let Some(record) = self.entities.get_mut(dest) {
                record.deferred.push_back(event.clone());
            }
            self.dispatch(dest, Some(event), false);
        }
        let ids: Vec<EntityId> = self.entities.keys().collect();
        for id in ids {
            self.dispatch_shutdown(id);
        }
    }

    pub fn entity_name(&self, id: EntityId) -> Option<&EntityName> {
        self.entities.get(id).map(|r| &r.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Recorder {
        name: EntityName,
        log: Rc<RefCell<Vec<(f64, Tag)>>>,
        terminate_after: Option<u32>,
        seen: u32,
    }

    impl Entity for Recorder {
        fn name(&self) -> &EntityName {
            &self.name
        }

        fn on_event(&mut self, ctx: &mut EntityContext, event: Event) {
            self.log.borrow_mut().push((ctx.now(), event.tag));
            self.seen += 1;
            if let Some(limit) = self.terminate_after {
                if self.seen >= limit {
                    ctx.terminate();
                }
            }
        }
    }

    #[test]
    fn events_deliver_in_nondecreasing_time_order() {
        let mut engine = Engine::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let id = engine.register(Box::new(Recorder { name: EntityName::new("r"), log: log.clone(), terminate_after: Some(3), seen: 0 }));

        engine.schedule(id, id, 5.0, Tag::Wakeup, Payload::None, None);
        engine.schedule(id, id, 1.0, Tag::Wakeup, Payload::None, None);
        engine.schedule(id, id, 3.0, Tag::Wakeup, Payload::None, None);
        engine.run();

        let times: Vec<f64> = log.borrow().iter().map(|(t, _)| *t).collect();
        assert_eq!(times, vec![1.0, 3.0, 5.0]);
    }

    #[test]
    fn ties_break_in_submission_order() {
        let mut engine = Engine::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let id = engine.register(Box::new(Recorder { name: EntityName::new("r"), log: log.clone(), terminate_after: Some(3), seen: 0 }));

        engine.schedule(id, id, 2.0, Tag::SubmitJob, Payload::None, None);
        engine.schedule(id, id, 2.0, Tag::CancelJob, Payload::None, None);
        engine.schedule(id, id, 2.0, Tag::PauseJob, Payload::None, None);
        engine.run();

        let tags: Vec<Tag> = log.borrow().iter().map(|(_, tag)| *tag).collect();
        assert_eq!(tags, vec![Tag::SubmitJob, Tag::CancelJob, Tag::PauseJob]);
    }

    #[test]
    fn terminated_entity_stops_receiving_events() {
        let mut engine = Engine::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let id = engine.register(Box::new(Recorder { name: EntityName::new("r"), log: log.clone(), terminate_after: Some(1), seen: 0 }));

        engine.schedule(id, id, 1.0, Tag::Wakeup, Payload::None, None);
        engine.schedule(id, id, 2.0, Tag::Wakeup, Payload::None, None);
        engine.run();

        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn deferred_queue_supports_predicate_based_retrieval() {
        struct Puller {
            name: EntityName,
            result: Rc<RefCell<Option<Tag>>>,
        }
        impl Entity for Puller {
            fn name(&self) -> &EntityName {
                &self.name
            }
            fn on_event(&mut self, ctx: &mut EntityContext, _event: Event) {
                if let Some(found) = ctx.get_next_event(|e| e.tag == Tag::ReturnSubmitJob) {
                    *self.result.borrow_mut() = Some(found.tag);
                    ctx.terminate();
                }
            }
        }

        let mut engine = Engine::new();
        let result = Rc::new(RefCell::new(None));
        let id = engine.register(Box::new(Puller { name: EntityName::new("p"), result: result.clone() }));

        engine.schedule(id, id, 1.0, Tag::SubmitJob, Payload::None, None);
        engine.schedule(id, id, 1.0, Tag::ReturnSubmitJob, Payload::None, None);
        engine.run();

        assert_eq!(*result.borrow(), Some(Tag::ReturnSubmitJob));
    }
}
