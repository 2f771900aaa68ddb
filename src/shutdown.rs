use crate::engine::entity::{Entity, EntityContext};
use crate::engine::event::{Event, Payload, Tag};
use crate::engine::ids::{EntityId, EntityName};

/// Waits for `expected_count` independent sources to report they are done (each sends
/// one `EndOfSimulation`), then cascades a single `EndOfSimulation` to the GIS, which in
/// turn fans it out to every registered resource and network entity.
///
/// A short `quiesce_delay` is inserted before the cascade so that any reply traffic the
/// last reporting source's final event triggered has a chance to be delivered before
/// the simulation is torn down.
pub struct ShutdownCoordinator {
    name: EntityName,
    gis_id: EntityId,
    stats_sink_id: Option<EntityId>,
    expected_count: u32,
    received_count: u32,
    quiesce_delay: f64,
}

impl ShutdownCoordinator {
    pub fn new(name: EntityName, gis_id: EntityId, expected_count: u32, quiesce_delay: f64) -> Self {
        ShutdownCoordinator { name, gis_id, stats_sink_id: None, expected_count, received_count: 0, quiesce_delay }
    }

    pub fn with_stats_sink(mut self, stats_sink_id: EntityId) -> Self {
        self.stats_sink_id = Some(stats_sink_id);
        self
    }
}

impl Entity for ShutdownCoordinator {
    fn name(&self) -> &EntityName {
        &self.name
    }

    fn on_event(&mut self, ctx: &mut EntityContext, event: Event) {
        if event.tag != Tag::EndOfSimulation {
            return;
        }
        self.received_count += 1;
        log::info!("shutdown coordinator received {}/{} completion signals", self.received_count, self.expected_count);
        if self.received_count >= self.expected_count {
            ctx.schedule(self.gis_id, self.quiesce_delay, Tag::EndOfSimulation, Payload::None);
            if let Some(sink_id) = self.stats_sink_id {
                ctx.schedule(sink_id, self.quiesce_delay, Tag::EndOfSimulation, Payload::None);
            }
            ctx.terminate();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::core::Engine;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Recorder {
        name: EntityName,
        fired: Rc<RefCell<bool>>,
    }
    impl Entity for Recorder {
        fn name(&self) -> &EntityName {
            &self.name
        }
        fn on_event(&mut self, ctx: &mut EntityContext, event: Event) {
            if event.tag == Tag::EndOfSimulation {
                *self.fired.borrow_mut() = true;
                ctx.terminate();
            }
        }
    }

    #[test]
    fn cascades_only_after_every_expected_signal_arrives() {
        let mut engine = Engine::new();
        let fired = Rc::new(RefCell::new(false));
        let gis_id = engine.register(Box::new(Recorder { name: EntityName::new("gis"), fired: fired.clone() }));
        let coordinator_id = engine.register(Box::new(ShutdownCoordinator::new(EntityName::new("shutdown"), gis_id, 2, 0.5)));

        engine.schedule(coordinator_id, coordinator_id, 1.0, Tag::EndOfSimulation, Payload::None, None);
        engine.run();
        assert!(!*fired.borrow(), "should not cascade after only one of two signals");
    }

    #[test]
    fn cascades_after_expected_count_reached() {
        let mut engine = Engine::new();
        let fired = Rc::new(RefCell::new(false));
        let gis_id = engine.register(Box::new(Recorder { name: EntityName::new("gis"), fired: fired.clone() }));
        let coordinator_id = engine.register(Box::new(ShutdownCoordinator::new(EntityName::new("shutdown"), gis_id, 2, 0.5)));

        engine.schedule(coordinator_id, coordinator_id, 1.0, Tag::EndOfSimulation, Payload::None, None);
        engine.schedule(coordinator_id, coordinator_id, 1.0, Tag::EndOfSimulation, Payload::None, None);
        engine.run();
        assert!(*fired.borrow());
    }
}
