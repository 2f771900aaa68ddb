use crate::engine::entity::{Entity, EntityContext};
use crate::engine::event::{Event, Payload, Tag};
use crate::engine::ids::{EntityId, EntityName, NodeId};
use crate::failure::trace::FailureEvent;

/// Drives a resource's machines up and down according to a pre-loaded failure trace.
///
/// Schedules every trace event against itself at construction/`start` time and, as each
/// one fires, forwards a translated `NodeFailure`/`NodeRecovery` message to the owning
/// resource. The resource (not the injector) owns the `NodeId -> MachineId` mapping,
/// since that association is part of its own static configuration.
pub struct FailureInjector {
    name: EntityName,
    resource_id: EntityId,
    events: Vec<FailureEvent>,
}

impl FailureInjector {
    pub fn new(name: EntityName, resource_id: EntityId, mut events: Vec<FailureEvent>) -> Self {
        events.sort_by(|a, b| a.time_s.partial_cmp(&b.time_s).unwrap_or(std::cmp::Ordering::Equal));
        FailureInjector { name, resource_id, events }
    }
}

impl Entity for FailureInjector {
    fn name(&self) -> &EntityName {
        &self.name
    }

    fn start(&mut self, ctx: &mut EntityContext) {
        for event in &self.events {
            let tag = if event.up { Tag::NodeRecovery } else { Tag::NodeFailure };
            ctx.schedule(self.resource_id, event.time_s.max(0.0), tag, Payload::NodeId(event.node.name.clone()));
        }
    }

    fn on_event(&mut self, _ctx: &mut EntityContext, _event: Event) {
        // The injector only sends; it has nothing of its own to react to.
    }
}
