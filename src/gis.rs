use std::collections::HashSet;

use crate::engine::entity::{Entity, EntityContext};
use crate::engine::event::{Event, Payload, Tag};
use crate::engine::ids::{EntityId, EntityName};

/// The Grid Information Service: a singleton registry of every resource in the
/// simulation, split into plain and advance-reservation-capable sets, plus whatever
/// network entities registered themselves. Brokers query it (via `ResourceList`
/// requests, not yet needed by the current policy layer but modeled here for
/// completeness) to discover who they can submit work to.
///
/// Also the fan-out point at shutdown: once told the simulation is ending, it forwards
/// `EndOfSimulation` to every resource and network entity it knows about.
pub struct Gis {
    name: EntityName,
    resources: HashSet<EntityId>,
    ar_resources: HashSet<EntityId>,
    network_entities: HashSet<EntityId>,
    regional_gis: Vec<EntityId>,
}

impl Gis {
    pub fn new(name: EntityName) -> Self {
        Gis { name, resources: HashSet::new(), ar_resources: HashSet::new(), network_entities: HashSet::new(), regional_gis: Vec::new() }
    }

    pub fn resource_ids(&self) -> impl Iterator<Item = &EntityId> {
        self.resources.iter()
    }

    pub fn ar_resource_ids(&self) -> impl Iterator<Item = &EntityId> {
        self.ar_resources.iter()
    }

    pub fn regional_gis_ids(&self) -> impl Iterator<Item = &EntityId> {
        self.regional_gis.iter()
    }

    fn all_known(&self) -> Vec<EntityId> {
        self.resources.iter().chain(self.ar_resources.iter()).chain(self.network_entities.iter()).chain(self.regional_gis.iter()).copied().collect()
    }
}

impl Entity for Gis {
    fn name(&self) -> &EntityName {
        &self.name
    }

    fn on_event(&mut self, ctx: &mut EntityContext, event: Event) {
        match event.tag {
            Tag::RegisterResource => {
                self.resources.insert(event.source);
            }
            Tag::RegisterResourceAr => {
                // Per §4.3, an AR-capable resource is still a plain resource: it adds
                // to both sets, so a non-AR `ResourceList` query still sees it.
                self.resources.insert(event.source);
                self.ar_resources.insert(event.source);
            }
            Tag::ResourceList => {
                let ids: Vec<EntityId> = self.resources.iter().copied().collect();
                ctx.schedule(event.source, 0.0, Tag::ReturnResourceList, Payload::EntityIds(ids));
            }
            Tag::ResourceListAr => {
                let ids: Vec<EntityId> = self.ar_resources.iter().copied().collect();
                ctx.schedule(event.source, 0.0, Tag::ReturnResourceListAr, Payload::EntityIds(ids));
            }
            Tag::RegisterRegionalGis => {
                if !self.regional_gis.contains(&event.source) {
                    self.regional_gis.push(event.source);
                }
            }
            Tag::RegisterLink | Tag::RegisterRouter => {
                self.network_entities.insert(event.source);
            }
            Tag::EndOfSimulation => {
                for id in self.all_known() {
                    ctx.schedule(id, 0.0, Tag::EndOfSimulation, Payload::None);
                }
                ctx.terminate();
            }
            _ => {
                log::debug!("GIS ignored unrecognized tag {:?} from {:?}", event.tag, event.source);
            }
        }
    }
}
