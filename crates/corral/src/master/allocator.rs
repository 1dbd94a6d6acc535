use crate::master::comm::Comm;
use crate::master::core::Core;
use crate::master::messages::{OfferMsg, ToFrameworkMessage};
use crate::resources::{ResourceSet, Role};
use crate::{AgentId, FrameworkId};

/// Narrow interface of the allocation engine. The fairness/placement policy
/// behind it is interchangeable; the production engine below and the test
/// substitute implement the same capability set.
pub trait AllocationEngine {
    fn add_agent(&mut self, agent_id: AgentId, total: &ResourceSet, used: &ResourceSet);
    fn remove_agent(&mut self, agent_id: AgentId);
    fn add_framework(&mut self, framework_id: FrameworkId, roles: &[Role]);
    fn remove_framework(&mut self, framework_id: FrameworkId);
    /// Resources returned to an agent's free pool (declined or rescinded
    /// offers, terminated tasks). The ledger is already up to date when this
    /// fires; the engine only learns that a new allocation may be worthwhile.
    fn recover_resources(
        &mut self,
        framework_id: Option<FrameworkId>,
        agent_id: AgentId,
        resources: &ResourceSet,
    );
    /// One allocation pass: turn free resources into offers.
    fn allocate(&mut self, core: &mut Core, comm: &mut dyn Comm);
}

/// Deliberately simple production engine: each pass walks the agents and
/// hands out every free bucket, visiting the frameworks round-robin and
/// giving each the part of the remaining pool its role subscriptions allow.
/// Reserved buckets go only to frameworks subscribed to the reservation's
/// role; unreserved buckets may go to anyone.
#[derive(Default)]
pub struct RoundRobinAllocator {
    cursor: usize,
}

impl AllocationEngine for RoundRobinAllocator {
    fn add_agent(&mut self, agent_id: AgentId, total: &ResourceSet, used: &ResourceSet) {
        log::debug!("Allocator: new agent {agent_id} with total {total}, used {used}");
    }

    fn remove_agent(&mut self, agent_id: AgentId) {
        log::debug!("Allocator: agent {agent_id} removed");
    }

    fn add_framework(&mut self, framework_id: FrameworkId, roles: &[Role]) {
        log::debug!("Allocator: new framework {framework_id} with roles {roles:?}");
    }

    fn remove_framework(&mut self, framework_id: FrameworkId) {
        log::debug!("Allocator: framework {framework_id} removed");
    }

    fn recover_resources(
        &mut self,
        framework_id: Option<FrameworkId>,
        agent_id: AgentId,
        resources: &ResourceSet,
    ) {
        log::debug!("Allocator: recovered {resources} on agent {agent_id} (framework {framework_id:?})");
    }

    fn allocate(&mut self, core: &mut Core, comm: &mut dyn Comm) {
        let mut agent_ids: Vec<AgentId> = core.agents().keys().copied().collect();
        agent_ids.sort_unstable();
        let mut framework_ids: Vec<FrameworkId> = core.frameworks().keys().copied().collect();
        framework_ids.sort_unstable();
        if framework_ids.is_empty() {
            return;
        }

        for agent_id in agent_ids {
            let mut remaining = {
                let agent = core.agents().get_agent(agent_id);
                match agent.free() {
                    Ok(free) => free,
                    Err(e) => {
                        log::error!("Skipping agent {agent_id} with unbalanced ledger: {e}");
                        continue;
                    }
                }
            };

            for attempt in 0..framework_ids.len() {
                if remaining.is_empty() {
                    break;
                }
                let framework_id = framework_ids[(self.cursor + attempt) % framework_ids.len()];
                let offerable: ResourceSet = {
                    let framework = &core.frameworks()[&framework_id];
                    remaining
                        .iter()
                        .filter(|r| framework.accepts_role(&r.role))
                        .cloned()
                        .collect()
                };
                if offerable.is_empty() {
                    continue;
                }
                remaining = match remaining.checked_subtract(&offerable) {
                    Ok(remaining) => remaining,
                    Err(e) => {
                        log::error!("Allocation pass on agent {agent_id} failed: {e}");
                        break;
                    }
                };

                let offer = match core.issue_offer(framework_id, agent_id, offerable) {
                    Ok(offer) => offer,
                    Err(e) => {
                        log::error!("Issuing offer on agent {agent_id} failed: {e}");
                        break;
                    }
                };
                log::debug!(
                    "Offering {} on agent {} to framework {} as offer {}",
                    offer.resources,
                    agent_id,
                    framework_id,
                    offer.id
                );
                let hostname = core.agents().get_agent(agent_id).hostname().to_string();
                comm.send_framework_message(
                    framework_id,
                    &ToFrameworkMessage::Offer(OfferMsg {
                        offer_id: offer.id,
                        agent_id,
                        hostname,
                        resources: offer.resources.clone(),
                    }),
                );
            }
        }
        // Rotate which framework is visited first in the next pass
        self.cursor = (self.cursor + 1) % framework_ids.len();
    }
}
