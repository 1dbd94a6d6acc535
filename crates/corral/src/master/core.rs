use chrono::Utc;

use crate::master::agent::Agent;
use crate::master::agentmap::AgentMap;
use crate::master::framework::Framework;
use crate::master::offer::{Offer, OfferTracker};
use crate::resources::{ResourceError, ResourceSet};
use crate::{AgentId, FrameworkId, Map, OfferId, TaskId, WrappedRcRefCell};

/// A running task occupying `allocated` resources on an agent.
pub struct Task {
    pub framework_id: FrameworkId,
    pub agent_id: AgentId,
    pub resources: ResourceSet,
}

/// Authoritative state of the master: the per-agent ledgers, live offers,
/// registered frameworks and running tasks. Owned by the single-threaded
/// reactor; everything else talks to it through messages.
#[derive(Default)]
pub struct Core {
    agents: AgentMap,
    offers: OfferTracker,
    frameworks: Map<FrameworkId, Framework>,
    tasks: Map<TaskId, Task>,

    agent_id_counter: u32,
    framework_id_counter: u32,
    offer_id_counter: u64,
}

pub type CoreRef = WrappedRcRefCell<Core>;

impl CoreRef {
    pub fn new() -> Self {
        WrappedRcRefCell::wrap(Core::default())
    }
}

impl Core {
    pub fn new_agent_id(&mut self) -> AgentId {
        self.agent_id_counter += 1;
        AgentId::new(self.agent_id_counter)
    }

    pub fn new_framework_id(&mut self) -> FrameworkId {
        self.framework_id_counter += 1;
        FrameworkId::new(self.framework_id_counter)
    }

    pub fn new_offer_id(&mut self) -> OfferId {
        self.offer_id_counter += 1;
        OfferId::new(self.offer_id_counter)
    }

    pub fn agents(&self) -> &AgentMap {
        &self.agents
    }

    pub fn agents_mut(&mut self) -> &mut AgentMap {
        &mut self.agents
    }

    pub fn offers(&self) -> &OfferTracker {
        &self.offers
    }

    pub fn frameworks(&self) -> &Map<FrameworkId, Framework> {
        &self.frameworks
    }

    pub fn tasks(&self) -> &Map<TaskId, Task> {
        &self.tasks
    }

    pub fn add_agent(&mut self, agent: Agent) {
        assert!(self.agents.insert(agent.id(), agent).is_none());
    }

    pub fn remove_agent(&mut self, agent_id: AgentId) -> Option<Agent> {
        self.tasks.retain(|_, task| task.agent_id != agent_id);
        self.agents.remove(&agent_id)
    }

    pub fn add_framework(&mut self, framework: Framework) {
        assert!(self.frameworks.insert(framework.id(), framework).is_none());
    }

    pub fn remove_framework(&mut self, framework_id: FrameworkId) -> Option<Framework> {
        self.frameworks.remove(&framework_id)
    }

    pub fn add_task(&mut self, task_id: TaskId, task: Task) -> bool {
        if self.tasks.contains_key(&task_id) {
            return false;
        }
        self.tasks.insert(task_id, task);
        true
    }

    pub fn remove_task(&mut self, task_id: TaskId) -> Option<Task> {
        self.tasks.remove(&task_id)
    }

    /// Issues a new offer: moves the resources from the agent's free pool
    /// into `offered` and records the snapshot. Fails when the agent is no
    /// longer registered.
    pub fn issue_offer(
        &mut self,
        framework_id: FrameworkId,
        agent_id: AgentId,
        resources: ResourceSet,
    ) -> crate::Result<Offer> {
        if !self.agents.contains_key(&agent_id) {
            return Err(format!("Cannot issue offer on unknown agent {agent_id}").into());
        }
        let offer = Offer {
            id: self.new_offer_id(),
            framework_id,
            agent_id,
            resources,
            created: Utc::now(),
        };
        self.agents
            .get_agent_mut(agent_id)
            .add_offered(&offer.resources)?;
        self.offers.record(offer.clone());
        Ok(offer)
    }

    /// Removes an offer and returns its resources to the agent's free pool.
    /// Idempotent over already-gone offer ids.
    pub fn withdraw_offer(&mut self, offer_id: OfferId) -> Result<Option<Offer>, ResourceError> {
        let Some(offer) = self.offers.rescind(offer_id) else {
            return Ok(None);
        };
        self.agents
            .get_agent_mut(offer.agent_id)
            .remove_offered(&offer.resources)?;
        Ok(Some(offer))
    }

    /// Sanity check used by tests: every agent's ledger balances and every
    /// live offer/task is backed by its agent's `offered`/`allocated`.
    #[cfg(test)]
    pub fn check_conservation(&self) {
        for (agent_id, agent) in self.agents.iter() {
            let free = agent.free().expect("ledger does not balance");
            let sum = free
                .union(agent.offered())
                .and_then(|s| s.union(agent.allocated()))
                .expect("ledger does not balance");
            assert_eq!(&sum, agent.total(), "conservation broken on {agent_id}");
        }
    }
}
