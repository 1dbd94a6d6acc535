use std::ops::{Deref, DerefMut};

use crate::AgentId;
use crate::Map;
use crate::master::agent::Agent;

#[derive(Default)]
pub struct AgentMap {
    agents: Map<AgentId, Agent>,
}

impl AgentMap {
    #[inline]
    pub fn get_agent(&self, agent_id: AgentId) -> &Agent {
        &self.agents[&agent_id]
    }

    #[inline]
    pub fn get_agent_mut(&mut self, agent_id: AgentId) -> &mut Agent {
        self.agents.get_mut(&agent_id).expect("Agent not found")
    }

    #[inline]
    pub fn find_agent(&self, agent_id: AgentId) -> Option<&Agent> {
        self.agents.get(&agent_id)
    }
}

impl Deref for AgentMap {
    type Target = Map<AgentId, Agent>;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.agents
    }
}

impl DerefMut for AgentMap {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.agents
    }
}
