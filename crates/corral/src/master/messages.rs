use serde::{Deserialize, Serialize};

use crate::resources::ResourceSet;
use crate::{AgentId, FrameworkId, OfferId, TaskId};

/// First message a scheduler sends after the transport handshake.
#[derive(Serialize, Deserialize, Debug)]
pub struct RegisterFrameworkMsg {
    pub name: String,
    pub roles: Vec<String>,
}

/// A task launched against an accepted offer. The scheduler picks the id;
/// the task's resources must be covered by the offer.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TaskSpec {
    pub task_id: TaskId,
    pub resources: ResourceSet,
}

#[derive(Serialize, Deserialize, Debug)]
pub enum FromFrameworkMessage {
    Register(RegisterFrameworkMsg),
    AcceptOffer {
        offer_id: OfferId,
        tasks: Vec<TaskSpec>,
    },
    DeclineOffer {
        offer_id: OfferId,
    },
    KillTask {
        task_id: TaskId,
    },
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct OfferMsg {
    pub offer_id: OfferId,
    pub agent_id: AgentId,
    pub hostname: String,
    pub resources: ResourceSet,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub enum ToFrameworkMessage {
    Registered {
        framework_id: FrameworkId,
    },
    Offer(OfferMsg),
    /// One-way withdrawal of a not-yet-consumed offer; delivered at most
    /// once, never retried. Acting on an unknown offer id is a no-op.
    RescindOffer {
        offer_id: OfferId,
    },
    /// Protocol-level rejection of an invalid scheduler request.
    Error {
        message: String,
    },
}
