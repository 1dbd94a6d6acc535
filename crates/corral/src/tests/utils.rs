use crate::auth::Acls;
use crate::master::agent::ReservationOp;
use crate::master::allocator::{AllocationEngine, RoundRobinAllocator};
use crate::master::comm::Comm;
use crate::master::core::Core;
use crate::master::framework::Framework;
use crate::master::messages::{TaskSpec, ToFrameworkMessage};
use crate::master::reactor::{
    on_framework_registered, on_new_agent, on_offer_accepted, on_offer_declined,
    on_task_terminated,
};
use crate::master::reservation::{
    ReservationError, ReservationRequest, on_reserve_resources, on_unreserve_resources,
};
use crate::resources::parser::parse_resource_set;
use crate::resources::{ResourceSet, Role};
use crate::{AgentId, FrameworkId, OfferId, TaskId};

pub fn res(spec: &str) -> ResourceSet {
    parse_resource_set(spec).unwrap()
}

pub fn reserved(spec: &str, role: &str, principal: &str) -> ResourceSet {
    res(spec).flatten(role, principal).unwrap()
}

/// Recording `Comm`: captures outbound messages and the allocation flag.
#[derive(Default)]
pub struct TestComm {
    pub messages: Vec<(FrameworkId, ToFrameworkMessage)>,
    pub need_allocation: bool,
}

impl Comm for TestComm {
    fn send_framework_message(&mut self, framework_id: FrameworkId, message: &ToFrameworkMessage) {
        self.messages.push((framework_id, message.clone()));
    }

    fn ask_for_allocation(&mut self) {
        self.need_allocation = true;
    }
}

impl TestComm {
    pub fn take_messages(&mut self) -> Vec<(FrameworkId, ToFrameworkMessage)> {
        std::mem::take(&mut self.messages)
    }

    pub fn check_need_allocation(&mut self) {
        assert!(self.need_allocation, "allocation was not requested");
        self.need_allocation = false;
    }

    pub fn emptiness_check(&self) {
        assert!(
            self.messages.is_empty(),
            "unexpected messages: {:?}",
            self.messages
        );
        assert!(!self.need_allocation, "unexpected allocation request");
    }
}

/// Recording allocation engine; `allocate` delegates to the production
/// round-robin engine so tests can also observe real offers.
#[derive(Default)]
pub struct TestAllocator {
    inner: RoundRobinAllocator,
    pub recovered: Vec<(Option<FrameworkId>, AgentId, ResourceSet)>,
    pub added_agents: Vec<AgentId>,
}

impl AllocationEngine for TestAllocator {
    fn add_agent(&mut self, agent_id: AgentId, total: &ResourceSet, used: &ResourceSet) {
        self.added_agents.push(agent_id);
        self.inner.add_agent(agent_id, total, used);
    }

    fn remove_agent(&mut self, agent_id: AgentId) {
        self.inner.remove_agent(agent_id);
    }

    fn add_framework(&mut self, framework_id: FrameworkId, roles: &[Role]) {
        self.inner.add_framework(framework_id, roles);
    }

    fn remove_framework(&mut self, framework_id: FrameworkId) {
        self.inner.remove_framework(framework_id);
    }

    fn recover_resources(
        &mut self,
        framework_id: Option<FrameworkId>,
        agent_id: AgentId,
        resources: &ResourceSet,
    ) {
        self.recovered
            .push((framework_id, agent_id, resources.clone()));
    }

    fn allocate(&mut self, core: &mut Core, comm: &mut dyn Comm) {
        self.inner.allocate(core, comm);
    }
}

impl TestAllocator {
    pub fn take_recovered(&mut self) -> Vec<(Option<FrameworkId>, AgentId, ResourceSet)> {
        std::mem::take(&mut self.recovered)
    }
}

pub struct TestEnv {
    pub core: Core,
    pub comm: TestComm,
    pub alloc: TestAllocator,
    pub acls: Acls,
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl TestEnv {
    pub fn new() -> TestEnv {
        TestEnv {
            core: Core::default(),
            comm: TestComm::default(),
            alloc: TestAllocator::default(),
            acls: Acls::default(),
        }
    }

    pub fn with_acls(acls: Acls) -> TestEnv {
        TestEnv {
            acls,
            ..Default::default()
        }
    }

    pub fn add_agent(&mut self, resources: &str) -> AgentId {
        let hostname = format!("node{}", self.alloc.added_agents.len());
        let agent_id = on_new_agent(
            &mut self.core,
            &mut self.comm,
            &mut self.alloc,
            hostname,
            res(resources),
        );
        self.comm.check_need_allocation();
        agent_id
    }

    pub fn add_framework(&mut self, name: &str, roles: &[&str]) -> FrameworkId {
        let framework_id = self.core.new_framework_id();
        on_framework_registered(
            &mut self.core,
            &mut self.comm,
            &mut self.alloc,
            Framework::new(
                framework_id,
                name.to_string(),
                roles.iter().map(|r| r.to_string()).collect(),
            ),
        );
        let registered = self.comm.take_messages();
        assert!(matches!(
            registered.as_slice(),
            [(id, ToFrameworkMessage::Registered { .. })] if *id == framework_id
        ));
        self.comm.check_need_allocation();
        framework_id
    }

    /// Runs one allocation pass and returns the offers it sent out.
    pub fn allocate(&mut self) -> Vec<(FrameworkId, ToFrameworkMessage)> {
        self.comm.need_allocation = false;
        self.alloc.allocate(&mut self.core, &mut self.comm);
        self.comm.take_messages()
    }

    pub fn reserve(
        &mut self,
        principal: &str,
        agent_id: AgentId,
        resources: ResourceSet,
    ) -> Result<(), ReservationError> {
        on_reserve_resources(
            &mut self.core,
            &mut self.comm,
            &mut self.alloc,
            &self.acls,
            ReservationRequest {
                principal: principal.to_string(),
                agent_id,
                resources,
            },
        )
    }

    pub fn unreserve(
        &mut self,
        principal: &str,
        agent_id: AgentId,
        resources: ResourceSet,
    ) -> Result<(), ReservationError> {
        on_unreserve_resources(
            &mut self.core,
            &mut self.comm,
            &mut self.alloc,
            &self.acls,
            ReservationRequest {
                principal: principal.to_string(),
                agent_id,
                resources,
            },
        )
    }

    pub fn accept_offer(
        &mut self,
        framework_id: FrameworkId,
        offer_id: OfferId,
        tasks: Vec<TaskSpec>,
    ) {
        on_offer_accepted(
            &mut self.core,
            &mut self.comm,
            &mut self.alloc,
            framework_id,
            offer_id,
            tasks,
        )
        .unwrap();
    }

    pub fn decline_offer(&mut self, framework_id: FrameworkId, offer_id: OfferId) {
        on_offer_declined(
            &mut self.core,
            &mut self.comm,
            &mut self.alloc,
            framework_id,
            offer_id,
        )
        .unwrap();
    }

    pub fn terminate_task(&mut self, task_id: TaskId) {
        on_task_terminated(&mut self.core, &mut self.comm, &mut self.alloc, task_id).unwrap();
    }

    pub fn free(&self, agent_id: AgentId) -> ResourceSet {
        self.core.agents().get_agent(agent_id).free().unwrap()
    }

    pub fn check_conservation(&self) {
        self.core.check_conservation();
    }
}

/// Unpacks the single offer a one-framework allocation pass produced.
pub fn single_offer(
    messages: Vec<(FrameworkId, ToFrameworkMessage)>,
) -> (FrameworkId, OfferId, ResourceSet) {
    assert_eq!(messages.len(), 1, "expected one offer, got {messages:?}");
    match messages.into_iter().next().unwrap() {
        (framework_id, ToFrameworkMessage::Offer(offer)) => {
            (framework_id, offer.offer_id, offer.resources)
        }
        other => panic!("expected an offer, got {other:?}"),
    }
}
