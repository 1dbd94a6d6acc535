//! Event handlers of the master reactor. Every mutation of an agent's
//! ledger runs here or in the reservation processor, one event at a time.

use crate::master::agent::Agent;
use crate::master::allocator::AllocationEngine;
use crate::master::comm::Comm;
use crate::master::core::{Core, Task};
use crate::master::framework::Framework;
use crate::master::messages::{TaskSpec, ToFrameworkMessage};
use crate::resources::ResourceSet;
use crate::{AgentId, FrameworkId, OfferId, TaskId};

pub fn on_new_agent(
    core: &mut Core,
    comm: &mut impl Comm,
    alloc: &mut dyn AllocationEngine,
    hostname: String,
    total: ResourceSet,
) -> AgentId {
    let agent_id = core.new_agent_id();
    log::info!("New agent {agent_id} ({hostname}) with resources {total}");
    alloc.add_agent(agent_id, &total, &ResourceSet::default());
    core.add_agent(Agent::new(agent_id, hostname, total));
    comm.ask_for_allocation();
    agent_id
}

pub fn on_remove_agent(
    core: &mut Core,
    comm: &mut impl Comm,
    alloc: &mut dyn AllocationEngine,
    agent_id: AgentId,
) -> crate::Result<()> {
    log::info!("Removing agent {agent_id}");
    rescind_agent_offers(core, comm, alloc, agent_id)?;
    core.remove_agent(agent_id);
    alloc.remove_agent(agent_id);
    comm.ask_for_allocation();
    Ok(())
}

pub fn on_framework_registered(
    core: &mut Core,
    comm: &mut impl Comm,
    alloc: &mut dyn AllocationEngine,
    framework: Framework,
) {
    let framework_id = framework.id();
    log::info!(
        "Framework {framework_id} ({}) registered with roles {:?}",
        framework.name(),
        framework.roles()
    );
    alloc.add_framework(framework_id, framework.roles());
    core.add_framework(framework);
    comm.send_framework_message(framework_id, &ToFrameworkMessage::Registered { framework_id });
    comm.ask_for_allocation();
}

pub fn on_framework_lost(
    core: &mut Core,
    comm: &mut impl Comm,
    alloc: &mut dyn AllocationEngine,
    framework_id: FrameworkId,
) -> crate::Result<()> {
    log::info!("Framework {framework_id} lost");

    let offer_ids: Vec<OfferId> = core
        .offers()
        .iter()
        .filter(|offer| offer.framework_id == framework_id)
        .map(|offer| offer.id)
        .collect();
    for offer_id in offer_ids {
        if let Some(offer) = core.withdraw_offer(offer_id)? {
            alloc.recover_resources(Some(framework_id), offer.agent_id, &offer.resources);
        }
    }

    let task_ids: Vec<TaskId> = core
        .tasks()
        .iter()
        .filter(|(_, task)| task.framework_id == framework_id)
        .map(|(id, _)| *id)
        .collect();
    for task_id in task_ids {
        on_task_terminated(core, comm, alloc, task_id)?;
    }

    core.remove_framework(framework_id);
    alloc.remove_framework(framework_id);
    comm.ask_for_allocation();
    Ok(())
}

pub fn on_offer_accepted(
    core: &mut Core,
    comm: &mut impl Comm,
    alloc: &mut dyn AllocationEngine,
    framework_id: FrameworkId,
    offer_id: OfferId,
    tasks: Vec<TaskSpec>,
) -> crate::Result<()> {
    let Some(offer) = core.offers().get(offer_id) else {
        // Tolerated race: the offer was rescinded before the accept arrived
        log::debug!("Framework {framework_id} accepted unknown offer {offer_id}");
        return Ok(());
    };
    if offer.framework_id != framework_id {
        log::warn!("Framework {framework_id} accepted foreign offer {offer_id}");
        return Ok(());
    }
    let agent_id = offer.agent_id;

    // An accept is all-or-nothing: every task must carry a fresh id and the
    // tasks together must fit into the offer
    let mut used = ResourceSet::default();
    let mut valid = true;
    for task in &tasks {
        if core.tasks().contains_key(&task.task_id) {
            log::warn!("Framework {framework_id} reused task id {}", task.task_id);
            valid = false;
            break;
        }
        used = used.union(&task.resources)?;
    }
    if valid && !offer.resources.contains(&used) {
        log::warn!(
            "Framework {framework_id} accepted offer {offer_id} with tasks exceeding it ({used})"
        );
        valid = false;
    }

    let offer = core
        .withdraw_offer(offer_id)?
        .expect("offer disappeared during accept");

    if !valid || tasks.is_empty() {
        comm.send_framework_message(
            framework_id,
            &ToFrameworkMessage::Error {
                message: format!("Accept of offer {offer_id} was rejected"),
            },
        );
        alloc.recover_resources(Some(framework_id), agent_id, &offer.resources);
        comm.ask_for_allocation();
        return Ok(());
    }

    for task in tasks {
        log::debug!(
            "Task {} of framework {framework_id} allocated {} on agent {agent_id}",
            task.task_id,
            task.resources
        );
        core.agents_mut()
            .get_agent_mut(agent_id)
            .add_allocated(&task.resources)?;
        core.add_task(
            task.task_id,
            Task {
                framework_id,
                agent_id,
                resources: task.resources,
            },
        );
    }

    let unused = offer.resources.checked_subtract(&used)?;
    if !unused.is_empty() {
        alloc.recover_resources(Some(framework_id), agent_id, &unused);
    }
    comm.ask_for_allocation();
    Ok(())
}

pub fn on_offer_declined(
    core: &mut Core,
    comm: &mut impl Comm,
    alloc: &mut dyn AllocationEngine,
    framework_id: FrameworkId,
    offer_id: OfferId,
) -> crate::Result<()> {
    let Some(offer) = core.withdraw_offer(offer_id)? else {
        log::debug!("Framework {framework_id} declined unknown offer {offer_id}");
        return Ok(());
    };
    log::debug!("Offer {offer_id} declined, recovering {}", offer.resources);
    alloc.recover_resources(Some(framework_id), offer.agent_id, &offer.resources);
    comm.ask_for_allocation();
    Ok(())
}

pub fn on_task_terminated(
    core: &mut Core,
    comm: &mut impl Comm,
    alloc: &mut dyn AllocationEngine,
    task_id: TaskId,
) -> crate::Result<()> {
    let Some(task) = core.remove_task(task_id) else {
        log::debug!("Termination of unknown task {task_id}");
        return Ok(());
    };
    log::debug!(
        "Task {task_id} terminated, recovering {} on agent {}",
        task.resources,
        task.agent_id
    );
    core.agents_mut()
        .get_agent_mut(task.agent_id)
        .remove_allocated(&task.resources)?;
    alloc.recover_resources(Some(task.framework_id), task.agent_id, &task.resources);
    comm.ask_for_allocation();
    Ok(())
}

/// Withdraws every outstanding offer on an agent, notifies the holders and
/// returns the resources to the allocation engine. The rescind notification
/// is advisory and at-most-once; the ledger is reclaimed regardless.
pub(crate) fn rescind_agent_offers(
    core: &mut Core,
    comm: &mut impl Comm,
    alloc: &mut dyn AllocationEngine,
    agent_id: AgentId,
) -> crate::Result<()> {
    for offer_id in core.offers().offers_for(agent_id) {
        if let Some(offer) = core.withdraw_offer(offer_id)? {
            log::debug!(
                "Rescinding offer {offer_id} of framework {} on agent {agent_id}",
                offer.framework_id
            );
            comm.send_framework_message(
                offer.framework_id,
                &ToFrameworkMessage::RescindOffer { offer_id },
            );
            alloc.recover_resources(Some(offer.framework_id), agent_id, &offer.resources);
        }
    }
    Ok(())
}
