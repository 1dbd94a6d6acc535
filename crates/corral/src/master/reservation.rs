//! The reservation operation processor: the only path that changes the
//! reservation state of an agent's ledger.

use thiserror::Error;

use crate::AgentId;
use crate::auth::Acls;
use crate::master::agent::{ApplyFailure, ReservationOp};
use crate::master::allocator::AllocationEngine;
use crate::master::comm::Comm;
use crate::master::core::Core;
use crate::master::reactor::rescind_agent_offers;
use crate::resources::{Principal, ResourceSet};

/// User-facing failures of a reserve/unreserve request. Every variant except
/// `OperationAborted` leaves the ledger, the offer tracker and all
/// outstanding offers untouched.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReservationError {
    #[error("authentication failed: {0}")]
    Unauthenticated(String),
    #[error("not authorized: {0}")]
    Unauthorized(String),
    #[error("malformed request: {0}")]
    MalformedRequest(String),
    #[error("insufficient resources on agent {agent_id}: requested {requested}")]
    InsufficientResources { agent_id: AgentId, requested: String },
    /// Internal invariant violation after validation passed. Never mapped to
    /// a user-facing condition with details; the ledger keeps its last
    /// known-good state.
    #[error("operation aborted")]
    OperationAborted,
}

/// A validated-at-the-edge operator request; `principal` is the
/// authenticated caller, not taken from the request body.
#[derive(Debug, Clone)]
pub struct ReservationRequest {
    pub principal: Principal,
    pub agent_id: AgentId,
    pub resources: ResourceSet,
}

pub fn on_reserve_resources(
    core: &mut Core,
    comm: &mut impl Comm,
    alloc: &mut dyn AllocationEngine,
    acls: &Acls,
    request: ReservationRequest,
) -> Result<(), ReservationError> {
    process_reservation(core, comm, alloc, acls, ReservationOp::Reserve, request)
}

pub fn on_unreserve_resources(
    core: &mut Core,
    comm: &mut impl Comm,
    alloc: &mut dyn AllocationEngine,
    acls: &Acls,
    request: ReservationRequest,
) -> Result<(), ReservationError> {
    process_reservation(core, comm, alloc, acls, ReservationOp::Unreserve, request)
}

fn process_reservation(
    core: &mut Core,
    comm: &mut impl Comm,
    alloc: &mut dyn AllocationEngine,
    acls: &Acls,
    op: ReservationOp,
    request: ReservationRequest,
) -> Result<(), ReservationError> {
    let agent_id = request.agent_id;
    let malformed = |msg: String| ReservationError::MalformedRequest(msg);

    // 1. Structural validation; nothing below touches the ledger until the
    //    rescission step.
    if !core.agents().contains_key(&agent_id) {
        return Err(malformed(format!("unknown agent {agent_id}")));
    }
    if request.resources.is_empty() {
        return Err(malformed("no resources specified".to_string()));
    }
    for resource in request.resources.iter() {
        let Some(reservation) = &resource.reservation else {
            return Err(malformed(format!(
                "resource `{}` carries no reservation",
                resource.name
            )));
        };
        if reservation.principal.is_empty() {
            return Err(malformed(format!(
                "resource `{}` has a reservation without a principal",
                resource.name
            )));
        }
    }
    let Some(role) = request.resources.common_role() else {
        return Err(malformed(
            "all resources in one request must share a role".to_string(),
        ));
    };
    if role == crate::resources::DEFAULT_ROLE {
        return Err(malformed(format!(
            "resources cannot be reserved for the default role {role:?}"
        )));
    }
    let role = role.to_string();

    // 2. A new reservation may only be stamped with the caller's own name
    if op == ReservationOp::Reserve {
        for resource in request.resources.iter() {
            let principal = &resource.reservation.as_ref().unwrap().principal;
            if principal != &request.principal {
                return Err(malformed(format!(
                    "reservation principal {:?} does not match the authenticated principal {:?}",
                    principal, request.principal
                )));
            }
        }
    }

    // 3. Authorization
    match op {
        ReservationOp::Reserve => {
            if !acls.authorize_reserve(&request.principal, &role) {
                return Err(ReservationError::Unauthorized(format!(
                    "principal {:?} may not reserve resources for role {role:?}",
                    request.principal
                )));
            }
        }
        ReservationOp::Unreserve => {
            for resource in request.resources.iter() {
                let reserver = &resource.reservation.as_ref().unwrap().principal;
                if !acls.authorize_unreserve(&request.principal, reserver) {
                    return Err(ReservationError::Unauthorized(format!(
                        "principal {:?} may not unreserve resources reserved by {reserver:?}",
                        request.principal
                    )));
                }
            }
        }
    }

    // 4. Sufficiency against free ∪ offered; outstanding offers count
    //    because they are about to be rescinded
    let consumed = match op {
        ReservationOp::Reserve => request
            .resources
            .unflatten()
            .map_err(|e| malformed(format!("cannot strip reservations: {e}")))?,
        ReservationOp::Unreserve => request.resources.clone(),
    };
    if !core.agents().get_agent(agent_id).sufficient(&consumed) {
        return Err(ReservationError::InsufficientResources {
            agent_id,
            requested: request.resources.to_string(),
        });
    }

    // 5. Rescind every outstanding offer on the agent (conservative policy:
    //    a reservation change can redistribute the whole role-partitioned
    //    pool, so all of them are stale). From here on the operation is
    //    committed to completing.
    rescind_agent_offers(core, comm, alloc, agent_id).map_err(|e| {
        log::error!("Rescinding offers on agent {agent_id} failed: {e}");
        ReservationError::OperationAborted
    })?;

    // 6. Apply, re-checking sufficiency at commit time
    let agent = core.agents_mut().get_agent_mut(agent_id);
    match agent.apply(op, &request.resources) {
        Ok(()) => {}
        Err(ApplyFailure::Insufficient) => {
            return Err(ReservationError::InsufficientResources {
                agent_id,
                requested: request.resources.to_string(),
            });
        }
        Err(ApplyFailure::Internal(e)) => {
            // Sufficiency said yes but the arithmetic disagreed; the ledger
            // was not modified
            log::error!("Reservation apply on agent {agent_id} hit a broken invariant: {e}");
            return Err(ReservationError::OperationAborted);
        }
    }
    log::info!(
        "Applied {} of {} on agent {agent_id} for principal {:?}",
        op.verb(),
        request.resources,
        request.principal
    );

    // 7. Nudge the allocation engine; the response does not wait for the
    //    next offer to be produced
    comm.ask_for_allocation();
    Ok(())
}
