//! Wires the master together: reactor state, scheduler listener, operator
//! HTTP endpoints and the allocation loop, all on one `LocalSet`.

use std::cell::RefCell;
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use orion::kdf::SecretKey;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};

use crate::auth::{Acls, CredentialStore};
use crate::master::agent::ReservationOp;
use crate::master::allocator::RoundRobinAllocator;
use crate::master::comm::CommSenderRef;
use crate::master::core::CoreRef;
use crate::master::http::{HttpState, OperatorMessage, make_router};
use crate::master::reactor::on_new_agent;
use crate::master::reservation::{on_reserve_resources, on_unreserve_resources};
use crate::master::rpc::{AllocRef, connection_initiator};
use crate::resources::parser::parse_resource_set;

/// One worker node in the cluster definition file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDef {
    pub hostname: String,
    /// Textual resource list, e.g. `cpus:4;mem:16384;ports:[31000-32000]`.
    pub resources: String,
}

pub struct MasterConfig {
    pub http_listen: SocketAddr,
    pub scheduler_listen: SocketAddr,
    pub secret_key: Option<Arc<SecretKey>>,
    pub allocation_interval: Duration,
    pub credentials: CredentialStore,
    pub acls: Acls,
    pub agents: Vec<AgentDef>,
}

/// Runs the master until one of its loops fails. Must be polled inside a
/// `LocalSet` (the reactor state is single-threaded).
pub async fn master_start(config: MasterConfig) -> crate::Result<()> {
    let core_ref = CoreRef::new();
    let wakeup = Rc::new(Notify::new());
    let comm_ref = CommSenderRef::new(wakeup.clone());
    let alloc_ref: AllocRef = Rc::new(RefCell::new(RoundRobinAllocator::default()));
    let acls = Rc::new(config.acls);

    {
        let mut core = core_ref.get_mut();
        let mut comm = comm_ref.get_mut();
        let mut alloc = alloc_ref.borrow_mut();
        for agent in config.agents {
            let total = parse_resource_set(&agent.resources)?;
            on_new_agent(&mut core, &mut *comm, &mut *alloc, agent.hostname, total);
        }
    }

    let (operations_sender, operations_receiver) = unbounded_channel();
    let http_state = HttpState::new(Arc::new(config.credentials), operations_sender);

    let http_listener = tokio::net::TcpListener::bind(config.http_listen).await?;
    let scheduler_listener = tokio::net::TcpListener::bind(config.scheduler_listen).await?;
    log::info!(
        "Master listening: operators on {}, schedulers on {}",
        config.http_listen,
        config.scheduler_listen
    );

    let http = axum::serve(http_listener, make_router(http_state)).into_future();
    let schedulers = connection_initiator(
        scheduler_listener,
        core_ref.clone(),
        comm_ref.clone(),
        alloc_ref.clone(),
        config.secret_key.clone(),
    );
    let operations = operator_loop(
        operations_receiver,
        core_ref.clone(),
        comm_ref.clone(),
        alloc_ref.clone(),
        acls,
    );
    let allocations = allocator_loop(
        core_ref,
        comm_ref,
        alloc_ref,
        wakeup,
        config.allocation_interval,
    );

    tokio::select! {
        r = http => r.map_err(|e| format!("HTTP server failed: {e}"))?,
        r = schedulers => r?,
        _ = operations => {}
        _ = allocations => {}
    }
    Ok(())
}

/// Drains operator requests into the reservation processor, one at a time in
/// arrival order; this is the serialization point of all reservation changes.
pub async fn operator_loop(
    mut receiver: UnboundedReceiver<OperatorMessage>,
    core_ref: CoreRef,
    comm_ref: CommSenderRef,
    alloc_ref: AllocRef,
    acls: Rc<Acls>,
) {
    while let Some(message) = receiver.recv().await {
        match message {
            OperatorMessage::Reservation {
                op,
                request,
                response,
            } => {
                let result = {
                    let mut core = core_ref.get_mut();
                    let mut comm = comm_ref.get_mut();
                    let mut alloc = alloc_ref.borrow_mut();
                    match op {
                        ReservationOp::Reserve => on_reserve_resources(
                            &mut core,
                            &mut *comm,
                            &mut *alloc,
                            &acls,
                            request,
                        ),
                        ReservationOp::Unreserve => on_unreserve_resources(
                            &mut core,
                            &mut *comm,
                            &mut *alloc,
                            &acls,
                            request,
                        ),
                    }
                };
                // The caller may have given up on the response; fine either way
                let _ = response.send(result);
            }
        }
    }
}

/// Periodic allocation pass, also woken early by `ask_for_allocation`.
pub async fn allocator_loop(
    core_ref: CoreRef,
    comm_ref: CommSenderRef,
    alloc_ref: AllocRef,
    wakeup: Rc<Notify>,
    interval: Duration,
) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = wakeup.notified() => {}
        }
        let mut core = core_ref.get_mut();
        let mut comm = comm_ref.get_mut();
        comm.reset_allocation_flag();
        alloc_ref.borrow_mut().allocate(&mut core, &mut *comm);
    }
}
