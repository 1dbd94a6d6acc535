//! Scheduler (framework) connections: framed bincode over TCP behind the
//! challenge-response handshake.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use orion::kdf::SecretKey;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::task::spawn_local;
use tokio::time::timeout;

use crate::FrameworkId;
use crate::common::error::CorralError;
use crate::master::allocator::AllocationEngine;
use crate::master::comm::CommSenderRef;
use crate::master::core::CoreRef;
use crate::master::framework::Framework;
use crate::master::messages::FromFrameworkMessage;
use crate::master::reactor::{
    on_framework_lost, on_framework_registered, on_offer_accepted, on_offer_declined,
    on_task_terminated,
};
use crate::transfer::auth::{
    do_authentication, forward_queue_to_sealed_sink, open_message,
};
use crate::transfer::transport::make_protocol_builder;

pub const PROTOCOL_VERSION: u32 = 0;

const REGISTRATION_TIMEOUT: Duration = Duration::from_secs(15);

pub type AllocRef = Rc<RefCell<dyn AllocationEngine>>;

pub async fn connection_initiator(
    listener: TcpListener,
    core_ref: CoreRef,
    comm_ref: CommSenderRef,
    alloc_ref: AllocRef,
    secret_key: Option<Arc<SecretKey>>,
) -> crate::Result<()> {
    loop {
        let (socket, address) = listener.accept().await?;
        socket.set_nodelay(true)?;
        log::debug!("New scheduler connection: {address}");
        let core_ref = core_ref.clone();
        let comm_ref = comm_ref.clone();
        let alloc_ref = alloc_ref.clone();
        let secret_key = secret_key.clone();
        spawn_local(async move {
            match framework_connection(socket, core_ref, comm_ref, alloc_ref, secret_key).await {
                Ok(_) => log::debug!("Scheduler connection ended: {address}"),
                Err(e) => log::warn!("Scheduler connection {address} ended with: {e}"),
            }
        });
    }
}

pub(crate) async fn framework_connection<T: AsyncRead + AsyncWrite + Unpin>(
    socket: T,
    core_ref: CoreRef,
    comm_ref: CommSenderRef,
    alloc_ref: AllocRef,
    secret_key: Option<Arc<SecretKey>>,
) -> crate::Result<()> {
    let (mut writer, mut reader) = make_protocol_builder().new_framed(socket).split();
    let (sealer, mut opener) = do_authentication(
        PROTOCOL_VERSION,
        "master",
        "scheduler",
        secret_key,
        &mut writer,
        &mut reader,
    )
    .await?;

    let data = timeout(REGISTRATION_TIMEOUT, reader.next())
        .await
        .map_err(|_| "Framework registration did not arrive")?
        .ok_or_else(|| CorralError::from("Connection closed before registration"))??;
    let message: FromFrameworkMessage = open_message(&mut opener, &data)?;
    let FromFrameworkMessage::Register(registration) = message else {
        return Err("Expected framework registration".into());
    };

    let (queue_sender, queue_receiver) = tokio::sync::mpsc::unbounded_channel::<Bytes>();
    let framework_id = {
        let mut core = core_ref.get_mut();
        let mut comm = comm_ref.get_mut();
        let mut alloc = alloc_ref.borrow_mut();
        let framework_id = core.new_framework_id();
        comm.add_framework(framework_id, queue_sender);
        on_framework_registered(
            &mut core,
            &mut *comm,
            &mut *alloc,
            Framework::new(framework_id, registration.name, registration.roles),
        );
        framework_id
    };

    let send_loop = forward_queue_to_sealed_sink(queue_receiver, writer, sealer);
    let receive_loop = async {
        while let Some(data) = reader.next().await {
            let message: FromFrameworkMessage = open_message(&mut opener, &data?)?;
            handle_framework_message(&core_ref, &comm_ref, &alloc_ref, framework_id, message)?;
        }
        Ok(())
    };

    let result = tokio::select! {
        r = send_loop => r,
        r = receive_loop => r,
    };

    {
        let mut core = core_ref.get_mut();
        let mut comm = comm_ref.get_mut();
        let mut alloc = alloc_ref.borrow_mut();
        comm.remove_framework(framework_id);
        on_framework_lost(&mut core, &mut *comm, &mut *alloc, framework_id)?;
    }
    result
}

fn handle_framework_message(
    core_ref: &CoreRef,
    comm_ref: &CommSenderRef,
    alloc_ref: &AllocRef,
    framework_id: FrameworkId,
    message: FromFrameworkMessage,
) -> crate::Result<()> {
    let mut core = core_ref.get_mut();
    let mut comm = comm_ref.get_mut();
    let mut alloc = alloc_ref.borrow_mut();
    match message {
        FromFrameworkMessage::Register(_) => {
            log::warn!("Framework {framework_id} sent a duplicate registration");
        }
        FromFrameworkMessage::AcceptOffer { offer_id, tasks } => {
            on_offer_accepted(
                &mut core,
                &mut *comm,
                &mut *alloc,
                framework_id,
                offer_id,
                tasks,
            )?;
        }
        FromFrameworkMessage::DeclineOffer { offer_id } => {
            on_offer_declined(&mut core, &mut *comm, &mut *alloc, framework_id, offer_id)?;
        }
        FromFrameworkMessage::KillTask { task_id } => {
            // A framework may only kill its own tasks
            let owned = core
                .tasks()
                .get(&task_id)
                .map(|task| task.framework_id == framework_id)
                .unwrap_or(false);
            if owned {
                on_task_terminated(&mut core, &mut *comm, &mut *alloc, task_id)?;
            } else {
                log::debug!("Framework {framework_id} tried to kill foreign task {task_id}");
            }
        }
    }
    Ok(())
}
