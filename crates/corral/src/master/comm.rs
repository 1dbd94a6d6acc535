use std::rc::Rc;

use bytes::Bytes;
use tokio::sync::Notify;
use tokio::sync::mpsc::UnboundedSender;

use crate::master::messages::ToFrameworkMessage;
use crate::transfer::auth::serialize;
use crate::{FrameworkId, Map, WrappedRcRefCell};

/// Outbound side of the master: messages to schedulers plus the wakeup of
/// the allocation loop. The trait keeps the reactor testable without
/// connections.
pub trait Comm {
    fn send_framework_message(&mut self, framework_id: FrameworkId, message: &ToFrameworkMessage);
    fn ask_for_allocation(&mut self);
}

pub struct CommSender {
    frameworks: Map<FrameworkId, UnboundedSender<Bytes>>,
    need_allocation: bool,
    allocator_wakeup: Rc<Notify>,
}

pub type CommSenderRef = WrappedRcRefCell<CommSender>;

impl CommSenderRef {
    pub fn new(allocator_wakeup: Rc<Notify>) -> Self {
        WrappedRcRefCell::wrap(CommSender {
            frameworks: Default::default(),
            need_allocation: false,
            allocator_wakeup,
        })
    }
}

impl CommSender {
    pub fn add_framework(&mut self, framework_id: FrameworkId, sender: UnboundedSender<Bytes>) {
        assert!(self.frameworks.insert(framework_id, sender).is_none());
    }

    pub fn remove_framework(&mut self, framework_id: FrameworkId) {
        assert!(self.frameworks.remove(&framework_id).is_some());
    }

    pub fn reset_allocation_flag(&mut self) {
        self.need_allocation = false;
    }

    pub fn get_allocation_flag(&self) -> bool {
        self.need_allocation
    }
}

impl Comm for CommSender {
    fn send_framework_message(&mut self, framework_id: FrameworkId, message: &ToFrameworkMessage) {
        // Notifications are advisory; a lost or lagging scheduler must not
        // hold back the ledger, so send failures are only logged.
        let Some(sender) = self.frameworks.get(&framework_id) else {
            log::debug!("Dropping message for unconnected framework {framework_id}");
            return;
        };
        match serialize(message) {
            Ok(data) => {
                if sender.send(data.into()).is_err() {
                    log::debug!("Sending to framework {framework_id} failed, connection is gone");
                }
            }
            Err(e) => log::error!("Cannot serialize framework message: {e}"),
        }
    }

    #[inline]
    fn ask_for_allocation(&mut self) {
        if !self.need_allocation {
            self.need_allocation = true;
            self.allocator_wakeup.notify_one();
        }
    }
}
