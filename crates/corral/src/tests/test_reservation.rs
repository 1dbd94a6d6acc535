use crate::auth::acl::{ReserveAcl, UnreserveAcl};
use crate::auth::{Acls, Entity};
use crate::master::messages::{TaskSpec, ToFrameworkMessage};
use crate::master::reservation::ReservationError;
use crate::tests::utils::{TestEnv, res, reserved, single_offer};
use crate::{AgentId, TaskId};

#[test]
fn test_reserve_available_resources() {
    let mut env = TestEnv::new();
    let agent_id = env.add_agent("cpus:1;mem:512");
    let framework_id = env.add_framework("fw", &["role"]);

    let delta = reserved("cpus:1;mem:512", "role", "ops");
    env.reserve("ops", agent_id, delta.clone()).unwrap();
    env.comm.check_need_allocation();
    env.check_conservation();
    assert!(env.free(agent_id).contains(&delta));

    // The next allocation pass offers the reserved resources to the
    // framework subscribed to their role
    let (to, _, offered) = single_offer(env.allocate());
    assert_eq!(to, framework_id);
    assert!(offered.contains(&delta));
    env.check_conservation();
}

#[test]
fn test_unreserve_available_resources() {
    let mut env = TestEnv::new();
    let agent_id = env.add_agent("cpus:1;mem:512");

    let delta = reserved("cpus:1;mem:512", "role", "ops");
    env.reserve("ops", agent_id, delta.clone()).unwrap();
    env.unreserve("ops", agent_id, delta).unwrap();
    env.check_conservation();
    assert_eq!(env.free(agent_id), res("cpus:1;mem:512"));
}

#[test]
fn test_insufficient_resources() {
    let mut env = TestEnv::new();
    let agent_id = env.add_agent("cpus:1;mem:512");
    let delta = reserved("cpus:4;mem:4096", "role", "ops");

    let err = env.reserve("ops", agent_id, delta.clone()).unwrap_err();
    assert!(matches!(err, ReservationError::InsufficientResources { .. }));
    let err = env.unreserve("ops", agent_id, delta).unwrap_err();
    assert!(matches!(err, ReservationError::InsufficientResources { .. }));

    assert_eq!(env.free(agent_id), res("cpus:1;mem:512"));
    env.comm.emptiness_check();
    assert!(env.alloc.recovered.is_empty());
    env.check_conservation();
}

#[test]
fn test_reserve_offered_resources_rescinds_first() {
    let mut env = TestEnv::new();
    let agent_id = env.add_agent("cpus:1;mem:512");
    let framework_id = env.add_framework("fw", &["role"]);

    let (_, offer_id, offered) = single_offer(env.allocate());
    assert_eq!(offered, res("cpus:1;mem:512"));
    assert!(env.free(agent_id).is_empty());

    // Reserving resources embedded in the outstanding offer succeeds and
    // withdraws the offer first
    let delta = reserved("cpus:1;mem:512", "role", "ops");
    env.reserve("ops", agent_id, delta.clone()).unwrap();
    env.check_conservation();

    let messages = env.comm.take_messages();
    assert!(matches!(
        messages.as_slice(),
        [(to, ToFrameworkMessage::RescindOffer { offer_id: rescinded })]
            if *to == framework_id && *rescinded == offer_id
    ));
    let recovered = env.alloc.take_recovered();
    assert_eq!(recovered.len(), 1);
    assert_eq!(recovered[0].1, agent_id);
    assert_eq!(recovered[0].2, res("cpus:1;mem:512"));
    assert!(env.core.offers().is_empty());
    assert!(env.free(agent_id).contains(&delta));

    // The framework is re-offered the resources, now tagged
    let (to, new_offer_id, offered) = single_offer(env.allocate());
    assert_eq!(to, framework_id);
    assert_ne!(new_offer_id, offer_id);
    assert!(offered.contains(&delta));
}

#[test]
fn test_unreserve_offered_resources_rescinds_first() {
    let mut env = TestEnv::new();
    let agent_id = env.add_agent("cpus:1;mem:512");
    let framework_id = env.add_framework("fw", &["role"]);

    let delta = reserved("cpus:1;mem:512", "role", "ops");
    env.reserve("ops", agent_id, delta.clone()).unwrap();
    let (_, offer_id, offered) = single_offer(env.allocate());
    assert!(offered.contains(&delta));

    env.unreserve("ops", agent_id, delta).unwrap();
    env.check_conservation();

    let messages = env.comm.take_messages();
    assert!(matches!(
        messages.as_slice(),
        [(to, ToFrameworkMessage::RescindOffer { offer_id: rescinded })]
            if *to == framework_id && *rescinded == offer_id
    ));
    assert_eq!(env.free(agent_id), res("cpus:1;mem:512"));

    let (_, _, offered) = single_offer(env.allocate());
    assert_eq!(offered, res("cpus:1;mem:512"));
}

#[test]
fn test_reserve_mix_of_available_and_offered() {
    let mut env = TestEnv::new();
    let agent_id = env.add_agent("cpus:1;mem:512");
    let framework_id = env.add_framework("fw", &["role"]);

    // Get the cluster into a state where mem:384 is offered and
    // cpus:1;mem:128 is free: launch a task on the latter, offer the
    // remainder, then kill the task
    let (_, offer_id, _) = single_offer(env.allocate());
    env.accept_offer(
        framework_id,
        offer_id,
        vec![TaskSpec {
            task_id: TaskId::new(1),
            resources: res("cpus:1;mem:128"),
        }],
    );
    env.alloc.take_recovered();
    let (_, _, offered) = single_offer(env.allocate());
    assert_eq!(offered, res("mem:384"));
    env.terminate_task(TaskId::new(1));
    env.alloc.take_recovered();
    assert_eq!(env.free(agent_id), res("cpus:1;mem:128"));
    env.check_conservation();

    // The whole set, partially free and partially offered, is reservable
    let delta = reserved("cpus:1;mem:512", "role", "ops");
    env.reserve("ops", agent_id, delta.clone()).unwrap();
    env.check_conservation();
    assert!(env.free(agent_id).contains(&delta));
    assert!(env.core.offers().is_empty());
}

#[test]
fn test_reserve_does_not_draw_on_allocated() {
    let mut env = TestEnv::new();
    let agent_id = env.add_agent("cpus:2;mem:1024");
    let framework_id = env.add_framework("fw", &["role"]);

    let (_, offer_id, _) = single_offer(env.allocate());
    env.accept_offer(
        framework_id,
        offer_id,
        vec![TaskSpec {
            task_id: TaskId::new(1),
            resources: res("cpus:1;mem:512"),
        }],
    );
    env.comm.take_messages();
    env.alloc.take_recovered();
    env.check_conservation();

    // Resources bound to the running task are not reservable
    let err = env
        .reserve("ops", agent_id, reserved("cpus:2", "role", "ops"))
        .unwrap_err();
    assert!(matches!(err, ReservationError::InsufficientResources { .. }));

    // The unallocated remainder is
    env.reserve("ops", agent_id, reserved("cpus:1;mem:512", "role", "ops"))
        .unwrap();
    env.check_conservation();
}

#[test]
fn test_malformed_requests_have_no_effect() {
    let mut env = TestEnv::new();
    let agent_id = env.add_agent("cpus:1;mem:512");
    env.add_framework("fw", &["role"]);
    let (_, offer_id, _) = single_offer(env.allocate());
    let free_before = env.free(agent_id);

    // Unknown agent
    let err = env
        .reserve("ops", AgentId::new(99), reserved("cpus:1", "role", "ops"))
        .unwrap_err();
    assert!(matches!(err, ReservationError::MalformedRequest(_)));

    // Empty resource list
    let err = env.reserve("ops", agent_id, Default::default()).unwrap_err();
    assert!(matches!(err, ReservationError::MalformedRequest(_)));

    // Resources without a reservation tag
    let err = env.reserve("ops", agent_id, res("cpus:1")).unwrap_err();
    assert!(matches!(err, ReservationError::MalformedRequest(_)));
    let err = env.unreserve("ops", agent_id, res("cpus:1")).unwrap_err();
    assert!(matches!(err, ReservationError::MalformedRequest(_)));

    // Roles must agree within one request
    let mixed = reserved("cpus:1", "role", "ops")
        .union(&reserved("mem:128", "other", "ops"))
        .unwrap();
    let err = env.reserve("ops", agent_id, mixed).unwrap_err();
    assert!(matches!(err, ReservationError::MalformedRequest(_)));

    // A reserve request must be stamped with the caller's own principal,
    // independent of ACL configuration
    let err = env
        .reserve("ops", agent_id, reserved("cpus:1", "role", "badPrincipal"))
        .unwrap_err();
    assert!(matches!(err, ReservationError::MalformedRequest(_)));

    // None of the above touched the ledger or the outstanding offer
    assert_eq!(env.free(agent_id), free_before);
    assert!(env.core.offers().get(offer_id).is_some());
    env.comm.emptiness_check();
    assert!(env.alloc.recovered.is_empty());
    env.check_conservation();
}

#[test]
fn test_reserve_denied_by_acl() {
    let acls = Acls {
        permissive: true,
        reserve: vec![ReserveAcl {
            principals: Entity::any(),
            roles: Entity::none(),
        }],
        unreserve: Vec::new(),
    };
    let mut env = TestEnv::with_acls(acls);
    let agent_id = env.add_agent("cpus:1;mem:512");

    let err = env
        .reserve("ops", agent_id, reserved("cpus:1", "role", "ops"))
        .unwrap_err();
    assert!(matches!(err, ReservationError::Unauthorized(_)));
    assert_eq!(env.free(agent_id), res("cpus:1;mem:512"));
    env.comm.emptiness_check();
}

#[test]
fn test_unreserve_checks_reserver_principal() {
    // Anyone may reserve; a principal may only unreserve what it reserved
    // itself
    let acls = Acls {
        permissive: false,
        reserve: vec![ReserveAcl {
            principals: Entity::any(),
            roles: Entity::any(),
        }],
        unreserve: vec![UnreserveAcl {
            principals: Entity::values(["ops"]),
            reserver_principals: Entity::values(["ops"]),
        }],
    };
    let mut env = TestEnv::with_acls(acls);
    let agent_id = env.add_agent("cpus:1;mem:512");

    let delta = reserved("cpus:1", "role", "ops");
    env.reserve("ops", agent_id, delta.clone()).unwrap();

    let err = env
        .unreserve("intruder", agent_id, delta.clone())
        .unwrap_err();
    assert!(matches!(err, ReservationError::Unauthorized(_)));
    assert!(env.free(agent_id).contains(&delta));

    env.unreserve("ops", agent_id, delta).unwrap();
    assert_eq!(env.free(agent_id), res("cpus:1;mem:512"));
    env.check_conservation();
}

#[test]
fn test_reserve_for_default_role_is_malformed() {
    let mut env = TestEnv::new();
    let agent_id = env.add_agent("cpus:1");
    let err = env
        .reserve("ops", agent_id, reserved("cpus:1", "*", "ops"))
        .unwrap_err();
    assert!(matches!(err, ReservationError::MalformedRequest(_)));
}

#[test]
fn test_repeated_reservations_stack() {
    let mut env = TestEnv::new();
    let agent_id = env.add_agent("cpus:4");

    env.reserve("ops", agent_id, reserved("cpus:1", "role", "ops"))
        .unwrap();
    env.reserve("ops", agent_id, reserved("cpus:1", "role", "ops"))
        .unwrap();
    env.check_conservation();
    assert!(env.free(agent_id).contains(&reserved("cpus:2", "role", "ops")));
    assert!(env.free(agent_id).contains(&res("cpus:2")));

    // Only two cpus are reserved, a third unreserve of two fails
    env.unreserve("ops", agent_id, reserved("cpus:2", "role", "ops"))
        .unwrap();
    let err = env
        .unreserve("ops", agent_id, reserved("cpus:2", "role", "ops"))
        .unwrap_err();
    assert!(matches!(err, ReservationError::InsufficientResources { .. }));
    assert_eq!(env.free(agent_id), res("cpus:4"));
}
