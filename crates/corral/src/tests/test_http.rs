use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use axum::http::{Request, StatusCode};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use tokio::sync::Notify;
use tokio::sync::mpsc::unbounded_channel;
use tokio::task::LocalSet;
use tower::ServiceExt;

use crate::auth::acl::ReserveAcl;
use crate::auth::authn::Credential;
use crate::auth::{Acls, CredentialStore, Entity};
use crate::master::allocator::RoundRobinAllocator;
use crate::master::comm::CommSenderRef;
use crate::master::core::CoreRef;
use crate::master::http::{HttpState, make_router};
use crate::master::reactor::on_new_agent;
use crate::master::rpc::AllocRef;
use crate::master::start::operator_loop;
use crate::tests::utils::{res, reserved};

/// Spawns a live reactor on the current `LocalSet` and returns the operator
/// router backed by it, plus the core for direct inspection.
fn start_master(acls: Acls) -> (Router, CoreRef) {
    let core_ref = CoreRef::new();
    let wakeup = Rc::new(Notify::new());
    let comm_ref = CommSenderRef::new(wakeup);
    let alloc_ref: AllocRef = Rc::new(RefCell::new(RoundRobinAllocator::default()));

    {
        let mut core = core_ref.get_mut();
        let mut comm = comm_ref.get_mut();
        let mut alloc = alloc_ref.borrow_mut();
        on_new_agent(
            &mut core,
            &mut *comm,
            &mut *alloc,
            "node0".to_string(),
            res("cpus:1;mem:512"),
        );
    }

    let (operations_sender, operations_receiver) = unbounded_channel();
    tokio::task::spawn_local(operator_loop(
        operations_receiver,
        core_ref.clone(),
        comm_ref,
        alloc_ref,
        Rc::new(acls),
    ));

    let credentials = CredentialStore::new([Credential {
        principal: "ops".to_string(),
        secret: "hunter2".to_string(),
    }]);
    let router = make_router(HttpState::new(Arc::new(credentials), operations_sender));
    (router, core_ref)
}

fn form_body(fields: &[(&str, &str)]) -> String {
    serde_urlencoded::to_string(fields).unwrap()
}

fn reserved_json(spec: &str, role: &str, principal: &str) -> String {
    serde_json::to_string(&reserved(spec, role, principal)).unwrap()
}

async fn post(
    router: &Router,
    path: &str,
    credentials: Option<(&str, &str)>,
    body: String,
) -> axum::response::Response {
    let mut request = Request::builder().method("POST").uri(path);
    if let Some((principal, secret)) = credentials {
        let encoded = BASE64.encode(format!("{principal}:{secret}"));
        request = request.header(AUTHORIZATION, format!("Basic {encoded}"));
    }
    router
        .clone()
        .oneshot(request.body(Body::from(body)).unwrap())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_reserve_and_unreserve_endpoints() {
    LocalSet::new()
        .run_until(async {
            let (router, core_ref) = start_master(Acls::default());
            let resources = reserved_json("cpus:1;mem:512", "role", "ops");
            let body = form_body(&[("slaveId", "1"), ("resources", &resources)]);

            let response = post(&router, "/reserve", Some(("ops", "hunter2")), body.clone()).await;
            assert_eq!(response.status(), StatusCode::OK);
            {
                let core = core_ref.get();
                let free = core.agents().get_agent(1.into()).free().unwrap();
                assert!(free.contains(&reserved("cpus:1;mem:512", "role", "ops")));
            }

            let response = post(&router, "/unreserve", Some(("ops", "hunter2")), body).await;
            assert_eq!(response.status(), StatusCode::OK);
            {
                let core = core_ref.get();
                let free = core.agents().get_agent(1.into()).free().unwrap();
                assert_eq!(free, res("cpus:1;mem:512"));
            }
        })
        .await;
}

#[tokio::test]
async fn test_insufficient_resources_is_conflict() {
    LocalSet::new()
        .run_until(async {
            let (router, _core) = start_master(Acls::default());
            let resources = reserved_json("cpus:4;mem:4096", "role", "ops");
            let body = form_body(&[("slaveId", "1"), ("resources", &resources)]);

            for path in ["/reserve", "/unreserve"] {
                let response = post(&router, path, Some(("ops", "hunter2")), body.clone()).await;
                assert_eq!(response.status(), StatusCode::CONFLICT);
            }
        })
        .await;
}

#[tokio::test]
async fn test_missing_slave_id_is_bad_request() {
    LocalSet::new()
        .run_until(async {
            let (router, _core) = start_master(Acls::default());
            let resources = reserved_json("cpus:1;mem:512", "role", "ops");
            let body = form_body(&[("resources", &resources)]);

            for path in ["/reserve", "/unreserve"] {
                let response = post(&router, path, Some(("ops", "hunter2")), body.clone()).await;
                assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            }
        })
        .await;
}

#[tokio::test]
async fn test_missing_resources_is_bad_request() {
    LocalSet::new()
        .run_until(async {
            let (router, _core) = start_master(Acls::default());
            let body = form_body(&[("slaveId", "1")]);

            for path in ["/reserve", "/unreserve"] {
                let response = post(&router, path, Some(("ops", "hunter2")), body.clone()).await;
                assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            }
        })
        .await;
}

#[tokio::test]
async fn test_missing_and_bad_credentials_are_unauthorized() {
    LocalSet::new()
        .run_until(async {
            let (router, _core) = start_master(Acls::default());
            let resources = reserved_json("cpus:1;mem:512", "role", "ops");
            let body = form_body(&[("slaveId", "1"), ("resources", &resources)]);

            let response = post(&router, "/reserve", None, body.clone()).await;
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
            assert!(response.headers().contains_key(WWW_AUTHENTICATE));

            let response =
                post(&router, "/unreserve", Some(("ops", "bad-secret")), body.clone()).await;
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

            let response = post(&router, "/reserve", Some(("bad-principal", "x")), body).await;
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        })
        .await;
}

#[tokio::test]
async fn test_acl_denial_is_forbidden() {
    LocalSet::new()
        .run_until(async {
            let acls = Acls {
                permissive: true,
                reserve: vec![ReserveAcl {
                    principals: Entity::any(),
                    roles: Entity::none(),
                }],
                unreserve: Vec::new(),
            };
            let (router, _core) = start_master(acls);
            let resources = reserved_json("cpus:1;mem:512", "role", "ops");
            let body = form_body(&[("slaveId", "1"), ("resources", &resources)]);

            let response = post(&router, "/reserve", Some(("ops", "hunter2")), body).await;
            assert_eq!(response.status(), StatusCode::FORBIDDEN);
        })
        .await;
}

#[tokio::test]
async fn test_principal_mismatch_is_bad_request() {
    LocalSet::new()
        .run_until(async {
            let (router, _core) = start_master(Acls::default());
            let resources = reserved_json("cpus:1;mem:512", "role", "badPrincipal");
            let body = form_body(&[("slaveId", "1"), ("resources", &resources)]);

            let response = post(&router, "/reserve", Some(("ops", "hunter2")), body).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        })
        .await;
}

#[tokio::test]
async fn test_unknown_agent_is_bad_request() {
    LocalSet::new()
        .run_until(async {
            let (router, _core) = start_master(Acls::default());
            let resources = reserved_json("cpus:1;mem:512", "role", "ops");
            let body = form_body(&[("slaveId", "99"), ("resources", &resources)]);

            let response = post(&router, "/reserve", Some(("ops", "hunter2")), body).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        })
        .await;
}
