/// In-memory cluster used by the test suites
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use super::api::{ClusterApi, ListOptions, ResourceKind};
use super::client::ClusterClient;
use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Get,
    Replace,
    Delete,
    List,
}

/// One recorded call against the fake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub operation: Operation,
    pub kind: ResourceKind,
    pub namespace: String,
    pub name: String,
}

/// Failure to inject for a given operation and kind.
#[derive(Debug, Clone, Copy)]
pub enum FakeFailure {
    AlreadyExists,
    NotFound,
    Forbidden,
    Transport,
}

type Key = (ResourceKind, String, String);
type Hook = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct State {
    objects: BTreeMap<Key, Value>,
    calls: Vec<Call>,
    fail_next: HashMap<(Operation, ResourceKind), Vec<FakeFailure>>,
    fail_always: HashMap<(Operation, ResourceKind), FakeFailure>,
    hang: HashSet<(Operation, ResourceKind)>,
    hooks: HashMap<(Operation, ResourceKind), Hook>,
    revision: u64,
    next_ip: u8,
}

/// Behaves like a tiny API server: names are unique per kind and namespace,
/// every write bumps `resourceVersion`, and services get a cluster IP.
#[derive(Default)]
pub struct FakeCluster {
    state: Mutex<State>,
}

impl FakeCluster {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn client(self: &Arc<Self>) -> ClusterClient {
        ClusterClient::new(self.clone())
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Calls that mutate the cluster, in order.
    pub fn writes(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| {
                matches!(
                    c.operation,
                    Operation::Create | Operation::Replace | Operation::Delete
                )
            })
            .collect()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    pub fn fail_next(&self, operation: Operation, kind: ResourceKind, failure: FakeFailure) {
        self.state
            .lock()
            .unwrap()
            .fail_next
            .entry((operation, kind))
            .or_default()
            .push(failure);
    }

    pub fn fail_always(&self, operation: Operation, kind: ResourceKind, failure: FakeFailure) {
        self.state
            .lock()
            .unwrap()
            .fail_always
            .insert((operation, kind), failure);
    }

    pub fn heal(&self) {
        let mut state = self.state.lock().unwrap();
        state.fail_always.clear();
        state.fail_next.clear();
        state.hang.clear();
    }

    /// Make matching calls never complete.
    pub fn hang(&self, operation: Operation, kind: ResourceKind) {
        self.state.lock().unwrap().hang.insert((operation, kind));
    }

    /// Run `hook` after every successful matching call.
    pub fn after(
        &self,
        operation: Operation,
        kind: ResourceKind,
        hook: impl Fn() + Send + Sync + 'static,
    ) {
        self.state
            .lock()
            .unwrap()
            .hooks
            .insert((operation, kind), Arc::new(hook));
    }

    pub fn object(&self, kind: ResourceKind, namespace: &str, name: &str) -> Option<Value> {
        let key = key(kind, namespace, name);
        self.state.lock().unwrap().objects.get(&key).cloned()
    }

    pub fn names(&self, kind: ResourceKind) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .objects
            .keys()
            .filter(|(k, _, _)| *k == kind)
            .map(|(_, _, name)| name.clone())
            .collect()
    }

    /// Seed or overwrite an object without recording a call.
    pub fn insert(&self, kind: ResourceKind, namespace: &str, name: &str, object: Value) {
        let key = key(kind, namespace, name);
        self.state.lock().unwrap().objects.insert(key, object);
    }

    /// Overwrite the `status` stanza of a stored object, as a controller would.
    pub fn set_status(&self, kind: ResourceKind, namespace: &str, name: &str, status: Value) {
        let key = key(kind, namespace, name);
        let mut state = self.state.lock().unwrap();
        if let Some(object) = state.objects.get_mut(&key) {
            object["status"] = status;
        }
    }

    async fn enter(
        &self,
        operation: Operation,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<(), Error> {
        let (failure, hang) = {
            let mut state = self.state.lock().unwrap();
            state.calls.push(Call {
                operation,
                kind,
                namespace: namespace.to_string(),
                name: name.to_string(),
            });
            let one_shot = state
                .fail_next
                .get_mut(&(operation, kind))
                .and_then(|queue| (!queue.is_empty()).then(|| queue.remove(0)));
            let failure = one_shot.or_else(|| state.fail_always.get(&(operation, kind)).copied());
            (failure, state.hang.contains(&(operation, kind)))
        };

        if hang {
            std::future::pending::<()>().await;
        }

        match failure {
            Some(failure) => Err(failure_error(failure, kind, namespace, name)),
            None => Ok(()),
        }
    }

    fn fire(&self, operation: Operation, kind: ResourceKind) {
        let hook = self
            .state
            .lock()
            .unwrap()
            .hooks
            .get(&(operation, kind))
            .cloned();
        if let Some(hook) = hook {
            hook();
        }
    }
}

fn key(kind: ResourceKind, namespace: &str, name: &str) -> Key {
    let namespace = if kind.is_namespaced() { namespace } else { "" };
    (kind, namespace.to_string(), name.to_string())
}

fn failure_error(failure: FakeFailure, kind: ResourceKind, namespace: &str, name: &str) -> Error {
    match failure {
        FakeFailure::AlreadyExists => Error::AlreadyExists {
            kind,
            namespace: namespace.to_string(),
            name: name.to_string(),
        },
        FakeFailure::NotFound => not_found(kind, namespace, name),
        FakeFailure::Forbidden => Error::Api {
            code: 403,
            reason: "Forbidden".to_string(),
            message: format!("cannot modify {} {}", kind, name),
        },
        FakeFailure::Transport => Error::Transport("connection refused".to_string()),
    }
}

fn not_found(kind: ResourceKind, namespace: &str, name: &str) -> Error {
    Error::NotFound {
        kind,
        namespace: namespace.to_string(),
        name: name.to_string(),
    }
}

fn name_of(object: &Value) -> String {
    object
        .pointer("/metadata/name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn matches_selector(object: &Value, selector: &str) -> bool {
    selector
        .split(',')
        .filter(|term| !term.is_empty())
        .all(|term| match term.split_once('=') {
            Some((label, value)) => {
                object
                    .pointer(&format!("/metadata/labels/{}", label.replace('/', "~1")))
                    .and_then(Value::as_str)
                    == Some(value)
            }
            None => false,
        })
}

#[async_trait]
impl ClusterApi for FakeCluster {
    async fn create(
        &self,
        kind: ResourceKind,
        namespace: &str,
        mut object: Value,
    ) -> Result<Value, Error> {
        let name = name_of(&object);
        self.enter(Operation::Create, kind, namespace, &name).await?;

        {
            let mut state = self.state.lock().unwrap();
            let key = key(kind, namespace, &name);
            if state.objects.contains_key(&key) {
                return Err(Error::AlreadyExists {
                    kind,
                    namespace: namespace.to_string(),
                    name,
                });
            }

            state.revision += 1;
            object["metadata"]["resourceVersion"] = json!(state.revision.to_string());
            object["metadata"]["uid"] = json!(format!("uid-{}", state.revision));
            if kind == ResourceKind::Service && object.pointer("/spec/clusterIP").is_none() {
                state.next_ip += 1;
                object["spec"]["clusterIP"] = json!(format!("10.96.0.{}", state.next_ip));
            }
            state.objects.insert(key, object.clone());
        }

        self.fire(Operation::Create, kind);
        Ok(object)
    }

    async fn get(&self, kind: ResourceKind, namespace: &str, name: &str) -> Result<Value, Error> {
        self.enter(Operation::Get, kind, namespace, name).await?;

        let object = self
            .state
            .lock()
            .unwrap()
            .objects
            .get(&key(kind, namespace, name))
            .cloned()
            .ok_or_else(|| not_found(kind, namespace, name))?;

        self.fire(Operation::Get, kind);
        Ok(object)
    }

    async fn replace(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
        mut object: Value,
    ) -> Result<Value, Error> {
        self.enter(Operation::Replace, kind, namespace, name).await?;

        {
            let mut state = self.state.lock().unwrap();
            let key = key(kind, namespace, name);
            let current = state
                .objects
                .get(&key)
                .cloned()
                .ok_or_else(|| not_found(kind, namespace, name))?;

            let sent_version = object.pointer("/metadata/resourceVersion").cloned();
            let current_version = current.pointer("/metadata/resourceVersion").cloned();
            if sent_version.is_some() && sent_version != current_version {
                return Err(Error::Api {
                    code: 409,
                    reason: "Conflict".to_string(),
                    message: "the object has been modified".to_string(),
                });
            }

            if kind == ResourceKind::Service {
                let current_ip = current.pointer("/spec/clusterIP").cloned();
                let sent_ip = object.pointer("/spec/clusterIP").cloned();
                match (sent_ip, current_ip) {
                    (Some(sent), current) if Some(&sent) != current.as_ref() => {
                        return Err(Error::Api {
                            code: 422,
                            reason: "Invalid".to_string(),
                            message: "spec.clusterIP: field is immutable".to_string(),
                        });
                    }
                    (None, Some(ip)) => object["spec"]["clusterIP"] = ip,
                    _ => {}
                }
            }

            if let Some(status) = current.get("status") {
                object["status"] = status.clone();
            }
            if let Some(uid) = current.pointer("/metadata/uid") {
                object["metadata"]["uid"] = uid.clone();
            }
            state.revision += 1;
            object["metadata"]["resourceVersion"] = json!(state.revision.to_string());
            state.objects.insert(key, object.clone());
        }

        self.fire(Operation::Replace, kind);
        Ok(object)
    }

    async fn delete(&self, kind: ResourceKind, namespace: &str, name: &str) -> Result<(), Error> {
        self.enter(Operation::Delete, kind, namespace, name).await?;

        self.state
            .lock()
            .unwrap()
            .objects
            .remove(&key(kind, namespace, name))
            .ok_or_else(|| not_found(kind, namespace, name))?;

        self.fire(Operation::Delete, kind);
        Ok(())
    }

    async fn list(
        &self,
        kind: ResourceKind,
        namespace: &str,
        options: &ListOptions,
    ) -> Result<Vec<Value>, Error> {
        self.enter(Operation::List, kind, namespace, "").await?;

        let state = self.state.lock().unwrap();
        let scope = if kind.is_namespaced() { namespace } else { "" };
        let items = state
            .objects
            .iter()
            .filter(|((k, ns, _), _)| *k == kind && (scope.is_empty() || ns == scope))
            .map(|(_, object)| object)
            .filter(|object| {
                options
                    .label_selector
                    .as_deref()
                    .map_or(true, |selector| matches_selector(object, selector))
            })
            .take(options.limit.map_or(usize::MAX, |limit| limit as usize))
            .cloned()
            .collect();

        Ok(items)
    }
}
