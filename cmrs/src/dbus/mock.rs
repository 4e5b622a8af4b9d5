//! In-memory [`RemoteObject`] for tests.
//!
//! Records every call and lets tests script replies and error replies.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use zvariant::{OwnedObjectPath, OwnedValue};

use super::{CallArgs, PropertyMap, RemoteObject};
use crate::Result;
use crate::api::models::{CallClass, ConnectivityError};
use crate::util::utils::{as_bool, as_string};

/// A call captured by [`MockRemote`], with arguments rendered as text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    /// Method name.
    pub method: String,
    /// Arguments in order; `SetProperty` values are rendered when simple.
    pub args: Vec<String>,
    /// Timeout class the call was issued with.
    pub class: CallClass,
}

/// Mock remote object.
///
/// Clones share state, so a test can keep one handle while the code under
/// test owns another.
#[derive(Debug, Clone)]
pub struct MockRemote {
    path: String,
    inner: Arc<Mutex<MockRemoteInner>>,
}

#[derive(Debug, Default)]
struct MockRemoteInner {
    calls: Vec<RecordedCall>,
    properties: PropertyMap,
    failures: HashMap<String, String>,
    path_replies: VecDeque<OwnedObjectPath>,
    children: Vec<(OwnedObjectPath, PropertyMap)>,
}

impl MockRemote {
    /// Create a mock object at `path`.
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            inner: Arc::default(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockRemoteInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set one property returned by `GetProperties`.
    pub fn set_property(&self, key: &str, value: OwnedValue) {
        self.lock().properties.insert(key.to_string(), value);
    }

    /// Make the next call to `method` fail with the D-Bus error `error_name`.
    pub fn fail_next(&self, method: &str, error_name: &str) {
        self.lock()
            .failures
            .insert(method.to_string(), error_name.to_string());
    }

    /// Queue a path returned by the next `invoke_for_path`.
    pub fn queue_path(&self, path: OwnedObjectPath) {
        self.lock().path_replies.push_back(path);
    }

    /// Add a child object returned by `list_children`.
    pub fn add_child(&self, path: OwnedObjectPath, properties: PropertyMap) {
        self.lock().children.push((path, properties));
    }

    /// Every call made so far.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock().calls.clone()
    }

    /// Method names of every call made so far.
    pub fn methods(&self) -> Vec<String> {
        self.lock().calls.iter().map(|c| c.method.clone()).collect()
    }

    /// The most recent call.
    pub fn last_call(&self) -> Option<RecordedCall> {
        self.lock().calls.last().cloned()
    }

    fn record(&self, method: &str, args: &CallArgs, class: CallClass) -> Result<()> {
        let mut inner = self.lock();
        inner.calls.push(RecordedCall {
            method: method.to_string(),
            args: render(args),
            class,
        });

        match inner.failures.remove(method) {
            Some(name) => Err(ConnectivityError::MethodFailed {
                name,
                message: None,
            }),
            None => Ok(()),
        }
    }
}

fn render(args: &CallArgs) -> Vec<String> {
    match args {
        CallArgs::None => Vec::new(),
        CallArgs::Str(strings) => strings.clone(),
        CallArgs::Path(path) => vec![path.to_string()],
        CallArgs::KeyValue(key, value) => {
            let rendered = as_string(value)
                .or_else(|| as_bool(value).map(|b| b.to_string()))
                .unwrap_or_else(|| format!("{value:?}"));
            vec![key.clone(), rendered]
        }
    }
}

fn clone_map(map: &PropertyMap) -> Result<PropertyMap> {
    map.iter()
        .map(|(k, v)| Ok((k.clone(), v.try_clone()?)))
        .collect()
}

#[async_trait]
impl RemoteObject for MockRemote {
    fn object_path(&self) -> &str {
        &self.path
    }

    async fn get_properties(&self) -> Result<PropertyMap> {
        self.record("GetProperties", &CallArgs::None, CallClass::Default)?;
        clone_map(&self.lock().properties)
    }

    async fn invoke(&self, method: &str, args: CallArgs, class: CallClass) -> Result<()> {
        self.record(method, &args, class)
    }

    async fn invoke_for_path(&self, method: &str, args: CallArgs) -> Result<OwnedObjectPath> {
        self.record(method, &args, CallClass::Default)?;
        self.lock()
            .path_replies
            .pop_front()
            .ok_or_else(|| ConnectivityError::MethodFailed {
                name: "org.freedesktop.DBus.Error.NoReply".into(),
                message: Some(format!("no reply queued for {method}")),
            })
    }

    async fn list_children(&self, method: &str) -> Result<Vec<(OwnedObjectPath, PropertyMap)>> {
        self.record(method, &CallArgs::None, CallClass::Default)?;
        self.lock()
            .children
            .iter()
            .map(|(path, props)| Ok((path.clone(), clone_map(props)?)))
            .collect()
    }
}
