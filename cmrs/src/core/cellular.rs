//! Cellular internet context setup.
//!
//! Setting up mobile data on an oFono modem takes several calls on two
//! objects: find or create the `internet` context on the connection manager,
//! then write its name, APN and credentials on the context itself.
//! [`ContextWizard`] holds the sequencing as plain state so it can be tested
//! without a bus; [`setup_internet_context`] drives it.
//!
//! A context with an empty APN and no credentials is reported as
//! unconfigured. It is reused by the wizard, never deleted behind the
//! user's back.

use log::{debug, warn};
use std::future::Future;
use zvariant::OwnedObjectPath;

use crate::Result;
use crate::api::models::{CallClass, CellularContext, ConnectivityError, ContextSettings};
use crate::dbus::{CallArgs, PropertyMap, RemoteObject};
use crate::types::constants::{members, modem_keys, ofono};
use crate::util::utils::{as_bool, as_nonempty_string, as_string, encode_string};

/// Where the wizard is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum WizardState {
    Idle,
    ListingContexts,
    Creating,
    Configuring(OwnedObjectPath),
    Done(OwnedObjectPath),
    Failed(String),
}

/// Next bus operation the wizard needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum WizardAction {
    ListContexts,
    CreateContext,
    Configure {
        context: OwnedObjectPath,
        properties: Vec<(&'static str, String)>,
    },
    Finished(OwnedObjectPath),
}

#[derive(Debug)]
pub(crate) struct ContextWizard {
    state: WizardState,
    settings: ContextSettings,
}

impl ContextWizard {
    pub(crate) fn new(settings: ContextSettings) -> Self {
        Self {
            state: WizardState::Idle,
            settings,
        }
    }

    pub(crate) fn state(&self) -> &WizardState {
        &self.state
    }

    pub(crate) fn start(&mut self) -> Result<WizardAction> {
        self.expect(&WizardState::Idle)?;
        if self.settings.access_point_name.trim().is_empty() {
            return Err(self.fail("access point name is empty"));
        }
        self.state = WizardState::ListingContexts;
        Ok(WizardAction::ListContexts)
    }

    /// Reuses the first `internet` context, or asks for a new one.
    pub(crate) fn contexts_listed(&mut self, contexts: &[CellularContext]) -> Result<WizardAction> {
        self.expect(&WizardState::ListingContexts)?;

        let existing = contexts
            .iter()
            .find(|c| c.context_type.as_deref() == Some(ofono::INTERNET_CONTEXT));

        match existing {
            Some(context) => {
                if context.is_unconfigured() {
                    debug!("Reusing unconfigured context {}", context.path);
                }
                Ok(self.configure(context.path.clone()))
            }
            None => {
                self.state = WizardState::Creating;
                Ok(WizardAction::CreateContext)
            }
        }
    }

    pub(crate) fn context_created(&mut self, path: OwnedObjectPath) -> Result<WizardAction> {
        self.expect(&WizardState::Creating)?;
        Ok(self.configure(path))
    }

    pub(crate) fn configured(&mut self) -> Result<WizardAction> {
        let WizardState::Configuring(path) = self.state.clone() else {
            return Err(self.fail("context was not being configured"));
        };
        self.state = WizardState::Done(path.clone());
        Ok(WizardAction::Finished(path))
    }

    fn configure(&mut self, context: OwnedObjectPath) -> WizardAction {
        let mut properties = Vec::with_capacity(4);
        if let Some(name) = &self.settings.name {
            properties.push((modem_keys::NAME, name.clone()));
        }
        properties.push((
            modem_keys::ACCESS_POINT_NAME,
            self.settings.access_point_name.clone(),
        ));
        properties.push((modem_keys::USERNAME, self.settings.username.clone()));
        properties.push((modem_keys::PASSWORD, self.settings.password.clone()));

        self.state = WizardState::Configuring(context.clone());
        WizardAction::Configure {
            context,
            properties,
        }
    }

    fn expect(&mut self, state: &WizardState) -> Result<()> {
        if &self.state == state {
            Ok(())
        } else {
            let message = format!("expected {state:?}, wizard is {:?}", self.state);
            Err(self.fail(&message))
        }
    }

    pub(crate) fn fail(&mut self, reason: &str) -> ConnectivityError {
        self.state = WizardState::Failed(reason.to_string());
        ConnectivityError::ContextSetup(reason.to_string())
    }
}

/// Decodes one entry of `GetContexts`.
pub(crate) fn parse_context(path: OwnedObjectPath, properties: &PropertyMap) -> CellularContext {
    let text = |key: &str| {
        properties
            .get(key)
            .and_then(|v| as_string(v))
            .unwrap_or_default()
    };

    CellularContext {
        path,
        context_type: properties
            .get(modem_keys::TYPE)
            .and_then(|v| as_nonempty_string(v)),
        active: properties
            .get(modem_keys::ACTIVE)
            .and_then(|v| as_bool(v))
            .unwrap_or(false),
        settings: ContextSettings {
            name: properties
                .get(modem_keys::NAME)
                .and_then(|v| as_nonempty_string(v)),
            access_point_name: text(modem_keys::ACCESS_POINT_NAME),
            username: text(modem_keys::USERNAME),
            password: text(modem_keys::PASSWORD),
        },
    }
}

/// Lists the contexts of a connection manager.
pub(crate) async fn list_contexts<M: RemoteObject>(manager: &M) -> Result<Vec<CellularContext>> {
    Ok(manager
        .list_children(members::GET_CONTEXTS)
        .await?
        .into_iter()
        .map(|(path, props)| parse_context(path, &props))
        .collect())
}

/// The first `internet` context, if any.
pub(crate) async fn internet_context<M: RemoteObject>(
    manager: &M,
) -> Result<Option<CellularContext>> {
    Ok(list_contexts(manager)
        .await?
        .into_iter()
        .find(|c| c.context_type.as_deref() == Some(ofono::INTERNET_CONTEXT)))
}

/// Deletes a context.
pub(crate) async fn remove_context<M: RemoteObject>(
    manager: &M,
    context: OwnedObjectPath,
) -> Result<()> {
    debug!("Removing context {context}");
    manager
        .invoke(
            members::REMOVE_CONTEXT,
            CallArgs::Path(context),
            CallClass::Default,
        )
        .await
}

/// Finds or creates the internet context of `manager` and writes `settings`.
///
/// `open` builds a handle for a context path. Returns the context path.
pub(crate) async fn setup_internet_context<M, C, F, Fut>(
    manager: &M,
    open: F,
    settings: ContextSettings,
) -> Result<OwnedObjectPath>
where
    M: RemoteObject,
    C: RemoteObject,
    F: Fn(OwnedObjectPath) -> Fut,
    Fut: Future<Output = Result<C>>,
{
    let mut wizard = ContextWizard::new(settings);
    let mut action = wizard.start()?;

    loop {
        action = match action {
            WizardAction::ListContexts => {
                let contexts = list_contexts(manager).await.inspect_err(|e| {
                    warn!("GetContexts on {} failed: {e}", manager.object_path());
                })?;
                wizard.contexts_listed(&contexts)?
            }
            WizardAction::CreateContext => {
                let path = manager
                    .invoke_for_path(
                        members::ADD_CONTEXT,
                        CallArgs::strings([ofono::INTERNET_CONTEXT]),
                    )
                    .await
                    .inspect_err(|e| warn!("AddContext failed: {e}"))?;
                debug!("Created context {path}");
                wizard.context_created(path)?
            }
            WizardAction::Configure {
                context,
                properties,
            } => {
                let handle = open(context).await?;
                for (key, value) in properties {
                    handle
                        .invoke(
                            members::SET_PROPERTY,
                            CallArgs::KeyValue(key.to_string(), encode_string(&value)?),
                            CallClass::Default,
                        )
                        .await
                        .inspect_err(|e| warn!("Setting context {key} failed: {e}"))?;
                }
                wizard.configured()?
            }
            WizardAction::Finished(path) => return Ok(path),
        };
    }
}
