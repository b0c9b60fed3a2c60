//! Serializes registrations against the credential store.
//!
//! `authenticate` is read-only and goes straight to the store. `register`
//! is a check-then-write, so every registration is handed to a single
//! worker task that runs them one at a time in submission order. A failed
//! registration only fails its own caller; the worker moves on to the next.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::{credentials::CredentialStore, error::AuthError, password::Hasher};

struct RegisterRequest {
    login: String,
    password: String,
    respond_to: oneshot::Sender<Result<(), AuthError>>,
}

pub struct AuthSequencer {
    store: Arc<dyn CredentialStore>,
    hasher: Hasher,
    queue: mpsc::UnboundedSender<RegisterRequest>,
}

impl AuthSequencer {
    /// Starts the registration worker. Must be called inside a Tokio runtime.
    pub fn new(store: Arc<dyn CredentialStore>, hasher: Hasher) -> Self {
        let (queue, requests) = mpsc::unbounded_channel();
        tokio::spawn(run_registrations(
            Arc::clone(&store),
            hasher.clone(),
            requests,
        ));

        Self {
            store,
            hasher,
            queue,
        }
    }

    pub async fn authenticate(&self, login: &str, password: &str) -> Result<(), AuthError> {
        validate(login, password)?;
        let stored = self
            .store
            .lookup(login)
            .await?
            .ok_or_else(|| AuthError::NotFound(login.to_string()))?;
        self.hasher.verify(password, &stored).await
    }

    /// Queues a registration and waits for the worker to finish it.
    pub async fn register(&self, login: &str, password: &str) -> Result<(), AuthError> {
        validate(login, password)?;
        let (respond_to, response) = oneshot::channel();
        self.queue
            .send(RegisterRequest {
                login: login.to_string(),
                password: password.to_string(),
                respond_to,
            })
            .map_err(|_| AuthError::QueueClosed)?;
        response.await.map_err(|_| AuthError::QueueClosed)?
    }
}

fn validate(login: &str, password: &str) -> Result<(), AuthError> {
    if login.trim().is_empty() || password.is_empty() {
        return Err(AuthError::InvalidCredentials);
    }
    Ok(())
}

async fn run_registrations(
    store: Arc<dyn CredentialStore>,
    hasher: Hasher,
    mut requests: mpsc::UnboundedReceiver<RegisterRequest>,
) {
    while let Some(request) = requests.recv().await {
        let outcome = register_one(store.as_ref(), &hasher, &request.login, &request.password).await;
        match &outcome {
            Ok(()) => info!(login = %request.login, "registered"),
            Err(err) if err.is_rejection() => {
                debug!(login = %request.login, %err, "registration rejected")
            }
            Err(err) => warn!(login = %request.login, error = ?err, "registration failed"),
        }
        // The caller may have gone away; the next registration still runs.
        let _ = request.respond_to.send(outcome);
    }
    debug!("registration queue closed");
}

async fn register_one(
    store: &dyn CredentialStore,
    hasher: &Hasher,
    login: &str,
    password: &str,
) -> Result<(), AuthError> {
    if store.lookup(login).await?.is_some() {
        return Err(AuthError::AlreadyExists(login.to_string()));
    }
    let hash = hasher.hash(password).await?;
    store.insert(login, &hash).await?;
    Ok(())
}
