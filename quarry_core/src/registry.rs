//! Provider registry and pending-provider waiters.
//!
//! Providers are keyed by (kind, scheme). A search that needs a scheme nobody
//! serves yet can park on [`ProviderRegistry::await_provider`]; the next
//! registration for that key wakes every parked search at once.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::Result;
use crate::types::QueryKind;
use crate::SearchProvider;

/// Future resolving to the first provider registered for a scheme.
///
/// Resolves to `None` only if the registry is dropped first.
pub type PendingProvider = Shared<BoxFuture<'static, Option<Arc<dyn SearchProvider>>>>;

struct Entry {
    id: u64,
    provider: Arc<dyn SearchProvider>,
}

struct Waiter {
    sender: oneshot::Sender<Arc<dyn SearchProvider>>,
    future: PendingProvider,
}

#[derive(Default)]
struct KindState {
    providers: HashMap<String, Entry>,
    pending: HashMap<String, Waiter>,
}

struct RegistryInner {
    next_id: AtomicU64,
    kinds: Mutex<HashMap<QueryKind, KindState>>,
}

/// Shared, cheaply cloneable registry of search providers.
#[derive(Clone, Debug)]
pub struct ProviderRegistry {
    inner: Arc<RegistryInner>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        ProviderRegistry {
            inner: Arc::new(RegistryInner {
                next_id: AtomicU64::new(1),
                kinds: Mutex::new(HashMap::new()),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<QueryKind, KindState>> {
        self.inner.kinds.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Install `provider` for (kind, scheme), replacing any previous one, and
    /// wake searches waiting for that scheme.
    pub fn register(
        &self,
        scheme: impl Into<String>,
        kind: QueryKind,
        provider: Arc<dyn SearchProvider>,
    ) -> ProviderRegistration {
        let scheme = scheme.into();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);

        let waiter = {
            let mut kinds = self.lock();
            let state = kinds.entry(kind).or_default();
            state.providers.insert(
                scheme.clone(),
                Entry {
                    id,
                    provider: Arc::clone(&provider),
                },
            );
            state.pending.remove(&scheme)
        };

        debug!(
            target: "quarry.registry",
            %kind,
            scheme = scheme.as_str(),
            provider = provider.name(),
            "search provider registered"
        );

        if let Some(waiter) = waiter {
            debug!(
                target: "quarry.registry",
                %kind,
                scheme = scheme.as_str(),
                "resolving pending searches"
            );
            // Receivers may all be gone if the waiting searches were cancelled.
            let _ = waiter.sender.send(provider);
        }

        ProviderRegistration {
            registry: Arc::downgrade(&self.inner),
            kind,
            scheme,
            id,
        }
    }

    /// Register with the kind given by name (`"file"` or `"text"`).
    pub fn register_named(
        &self,
        scheme: impl Into<String>,
        kind: &str,
        provider: Arc<dyn SearchProvider>,
    ) -> Result<ProviderRegistration> {
        let kind = kind.parse::<QueryKind>()?;
        Ok(self.register(scheme, kind, provider))
    }

    pub fn get(&self, kind: QueryKind, scheme: &str) -> Option<Arc<dyn SearchProvider>> {
        self.lock()
            .get(&kind)
            .and_then(|state| state.providers.get(scheme))
            .map(|entry| Arc::clone(&entry.provider))
    }

    pub fn has(&self, kind: QueryKind, scheme: &str) -> bool {
        self.lock()
            .get(&kind)
            .is_some_and(|state| state.providers.contains_key(scheme))
    }

    /// Registered schemes for `kind`, sorted.
    pub fn schemes(&self, kind: QueryKind) -> Vec<String> {
        let mut schemes: Vec<String> = self
            .lock()
            .get(&kind)
            .map(|state| state.providers.keys().cloned().collect())
            .unwrap_or_default();
        schemes.sort();
        schemes
    }

    /// Snapshot of every provider registered for `kind`.
    pub fn providers(&self, kind: QueryKind) -> Vec<Arc<dyn SearchProvider>> {
        self.lock()
            .get(&kind)
            .map(|state| {
                state
                    .providers
                    .values()
                    .map(|entry| Arc::clone(&entry.provider))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Wait for a provider for (kind, scheme).
    ///
    /// Concurrent callers share one waiter. There is no timeout. If a provider
    /// is already registered the returned future is ready immediately, which
    /// covers a registration landing between a lookup and this call.
    pub fn await_provider(&self, kind: QueryKind, scheme: &str) -> PendingProvider {
        let mut kinds = self.lock();
        let state = kinds.entry(kind).or_default();

        if let Some(entry) = state.providers.get(scheme) {
            let provider = Arc::clone(&entry.provider);
            return futures::future::ready(Some(provider)).boxed().shared();
        }

        if let Some(waiter) = state.pending.get(scheme) {
            return waiter.future.clone();
        }

        let (sender, receiver) = oneshot::channel();
        let future = receiver.map(|result| result.ok()).boxed().shared();
        state.pending.insert(
            scheme.to_string(),
            Waiter {
                sender,
                future: future.clone(),
            },
        );
        debug!(
            target: "quarry.registry",
            %kind,
            scheme,
            "waiting for search provider"
        );
        future
    }

    /// Schemes with an outstanding waiter for `kind`, sorted.
    pub fn pending_schemes(&self, kind: QueryKind) -> Vec<String> {
        let mut schemes: Vec<String> = self
            .lock()
            .get(&kind)
            .map(|state| state.pending.keys().cloned().collect())
            .unwrap_or_default();
        schemes.sort();
        schemes
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle returned by [`ProviderRegistry::register`].
///
/// Dropping the handle keeps the provider registered; call
/// [`ProviderRegistration::dispose`] to remove it.
#[must_use = "call dispose() to unregister the provider"]
#[derive(Debug)]
pub struct ProviderRegistration {
    registry: Weak<RegistryInner>,
    kind: QueryKind,
    scheme: String,
    id: u64,
}

impl ProviderRegistration {
    pub fn kind(&self) -> QueryKind {
        self.kind
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Remove the registration if it is still the current one for its scheme.
    ///
    /// Returns `true` if a provider was removed. A newer registration for the
    /// same (kind, scheme) is left untouched.
    pub fn dispose(self) -> bool {
        let Some(inner) = self.registry.upgrade() else {
            return false;
        };
        let mut kinds = inner.kinds.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(state) = kinds.get_mut(&self.kind) else {
            return false;
        };
        if state.providers.get(&self.scheme).map(|entry| entry.id) != Some(self.id) {
            return false;
        }
        state.providers.remove(&self.scheme);
        debug!(
            target: "quarry.registry",
            kind = %self.kind,
            scheme = self.scheme.as_str(),
            "search provider unregistered"
        );
        true
    }
}

impl std::fmt::Debug for RegistryInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryInner").finish_non_exhaustive()
    }
}
