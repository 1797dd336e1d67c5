//! Live query feeds
//!
//! A store owns one [`Observers`] registry per collection. Subscribers get the
//! full matching result set on registration and again whenever a commit
//! changes it. Dropping the [`Subscription`] unsubscribes.

use super::error::Result;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::mpsc;
use tracing::{debug, warn};

pub type Predicate<T> = Box<dyn Fn(&T) -> bool + Send + Sync>;

struct Observer<T> {
    id: u64,
    // scoped observers only refresh when a commit touches their scope
    scope: Option<String>,
    predicate: Predicate<T>,
    sender: mpsc::UnboundedSender<Vec<T>>,
    last: Option<Vec<T>>,
}

struct Registry<T> {
    next_id: u64,
    observers: Vec<Observer<T>>,
}

impl<T: Clone + PartialEq> Observer<T> {
    // false once the receiving side is gone
    fn deliver(&mut self, all: &[T]) -> bool {
        let snapshot: Vec<T> = all.iter().filter(|item| (self.predicate)(item)).cloned().collect();
        if self.last.as_ref() == Some(&snapshot) {
            return true;
        }
        self.last = Some(snapshot.clone());
        self.sender.send(snapshot).is_ok()
    }
}

pub struct Observers<T> {
    registry: Arc<Mutex<Registry<T>>>,
}

impl<T> Clone for Observers<T> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<T> Default for Observers<T> {
    fn default() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                next_id: 0,
                observers: Vec::new(),
            })),
        }
    }
}

fn lock<T>(registry: &Mutex<Registry<T>>) -> MutexGuard<'_, Registry<T>> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<T: Clone + PartialEq + Send + 'static> Observers<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `predicate` and delivers the current result set from `load`.
    pub fn register<F>(&self, predicate: Predicate<T>, load: F) -> Subscription<T>
    where
        F: FnOnce() -> Result<Vec<T>>,
    {
        self.attach(None, predicate, load)
    }

    /// Like [`Observers::register`], but refreshed by [`Observers::publish_scoped`]
    /// only when `scope` is among the touched scopes.
    pub fn register_scoped<F>(&self, scope: &str, predicate: Predicate<T>, load: F) -> Subscription<T>
    where
        F: FnOnce() -> Result<Vec<T>>,
    {
        self.attach(Some(scope.to_string()), predicate, load)
    }

    fn attach<F>(&self, scope: Option<String>, predicate: Predicate<T>, load: F) -> Subscription<T>
    where
        F: FnOnce() -> Result<Vec<T>>,
    {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut registry = lock(&self.registry);
        let id = registry.next_id;
        registry.next_id += 1;

        let mut observer = Observer {
            id,
            scope,
            predicate,
            sender,
            last: None,
        };
        match load() {
            Ok(all) => {
                observer.deliver(&all);
            }
            Err(err) => warn!(subscription = id, %err, "initial snapshot unavailable"),
        }
        registry.observers.push(observer);
        debug!(subscription = id, "subscribed");

        Subscription {
            id,
            receiver,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Reloads the collection and pushes changed result sets to every observer.
    pub fn publish<F>(&self, load: F)
    where
        F: FnOnce() -> Result<Vec<T>>,
    {
        let mut registry = lock(&self.registry);
        if registry.observers.is_empty() {
            return;
        }
        // loaded under the lock so snapshots are delivered in commit order
        let all = match load() {
            Ok(all) => all,
            Err(err) => {
                warn!(%err, "could not refresh subscriptions");
                return;
            }
        };
        registry.observers.retain_mut(|observer| observer.deliver(&all));
    }

    /// Reloads each touched scope that has observers and pushes changed
    /// result sets to the observers of that scope.
    pub fn publish_scoped<F>(&self, scopes: &[String], mut load: F)
    where
        F: FnMut(&str) -> Result<Vec<T>>,
    {
        let mut registry = lock(&self.registry);
        for scope in scopes {
            let watched = registry
                .observers
                .iter()
                .any(|o| o.scope.as_deref() == Some(scope.as_str()));
            if !watched {
                continue;
            }
            let all = match load(scope) {
                Ok(all) => all,
                Err(err) => {
                    warn!(%scope, %err, "could not refresh subscriptions");
                    continue;
                }
            };
            registry.observers.retain_mut(|observer| {
                observer.scope.as_deref() != Some(scope.as_str()) || observer.deliver(&all)
            });
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.registry).observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct Subscription<T> {
    id: u64,
    receiver: mpsc::UnboundedReceiver<Vec<T>>,
    registry: Weak<Mutex<Registry<T>>>,
}

impl<T> Subscription<T> {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Waits for the next snapshot; `None` once the store is gone.
    pub async fn recv(&mut self) -> Option<Vec<T>> {
        self.receiver.recv().await
    }

    /// The next snapshot if one is already queued.
    pub fn try_recv(&mut self) -> Option<Vec<T>> {
        self.receiver.try_recv().ok()
    }

    pub fn unsubscribe(self) {}
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            lock(&registry).observers.retain(|o| o.id != self.id);
            debug!(subscription = self.id, "unsubscribed");
        }
    }
}
