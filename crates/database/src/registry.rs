//! Per-database extension singletons.
//!
//! Collaborators such as a leader elector or a schema migrator exist at most
//! once per database. The registry creates each on first request and tears
//! it down together with the database.

use crate::database::Database;
use hashbrown::HashMap;
use parking_lot::Mutex;
use std::any::{Any, TypeId};
use std::sync::Arc;
use tracing::debug;
use vela_core::Result;

/// A lazily created per-database collaborator.
pub trait Extension: Send + Sync + 'static {
    /// Builds the extension for `database`.
    fn create(database: &Database) -> Result<Self>
    where
        Self: Sized;

    /// Releases the extension's resources when the database is destroyed.
    fn teardown(&self) {}
}

type TeardownHook = Box<dyn FnOnce() + Send>;

struct Registered {
    instance: Arc<dyn Any + Send + Sync>,
    teardown: Box<dyn Fn() + Send + Sync>,
}

/// Owns extension singletons and teardown hooks.
#[derive(Default)]
pub struct ExtensionRegistry {
    extensions: Mutex<HashMap<TypeId, Registered>>,
    hooks: Mutex<Vec<TeardownHook>>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lookup<T: Extension>(&self) -> Option<Arc<T>> {
        let extensions = self.extensions.lock();
        let registered = extensions.get(&TypeId::of::<T>())?;
        Arc::clone(&registered.instance).downcast::<T>().ok()
    }

    /// Returns the singleton of `T`, creating it with `create` if absent.
    ///
    /// `create` runs without the registry lock held, so it may request
    /// other extensions. If two callers race, the first registered instance
    /// wins and the other is dropped without teardown.
    pub fn get_or_create<T, F>(&self, create: F) -> Result<Arc<T>>
    where
        T: Extension,
        F: FnOnce() -> Result<T>,
    {
        if let Some(existing) = self.lookup::<T>() {
            return Ok(existing);
        }
        let created = Arc::new(create()?);

        let mut extensions = self.extensions.lock();
        let registered = extensions.entry(TypeId::of::<T>()).or_insert_with(|| {
            debug!(extension = std::any::type_name::<T>(), "extension created");
            let handle = Arc::clone(&created);
            Registered {
                instance: created,
                teardown: Box::new(move || handle.teardown()),
            }
        });
        Arc::clone(&registered.instance)
            .downcast::<T>()
            .map_err(|_| vela_core::Error::invalid_operation("extension registered under a foreign type"))
    }

    /// Returns true if `T` has been created.
    pub fn contains<T: Extension>(&self) -> bool {
        self.extensions.lock().contains_key(&TypeId::of::<T>())
    }

    pub fn len(&self) -> usize {
        self.extensions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.lock().is_empty()
    }

    /// Registers a hook to run on teardown.
    pub fn on_teardown(&self, hook: impl FnOnce() + Send + 'static) {
        self.hooks.lock().push(Box::new(hook));
    }

    /// Runs every hook in registration order, then tears down and drops all
    /// extensions.
    pub fn teardown(&self) {
        let hooks: Vec<TeardownHook> = std::mem::take(&mut *self.hooks.lock());
        for hook in hooks {
            hook();
        }
        let extensions: Vec<Registered> = self.extensions.lock().drain().map(|(_, r)| r).collect();
        for registered in &extensions {
            (registered.teardown)();
        }
        debug!(extensions = extensions.len(), "extensions torn down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use std::sync::atomic::{AtomicBool, Ordering};
    use vela_storage::MemoryStorage;

    struct Elector {
        stopped: AtomicBool,
    }

    impl Extension for Elector {
        fn create(_database: &Database) -> Result<Self> {
            Ok(Self {
                stopped: AtomicBool::new(false),
            })
        }

        fn teardown(&self) {
            self.stopped.store(true, Ordering::SeqCst);
        }
    }

    struct Failing;

    impl Extension for Failing {
        fn create(_database: &Database) -> Result<Self> {
            Err(vela_core::Error::unsupported("failing"))
        }
    }

    fn database() -> Database {
        Database::new(DatabaseConfig::default(), Arc::new(MemoryStorage::new())).unwrap()
    }

    #[test]
    fn test_one_instance_per_database() {
        let db = database();
        let a = db.extension::<Elector>().unwrap();
        let b = db.extension::<Elector>().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(db.extensions().len(), 1);

        let other = database();
        let c = other.extension::<Elector>().unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn test_teardown_runs_hooks_and_extensions() {
        let registry = ExtensionRegistry::new();
        let db = database();
        let elector = registry.get_or_create(|| Elector::create(&db)).unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let order = Arc::clone(&order);
            registry.on_teardown(move || order.lock().push(i));
        }

        registry.teardown();
        assert_eq!(*order.lock(), vec![0, 1, 2]);
        assert!(elector.stopped.load(Ordering::SeqCst));
        assert!(registry.is_empty());

        // Hooks run once
        registry.teardown();
        assert_eq!(order.lock().len(), 3);
    }

    #[test]
    fn test_failed_creation_is_not_registered() {
        let db = database();
        assert!(db.extension::<Failing>().is_err());
        assert!(!db.extensions().contains::<Failing>());
    }
}
