//! A fixed-capacity pool of interchangeable resources.

use std::{
    fmt,
    ops::{Deref, DerefMut},
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError},
};

use log::{debug, info, trace};
use thiserror::Error;

/// An error returned by [`ResourcePool`] operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// The pool has been shut down and lends nothing anymore.
    #[error("resource pool is shut down")]
    Closed,

    /// No resource is free right now (only from
    /// [`ResourcePool::try_acquire`]).
    #[error("resource pool exhausted")]
    Exhausted,

    /// The lease was handed out by another pool.
    #[error("lease does not belong to this pool")]
    ForeignLease,
}

struct PoolState<R> {
    free: Vec<R>,
    closed: bool,
}

struct PoolShared<R> {
    state: Mutex<PoolState<R>>,
    available: Condvar,
    capacity: usize,
    config: String,
}

impl<R> PoolShared<R> {
    fn lock(&self) -> MutexGuard<'_, PoolState<R>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn put_back(&self, resource: R) {
        let mut state = self.lock();
        debug_assert!(state.free.len() < self.capacity);
        state.free.push(resource);
        drop(state);
        self.available.notify_one();
    }
}

/// A pool owning exactly `capacity` resources that are lent out one
/// caller at a time.
///
/// Every resource is built once, when the pool is created, from the
/// pool's configuration string, and lives until the last handle to the
/// pool (and the last [`Lease`]) is dropped.
///
/// Cloning a `ResourcePool` yields another handle to the same pool.
///
/// # Examples
///
/// ```
/// use workpool::ResourcePool;
///
/// let pool = ResourcePool::new("db://local", 2, |conf| conf.len());
/// let lease = pool.acquire().unwrap();
/// assert_eq!(10, *lease);
/// assert_eq!(1, pool.in_use());
///
/// pool.release(lease).unwrap();
/// assert_eq!(0, pool.in_use());
/// ```
pub struct ResourcePool<R> {
    share: Arc<PoolShared<R>>,
}

impl<R> Clone for ResourcePool<R> {
    fn clone(&self) -> Self {
        Self {
            share: Arc::clone(&self.share),
        }
    }
}

impl<R> fmt::Debug for ResourcePool<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourcePool")
            .field("capacity", &self.share.capacity)
            .field("available", &self.available())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl<R: Send + 'static> ResourcePool<R> {
    /// Creates a pool of `capacity` resources, each built by `factory`
    /// from the configuration string `config`.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    pub fn new<F>(config: impl Into<String>, capacity: usize, mut factory: F) -> Self
    where
        F: FnMut(&str) -> R,
    {
        if capacity == 0 {
            panic!("resource pool capacity can not be 0.");
        }

        let config = config.into();
        let free = (0..capacity).map(|_| factory(&config)).collect();
        info!("Created resource pool with {} resources", capacity);

        Self {
            share: Arc::new(PoolShared {
                state: Mutex::new(PoolState {
                    free,
                    closed: false,
                }),
                available: Condvar::new(),
                capacity,
                config,
            }),
        }
    }
}

impl<R> ResourcePool<R> {
    /// Checks out a resource, blocking until one is free.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Closed`] once the pool is shut down, also
    /// waking callers that were blocked here.
    pub fn acquire(&self) -> Result<Lease<R>, PoolError> {
        let state = self.share.lock();
        let mut state = self
            .share
            .available
            .wait_while(state, |state| !state.closed && state.free.is_empty())
            .unwrap_or_else(PoisonError::into_inner);

        if state.closed {
            return Err(PoolError::Closed);
        }
        let resource = state.free.pop().ok_or(PoolError::Exhausted)?;
        trace!("Resource acquired, {} left", state.free.len());
        Ok(self.lease(resource))
    }

    /// Checks out a resource if one is free right now.
    ///
    /// # Errors
    ///
    /// [`PoolError::Closed`] if the pool is shut down,
    /// [`PoolError::Exhausted`] if every resource is checked out.
    pub fn try_acquire(&self) -> Result<Lease<R>, PoolError> {
        let mut state = self.share.lock();
        if state.closed {
            return Err(PoolError::Closed);
        }
        let resource = state.free.pop().ok_or(PoolError::Exhausted)?;
        Ok(self.lease(resource))
    }

    /// Returns a leased resource to the pool and wakes one waiter.
    ///
    /// Dropping a lease has the same effect; this form reports a lease
    /// that was handed out by another pool. A rejected lease is
    /// returned to its own pool when dropped.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::ForeignLease`] if `lease` was not acquired
    /// from this pool.
    pub fn release(&self, lease: Lease<R>) -> Result<(), PoolError> {
        if !Arc::ptr_eq(&self.share, &lease.pool) {
            return Err(PoolError::ForeignLease);
        }
        drop(lease);
        Ok(())
    }

    /// Shuts the pool down and wakes every blocked
    /// [`acquire`](Self::acquire). Calling it again has no effect.
    ///
    /// Outstanding leases stay valid and may still be released.
    pub fn shutdown(&self) {
        let mut state = self.share.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        drop(state);
        self.share.available.notify_all();
        debug!("Resource pool shut down");
    }

    /// Returns `true` if the pool is shut down.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.share.lock().closed
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.share.capacity
    }

    /// The number of resources free to be acquired.
    #[must_use]
    pub fn available(&self) -> usize {
        self.share.lock().free.len()
    }

    /// The number of resources currently checked out.
    #[must_use]
    pub fn in_use(&self) -> usize {
        self.share.capacity - self.available()
    }

    /// The configuration string the resources were built from.
    #[must_use]
    pub fn config(&self) -> &str {
        &self.share.config
    }

    fn lease(&self, resource: R) -> Lease<R> {
        Lease {
            resource: Some(resource),
            pool: Arc::clone(&self.share),
        }
    }
}

/// A resource checked out of a [`ResourcePool`].
///
/// The lease owns the resource until it is dropped or passed to
/// [`ResourcePool::release`], so a resource can never be released twice
/// or used after it went back.
pub struct Lease<R> {
    resource: Option<R>,
    pool: Arc<PoolShared<R>>,
}

impl<R> Deref for Lease<R> {
    type Target = R;

    fn deref(&self) -> &R {
        self.resource
            .as_ref()
            .unwrap_or_else(|| unreachable!("lease already released"))
    }
}

impl<R> DerefMut for Lease<R> {
    fn deref_mut(&mut self) -> &mut R {
        self.resource
            .as_mut()
            .unwrap_or_else(|| unreachable!("lease already released"))
    }
}

impl<R: fmt::Debug> fmt::Debug for Lease<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Lease").field(&self.resource).finish()
    }
}

impl<R> Drop for Lease<R> {
    fn drop(&mut self) {
        if let Some(resource) = self.resource.take() {
            self.pool.put_back(resource);
        }
    }
}
