use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::sync::Arc;

/// Shared handle to a value that the host thread mutates while the section
/// manager reads it.
///
/// Every loaded world section sits behind one of these. Snapshots for the
/// builder workers are taken under a read guard, block edits take the write
/// guard.
///
/// # Examples
///
/// ```
/// use voxel_section_renderer::core::MtResource;
///
/// let light_level = MtResource::new(0u8);
/// let editor = light_level.clone();
///
/// std::thread::spawn(move || *editor.get_mut() = 15)
///     .join()
///     .unwrap();
///
/// assert_eq!(*light_level.get(), 15);
/// assert_eq!(light_level.handle_count(), 1);
/// ```
///
/// Readers may overlap; a writer waits for all of them. Locks never poison.
pub struct MtResource<T: Send + Sync> {
    resource: Arc<RwLock<T>>,
}

impl<T: Send + Sync> MtResource<T> {
    /// Wraps `resource` in a fresh handle.
    pub fn new(resource: T) -> Self {
        Self {
            resource: Arc::new(RwLock::new(resource)),
        }
    }

    /// Locks for reading.
    pub fn get(&self) -> RwLockReadGuard<'_, T> {
        self.resource.read()
    }

    /// Locks for writing. Blocks until current readers release.
    pub fn get_mut(&self) -> RwLockWriteGuard<'_, T> {
        self.resource.write()
    }

    /// Returns the number of live handles sharing this resource.
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.resource)
    }
}

impl<T: Send + Sync> Clone for MtResource<T> {
    fn clone(&self) -> Self {
        Self {
            resource: self.resource.clone(),
        }
    }
}

impl<T: Send + Sync + Default> Default for MtResource<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}
