use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{TensorInfo, TensorInfoError};

/// Host tensor storage bound to workloads at construction time.
///
/// Cloning shares the underlying buffer: a producer's output handle is the same allocation its
/// consumers read from.
#[derive(Debug, Clone)]
pub struct TensorHandle {
    info: TensorInfo,
    data: Arc<RwLock<Vec<u8>>>,
}

impl TensorHandle {
    /// Allocates zeroed storage for a fully static descriptor.
    pub fn allocate(info: TensorInfo) -> Result<Self, TensorInfoError> {
        let len = info
            .num_bytes()
            .ok_or_else(|| TensorInfoError::DynamicShape(info.shape().clone()))?;
        Ok(Self {
            info,
            data: Arc::new(RwLock::new(vec![0u8; len])),
        })
    }

    pub fn from_bytes(info: TensorInfo, bytes: Vec<u8>) -> Result<Self, TensorInfoError> {
        let handle = Self::allocate(info)?;
        handle.copy_from_slice(&bytes)?;
        Ok(handle)
    }

    pub fn info(&self) -> &TensorInfo {
        &self.info
    }

    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Vec<u8>> {
        self.data.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Vec<u8>> {
        self.data.write()
    }

    /// Overwrites the whole buffer; the length must match exactly.
    pub fn copy_from_slice(&self, bytes: &[u8]) -> Result<(), TensorInfoError> {
        let mut data = self.data.write();
        if data.len() != bytes.len() {
            return Err(TensorInfoError::ByteLength {
                expected: data.len(),
                actual: bytes.len(),
            });
        }
        data.copy_from_slice(bytes);
        Ok(())
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.data.read().clone()
    }

    /// Returns `true` when both handles refer to the same allocation.
    pub fn shares_storage_with(&self, other: &TensorHandle) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

/// Borrowed read-only tensor passed to asynchronous execution.
#[derive(Debug, Clone, Copy)]
pub struct TensorView<'a> {
    pub info: &'a TensorInfo,
    pub bytes: &'a [u8],
}

impl<'a> TensorView<'a> {
    pub fn new(info: &'a TensorInfo, bytes: &'a [u8]) -> Self {
        Self { info, bytes }
    }
}

/// Borrowed writable tensor passed to asynchronous execution.
#[derive(Debug)]
pub struct TensorViewMut<'a> {
    pub info: &'a TensorInfo,
    pub bytes: &'a mut [u8],
}

impl<'a> TensorViewMut<'a> {
    pub fn new(info: &'a TensorInfo, bytes: &'a mut [u8]) -> Self {
        Self { info, bytes }
    }
}
