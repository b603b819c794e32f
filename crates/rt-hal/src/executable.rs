//! Executable & ExecutableCache (spec component C5).

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use rt_core::{ErrorBuilder, ErrorKind, Result};

use bitflags::bitflags;

/// A 32-bit tag identifying an executable's binary format (e.g. "is this a
/// host interpreter bytecode blob, or a device-native kernel blob").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExecutableFormat(pub u32);

/// Debug info attached to an [`ExecutableSpec`], opaque to the cache.
#[derive(Debug, Clone, Default)]
pub struct DebugInfo {
    pub name: Option<String>,
}

/// `(format, payload bytes, optional debug info)` — the input to
/// [`ExecutableCache::prepare_executable`].
#[derive(Debug, Clone)]
pub struct ExecutableSpec {
    pub format: ExecutableFormat,
    pub payload: Arc<[u8]>,
    pub debug_info: Option<DebugInfo>,
}

impl ExecutableSpec {
    pub fn new(format: ExecutableFormat, payload: impl Into<Arc<[u8]>>) -> ExecutableSpec {
        ExecutableSpec {
            format,
            payload: payload.into(),
            debug_info: None,
        }
    }

    /// Identity key for memoization: format plus pointer identity of the
    /// payload allocation (not its contents), matching `spec.md` §4.4's
    /// "same `Executable` for identical `(format, payload identity)`".
    fn identity(&self) -> (ExecutableFormat, usize, usize) {
        (self.format, Arc::as_ptr(&self.payload) as *const u8 as usize, self.payload.len())
    }
}

bitflags! {
    /// How aggressively (and how durably) a prepared executable may be
    /// cached, matching the three independent modes in `spec.md` §4.4.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CachingMode: u32 {
        /// Retain a pointer into caller-owned bytes; caller guarantees lifetime.
        const ALIAS_PROVIDED_DATA = 0b001;
        /// The cache may persist the prepared executable across invocations.
        const ALLOW_PERSISTENT_CACHING = 0b010;
        /// Spend extra time optimizing during preparation.
        const ALLOW_OPTIMIZATION = 0b100;
    }
}

/// A prepared, format-specific computation artifact runnable by a device.
#[derive(Clone)]
pub struct Executable {
    inner: Arc<ExecutableInner>,
}

struct ExecutableInner {
    format: ExecutableFormat,
    payload: Arc<[u8]>,
}

impl Executable {
    pub fn format(&self) -> ExecutableFormat {
        self.inner.format
    }

    pub fn payload(&self) -> &[u8] {
        &self.inner.payload
    }
}

impl std::fmt::Debug for Executable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executable")
            .field("format", &self.inner.format)
            .field("payload_len", &self.inner.payload.len())
            .finish()
    }
}

/// Prepares (loads/validates) executables identified by a format tag plus an
/// opaque payload, memoizing under `AllowPersistentCaching`.
pub trait ExecutableCache: Send + Sync {
    fn can_prepare_format(&self, format: ExecutableFormat) -> bool;

    fn prepare_executable(&self, caching_mode: CachingMode, spec: ExecutableSpec) -> Result<Executable>;
}

/// A format-matching cache usable by the interpreter host backend: any
/// format in `supported_formats` is accepted, and identical `(format,
/// payload identity)` pairs under `AllowPersistentCaching` return the same
/// `Executable` handle.
pub struct HostExecutableCache {
    supported_formats: Vec<ExecutableFormat>,
    memo: Mutex<HashMap<(ExecutableFormat, usize, usize), Executable>>,
}

impl HostExecutableCache {
    pub fn new(supported_formats: Vec<ExecutableFormat>) -> HostExecutableCache {
        HostExecutableCache {
            supported_formats,
            memo: Mutex::new(HashMap::new()),
        }
    }
}

impl ExecutableCache for HostExecutableCache {
    fn can_prepare_format(&self, format: ExecutableFormat) -> bool {
        self.supported_formats.contains(&format)
    }

    fn prepare_executable(&self, caching_mode: CachingMode, spec: ExecutableSpec) -> Result<Executable> {
        if !self.can_prepare_format(spec.format) {
            return Err(ErrorBuilder::new(ErrorKind::Unimplemented)
                .with(format!("format {:?} not supported by this cache", spec.format))
                .build());
        }

        if caching_mode.contains(CachingMode::ALLOW_PERSISTENT_CACHING) {
            let key = spec.identity();
            let mut memo = self.memo.lock();
            if let Some(existing) = memo.get(&key) {
                return Ok(existing.clone());
            }
            let prepared = Executable {
                inner: Arc::new(ExecutableInner {
                    format: spec.format,
                    payload: spec.payload.clone(),
                }),
            };
            memo.insert(key, prepared.clone());
            return Ok(prepared);
        }

        Ok(Executable {
            inner: Arc::new(ExecutableInner {
                format: spec.format,
                payload: spec.payload,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_format_is_unimplemented() {
        let cache = HostExecutableCache::new(vec![ExecutableFormat(1)]);
        let spec = ExecutableSpec::new(ExecutableFormat(2), vec![0u8; 4]);
        let err = cache.prepare_executable(CachingMode::empty(), spec).unwrap_err();
        assert_eq!(err.kind(), rt_core::ErrorKind::Unimplemented);
    }

    #[test]
    fn persistent_caching_returns_identical_executable_for_identical_payload_identity() {
        let cache = HostExecutableCache::new(vec![ExecutableFormat(1)]);
        let payload: Arc<[u8]> = Arc::from(vec![1u8, 2, 3]);
        let spec_a = ExecutableSpec {
            format: ExecutableFormat(1),
            payload: payload.clone(),
            debug_info: None,
        };
        let spec_b = ExecutableSpec {
            format: ExecutableFormat(1),
            payload: payload.clone(),
            debug_info: None,
        };
        let a = cache
            .prepare_executable(CachingMode::ALLOW_PERSISTENT_CACHING, spec_a)
            .unwrap();
        let b = cache
            .prepare_executable(CachingMode::ALLOW_PERSISTENT_CACHING, spec_b)
            .unwrap();
        assert!(Arc::ptr_eq(&a.inner, &b.inner));
    }

    #[test]
    fn without_persistent_caching_each_prepare_is_distinct() {
        let cache = HostExecutableCache::new(vec![ExecutableFormat(1)]);
        let payload: Arc<[u8]> = Arc::from(vec![1u8]);
        let a = cache
            .prepare_executable(
                CachingMode::empty(),
                ExecutableSpec { format: ExecutableFormat(1), payload: payload.clone(), debug_info: None },
            )
            .unwrap();
        let b = cache
            .prepare_executable(
                CachingMode::empty(),
                ExecutableSpec { format: ExecutableFormat(1), payload, debug_info: None },
            )
            .unwrap();
        assert!(!Arc::ptr_eq(&a.inner, &b.inner));
    }
}
