//! Binding to `libfdb_c`, loaded at runtime.
//!
//! Loading with libloading keeps the addon buildable without the client
//! library installed; the library is only required once the application
//! selects an API version.

use std::ffi::{c_char, c_int, c_void, CStr, CString};
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::ptr::{self, NonNull};
use std::slice;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use libloading::Library;

use crate::config::NetworkConfig;
use crate::error::{code, Error, RemoteError, Result};
use crate::future::{Completion, KeyValue, RangeChunk, RemoteFuture};
use crate::network::NetworkDriver;
use crate::option::{self, OptionScope, OptionTarget};
use crate::version::Version;

/// Oldest API version the binding accepts.
pub const MIN_API_VERSION: i32 = 500;
/// Newest API version the binding has been tested against.
pub const MAX_TESTED_API_VERSION: i32 = 620;

type FdbError = c_int;
type FdbBool = c_int;

#[repr(C)]
struct FDBFuture {
    _private: [u8; 0],
}

#[repr(C)]
struct FDBDatabase {
    _private: [u8; 0],
}

#[repr(C)]
struct FDBTransaction {
    _private: [u8; 0],
}

#[repr(C, packed(4))]
struct FDBKeyValue {
    key: *const u8,
    key_length: c_int,
    value: *const u8,
    value_length: c_int,
}

#[repr(C, packed(4))]
struct FDBKey {
    key: *const u8,
    key_length: c_int,
}

type FDBCallback = unsafe extern "C" fn(*mut FDBFuture, *mut c_void);

macro_rules! fdb_symbols {
    (
        required { $($name:ident: fn($($arg:ty),*) $(-> $ret:ty)?;)* }
        optional { $($opt:ident: fn($($oarg:ty),*) $(-> $oret:ty)?;)* }
    ) => {
        struct Symbols {
            $($name: unsafe extern "C" fn($($arg),*) $(-> $ret)?,)*
            $($opt: Option<unsafe extern "C" fn($($oarg),*) $(-> $oret)?>,)*
        }

        impl Symbols {
            unsafe fn load(lib: &Library) -> std::result::Result<Self, libloading::Error> {
                Ok(Self {
                    $($name: *lib.get::<unsafe extern "C" fn($($arg),*) $(-> $ret)?>(
                        concat!(stringify!($name), "\0").as_bytes(),
                    )?,)*
                    $($opt: lib
                        .get::<unsafe extern "C" fn($($oarg),*) $(-> $oret)?>(
                            concat!(stringify!($opt), "\0").as_bytes(),
                        )
                        .ok()
                        .map(|sym| *sym),)*
                })
            }
        }
    };
}

fdb_symbols! {
    required {
        fdb_get_error: fn(FdbError) -> *const c_char;
        fdb_error_predicate: fn(c_int, FdbError) -> FdbBool;
        fdb_select_api_version_impl: fn(c_int, c_int) -> FdbError;
        fdb_network_set_option: fn(c_int, *const u8, c_int) -> FdbError;
        fdb_setup_network: fn() -> FdbError;
        fdb_run_network: fn() -> FdbError;
        fdb_stop_network: fn() -> FdbError;

        fdb_future_cancel: fn(*mut FDBFuture);
        fdb_future_destroy: fn(*mut FDBFuture);
        fdb_future_block_until_ready: fn(*mut FDBFuture) -> FdbError;
        fdb_future_is_ready: fn(*mut FDBFuture) -> FdbBool;
        fdb_future_set_callback: fn(*mut FDBFuture, FDBCallback, *mut c_void) -> FdbError;
        fdb_future_get_error: fn(*mut FDBFuture) -> FdbError;
        fdb_future_get_int64: fn(*mut FDBFuture, *mut i64) -> FdbError;
        fdb_future_get_key: fn(*mut FDBFuture, *mut *const u8, *mut c_int) -> FdbError;
        fdb_future_get_value: fn(*mut FDBFuture, *mut FdbBool, *mut *const u8, *mut c_int) -> FdbError;
        fdb_future_get_keyvalue_array: fn(*mut FDBFuture, *mut *const FDBKeyValue, *mut c_int, *mut FdbBool) -> FdbError;
        fdb_future_get_string_array: fn(*mut FDBFuture, *mut *mut *const c_char, *mut c_int) -> FdbError;

        fdb_create_database: fn(*const c_char, *mut *mut FDBDatabase) -> FdbError;
        fdb_database_destroy: fn(*mut FDBDatabase);
        fdb_database_set_option: fn(*mut FDBDatabase, c_int, *const u8, c_int) -> FdbError;
        fdb_database_create_transaction: fn(*mut FDBDatabase, *mut *mut FDBTransaction) -> FdbError;

        fdb_transaction_destroy: fn(*mut FDBTransaction);
        fdb_transaction_set_option: fn(*mut FDBTransaction, c_int, *const u8, c_int) -> FdbError;
        fdb_transaction_set_read_version: fn(*mut FDBTransaction, i64);
        fdb_transaction_get_read_version: fn(*mut FDBTransaction) -> *mut FDBFuture;
        fdb_transaction_get: fn(*mut FDBTransaction, *const u8, c_int, FdbBool) -> *mut FDBFuture;
        fdb_transaction_get_key: fn(*mut FDBTransaction, *const u8, c_int, FdbBool, c_int, FdbBool) -> *mut FDBFuture;
        fdb_transaction_get_addresses_for_key: fn(*mut FDBTransaction, *const u8, c_int) -> *mut FDBFuture;
        fdb_transaction_get_range: fn(
            *mut FDBTransaction,
            *const u8, c_int, FdbBool, c_int,
            *const u8, c_int, FdbBool, c_int,
            c_int, c_int, c_int, c_int, FdbBool, FdbBool
        ) -> *mut FDBFuture;
        fdb_transaction_set: fn(*mut FDBTransaction, *const u8, c_int, *const u8, c_int);
        fdb_transaction_clear: fn(*mut FDBTransaction, *const u8, c_int);
        fdb_transaction_clear_range: fn(*mut FDBTransaction, *const u8, c_int, *const u8, c_int);
        fdb_transaction_commit: fn(*mut FDBTransaction) -> *mut FDBFuture;
        fdb_transaction_get_committed_version: fn(*mut FDBTransaction, *mut i64) -> FdbError;
        fdb_transaction_get_versionstamp: fn(*mut FDBTransaction) -> *mut FDBFuture;
        fdb_transaction_watch: fn(*mut FDBTransaction, *const u8, c_int) -> *mut FDBFuture;
        fdb_transaction_on_error: fn(*mut FDBTransaction, FdbError) -> *mut FDBFuture;
        fdb_transaction_reset: fn(*mut FDBTransaction);
        fdb_transaction_cancel: fn(*mut FDBTransaction);
    }

    // Added in the 6.3 client.
    optional {
        fdb_future_get_key_array: fn(*mut FDBFuture, *mut *const FDBKey, *mut c_int) -> FdbError;
        fdb_transaction_get_estimated_range_size_bytes: fn(*mut FDBTransaction, *const u8, c_int, *const u8, c_int) -> *mut FDBFuture;
        fdb_transaction_get_range_split_points: fn(*mut FDBTransaction, *const u8, c_int, *const u8, c_int, i64) -> *mut FDBFuture;
    }
}

/// Unwrap a symbol that older client libraries do not export.
fn require<T>(sym: Option<T>, name: &str) -> Result<T> {
    sym.ok_or_else(|| {
        Error::InvalidArgument(format!(
            "{} is not available in the loaded client library (6.3 or later required)",
            name
        ))
    })
}

/// The loaded client library.
pub struct FdbApi {
    sym: Symbols,
    api_version: AtomicI32,
    _lib: Library,
}

impl FdbApi {
    /// Load the client library at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Arc<Self>> {
        let path = path.as_ref();
        // SAFETY: loading libfdb_c runs no initialisers with preconditions,
        // and every symbol type matches fdb_c.h.
        let (lib, sym) = unsafe {
            let lib = Library::new(path)?;
            let sym = Symbols::load(&lib)?;
            (lib, sym)
        };
        tracing::info!(path = %path.display(), "loaded FoundationDB client library");
        Ok(Arc::new(Self {
            sym,
            api_version: AtomicI32::new(0),
            _lib: lib,
        }))
    }

    /// Load the library named by `config` and select its API version.
    pub fn from_config(config: &NetworkConfig) -> Result<Arc<Self>> {
        let api = Self::load(config.resolve_library_path())?;
        api.select_api_version(config.api_version)?;
        Ok(api)
    }

    fn check(&self, err: FdbError) -> std::result::Result<(), RemoteError> {
        if err == 0 {
            Ok(())
        } else {
            Err(self.remote_error(err))
        }
    }

    pub fn remote_error(&self, code: i32) -> RemoteError {
        RemoteError::new(code, self.error_message(code))
    }

    pub fn error_message(&self, code: i32) -> String {
        // SAFETY: fdb_get_error returns a static, NUL-terminated string.
        unsafe {
            let msg = (self.sym.fdb_get_error)(code);
            if msg.is_null() {
                return format!("unknown error {}", code);
            }
            CStr::from_ptr(msg).to_string_lossy().into_owned()
        }
    }

    pub fn error_predicate(&self, test: i32, code: i32) -> bool {
        unsafe { (self.sym.fdb_error_predicate)(test, code) != 0 }
    }

    pub fn api_version(&self) -> Option<i32> {
        match self.api_version.load(Ordering::Acquire) {
            0 => None,
            v => Some(v),
        }
    }

    /// Select the API version. Repeating the selected version is a no-op.
    pub fn select_api_version(&self, version: i32) -> Result<()> {
        if let Some(current) = self.api_version() {
            if current == version {
                return Ok(());
            }
            return Err(Error::InvalidArgument(format!(
                "foundationdb already initialized with API version {}",
                current
            )));
        }
        if version < MIN_API_VERSION {
            return Err(Error::InvalidArgument(format!(
                "API versions below {} are not supported",
                MIN_API_VERSION
            )));
        }
        if version > MAX_TESTED_API_VERSION {
            tracing::warn!(
                version,
                max = MAX_TESTED_API_VERSION,
                "using an API version newer than this binding has been tested with"
            );
        }
        // Header version equal to the runtime version: the binding only
        // relies on calls present in every selected version.
        let err = unsafe { (self.sym.fdb_select_api_version_impl)(version, version) };
        if err == code::API_VERSION_ALREADY_SET {
            return Err(Error::InvalidArgument(
                "foundationdb API version was already selected in this process".to_string(),
            ));
        }
        self.check(err)?;
        self.api_version.store(version, Ordering::Release);
        Ok(())
    }

    pub fn create_database(self: &Arc<Self>, cluster_file: Option<&str>) -> Result<Database> {
        let path = cluster_file
            .map(CString::new)
            .transpose()
            .map_err(|_| Error::InvalidArgument("cluster file path contains a NUL byte".into()))?;
        let mut out = ptr::null_mut();
        let err = unsafe {
            (self.sym.fdb_create_database)(path.as_ref().map_or(ptr::null(), |p| p.as_ptr()), &mut out)
        };
        self.check(err)?;
        let raw = NonNull::new(out)
            .ok_or_else(|| Error::Lifecycle("fdb_create_database returned null".into()))?;
        Ok(Database {
            api: self.clone(),
            raw,
        })
    }

    fn future(self: &Arc<Self>, raw: *mut FDBFuture) -> Result<FdbFuture> {
        let raw = NonNull::new(raw)
            .ok_or_else(|| Error::Lifecycle("client library returned a null future".into()))?;
        Ok(FdbFuture {
            api: self.clone(),
            raw,
        })
    }
}

impl NetworkDriver for FdbApi {
    fn setup(&self) -> std::result::Result<(), RemoteError> {
        self.check(unsafe { (self.sym.fdb_setup_network)() })
    }

    fn run(&self) -> std::result::Result<(), RemoteError> {
        self.check(unsafe { (self.sym.fdb_run_network)() })
    }

    fn stop(&self) -> std::result::Result<(), RemoteError> {
        self.check(unsafe { (self.sym.fdb_stop_network)() })
    }
}

/// Network options are process-wide; target them through the api itself.
impl OptionTarget for FdbApi {
    fn scope(&self) -> OptionScope {
        OptionScope::Network
    }

    fn set_raw(&self, code: i32, value: Option<&[u8]>) -> std::result::Result<(), RemoteError> {
        let (ptr, len) = raw_parts(value);
        self.check(unsafe { (self.sym.fdb_network_set_option)(code, ptr, len) })
    }
}

fn raw_parts(value: Option<&[u8]>) -> (*const u8, c_int) {
    match value {
        Some(v) => (v.as_ptr(), v.len() as c_int),
        None => (ptr::null(), 0),
    }
}

fn len(bytes: &[u8]) -> Result<c_int> {
    c_int::try_from(bytes.len())
        .map_err(|_| Error::InvalidArgument(format!("buffer of {} bytes is too large", bytes.len())))
}

/// Copy a library-owned buffer. Null with zero length is the empty slice.
unsafe fn copy_bytes(ptr: *const u8, len: c_int) -> Vec<u8> {
    if ptr.is_null() || len <= 0 {
        Vec::new()
    } else {
        slice::from_raw_parts(ptr, len as usize).to_vec()
    }
}

/// A future owned by the client library.
pub struct FdbFuture {
    api: Arc<FdbApi>,
    raw: NonNull<FDBFuture>,
}

// SAFETY: FDBFuture handles may be used from any thread; the bridge never
// uses one from two threads at once.
unsafe impl Send for FdbFuture {}

unsafe extern "C" fn run_completion(_future: *mut FDBFuture, ctx: *mut c_void) {
    let callback = Box::from_raw(ctx as *mut Completion);
    if panic::catch_unwind(AssertUnwindSafe(callback)).is_err() {
        tracing::error!("completion callback panicked");
    }
}

impl FdbFuture {
    fn raw(&self) -> *mut FDBFuture {
        self.raw.as_ptr()
    }
}

impl RemoteFuture for FdbFuture {
    fn block_until_ready(&self) -> std::result::Result<(), RemoteError> {
        self.api
            .check(unsafe { (self.api.sym.fdb_future_block_until_ready)(self.raw()) })
    }

    fn is_ready(&self) -> bool {
        unsafe { (self.api.sym.fdb_future_is_ready)(self.raw()) != 0 }
    }

    fn on_ready(&self, callback: Completion) -> std::result::Result<(), RemoteError> {
        let ctx = Box::into_raw(Box::new(callback)) as *mut c_void;
        let err = unsafe { (self.api.sym.fdb_future_set_callback)(self.raw(), run_completion, ctx) };
        if err != 0 {
            // The library did not take the callback; reclaim it.
            drop(unsafe { Box::from_raw(ctx as *mut Completion) });
        }
        self.api.check(err)
    }

    fn error(&self) -> std::result::Result<(), RemoteError> {
        self.api
            .check(unsafe { (self.api.sym.fdb_future_get_error)(self.raw()) })
    }

    fn value(&self) -> std::result::Result<Option<Vec<u8>>, RemoteError> {
        let mut present: FdbBool = 0;
        let mut value = ptr::null();
        let mut len = 0;
        self.api.check(unsafe {
            (self.api.sym.fdb_future_get_value)(self.raw(), &mut present, &mut value, &mut len)
        })?;
        if present == 0 {
            return Ok(None);
        }
        Ok(Some(unsafe { copy_bytes(value, len) }))
    }

    fn key(&self) -> std::result::Result<Vec<u8>, RemoteError> {
        let mut key = ptr::null();
        let mut len = 0;
        self.api
            .check(unsafe { (self.api.sym.fdb_future_get_key)(self.raw(), &mut key, &mut len) })?;
        Ok(unsafe { copy_bytes(key, len) })
    }

    fn int64(&self) -> std::result::Result<i64, RemoteError> {
        let mut out = 0i64;
        self.api
            .check(unsafe { (self.api.sym.fdb_future_get_int64)(self.raw(), &mut out) })?;
        Ok(out)
    }

    fn key_values(&self) -> std::result::Result<RangeChunk, RemoteError> {
        let mut kvs: *const FDBKeyValue = ptr::null();
        let mut count = 0;
        let mut more: FdbBool = 0;
        self.api.check(unsafe {
            (self.api.sym.fdb_future_get_keyvalue_array)(self.raw(), &mut kvs, &mut count, &mut more)
        })?;
        let mut results = Vec::with_capacity(count.max(0) as usize);
        for i in 0..count.max(0) as usize {
            // SAFETY: the library guarantees `count` entries at `kvs`.
            let kv = unsafe { ptr::read_unaligned(kvs.add(i)) };
            let (key, key_len, value, value_len) = (kv.key, kv.key_length, kv.value, kv.value_length);
            results.push(KeyValue {
                key: unsafe { copy_bytes(key, key_len) },
                value: unsafe { copy_bytes(value, value_len) },
            });
        }
        Ok(RangeChunk {
            results,
            more: more != 0,
        })
    }

    fn keys(&self) -> std::result::Result<Vec<Vec<u8>>, RemoteError> {
        let mut keys: *const FDBKey = ptr::null();
        let mut count = 0;
        let get_key_array = self.api.sym.fdb_future_get_key_array.ok_or_else(|| {
            RemoteError::new(
                code::CLIENT_INVALID_OPERATION,
                "fdb_future_get_key_array is not available in the loaded client library",
            )
        })?;
        self.api
            .check(unsafe { get_key_array(self.raw(), &mut keys, &mut count) })?;
        Ok((0..count.max(0) as usize)
            .map(|i| {
                let k = unsafe { ptr::read_unaligned(keys.add(i)) };
                let (key, key_len) = (k.key, k.key_length);
                unsafe { copy_bytes(key, key_len) }
            })
            .collect())
    }

    fn strings(&self) -> std::result::Result<Vec<String>, RemoteError> {
        let mut strings: *mut *const c_char = ptr::null_mut();
        let mut count = 0;
        self.api.check(unsafe {
            (self.api.sym.fdb_future_get_string_array)(self.raw(), &mut strings, &mut count)
        })?;
        Ok((0..count.max(0) as usize)
            .map(|i| unsafe { CStr::from_ptr(*strings.add(i)).to_string_lossy().into_owned() })
            .collect())
    }

    fn cancel(&self) {
        unsafe { (self.api.sym.fdb_future_cancel)(self.raw()) }
    }
}

impl Drop for FdbFuture {
    fn drop(&mut self) {
        unsafe { (self.api.sym.fdb_future_destroy)(self.raw()) }
    }
}

pub struct Database {
    api: Arc<FdbApi>,
    raw: NonNull<FDBDatabase>,
}

// SAFETY: FDBDatabase is thread-safe in the client library.
unsafe impl Send for Database {}
unsafe impl Sync for Database {}

impl Database {
    pub fn create_transaction(&self) -> Result<Transaction> {
        let mut out = ptr::null_mut();
        self.api.check(unsafe {
            (self.api.sym.fdb_database_create_transaction)(self.raw.as_ptr(), &mut out)
        })?;
        let raw = NonNull::new(out)
            .ok_or_else(|| Error::Lifecycle("fdb_database_create_transaction returned null".into()))?;
        Ok(Transaction {
            api: self.api.clone(),
            raw,
        })
    }

    pub fn set_option(&self, code: u32, value: &option::OptionValue) -> Result<()> {
        option::set_option(self, code, value)
    }
}

impl OptionTarget for Database {
    fn scope(&self) -> OptionScope {
        OptionScope::Database
    }

    fn set_raw(&self, code: i32, value: Option<&[u8]>) -> std::result::Result<(), RemoteError> {
        let (ptr, len) = raw_parts(value);
        self.api.check(unsafe {
            (self.api.sym.fdb_database_set_option)(self.raw.as_ptr(), code, ptr, len)
        })
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        unsafe { (self.api.sym.fdb_database_destroy)(self.raw.as_ptr()) }
    }
}

/// One side of a key selector.
#[derive(Debug, Clone, Copy)]
pub struct Selector<'a> {
    pub key: &'a [u8],
    pub or_equal: bool,
    pub offset: i32,
}

/// Parameters of one range read batch.
#[derive(Debug, Clone, Copy)]
pub struct RangeRequest<'a> {
    pub begin: Selector<'a>,
    pub end: Selector<'a>,
    pub limit: i32,
    pub target_bytes: i32,
    pub mode: i32,
    pub iteration: i32,
    pub snapshot: bool,
    pub reverse: bool,
}

pub struct Transaction {
    api: Arc<FdbApi>,
    raw: NonNull<FDBTransaction>,
}

// SAFETY: a transaction may move between threads; the binding only uses it
// from the host thread.
unsafe impl Send for Transaction {}

impl Transaction {
    fn raw(&self) -> *mut FDBTransaction {
        self.raw.as_ptr()
    }

    pub fn set_option(&self, code: u32, value: &option::OptionValue) -> Result<()> {
        option::set_option(self, code, value)
    }

    pub fn get(&self, key: &[u8], snapshot: bool) -> Result<FdbFuture> {
        let f = unsafe {
            (self.api.sym.fdb_transaction_get)(self.raw(), key.as_ptr(), len(key)?, snapshot as FdbBool)
        };
        self.api.future(f)
    }

    pub fn get_key(&self, selector: Selector<'_>, snapshot: bool) -> Result<FdbFuture> {
        let f = unsafe {
            (self.api.sym.fdb_transaction_get_key)(
                self.raw(),
                selector.key.as_ptr(),
                len(selector.key)?,
                selector.or_equal as FdbBool,
                selector.offset,
                snapshot as FdbBool,
            )
        };
        self.api.future(f)
    }

    pub fn get_range(&self, req: RangeRequest<'_>) -> Result<FdbFuture> {
        let f = unsafe {
            (self.api.sym.fdb_transaction_get_range)(
                self.raw(),
                req.begin.key.as_ptr(),
                len(req.begin.key)?,
                req.begin.or_equal as FdbBool,
                req.begin.offset,
                req.end.key.as_ptr(),
                len(req.end.key)?,
                req.end.or_equal as FdbBool,
                req.end.offset,
                req.limit,
                req.target_bytes,
                req.mode,
                req.iteration,
                req.snapshot as FdbBool,
                req.reverse as FdbBool,
            )
        };
        self.api.future(f)
    }

    pub fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        unsafe {
            (self.api.sym.fdb_transaction_set)(
                self.raw(),
                key.as_ptr(),
                len(key)?,
                value.as_ptr(),
                len(value)?,
            )
        };
        Ok(())
    }

    pub fn clear(&self, key: &[u8]) -> Result<()> {
        unsafe { (self.api.sym.fdb_transaction_clear)(self.raw(), key.as_ptr(), len(key)?) };
        Ok(())
    }

    pub fn clear_range(&self, begin: &[u8], end: &[u8]) -> Result<()> {
        unsafe {
            (self.api.sym.fdb_transaction_clear_range)(
                self.raw(),
                begin.as_ptr(),
                len(begin)?,
                end.as_ptr(),
                len(end)?,
            )
        };
        Ok(())
    }

    pub fn commit(&self) -> Result<FdbFuture> {
        let f = unsafe { (self.api.sym.fdb_transaction_commit)(self.raw()) };
        self.api.future(f)
    }

    pub fn on_error(&self, code: i32) -> Result<FdbFuture> {
        let f = unsafe { (self.api.sym.fdb_transaction_on_error)(self.raw(), code) };
        self.api.future(f)
    }

    pub fn reset(&self) {
        unsafe { (self.api.sym.fdb_transaction_reset)(self.raw()) }
    }

    pub fn cancel(&self) {
        unsafe { (self.api.sym.fdb_transaction_cancel)(self.raw()) }
    }

    pub fn get_read_version(&self) -> Result<FdbFuture> {
        let f = unsafe { (self.api.sym.fdb_transaction_get_read_version)(self.raw()) };
        self.api.future(f)
    }

    pub fn set_read_version(&self, version: Version) {
        unsafe { (self.api.sym.fdb_transaction_set_read_version)(self.raw(), version.as_raw()) }
    }

    pub fn get_committed_version(&self) -> Result<Version> {
        let mut out = 0i64;
        self.api.check(unsafe {
            (self.api.sym.fdb_transaction_get_committed_version)(self.raw(), &mut out)
        })?;
        Ok(Version::from_raw(out))
    }

    pub fn get_versionstamp(&self) -> Result<FdbFuture> {
        let f = unsafe { (self.api.sym.fdb_transaction_get_versionstamp)(self.raw()) };
        self.api.future(f)
    }

    pub fn get_addresses_for_key(&self, key: &[u8]) -> Result<FdbFuture> {
        let f = unsafe {
            (self.api.sym.fdb_transaction_get_addresses_for_key)(self.raw(), key.as_ptr(), len(key)?)
        };
        self.api.future(f)
    }

    pub fn get_estimated_range_size_bytes(&self, begin: &[u8], end: &[u8]) -> Result<FdbFuture> {
        let get_size = require(
            self.api.sym.fdb_transaction_get_estimated_range_size_bytes,
            "fdb_transaction_get_estimated_range_size_bytes",
        )?;
        let f = unsafe {
            get_size(
                self.raw(),
                begin.as_ptr(),
                len(begin)?,
                end.as_ptr(),
                len(end)?,
            )
        };
        self.api.future(f)
    }

    pub fn get_range_split_points(&self, begin: &[u8], end: &[u8], chunk_size: i64) -> Result<FdbFuture> {
        let get_split_points = require(
            self.api.sym.fdb_transaction_get_range_split_points,
            "fdb_transaction_get_range_split_points",
        )?;
        let f = unsafe {
            get_split_points(
                self.raw(),
                begin.as_ptr(),
                len(begin)?,
                end.as_ptr(),
                len(end)?,
                chunk_size,
            )
        };
        self.api.future(f)
    }

    pub fn watch(&self, key: &[u8]) -> Result<FdbFuture> {
        let f = unsafe { (self.api.sym.fdb_transaction_watch)(self.raw(), key.as_ptr(), len(key)?) };
        self.api.future(f)
    }
}

impl OptionTarget for Transaction {
    fn scope(&self) -> OptionScope {
        OptionScope::Transaction
    }

    fn set_raw(&self, code: i32, value: Option<&[u8]>) -> std::result::Result<(), RemoteError> {
        let (ptr, len) = raw_parts(value);
        self.api.check(unsafe {
            (self.api.sym.fdb_transaction_set_option)(self.raw(), code, ptr, len)
        })
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        unsafe { (self.api.sym.fdb_transaction_destroy)(self.raw()) }
    }
}
