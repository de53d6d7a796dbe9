//! Node.js bindings for the FoundationDB client.
//!
//! All of the bridging lives in `fdb-bridge`. This module adapts it to
//! napi: a threadsafe function wakes the JS thread for each completion, and
//! every future-backed method either calls a node-style callback or returns
//! a promise.

#![deny(clippy::all)]

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::{Arc, OnceLock};

use napi::bindgen_prelude::{Buffer, Either, Either3};
use napi::threadsafe_function::{
    ErrorStrategy, ThreadSafeCallContext, ThreadsafeFunction, ThreadsafeFunctionCallMode,
};
use napi::{CallContext, Env, JsDeferred, JsFunction, JsObject, JsUnknown, Ref, Status};
use napi_derive::napi;

use fdb_bridge::sys::{self, FdbApi, RangeRequest, Selector};
use fdb_bridge::{
    Bridge, Error as BridgeError, Extract, HostClosed, Network, NetworkConfig, OpId, OptionValue,
    Outcome, Sink, Version, Wake, WatchPolicy,
};

/// Environment variable holding the log filter.
const LOG_ENV: &str = "FDB_NODE_LOG";

/// Convert bridge error to napi Error.
fn to_napi_err(e: BridgeError) -> napi::Error {
    napi::Error::from_reason(format!("{}", e))
}

/// Error object handed to node-style callbacks. Remote errors carry the
/// library's numeric code as `code`.
fn error_to_js(env: &Env, e: BridgeError) -> napi::Result<JsUnknown> {
    let code = e.remote_code();
    let mut err = env.create_error(to_napi_err(e))?;
    if let Some(code) = code {
        err.set_named_property("code", env.create_int32(code)?)?;
    }
    Ok(err.into_unknown())
}

fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

// =========================================================================
// Process state
// =========================================================================

struct Client {
    api: Arc<FdbApi>,
    network: Network<FdbApi>,
}

static CLIENT: OnceLock<Client> = OnceLock::new();

/// The loaded client. Selecting an API version is always explicit.
fn client() -> napi::Result<&'static Client> {
    CLIENT.get().ok_or_else(|| {
        napi::Error::from_reason("API version not set; call setAPIVersion() or configure() first")
    })
}

fn init_client(config: NetworkConfig) -> napi::Result<&'static Client> {
    init_logging();
    let api = FdbApi::from_config(&config).map_err(to_napi_err)?;
    // Another thread may have won; its client is the one kept.
    let _ = CLIENT.set(Client {
        network: Network::new(api.clone()),
        api,
    });
    let client = CLIENT
        .get()
        .ok_or_else(|| napi::Error::from_reason("client library is not initialised"))?;
    apply_network_options(client, &config)?;
    Ok(client)
}

fn apply_network_options(client: &Client, config: &NetworkConfig) -> napi::Result<()> {
    for opt in &config.network_options {
        fdb_bridge::set_option(&*client.api, opt.code, &opt.value).map_err(to_napi_err)?;
    }
    Ok(())
}

fn option_value(value: Option<Either3<i64, String, Buffer>>) -> OptionValue {
    match value {
        None => OptionValue::None,
        Some(Either3::A(n)) => OptionValue::Int(n as u64),
        Some(Either3::B(s)) => OptionValue::Text(s),
        Some(Either3::C(b)) => OptionValue::Bytes(b.to_vec()),
    }
}

fn bytes(v: &Either<Buffer, String>) -> &[u8] {
    match v {
        Either::A(b) => b.as_ref(),
        Either::B(s) => s.as_bytes(),
    }
}

/// Load the client library and select the API version.
///
/// Later calls may add network options; the API version cannot change.
#[napi]
pub fn configure(config: Option<serde_json::Value>) -> napi::Result<()> {
    let config = match config {
        Some(v) => NetworkConfig::from_value(v).map_err(to_napi_err)?,
        None => NetworkConfig::default(),
    };
    match CLIENT.get() {
        Some(client) => {
            client
                .api
                .select_api_version(config.api_version)
                .map_err(to_napi_err)?;
            apply_network_options(client, &config)
        }
        None => init_client(config).map(|_| ()),
    }
}

#[napi(js_name = "setAPIVersion")]
pub fn set_api_version(version: i32) -> napi::Result<()> {
    match CLIENT.get() {
        Some(client) => client.api.select_api_version(version).map_err(to_napi_err),
        None => init_client(NetworkConfig {
            api_version: version,
            ..NetworkConfig::default()
        })
        .map(|_| ()),
    }
}

#[napi(js_name = "setNetworkOption")]
pub fn set_network_option(
    code: u32,
    value: Option<Either3<i64, String, Buffer>>,
) -> napi::Result<()> {
    let client = client()?;
    fdb_bridge::set_option(&*client.api, code, &option_value(value)).map_err(to_napi_err)
}

/// Start the network thread. Repeated calls are no-ops.
#[napi(js_name = "startNetwork")]
pub fn start_network() -> napi::Result<()> {
    client()?.network.start().map_err(to_napi_err)
}

/// Stop the network thread and wait for it to exit.
#[napi(js_name = "stopNetwork")]
pub fn stop_network() -> napi::Result<()> {
    match CLIENT.get() {
        Some(client) => client.network.stop().map_err(to_napi_err),
        None => Ok(()),
    }
}

#[napi(js_name = "createDatabase")]
pub fn create_database(cluster_file: Option<String>) -> napi::Result<Database> {
    let client = client()?;
    let inner = client
        .api
        .create_database(cluster_file.as_deref())
        .map_err(to_napi_err)?;
    Ok(Database { inner })
}

/// Classify an error code (retryable, maybe committed, ...).
#[napi(js_name = "errorPredicate")]
pub fn error_predicate(test: i32, code: i32) -> napi::Result<bool> {
    Ok(client()?.api.error_predicate(test, code))
}

// =========================================================================
// Host loop
// =========================================================================

/// Wakes the JS thread through a threadsafe function.
struct TsfnWaker {
    tsfn: ThreadsafeFunction<OpId, ErrorStrategy::Fatal>,
}

impl Wake for TsfnWaker {
    fn wake(&self, id: OpId) -> Result<(), HostClosed> {
        match self.tsfn.call(id, ThreadsafeFunctionCallMode::NonBlocking) {
            Status::Ok => Ok(()),
            _ => Err(HostClosed),
        }
    }
}

/// Per JS thread: the operation registry and the handle that wakes it.
struct Host {
    bridge: Bridge,
    tsfn: RefCell<ThreadsafeFunction<OpId, ErrorStrategy::Fatal>>,
    referenced: Cell<bool>,
}

thread_local! {
    static HOST: RefCell<Option<Rc<Host>>> = const { RefCell::new(None) };
}

impl Host {
    fn current(env: &Env) -> napi::Result<Rc<Host>> {
        if let Some(host) = HOST.with(|h| h.borrow().clone()) {
            return Ok(host);
        }

        let noop = env.create_function_from_closure("fdbWake", |ctx: CallContext<'_>| {
            ctx.env.get_undefined()
        })?;
        let mut tsfn: ThreadsafeFunction<OpId, ErrorStrategy::Fatal> = noop
            .create_threadsafe_function(0, |ctx: ThreadSafeCallContext<OpId>| {
                dispatch(&ctx.env, ctx.value);
                Ok(Vec::<u32>::new())
            })?;
        // Only in-flight operations keep the process alive.
        tsfn.unref(env)?;

        let host = Rc::new(Host {
            bridge: Bridge::new(Arc::new(TsfnWaker { tsfn: tsfn.clone() })),
            tsfn: RefCell::new(tsfn),
            referenced: Cell::new(false),
        });
        HOST.with(|h| *h.borrow_mut() = Some(host.clone()));
        Ok(host)
    }

    /// Reference the wake handle while anything is pending.
    fn sync_ref(&self, env: &Env) {
        let busy = self.bridge.pending() > 0;
        if busy == self.referenced.get() {
            return;
        }
        let mut tsfn = self.tsfn.borrow_mut();
        let result = if busy {
            tsfn.refer(env)
        } else {
            tsfn.unref(env)
        };
        match result {
            Ok(()) => self.referenced.set(busy),
            Err(e) => tracing::warn!("failed to update event loop reference: {}", e),
        }
    }
}

fn dispatch(env: &Env, id: OpId) {
    let Some(host) = HOST.with(|h| h.borrow().clone()) else {
        tracing::error!(op = id, "completion on a thread without a bridge");
        return;
    };
    if let Err(e) = host.bridge.dispatch(id) {
        tracing::error!(op = id, "{}", e);
    }
    host.sync_ref(env);
}

// =========================================================================
// Delivery
// =========================================================================

fn buffer(env: &Env, data: Vec<u8>) -> napi::Result<JsUnknown> {
    Ok(env.create_buffer_with_data(data)?.into_raw().into_unknown())
}

fn outcome_to_js(env: &Env, outcome: Outcome) -> napi::Result<JsUnknown> {
    Ok(match outcome {
        Outcome::Unit | Outcome::Value(None) => env.get_undefined()?.into_unknown(),
        Outcome::Value(Some(data)) | Outcome::Key(data) => buffer(env, data)?,
        Outcome::Version(v) => buffer(env, v.to_be_bytes().to_vec())?,
        Outcome::Int64(n) => env.create_int64(n)?.into_unknown(),
        Outcome::KeyValues(chunk) => {
            let mut results = env.create_array_with_length(chunk.results.len())?;
            for (i, kv) in chunk.results.into_iter().enumerate() {
                let mut pair = env.create_array_with_length(2)?;
                pair.set_element(0, buffer(env, kv.key)?)?;
                pair.set_element(1, buffer(env, kv.value)?)?;
                results.set_element(i as u32, pair)?;
            }
            let mut obj = env.create_object()?;
            obj.set_named_property("results", results)?;
            obj.set_named_property("more", env.get_boolean(chunk.more)?)?;
            obj.into_unknown()
        }
        Outcome::Keys(keys) => {
            let mut arr = env.create_array_with_length(keys.len())?;
            for (i, key) in keys.into_iter().enumerate() {
                arr.set_element(i as u32, buffer(env, key)?)?;
            }
            arr.into_unknown()
        }
        Outcome::Strings(strings) => {
            let mut arr = env.create_array_with_length(strings.len())?;
            for (i, s) in strings.iter().enumerate() {
                arr.set_element(i as u32, env.create_string(s)?)?;
            }
            arr.into_unknown()
        }
    })
}

fn bool_to_js(env: &Env, fired: bool) -> napi::Result<JsUnknown> {
    Ok(env.get_boolean(fired)?.into_unknown())
}

type Resolver = Box<dyn FnOnce(Env) -> napi::Result<JsUnknown> + Send>;
type Deferred = JsDeferred<JsUnknown, Resolver>;
type Convert<T> = fn(&Env, T) -> napi::Result<JsUnknown>;

/// Rejection with the same numeric `code` callbacks see.
fn rejection(env: &Env, e: BridgeError) -> napi::Error {
    match error_to_js(env, e) {
        Ok(err) => napi::Error::from(err),
        Err(e) => e,
    }
}

/// How a JS caller receives a result: promise or node-style callback.
///
/// The slot is shared with the sink, so an operation the bridge refused
/// can still be settled by the caller.
enum Delivery {
    Promise(Rc<RefCell<Option<Deferred>>>),
    Callback(Rc<RefCell<Option<Ref<()>>>>),
}

impl Delivery {
    fn new(env: &Env, callback: Option<JsFunction>) -> napi::Result<(Self, Option<JsObject>)> {
        match callback {
            Some(callback) => {
                let reference = env.create_reference(callback)?;
                Ok((Delivery::Callback(Rc::new(RefCell::new(Some(reference)))), None))
            }
            None => {
                let (deferred, promise) = env.create_deferred::<JsUnknown, Resolver>()?;
                Ok((
                    Delivery::Promise(Rc::new(RefCell::new(Some(deferred)))),
                    Some(promise),
                ))
            }
        }
    }

    fn sink<T: Send + 'static>(&self, env: &Env, convert: Convert<T>) -> Sink<T> {
        let env = *env;
        match self {
            Delivery::Promise(slot) => {
                let slot = slot.clone();
                Sink::continuation(move |result: fdb_bridge::Result<T>| {
                    let deferred = slot.borrow_mut().take();
                    if let Some(deferred) = deferred {
                        match result {
                            Ok(value) => {
                                deferred.resolve(Box::new(move |env: Env| convert(&env, value)))
                            }
                            Err(e) => deferred.reject(rejection(&env, e)),
                        }
                    }
                })
            }
            Delivery::Callback(slot) => {
                let slot = slot.clone();
                Sink::continuation(move |result: fdb_bridge::Result<T>| {
                    let reference = slot.borrow_mut().take();
                    if let Some(reference) = reference {
                        // A throwing callback goes to Node's uncaught exception handler.
                        if let Err(e) = invoke(&env, reference, result, convert) {
                            env.fatal_exception(e);
                        }
                    }
                })
            }
        }
    }

    /// Settle after the bridge refused to start the operation.
    ///
    /// A promise is rejected; a callback is released and the error thrown.
    fn abandon(self, env: &Env, e: BridgeError) -> napi::Result<()> {
        match self {
            Delivery::Promise(slot) => {
                let deferred = slot.borrow_mut().take();
                if let Some(deferred) = deferred {
                    deferred.reject(rejection(env, e));
                }
                Ok(())
            }
            Delivery::Callback(slot) => {
                let reference = slot.borrow_mut().take();
                if let Some(mut reference) = reference {
                    reference.unref(*env)?;
                }
                Err(to_napi_err(e))
            }
        }
    }
}

fn invoke<T>(
    env: &Env,
    mut reference: Ref<()>,
    result: fdb_bridge::Result<T>,
    convert: Convert<T>,
) -> napi::Result<()> {
    let callback: JsFunction = env.get_reference_value(&reference)?;
    reference.unref(*env)?;
    let args = match result {
        Ok(value) => [env.get_null()?.into_unknown(), convert(env, value)?],
        Err(e) => [error_to_js(env, e)?, env.get_undefined()?.into_unknown()],
    };
    callback.call(None, &args)?;
    Ok(())
}

/// Hand `future` to the bridge. Returns a promise unless a callback is given.
fn start(
    env: &Env,
    future: sys::FdbFuture,
    extract: Extract,
    callback: Option<JsFunction>,
) -> napi::Result<Option<JsObject>> {
    let host = Host::current(env)?;
    let (delivery, promise) = Delivery::new(env, callback)?;
    let started = host
        .bridge
        .deliver_to(Box::new(future), extract, delivery.sink(env, outcome_to_js));
    host.sync_ref(env);
    if let Err(e) = started {
        delivery.abandon(env, e)?;
    }
    Ok(promise)
}

// =========================================================================
// Database
// =========================================================================

#[napi]
pub struct Database {
    inner: sys::Database,
}

#[napi]
impl Database {
    #[napi(js_name = "createTransaction")]
    pub fn create_transaction(&self) -> napi::Result<Transaction> {
        let inner = self.inner.create_transaction().map_err(to_napi_err)?;
        Ok(Transaction { inner })
    }

    #[napi(js_name = "setOption")]
    pub fn set_option(
        &self,
        code: u32,
        value: Option<Either3<i64, String, Buffer>>,
    ) -> napi::Result<()> {
        self.inner
            .set_option(code, &option_value(value))
            .map_err(to_napi_err)
    }
}

// =========================================================================
// Transaction
// =========================================================================

#[napi]
pub struct Transaction {
    inner: sys::Transaction,
}

#[napi]
impl Transaction {
    #[napi(js_name = "setOption")]
    pub fn set_option(
        &self,
        code: u32,
        value: Option<Either3<i64, String, Buffer>>,
    ) -> napi::Result<()> {
        self.inner
            .set_option(code, &option_value(value))
            .map_err(to_napi_err)
    }

    /// Read a value. Resolves to a buffer, or undefined if the key is absent.
    #[napi]
    pub fn get(
        &self,
        env: Env,
        key: Either<Buffer, String>,
        snapshot: Option<bool>,
        callback: Option<JsFunction>,
    ) -> napi::Result<Option<JsObject>> {
        let future = self
            .inner
            .get(bytes(&key), snapshot.unwrap_or(false))
            .map_err(to_napi_err)?;
        start(&env, future, Extract::Value, callback)
    }

    /// Resolve a key selector.
    #[napi(js_name = "getKey")]
    pub fn get_key(
        &self,
        env: Env,
        key: Either<Buffer, String>,
        or_equal: bool,
        offset: i32,
        snapshot: Option<bool>,
        callback: Option<JsFunction>,
    ) -> napi::Result<Option<JsObject>> {
        let selector = Selector {
            key: bytes(&key),
            or_equal,
            offset,
        };
        let future = self
            .inner
            .get_key(selector, snapshot.unwrap_or(false))
            .map_err(to_napi_err)?;
        start(&env, future, Extract::Key, callback)
    }

    /// Read one batch of a range. Resolves to `{ results: [[key, value]], more }`.
    #[napi(js_name = "getRange")]
    #[allow(clippy::too_many_arguments)]
    pub fn get_range(
        &self,
        env: Env,
        begin: Either<Buffer, String>,
        begin_or_equal: bool,
        begin_offset: i32,
        end: Either<Buffer, String>,
        end_or_equal: bool,
        end_offset: i32,
        limit: i32,
        target_bytes: i32,
        mode: i32,
        iteration: i32,
        snapshot: bool,
        reverse: bool,
        callback: Option<JsFunction>,
    ) -> napi::Result<Option<JsObject>> {
        let req = RangeRequest {
            begin: Selector {
                key: bytes(&begin),
                or_equal: begin_or_equal,
                offset: begin_offset,
            },
            end: Selector {
                key: bytes(&end),
                or_equal: end_or_equal,
                offset: end_offset,
            },
            limit,
            target_bytes,
            mode,
            iteration,
            snapshot,
            reverse,
        };
        let future = self.inner.get_range(req).map_err(to_napi_err)?;
        start(&env, future, Extract::KeyValues, callback)
    }

    #[napi]
    pub fn set(&self, key: Either<Buffer, String>, value: Either<Buffer, String>) -> napi::Result<()> {
        self.inner.set(bytes(&key), bytes(&value)).map_err(to_napi_err)
    }

    #[napi]
    pub fn clear(&self, key: Either<Buffer, String>) -> napi::Result<()> {
        self.inner.clear(bytes(&key)).map_err(to_napi_err)
    }

    #[napi(js_name = "clearRange")]
    pub fn clear_range(
        &self,
        begin: Either<Buffer, String>,
        end: Either<Buffer, String>,
    ) -> napi::Result<()> {
        self.inner
            .clear_range(bytes(&begin), bytes(&end))
            .map_err(to_napi_err)
    }

    #[napi]
    pub fn commit(&self, env: Env, callback: Option<JsFunction>) -> napi::Result<Option<JsObject>> {
        let future = self.inner.commit().map_err(to_napi_err)?;
        start(&env, future, Extract::Unit, callback)
    }

    #[napi]
    pub fn reset(&self) {
        self.inner.reset();
    }

    #[napi]
    pub fn cancel(&self) {
        self.inner.cancel();
    }

    /// Back off and reset for a retryable error; rejects with `code` if not.
    #[napi(js_name = "onError")]
    pub fn on_error(
        &self,
        env: Env,
        code: i32,
        callback: Option<JsFunction>,
    ) -> napi::Result<Option<JsObject>> {
        let future = self.inner.on_error(code).map_err(to_napi_err)?;
        start(&env, future, Extract::Unit, callback)
    }

    /// Resolves to the read version as an 8-byte big-endian buffer.
    #[napi(js_name = "getReadVersion")]
    pub fn get_read_version(
        &self,
        env: Env,
        callback: Option<JsFunction>,
    ) -> napi::Result<Option<JsObject>> {
        let future = self.inner.get_read_version().map_err(to_napi_err)?;
        start(&env, future, Extract::Version, callback)
    }

    #[napi(js_name = "setReadVersion")]
    pub fn set_read_version(&self, version: Buffer) -> napi::Result<()> {
        let version = Version::from_be_bytes(&version).map_err(to_napi_err)?;
        self.inner.set_read_version(version);
        Ok(())
    }

    #[napi(js_name = "getCommittedVersion")]
    pub fn get_committed_version(&self) -> napi::Result<Buffer> {
        let version = self.inner.get_committed_version().map_err(to_napi_err)?;
        Ok(version.to_be_bytes().to_vec().into())
    }

    #[napi(js_name = "getVersionstamp")]
    pub fn get_versionstamp(
        &self,
        env: Env,
        callback: Option<JsFunction>,
    ) -> napi::Result<Option<JsObject>> {
        let future = self.inner.get_versionstamp().map_err(to_napi_err)?;
        start(&env, future, Extract::Key, callback)
    }

    #[napi(js_name = "getAddressesForKey")]
    pub fn get_addresses_for_key(
        &self,
        env: Env,
        key: Either<Buffer, String>,
        callback: Option<JsFunction>,
    ) -> napi::Result<Option<JsObject>> {
        let future = self
            .inner
            .get_addresses_for_key(bytes(&key))
            .map_err(to_napi_err)?;
        start(&env, future, Extract::Strings, callback)
    }

    #[napi(js_name = "getEstimatedRangeSizeBytes")]
    pub fn get_estimated_range_size_bytes(
        &self,
        env: Env,
        begin: Either<Buffer, String>,
        end: Either<Buffer, String>,
        callback: Option<JsFunction>,
    ) -> napi::Result<Option<JsObject>> {
        let future = self
            .inner
            .get_estimated_range_size_bytes(bytes(&begin), bytes(&end))
            .map_err(to_napi_err)?;
        start(&env, future, Extract::Int64, callback)
    }

    #[napi(js_name = "getRangeSplitPoints")]
    pub fn get_range_split_points(
        &self,
        env: Env,
        begin: Either<Buffer, String>,
        end: Either<Buffer, String>,
        chunk_size: i64,
        callback: Option<JsFunction>,
    ) -> napi::Result<Option<JsObject>> {
        let future = self
            .inner
            .get_range_split_points(bytes(&begin), bytes(&end), chunk_size)
            .map_err(to_napi_err)?;
        start(&env, future, Extract::Keys, callback)
    }

    /// Watch a key for changes.
    ///
    /// Returns `{ cancel, promise }`; `promise` is omitted when a callback is
    /// given. Resolves to `true` if the key changed and `false` if the watch
    /// was cancelled or its transaction ended, unless `throwAllErrors` is set.
    #[napi]
    pub fn watch(
        &self,
        env: Env,
        key: Either<Buffer, String>,
        throw_all_errors: Option<bool>,
        callback: Option<JsFunction>,
    ) -> napi::Result<JsObject> {
        let future = self.inner.watch(bytes(&key)).map_err(to_napi_err)?;
        let policy = WatchPolicy::ignoring_standard_errors(!throw_all_errors.unwrap_or(false));
        let host = Host::current(&env)?;
        let (delivery, promise) = Delivery::new(&env, callback)?;
        let started = host
            .bridge
            .watch_to(Box::new(future), policy, delivery.sink(&env, bool_to_js));
        host.sync_ref(&env);

        let mut handle = env.create_object()?;
        if let Some(promise) = promise {
            handle.set_named_property("promise", promise)?;
        }
        let cancel = match started {
            Ok(watch) => env.create_function_from_closure("cancel", move |ctx: CallContext<'_>| {
                ctx.env.get_boolean(watch.cancel())
            })?,
            Err(e) => {
                delivery.abandon(&env, e)?;
                env.create_function_from_closure("cancel", |ctx: CallContext<'_>| {
                    ctx.env.get_boolean(false)
                })?
            }
        };
        handle.set_named_property("cancel", cancel)?;
        Ok(handle)
    }
}
