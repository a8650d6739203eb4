//! Exported RPC services.
//!
//! A service is described by a [`ServiceDefinition`]: the name of the
//! exported type plus a table of callable methods. Any closure whose
//! parameters implement [`DeserializeOwned`] and whose return value is a
//! [`CallResult`] of something [`Serialize`] can be a method, so the
//! definition can wrap an arbitrary object by capturing it.
//!
//! ```rust
//! use std::sync::Arc;
//! use wisdom_wamp::{CallResult, ServiceDefinition};
//!
//! struct Calc;
//!
//! impl Calc {
//!     fn add(&self, a: i64, b: i64) -> i64 {
//!         a + b
//!     }
//! }
//!
//! let calc = Arc::new(Calc);
//! let definition = ServiceDefinition::builder("Calc")
//!     .method("add", move |a: i64, b: i64| -> CallResult<i64> { Ok(calc.add(a, b)) })
//!     .build();
//!
//! assert!(definition.has_method("add"));
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::{CallError, CallResult, RegistryError};

/// A callable that can be exported as a WAMP method.
///
/// Implemented for closures of up to eight arguments. `Args` is the tuple of
/// parameter types and only serves to keep the implementations apart.
///
/// Arguments are converted with `serde_json::from_value`, which does not
/// coerce between JSON types: `1.0` or `"1"` sent to an `i32` parameter fails
/// with `IllegalArgumentException`. Take `f64`, `serde_json::Value` or a type
/// with a lenient `Deserialize` impl when clients may send either form.
pub trait Handler<Args>: Send + Sync + 'static {
    /// Number of positional arguments the callable takes.
    const ARITY: usize;

    /// Convert the JSON arguments, invoke, and serialize the result.
    fn call(&self, args: Vec<Value>) -> CallResult<Value>;
}

/// Convert one positional JSON argument to its declared type.
fn convert_argument<T: DeserializeOwned>(index: usize, value: Value) -> CallResult<T> {
    serde_json::from_value(value).map_err(|e| {
        CallError::illegal_argument(format!("Cannot convert argument {index}: {e}"))
    })
}

fn serialize_result<R: Serialize>(result: R) -> CallResult<Value> {
    serde_json::to_value(result)
        .map_err(|e| CallError::runtime(format!("Cannot serialize result: {e}")))
}

macro_rules! impl_handler {
    ($arity:expr $(, $ty:ident)*) => {
        impl<F, R, $($ty,)*> Handler<($($ty,)*)> for F
        where
            F: Fn($($ty),*) -> CallResult<R> + Send + Sync + 'static,
            R: Serialize,
            $($ty: DeserializeOwned,)*
        {
            const ARITY: usize = $arity;

            #[allow(non_snake_case, unused_mut, unused_variables)]
            fn call(&self, args: Vec<Value>) -> CallResult<Value> {
                let received = args.len();
                if received != Self::ARITY {
                    return Err(CallError::unsupported_operation(format!(
                        "Argument mismatch, expecting {}, received {} values",
                        Self::ARITY,
                        received
                    )));
                }
                let mut args = args.into_iter().enumerate();
                $(
                    let $ty: $ty = {
                        let (index, value) = args
                            .next()
                            .ok_or_else(|| CallError::runtime("argument list exhausted"))?;
                        convert_argument(index, value)?
                    };
                )*
                serialize_result((self)($($ty),*)?)
            }
        }
    };
}

impl_handler!(0);
impl_handler!(1, A1);
impl_handler!(2, A1, A2);
impl_handler!(3, A1, A2, A3);
impl_handler!(4, A1, A2, A3, A4);
impl_handler!(5, A1, A2, A3, A4, A5);
impl_handler!(6, A1, A2, A3, A4, A5, A6);
impl_handler!(7, A1, A2, A3, A4, A5, A6, A7);
impl_handler!(8, A1, A2, A3, A4, A5, A6, A7, A8);

type BoxedHandler = Arc<dyn Fn(Vec<Value>) -> CallResult<Value> + Send + Sync>;

/// One exported overload of a method.
#[derive(Clone)]
pub struct Method {
    arity: usize,
    handler: BoxedHandler,
}

impl Method {
    fn new<H, Args>(handler: H) -> Self
    where
        H: Handler<Args>,
    {
        Self {
            arity: H::ARITY,
            handler: Arc::new(move |args| handler.call(args)),
        }
    }

    /// Number of positional arguments.
    pub fn arity(&self) -> usize {
        self.arity
    }

    /// Invoke with already collected arguments.
    pub fn call(&self, args: Vec<Value>) -> CallResult<Value> {
        (self.handler)(args)
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method").field("arity", &self.arity).finish()
    }
}

/// Result of looking a method up by name and arity.
#[derive(Debug)]
pub enum MethodLookup<'a> {
    /// An overload with the requested arity exists
    Found(&'a Method),
    /// The name exists, with other arities only
    ArityMismatch {
        /// Arities that are exported under this name, ascending
        expected: Vec<usize>,
    },
    /// No method with this name
    NotFound,
}

/// Method table of an exported object.
#[derive(Debug, Clone)]
pub struct ServiceDefinition {
    type_name: String,
    methods: HashMap<String, Vec<Method>>,
}

impl ServiceDefinition {
    /// Start describing a service; `type_name` appears in error messages.
    pub fn builder(type_name: impl Into<String>) -> ServiceBuilder {
        ServiceBuilder {
            definition: Self {
                type_name: type_name.into(),
                methods: HashMap::new(),
            },
        }
    }

    /// Name of the exported type.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Whether at least one overload is exported under `name`.
    pub fn has_method(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    /// Exported method names, sorted.
    pub fn method_names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.methods.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Find the overload of `name` taking `arity` arguments.
    pub fn lookup(&self, name: &str, arity: usize) -> MethodLookup<'_> {
        let Some(overloads) = self.methods.get(name) else {
            return MethodLookup::NotFound;
        };
        match overloads.iter().find(|m| m.arity == arity) {
            Some(method) => MethodLookup::Found(method),
            None => {
                let mut expected: Vec<_> = overloads.iter().map(Method::arity).collect();
                expected.sort_unstable();
                MethodLookup::ArityMismatch { expected }
            }
        }
    }
}

/// Builder for [`ServiceDefinition`].
#[derive(Debug)]
pub struct ServiceBuilder {
    definition: ServiceDefinition,
}

impl ServiceBuilder {
    /// Export a callable under `name`.
    ///
    /// Several callables may share a name as long as their arities differ;
    /// registering the same name and arity again replaces the previous one.
    pub fn method<H, Args>(mut self, name: impl Into<String>, handler: H) -> Self
    where
        H: Handler<Args>,
    {
        let method = Method::new(handler);
        let overloads = self.definition.methods.entry(name.into()).or_default();
        overloads.retain(|m| m.arity != method.arity);
        overloads.push(method);
        self
    }

    /// Finish the definition.
    pub fn build(self) -> ServiceDefinition {
        self.definition
    }
}

impl From<ServiceBuilder> for ServiceDefinition {
    fn from(builder: ServiceBuilder) -> Self {
        builder.build()
    }
}

/// A service bound to a URL.
///
/// Returned by registration and usable to withdraw the service later.
#[derive(Debug)]
pub struct ExportedService {
    /// Full URL prefix; procedure ids are `<url>#<method>`
    pub url: String,
    /// Method table
    pub definition: ServiceDefinition,
    /// Properties supplied at registration
    pub properties: Map<String, Value>,
}

/// Make `url` absolute against the WAMP base url.
///
/// URLs that already carry an `http://` or `https://` scheme are kept as is.
pub fn normalize_url(base_url: &str, url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else if url.starts_with('/') {
        format!("{base_url}{url}")
    } else {
        format!("{base_url}/{url}")
    }
}

/// Exported services keyed by URL.
#[derive(Debug, Default)]
pub struct ServiceRegistry {
    services: DashMap<String, Arc<ExportedService>>,
}

impl ServiceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a service to its URL.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::AlreadyRegistered` if the URL is taken.
    pub fn insert(&self, service: ExportedService) -> Result<Arc<ExportedService>, RegistryError> {
        match self.services.entry(service.url.clone()) {
            Entry::Occupied(entry) => Err(RegistryError::AlreadyRegistered(entry.key().clone())),
            Entry::Vacant(entry) => {
                let service = Arc::new(service);
                entry.insert(Arc::clone(&service));
                Ok(service)
            }
        }
    }

    /// Withdraw the service bound to `url`.
    pub fn remove(&self, url: &str) -> Option<Arc<ExportedService>> {
        self.services.remove(url).map(|(_, service)| service)
    }

    /// Withdraw `service` if it is still the one bound to its url.
    pub fn remove_if_same(&self, service: &Arc<ExportedService>) -> bool {
        self.services
            .remove_if(&service.url, |_, current| Arc::ptr_eq(current, service))
            .is_some()
    }

    /// Service bound to `url`.
    pub fn get(&self, url: &str) -> Option<Arc<ExportedService>> {
        self.services.get(url).map(|entry| Arc::clone(entry.value()))
    }

    /// Snapshot of every exported service.
    pub fn snapshot(&self) -> Vec<Arc<ExportedService>> {
        self.services
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Number of exported services
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// Whether nothing is exported
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Withdraw every service.
    pub fn clear(&self) {
        self.services.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Point {
        x: i32,
        y: i32,
    }

    fn calc() -> ServiceDefinition {
        ServiceDefinition::builder("Calc")
            .method("add", |a: i64, b: i64| -> CallResult<i64> { Ok(a + b) })
            .method("sum", |values: Vec<i64>| -> CallResult<i64> {
                Ok(values.iter().sum())
            })
            .method("noop", || -> CallResult<()> { Ok(()) })
            .method("neg", |p: Point| -> CallResult<Point> {
                Ok(Point { x: -p.x, y: -p.y })
            })
            .build()
    }

    fn call(definition: &ServiceDefinition, name: &str, args: Vec<Value>) -> CallResult<Value> {
        match definition.lookup(name, args.len()) {
            MethodLookup::Found(method) => method.call(args),
            other => panic!("unexpected lookup result {other:?}"),
        }
    }

    #[test]
    fn handlers_convert_arguments_and_results() {
        let calc = calc();
        assert_eq!(call(&calc, "add", vec![json!(1), json!(2)]).unwrap(), json!(3));
        assert_eq!(call(&calc, "sum", vec![json!([9, 1, 3, 4])]).unwrap(), json!(17));
        assert_eq!(call(&calc, "noop", vec![]).unwrap(), Value::Null);
        assert_eq!(
            call(&calc, "neg", vec![json!({"x": 1, "y": -2})]).unwrap(),
            json!({"x": -1, "y": 2})
        );
    }

    #[test]
    fn conversion_failure_names_the_argument() {
        let err = call(&calc(), "add", vec![json!(1), json!("two")]).unwrap_err();
        assert_eq!(err.kind, crate::ErrorKind::IllegalArgument);
        assert!(err.message.contains("Cannot convert argument 1"));
    }

    #[test]
    fn option_parameters_accept_null() {
        let definition = ServiceDefinition::builder("Howdy")
            .method("complex", |p: Option<Point>| -> CallResult<Option<Point>> { Ok(p) })
            .build();
        assert_eq!(call(&definition, "complex", vec![Value::Null]).unwrap(), Value::Null);
    }

    #[test]
    fn lookup_distinguishes_missing_and_arity() {
        let calc = calc();
        assert!(matches!(calc.lookup("mul", 2), MethodLookup::NotFound));
        match calc.lookup("add", 3) {
            MethodLookup::ArityMismatch { expected } => assert_eq!(expected, vec![2]),
            other => panic!("unexpected lookup result {other:?}"),
        }
    }

    #[test]
    fn overloads_by_arity() {
        let definition = ServiceDefinition::builder("Greeter")
            .method("greet", || -> CallResult<String> { Ok("hello".into()) })
            .method("greet", |name: String| -> CallResult<String> {
                Ok(format!("hello {name}"))
            })
            .build();
        assert_eq!(call(&definition, "greet", vec![]).unwrap(), json!("hello"));
        assert_eq!(
            call(&definition, "greet", vec![json!("bob")]).unwrap(),
            json!("hello bob")
        );
        assert_eq!(definition.method_names(), vec!["greet"]);
    }

    #[test]
    fn conversion_does_not_coerce_json_types() {
        let definition = ServiceDefinition::builder("T")
            .method("int", |n: i32| -> CallResult<i32> { Ok(n) })
            .method("float", |n: f64| -> CallResult<f64> { Ok(n) })
            .build();

        for value in [json!(1.0), json!("1")] {
            let err = call(&definition, "int", vec![value]).unwrap_err();
            assert_eq!(err.kind, crate::ErrorKind::IllegalArgument);
            assert!(err.message.starts_with("Cannot convert argument 0"));
        }
        assert_eq!(call(&definition, "float", vec![json!(1)]).unwrap(), json!(1.0));
    }

    #[test]
    fn same_arity_replaces() {
        let definition = ServiceDefinition::builder("T")
            .method("v", || -> CallResult<i32> { Ok(1) })
            .method("v", || -> CallResult<i32> { Ok(2) })
            .build();
        assert_eq!(call(&definition, "v", vec![]).unwrap(), json!(2));
    }

    #[test]
    fn normalize_relative_urls() {
        let base = "http://example.com:9001/wamp";
        assert_eq!(normalize_url(base, "calc"), "http://example.com:9001/wamp/calc");
        assert_eq!(normalize_url(base, "/calc"), "http://example.com:9001/wamp/calc");
        assert_eq!(normalize_url(base, "http://other/calc"), "http://other/calc");
        assert_eq!(normalize_url(base, "https://other/calc"), "https://other/calc");
    }

    #[test]
    fn registry_rejects_duplicates() {
        let registry = ServiceRegistry::new();
        let exported = |url: &str| ExportedService {
            url: url.to_string(),
            definition: calc(),
            properties: Map::new(),
        };

        registry.insert(exported("http://example.com/calc")).unwrap();
        assert!(matches!(
            registry.insert(exported("http://example.com/calc")),
            Err(RegistryError::AlreadyRegistered(_))
        ));
        assert_eq!(registry.len(), 1);

        assert!(registry.remove("http://example.com/calc").is_some());
        assert!(registry.is_empty());
        registry.insert(exported("http://example.com/calc")).unwrap();
        assert_eq!(registry.snapshot().len(), 1);
    }

    #[test]
    fn remove_if_same_checks_identity() {
        let registry = ServiceRegistry::new();
        let exported = || ExportedService {
            url: "http://example.com/calc".to_string(),
            definition: calc(),
            properties: Map::new(),
        };

        let first = registry.insert(exported()).unwrap();
        assert!(registry.remove_if_same(&first));
        let second = registry.insert(exported()).unwrap();
        assert!(!registry.remove_if_same(&first));
        assert_eq!(registry.len(), 1);
        assert!(registry.remove_if_same(&second));
        assert!(registry.is_empty());
    }
}
