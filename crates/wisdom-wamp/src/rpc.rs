//! RPC invocation against the service registry.
//!
//! The invoker works on an already CURIE-resolved procedure id of the form
//! `<service url>#<method>` and produces the tagged outcome of the call.
//! Framing the outcome as CALLRESULT or CALLERROR is left to the controller.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use serde_json::Value;

use crate::error::{CallError, CallResult, ErrorKind};
use crate::service::{MethodLookup, ServiceRegistry};

/// Build the error URI for a failure kind: `<error base>#<Kind>`.
pub fn error_uri(error_base: &str, kind: &ErrorKind) -> String {
    format!("{error_base}#{}", kind.name())
}

/// Invoke `proc_id` with positional `args`.
///
/// `requested` is the id as the client sent it, before CURIE expansion; the
/// malformed-id errors quote it. Validation happens in order, and the first failing step decides the
/// error:
///
/// 1. the id contains a `#`
/// 2. the part before it names a registered service
/// 3. the method name is not empty
/// 4. a method with that name and arity exists
///
/// Failures returned by the callable keep their kind and message. A panic
/// inside the callable is reported as `RuntimeException`.
pub fn invoke(
    registry: &ServiceRegistry,
    proc_id: &str,
    requested: &str,
    args: Vec<Value>,
) -> CallResult<Value> {
    let Some((url, method_name)) = proc_id.split_once('#') else {
        return Err(CallError::illegal_argument(format!(
            "Malformed procId {requested}"
        )));
    };

    let service = registry
        .get(url)
        .ok_or_else(|| CallError::illegal_argument(format!("Service object {url} not found")))?;

    if method_name.is_empty() {
        return Err(CallError::illegal_argument(format!(
            "Malformed method name in {requested}"
        )));
    }

    let definition = &service.definition;
    let method = match definition.lookup(method_name, args.len()) {
        MethodLookup::Found(method) => method,
        MethodLookup::ArityMismatch { expected } => {
            return Err(CallError::unsupported_operation(format!(
                "Argument mismatch, expecting {}, received {} values",
                join_arities(&expected),
                args.len()
            )));
        }
        MethodLookup::NotFound => {
            return Err(CallError::unsupported_operation(format!(
                "Cannot find method {method_name} in {}",
                definition.type_name()
            )));
        }
    };

    let details = format!(
        "error while invoking {method_name} from {}",
        definition.type_name()
    );
    match panic::catch_unwind(AssertUnwindSafe(|| method.call(args))) {
        Ok(Ok(result)) => Ok(result),
        Ok(Err(err)) => Err(err.with_details(details)),
        Err(payload) => {
            tracing::error!(
                proc_id,
                "RPC method panicked: {}",
                panic_message(payload.as_ref())
            );
            Err(CallError::runtime(panic_message(payload.as_ref())).with_details(details))
        }
    }
}

fn join_arities(arities: &[usize]) -> String {
    arities
        .iter()
        .map(usize::to_string)
        .collect::<Vec<_>>()
        .join(" or ")
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "RPC method panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{ExportedService, ServiceDefinition};
    use serde_json::{Map, json};

    const CALC: &str = "http://example.com:9001/wamp/calc";

    fn registry() -> ServiceRegistry {
        let registry = ServiceRegistry::new();
        let definition = ServiceDefinition::builder("Calc")
            .method("add", |a: i64, b: i64| -> CallResult<i64> { Ok(a + b) })
            .method("div", |a: i64, b: i64| -> CallResult<i64> {
                a.checked_div(b)
                    .ok_or_else(|| CallError::new("ArithmeticException", "/ by zero"))
            })
            .method("boom", || -> CallResult<()> { panic!("I'm a bug") })
            .build();
        registry
            .insert(ExportedService {
                url: CALC.to_string(),
                definition,
                properties: Map::new(),
            })
            .unwrap();
        registry
    }

    fn call(proc_id: &str, args: Vec<Value>) -> CallResult<Value> {
        invoke(&registry(), proc_id, proc_id, args)
    }

    #[test]
    fn successful_call() {
        let result = call(&format!("{CALC}#add"), vec![json!(1), json!(2)]);
        assert_eq!(result.unwrap(), json!(3));
    }

    #[test]
    fn malformed_proc_id() {
        let err = call(CALC, vec![]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::IllegalArgument);
        assert_eq!(err.message, format!("Malformed procId {CALC}"));
    }

    #[test]
    fn unknown_service() {
        let err = call("http://example.com/nope#add", vec![]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::IllegalArgument);
        assert_eq!(err.message, "Service object http://example.com/nope not found");
    }

    #[test]
    fn empty_method_name() {
        let err = call(&format!("{CALC}#"), vec![]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::IllegalArgument);
        assert_eq!(err.message, format!("Malformed method name in {CALC}#"));
    }

    #[test]
    fn malformed_ids_are_quoted_as_requested() {
        let err = invoke(&registry(), "http://p/x", "p:x", vec![]).unwrap_err();
        assert_eq!(err.message, "Malformed procId p:x");

        let err = invoke(&registry(), &format!("{CALC}#"), "calc:", vec![]).unwrap_err();
        assert_eq!(err.message, "Malformed method name in calc:");
    }

    #[test]
    fn unknown_method_and_arity() {
        let err = call(&format!("{CALC}#mul"), vec![]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnsupportedOperation);
        assert_eq!(err.message, "Cannot find method mul in Calc");

        let err = call(&format!("{CALC}#add"), vec![json!(1)]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnsupportedOperation);
        assert_eq!(err.message, "Argument mismatch, expecting 2, received 1 values");
    }

    #[test]
    fn callable_error_keeps_kind_and_gains_details() {
        let err = call(&format!("{CALC}#div"), vec![json!(1), json!(0)])
            .unwrap_err();
        assert_eq!(err.kind.name(), "ArithmeticException");
        assert_eq!(err.message, "/ by zero");
        assert_eq!(err.details.as_deref(), Some("error while invoking div from Calc"));
    }

    #[test]
    fn panics_become_runtime_errors() {
        let err = call(&format!("{CALC}#boom"), vec![]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Runtime);
        assert_eq!(err.message, "I'm a bug");
    }

    #[test]
    fn error_uri_uses_kind_name() {
        assert_eq!(
            error_uri("http://h/wamp/error", &ErrorKind::IllegalArgument),
            "http://h/wamp/error#IllegalArgumentException"
        );
    }
}
