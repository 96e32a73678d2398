//! Method and service descriptors registered on the RPC server.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::rpc::{BoxFuture, CallContext, CallResult, Message, Status};

/// Typed request accepted by a unary method.
///
/// `REDACTED_FIELDS` lists object keys stripped (at any depth) from the copy
/// of the request written to the access log. `validate` holds the request's
/// declared constraints, checked by the validation interceptor before the
/// handler runs.
pub trait RpcRequest: DeserializeOwned + Send + 'static {
    const REDACTED_FIELDS: &'static [&'static str] = &[];

    fn validate(&self) -> Result<(), Vec<FieldViolation>> {
        Ok(())
    }
}

/// A single constraint violation reported by [`RpcRequest::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldViolation {
    pub field: String,
    pub description: String,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            description: description.into(),
        }
    }
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.description)
    }
}

/// Type-erased unary handler operating on wire messages.
pub trait UnaryHandler: Send + Sync + 'static {
    fn call(&self, ctx: CallContext, request: Message) -> BoxFuture<CallResult>;
}

struct TypedHandler<Req, Resp, F> {
    f: F,
    _marker: PhantomData<fn(Req) -> Resp>,
}

impl<Req, Resp, F, Fut> UnaryHandler for TypedHandler<Req, Resp, F>
where
    Req: RpcRequest,
    Resp: Serialize + Send + 'static,
    F: Fn(CallContext, Req) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Resp, Status>> + Send + 'static,
{
    fn call(&self, ctx: CallContext, request: Message) -> BoxFuture<CallResult> {
        let request: Req = match serde_json::from_value(request) {
            Ok(request) => request,
            Err(e) => {
                let status = Status::invalid_argument(format!("malformed request: {e}"));
                return Box::pin(std::future::ready(Err(status)));
            }
        };
        let fut = (self.f)(ctx, request);
        Box::pin(async move {
            let response = fut.await?;
            serde_json::to_value(response)
                .map_err(|e| Status::internal(format!("failed to encode response: {e}")))
        })
    }
}

type Validator = fn(&Message) -> Result<(), Status>;

fn accept_all(_: &Message) -> Result<(), Status> {
    Ok(())
}

fn validate_as<Req: RpcRequest>(message: &Message) -> Result<(), Status> {
    let request = Req::deserialize(message)
        .map_err(|e| Status::invalid_argument(format!("malformed request: {e}")))?;
    request.validate().map_err(|violations| {
        let details = violations
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        Status::invalid_argument(format!("invalid request: {details}"))
    })
}

/// Static description of the method a call targets.
pub struct CallInfo {
    service: String,
    method: String,
    full_method: String,
    redacted_fields: &'static [&'static str],
    validator: Validator,
}

impl CallInfo {
    /// Descriptor without constraints or redactions.
    pub fn new(service: impl Into<String>, method: impl Into<String>) -> Self {
        let service = service.into();
        let method = method.into();
        Self {
            full_method: format!("/{service}/{method}"),
            service,
            method,
            redacted_fields: &[],
            validator: accept_all,
        }
    }

    fn for_request<Req: RpcRequest>(service: &str, method: &str) -> Self {
        Self {
            redacted_fields: Req::REDACTED_FIELDS,
            validator: validate_as::<Req>,
            ..Self::new(service, method)
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// `/{service}/{method}`, the request path used on the binary protocol.
    pub fn full_method(&self) -> &str {
        &self.full_method
    }

    pub fn redacted_fields(&self) -> &'static [&'static str] {
        self.redacted_fields
    }

    /// Check a request against the method's declared constraints.
    pub fn validate(&self, request: &Message) -> Result<(), Status> {
        (self.validator)(request)
    }
}

impl fmt::Debug for CallInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallInfo")
            .field("full_method", &self.full_method)
            .field("redacted_fields", &self.redacted_fields)
            .finish()
    }
}

#[derive(Clone)]
pub(crate) struct MethodEntry {
    pub(crate) info: Arc<CallInfo>,
    pub(crate) handler: Arc<dyn UnaryHandler>,
}

/// A named RPC service and its unary methods.
pub struct ServiceDescriptor {
    name: String,
    methods: BTreeMap<String, MethodEntry>,
}

impl ServiceDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: BTreeMap::new(),
        }
    }

    /// Add a unary method served by `f`.
    pub fn unary<Req, Resp, F, Fut>(mut self, method: &str, f: F) -> Self
    where
        Req: RpcRequest,
        Resp: Serialize + Send + 'static,
        F: Fn(CallContext, Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Resp, Status>> + Send + 'static,
    {
        let entry = MethodEntry {
            info: Arc::new(CallInfo::for_request::<Req>(&self.name, method)),
            handler: Arc::new(TypedHandler {
                f,
                _marker: PhantomData,
            }),
        };
        self.methods.insert(method.to_string(), entry);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn has_method(&self, method: &str) -> bool {
        self.methods.contains_key(method)
    }

    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }

    pub(crate) fn method(&self, method: &str) -> Option<&MethodEntry> {
        self.methods.get(method)
    }
}

impl fmt::Debug for ServiceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceDescriptor")
            .field("name", &self.name)
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .finish()
    }
}
