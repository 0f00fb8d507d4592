//! Picks the call adapter for a declared return type.

use callbridge_types::{BoundIndexError, TypeDescriptor, names};
use thiserror::Error;

use crate::adapter::{BodyCallAdapter, CallAdapter, ResponseCallAdapter};

/// A declared return type the adapter layer claims but cannot serve.
///
/// These are mistakes in the call-site signature and are reported when the call-site is
/// set up, never deferred to call time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("CallFuture return type must be parameterized as CallFuture<Foo> or CallFuture<out Foo> (got {0})")]
    UnparameterizedFuture(TypeDescriptor),
    #[error("Response must be parameterized as Response<Foo> or Response<out Foo> (got {0})")]
    UnparameterizedResponse(TypeDescriptor),
    #[error("malformed type arguments in {ty}: {source}")]
    InvalidBound {
        ty: TypeDescriptor,
        source: BoundIndexError,
    },
}

/// Stateless dispatcher from declared return types to [`CallAdapter`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct CallAdapterFactory;

impl CallAdapterFactory {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Select the adapter for `return_type`.
    ///
    /// - `Ok(None)`: the outer type is not `CallFuture`; some other mechanism handles it.
    /// - `CallFuture<Response<Foo>>` selects [`CallAdapter::Response`] bound to `Foo`.
    /// - `CallFuture<Foo>` selects [`CallAdapter::Body`] bound to `Foo`.
    pub fn get(&self, return_type: &TypeDescriptor) -> Result<Option<CallAdapter>, DispatchError> {
        if return_type.raw_type() != names::CALL_FUTURE {
            return Ok(None);
        }
        if !return_type.is_parameterized() {
            return Err(DispatchError::UnparameterizedFuture(return_type.clone()));
        }

        let response_type = upper_bound(return_type)?;
        let adapter = if response_type.raw_type() == names::RESPONSE {
            if !response_type.is_parameterized() {
                return Err(DispatchError::UnparameterizedResponse(response_type.clone()));
            }
            let body_type = upper_bound(response_type)?;
            CallAdapter::Response(ResponseCallAdapter::new(body_type.clone()))
        } else {
            CallAdapter::Body(BodyCallAdapter::new(response_type.clone()))
        };

        tracing::debug!(
            %return_type,
            response_type = %adapter.response_type(),
            envelope = matches!(adapter, CallAdapter::Response(_)),
            "Selected call adapter"
        );
        Ok(Some(adapter))
    }
}

fn upper_bound(ty: &TypeDescriptor) -> Result<&TypeDescriptor, DispatchError> {
    ty.upper_bound(0).map_err(|source| DispatchError::InvalidBound {
        ty: ty.clone(),
        source,
    })
}
