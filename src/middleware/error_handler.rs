use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    error::{InternalError, JsonPayloadError},
    Error, HttpMessage, HttpRequest,
};
use futures_util::future::LocalBoxFuture;
use std::future::{ready, Ready};
use std::rc::Rc;

use super::request_id::RequestIdValue;
use crate::core::AppError;

/// Logs every 4xx/5xx response with its request context
///
/// Server errors are logged at error level with the underlying cause; client
/// errors at warn.
pub struct ErrorLogger;

impl<S, B> Transform<S, ServiceRequest> for ErrorLogger
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = ErrorLoggerMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(ErrorLoggerMiddleware {
            service: Rc::new(service),
        }))
    }
}

pub struct ErrorLoggerMiddleware<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for ErrorLoggerMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let method = req.method().clone();
        let path = req.path().to_string();
        let request_id = req
            .extensions()
            .get::<RequestIdValue>()
            .map(|v| v.0.clone())
            .unwrap_or_default();

        Box::pin(async move {
            let res = service.call(req).await?;
            let status = res.status();

            if status.is_server_error() {
                let cause = res
                    .response()
                    .error()
                    .map(|e| e.to_string())
                    .unwrap_or_default();
                tracing::error!(%request_id, %method, %path, status = status.as_u16(), %cause, "Request failed");
            } else if status.is_client_error() {
                let cause = res
                    .response()
                    .error()
                    .map(|e| e.to_string())
                    .unwrap_or_default();
                tracing::warn!(%request_id, %method, %path, status = status.as_u16(), %cause, "Request rejected");
            }

            Ok(res)
        })
    }
}

/// Render malformed JSON bodies in the standard error envelope
pub fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> Error {
    let app_error = AppError::validation(format!("Invalid JSON body: {}", err));
    InternalError::from_response(err, actix_web::ResponseError::error_response(&app_error)).into()
}
