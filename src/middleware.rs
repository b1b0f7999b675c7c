use crate::gateway::{self, Decision, Target};
use crate::session::SessionCodec;
use actix_web::body::EitherBody;
use actix_web::dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::http::{header, StatusCode};
use actix_web::{Error, HttpMessage, HttpResponse};
use log::{debug, info, log, Level};
use std::future::{ready, Future, Ready};
use std::pin::Pin;
use std::rc::Rc;

/// Log level and color for a finished response. Redirects log at info.
pub fn response_level(status: StatusCode) -> (Level, &'static str) {
    if status.is_success() || status.is_redirection() {
        (Level::Info, "\x1B[1;32m")
    } else if status.is_client_error() {
        (Level::Warn, "\x1B[1;33m")
    } else {
        (Level::Error, "\x1B[1;31m")
    }
}

/// Logs each request line and the status and latency of its response.
pub struct RequestLogger;

impl<S, B> Transform<S, ServiceRequest> for RequestLogger
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = RequestLoggerMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RequestLoggerMiddleware {
            service: Rc::new(service),
        }))
    }
}

pub struct RequestLoggerMiddleware<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for RequestLoggerMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + 'static>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let method = req.method().clone();
        let path = req.path().to_owned();
        let client_ip = req.connection_info().realip_remote_addr()
            .map(|s| s.to_owned())
            .unwrap_or_else(|| String::from("unknown"));

        info!(
            "→ Request: \x1B[1;34m{} {}\x1B[0m from IP: {}",
            method, path, client_ip
        );

        let service = self.service.clone();

        Box::pin(async move {
            let start = std::time::Instant::now();
            let res = service.call(req).await?;
            let elapsed = start.elapsed();

            let status = res.status();
            let (level, color) = response_level(status);
            log!(
                level,
                "← Response: {}{}\x1B[0m for {} {} completed in {:.2?}",
                color, status, method, path, elapsed
            );

            Ok(res)
        })
    }
}

/// Runs the access gateway before any route handler. Allowed requests carry
/// the decoded [`crate::session::SessionState`] in their extensions.
pub struct AccessGateway {
    codec: SessionCodec,
}

impl AccessGateway {
    pub fn new(codec: SessionCodec) -> Self {
        Self { codec }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AccessGateway
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = AccessGatewayMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AccessGatewayMiddleware {
            service: Rc::new(service),
            codec: self.codec.clone(),
        }))
    }
}

pub struct AccessGatewayMiddleware<S> {
    service: Rc<S>,
    codec: SessionCodec,
}

impl<S, B> Service<ServiceRequest> for AccessGatewayMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + 'static>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let session = self.codec.read(req.request());
        let decision = gateway::evaluate(&Target::new(req.path(), req.query_string()), &session);

        match decision {
            Decision::Allow => {
                req.extensions_mut().insert(session);
                let fut = self.service.call(req);
                Box::pin(async move { fut.await.map(ServiceResponse::map_into_left_body) })
            },
            Decision::Redirect(location) => {
                debug!(
                    "Gateway redirect: {} {} ({:?}) -> {}",
                    req.method(),
                    req.path(),
                    session.role(),
                    location
                );
                let response = HttpResponse::Found()
                    .insert_header((header::LOCATION, location))
                    .finish()
                    .map_into_right_body();
                let (request, _payload) = req.into_parts();
                Box::pin(async move { Ok(ServiceResponse::new(request, response)) })
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_redirects_log_as_info() {
        assert_eq!(response_level(StatusCode::OK).0, Level::Info);
        assert_eq!(response_level(StatusCode::FOUND).0, Level::Info);
        assert_eq!(response_level(StatusCode::UNAUTHORIZED).0, Level::Warn);
        assert_eq!(response_level(StatusCode::SERVICE_UNAVAILABLE).0, Level::Error);
    }
}
