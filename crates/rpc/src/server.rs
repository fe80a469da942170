// rpc/src/server.rs
use crate::{RpcError, RpcResult, RpcRequest, RpcResponse, RpcErrorResponse, RpcMethods};
use std::net::SocketAddr;
use std::sync::Arc;
use hyper::header::{HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE};
use hyper::{Body, Request, Response, Server, StatusCode, Method};
use hyper::service::{make_service_fn, service_fn};

#[derive(Debug, Clone)]
pub struct RpcConfig {
    pub listen_addr: SocketAddr,
    pub cors_origin: String,
    /// Larger request bodies are refused
    pub max_body_bytes: usize,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8645)),
            cors_origin: "*".to_string(),
            max_body_bytes: 1024 * 1024,
        }
    }
}

pub struct RpcServer {
    config: RpcConfig,
    methods: Arc<RpcMethods>,
}

impl RpcServer {
    pub fn new(config: RpcConfig, methods: RpcMethods) -> Self {
        Self {
            config,
            methods: Arc::new(methods),
        }
    }

    pub async fn start(self: Arc<Self>) -> RpcResult<()> {
        tracing::info!("Starting RPC server on {}", self.config.listen_addr);

        let value = self.clone();
        let make_svc = make_service_fn(move |_| {
            let server = value.clone();
            async move {
                Ok::<_, hyper::Error>(service_fn(move |req| {
                    let server = server.clone();
                    async move { server.handle_request(req).await }
                }))
            }
        });

        let server = Server::try_bind(&self.config.listen_addr)
            .map_err(|e| RpcError::ServerError(e.to_string()))?
            .serve(make_svc);

        tracing::info!("RPC server listening on {}", self.config.listen_addr);

        server.await
            .map_err(|e| RpcError::ServerError(e.to_string()))?;

        Ok(())
    }

    async fn handle_request(&self, req: Request<Body>) -> Result<Response<Body>, hyper::Error> {
        // Handle OPTIONS
        if req.method() == Method::OPTIONS {
            return Ok(self.respond(StatusCode::OK, Body::empty()));
        }

        // Only accept POST
        if req.method() != Method::POST {
            return Ok(self.respond(StatusCode::METHOD_NOT_ALLOWED, Body::from("Method not allowed")));
        }

        // Read body
        let body_bytes = hyper::body::to_bytes(req.into_body()).await?;
        if body_bytes.len() > self.config.max_body_bytes {
            return Ok(self.respond(StatusCode::PAYLOAD_TOO_LARGE, Body::from("Request too large")));
        }

        let response = self.handle_body(&body_bytes).await;
        Ok(self.respond(StatusCode::OK, encode(&response)))
    }

    /// Decode one JSON-RPC request and run it
    pub async fn handle_body(&self, body: &[u8]) -> RpcResponse {
        match serde_json::from_slice::<RpcRequest>(body) {
            Ok(request) => self.process_request(request).await,
            Err(_) => error_response(serde_json::Value::Null, &RpcError::ParseError),
        }
    }

    async fn process_request(&self, request: RpcRequest) -> RpcResponse {
        if request.jsonrpc != "2.0" {
            return error_response(request.id, &RpcError::InvalidRequest);
        }

        match self.methods.handle(&request.method, request.params).await {
            Ok(result) => RpcResponse {
                jsonrpc: "2.0".to_string(),
                result: Some(result),
                error: None,
                id: request.id,
            },
            Err(error) => {
                tracing::debug!("RPC {} failed: {}", request.method, error);
                error_response(request.id, &error)
            }
        }
    }

    fn respond(&self, status: StatusCode, body: Body) -> Response<Body> {
        let mut response = Response::new(body);
        *response.status_mut() = status;
        let headers = response.headers_mut();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Ok(origin) = HeaderValue::from_str(&self.config.cors_origin) {
            headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin);
        }
        headers.insert(ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static("POST, OPTIONS"));
        headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static("Content-Type"));
        response
    }
}

fn error_response(id: serde_json::Value, error: &RpcError) -> RpcResponse {
    RpcResponse {
        jsonrpc: "2.0".to_string(),
        result: None,
        error: Some(RpcErrorResponse {
            code: error.code(),
            message: error.to_string(),
            data: None,
        }),
        id,
    }
}

fn encode(response: &RpcResponse) -> Body {
    match serde_json::to_vec(response) {
        Ok(bytes) => Body::from(bytes),
        Err(e) => Body::from(format!(
            r#"{{"jsonrpc":"2.0","error":{{"code":-32603,"message":"{}"}},"id":null}}"#,
            e
        )),
    }
}
