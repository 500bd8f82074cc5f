// Copyright 2025 Radio Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Peer-facing lock service: each handler decodes the lock arguments,
//! applies them to the process-local lock table and reports the verdict.
//! Requests authenticate with the cluster bearer token.

use axum::Router;
use axum::extract::{Json, Request, State};
use axum::http::{StatusCode, header::AUTHORIZATION};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::post;

use radio_lock::lock_args::LockArgs;
use radio_lock::rpc::LockRpcResponse;
use radio_lock::{GLOBAL_LOCAL_SERVER, Result as LockResult};

#[derive(Clone)]
struct RpcState {
    token: String,
}

pub fn router(token: String) -> Router {
    let state = RpcState { token };
    Router::new()
        .route("/radio/lock/v1/lock", post(handle_lock))
        .route("/radio/lock/v1/unlock", post(handle_unlock))
        .route("/radio/lock/v1/rlock", post(handle_rlock))
        .route("/radio/lock/v1/runlock", post(handle_runlock))
        .route("/radio/lock/v1/refresh", post(handle_refresh))
        .route("/radio/lock/v1/force-unlock", post(handle_force_unlock))
        .route_layer(middleware::from_fn_with_state(state, require_bearer))
}

async fn require_bearer(State(state): State<RpcState>, req: Request, next: Next) -> Response {
    if state.token.is_empty() {
        return next.run(req).await;
    }

    let authorized = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(|value| value == format!("Bearer {}", state.token))
        .unwrap_or(false);

    if authorized {
        next.run(req).await
    } else {
        StatusCode::UNAUTHORIZED.into_response()
    }
}

fn respond(result: LockResult<bool>) -> Json<LockRpcResponse> {
    match result {
        Ok(success) => Json(LockRpcResponse::ok(success)),
        Err(err) => Json(LockRpcResponse::error(err.to_string())),
    }
}

async fn handle_lock(Json(args): Json<LockArgs>) -> Json<LockRpcResponse> {
    respond(GLOBAL_LOCAL_SERVER.write().await.lock(&args))
}

async fn handle_unlock(Json(args): Json<LockArgs>) -> Json<LockRpcResponse> {
    respond(GLOBAL_LOCAL_SERVER.write().await.unlock(&args))
}

async fn handle_rlock(Json(args): Json<LockArgs>) -> Json<LockRpcResponse> {
    respond(GLOBAL_LOCAL_SERVER.write().await.rlock(&args))
}

async fn handle_runlock(Json(args): Json<LockArgs>) -> Json<LockRpcResponse> {
    respond(GLOBAL_LOCAL_SERVER.write().await.runlock(&args))
}

async fn handle_refresh(Json(args): Json<LockArgs>) -> Json<LockRpcResponse> {
    respond(GLOBAL_LOCAL_SERVER.write().await.refresh(&args))
}

async fn handle_force_unlock(Json(args): Json<LockArgs>) -> Json<LockRpcResponse> {
    respond(GLOBAL_LOCAL_SERVER.write().await.force_unlock(&args))
}
