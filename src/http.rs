//! HTTP API for matching
//!
//! Thin JSON adapter over [`Services`]:
//!
//! ## Tags
//! - `GET /tags` - List tags
//! - `PUT /tags` - Bulk import (replaces similarities, upserts tags)
//! - `PUT /tags/{id}` - Rename a tag
//!
//! ## Profiles and capacity
//! - `GET|PUT /priorities/{userId}` - Read or replace priorities
//! - `GET|PUT /supervisors/{id}/capacity` - Read or set total spots
//!
//! ## Matching
//! - `GET /recommendations/{studentId}?availableOnly=&excludeDecided=`
//! - `GET /requests?studentId=&supervisorId=&state=`
//! - `POST /requests` - Student request `{studentId, supervisorId}`
//! - `POST /invites` - Supervisor invite `{supervisorId, studentId}`
//! - `GET /requests/{id}`
//! - `POST /requests/{id}/accept|reject|withdraw`
//!
//! ## Example Usage
//!
//! ```bash
//! curl -X PUT http://localhost:8095/supervisors/sup-1/capacity -d '{"total_spots": 2}'
//! curl -X POST http://localhost:8095/requests -d '{"studentId": "stu-1", "supervisorId": "sup-1"}'
//! curl http://localhost:8095/recommendations/stu-1?availableOnly=true
//! ```

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request};
use hyper_util::rt::TokioIo;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::error::MatchError;
use crate::model::{PriorityEntry, RequestQuery, RequestState, TagId, TagImport};
use crate::services::response::{
    bad_request, error_response, from_create_result, from_result, method_not_allowed,
    not_found, ok, JsonResponse,
};
use crate::services::{CreateRequestInput, PriorityUpdate, RankOverrides, Services};
use crate::store::MatchStore;

#[derive(Debug, Deserialize)]
struct RenameBody {
    name: String,
}

#[derive(Debug, Deserialize)]
struct PrioritiesBody {
    tags: Vec<PriorityEntry>,
}

#[derive(Debug, Deserialize)]
struct CapacityBody {
    total_spots: u32,
}

fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, MatchError> {
    Ok(serde_json::from_slice(body)?)
}

fn query_params(query: Option<&str>) -> HashMap<String, String> {
    query
        .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
        .unwrap_or_default()
}

fn parse_flag(params: &HashMap<String, String>, name: &str) -> Result<Option<bool>, MatchError> {
    match params.get(name).map(String::as_str) {
        None | Some("") => Ok(None),
        Some("true") | Some("1") => Ok(Some(true)),
        Some("false") | Some("0") => Ok(Some(false)),
        Some(other) => Err(MatchError::Validation(format!(
            "{} must be true or false, got '{}'",
            name, other
        ))),
    }
}

fn request_query(params: &HashMap<String, String>) -> Result<RequestQuery, MatchError> {
    Ok(RequestQuery {
        student_id: params.get("studentId").cloned(),
        supervisor_id: params.get("supervisorId").cloned(),
        state: params
            .get("state")
            .map(|s| s.parse::<RequestState>())
            .transpose()?,
    })
}

/// HTTP server state
pub struct HttpServer<S> {
    services: Arc<Services<S>>,
    bind_addr: SocketAddr,
}

impl<S: MatchStore + 'static> HttpServer<S> {
    pub fn new(services: Arc<Services<S>>, bind_addr: SocketAddr) -> Self {
        Self { services, bind_addr }
    }

    /// Run the HTTP server
    pub async fn run(self: Arc<Self>) -> Result<(), MatchError> {
        let listener = TcpListener::bind(self.bind_addr).await?;
        info!(addr = %self.bind_addr, "HTTP server listening");

        loop {
            let (stream, remote_addr) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let server = self.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let server = server.clone();
                    async move { server.handle_request(req).await }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    warn!(addr = %remote_addr, error = %err, "Connection error");
                }
            });
        }
    }

    async fn handle_request(&self, req: Request<Incoming>) -> Result<JsonResponse, hyper::Error> {
        let method = req.method().clone();
        let path = req.uri().path().to_string();
        let query = req.uri().query().map(str::to_string);

        debug!(method = %method, path = %path, "Incoming request");

        let body = match req.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                warn!(error = %e, "Failed to read body");
                return Ok(bad_request("Failed to read body"));
            }
        };

        Ok(self.route(&method, &path, query.as_deref(), body))
    }

    /// Dispatch one request to the matching service call
    pub fn route(&self, method: &Method, path: &str, query: Option<&str>, body: Bytes) -> JsonResponse {
        let segments: Vec<&str> = path.trim_matches('/').split('/').filter(|s| !s.is_empty()).collect();
        let services = &self.services;

        match (method, segments.as_slice()) {
            // Health check
            (&Method::GET, ["health"]) => match services.tags.stats() {
                Ok(stats) => ok(&serde_json::json!({
                    "status": "ok",
                    "tags": stats.tag_count,
                    "similarities": stats.similarity_count,
                })),
                Err(e) => error_response(e),
            },

            // Tags
            (&Method::GET, ["tags"]) => from_result(services.tags.tags()),
            (&Method::PUT, ["tags"]) => from_result(
                parse_body::<TagImport>(&body).and_then(|import| services.tags.bulk_replace(&import)),
            ),
            (&Method::PUT, ["tags", id]) => from_result(
                id.parse::<TagId>()
                    .map_err(|_| MatchError::Validation(format!("invalid tag id '{}'", id)))
                    .and_then(|id| {
                        let body: RenameBody = parse_body(&body)?;
                        services.tags.rename(id, &body.name)
                    }),
            ),

            // Priorities
            (&Method::GET, ["priorities", user_id]) => match services.profiles.profile(user_id) {
                Ok(profile) => ok(&serde_json::json!({
                    "userId": profile.user_id,
                    "tags": profile.entries(),
                })),
                Err(e) => error_response(e),
            },
            (&Method::PUT, ["priorities", user_id]) => {
                let result = parse_body::<PrioritiesBody>(&body).and_then(|body| {
                    services.profiles.update(&PriorityUpdate {
                        user_id: user_id.to_string(),
                        tags: body.tags,
                    })
                });
                match result {
                    Ok(profile) => ok(&serde_json::json!({
                        "userId": profile.user_id,
                        "tags": profile.entries(),
                    })),
                    Err(e) => error_response(e),
                }
            }

            // Capacity
            (&Method::GET, ["supervisors", id, "capacity"]) => from_result(services.ledger.capacity(id)),
            (&Method::PUT, ["supervisors", id, "capacity"]) => from_result(
                parse_body::<CapacityBody>(&body).and_then(|b| services.ledger.set_total_spots(id, b.total_spots)),
            ),

            // Recommendations
            (&Method::GET, ["recommendations", student_id]) => {
                let params = query_params(query);
                let result = parse_flag(&params, "availableOnly").and_then(|available_only| {
                    let overrides = RankOverrides {
                        available_only,
                        exclude_decided: parse_flag(&params, "excludeDecided")?,
                    };
                    services.recommendations.recommend(student_id, overrides)
                });
                from_result(result)
            }

            // Requests
            (&Method::GET, ["requests"]) => {
                let params = query_params(query);
                from_result(request_query(&params).and_then(|q| services.requests.list(&q)))
            }
            (&Method::POST, ["requests"]) => from_create_result(
                parse_body::<CreateRequestInput>(&body)
                    .and_then(|input| services.requests.create(&input.student_id, &input.supervisor_id)),
            ),
            (&Method::POST, ["invites"]) => from_create_result(
                parse_body::<CreateRequestInput>(&body)
                    .and_then(|input| services.requests.invite(&input.supervisor_id, &input.student_id)),
            ),
            (&Method::GET, ["requests", id]) => from_result(services.requests.get(id)),
            (&Method::POST, ["requests", id, "accept"]) => from_result(services.requests.accept(id)),
            (&Method::POST, ["requests", id, "reject"]) => from_result(services.requests.reject(id)),
            (&Method::POST, ["requests", id, "withdraw"]) => from_result(services.requests.withdraw(id)),

            (_, ["health"] | ["tags", ..] | ["priorities", _] | ["supervisors", _, "capacity"])
            | (_, ["recommendations", _] | ["requests", ..] | ["invites"]) => method_not_allowed(),

            _ => not_found("Not Found"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ranking::RankOptions;
    use crate::services::LifecyclePolicy;
    use crate::store::MemoryStore;
    use hyper::StatusCode;

    fn server() -> HttpServer<MemoryStore> {
        let services = Services::new(
            Arc::new(MemoryStore::new()),
            RankOptions::default(),
            LifecyclePolicy::default(),
        )
        .unwrap();
        HttpServer::new(Arc::new(services), "127.0.0.1:0".parse().unwrap())
    }

    async fn json(resp: JsonResponse) -> serde_json::Value {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn call(server: &HttpServer<MemoryStore>, method: Method, path: &str, body: &str) -> JsonResponse {
        let (path, query) = match path.split_once('?') {
            Some((p, q)) => (p, Some(q)),
            None => (path, None),
        };
        server.route(&method, path, query, Bytes::from(body.to_string()))
    }

    #[tokio::test]
    async fn test_request_flow() {
        let server = server();

        let resp = call(&server, Method::PUT, "/supervisors/sup/capacity", r#"{"total_spots": 1}"#);
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = call(&server, Method::POST, "/requests", r#"{"studentId": "stu", "supervisorId": "sup"}"#);
        assert_eq!(resp.status(), StatusCode::CREATED);
        let request = json(resp).await;
        assert_eq!(request["state"], "PENDING");
        let id = request["id"].as_str().unwrap().to_string();

        let dup = call(&server, Method::POST, "/requests", r#"{"studentId": "stu", "supervisorId": "sup"}"#);
        assert_eq!(dup.status(), StatusCode::CONFLICT);

        let resp = call(&server, Method::POST, &format!("/requests/{}/accept", id), "");
        assert_eq!(resp.status(), StatusCode::OK);
        let outcome = json(resp).await;
        assert_eq!(outcome["capacity"]["available_spots"], 0);

        let resp = call(&server, Method::POST, &format!("/requests/{}/reject", id), "");
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        assert_eq!(json(resp).await["kind"], "invalid_state_transition");

        let resp = call(&server, Method::GET, "/requests?studentId=stu&state=accepted", "");
        assert_eq!(json(resp).await.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_recommendations_query_flags() {
        let server = server();
        call(&server, Method::PUT, "/supervisors/full/capacity", r#"{"total_spots": 0}"#);
        call(&server, Method::PUT, "/supervisors/open/capacity", r#"{"total_spots": 1}"#);

        let all = json(call(&server, Method::GET, "/recommendations/stu", "")).await;
        assert_eq!(all.as_array().unwrap().len(), 2);

        let open = json(call(&server, Method::GET, "/recommendations/stu?availableOnly=true", "")).await;
        assert_eq!(open[0]["supervisorId"], "open");
        assert_eq!(open.as_array().unwrap().len(), 1);

        let bad = call(&server, Method::GET, "/recommendations/stu?availableOnly=maybe", "");
        assert_eq!(bad.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_tags_and_priorities() {
        let server = server();
        let import = r#"{"tags": ["AI", "ML"], "similarities": [{"field1": "AI", "field2": "ML", "similarity_score": 0.8}]}"#;
        let resp = call(&server, Method::PUT, "/tags", import);
        assert_eq!(json(resp).await["similarity_count"], 1);

        let tags = json(call(&server, Method::GET, "/tags", "")).await;
        let ai = tags[0]["id"].as_i64().unwrap();

        let body = format!(r#"{{"tags": [{{"tag_id": {}, "priority": 1}}]}}"#, ai);
        let resp = call(&server, Method::PUT, "/priorities/stu", &body);
        assert_eq!(resp.status(), StatusCode::OK);

        let profile = json(call(&server, Method::GET, "/priorities/stu", "")).await;
        assert_eq!(profile["tags"][0]["tag_id"], ai);

        let bad = call(&server, Method::PUT, "/tags", "not json");
        assert_eq!(bad.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_unknown_routes() {
        let server = server();
        assert_eq!(call(&server, Method::GET, "/nope", "").status(), StatusCode::NOT_FOUND);
        assert_eq!(
            call(&server, Method::DELETE, "/tags", "").status(),
            StatusCode::METHOD_NOT_ALLOWED
        );
        assert_eq!(
            call(&server, Method::GET, "/requests/missing", "").status(),
            StatusCode::NOT_FOUND
        );
    }
}
