//! # HTTP Route Handlers
//!
//! Axum route handlers for the optimizer service.
//!
//! ## Optimization Pipeline
//!
//! `run_optimization` handles one `POST /optimize` request:
//!
//! 1. **Build**: turn the node records into a [`PlanGraph`], checking ids, references,
//!    arities and acyclicity.
//! 2. **Rewrite**: run the storage rules to a fixed point with the server's budget.
//! 3. **Render**: return the rewritten node records with an explain rendering and,
//!    on request, the applied rules.
//!
//! ## Error Handling
//!
//! - 400 Bad Request: the submitted plan is not a valid graph.
//! - 422 Unprocessable Entity: the plan is valid but the pass failed (invalid
//!   predicate, rewrite budget exhausted).

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use fluxopt_core::plan::{PlanGraph, PlanNode};
use fluxopt_core::rewrite::{RewriteConfig, Rewriter, RuleApplication};

use crate::state::AppState;

/// GET /health
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
}

/// GET /rules: list registered rules in registration order.
pub async fn list_rules(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let rules: Vec<RuleInfo> = state
        .rule_registry
        .rules()
        .map(|(rule, pattern)| RuleInfo {
            name: rule.name().to_string(),
            root_kind: pattern.kind.to_string(),
            pattern: pattern.to_string(),
        })
        .collect();

    Json(RulesResponse { rules })
}

#[derive(Serialize)]
pub struct RulesResponse {
    pub rules: Vec<RuleInfo>,
}

#[derive(Serialize)]
pub struct RuleInfo {
    pub name: String,
    pub root_kind: String,
    pub pattern: String,
}

#[derive(Debug, Deserialize)]
pub struct OptimizeRequest {
    pub nodes: Vec<PlanNode>,
    /// Overrides the server's default when present.
    #[serde(default)]
    pub trace: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct OptimizeResponse {
    pub nodes: Vec<PlanNode>,
    pub explain: String,
    pub rewrites: usize,
    pub scans: usize,
    pub trace: Vec<RuleApplication>,
}

/// POST /optimize: rewrite a JSON plan and return the optimized plan.
pub async fn optimize(
    State(state): State<Arc<AppState>>,
    Json(request): Json<OptimizeRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let response = run_optimization(&state, request)?;
    Ok(Json(response))
}

/// One optimization pass over a fresh graph; nothing is shared between requests
/// except the rule registry.
fn run_optimization(
    state: &AppState,
    request: OptimizeRequest,
) -> Result<OptimizeResponse, (StatusCode, String)> {
    let mut graph = PlanGraph::try_from_nodes(request.nodes)
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("Invalid plan: {}", e)))?;

    let config = RewriteConfig::default()
        .with_max_rewrites(state.config.max_rewrites)
        .with_trace(request.trace.unwrap_or(state.config.trace_by_default));
    let rewriter = Rewriter::new(state.rule_registry.clone(), config);

    let outcome = rewriter.optimize(&mut graph).map_err(|e| {
        tracing::warn!("Optimization failed: {}", e);
        (
            StatusCode::UNPROCESSABLE_ENTITY,
            format!("Optimization failed: {}", e),
        )
    })?;

    Ok(OptimizeResponse {
        nodes: graph.to_nodes(),
        explain: graph.explain(),
        rewrites: outcome.rewrites,
        scans: outcome.scans,
        trace: outcome.trace,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ServerConfig;
    use fluxopt_core::spec::ProcedureKind;
    use serde_json::json;

    fn state() -> AppState {
        AppState::new(ServerConfig::default())
    }

    fn request(value: serde_json::Value) -> OptimizeRequest {
        serde_json::from_value(value).unwrap()
    }

    fn from_range_filter() -> serde_json::Value {
        json!({
            "nodes": [
                { "id": 0, "spec": { "kind": "from", "bucket": "telegraf" } },
                {
                    "id": 1,
                    "spec": {
                        "kind": "range",
                        "bounds": { "start": { "relative": -3_600_000_000_000i64 }, "stop": { "relative": 0 } }
                    },
                    "predecessors": [0]
                },
                {
                    "id": 2,
                    "spec": {
                        "kind": "filter",
                        "func": {
                            "params": [{ "key": "r" }],
                            "body": {
                                "type": "expr",
                                "value": {
                                    "type": "binary",
                                    "op": "eq",
                                    "left": {
                                        "type": "member",
                                        "object": { "type": "identifier", "name": "r" },
                                        "property": "_measurement"
                                    },
                                    "right": { "type": "string", "value": "cpu" }
                                }
                            }
                        }
                    },
                    "predecessors": [1]
                }
            ],
            "trace": true
        })
    }

    #[test]
    fn test_optimize_pushes_range_and_filter() {
        let response = run_optimization(&state(), request(from_range_filter())).unwrap();

        assert_eq!(response.nodes.len(), 1);
        assert_eq!(response.nodes[0].kind(), ProcedureKind::ReadRange);
        assert_eq!(response.rewrites, 2);
        let rules: Vec<&str> = response.trace.iter().map(|a| a.rule.as_str()).collect();
        assert_eq!(rules, vec!["PushDownRangeRule", "PushDownFilterRule"]);
        assert!(response.explain.contains("r._measurement == \"cpu\""));
    }

    #[test]
    fn test_invalid_plan_is_bad_request() {
        let dangling = request(json!({
            "nodes": [{
                "id": 0,
                "spec": { "kind": "distinct", "column": "host" },
                "predecessors": [4]
            }]
        }));
        let (status, message) = run_optimization(&state(), dangling).unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(message.contains("missing predecessor 4"));
    }

    #[test]
    fn test_exhausted_budget_is_unprocessable() {
        let state = AppState::new(ServerConfig {
            max_rewrites: 1,
            ..ServerConfig::default()
        });
        let (status, _) = run_optimization(&state, request(from_range_filter())).unwrap_err();
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_invalid_predicate_is_unprocessable() {
        let mut body = from_range_filter();
        let predicate = &mut body["nodes"][2]["spec"]["func"]["body"]["value"];
        let measurement = predicate.take();
        *predicate = json!({
            "type": "logical",
            "op": "and",
            "left": measurement,
            "right": { "type": "string", "value": "oops" }
        });
        let (status, message) = run_optimization(&state(), request(body)).unwrap_err();
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(message.contains("not a boolean expression"), "{}", message);
    }

    #[test]
    fn test_trace_follows_server_default() {
        let mut body = from_range_filter();
        body["trace"] = serde_json::Value::Null;
        let response = run_optimization(&state(), request(body)).unwrap();
        assert!(response.trace.is_empty());
    }
}
