use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

pub fn build_app(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/health", get(handlers::health))
        // Modules
        .route("/modules", get(handlers::list_modules))
        .route("/modules/scan", post(handlers::scan_modules))
        .route("/modules/:id", get(handlers::get_module))
        // Assets
        .route("/assets", get(handlers::list_assets))
        .route("/assets/ingest", post(handlers::ingest_asset))
        .route("/assets/value", post(handlers::create_value_asset))
        .route("/assets/:id", get(handlers::get_asset))
        .route("/assets/:id/download", get(handlers::download_asset))
        // Tasks
        .route("/tasks", post(handlers::create_task))
        .route("/tasks/:id", get(handlers::get_task))
        .route("/tasks/:id/logs", get(handlers::get_task_logs))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use chrono::Utc;
    use modrun_assets::AssetManager;
    use modrun_domain::ModuleManifest;
    use modrun_engine::TaskOrchestrator;
    use modrun_registry::RegistryOrchestrator;
    use modrun_store::{DocumentStore, InMemoryStore, ModuleRecord};
    use serde_json::{json, Value};
    use std::path::PathBuf;
    use std::sync::Arc;
    use tower::util::ServiceExt;

    struct TestApp {
        app: Router,
        store: Arc<InMemoryStore>,
        dir: tempfile::TempDir,
    }

    fn test_app() -> TestApp {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(InMemoryStore::new());
        let assets =
            Arc::new(AssetManager::new(store.clone(), &dir.path().join("storage")).unwrap());
        let tasks = Arc::new(TaskOrchestrator::new(store.clone(), assets.clone()));
        let registry = Arc::new(RegistryOrchestrator::new(
            dir.path().join("modules"),
            store.clone(),
            "python3",
        ));
        let app = build_app(AppState { store: store.clone(), assets, tasks, registry });
        TestApp { app, store, dir }
    }

    async fn register_echo_module(store: &InMemoryStore) {
        let manifest: ModuleManifest = serde_json::from_value(json!({
            "name": "test-module-v1",
            "version": "1.0.0",
            "entry_point": "main.py",
            "inputs": [{"key": "msg", "contract_type": "VALUE", "type": "string"}],
            "outputs": [{"key": "response", "contract_type": "VALUE"}]
        }))
        .unwrap();
        let mut record =
            ModuleRecord::detected(PathBuf::from("/m/echo"), "h".into(), manifest, Utc::now());
        record.mark_available("/usr/bin/python3".into(), "/m/echo/venv".into(), Utc::now());
        store.upsert_module(&record).await.unwrap();
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(resp: axum::response::Response) -> Value {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_is_ok() {
        let t = test_app();
        let resp = t.app.oneshot(get("/health")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_records_return_404() {
        let t = test_app();
        for uri in ["/modules/ghost", "/assets/ghost", "/tasks/ghost"] {
            let resp = t.app.clone().oneshot(get(uri)).await.unwrap();
            assert_eq!(resp.status(), StatusCode::NOT_FOUND, "{uri}");
        }
    }

    #[tokio::test]
    async fn module_listing_projects_the_contract() {
        let t = test_app();
        register_echo_module(&t.store).await;

        let resp = t.app.clone().oneshot(get("/modules")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body[0]["id"], "test-module-v1");
        assert_eq!(body[0]["status"], "AVAILABLE");
        assert_eq!(body[0]["inputs"][0]["key"], "msg");

        let resp = t.app.oneshot(get("/modules/test-module-v1")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn value_asset_round_trip_with_filters() {
        let t = test_app();

        let resp = t
            .app
            .clone()
            .oneshot(post_json(
                "/assets/value",
                json!({"label": "cfg", "value": {"mode": "fast"}}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let created = body_json(resp).await;
        assert_eq!(created["status"], "AVAILABLE");
        let id = created["id"].as_str().unwrap().to_string();

        let resp = t.app.clone().oneshot(get(&format!("/assets/{}", id))).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = t.app.clone().oneshot(get("/assets?status=AVAILABLE")).await.unwrap();
        let listed = body_json(resp).await;
        assert_eq!(listed.as_array().unwrap().len(), 1);

        let resp = t.app.oneshot(get("/assets?status=PENDING")).await.unwrap();
        let listed = body_json(resp).await;
        assert!(listed.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn ingest_and_download_round_trip() {
        let t = test_app();
        let source = t.dir.path().join("report.txt");
        std::fs::write(&source, "quarterly numbers").unwrap();

        let resp = t
            .app
            .clone()
            .oneshot(post_json(
                "/assets/ingest",
                json!({
                    "source_path": source.display().to_string(),
                    "label": "report",
                    "media_type": "text/plain"
                }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let created = body_json(resp).await;
        let id = created["id"].as_str().unwrap().to_string();

        let resp = t
            .app
            .oneshot(get(&format!("/assets/{}/download", id)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()["content-type"], "text/plain");
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"quarterly numbers");
    }

    #[tokio::test]
    async fn ingest_of_missing_source_is_unprocessable() {
        let t = test_app();
        let resp = t
            .app
            .oneshot(post_json(
                "/assets/ingest",
                json!({"source_path": "/nonexistent/file.bin"}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn task_submission_validates_the_contract() {
        let t = test_app();
        register_echo_module(&t.store).await;

        // Missing input key: 422 naming the key, no task record created.
        let resp = t
            .app
            .clone()
            .oneshot(post_json(
                "/tasks",
                json!({"module_id": "test-module-v1", "input_mapping": {}}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = body_json(resp).await;
        assert!(body["error"].as_str().unwrap().contains("msg"));
        assert!(t.store.list_tasks().await.unwrap().is_empty());

        // Unknown module: also a validation rejection.
        let resp = t
            .app
            .clone()
            .oneshot(post_json("/tasks", json!({"module_id": "ghost", "input_mapping": {}})))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);

        // Valid submission queues and returns the full record.
        let resp = t
            .app
            .clone()
            .oneshot(post_json(
                "/assets/value",
                json!({"label": "msg", "value": "hello", "media_type": "text/plain"}),
            ))
            .await
            .unwrap();
        let asset = body_json(resp).await;
        let asset_id = asset["id"].as_str().unwrap();

        let resp = t
            .app
            .clone()
            .oneshot(post_json(
                "/tasks",
                json!({"module_id": "test-module-v1", "input_mapping": {"msg": asset_id}}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let task = body_json(resp).await;
        assert_eq!(task["status"], "QUEUED");
        let task_id = task["id"].as_str().unwrap().to_string();

        let resp = t
            .app
            .oneshot(get(&format!("/tasks/{}/logs", task_id)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let logs = body_json(resp).await;
        assert_eq!(logs["status"], "QUEUED");
        assert!(logs["error_log"].is_null());
    }

    #[tokio::test]
    async fn scan_of_empty_root_succeeds() {
        let t = test_app();
        std::fs::create_dir_all(t.dir.path().join("modules")).unwrap();
        let resp = t
            .app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/modules/scan")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
