//! HTTP connector tests against a wiremock server — no external services.

use std::collections::HashSet;

use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use bibharvest_connector::{
    ConfigStore, ConnectorError, CoverService, FileStore, HoldingsService, HttpConfigStore,
    HttpCoverService, HttpFileStore, HttpHoldingsService, HttpRecordService, HttpSearchIndex,
    JobStore, HttpJobStore, RecordParams, RecordService, SearchIndex,
};
use bibharvest_core::{HarvestConfig, HarvestConfigContent, JobSpecification, RecordId};

fn sample_config_json(id: i64, version: i64) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "version": version,
        "content": {
            "name": "weekly",
            "enabled": true,
            "collection": "records",
            "destination": "broend",
            "format": "katalog",
            "submitter_number": 870970,
            "schedule": "0 6 * * 1"
        }
    })
}

#[tokio::test]
async fn config_store_get_and_update() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/harvester-configs/7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(sample_config_json(7, 3)))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/harvester-configs/7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(sample_config_json(7, 4)))
        .mount(&server)
        .await;

    let store = HttpConfigStore::new(&server.uri()).unwrap();
    let config = store.get_config(7).await.unwrap();
    assert_eq!(config.id, 7);
    assert_eq!(config.version, 3);
    assert_eq!(config.content.submitter_number, 870970);

    let updated = store.update_config(&config).await.unwrap();
    assert_eq!(updated.version, 4);
}

#[tokio::test]
async fn config_store_conflict_is_typed() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/harvester-configs/7"))
        .respond_with(ResponseTemplate::new(409))
        .mount(&server)
        .await;

    let store = HttpConfigStore::new(&server.uri()).unwrap();
    let config = HarvestConfig {
        id: 7,
        version: 1,
        content: HarvestConfigContent::default(),
    };
    let err = store.update_config(&config).await.unwrap_err();
    assert!(matches!(err, ConnectorError::Conflict));
}

#[tokio::test]
async fn config_store_lists_enabled() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/harvester-configs"))
        .and(query_param("enabled", "true"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!([sample_config_json(1, 1), sample_config_json(2, 5)])),
        )
        .mount(&server)
        .await;

    let store = HttpConfigStore::new(&server.uri()).unwrap();
    let configs = store.list_enabled_configs().await.unwrap();
    assert_eq!(configs.len(), 2);
    assert_eq!(configs[1].id, 2);
}

#[tokio::test]
async fn search_index_pages_and_counts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/records/select"))
        .and(query_param("cursorMark", "*"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "response": {
                "numFound": 2,
                "docs": [{"id": "a:870970"}, {"id": "b:870970"}]
            },
            "nextCursorMark": "AoE="
        })))
        .mount(&server)
        .await;

    let index = HttpSearchIndex::new(&server.uri()).unwrap();
    let page = index.fetch_page("records", "*:*", "*", 5000).await.unwrap();
    assert_eq!(page.ids, vec!["a:870970", "b:870970"]);
    assert_eq!(page.next_cursor_mark, "AoE=");
    assert_eq!(page.num_found, 2);
}

#[tokio::test]
async fn search_index_count_uses_zero_rows() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/records/select"))
        .and(query_param("rows", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "response": {"numFound": 123, "docs": []}
        })))
        .mount(&server)
        .await;

    let index = HttpSearchIndex::new(&server.uri()).unwrap();
    assert_eq!(index.count("records", "*:*").await.unwrap(), 123);
}

#[tokio::test]
async fn search_index_server_error_surfaces_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/records/select"))
        .respond_with(ResponseTemplate::new(500).set_body_string("shard down"))
        .mount(&server)
        .await;

    let index = HttpSearchIndex::new(&server.uri()).unwrap();
    let err = index.count("records", "*:*").await.unwrap_err();
    match err {
        ConnectorError::UnexpectedStatus { status, message } => {
            assert_eq!(status, 500);
            assert!(message.contains("shard down"));
        }
        other => panic!("expected UnexpectedStatus, got {other:?}"),
    }
}

#[tokio::test]
async fn record_service_decodes_collection() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/record/191919/x1/content/collection"))
        .and(query_param("expand", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "records": [{
                "recordId": {"bibliographicRecordId": "x1", "agencyId": 870970},
                "created": "2024-03-01T10:00:00Z",
                "enrichmentTrail": "191919,870970",
                "trackingId": "t-x1",
                "content": "PHJlY29yZC8+"
            }]
        })))
        .mount(&server)
        .await;

    let service = HttpRecordService::new(&server.uri()).unwrap();
    let records = service
        .get_record_collection(
            &RecordId::new("x1", 191919),
            &RecordParams {
                expand: true,
                use_parent_agency: false,
            },
        )
        .await
        .unwrap();
    let record = &records["x1"];
    assert_eq!(record.content, b"<record/>");
    assert_eq!(record.enrichment_trail.as_deref(), Some("191919,870970"));
    assert_eq!(record.tracking_id.as_deref(), Some("t-x1"));
}

#[tokio::test]
async fn holdings_service_posts_id_set() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/holdings-by-record-ids"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "withHoldings": ["id1"]
        })))
        .mount(&server)
        .await;

    let holdings = HttpHoldingsService::new(&server.uri()).unwrap();
    let ids: HashSet<String> = ["id1".to_string(), "id2".to_string()].into();
    let with = holdings
        .get_record_holdings(&ids, &HashSet::new())
        .await
        .unwrap();
    assert_eq!(with, HashSet::from(["id1".to_string()]));
    assert!(holdings.has_any_holdings("id1", &HashSet::new()).await.unwrap());
}

#[tokio::test]
async fn cover_service_filters_bulk() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/exists"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "withCover": ["b"]
        })))
        .mount(&server)
        .await;

    let cover = HttpCoverService::new(&server.uri()).unwrap();
    let covered = cover
        .filter_has_cover(&["a".to_string(), "b".to_string()])
        .await
        .unwrap();
    assert_eq!(covered, HashSet::from(["b".to_string()]));
}

#[tokio::test]
async fn file_store_roundtrip_and_delete() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/files"))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(serde_json::json!({"fileId": "f-9"})),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/files/f-9"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"payload".to_vec()))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/files/f-9"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let files = HttpFileStore::new(&server.uri()).unwrap();
    let file_id = files.add_file(b"payload".to_vec()).await.unwrap();
    assert_eq!(file_id, "f-9");
    assert_eq!(files.get_file("f-9").await.unwrap(), b"payload");
    files.delete_file("f-9").await.unwrap();
}

#[tokio::test]
async fn job_store_creates_job_and_empty_job() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/jobs"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({"jobId": 1001})))
        .mount(&server)
        .await;

    let jobs = HttpJobStore::new(&server.uri()).unwrap();
    let spec = JobSpecification {
        destination: "broend".to_string(),
        format: "katalog".to_string(),
        submitter_number: 870970,
        harvest_config_id: 7,
    };
    assert_eq!(jobs.add_job(&spec, "f-9").await.unwrap().job_id, 1001);
    assert_eq!(jobs.add_empty_job(&spec).await.unwrap().job_id, 1001);
}
