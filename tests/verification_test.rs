//! Local-feature search tests: composite keys, matching, and the
//! geometric filters.

mod helpers;

use serde_json::{Value, json};

use helpers::{StubFetcher, StubLocalProvider, grid_descriptors, local_service};
use idios::domain::errors::CommandError;
use idios::domain::models::{KeypointTag, composite_key};
use idios::domain::ports::embedding::LocalDescriptor;
use idios::domain::ports::{QueryExpr, VectorCollection, VectorRecord};
use idios::infrastructure::milvus::InMemoryCollection;
use idios::services::commands::{DISTANCE_NOT_IMPLEMENTED, ListOutput};

const URL_A: &str = "http://example.com/a.jpg";
const URL_B: &str = "http://example.com/b.jpg";

fn provider_with(descriptors: Vec<LocalDescriptor>) -> StubLocalProvider {
    StubLocalProvider {
        dimension: 128,
        cardinality: 100,
        descriptors,
    }
}

/// Eight well-spread keypoints; more than the four-match minimum so the
/// inlier ratio has room to move.
fn wide_grid(dimension: usize) -> Vec<LocalDescriptor> {
    let positions = [
        [0.0, 0.0],
        [100.0, 0.0],
        [100.0, 100.0],
        [0.0, 100.0],
        [50.0, 25.0],
        [25.0, 75.0],
        [75.0, 60.0],
        [40.0, 50.0],
    ];
    positions
        .iter()
        .enumerate()
        .map(|(i, [x, y])| {
            let mut vector = vec![0.0f32; dimension];
            vector[i] = 1.0;
            LocalDescriptor {
                vector,
                tag: KeypointTag::new(*x, *y, 90.0),
            }
        })
        .collect()
}

/// Writes candidate rows straight into the collection so the indexed
/// geometry can differ from what the provider extracts.
async fn insert_candidate_rows(
    collection: &InMemoryCollection,
    url: &str,
    descriptors: &[LocalDescriptor],
) {
    let rows: Vec<VectorRecord> = descriptors
        .iter()
        .map(|descriptor| VectorRecord {
            url: composite_key(url, &descriptor.tag),
            embedding: descriptor.vector.clone(),
            metadata: "null".to_string(),
        })
        .collect();
    collection.insert(rows).await.unwrap();
}

fn with_positions(
    descriptors: &[LocalDescriptor],
    transform: impl Fn(f64, f64) -> (f64, f64),
) -> Vec<LocalDescriptor> {
    descriptors
        .iter()
        .map(|descriptor| {
            let (x, y) = transform(descriptor.tag.x, descriptor.tag.y);
            LocalDescriptor {
                vector: descriptor.vector.clone(),
                tag: KeypointTag::new(x, y, descriptor.tag.angle),
            }
        })
        .collect()
}

#[tokio::test]
async fn test_insert_expands_to_composite_keys() {
    let descriptors = grid_descriptors(128);
    let expected = descriptors.len();
    let (service, collection) = local_service(provider_with(descriptors), StubFetcher::new());

    service
        .insert_images(
            "sift100",
            vec![URL_A.to_string()],
            vec![json!({"tags": ["etching"]})],
            None,
            true,
        )
        .await
        .unwrap();

    let rows = collection
        .query(QueryExpr::UrlPrefix(format!("{URL_A}#")), &["metadata"], 1000)
        .await
        .unwrap();
    assert_eq!(rows.len(), expected);
    for row in &rows {
        assert!(row.url.starts_with(&format!("{URL_A}#")));
        // The metadata is duplicated across the image's descriptors.
        assert_eq!(row.metadata.as_deref(), Some("{\"tags\":[\"etching\"]}"));
    }
}

#[tokio::test]
async fn test_self_query_scores_100() {
    let (service, _) = local_service(provider_with(grid_descriptors(128)), StubFetcher::new());

    service
        .insert_images(
            "sift100",
            vec![URL_A.to_string()],
            vec![json!({"id": 1})],
            None,
            true,
        )
        .await
        .unwrap();

    let hits = service.search_by_url("sift100", URL_A, 10).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].url, URL_A);
    assert_eq!(hits[0].metadata, json!({"id": 1}));
    assert!((hits[0].similarity - 100.0).abs() < 1e-6);
}

#[tokio::test]
async fn test_unindexed_query_extracts_fresh_descriptors() {
    let (service, collection) =
        local_service(provider_with(grid_descriptors(128)), StubFetcher::new());

    service
        .insert_images("sift100", vec![URL_A.to_string()], vec![Value::Null], None, true)
        .await
        .unwrap();

    let rows = collection
        .query(QueryExpr::UrlPrefix(format!("{URL_B}#")), &[], 10)
        .await
        .unwrap();
    assert!(rows.is_empty());

    // URL_B is not indexed, so its descriptors are extracted fresh; they
    // coincide with A's rows and A comes back at 100.
    let hits = service.search_by_url("sift100", URL_B, 10).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].url, URL_A);
    assert!((hits[0].similarity - 100.0).abs() < 1e-6);
}

#[tokio::test]
async fn test_candidate_below_min_matches_is_dropped() {
    // Three descriptors can never reach the four-correspondence minimum.
    let few = grid_descriptors(128).into_iter().take(3).collect::<Vec<_>>();
    let (service, _) = local_service(provider_with(few), StubFetcher::new());

    service
        .insert_images("sift100", vec![URL_A.to_string()], vec![Value::Null], None, true)
        .await
        .unwrap();

    let hits = service.search_by_url("sift100", URL_A, 10).await.unwrap();
    assert!(hits.is_empty());
}

#[tokio::test]
async fn test_translated_candidate_passes() {
    let query = wide_grid(128);
    let (service, collection) = local_service(provider_with(query.clone()), StubFetcher::new());

    // The indexed copy of the image is shifted by (12, -7): a pure
    // translation, so every correspondence inlies and the filters pass.
    let shifted = with_positions(&query, |x, y| (x + 12.0, y - 7.0));
    insert_candidate_rows(&collection, URL_A, &shifted).await;

    let hits = service.search_by_url("sift100", URL_B, 10).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].url, URL_A);
    assert!((hits[0].similarity - 100.0).abs() < 1e-6);
}

#[tokio::test]
async fn test_sheared_candidate_fails_condition_filter() {
    let query = wide_grid(128);
    let (service, collection) = local_service(provider_with(query.clone()), StubFetcher::new());

    // Squashing x by 3 keeps an exact homography but pushes the top-left
    // block's condition number to 3, outside the near-rigid band.
    let squashed = with_positions(&query, |x, y| (x / 3.0, y));
    insert_candidate_rows(&collection, URL_A, &squashed).await;

    let hits = service.search_by_url("sift100", URL_B, 10).await.unwrap();
    assert!(hits.is_empty());
}

#[tokio::test]
async fn test_partial_outliers_lower_the_score() {
    let query = wide_grid(128);
    let (service, collection) = local_service(provider_with(query.clone()), StubFetcher::new());

    // Six of eight correspondences follow a translation; the last two are
    // scattered. Inlier ratio 6/8 passes the 0.5 bar and scores 75.
    let mut candidate = with_positions(&query, |x, y| (x + 10.0, y + 10.0));
    candidate[6].tag = KeypointTag::new(800.0, 30.0, 90.0);
    candidate[7].tag = KeypointTag::new(12.0, 700.0, 90.0);
    insert_candidate_rows(&collection, URL_A, &candidate).await;

    let hits = service.search_by_url("sift100", URL_B, 10).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].url, URL_A);
    assert!((hits[0].similarity - 75.0).abs() < 1e-6);
}

#[tokio::test]
async fn test_wildcard_urls_are_rejected() {
    let (service, _) = local_service(provider_with(grid_descriptors(128)), StubFetcher::new());

    let wildcard = "http://example.com/a%21b.jpg";
    let err = service
        .insert_images("sift100", vec![wildcard.to_string()], vec![Value::Null], None, true)
        .await
        .unwrap_err();
    assert!(err.is_parameter());

    let err = service.search_by_url("sift100", wildcard, 10).await.unwrap_err();
    assert!(err.is_parameter());

    let err = service
        .remove_images("sift100", vec![wildcard.to_string()])
        .await
        .unwrap_err();
    assert!(err.is_parameter());
}

#[tokio::test]
async fn test_remove_resolves_composite_keys() {
    let (service, collection) =
        local_service(provider_with(grid_descriptors(128)), StubFetcher::new());

    service
        .insert_images("sift100", vec![URL_A.to_string()], vec![Value::Null], None, true)
        .await
        .unwrap();
    service
        .remove_images("sift100", vec![URL_A.to_string()])
        .await
        .unwrap();

    let rows = collection
        .query(QueryExpr::UrlPrefix(format!("{URL_A}#")), &[], 1000)
        .await
        .unwrap();
    assert!(rows.is_empty());
}

#[tokio::test]
async fn test_list_images_dedupes_composite_keys() {
    let (service, _) = local_service(provider_with(grid_descriptors(128)), StubFetcher::new());

    service
        .insert_images(
            "sift100",
            vec![URL_A.to_string(), URL_B.to_string()],
            vec![Value::Null, Value::Null],
            None,
            true,
        )
        .await
        .unwrap();

    let listed = service.list_images("sift100", None, None, None).await.unwrap();
    assert_eq!(
        listed,
        ListOutput::Urls(vec![URL_A.to_string(), URL_B.to_string()])
    );

    assert_eq!(service.count("sift100").await.unwrap(), 2);
}

#[tokio::test]
async fn test_compare_unimplemented_for_local_features() {
    let (service, _) = local_service(provider_with(grid_descriptors(128)), StubFetcher::new());

    let err = service.compare("sift100", URL_A, URL_B).await.unwrap_err();
    assert_eq!(err, CommandError::server(DISTANCE_NOT_IMPLEMENTED));
}
