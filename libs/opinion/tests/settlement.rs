//! Merge/split service and submitter retry behavior.

mod common;

use common::{binary_market, MockVenue};
use opinion::domain::Side;
use opinion::infrastructure::client::types::OrderRequest;
use opinion::infrastructure::client::VenueClient;
use opinion::infrastructure::merge_split::MergeSplitError;
use opinion::infrastructure::{MergeSplitService, OrderSubmitter};
use opinion::VenueError;
use std::sync::Arc;
use std::time::Duration;

const YES: &str = "tok-yes";
const NO: &str = "tok-no";

fn service(mock: &Arc<MockVenue>) -> MergeSplitService {
    let client: Arc<dyn VenueClient> = mock.clone();
    MergeSplitService::new(client, "acc-1").with_backoff_base(Duration::from_millis(1))
}

#[tokio::test]
async fn test_merge_requires_matching_pair() {
    let mock = MockVenue::new();
    mock.set_market(binary_market(1, YES, NO));
    mock.set_position(YES, 50);
    mock.set_position(NO, 30);

    match service(&mock).merge(1, 40).await {
        Err(MergeSplitError::InsufficientPair { requested, yes, no }) => {
            assert_eq!((requested, yes, no), (40, 50, 30));
        }
        other => panic!("expected precondition failure, got {:?}", other.map(|r| r.tx_hash)),
    }
    assert!(mock.state.lock().merge_calls.is_empty());
}

#[tokio::test]
async fn test_merge_retries_transient_network_errors() {
    let mock = MockVenue::new();
    mock.set_market(binary_market(1, YES, NO));
    mock.set_position(YES, 50);
    mock.set_position(NO, 50);
    mock.state.lock().settlement_failures = vec![
        VenueError::Network("gateway 502".into()),
        VenueError::Network("gateway 503".into()),
    ];

    let result = service(&mock).merge(1, 20).await.unwrap();
    assert_eq!(result.tx_hash, "0xmerge1");
    assert_eq!(mock.state.lock().merge_calls, vec![(1, 20)]);
}

#[tokio::test]
async fn test_merge_gives_up_after_retry_budget() {
    let mock = MockVenue::new();
    mock.set_market(binary_market(1, YES, NO));
    mock.set_position(YES, 50);
    mock.set_position(NO, 50);
    mock.state.lock().settlement_failures = vec![
        VenueError::Network("1".into()),
        VenueError::Network("2".into()),
        VenueError::Network("3".into()),
    ];

    assert!(matches!(
        service(&mock).merge(1, 20).await,
        Err(MergeSplitError::Venue(VenueError::Network(_)))
    ));
}

#[tokio::test]
async fn test_delayed_success_counts_as_success() {
    let mock = MockVenue::new();
    mock.set_market(binary_market(1, YES, NO));
    mock.set_position(YES, 50);
    mock.set_position(NO, 50);
    mock.state.lock().settlement_failures = vec![VenueError::DelayedSuccess {
        hash: "0xabc".into(),
    }];

    let result = service(&mock).merge(1, 10).await.unwrap();
    assert_eq!(result.tx_hash, "0xabc");
}

#[tokio::test]
async fn test_merge_then_split_round_trips_share_counts() {
    let mock = MockVenue::new();
    mock.set_market(binary_market(1, YES, NO));
    mock.set_position(YES, 50);
    mock.set_position(NO, 50);

    let svc = service(&mock);
    svc.merge(1, 20).await.unwrap();
    {
        let state = mock.state.lock();
        assert_eq!(state.positions[YES], 30);
        assert_eq!(state.positions[NO], 30);
    }
    svc.split(1, 20).await.unwrap();
    let state = mock.state.lock();
    assert_eq!(state.positions[YES], 50);
    assert_eq!(state.positions[NO], 50);
}

#[tokio::test]
async fn test_submitter_retries_only_network_errors() {
    let mock = MockVenue::new();
    mock.state.lock().place_failures = vec![
        VenueError::Network("reset".into()),
        VenueError::Network("timeout".into()),
    ];
    let client: Arc<dyn VenueClient> = mock.clone();
    let submitter =
        OrderSubmitter::new(client, "acc-1").with_backoff_base(Duration::from_millis(1));

    let outcome = submitter
        .submit(&OrderRequest::limit_buy(YES, 0.50, 10))
        .await
        .unwrap();
    assert!(outcome.order_id.is_some());
    assert_eq!(mock.placed_on_side(Side::Buy).len(), 1);
}

#[tokio::test]
async fn test_submitter_does_not_retry_rejections() {
    let mock = MockVenue::new();
    mock.state.lock().place_failures = vec![VenueError::SizeBelowMin { required: Some(1.0) }];
    let client: Arc<dyn VenueClient> = mock.clone();
    let submitter =
        OrderSubmitter::new(client, "acc-1").with_backoff_base(Duration::from_millis(1));

    assert!(matches!(
        submitter.submit(&OrderRequest::limit_buy(YES, 0.50, 10)).await,
        Err(VenueError::SizeBelowMin { .. })
    ));
    assert!(mock.placed().is_empty());
}

#[tokio::test]
async fn test_submitter_normalizes_delayed_success() {
    let mock = MockVenue::new();
    mock.state.lock().place_failures = vec![VenueError::DelayedSuccess {
        hash: "0xfeed".into(),
    }];
    let client: Arc<dyn VenueClient> = mock.clone();
    let submitter = OrderSubmitter::new(client, "acc-1");

    let outcome = submitter
        .submit(&OrderRequest::limit_sell(YES, 0.60, 5))
        .await
        .unwrap();
    assert_eq!(outcome.order_id, None);
    assert_eq!(outcome.tx_hash.as_deref(), Some("0xfeed"));
}
