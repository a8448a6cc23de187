//! Grid strategy scenarios.

mod common;

use common::{level, MockVenue};
use opinion::application::market_maker::{MarketMakerConfig, MarketMakerEngine};
use opinion::domain::Side;
use opinion::infrastructure::client::VenueClient;
use opinion::infrastructure::OrderbookManager;
use std::sync::Arc;
use std::time::Duration;

const TOKEN: &str = "tok-yes";

fn grid_config(levels: usize) -> MarketMakerConfig {
    MarketMakerConfig {
        token_id: TOKEN.into(),
        market_id: 1,
        min_spread: 0.001,
        price_step: 0.001,
        max_position_shares: 100_000,
        check_interval_ms: 10,
        grid_enabled: true,
        grid_levels: levels,
        grid_level_spread: 0.01,
        grid_amount_per_level: 10.0,
        grid_profit_spread: 0.02,
        grid_min_profit_spread: 0.005,
        grid_auto_rebalance: true,
        ..MarketMakerConfig::default()
    }
}

fn make_engine(
    mock: &Arc<MockVenue>,
    cfg: MarketMakerConfig,
) -> (MarketMakerEngine, Arc<OrderbookManager>) {
    let client: Arc<dyn VenueClient> = mock.clone();
    let book = Arc::new(OrderbookManager::new(
        Arc::clone(&client),
        TOKEN,
        Duration::from_secs(10),
        None,
    ));
    let engine = MarketMakerEngine::new("acc-1", cfg, client, Arc::clone(&book)).unwrap();
    (engine, book)
}

#[tokio::test]
async fn test_grid_fill_places_paired_sell() {
    let mock = MockVenue::new();
    let (mut engine, book) = make_engine(&mock, grid_config(3));

    book.seed_from_snapshot(&[level("0.75", "500")], &[level("0.80", "500")]);
    engine.tick().await.unwrap();

    // Three stacked bids at 0.75 / 0.74 / 0.73, $10 each.
    let buys = mock.placed_on_side(Side::Buy);
    assert_eq!(buys.len(), 3);
    let mut prices: Vec<f64> = buys.iter().map(|o| o.price).collect();
    prices.sort_by(|a, b| b.partial_cmp(a).unwrap());
    assert!((prices[0] - 0.75).abs() < 1e-9);
    assert!((prices[1] - 0.74).abs() < 1e-9);
    assert!((prices[2] - 0.73).abs() < 1e-9);

    // The 0.74 level fills: floor(10 / 0.74) = 13 shares.
    let filled_id = mock.order_id_at(Side::Buy, 0.74).unwrap();
    mock.fill_order(&filled_id, 13);
    engine.tick().await.unwrap();

    // Paired sell at 0.74 + 0.02 with matching size.
    let sells = mock.placed_on_side(Side::Sell);
    assert_eq!(sells.len(), 1);
    assert!((sells[0].price - 0.76).abs() < 1e-9);
    assert_eq!(sells[0].shares(), Some(13));

    let state = engine.snapshot_state();
    assert_eq!(state.grid_positions.len(), 1);
    assert!((state.grid_positions[0].buy_price - 0.74).abs() < 1e-9);
    assert!(state.grid_positions[0].sell_order_id.is_some());
    assert_eq!(state.total_buy_shares, 13);

    // Top-up restored the missing level; the ladder never exceeds `levels`.
    assert_eq!(state.grid_buy_orders.len(), 3);
}

#[tokio::test]
async fn test_grid_ladder_bounded_and_unique() {
    let mock = MockVenue::new();
    let (mut engine, book) = make_engine(&mock, grid_config(3));

    book.seed_from_snapshot(&[level("0.75", "500")], &[level("0.80", "500")]);
    for _ in 0..5 {
        engine.tick().await.unwrap();
        let state = engine.snapshot_state();
        assert!(state.grid_buy_orders.len() <= 3);
        // No two rungs at the same price.
        for (i, a) in state.grid_buy_orders.iter().enumerate() {
            for b in state.grid_buy_orders.iter().skip(i + 1) {
                assert!((a.price - b.price).abs() > 1e-6);
            }
        }
    }
    // Ticks without fills add nothing beyond the initial ladder.
    assert_eq!(mock.placed_on_side(Side::Buy).len(), 3);
}

#[tokio::test]
async fn test_grid_sell_prices_respect_min_profit_spread() {
    let mock = MockVenue::new();
    let (mut engine, book) = make_engine(&mock, grid_config(2));

    book.seed_from_snapshot(&[level("0.60", "500")], &[level("0.70", "500")]);
    engine.tick().await.unwrap();

    for price in [0.60, 0.59] {
        let order_id = mock.order_id_at(Side::Buy, price).unwrap();
        let shares = mock.state.lock().orders[&order_id].original_shares;
        mock.fill_order(&order_id, shares);
    }
    engine.tick().await.unwrap();

    let state = engine.snapshot_state();
    assert_eq!(state.grid_sell_orders.len(), 2);
    for sell in &state.grid_sell_orders {
        assert!(
            sell.price - sell.buy_price >= 0.005 - 1e-9,
            "sell at {} too close to buy at {}",
            sell.price,
            sell.buy_price
        );
    }
}

#[tokio::test]
async fn test_grid_round_trip_realizes_pnl_and_rebalances() {
    let mock = MockVenue::new();
    let (mut engine, book) = make_engine(&mock, grid_config(2));

    book.seed_from_snapshot(&[level("0.75", "500")], &[level("0.80", "500")]);
    engine.tick().await.unwrap();

    // Fill the 0.74 rung; next tick pairs it at 0.76 and re-fills the rung.
    let buy_id = mock.order_id_at(Side::Buy, 0.74).unwrap();
    mock.fill_order(&buy_id, 13);
    engine.tick().await.unwrap();
    let sell_id = engine.snapshot_state().grid_positions[0]
        .sell_order_id
        .clone()
        .unwrap();

    // The paired sell fills; the re-placed 0.74 rung gets cancelled out from
    // under us; bid1 moves up to 0.76.
    mock.fill_order(&sell_id, 13);
    let replaced_id = mock.order_id_at(Side::Buy, 0.74).unwrap();
    mock.set_order_status(&replaced_id, "cancelled");
    book.seed_from_snapshot(
        &[level("0.76", "500"), level("0.75", "500")],
        &[level("0.80", "500")],
    );
    engine.tick().await.unwrap();

    let state = engine.snapshot_state();
    // Lot closed and profit realized: 13 * (0.76 - 0.74).
    assert!(state.grid_positions.is_empty());
    assert!((state.realized_pnl - 13.0 * 0.02).abs() < 1e-6);
    assert_eq!(state.total_sell_shares, 13);

    // Auto-rebalance re-bid at the new top of book.
    assert!(state
        .grid_buy_orders
        .iter()
        .any(|o| (o.price - 0.76).abs() < 1e-9));
    assert!(state.grid_buy_orders.len() <= 2);
}
