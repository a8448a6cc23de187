//! End-to-end engine scenarios against a scripted venue.

mod common;

use common::{level, MockVenue};
use opinion::application::market_maker::{DropAction, MarketMakerConfig, MarketMakerEngine};
use opinion::domain::Side;
use opinion::infrastructure::client::types::{OrderQuantity, OrderType};
use opinion::infrastructure::client::VenueClient;
use opinion::infrastructure::OrderbookManager;
use std::sync::Arc;
use std::time::Duration;

const TOKEN: &str = "tok-yes";

fn base_config() -> MarketMakerConfig {
    MarketMakerConfig {
        token_id: TOKEN.into(),
        market_id: 1,
        min_spread: 0.01,
        price_step: 0.01,
        order_amount_min: 20.0,
        order_amount_max: 20.0,
        max_position_shares: 100_000,
        check_interval_ms: 10,
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
async fn test_outbid_requote() {
    let mock = MockVenue::new();
    let (mut engine, book) = make_engine(&mock, base_config());

    // First tick: quote one step over bid1, capped by ask1 - min_spread.
    book.seed_from_snapshot(&[level("0.49", "100")], &[level("0.55", "100")]);
    engine.tick().await.unwrap();
    let placed = mock.placed_on_side(Side::Buy);
    assert_eq!(placed.len(), 1);
    assert!((placed[0].price - 0.50).abs() < 1e-9);
    let first_id = engine.snapshot_state().buy_order_id.clone().unwrap();

    // Someone outbids us at 0.51: cancel and re-quote at 0.52.
    book.seed_from_snapshot(
        &[level("0.51", "50"), level("0.49", "100")],
        &[level("0.55", "100")],
    );
    engine.tick().await.unwrap();

    assert_eq!(mock.cancelled(), vec![first_id]);
    let placed = mock.placed_on_side(Side::Buy);
    assert_eq!(placed.len(), 2);
    assert!((placed[1].price - 0.52).abs() < 1e-9);
    let state = engine.snapshot_state();
    assert!((state.buy_order_price - 0.52).abs() < 1e-9);
    assert!(state.buy_order_id.is_some());
}

#[tokio::test]
async fn test_max_buy_price_is_never_exceeded() {
    let mock = MockVenue::new();
    let mut cfg = base_config();
    cfg.max_buy_price = 0.52;
    let (mut engine, book) = make_engine(&mock, cfg);

    book.seed_from_snapshot(&[level("0.515", "100")], &[level("0.60", "100")]);
    engine.tick().await.unwrap();

    // The market runs away; we stay pinned at the rail.
    book.seed_from_snapshot(
        &[level("0.53", "100"), level("0.515", "100")],
        &[level("0.60", "100")],
    );
    engine.tick().await.unwrap();
    book.seed_from_snapshot(
        &[level("0.55", "100"), level("0.53", "100")],
        &[level("0.60", "100")],
    );
    engine.tick().await.unwrap();

    for order in mock.placed_on_side(Side::Buy) {
        assert!(
            order.price <= 0.52 + 1e-9,
            "buy at {} breaches max_buy_price",
            order.price
        );
    }
    assert!(engine.snapshot_state().price_boundary_hit);
}

#[tokio::test]
async fn test_deviation_rail_clamps_both_sides() {
    let mock = MockVenue::new();
    let mut cfg = base_config();
    cfg.max_deviation = 0.10;
    let (mut engine, book) = make_engine(&mock, cfg);

    // Reference mid records at 0.50; rails are [0.45, 0.55].
    book.seed_from_snapshot(&[level("0.49", "100")], &[level("0.51", "100")]);
    engine.tick().await.unwrap();

    // Sell side: hold shares, market collapses; ask is floored at 0.45.
    engine
        .state_handle()
        .write()
        .record_buy(0.50, 100, 0.0, "acc-1", "seed");
    book.seed_from_snapshot(&[level("0.30", "100")], &[level("0.32", "100")]);
    engine.tick().await.unwrap();

    // Buy side: market spikes; bid is capped at 0.55.
    book.seed_from_snapshot(&[level("0.70", "100")], &[level("0.80", "100")]);
    engine.tick().await.unwrap();

    for order in mock.placed() {
        match order.side {
            Side::Buy => assert!(order.price <= 0.55 + 1e-9, "buy at {}", order.price),
            Side::Sell => assert!(order.price >= 0.45 - 1e-9, "sell at {}", order.price),
        }
    }
}

#[tokio::test]
async fn test_spread_gate_pauses_without_cancelling() {
    let mock = MockVenue::new();
    let mut cfg = base_config();
    cfg.min_spread = 0.05;
    let (mut engine, book) = make_engine(&mock, cfg);

    book.seed_from_snapshot(&[level("0.49", "100")], &[level("0.60", "100")]);
    engine.tick().await.unwrap();
    assert_eq!(mock.placed().len(), 1);

    // Spread collapses below the minimum: nothing new, nothing cancelled.
    book.seed_from_snapshot(&[level("0.49", "100")], &[level("0.52", "100")]);
    engine.tick().await.unwrap();
    assert_eq!(mock.placed().len(), 1);
    assert!(mock.cancelled().is_empty());
    assert!(engine.snapshot_state().buy_order_id.is_some());
}

#[tokio::test]
async fn test_depth_gate_cancels_and_recovers() {
    let mock = MockVenue::new();
    let mut cfg = base_config();
    cfg.min_orderbook_depth = 100.0;
    let (mut engine, book) = make_engine(&mock, cfg);

    // Deep enough on both sides: quote normally.
    book.seed_from_snapshot(&[level("0.50", "400")], &[level("0.60", "400")]);
    engine.tick().await.unwrap();
    assert_eq!(mock.placed().len(), 1);
    let order_id = engine.snapshot_state().buy_order_id.clone().unwrap();

    // Bid side thins out below the gate: cancel and stand down.
    book.seed_from_snapshot(&[level("0.50", "150")], &[level("0.60", "400")]);
    engine.tick().await.unwrap();
    assert!(mock.cancelled().contains(&order_id));
    let state = engine.snapshot_state();
    assert!(state.depth_insufficient);
    assert!(state.buy_order_id.is_none());

    // Depth comes back: flag clears and quoting resumes.
    book.seed_from_snapshot(&[level("0.50", "400")], &[level("0.60", "400")]);
    engine.tick().await.unwrap();
    let state = engine.snapshot_state();
    assert!(!state.depth_insufficient);
    assert!(state.buy_order_id.is_some());
}

#[tokio::test]
async fn test_depth_drop_emergency_partial_sell() {
    let mock = MockVenue::new();
    let mut cfg = base_config();
    cfg.depth_drop_window = 3;
    cfg.depth_drop_threshold = 50.0;
    cfg.emergency_position_action = DropAction::SellPartial;
    cfg.emergency_sell_percent = 60.0;
    let (mut engine, book) = make_engine(&mock, cfg);
    mock.set_position(TOKEN, 100);

    // Bid depth walks down 1000 -> 900 -> 400 (top-10, quote units).
    book.seed_from_snapshot(&[level("0.50", "2000")], &[level("0.55", "2000")]);
    engine.tick().await.unwrap();
    let live_bid = engine.snapshot_state().buy_order_id.clone().unwrap();

    book.seed_from_snapshot(&[level("0.50", "1800")], &[level("0.55", "2000")]);
    engine.tick().await.unwrap();

    book.seed_from_snapshot(&[level("0.50", "800")], &[level("0.55", "2000")]);
    engine.tick().await.unwrap();

    // 60% drop >= 50% threshold: cancel, sell 60 of 100 held shares.
    assert!(mock.cancelled().contains(&live_bid));
    let sells = mock.placed_on_side(Side::Sell);
    assert_eq!(sells.len(), 1);
    assert_eq!(sells[0].order_type, OrderType::Market);
    assert_eq!(sells[0].quantity, OrderQuantity::Shares(60));

    let state = engine.snapshot_state();
    assert!(state.depth_drop_triggered);
    assert!(state.bid_depth_history.is_empty());
    assert!(!state.running);
}

#[tokio::test]
async fn test_stop_loss_price_trigger_liquidates() {
    let mock = MockVenue::new();
    let mut cfg = base_config();
    cfg.stop_loss_price = 0.45;
    cfg.min_sell_price = 0.50;
    let (mut engine, book) = make_engine(&mock, cfg);

    mock.set_position(TOKEN, 100);
    mock.state.lock().auto_fill = true;
    engine
        .state_handle()
        .write()
        .record_buy(0.50, 100, 0.0, "acc-1", "seed");

    // Thin book below the stop price: thin-path liquidation at best bid.
    book.seed_from_snapshot(&[level("0.40", "50")], &[level("0.60", "50")]);
    engine.tick().await.unwrap();

    let state = engine.snapshot_state();
    assert!(state.stop_loss_triggered);
    assert!(!state.running);
    assert_eq!(state.total_sell_shares, 100);

    // The liquidation sell ignores min_sell_price.
    let sells = mock.placed_on_side(Side::Sell);
    assert_eq!(sells.len(), 1);
    assert!((sells[0].price - 0.40).abs() < 1e-9);
    assert_eq!(sells[0].quantity, OrderQuantity::Shares(100));
}

#[tokio::test]
async fn test_layered_pyramid_sell() {
    let mock = MockVenue::new();
    let mut cfg = base_config();
    cfg.layered_enabled = true;
    cfg.price_levels = vec![1, 3, 5];
    cfg.distribution = opinion::domain::DistributionMode::Pyramid;
    let (mut engine, book) = make_engine(&mock, cfg);

    engine
        .state_handle()
        .write()
        .record_buy(0.50, 60, 0.0, "acc-1", "seed");

    book.seed_from_snapshot(
        &[
            level("0.50", "100"),
            level("0.49", "100"),
            level("0.48", "100"),
            level("0.47", "100"),
            level("0.46", "100"),
        ],
        &[
            level("0.60", "100"),
            level("0.61", "100"),
            level("0.62", "100"),
            level("0.63", "100"),
            level("0.64", "100"),
        ],
    );
    engine.tick().await.unwrap();

    // Pyramid over rungs 1/3/5: 10 @ ask1, 20 @ ask3, 30 @ ask5.
    let sells = mock.placed_on_side(Side::Sell);
    assert_eq!(sells.len(), 3);
    let mut by_price: Vec<(f64, u64)> = sells
        .iter()
        .map(|o| (o.price, o.shares().unwrap()))
        .collect();
    by_price.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
    assert_eq!(by_price[0], (0.60, 10));
    assert_eq!(by_price[1], (0.62, 20));
    assert_eq!(by_price[2], (0.64, 30));

    // The rung-1 order is the canonical tracked ask.
    let state = engine.snapshot_state();
    assert!((state.sell_order_price - 0.60).abs() < 1e-9);
    assert_eq!(
        state.sell_order_id,
        mock.order_id_at(Side::Sell, 0.60)
    );
}

#[tokio::test]
async fn test_cost_based_ask_never_undercuts_cost_floor() {
    let mock = MockVenue::new();
    let mut cfg = base_config();
    cfg.cost_sell_enabled = true;
    cfg.sell_profit_spread = 0.02;
    cfg.min_cost_profit_spread = 0.005;
    let (mut engine, book) = make_engine(&mock, cfg);

    // Bought at 0.50 average: cost floor for the ask is 0.52.
    engine
        .state_handle()
        .write()
        .record_buy(0.50, 100, 0.0, "acc-1", "seed");

    // The market trades well below our cost; a market-follow ask would sit
    // at 0.41, but cost-based pricing holds the line.
    book.seed_from_snapshot(&[level("0.40", "100")], &[level("0.42", "100")]);
    engine.tick().await.unwrap();

    let sells = mock.placed_on_side(Side::Sell);
    assert_eq!(sells.len(), 1);
    assert!((sells[0].price - 0.52).abs() < 1e-9);

    // The market recovers above the floor: the ask follows it up.
    book.seed_from_snapshot(&[level("0.53", "100")], &[level("0.58", "100")]);
    engine.tick().await.unwrap();
    let sells = mock.placed_on_side(Side::Sell);
    assert_eq!(sells.len(), 2);
    assert!((sells[1].price - 0.57).abs() < 1e-9);
    for sell in &sells {
        assert!(sell.price >= 0.52 - 1e-9);
    }
}

#[tokio::test]
async fn test_empty_book_skips_tick() {
    let mock = MockVenue::new();
    let (mut engine, _book) = make_engine(&mock, base_config());
    engine.tick().await.unwrap();
    assert!(mock.placed().is_empty());
}

#[tokio::test]
async fn test_position_limit_suppresses_buys_not_sells() {
    let mock = MockVenue::new();
    let mut cfg = base_config();
    cfg.max_position_shares = 100;
    let (mut engine, book) = make_engine(&mock, cfg);

    book.seed_from_snapshot(&[level("0.49", "100")], &[level("0.60", "100")]);
    engine.tick().await.unwrap();
    let bid_id = engine.snapshot_state().buy_order_id.clone().unwrap();

    // Venue reports us at the cap: the live bid is cancelled, the ask stays.
    mock.set_position(TOKEN, 100);
    engine
        .state_handle()
        .write()
        .record_buy(0.50, 100, 0.0, "acc-1", "seed");
    engine.tick().await.unwrap();

    let state = engine.snapshot_state();
    assert!(state.position_limit_reached);
    assert!(state.buy_order_id.is_none());
    assert!(mock.cancelled().contains(&bid_id));
    // Sell side keeps working against the held position.
    assert!(state.sell_order_id.is_some());
    assert_eq!(mock.placed_on_side(Side::Buy).len(), 1);
}
