//! Market info resolution
//!
//! Normalizes the venue's market shapes into one record. A market id is
//! tried as categorical first, then binary; YES/NO token ids are extracted
//! from whichever of the venue's three shapes is present (explicit fields,
//! nested tokens list matched by ticker, or child markets).

use crate::infrastructure::client::types::MarketData;
use crate::infrastructure::client::{VenueClient, VenueError};
use tracing::debug;

/// Normalized view of one market.
#[derive(Debug, Clone)]
pub struct MarketInfo {
    pub market_id: i64,
    pub title: String,
    pub is_categorical: bool,
    pub yes_token_id: Option<String>,
    pub no_token_id: Option<String>,
    pub children: Vec<MarketInfo>,
}

/// Pull YES/NO token ids out of a raw market record.
fn extract_tokens(data: &MarketData) -> (Option<String>, Option<String>) {
    if data.yes_token_id.is_some() || data.no_token_id.is_some() {
        return (data.yes_token_id.clone(), data.no_token_id.clone());
    }
    let mut yes = None;
    let mut no = None;
    for token in &data.tokens {
        let ticker = token
            .ticker
            .as_deref()
            .unwrap_or_default()
            .to_uppercase();
        if ticker.contains("YES") {
            yes = Some(token.token_id.clone());
        } else if ticker.contains("NO") {
            no = Some(token.token_id.clone());
        }
    }
    (yes, no)
}

fn from_binary(data: &MarketData) -> MarketInfo {
    let (yes_token_id, no_token_id) = extract_tokens(data);
    MarketInfo {
        market_id: data.market_id,
        title: data.market_title.clone(),
        is_categorical: false,
        yes_token_id,
        no_token_id,
        children: Vec::new(),
    }
}

/// Resolve a market id, auto-detecting categorical vs binary.
pub async fn get_market_info(
    client: &dyn VenueClient,
    market_id: i64,
) -> Result<MarketInfo, VenueError> {
    match client.get_categorical_market(market_id).await {
        Ok(data) if !data.child_markets.is_empty() => {
            let children = data.child_markets.iter().map(from_binary).collect();
            return Ok(MarketInfo {
                market_id: data.market_id,
                title: data.market_title,
                is_categorical: true,
                yes_token_id: None,
                no_token_id: None,
                children,
            });
        }
        Ok(_) => {}
        Err(e) => debug!(market_id, error = %e, "not a categorical market"),
    }

    let data = client.get_market(market_id).await?;
    Ok(from_binary(&data))
}

/// Resolve every child of a categorical market.
pub async fn get_child_markets(
    client: &dyn VenueClient,
    parent_market_id: i64,
) -> Result<Vec<MarketInfo>, VenueError> {
    let parent = get_market_info(client, parent_market_id).await?;
    if !parent.is_categorical {
        return Err(VenueError::Api {
            errno: -1,
            errmsg: format!("market {parent_market_id} is not categorical"),
        });
    }
    let mut resolved = Vec::with_capacity(parent.children.len());
    for child in &parent.children {
        // Children from the parent payload may be shallow; refetch any that
        // are missing token ids.
        if child.yes_token_id.is_some() {
            resolved.push(child.clone());
        } else {
            match client.get_market(child.market_id).await {
                Ok(data) => resolved.push(from_binary(&data)),
                Err(e) => debug!(market_id = child.market_id, error = %e, "child market fetch failed"),
            }
        }
    }
    Ok(resolved)
}
