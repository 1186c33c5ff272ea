//! Intent parsing and quote aggregation. Offline and deterministic.

mod get_quotes;
mod parse_intent;

use crate::tools::{Category, ToolDefinition, ToolMeta};
use std::sync::Arc;

use get_quotes::GetQuotes;
use parse_intent::ParseIntent;

pub use get_quotes::{QuoteSource, SimulatedQuotes};

pub fn definitions(quotes: Arc<dyn QuoteSource>) -> eyre::Result<Vec<ToolDefinition>> {
    Ok(vec![
        ToolDefinition::new(
            ToolMeta::new(
                "parseIntent",
                "Parse DeFi Intent",
                "Parse natural language into a structured DeFi intent (swap, bridge, stake, lend, borrow, liquidity)",
                Category::Defi,
            ),
            ParseIntent::new()?,
        ),
        ToolDefinition::new(
            ToolMeta::new(
                "getQuotes",
                "Get Quotes",
                "Aggregate swap and bridge quotes across protocols, best first",
                Category::Defi,
            ),
            GetQuotes::new(quotes),
        ),
    ])
}
