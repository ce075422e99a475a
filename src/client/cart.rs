/// Cart aggregate
///
/// In-memory staging of purchase lines with local duplicate, ownership and
/// affordability checks. The server repeats every check; its answer wins.
use crate::{
    cart::CartLine,
    catalog::Listing,
    error::{MarketError, MarketResult},
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone)]
struct Entry {
    listing_id: String,
    listing: Option<Listing>,
}

/// Totals over resolved lines
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartTotals {
    pub total: i64,
    pub line_count: usize,
    /// Lines whose listing is gone or inactive; excluded from the total
    pub unresolved: Vec<String>,
}

/// Client-side cart
#[derive(Debug, Clone, Default)]
pub struct CartAggregate {
    account_id: Option<String>,
    entries: Vec<Entry>,
    owned: HashSet<String>,
}

impl CartAggregate {
    pub fn new(account_id: Option<String>) -> Self {
        Self {
            account_id,
            ..Default::default()
        }
    }

    /// Switch to another account; drops every line and known purchase
    pub fn set_account(&mut self, account_id: Option<String>) {
        self.account_id = account_id;
        self.entries.clear();
        self.owned.clear();
    }

    /// Listings the account already owns
    pub fn set_owned<I: IntoIterator<Item = String>>(&mut self, listing_ids: I) {
        self.owned = listing_ids.into_iter().collect();
    }

    pub fn add_line(&mut self, listing: Listing) -> MarketResult<()> {
        if self.contains(&listing.id) {
            return Err(MarketError::DuplicateLine);
        }
        if self.account_id.as_deref() == Some(listing.seller_id.as_str()) {
            return Err(MarketError::SelfPurchase);
        }
        if self.owned.contains(&listing.id) {
            return Err(MarketError::AlreadyOwned);
        }

        self.entries.push(Entry {
            listing_id: listing.id.clone(),
            listing: Some(listing),
        });
        Ok(())
    }

    /// Replace local lines with the server's view
    pub fn load_server_lines(&mut self, lines: Vec<CartLine>) {
        self.entries = lines
            .into_iter()
            .map(|line| Entry {
                listing_id: line.listing_id,
                listing: line.listing,
            })
            .collect();
    }

    /// Removing an absent line is not an error
    pub fn remove_line(&mut self, listing_id: &str) {
        self.entries.retain(|e| e.listing_id != listing_id);
    }

    pub fn contains(&self, listing_id: &str) -> bool {
        self.entries.iter().any(|e| e.listing_id == listing_id)
    }

    pub fn compute_totals(&self) -> CartTotals {
        let mut total = 0;
        let mut line_count = 0;
        let mut unresolved = Vec::new();

        for entry in &self.entries {
            match &entry.listing {
                Some(listing) => {
                    total += listing.price;
                    line_count += 1;
                }
                None => unresolved.push(entry.listing_id.clone()),
            }
        }

        CartTotals {
            total,
            line_count,
            unresolved,
        }
    }

    pub fn can_afford(&self, balance: i64) -> bool {
        balance - self.compute_totals().total >= 0
    }

    /// Ids of the lines that would be bought
    pub fn resolved_listing_ids(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| e.listing.is_some())
            .map(|e| e.listing_id.clone())
            .collect()
    }

    /// Forget the bought lines and remember them as owned
    pub fn mark_purchased(&mut self, listing_ids: &[String]) {
        for id in listing_ids {
            self.remove_line(id);
            self.owned.insert(id.clone());
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
