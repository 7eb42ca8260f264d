use crate::engine::tokens::delist_if_inactive;
use crate::prelude::{EngineError, invariants};
use crate::EngineState;

/// Result of one bounded Janitor sweep, for the caller to decide whether to
/// keep ticking immediately or wait for the next scheduling interval.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct JanitorReport {
    pub orders_closed: usize,
    pub trades_archived_out: usize,
    pub tokens_delisted: usize,
}

/// One preemptible Janitor tick (§4.G): closes orders older than
/// `order_ttl_ns`, drops archived trades older than `archive_ttl_ns`, and
/// delists tokens inactive for `delist_ttl_ns` with no open orders.
/// `batch` bounds how many expired orders are closed per call, so a tick
/// never blocks the single logical thread for longer than one bounded
/// sweep (§5's preemptibility requirement).
pub fn tick(state: &mut EngineState, now_ns: u64, batch: usize) -> Result<JanitorReport, EngineError> {
    let mut report = JanitorReport::default();

    let order_cutoff = now_ns.saturating_sub(state.config.order_ttl_ns);
    let tokens: Vec<_> = state.books.iter().map(|(id, _)| *id).collect();
    'outer: for token in &tokens {
        let Some(book) = state.books.get(*token) else { continue };
        for key in book.expired(order_cutoff) {
            if report.orders_closed >= batch {
                break 'outer;
            }
            let removed = state.books.get_mut(*token).and_then(|book| book.cancel(key.side, &key));
            if let Some(order) = removed {
                let base_t = state
                    .records
                    .get(token)
                    .map(|r| crate::prelude::base_of(r.decimals))
                    .unwrap_or(crate::prelude::Amount::ZERO);
                let (lock_denom, lock_amount) = crate::prelude::required_lock_of(&order, base_t);
                state.balances.unlock(order.owner, lock_denom, lock_amount);
                report.orders_closed += 1;
            }
        }
    }

    let archive_cutoff = now_ns.saturating_sub(state.config.archive_ttl_ns);
    report.trades_archived_out = state.archive.evict_older_than(archive_cutoff);

    let delist_ttl_ns = state.config.delist_ttl_ns;
    let candidates: Vec<_> = state.records.keys().copied().collect();
    for token in candidates {
        if delist_if_inactive(&mut state.books, &mut state.records, token, now_ns, delist_ttl_ns) {
            report.tokens_delisted += 1;
        }
    }

    invariants::verify(&state.balances, &state.books, &state.records)?;
    Ok(report)
}
