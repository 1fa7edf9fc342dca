//! Chunked parallel execution.
//!
//! Every stage splits its inputs into chunks of `chunk_size` and hands each
//! chunk to the rayon pool as an independent task. Chunks share no state;
//! results come back in input order.

use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use rayon::prelude::*;

/// Size the global rayon pool. `None` keeps the default (one thread per CPU).
pub fn init_rayon(threads: Option<usize>) -> Result<()> {
    if let Some(threads) = threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()?;
    }
    Ok(())
}

/// Apply `f` to consecutive chunks of `items` in parallel and collect the
/// per-chunk results in order. The first error aborts the stage.
///
/// `label` names the work in progress messages.
pub fn apply_chunks<T, R, F>(items: &[T], chunk_size: usize, label: &str, f: F) -> Result<Vec<R>>
where
    T: Sync,
    R: Send,
    F: Fn(&[T]) -> Result<R> + Sync,
{
    let chunk_size = chunk_size.max(1);
    let total = items.len().div_ceil(chunk_size);
    let done = AtomicUsize::new(0);
    let report_every = (total / 10).max(1);

    log::debug!(
        "{label}: {} items in {total} chunks on {} threads",
        items.len(),
        rayon::current_num_threads()
    );

    let results = items
        .par_chunks(chunk_size)
        .map(|chunk| {
            let result = f(chunk);
            let count = done.fetch_add(1, Ordering::Relaxed) + 1;
            if count % report_every == 0 || count == total {
                log::info!("{label}: {count} / {total} chunks");
            }
            result
        })
        .collect::<Result<Vec<R>>>()?;

    Ok(results)
}

/// Like [`apply_chunks`] for per-item results: the chunk outputs are
/// flattened back into one vector aligned with `items`.
pub fn map_chunked<T, R, F>(items: &[T], chunk_size: usize, label: &str, f: F) -> Result<Vec<R>>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> Result<R> + Sync,
{
    let chunks = apply_chunks(items, chunk_size, label, |chunk| {
        chunk.iter().map(&f).collect::<Result<Vec<R>>>()
    })?;
    Ok(chunks.into_iter().flatten().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunks_come_back_in_order() {
        let items: Vec<u32> = (0..25).collect();
        let sums = apply_chunks(&items, 10, "sum", |c| Ok(c.iter().sum::<u32>())).unwrap();
        assert_eq!(sums, vec![45, 145, 110]);
    }

    #[test]
    fn map_chunked_preserves_alignment() {
        let items: Vec<i64> = (1..=7).collect();
        let doubled = map_chunked(&items, 3, "double", |x| Ok(x * 2)).unwrap();
        assert_eq!(doubled, vec![2, 4, 6, 8, 10, 12, 14]);
    }

    #[test]
    fn errors_propagate() {
        let items = vec![1, 2, 3];
        let result = map_chunked(&items, 1, "fail", |x| {
            if *x == 2 { anyhow::bail!("bad item {x}") } else { Ok(*x) }
        });
        assert!(result.is_err());
    }

    #[test]
    fn empty_input_yields_nothing() {
        let items: Vec<u8> = Vec::new();
        assert!(apply_chunks(&items, 0, "empty", |_| Ok(())).unwrap().is_empty());
    }
}
