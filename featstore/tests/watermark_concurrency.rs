use chrono::{Days, NaiveDate};
use featstore::{catalog::Catalog, models::AdvanceOutcome, watermark::WatermarkStore};

mod common;

use common::{date, init_test_context};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn overlapping_runs_never_regress_the_watermark() -> anyhow::Result<()> {
    let ctx = init_test_context().await?;
    let start = date("2024-01-01");

    // Each "run" opens its own connection to the shared catalog file.
    let mut handles = Vec::new();
    for worker in 0..6u64 {
        let config = ctx.config.clone();
        handles.push(tokio::task::spawn_blocking(move || -> anyhow::Result<Vec<NaiveDate>> {
            let catalog = Catalog::new(&config)?;
            let mut seen = Vec::new();
            for step in 0..20u64 {
                let candidate = start + Days::new((step * 7 + worker * 3) % 40);
                if let AdvanceOutcome::Rejected { current } = catalog.advance("shared", candidate)? {
                    assert!(current >= candidate);
                }
                seen.push(catalog.get("shared")?);
            }
            Ok(seen)
        }));
    }

    let mut highest = start;
    for handle in handles {
        let seen = handle.await??;
        // Every observer sees a non-decreasing sequence.
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        highest = highest.max(*seen.last().unwrap_or(&start));
    }

    let final_value = ctx.catalog.get("shared")?;
    assert_eq!(final_value, start + Days::new(39));
    assert!(final_value >= highest);

    let advanced_again = ctx.catalog.advance("shared", final_value)?;
    assert!(!advanced_again.is_accepted());
    Ok(())
}
