use crate::app::RunOutcome;
use crate::pipeline::Stage;

/// Print the end-of-run summary shown to the operator
pub fn print_summary(outcome: &RunOutcome) {
    let report = &outcome.report;
    println!("\n📊 Pipeline '{}' results:", report.pipeline);
    println!("   Sources read: {}", report.sources.len());
    println!("   Rows in: {}", report.rows_ingested());

    if let Some(intra) = &report.intra_dedup {
        println!(
            "   Internal duplicates removed: {} ({:.2}%)",
            intra.rows_dropped,
            intra.duplication_rate()
        );
    }
    match &report.baseline {
        Some(baseline) if baseline.skipped.is_none() => println!(
            "   Already in baseline: {} ({:.2}%)",
            baseline.rows_removed,
            baseline.duplication_rate()
        ),
        _ => {
            if let Some(step) = report.stage(Stage::BaselineDeduped) {
                println!("   Baseline comparison: {}", step.message);
            }
        }
    }
    if report.sanitize.is_some() {
        println!("   Text columns sanitized: {}", report.columns_sanitized());
    }
    if let Some(identifier) = &report.identifier {
        println!(
            "   Identifiers rewritten: {} ({} left unchanged)",
            identifier.transformed,
            identifier.unchanged_total()
        );
        if let (Some(before), Some(after)) = (&identifier.example_before, &identifier.example_after) {
            println!("      e.g. {} -> {}", before, after);
        }
    }
    if report.anomalies > 0 {
        println!("   ⚠️  Anomalies: {}", report.anomalies);
    }
    if let Some(quality) = &report.quality {
        println!(
            "   Final: {} row(s) x {} column(s), fill rate {:.2}%",
            quality.rows,
            quality.columns,
            quality.fill_rate()
        );
    }
    println!("   Output file: {}", outcome.output_path.display());
}
