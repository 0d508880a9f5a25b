use anyhow::Result;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

use consolidator::app::ports::DatasetSourcePort;
use consolidator::app::ConsolidateUseCase;
use consolidator::infra::{CsvExportSink, CsvOptions, SheetDirectorySource};
use consolidator::pipeline::{ColumnKindPolicy, PipelineConfig, PipelineOrchestrator, SilentSink};
use consolidator::types::Value;

fn write(dir: &Path, name: &str, content: &str) {
    fs::create_dir_all(dir).unwrap();
    fs::write(dir.join(name), content).unwrap();
}

fn use_case(pipeline: PipelineConfig, output: &Path) -> Result<ConsolidateUseCase> {
    Ok(ConsolidateUseCase::new(
        PipelineOrchestrator::new(pipeline)?,
        Box::new(SheetDirectorySource::new(ColumnKindPolicy::default())),
        Box::new(CsvExportSink::new(output)),
    ))
}

#[tokio::test]
async fn reads_sheet_files_in_name_order_and_skips_others() -> Result<()> {
    let tmp = TempDir::new()?;
    let input = tmp.path().join("raw");
    write(&input, "b.csv", "cpf,valor\n01234567890,10\n");
    write(&input, "a.csv", "cpf,valor\n00000000191,5\n");
    write(&input, "notes.txt", "not a sheet");
    write(&input, "~$a.xlsx", "lock");
    write(&input, "c.xlsx", "not really a workbook");

    let source = SheetDirectorySource::default();
    let sources = source.load_sources(&input).await?;

    let names: Vec<&str> = sources.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["a.csv", "b.csv"]);
    assert_eq!(sources[1].dataset.records[0].get("cpf"), &Value::text("01234567890"));
    assert_eq!(sources[1].dataset.records[0].get("valor"), &Value::Number(10.0));
    Ok(())
}

#[tokio::test]
async fn missing_baseline_directory_means_no_baseline() -> Result<()> {
    let tmp = TempDir::new()?;
    let source = SheetDirectorySource::default();

    assert!(source.load_baseline(&tmp.path().join("nope")).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn full_run_writes_csv_and_report() -> Result<()> {
    let tmp = TempDir::new()?;
    let input = tmp.path().join("1_raw_sheets");
    let baseline = tmp.path().join("0_baseline");
    let output = tmp.path().join("3_final_result");

    write(
        &input,
        "jan.csv",
        "nrprocesso,nome,valor\n00821621420168090051,\"  João   Silva\n\",100\n00011112220198260001,Maria,50\n",
    );
    write(
        &input,
        "feb.csv",
        "nrprocesso,nome,valor\n00011112220198260001,Maria,50\n00099998877201780900,Carlos,10\n",
    );
    write(&baseline, "old.csv", "nrprocesso,nome,valor\n0082162-14.2016.8.09.0051,João Silva,100\n");

    let outcome = use_case(PipelineConfig::full(), &output)?
        .run(&input, Some(&baseline), "processed", &mut SilentSink)
        .await?;

    assert_eq!(outcome.rows, 2);
    assert_eq!(outcome.report.rows_removed_intra(), 1);
    assert_eq!(outcome.report.rows_removed_baseline(), 1);

    let file_name = outcome.output_path.file_name().unwrap().to_string_lossy().into_owned();
    assert!(file_name.starts_with("processed_") && file_name.ends_with(".csv"));

    // feb.csv sorts first
    let written = fs::read_to_string(&outcome.output_path)?;
    assert_eq!(
        written,
        "nrprocesso,nome,valor\n0001111-22.2019.8.26.0001,Maria,50\n0009999-88.7720.1.78.0900,Carlos,10\n"
    );

    let report_path = outcome.output_path.with_extension("report.json");
    let report: serde_json::Value = serde_json::from_str(&fs::read_to_string(report_path)?)?;
    assert_eq!(report["pipeline"], "full");
    assert_eq!(report["stages"].as_array().map(Vec::len), Some(7));
    Ok(())
}

#[tokio::test]
async fn empty_input_directory_writes_nothing() -> Result<()> {
    let tmp = TempDir::new()?;
    let input = tmp.path().join("empty");
    fs::create_dir_all(&input)?;
    let output = tmp.path().join("out");

    let result = use_case(PipelineConfig::merge(), &output)?
        .run(&input, None, "consolidated", &mut SilentSink)
        .await;

    assert!(result.is_err());
    assert!(!output.exists());
    Ok(())
}

#[tokio::test]
async fn strip_writes_one_unmasked_file_per_sheet() -> Result<()> {
    let tmp = TempDir::new()?;
    let input = tmp.path().join("in");
    let output = tmp.path().join("out");
    write(&input, "lote.csv", "processo,parte\n0082162-14.2016.8.09.0051,A\n,B\n");

    let outcomes = use_case(PipelineConfig::strip(), &output)?
        .run_each(&input, "unmasked", &mut SilentSink)
        .await?;

    assert_eq!(outcomes.len(), 1);
    let file_name = outcomes[0].output_path.file_name().unwrap().to_string_lossy().into_owned();
    assert!(file_name.starts_with("lote_unmasked_"));

    let written = fs::read_to_string(&outcomes[0].output_path)?;
    assert_eq!(written, "processo,parte\n00821621420168090051,A\n,B\n");
    Ok(())
}

#[tokio::test]
async fn windows_1252_semicolon_export_is_read_column_by_column() -> Result<()> {
    let tmp = TempDir::new()?;
    let input = tmp.path().join("in");
    let output = tmp.path().join("out");
    fs::create_dir_all(&input)?;
    fs::write(
        input.join("lote.csv"),
        b"nrprocesso;endereco;valor\r\n0082162-14.2016.8.09.0051;Rua S\xe3o Jo\xe3o 1.5-A;1.234\r\n",
    )?;

    let outcomes = use_case(PipelineConfig::strip(), &output)?
        .run_each(&input, "unmasked", &mut SilentSink)
        .await?;

    let written = fs::read_to_string(&outcomes[0].output_path)?;
    assert_eq!(
        written,
        "nrprocesso,endereco,valor\n00821621420168090051,Rua São João 1.5-A,1.234\n"
    );
    Ok(())
}

#[tokio::test]
async fn configured_delimiter_overrides_detection() -> Result<()> {
    let tmp = TempDir::new()?;
    let input = tmp.path().join("in");
    write(&input, "pipes.csv", "a,b|c\n1,2|3\n");

    let source = SheetDirectorySource::default().with_csv_options(CsvOptions::default().with_delimiter(b'|'));
    let sources = source.load_sources(&input).await?;

    let columns: Vec<&str> = sources[0].dataset.schema.names().collect();
    assert_eq!(columns, vec!["a,b", "c"]);
    Ok(())
}
