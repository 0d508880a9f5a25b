pub mod console;
pub mod csv_export;
pub mod csv_source;
pub mod excel_source;
pub mod sheet_source;
pub mod tracing_sink;

pub use csv_export::CsvExportSink;
pub use csv_source::CsvOptions;
pub use sheet_source::{SheetDirectorySource, SheetFormat};
pub use tracing_sink::TracingReportSink;
