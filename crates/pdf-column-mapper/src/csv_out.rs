use csv::WriterBuilder;

use crate::error::PipelineError;

pub(crate) fn write_csv_to_string(
    headers: &[String],
    rows: &[Vec<String>],
    delimiter: u8,
) -> Result<String, PipelineError> {
    let mut writer = WriterBuilder::new()
        .delimiter(delimiter)
        .from_writer(Vec::<u8>::new());
    writer.write_record(headers)?;
    for row in rows {
        writer.write_record(row)?;
    }
    writer.flush()?;

    let bytes = writer
        .into_inner()
        .map_err(|error| PipelineError::Io(error.into_error()))?;
    String::from_utf8(bytes)
        .map_err(|error| PipelineError::InvalidOption(format!("invalid utf-8 csv output: {error}")))
}
