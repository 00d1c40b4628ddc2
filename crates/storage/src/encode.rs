use delta_core::{OutputFormat, PayloadRow, Row};

use crate::error::DeliveryError;

/// Serialize a batch in the job's output format.
pub fn encode_batch(rows: &[Row], format: &OutputFormat) -> Result<Vec<u8>, DeliveryError> {
    match format {
        OutputFormat::Json => {
            let payload: Vec<PayloadRow<'_>> = rows.iter().map(PayloadRow).collect();
            Ok(serde_json::to_vec(&payload)?)
        }
        OutputFormat::Jsonl => {
            let mut out = Vec::new();
            for row in rows {
                serde_json::to_writer(&mut out, &PayloadRow(row))?;
                out.push(b'\n');
            }
            Ok(out)
        }
        OutputFormat::Unsupported(f) => Err(DeliveryError::UnsupportedFormat(f.clone())),
    }
}
