use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::models::Appointment;

const HEADER: &str = "id,business_id,customer_name,service,date_time,phone,notes,created_at\n";

fn sheet_path(base_dir: &str) -> PathBuf {
    Path::new(base_dir).join("appointments.csv")
}

/// Append one appointment to the shared spreadsheet, writing the header row
/// when the file is first created. One file for all appointments.
pub fn append_appointment(base_dir: &str, appt: &Appointment) -> anyhow::Result<()> {
    std::fs::create_dir_all(base_dir)
        .with_context(|| format!("failed to create export directory: {base_dir}"))?;

    let path = sheet_path(base_dir);
    let is_new = !path.exists();

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("failed to open export file: {}", path.display()))?;

    if is_new {
        file.write_all(HEADER.as_bytes())
            .context("failed to write export header")?;
    }

    let row = format!(
        "{},{},{},{},{},{},{},{}\n",
        csv_field(&appt.id),
        appt.business_id,
        csv_field(&appt.customer_name),
        csv_field(&appt.service_type),
        csv_field(&appt.date_time_str),
        csv_field(&appt.phone_number),
        csv_field(appt.notes.as_deref().unwrap_or("")),
        appt.created_at.format("%Y-%m-%dT%H:%M:%S"),
    );
    file.write_all(row.as_bytes())
        .context("failed to append export row")?;

    Ok(())
}

/// Quote a field when it contains a comma, quote, or newline.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
