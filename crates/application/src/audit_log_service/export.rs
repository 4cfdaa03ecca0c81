use std::str::FromStr;

use warden_core::{AppError, AppResult};
use warden_domain::{AuditLogEntry, AuditLogQuery};

use super::AuditLogService;

const CSV_HEADERS: [&str; 9] = [
    "ID",
    "Timestamp",
    "User ID",
    "Action",
    "Resource Type",
    "Resource ID",
    "Status",
    "Severity",
    "IP Address",
];

/// Serialization format for exported entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// Pretty-printed JSON array.
    Json,
    /// Comma-separated values with every field quoted.
    Csv,
}

impl FromStr for ExportFormat {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            other => Err(AppError::Validation(format!(
                "unsupported export format '{other}'"
            ))),
        }
    }
}

impl AuditLogService {
    /// Serializes entries matching `query` (or every entry) in `format`.
    pub async fn export_logs(
        &self,
        format: ExportFormat,
        query: Option<&AuditLogQuery>,
    ) -> AppResult<String> {
        let everything = AuditLogQuery::default();
        let entries = self.query(query.unwrap_or(&everything)).await?;

        match format {
            ExportFormat::Json => serde_json::to_string_pretty(&entries).map_err(|error| {
                AppError::Internal(format!("failed to serialize audit entries: {error}"))
            }),
            ExportFormat::Csv => entries_to_csv(&entries),
        }
    }
}

fn entries_to_csv(entries: &[AuditLogEntry]) -> AppResult<String> {
    let mut writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Always)
        .from_writer(Vec::new());

    writer.write_record(CSV_HEADERS).map_err(csv_error)?;
    for entry in entries {
        let id = entry.id.to_string();
        let timestamp = entry.timestamp.to_rfc3339();
        writer
            .write_record([
                id.as_str(),
                timestamp.as_str(),
                entry.user_id.as_str(),
                entry.action.as_str(),
                entry.resource_type.as_str(),
                entry.resource_id.as_deref().unwrap_or_default(),
                entry.status.as_str(),
                entry.severity.as_str(),
                entry.ip_address.as_deref().unwrap_or_default(),
            ])
            .map_err(csv_error)?;
    }

    let bytes = writer.into_inner().map_err(|error| {
        AppError::Internal(format!("failed to flush audit csv: {}", error.error()))
    })?;
    String::from_utf8(bytes)
        .map_err(|error| AppError::Internal(format!("audit csv is not utf-8: {error}")))
}

fn csv_error(error: csv::Error) -> AppError {
    AppError::Internal(format!("failed to write audit csv: {error}"))
}
