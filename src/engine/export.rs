// Progress export — snapshot summary for sharing outside the app.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use super::progress::ProgressCollection;
use crate::clock::Clock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectInfo {
    pub total_steps: u32,
    pub completed_steps: u32,
    pub completion_percentage: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportData {
    pub progress: ProgressCollection,
    pub export_date: DateTime<Utc>,
    pub project_info: ProjectInfo,
}

/// Receives a finished report file, e.g. the platform share sheet.
#[async_trait]
pub trait ShareTarget: Send + Sync {
    async fn is_available(&self) -> bool;
    async fn share(&self, path: &Path) -> Result<()>;
}

/// Build the export document. Only steps currently marked completed are counted.
pub fn generate_export_data(
    progress: &ProgressCollection,
    total_steps: u32,
    now: DateTime<Utc>,
) -> ExportData {
    let completed_steps = progress.completed_count() as u32;
    ExportData {
        progress: progress.clone(),
        export_date: now,
        project_info: ProjectInfo {
            total_steps,
            completed_steps,
            completion_percentage: completion_percentage(completed_steps, total_steps),
        },
    }
}

/// `round(100 * completed / total)`, half away from zero; 0 when there are no steps.
pub fn completion_percentage(completed_steps: u32, total_steps: u32) -> u32 {
    if total_steps == 0 {
        return 0;
    }
    (100.0 * f64::from(completed_steps) / f64::from(total_steps)).round() as u32
}

/// File name for a report produced on `now`'s date.
pub fn report_file_name(now: DateTime<Utc>) -> String {
    format!("progress-report-{}.json", now.format("%Y-%m-%d"))
}

/// Write the report under `out_dir`, returning its path.
pub async fn write_export_report(data: &ExportData, out_dir: &Path) -> Result<PathBuf> {
    let json = serde_json::to_string_pretty(data)?;
    tokio::fs::create_dir_all(out_dir)
        .await
        .with_context(|| format!("create {}", out_dir.display()))?;
    let path = out_dir.join(report_file_name(data.export_date));
    tokio::fs::write(&path, json)
        .await
        .with_context(|| format!("write {}", path.display()))?;
    Ok(path)
}

/// Write a report and hand it to `share`. Returns `true` only if it was shared.
pub async fn export_progress_report(
    progress: &ProgressCollection,
    total_steps: u32,
    out_dir: &Path,
    clock: &dyn Clock,
    share: &dyn ShareTarget,
) -> bool {
    let data = generate_export_data(progress, total_steps, clock.now());
    let path = match write_export_report(&data, out_dir).await {
        Ok(path) => path,
        Err(e) => {
            warn!("error exporting progress: {}", e);
            return false;
        }
    };

    if !share.is_available().await {
        info!("report written to {} but sharing is unavailable", path.display());
        return false;
    }
    match share.share(&path).await {
        Ok(()) => true,
        Err(e) => {
            warn!("error sharing {}: {}", path.display(), e);
            false
        }
    }
}
