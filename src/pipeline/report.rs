//! Digest document assembly and export.
//!
//! The worker's end product is one pretty-printed JSON document per day,
//! picked up by the external renderer. Field names are `camelCase` to match
//! the renderer's expectations.

use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use rustc_hash::FxHashMap;
use serde::Serialize;
use tracing::info;

use crate::feed::{ClassifiedPost, Comment};
use crate::pipeline::RunContext;
use crate::pipeline::curate::{RankedPost, Selection};
use crate::pipeline::score::ScoreBreakdown;
use crate::util::time::date_string;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DigestEntry<'a> {
    #[serde(flatten)]
    post: &'a ClassifiedPost,
    score: ScoreBreakdown,
    /// Score plus the lane boost; this is the order entries appear in.
    boosted_score: f64,
    highlight: &'a str,
    top_comments: &'a [Comment],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DigestDocument<'a> {
    date: String,
    generated_at: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    fresh_entries: Vec<DigestEntry<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    trending_entries: Vec<DigestEntry<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    entries: Vec<DigestEntry<'a>>,
    emerging_themes: &'a [String],
}

#[async_trait]
pub(crate) trait ReportStage: Send + Sync {
    async fn execute(
        &self,
        ctx: &RunContext,
        selection: &Selection,
        comments: &FxHashMap<String, Vec<Comment>>,
    ) -> Result<PathBuf>;
}

pub(crate) struct JsonReportStage {
    output_dir: PathBuf,
}

impl JsonReportStage {
    pub(crate) fn new(output_dir: PathBuf) -> Self {
        Self { output_dir }
    }
}

fn entries<'a>(
    ranked: &'a [RankedPost],
    comments: &'a FxHashMap<String, Vec<Comment>>,
) -> Vec<DigestEntry<'a>> {
    ranked
        .iter()
        .map(|entry| DigestEntry {
            post: &entry.post,
            score: entry.breakdown,
            boosted_score: entry.boosted_total,
            highlight: &entry.highlight,
            top_comments: comments
                .get(&entry.post.post.id)
                .map_or(&[] as &[Comment], Vec::as_slice),
        })
        .collect()
}

#[async_trait]
impl ReportStage for JsonReportStage {
    async fn execute(
        &self,
        ctx: &RunContext,
        selection: &Selection,
        comments: &FxHashMap<String, Vec<Comment>>,
    ) -> Result<PathBuf> {
        let date = date_string(ctx.now);
        let document = DigestDocument {
            date: date.clone(),
            generated_at: ctx.now.to_rfc3339(),
            fresh_entries: entries(&selection.fresh, comments),
            trending_entries: entries(&selection.trending, comments),
            entries: entries(&selection.legacy, comments),
            emerging_themes: &selection.emerging_themes,
        };

        let body =
            serde_json::to_string_pretty(&document).context("failed to serialize digest document")?;

        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .with_context(|| format!("failed to create output dir {}", self.output_dir.display()))?;
        let path = self.output_dir.join(format!("digest-{date}.json"));
        tokio::fs::write(&path, body)
            .await
            .with_context(|| format!("failed to write digest document {}", path.display()))?;

        info!(
            run_id = %ctx.run_id,
            path = %path.display(),
            entries = selection.selected_count(),
            "digest document written"
        );
        Ok(path)
    }
}
