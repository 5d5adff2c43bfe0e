//! Digest pipeline: stage traits, orchestrator, and builder.

pub(crate) mod comments;
pub(crate) mod curate;
pub(crate) mod load;
pub(crate) mod quality;
pub(crate) mod report;
pub(crate) mod score;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::clients::MoltbookClient;
use crate::clients::moltbook::MoltbookConfig;
use crate::community::CommunityTracker;
use crate::config::Config;
use crate::reputation::ReputationLedger;
use crate::reputation::records::{BlockedItemRef, FeaturedCommentRef, FeaturedPostRef};
use crate::util::retry::RetryConfig;
use crate::util::text::truncate_graphemes;
use crate::util::time::date_string;

use comments::{EnrichOutcome, EnrichStage};
use curate::{CurateStage, Selection};
use load::LoadStage;
use quality::{FilterOutcome, FilterStage};
use report::ReportStage;

/// 元帳に記録するコメント抜粋の最大長。
const LEDGER_EXCERPT_GRAPHEMES: usize = 80;

/// Identity and fixed clock for one batch run. Every stage reads `now` from
/// here so the whole run scores against a single instant.
pub(crate) struct RunContext {
    pub(crate) run_id: Uuid,
    pub(crate) now: DateTime<Utc>,
}

impl RunContext {
    pub(crate) fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            now: Utc::now(),
        }
    }

    pub(crate) fn date(&self) -> String {
        date_string(self.now)
    }
}

/// Per-stage counts for one completed run.
#[derive(Debug)]
pub struct RunSummary {
    pub loaded: usize,
    pub accepted: usize,
    pub spam_posts: usize,
    pub fresh: usize,
    pub trending: usize,
    pub legacy: usize,
    pub featured_comments: usize,
    pub spam_comments: usize,
    pub trusted_agents: usize,
    pub blocked_agents: usize,
    pub communities: usize,
    pub report_path: PathBuf,
}

/// Container for all pipeline stages.
pub(crate) struct PipelineStages {
    pub(crate) load: Arc<dyn LoadStage>,
    pub(crate) filter: Arc<dyn FilterStage>,
    pub(crate) curate: Arc<dyn CurateStage>,
    pub(crate) enrich: Arc<dyn EnrichStage>,
    pub(crate) report: Arc<dyn ReportStage>,
}

pub(crate) struct DigestPipeline {
    config: Arc<Config>,
    stages: PipelineStages,
}

/// Builder pattern for constructing `DigestPipeline`.
pub(crate) struct PipelineBuilder {
    config: Arc<Config>,
    load: Option<Arc<dyn LoadStage>>,
    filter: Option<Arc<dyn FilterStage>>,
    curate: Option<Arc<dyn CurateStage>>,
    enrich: Option<Arc<dyn EnrichStage>>,
    report: Option<Arc<dyn ReportStage>>,
}

impl PipelineBuilder {
    pub(crate) fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            load: None,
            filter: None,
            curate: None,
            enrich: None,
            report: None,
        }
    }

    pub(crate) fn with_load_stage(mut self, stage: Arc<dyn LoadStage>) -> Self {
        self.load = Some(stage);
        self
    }

    pub(crate) fn with_filter_stage(mut self, stage: Arc<dyn FilterStage>) -> Self {
        self.filter = Some(stage);
        self
    }

    pub(crate) fn with_curate_stage(mut self, stage: Arc<dyn CurateStage>) -> Self {
        self.curate = Some(stage);
        self
    }

    pub(crate) fn with_enrich_stage(mut self, stage: Arc<dyn EnrichStage>) -> Self {
        self.enrich = Some(stage);
        self
    }

    pub(crate) fn with_report_stage(mut self, stage: Arc<dyn ReportStage>) -> Self {
        self.report = Some(stage);
        self
    }

    pub(crate) fn build(self) -> DigestPipeline {
        let stages = PipelineStages {
            load: self
                .load
                .unwrap_or_else(|| panic!("load stage must be configured before build")),
            filter: self
                .filter
                .unwrap_or_else(|| panic!("filter stage must be configured before build")),
            curate: self
                .curate
                .unwrap_or_else(|| panic!("curate stage must be configured before build")),
            enrich: self
                .enrich
                .unwrap_or_else(|| panic!("enrich stage must be configured before build")),
            report: self
                .report
                .unwrap_or_else(|| panic!("report stage must be configured before build")),
        };
        DigestPipeline {
            config: self.config,
            stages,
        }
    }
}

impl DigestPipeline {
    /// Create a pipeline with the default stage implementations.
    pub(crate) fn new(config: Arc<Config>) -> Result<Self> {
        let retry_config = RetryConfig::new(
            config.http_max_retries(),
            config.http_backoff_base_ms(),
            config.http_backoff_cap_ms(),
        );
        let client = Arc::new(MoltbookClient::new(
            MoltbookConfig {
                base_url: config.api_base().to_string(),
                api_key: config.api_key().map(ToString::to_string),
                rate_limit_rpm: config.rate_limit_rpm(),
                connect_timeout: config.api_connect_timeout(),
                total_timeout: config.api_total_timeout(),
            },
            retry_config,
        )?);

        Ok(PipelineBuilder::new(Arc::clone(&config))
            .with_load_stage(Arc::new(load::DataDirLoadStage::new(
                config.data_dir().clone(),
                config.window_days(),
            )))
            .with_filter_stage(Arc::new(quality::CriteriaFilterStage::new(
                config.min_significance(),
                config.topics().to_vec(),
                config.exclude_topics().to_vec(),
                config.min_upvotes(),
                config.min_comments(),
                config.max_age_hours(),
            )))
            .with_curate_stage(Arc::new(curate::HybridCurateStage::new(
                config.priority_topics().to_vec(),
                config.hybrid_enabled(),
                config.max_fresh(),
                config.max_trending(),
                config.fresh_hours(),
                config.max_posts(),
                config.diversify_topics(),
            )))
            .with_enrich_stage(Arc::new(comments::ApiEnrichStage::new(
                client,
                config.comments_per_post(),
            )))
            .with_report_stage(Arc::new(report::JsonReportStage::new(
                config.output_dir().clone(),
            )))
            .build())
    }

    /// Execute one digest run.
    pub(crate) async fn execute(&self, ctx: &RunContext) -> Result<RunSummary> {
        debug!(run_id = %ctx.run_id, date = %ctx.date(), "digest pipeline started");

        let mut ledger = ReputationLedger::open(self.config.reputation_path());
        let mut tracker = CommunityTracker::open(self.config.community_path());

        let window = self.stages.load.execute(ctx).await?;
        let loaded = window.len();

        let FilterOutcome { accepted, spam } =
            self.stages.filter.execute(ctx, window.clone(), &ledger);
        let accepted_count = accepted.len();

        let selection = self.stages.curate.execute(ctx, accepted, &ledger);

        // All network fetches complete before any ledger mutation.
        let enriched = self.stages.enrich.execute(ctx, &selection).await;

        let date = ctx.date();
        apply_ledger_updates(&mut ledger, &date, &selection, &spam, &enriched);

        tracker.record_window(&date, &window, &selection.featured_ids());

        let report_path = self
            .stages
            .report
            .execute(ctx, &selection, &enriched.featured)
            .await
            .context("report stage failed")?;

        // Store write failures are logged, not fatal; the digest document is
        // already on disk and the run can be retried later.
        if let Err(err) = ledger.save(ctx.now) {
            error!(error = %err, "failed to persist reputation ledger");
        }
        if let Err(err) = tracker.save(ctx.now) {
            error!(error = %err, "failed to persist community activity");
        }

        let summary = RunSummary {
            loaded,
            accepted: accepted_count,
            spam_posts: spam.len(),
            fresh: selection.fresh.len(),
            trending: selection.trending.len(),
            legacy: selection.legacy.len(),
            featured_comments: enriched.featured_count(),
            spam_comments: enriched.spam.len(),
            trusted_agents: ledger.trusted_count(),
            blocked_agents: ledger.blocked_count(),
            communities: tracker.community_count(),
            report_path,
        };
        info!(
            run_id = %ctx.run_id,
            loaded = summary.loaded,
            accepted = summary.accepted,
            selected = selection.selected_count(),
            featured_comments = summary.featured_comments,
            "digest pipeline completed"
        );
        Ok(summary)
    }
}

/// 元帳の更新。取得完了後に逐次適用する。
fn apply_ledger_updates(
    ledger: &mut ReputationLedger,
    date: &str,
    selection: &Selection,
    spam: &[quality::SpamVerdict],
    enriched: &EnrichOutcome,
) {
    let mut titles: FxHashMap<&str, &str> = FxHashMap::default();
    for entry in selection.selected() {
        titles.insert(&entry.post.post.id, &entry.post.post.title);
        ledger.record_featured_post(
            &entry.post.post.author.name,
            date,
            FeaturedPostRef {
                id: entry.post.post.id.clone(),
                title: entry.post.post.title.clone(),
                date: date.to_owned(),
                upvotes: entry.post.post.upvotes,
            },
        );
    }

    for (post_id, comments) in &enriched.featured {
        let post_title = titles.get(post_id.as_str()).copied().unwrap_or_default();
        for comment in comments {
            ledger.record_featured_comment(
                &comment.author.name,
                date,
                FeaturedCommentRef {
                    id: comment.id.clone(),
                    post_id: post_id.clone(),
                    post_title: post_title.to_owned(),
                    content: truncate_graphemes(&comment.content, LEDGER_EXCERPT_GRAPHEMES),
                    upvotes: comment.upvotes,
                },
            );
        }
    }

    for verdict in spam {
        ledger.record_blocked_post(
            &verdict.post.post.author.name,
            date,
            verdict.label,
            BlockedItemRef {
                id: verdict.post.post.id.clone(),
                excerpt: truncate_graphemes(&verdict.post.post.title, LEDGER_EXCERPT_GRAPHEMES),
                date: date.to_owned(),
            },
        );
    }

    for verdict in &enriched.spam {
        ledger.record_blocked_comment(
            &verdict.comment.author.name,
            date,
            verdict.label,
            BlockedItemRef {
                id: verdict.comment.id.clone(),
                excerpt: truncate_graphemes(&verdict.comment.content, LEDGER_EXCERPT_GRAPHEMES),
                date: date.to_owned(),
            },
        );
    }
}

/// Run the digest pipeline once with the default stages.
///
/// # Errors
/// Returns an error when loading the collection window or writing the digest
/// document fails. Store write failures are logged and do not fail the run.
pub async fn run(config: Arc<Config>) -> Result<RunSummary> {
    let pipeline = DigestPipeline::new(config)?;
    let ctx = RunContext::new();
    pipeline.execute(&ctx).await
}
