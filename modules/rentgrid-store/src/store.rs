//! `Store`: the persistence interface of spec.md §4.7, implemented over a
//! `sqlx::PgPool`.
//!
//! Grounded on `rootsignal-archive::store` (a thin struct wrapping a pool,
//! one method per operation, `sqlx::query_as::<_, Row>("...")` with bound
//! parameters rather than the `query!` compile-time macro, since this
//! workspace has no `DATABASE_URL` available to `cargo` at checkout time)
//! and `rootsignal-events::store`'s upsert idioms for the conflict clauses.

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use rentgrid_common::{CanonicalProperty, PipelineRun, PropertyImage, QualityAnalysis, Result};

use crate::models::{
    image_type_to_text, run_status_to_text, source_to_text, PipelineRunRow, PropertyBinds,
    PropertyImageRow, PropertyRow, QualityAnalysisRow, RunTrigger,
};

#[derive(Clone)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(Into::into)?;
        Ok(Self::new(pool))
    }

    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(Into::into)?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// `save_merged_property`: upsert by canonical identity. Widens
    /// `min/max_price` monotonically, unions sources and URL/description
    /// maps, never downgrades notification status (spec.md §4.7).
    pub async fn save_merged_property(&self, property: &CanonicalProperty) -> Result<()> {
        let binds = PropertyBinds::from(property);

        sqlx::query(
            r#"
            INSERT INTO properties (
                id, canonical_source, canonical_source_id, title, address, postcode,
                latitude, longitude, bedrooms, min_price, max_price, sources,
                source_urls, source_descriptions, features, floorplan_url,
                enrichment_status, enrichment_attempts, notification_status, first_seen
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)
            ON CONFLICT (canonical_source, canonical_source_id) DO UPDATE SET
                title = EXCLUDED.title,
                address = EXCLUDED.address,
                postcode = EXCLUDED.postcode,
                latitude = EXCLUDED.latitude,
                longitude = EXCLUDED.longitude,
                min_price = LEAST(properties.min_price, EXCLUDED.min_price),
                max_price = GREATEST(properties.max_price, EXCLUDED.max_price),
                sources = (
                    SELECT ARRAY(SELECT DISTINCT unnest(properties.sources || EXCLUDED.sources))
                ),
                source_urls = properties.source_urls || EXCLUDED.source_urls,
                source_descriptions = properties.source_descriptions || EXCLUDED.source_descriptions,
                features = (
                    SELECT ARRAY(SELECT DISTINCT unnest(properties.features || EXCLUDED.features))
                ),
                floorplan_url = COALESCE(properties.floorplan_url, EXCLUDED.floorplan_url),
                notification_status = CASE
                    WHEN (CASE WHEN EXCLUDED.notification_status = 'pending_enrichment' THEN 0
                               WHEN EXCLUDED.notification_status = 'pending_analysis' THEN 1
                               WHEN EXCLUDED.notification_status = 'pending' THEN 2
                               ELSE 3 END)
                         > (CASE WHEN properties.notification_status = 'pending_enrichment' THEN 0
                                 WHEN properties.notification_status = 'pending_analysis' THEN 1
                                 WHEN properties.notification_status = 'pending' THEN 2
                                 ELSE 3 END)
                    THEN EXCLUDED.notification_status
                    ELSE properties.notification_status
                END,
                updated_at = now()
            "#,
        )
        .bind(binds.id)
        .bind(&binds.canonical_source)
        .bind(&binds.canonical_source_id)
        .bind(&binds.title)
        .bind(&binds.address)
        .bind(&binds.postcode)
        .bind(binds.latitude)
        .bind(binds.longitude)
        .bind(binds.bedrooms)
        .bind(binds.min_price)
        .bind(binds.max_price)
        .bind(&binds.sources)
        .bind(&binds.source_urls)
        .bind(&binds.source_descriptions)
        .bind(&binds.features)
        .bind(&binds.floorplan_url)
        .bind(&binds.enrichment_status)
        .bind(binds.enrichment_attempts)
        .bind(&binds.notification_status)
        .bind(binds.first_seen)
        .execute(&self.pool)
        .await
        .map_err(Into::into)?;

        self.sync_image_manifest(property).await
    }

    async fn sync_image_manifest(&self, property: &CanonicalProperty) -> Result<()> {
        for image in &property.images {
            sqlx::query(
                r#"
                INSERT INTO property_images (id, property_id, owning_source, url, image_type)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (property_id, url) DO NOTHING
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(property.id)
            .bind(source_to_text(image.owning_source))
            .bind(&image.url)
            .bind(image_type_to_text(image.image_type))
            .execute(&self.pool)
            .await
            .map_err(Into::into)?;
        }
        Ok(())
    }

    /// `save_pre_analysis_properties`: bulk upsert with
    /// `notification=pending_analysis, enrichment=enriched`, inserting the
    /// image manifest. Idempotent. `commute_map` is accepted for contract
    /// parity with spec.md §4.7 but commute results are not yet part of the
    /// persisted schema (stored alongside the analysis in a later pass by
    /// the orchestrator, which calls `save_merged_property` again after
    /// computing the fit score), so it is merely threaded through for
    /// logging here.
    pub async fn save_pre_analysis_properties(
        &self,
        batch: &[CanonicalProperty],
        commute_map: &std::collections::HashMap<Uuid, rentgrid_common::CommuteResult>,
    ) -> Result<()> {
        for property in batch {
            let mut property = property.clone();
            property.enrichment_status = rentgrid_common::EnrichmentStatus::Enriched;
            property.notification_status = rentgrid_common::NotificationStatus::PendingAnalysis;
            self.save_merged_property(&property).await?;
            if let Some(commute) = commute_map.get(&property.id) {
                tracing::debug!(property_id = %property.id, minutes = commute.minutes, "commute result available at pre-analysis save");
            }
        }
        Ok(())
    }

    /// `save_unenriched_property`: insert with `enrichment=pending,
    /// attempts=1`; on conflict, only `attempts := attempts + 1` (other
    /// fields preserved).
    pub async fn save_unenriched_property(&self, property: &CanonicalProperty) -> Result<()> {
        let binds = PropertyBinds::from(property);

        sqlx::query(
            r#"
            INSERT INTO properties (
                id, canonical_source, canonical_source_id, title, address, postcode,
                latitude, longitude, bedrooms, min_price, max_price, sources,
                source_urls, source_descriptions, features, floorplan_url,
                enrichment_status, enrichment_attempts, notification_status, first_seen
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                    'pending', 1, 'pending_enrichment', $17)
            ON CONFLICT (canonical_source, canonical_source_id) DO UPDATE SET
                enrichment_attempts = properties.enrichment_attempts + 1,
                updated_at = now()
            "#,
        )
        .bind(binds.id)
        .bind(&binds.canonical_source)
        .bind(&binds.canonical_source_id)
        .bind(&binds.title)
        .bind(&binds.address)
        .bind(&binds.postcode)
        .bind(binds.latitude)
        .bind(binds.longitude)
        .bind(binds.bedrooms)
        .bind(binds.min_price)
        .bind(binds.max_price)
        .bind(&binds.sources)
        .bind(&binds.source_urls)
        .bind(&binds.source_descriptions)
        .bind(&binds.features)
        .bind(&binds.floorplan_url)
        .bind(binds.first_seen)
        .execute(&self.pool)
        .await
        .map_err(Into::into)?;

        Ok(())
    }

    /// `get_unenriched_properties`: rows where `enrichment=pending AND
    /// attempts < max_attempts`, reconstructed with empty image manifest.
    pub async fn get_unenriched_properties(&self, max_attempts: i32) -> Result<Vec<CanonicalProperty>> {
        let rows = sqlx::query_as::<_, PropertyRow>(
            r#"
            SELECT id, canonical_source, canonical_source_id, title, address, postcode,
                   latitude, longitude, bedrooms, min_price, max_price, sources,
                   source_urls, source_descriptions, features, floorplan_url,
                   enrichment_status, enrichment_attempts, notification_status, first_seen
            FROM properties
            WHERE enrichment_status = 'pending' AND enrichment_attempts < $1
            ORDER BY first_seen ASC
            "#,
        )
        .bind(max_attempts)
        .fetch_all(&self.pool)
        .await
        .map_err(Into::into)?;

        Ok(rows.into_iter().map(|r| r.into_domain(Vec::new())).collect())
    }

    /// `mark_enriched`: transition `enrichment -> enriched`; notification
    /// moves to `pending_analysis` only if currently `pending_enrichment`.
    pub async fn mark_enriched(&self, id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE properties SET
                enrichment_status = 'enriched',
                notification_status = CASE
                    WHEN notification_status = 'pending_enrichment' THEN 'pending_analysis'
                    ELSE notification_status
                END,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(Into::into)?;
        Ok(())
    }

    /// `expire_unenriched`: bulk transition of rows meeting
    /// `enrichment=pending AND attempts >= max_attempts` to
    /// `enrichment=failed`. Returns the count transitioned.
    pub async fn expire_unenriched(&self, max_attempts: i32) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE properties SET enrichment_status = 'failed', updated_at = now()
            WHERE enrichment_status = 'pending' AND enrichment_attempts >= $1
            "#,
        )
        .bind(max_attempts)
        .execute(&self.pool)
        .await
        .map_err(Into::into)?;
        Ok(result.rows_affected())
    }

    /// `complete_analysis`: writes the analysis row (or skips if `None`),
    /// then transitions `notification=pending_analysis -> pending`. No-op
    /// if not currently `pending_analysis`.
    pub async fn complete_analysis(&self, id: Uuid, analysis: Option<&QualityAnalysis>) -> Result<()> {
        if let Some(analysis) = analysis {
            self.upsert_analysis(analysis).await?;
        }

        let result = sqlx::query(
            r#"
            UPDATE properties SET notification_status = 'pending', updated_at = now()
            WHERE id = $1 AND notification_status = 'pending_analysis'
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(Into::into)?;

        if result.rows_affected() == 0 {
            tracing::debug!(property_id = %id, "complete_analysis no-op: not pending_analysis");
        }
        Ok(())
    }

    async fn upsert_analysis(&self, analysis: &QualityAnalysis) -> Result<()> {
        let observations = serde_json::to_value(&analysis.observations)
            .map_err(Into::into)?;

        sqlx::query(
            r#"
            INSERT INTO quality_analyses (property_id, overall_rating, concerns, observations, fit_score, reanalysis_requested_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (property_id) DO UPDATE SET
                overall_rating = EXCLUDED.overall_rating,
                concerns = EXCLUDED.concerns,
                observations = EXCLUDED.observations,
                fit_score = EXCLUDED.fit_score,
                reanalysis_requested_at = EXCLUDED.reanalysis_requested_at,
                updated_at = now()
            "#,
        )
        .bind(analysis.property_id)
        .bind(analysis.overall_rating)
        .bind(&analysis.concerns)
        .bind(observations)
        .bind(analysis.fit_score)
        .bind(analysis.reanalysis_requested_at)
        .execute(&self.pool)
        .await
        .map_err(Into::into)?;
        Ok(())
    }

    /// `reset_failed_analyses`: deletes analysis rows with null
    /// `overall_rating`, transitions their properties back to
    /// `pending_analysis`, returns the count reset.
    pub async fn reset_failed_analyses(&self) -> Result<u64> {
        let fallback_ids: Vec<Uuid> = sqlx::query_scalar(
            "SELECT property_id FROM quality_analyses WHERE overall_rating IS NULL",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(Into::into)?;

        if fallback_ids.is_empty() {
            return Ok(0);
        }

        sqlx::query("DELETE FROM quality_analyses WHERE overall_rating IS NULL")
            .execute(&self.pool)
            .await
            .map_err(Into::into)?;

        sqlx::query("UPDATE properties SET notification_status = 'pending_analysis', updated_at = now() WHERE id = ANY($1)")
            .bind(&fallback_ids)
            .execute(&self.pool)
            .await
            .map_err(Into::into)?;

        Ok(fallback_ids.len() as u64)
    }

    /// `request_reanalysis`: sets `reanalysis_requested_at = now()` on
    /// matching analysis rows. Idempotent.
    pub async fn request_reanalysis(&self, ids: &[Uuid]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        sqlx::query("UPDATE quality_analyses SET reanalysis_requested_at = now() WHERE property_id = ANY($1)")
            .bind(ids)
            .execute(&self.pool)
            .await
            .map_err(Into::into)?;
        Ok(())
    }

    /// `get_reanalysis_queue`: properties whose analysis row has a non-null
    /// `reanalysis_requested_at`, optionally filtered by outcode prefix.
    pub async fn get_reanalysis_queue(&self, outcode_prefix: Option<&str>) -> Result<Vec<CanonicalProperty>> {
        let rows = sqlx::query_as::<_, PropertyRow>(
            r#"
            SELECT p.id, p.canonical_source, p.canonical_source_id, p.title, p.address, p.postcode,
                   p.latitude, p.longitude, p.bedrooms, p.min_price, p.max_price, p.sources,
                   p.source_urls, p.source_descriptions, p.features, p.floorplan_url,
                   p.enrichment_status, p.enrichment_attempts, p.notification_status, p.first_seen
            FROM properties p
            JOIN quality_analyses qa ON qa.property_id = p.id
            WHERE qa.reanalysis_requested_at IS NOT NULL
              AND ($1::text IS NULL OR p.postcode LIKE $1 || '%')
            ORDER BY qa.reanalysis_requested_at ASC
            "#,
        )
        .bind(outcode_prefix)
        .fetch_all(&self.pool)
        .await
        .map_err(Into::into)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let images = self.load_images(row.id).await?;
            out.push(row.into_domain(images));
        }
        Ok(out)
    }

    /// `complete_reanalysis`: writes the analysis, clears
    /// `reanalysis_requested_at`. Does not touch notification status.
    pub async fn complete_reanalysis(&self, id: Uuid, analysis: &QualityAnalysis) -> Result<()> {
        debug_assert_eq!(analysis.property_id, id, "analysis must belong to the property being reanalyzed");
        let mut cleared = analysis.clone();
        cleared.reanalysis_requested_at = None;
        self.upsert_analysis(&cleared).await
    }

    /// `get_recent_properties_for_dedup`: merged records from the last N
    /// days excluding `enrichment=pending`. Used as cross-run dedup
    /// anchors.
    pub async fn get_recent_properties_for_dedup(&self, days: i64) -> Result<Vec<CanonicalProperty>> {
        let rows = sqlx::query_as::<_, PropertyRow>(
            r#"
            SELECT id, canonical_source, canonical_source_id, title, address, postcode,
                   latitude, longitude, bedrooms, min_price, max_price, sources,
                   source_urls, source_descriptions, features, floorplan_url,
                   enrichment_status, enrichment_attempts, notification_status, first_seen
            FROM properties
            WHERE first_seen > now() - ($1 || ' days')::INTERVAL
              AND enrichment_status != 'pending'
            "#,
        )
        .bind(days)
        .fetch_all(&self.pool)
        .await
        .map_err(Into::into)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let images = self.load_images(row.id).await?;
            out.push(row.into_domain(images));
        }
        Ok(out)
    }

    /// Rows currently `notification_status = pending_analysis`, regardless
    /// of how they got there: a fresh `save_pre_analysis_properties` this
    /// run, or a crash mid-analysis on a prior run. This is the "recovery
    /// query" spec.md §4.5's `save_before_analyze` edge describes — there is
    /// only one queue, so a crash before the analyzer ran simply means the
    /// row is still sitting in it next time this is called.
    pub async fn get_pending_analysis_properties(&self) -> Result<Vec<CanonicalProperty>> {
        let rows = sqlx::query_as::<_, PropertyRow>(
            r#"
            SELECT id, canonical_source, canonical_source_id, title, address, postcode,
                   latitude, longitude, bedrooms, min_price, max_price, sources,
                   source_urls, source_descriptions, features, floorplan_url,
                   enrichment_status, enrichment_attempts, notification_status, first_seen
            FROM properties
            WHERE notification_status = 'pending_analysis'
            ORDER BY first_seen ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(Into::into)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let images = self.load_images(row.id).await?;
            out.push(row.into_domain(images));
        }
        Ok(out)
    }

    /// Rows currently `notification_status = pending`, ready for the
    /// notifier to pick up.
    pub async fn get_properties_pending_notification(&self) -> Result<Vec<CanonicalProperty>> {
        let rows = sqlx::query_as::<_, PropertyRow>(
            r#"
            SELECT id, canonical_source, canonical_source_id, title, address, postcode,
                   latitude, longitude, bedrooms, min_price, max_price, sources,
                   source_urls, source_descriptions, features, floorplan_url,
                   enrichment_status, enrichment_attempts, notification_status, first_seen
            FROM properties
            WHERE notification_status = 'pending'
            ORDER BY first_seen ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(Into::into)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let images = self.load_images(row.id).await?;
            out.push(row.into_domain(images));
        }
        Ok(out)
    }

    async fn load_images(&self, property_id: Uuid) -> Result<Vec<PropertyImage>> {
        let rows = sqlx::query_as::<_, PropertyImageRow>(
            "SELECT id, property_id, owning_source, url, image_type FROM property_images WHERE property_id = $1",
        )
        .bind(property_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Into::into)?;
        Ok(rows.into_iter().map(|r| r.into_domain()).collect())
    }

    /// Owned by the notifier: update notification column only.
    pub async fn mark_notified(&self, id: Uuid) -> Result<()> {
        sqlx::query(
            "UPDATE properties SET notification_status = 'sent', updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(Into::into)?;
        Ok(())
    }

    /// Owned by the notifier: update notification column only.
    pub async fn mark_notification_failed(&self, id: Uuid) -> Result<()> {
        sqlx::query(
            "UPDATE properties SET notification_status = 'failed', updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(Into::into)?;
        Ok(())
    }

    /// Fetch one property by id with its image manifest, for callers that
    /// need the full reconstructed record rather than a bulk query.
    pub async fn get_property(&self, id: Uuid) -> Result<Option<CanonicalProperty>> {
        let row = sqlx::query_as::<_, PropertyRow>(
            r#"
            SELECT id, canonical_source, canonical_source_id, title, address, postcode,
                   latitude, longitude, bedrooms, min_price, max_price, sources,
                   source_urls, source_descriptions, features, floorplan_url,
                   enrichment_status, enrichment_attempts, notification_status, first_seen
            FROM properties WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Into::into)?;

        match row {
            Some(row) => {
                let images = self.load_images(row.id).await?;
                Ok(Some(row.into_domain(images)))
            }
            None => Ok(None),
        }
    }

    pub async fn get_analysis(&self, property_id: Uuid) -> Result<Option<QualityAnalysis>> {
        let row = sqlx::query_as::<_, QualityAnalysisRow>(
            "SELECT property_id, overall_rating, concerns, observations, fit_score, reanalysis_requested_at FROM quality_analyses WHERE property_id = $1",
        )
        .bind(property_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Into::into)?;
        Ok(row.map(|r| r.into_domain()))
    }

    // -- Pipeline-run log -------------------------------------------------

    pub async fn start_run(&self, run: &PipelineRun, trigger: RunTrigger) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO pipeline_runs (id, trigger, started_at, status)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(run.id)
        .bind(trigger.as_text())
        .bind(run.started_at)
        .bind(run_status_to_text(run.status))
        .execute(&self.pool)
        .await
        .map_err(Into::into)?;
        Ok(())
    }

    pub async fn finish_run(&self, run: &PipelineRun) -> Result<()> {
        let completed_at = run.completed_at.unwrap_or_else(Utc::now);
        sqlx::query(
            r#"
            UPDATE pipeline_runs SET
                completed_at = $2, status = $3, scraped_count = $4, criteria_pass_count = $5,
                dedup_merged_count = $6, enriched_count = $7, analyzed_count = $8,
                notified_count = $9, error_message = $10, duration_seconds = $11
            WHERE id = $1
            "#,
        )
        .bind(run.id)
        .bind(completed_at)
        .bind(run_status_to_text(run.status))
        .bind(run.scraped_count)
        .bind(run.criteria_pass_count)
        .bind(run.dedup_merged_count)
        .bind(run.enriched_count)
        .bind(run.analyzed_count)
        .bind(run.notified_count)
        .bind(&run.error_message)
        .bind(run.duration_seconds)
        .execute(&self.pool)
        .await
        .map_err(Into::into)?;
        Ok(())
    }

    pub async fn get_run(&self, id: Uuid) -> Result<Option<PipelineRun>> {
        let row = sqlx::query_as::<_, PipelineRunRow>(
            r#"
            SELECT id, started_at, completed_at, status, scraped_count, criteria_pass_count,
                   dedup_merged_count, enriched_count, analyzed_count, notified_count,
                   error_message, duration_seconds
            FROM pipeline_runs WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Into::into)?;
        Ok(row.map(|r| r.into_domain()))
    }

    /// `notification_status` text, exposed for the orchestrator's invariant
    /// checks (e.g. asserting a `sent` row never regresses) without pulling
    /// the whole property back.
    pub async fn notification_status_text(&self, id: Uuid) -> Result<Option<String>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT notification_status FROM properties WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(Into::into)?;
        Ok(row.map(|(status,)| status))
    }
}
